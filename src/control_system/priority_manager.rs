use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{ControlError, ControlResult};

/// Priority manager shared by every signal controller of one intersection.
pub type SharedPriority = Arc<Mutex<PriorityManager>>;

/// Locks the shared manager. A panic in another holder does not leave the
/// arbitration state half-written, so a poisoned lock is recovered.
pub fn lock_priority(priority: &SharedPriority) -> MutexGuard<'_, PriorityManager> {
    priority.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyRequest {
    pub signal_id: String,
    pub reason: String,
    /// Manager clock when the request was made.
    pub requested_at: Duration,
    /// Manager clock when the grant became active; `None` while queued.
    pub activation_time: Option<Duration>,
    pub max_duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyGrant {
    Accepted,
    /// Waiting behind the active grant; position 1 is next in line.
    Queued { position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EmergencyEvent {
    Activated { signal_id: String, reason: String },
    Expired { signal_id: String },
    Cleared { signal_id: String },
    Withdrawn { signal_id: String },
}

/// Grants the intersection-wide emergency slot to one signal at a time.
///
/// Requests are served first-come-first-served; a later request never
/// preempts the active one. The active grant ends on an explicit clear or
/// when `max_duration` of ticked time has passed.
#[derive(Debug)]
pub struct PriorityManager {
    known_signals: HashSet<String>,
    max_duration: Duration,
    clock: Duration,
    active: Option<EmergencyRequest>,
    queue: VecDeque<EmergencyRequest>,
}

impl PriorityManager {
    pub fn new(max_duration: Duration) -> Self {
        Self {
            known_signals: HashSet::new(),
            max_duration,
            clock: Duration::ZERO,
            active: None,
            queue: VecDeque::new(),
        }
    }

    pub fn into_shared(self) -> SharedPriority {
        Arc::new(Mutex::new(self))
    }

    pub fn register_signal(&mut self, signal_id: impl Into<String>) {
        self.known_signals.insert(signal_id.into());
    }

    pub fn is_registered(&self, signal_id: &str) -> bool {
        self.known_signals.contains(signal_id)
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn request_emergency(
        &mut self,
        signal_id: &str,
        reason: impl Into<String>,
    ) -> ControlResult<EmergencyGrant> {
        self.ensure_known(signal_id)?;

        if self.active_for(signal_id).is_some() {
            return Ok(EmergencyGrant::Accepted);
        }
        if let Some(index) = self.queue.iter().position(|r| r.signal_id == signal_id) {
            return Ok(EmergencyGrant::Queued { position: index + 1 });
        }

        let mut request = EmergencyRequest {
            signal_id: signal_id.to_string(),
            reason: reason.into(),
            requested_at: self.clock,
            activation_time: None,
            max_duration: self.max_duration,
        };

        if self.active.is_none() {
            request.activation_time = Some(self.clock);
            log::warn!(
                "Emergency granted to signal {}: {}",
                request.signal_id,
                request.reason
            );
            self.active = Some(request);
            Ok(EmergencyGrant::Accepted)
        } else {
            log::warn!(
                "Emergency for signal {} queued behind {:?}",
                request.signal_id,
                self.active.as_ref().map(|a| a.signal_id.as_str())
            );
            self.queue.push_back(request);
            Ok(EmergencyGrant::Queued {
                position: self.queue.len(),
            })
        }
    }

    /// Advances the manager clock and expires an overdue grant.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<EmergencyEvent> {
        self.clock += elapsed;
        let mut events = Vec::new();

        let expired = self
            .active
            .as_ref()
            .is_some_and(|active| self.elapsed_for(active) >= active.max_duration);
        if expired {
            if let Some(active) = self.active.take() {
                log::info!(
                    "Emergency for signal {} expired after {:?}",
                    active.signal_id,
                    active.max_duration
                );
                events.push(EmergencyEvent::Expired {
                    signal_id: active.signal_id,
                });
            }
            self.promote_next(&mut events);
        }
        events
    }

    pub fn clear_emergency(&mut self, signal_id: &str) -> ControlResult<Vec<EmergencyEvent>> {
        self.ensure_known(signal_id)?;
        let mut events = Vec::new();

        if self.active_for(signal_id).is_some() {
            self.active = None;
            log::info!("Emergency for signal {} cleared", signal_id);
            events.push(EmergencyEvent::Cleared {
                signal_id: signal_id.to_string(),
            });
            self.promote_next(&mut events);
        } else if let Some(index) = self.queue.iter().position(|r| r.signal_id == signal_id) {
            self.queue.remove(index);
            log::info!("Queued emergency for signal {} withdrawn", signal_id);
            events.push(EmergencyEvent::Withdrawn {
                signal_id: signal_id.to_string(),
            });
        }
        Ok(events)
    }

    pub fn active(&self) -> Option<&EmergencyRequest> {
        self.active.as_ref()
    }

    pub fn active_for(&self, signal_id: &str) -> Option<&EmergencyRequest> {
        self.active.as_ref().filter(|a| a.signal_id == signal_id)
    }

    pub fn is_queued(&self, signal_id: &str) -> bool {
        self.queue.iter().any(|r| r.signal_id == signal_id)
    }

    pub fn queued_signals(&self) -> Vec<String> {
        self.queue.iter().map(|r| r.signal_id.clone()).collect()
    }

    /// Time left on the active grant.
    pub fn remaining(&self) -> Option<Duration> {
        self.active
            .as_ref()
            .map(|a| a.max_duration.saturating_sub(self.elapsed_for(a)))
    }

    fn elapsed_for(&self, request: &EmergencyRequest) -> Duration {
        request
            .activation_time
            .map(|at| self.clock.saturating_sub(at))
            .unwrap_or(Duration::ZERO)
    }

    fn promote_next(&mut self, events: &mut Vec<EmergencyEvent>) {
        if let Some(mut next) = self.queue.pop_front() {
            next.activation_time = Some(self.clock);
            log::warn!(
                "Emergency granted to queued signal {}: {}",
                next.signal_id,
                next.reason
            );
            events.push(EmergencyEvent::Activated {
                signal_id: next.signal_id.clone(),
                reason: next.reason.clone(),
            });
            self.active = Some(next);
        }
    }

    fn ensure_known(&self, signal_id: &str) -> ControlResult<()> {
        if self.is_registered(signal_id) {
            Ok(())
        } else {
            Err(ControlError::UnknownSignal(signal_id.to_string()))
        }
    }
}
