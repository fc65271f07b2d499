use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::flow_analyzer::TimingResult;

/// The possible states for a traffic signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightState {
    Red,
    Green,
    Yellow,
    /// All-clear override for an emergency vehicle; normal cycling is suspended.
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    TimerExpired,
    EmergencyForced,
    EmergencyCleared,
    EmergencyTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: LightState,
    pub to: LightState,
    pub cause: TransitionCause,
}

#[derive(Debug, Clone)]
struct EmergencyHold {
    reason: String,
    /// `None` when something else (the priority manager) owns the timeout.
    max_duration: Option<Duration>,
}

/// Red -> Green -> Yellow -> Red cycle for one signal, plus emergency override.
///
/// The duration of a phase is fixed when the phase is entered. New timing goes
/// into the pending slot and only takes effect the next time each phase
/// starts, so a green already running is never cut short.
#[derive(Debug, Clone)]
pub struct SignalStateMachine {
    signal_id: String,
    state: LightState,
    time_in_state: Duration,
    phase_duration: Duration,
    pending: TimingResult,
    emergency: Option<EmergencyHold>,
    transitions: u64,
    status_changed: bool,
}

impl SignalStateMachine {
    pub fn new(signal_id: impl Into<String>, initial: TimingResult) -> Self {
        let phase_duration = secs(initial.red_duration);
        Self {
            signal_id: signal_id.into(),
            state: LightState::Red,
            time_in_state: Duration::ZERO,
            phase_duration,
            pending: initial,
            emergency: None,
            transitions: 0,
            status_changed: true,
        }
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn in_emergency(&self) -> bool {
        self.state == LightState::Emergency
    }

    pub fn emergency_reason(&self) -> Option<&str> {
        self.emergency.as_ref().map(|hold| hold.reason.as_str())
    }

    pub fn time_in_state(&self) -> Duration {
        self.time_in_state
    }

    /// Duration locked in for the phase currently running.
    pub fn phase_duration(&self) -> Duration {
        self.phase_duration
    }

    /// Time left in the current phase; `None` for an emergency with no own timeout.
    pub fn time_remaining(&self) -> Option<Duration> {
        match &self.emergency {
            Some(hold) => hold
                .max_duration
                .map(|max| max.saturating_sub(self.time_in_state)),
            None => Some(self.phase_duration.saturating_sub(self.time_in_state)),
        }
    }

    pub fn pending(&self) -> &TimingResult {
        &self.pending
    }

    pub fn set_pending(&mut self, timing: TimingResult) {
        self.pending = timing;
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Returns whether a transition happened since the last call.
    pub fn take_status_changed(&mut self) -> bool {
        std::mem::replace(&mut self.status_changed, false)
    }

    pub fn advance(&mut self, elapsed: Duration) -> Option<Transition> {
        self.time_in_state += elapsed;

        if let Some(max_duration) = self.emergency.as_ref().map(|hold| hold.max_duration) {
            return match max_duration {
                Some(max) if self.time_in_state >= max => {
                    log::info!(
                        "Signal {} emergency expired after {:?}",
                        self.signal_id,
                        max
                    );
                    self.emergency = None;
                    Some(self.enter(LightState::Red, TransitionCause::EmergencyTimeout))
                }
                _ => None,
            };
        }

        if self.time_in_state < self.phase_duration {
            return None;
        }
        let next = match self.state {
            LightState::Red => LightState::Green,
            LightState::Green => LightState::Yellow,
            LightState::Yellow => LightState::Red,
            LightState::Emergency => return None,
        };
        Some(self.enter(next, TransitionCause::TimerExpired))
    }

    /// Suspends normal cycling. Repeated calls only refresh the reason.
    pub fn force_emergency(
        &mut self,
        reason: impl Into<String>,
        max_duration: Option<Duration>,
    ) -> Option<Transition> {
        let reason = reason.into();
        if let Some(hold) = self.emergency.as_mut() {
            hold.reason = reason;
            return None;
        }
        log::warn!(
            "Signal {} entering EMERGENCY from {:?}: {}",
            self.signal_id,
            self.state,
            reason
        );
        self.emergency = Some(EmergencyHold {
            reason,
            max_duration,
        });
        Some(self.enter(LightState::Emergency, TransitionCause::EmergencyForced))
    }

    /// Leaves the emergency state for RED so the cycle restarts cleanly.
    pub fn clear_emergency(&mut self) -> Option<Transition> {
        self.emergency.take()?;
        log::info!("Signal {} emergency cleared, restarting at RED", self.signal_id);
        Some(self.enter(LightState::Red, TransitionCause::EmergencyCleared))
    }

    fn enter(&mut self, next: LightState, cause: TransitionCause) -> Transition {
        let transition = Transition {
            from: self.state,
            to: next,
            cause,
        };
        self.state = next;
        self.time_in_state = Duration::ZERO;
        self.phase_duration = match next {
            LightState::Red => secs(self.pending.red_duration),
            LightState::Green => secs(self.pending.green_duration),
            LightState::Yellow => secs(self.pending.yellow_duration),
            LightState::Emergency => self
                .emergency
                .as_ref()
                .and_then(|hold| hold.max_duration)
                .unwrap_or(Duration::ZERO),
        };
        self.transitions += 1;
        self.status_changed = true;
        log::debug!(
            "Signal {} {:?} -> {:?} ({:?}) for {:?}",
            self.signal_id,
            transition.from,
            transition.to,
            cause,
            self.phase_duration
        );
        transition
    }
}

fn secs(seconds: u32) -> Duration {
    Duration::from_secs(seconds as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;

    fn timing(green: u32) -> TimingResult {
        TimingResult::fixed(&TimingConfig::default(), green, 0)
    }

    fn run(machine: &mut SignalStateMachine, seconds: u64) -> Vec<Transition> {
        (0..seconds)
            .filter_map(|_| machine.advance(Duration::from_secs(1)))
            .collect()
    }

    #[test]
    fn cycles_red_green_yellow_red() {
        // 20s green, 4s yellow, 66s red
        let mut machine = SignalStateMachine::new("s1", timing(20));
        assert_eq!(machine.state(), LightState::Red);

        assert!(run(&mut machine, 65).is_empty());
        assert_eq!(machine.advance(Duration::from_secs(1)).map(|t| t.to), Some(LightState::Green));
        assert_eq!(machine.time_in_state(), Duration::ZERO);

        run(&mut machine, 20);
        assert_eq!(machine.state(), LightState::Yellow);
        run(&mut machine, 4);
        assert_eq!(machine.state(), LightState::Red);
        assert_eq!(machine.transitions(), 3);
    }

    #[test]
    fn new_timing_waits_for_the_next_green() {
        let mut machine = SignalStateMachine::new("s1", timing(40));
        run(&mut machine, 46);
        assert_eq!(machine.state(), LightState::Green);
        assert_eq!(machine.phase_duration(), Duration::from_secs(40));

        machine.set_pending(timing(15));
        run(&mut machine, 20);
        assert_eq!(machine.state(), LightState::Green);
        assert_eq!(machine.time_remaining(), Some(Duration::from_secs(20)));

        run(&mut machine, 20);
        assert_eq!(machine.state(), LightState::Yellow);
        run(&mut machine, 4);
        assert_eq!(machine.state(), LightState::Red);
        assert_eq!(machine.phase_duration(), Duration::from_secs(71));
    }

    #[test]
    fn emergency_blocks_normal_transitions() {
        let mut machine = SignalStateMachine::new("s1", timing(20));
        run(&mut machine, 70);
        assert_eq!(machine.state(), LightState::Green);

        let forced = machine.force_emergency("Ambulance detected", None).unwrap();
        assert_eq!(forced.from, LightState::Green);
        assert_eq!(forced.cause, TransitionCause::EmergencyForced);
        assert!(run(&mut machine, 600).is_empty());
        assert_eq!(machine.state(), LightState::Emergency);
        assert_eq!(machine.time_remaining(), None);

        let cleared = machine.clear_emergency().unwrap();
        assert_eq!(cleared.to, LightState::Red);
        assert_eq!(machine.state(), LightState::Red);
        assert!(machine.clear_emergency().is_none());
    }

    #[test]
    fn repeated_force_only_refreshes_reason() {
        let mut machine = SignalStateMachine::new("s1", timing(20));
        assert!(machine.force_emergency("first", None).is_some());
        assert!(machine.force_emergency("second", None).is_none());
        assert_eq!(machine.emergency_reason(), Some("second"));
        assert_eq!(machine.transitions(), 1);
    }

    #[test]
    fn emergency_times_out_to_red() {
        let mut machine = SignalStateMachine::new("s1", timing(20));
        machine.force_emergency("Ambulance detected", Some(Duration::from_secs(45)));
        assert!(run(&mut machine, 44).is_empty());
        let transition = machine.advance(Duration::from_secs(1)).unwrap();
        assert_eq!(transition.cause, TransitionCause::EmergencyTimeout);
        assert_eq!(machine.state(), LightState::Red);
        assert_eq!(machine.emergency_reason(), None);
    }

    #[test]
    fn status_change_flag_is_consumed() {
        let mut machine = SignalStateMachine::new("s1", timing(20));
        assert!(machine.take_status_changed());
        assert!(!machine.take_status_changed());
        machine.force_emergency("test", None);
        assert!(machine.take_status_changed());
    }
}
