use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::TimingConfig;
use crate::control_system::lanes::Lane;
use crate::control_system::priority_manager::{
    lock_priority, EmergencyEvent, EmergencyGrant, PriorityManager, SharedPriority,
};
use crate::control_system::signal_state_machine::{LightState, SignalStateMachine, Transition};
use crate::error::{ControlError, ControlResult};
use crate::flow_analyzer::dynamic_timing::validate_vehicle_count;
use crate::flow_analyzer::{TimingCalculator, TimingResult};
use crate::global_variables::TIMING_CHANGE_HISTORY;
use crate::shared_data::{current_timestamp, SignalStatus, TimingChange};

/// Where a signal's green duration comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TimingMode {
    /// Sized from the vehicle count by the timing calculator.
    Adaptive,
    /// Held at a fixed green regardless of traffic.
    Fixed { green: u32 },
}

/// How the controller reaches emergency arbitration.
#[derive(Debug)]
enum PriorityLink {
    /// Private manager; this controller advances its clock.
    Owned(SharedPriority),
    /// Manager shared across an intersection; the intersection advances it.
    Shared(SharedPriority),
}

impl PriorityLink {
    fn handle(&self) -> &SharedPriority {
        match self {
            PriorityLink::Owned(p) | PriorityLink::Shared(p) => p,
        }
    }
}

/// Drives one signal: timing calculator + state machine + emergency overrides.
#[derive(Debug)]
pub struct SignalController {
    signal_id: String,
    lane: Option<Lane>,
    calculator: TimingCalculator,
    state_machine: SignalStateMachine,
    priority: PriorityLink,
    timing_mode: TimingMode,
    running: bool,
    vehicle_count: u32,
    fresh_reading: bool,
    total_updates: u64,
    state_changed: bool,
    timing_changes: VecDeque<TimingChange>,
}

impl SignalController {
    /// Creates a controller that arbitrates emergencies through `priority`.
    /// The signal id is registered with the manager.
    pub fn new(
        signal_id: impl Into<String>,
        lane: Option<Lane>,
        timing: TimingConfig,
        timing_mode: TimingMode,
        priority: SharedPriority,
    ) -> ControlResult<Self> {
        Self::build(
            signal_id.into(),
            lane,
            timing,
            timing_mode,
            PriorityLink::Shared(priority),
        )
    }

    /// Creates an adaptive controller with its own priority manager.
    pub fn standalone(
        signal_id: impl Into<String>,
        timing: TimingConfig,
        emergency_max_duration: Duration,
    ) -> ControlResult<Self> {
        let priority = PriorityManager::new(emergency_max_duration).into_shared();
        Self::build(
            signal_id.into(),
            None,
            timing,
            TimingMode::Adaptive,
            PriorityLink::Owned(priority),
        )
    }

    fn build(
        signal_id: String,
        lane: Option<Lane>,
        timing: TimingConfig,
        timing_mode: TimingMode,
        priority: PriorityLink,
    ) -> ControlResult<Self> {
        let calculator = TimingCalculator::new(timing)?;
        let initial = match timing_mode {
            TimingMode::Adaptive => calculator.unsmoothed(0),
            TimingMode::Fixed { green } => TimingResult::fixed(calculator.config(), green, 0),
        };
        lock_priority(priority.handle()).register_signal(signal_id.clone());
        log::info!(
            "SignalController initialized for {} ({:?}, {}s green)",
            signal_id,
            timing_mode,
            initial.green_duration
        );
        Ok(Self {
            state_machine: SignalStateMachine::new(signal_id.clone(), initial),
            signal_id,
            lane,
            calculator,
            priority,
            timing_mode,
            running: false,
            vehicle_count: 0,
            fresh_reading: false,
            total_updates: 0,
            state_changed: false,
            timing_changes: VecDeque::with_capacity(TIMING_CHANGE_HISTORY),
        })
    }

    pub fn signal_id(&self) -> &str {
        &self.signal_id
    }

    pub fn lane(&self) -> Option<Lane> {
        self.lane
    }

    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> LightState {
        self.state_machine.state()
    }

    pub fn calculator(&self) -> &TimingCalculator {
        &self.calculator
    }

    pub fn state_machine(&self) -> &SignalStateMachine {
        &self.state_machine
    }

    pub fn vehicle_count(&self) -> u32 {
        self.vehicle_count
    }

    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            log::info!("Signal {} started", self.signal_id);
        }
    }

    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            log::info!("Signal {} stopped", self.signal_id);
        }
    }

    /// Stores the latest reading; it is consumed by the next `update`.
    pub fn update_vehicle_count(&mut self, vehicle_count: i64) -> ControlResult<()> {
        self.vehicle_count = validate_vehicle_count(vehicle_count)?;
        self.fresh_reading = true;
        Ok(())
    }

    /// Switches the timing source and drops the smoothing window.
    ///
    /// A fixed green is applied to the pending slot at once; adaptive timing
    /// is computed on the next tick from the latest reading.
    pub fn set_timing_mode(&mut self, timing_mode: TimingMode) {
        if self.timing_mode != timing_mode {
            log::info!(
                "Signal {} timing mode {:?} -> {:?}",
                self.signal_id,
                self.timing_mode,
                timing_mode
            );
        }
        self.timing_mode = timing_mode;
        self.calculator.reset_history();
        match timing_mode {
            TimingMode::Fixed { green } => {
                let timing =
                    TimingResult::fixed(self.calculator.config(), green, self.vehicle_count);
                self.apply_timing(timing);
            }
            TimingMode::Adaptive => self.fresh_reading = true,
        }
    }

    pub fn reset_history(&mut self) {
        self.calculator.reset_history();
    }

    /// Requests the emergency slot for this signal and applies the outcome.
    /// A stopped signal refuses, since it could not honour the grant.
    pub fn force_emergency(&mut self, reason: impl Into<String>) -> ControlResult<EmergencyGrant> {
        self.ensure_running()?;
        let grant =
            lock_priority(self.priority.handle()).request_emergency(&self.signal_id, reason)?;
        self.sync_priority();
        Ok(grant)
    }

    /// Ends or withdraws this signal's emergency request.
    pub fn clear_emergency(&mut self) -> ControlResult<Vec<EmergencyEvent>> {
        self.ensure_running()?;
        let events = lock_priority(self.priority.handle()).clear_emergency(&self.signal_id)?;
        self.sync_priority();
        Ok(events)
    }

    fn ensure_running(&self) -> ControlResult<()> {
        if self.running {
            Ok(())
        } else {
            Err(ControlError::InvalidInput(format!(
                "signal {} is stopped",
                self.signal_id
            )))
        }
    }

    /// Aligns the state machine with the priority manager's current grant.
    /// A stopped controller stays frozen until it is started again.
    pub fn sync_priority(&mut self) -> Option<Transition> {
        if !self.running {
            return None;
        }
        let granted = lock_priority(self.priority.handle())
            .active_for(&self.signal_id)
            .map(|request| request.reason.clone());

        match granted {
            Some(reason) if !self.state_machine.in_emergency() => {
                self.state_machine.force_emergency(reason, None)
            }
            None if self.state_machine.in_emergency() => self.state_machine.clear_emergency(),
            _ => None,
        }
    }

    /// The single mutating tick.
    pub fn update(&mut self, elapsed: Duration) -> SignalStatus {
        if !self.running {
            self.state_changed = false;
            return self.status();
        }
        if let PriorityLink::Owned(priority) = &self.priority {
            lock_priority(priority).tick(elapsed);
        }
        self.sync_priority();

        if !self.state_machine.in_emergency() && self.fresh_reading {
            self.fresh_reading = false;
            let timing = match self.timing_mode {
                TimingMode::Adaptive => self.calculator.calculate_count(self.vehicle_count),
                TimingMode::Fixed { green } => {
                    TimingResult::fixed(self.calculator.config(), green, self.vehicle_count)
                }
            };
            self.apply_timing(timing);
        }

        self.state_machine.advance(elapsed);
        // also picks up transitions made by commands since the last tick
        self.state_changed = self.state_machine.take_status_changed();
        self.status()
    }

    fn apply_timing(&mut self, timing: TimingResult) {
        self.total_updates += 1;
        let old_green = self.state_machine.pending().green_duration;
        if old_green != timing.green_duration {
            log::info!(
                "Signal {} timing updated: {}s -> {}s green ({} vehicles, {})",
                self.signal_id,
                old_green,
                timing.green_duration,
                timing.vehicle_count,
                timing.congestion_level
            );
            if self.timing_changes.len() == TIMING_CHANGE_HISTORY {
                self.timing_changes.pop_front();
            }
            self.timing_changes.push_back(TimingChange {
                timestamp: current_timestamp(),
                old_green_duration: old_green,
                new_green_duration: timing.green_duration,
                vehicle_count: timing.vehicle_count,
                congestion_level: timing.congestion_level,
                reason: timing.reason.clone(),
            });
        }
        self.state_machine.set_pending(timing);
    }

    /// The most recent `limit` green-duration changes, oldest first.
    pub fn timing_changes(&self, limit: usize) -> Vec<TimingChange> {
        let skip = self.timing_changes.len().saturating_sub(limit);
        self.timing_changes.iter().skip(skip).cloned().collect()
    }

    pub fn status(&self) -> SignalStatus {
        let pending = self.state_machine.pending();
        let time_remaining = self.state_machine.time_remaining().or_else(|| {
            let priority = lock_priority(self.priority.handle());
            let remaining = priority
                .active_for(&self.signal_id)
                .and(priority.remaining());
            remaining
        });
        SignalStatus {
            signal_id: self.signal_id.clone(),
            lane: self.lane,
            phase: self.lane.map(Lane::phase),
            state: self.state_machine.state(),
            state_changed: self.state_changed,
            green_duration: pending.green_duration,
            yellow_duration: pending.yellow_duration,
            red_duration: pending.red_duration,
            time_remaining: time_remaining.unwrap_or(Duration::ZERO).as_secs_f64(),
            vehicle_count: self.vehicle_count,
            congestion_level: pending.congestion_level,
            emergency_active: self.state_machine.in_emergency(),
            emergency_reason: self.state_machine.emergency_reason().map(str::to_string),
            total_updates: self.total_updates,
            running: self.running,
            timing_mode: self.timing_mode,
            timestamp: current_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_analyzer::CongestionLevel;

    const SECOND: Duration = Duration::from_secs(1);

    fn controller() -> SignalController {
        let mut controller =
            SignalController::standalone("s1", TimingConfig::default(), Duration::from_secs(45))
                .unwrap();
        controller.start();
        controller
    }

    #[test]
    fn reading_is_applied_on_the_next_tick_only() {
        let mut controller = controller();
        controller.update_vehicle_count(12).unwrap();
        assert_eq!(controller.status().green_duration, 15);
        assert_eq!(controller.calculator().statistics().total_adjustments, 0);

        let status = controller.update(SECOND);
        assert_eq!(status.green_duration, 38);
        assert_eq!(status.congestion_level, CongestionLevel::Moderate);
        assert_eq!(status.total_updates, 1);

        // no new reading, no recomputation
        controller.update(SECOND);
        assert_eq!(controller.calculator().statistics().total_adjustments, 1);
    }

    #[test]
    fn negative_count_leaves_snapshot_intact() {
        let mut controller = controller();
        controller.update_vehicle_count(7).unwrap();
        controller.update(SECOND);
        let before = controller.status();

        let err = controller.update_vehicle_count(-3).unwrap_err();
        assert!(matches!(err, ControlError::InvalidInput(_)));
        assert_eq!(controller.vehicle_count(), 7);
        let after = controller.update(Duration::ZERO);
        assert_eq!(after.green_duration, before.green_duration);
        assert_eq!(after.total_updates, before.total_updates);
    }

    #[test]
    fn stopped_controller_ignores_updates() {
        let mut controller = controller();
        controller.stop();
        controller.stop();
        controller.update_vehicle_count(40).unwrap();
        let frozen = controller.update(Duration::from_secs(120));
        assert!(!frozen.running);
        assert_eq!(frozen.state, LightState::Red);
        assert_eq!(frozen.total_updates, 0);
        assert_eq!(controller.state_machine().time_in_state(), Duration::ZERO);

        controller.start();
        assert_eq!(controller.update(SECOND).green_duration, 60);
    }

    #[test]
    fn emergency_overrides_vehicle_counts() {
        let mut controller = controller();
        assert_eq!(
            controller.force_emergency("Ambulance detected").unwrap(),
            EmergencyGrant::Accepted
        );
        controller.update_vehicle_count(40).unwrap();

        let status = controller.update(SECOND);
        assert_eq!(status.state, LightState::Emergency);
        assert!(status.emergency_active);
        assert_eq!(status.emergency_reason.as_deref(), Some("Ambulance detected"));
        assert_eq!(status.total_updates, 0);
        assert_eq!(status.time_remaining, 44.0);

        controller.clear_emergency().unwrap();
        assert_eq!(controller.state(), LightState::Red);

        // the reading held back during the emergency is used afterwards
        assert_eq!(controller.update(SECOND).green_duration, 60);
    }

    #[test]
    fn standalone_emergency_expires_after_max_duration() {
        let mut controller = controller();
        controller.force_emergency("Ambulance detected").unwrap();
        for _ in 0..44 {
            assert_eq!(controller.update(SECOND).state, LightState::Emergency);
        }
        assert_eq!(controller.update(SECOND).state, LightState::Red);
    }

    #[test]
    fn stopped_controller_refuses_emergencies() {
        let mut controller = controller();
        controller.stop();
        let err = controller.force_emergency("Ambulance detected").unwrap_err();
        assert!(matches!(err, ControlError::InvalidInput(_)));
        let status = controller.status();
        assert!(!status.emergency_active);
        assert_eq!(status.state, LightState::Red);
        assert!(lock_priority(controller.priority.handle()).active().is_none());

        controller.start();
        controller.force_emergency("Ambulance detected").unwrap();
        controller.stop();
        assert!(controller.clear_emergency().is_err());
        assert_eq!(controller.state(), LightState::Emergency);
    }

    #[test]
    fn snapshot_flags_ticks_with_a_transition() {
        let mut controller = controller();
        // entering the initial red counts as the first change
        assert!(controller.update(SECOND).state_changed);
        assert!(!controller.update(SECOND).state_changed);

        controller.force_emergency("Ambulance detected").unwrap();
        assert!(controller.update(SECOND).state_changed);
        for _ in 0..43 {
            assert!(!controller.update(SECOND).state_changed);
        }
        let expired = controller.update(SECOND);
        assert_eq!(expired.state, LightState::Red);
        assert!(expired.state_changed);
    }

    #[test]
    fn fixed_mode_ignores_traffic() {
        let mut controller = controller();
        controller.set_timing_mode(TimingMode::Fixed { green: 35 });
        controller.update_vehicle_count(40).unwrap();
        let status = controller.update(SECOND);
        assert_eq!(status.green_duration, 35);
        assert_eq!(status.red_duration, 51);
        assert_eq!(status.vehicle_count, 40);
        assert_eq!(controller.calculator().statistics().total_adjustments, 0);
    }

    #[test]
    fn timing_changes_are_recorded() {
        let mut controller = controller();
        for count in [10, 10, 40] {
            controller.update_vehicle_count(count).unwrap();
            controller.update(SECOND);
        }
        let changes = controller.timing_changes(10);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].old_green_duration, 15);
        assert_eq!(changes[0].new_green_duration, 38);
        assert_eq!(changes[1].congestion_level, CongestionLevel::Critical);
        assert_eq!(controller.timing_changes(1).len(), 1);
    }
}
