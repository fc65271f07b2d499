use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::communication::messages::{CommandOutcome, ControlCommand};
use crate::config::ControlConfig;
use crate::control_system::lanes::{Lane, SignalPhase};
use crate::control_system::priority_manager::{
    lock_priority, EmergencyEvent, EmergencyGrant, PriorityManager, SharedPriority,
};
use crate::control_system::signal_controller::{SignalController, TimingMode};
use crate::error::{ControlError, ControlResult};
use crate::flow_analyzer::dynamic_timing::validate_vehicle_count;
use crate::shared_data::{
    current_timestamp, DetectionReading, EmergencyDetection, IntersectionStatus, SignalStatus,
    TimingChange,
};

/// Operating mode of an intersection, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ControlMode {
    /// Single-lane mode: the selected lane is adaptive, the rest hold the baseline.
    Automatic { baseline_green: u32 },
    /// Every signal holds an operator-set green; lane selection is refused.
    Manual { green: u32 },
}

impl ControlMode {
    /// Timing for any signal that is not the selected lane.
    fn pinned(self) -> TimingMode {
        match self {
            ControlMode::Automatic { baseline_green } => TimingMode::Fixed {
                green: baseline_green,
            },
            ControlMode::Manual { green } => TimingMode::Fixed { green },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSelection {
    pub lane: Lane,
    pub signal_id: String,
    pub phase: SignalPhase,
}

/// Owns every signal controller of one intersection and the priority
/// manager they share.
#[derive(Debug)]
pub struct IntersectionController {
    config: ControlConfig,
    mode: ControlMode,
    priority: SharedPriority,
    signals: BTreeMap<String, SignalController>,
    lanes: HashMap<Lane, String>,
    selected_lane: Option<Lane>,
    running: bool,
    /// Arbitration events from commands, reported with the next tick.
    pending_events: Vec<EmergencyEvent>,
    last_events: Vec<EmergencyEvent>,
}

impl IntersectionController {
    pub fn new(config: ControlConfig, mode: ControlMode) -> ControlResult<Self> {
        config.validate()?;
        match mode {
            ControlMode::Automatic { baseline_green } => {
                config.timing.check_fixed_green("baseline_green", baseline_green)?
            }
            ControlMode::Manual { green } => {
                config.timing.check_fixed_green("manual green", green)?
            }
        }
        let priority = PriorityManager::new(config.emergency_max_duration()).into_shared();
        log::info!("IntersectionController initialized in {:?}", mode);
        Ok(Self {
            config,
            mode,
            priority,
            signals: BTreeMap::new(),
            lanes: HashMap::new(),
            selected_lane: None,
            running: false,
            pending_events: Vec::new(),
            last_events: Vec::new(),
        })
    }

    /// Single-lane automatic mode with the configured baseline.
    pub fn automatic(config: ControlConfig) -> ControlResult<Self> {
        let baseline_green = config.baseline_green;
        Self::new(config, ControlMode::Automatic { baseline_green })
    }

    /// Automatic intersection with one signal per compass lane, named after
    /// the lane. Applies `initial_lane` from the config if set.
    pub fn four_way(config: ControlConfig) -> ControlResult<Self> {
        let initial_lane = config.initial_lane;
        let mut controller = Self::automatic(config)?;
        for lane in Lane::ALL {
            controller.register_signal(lane.as_str(), Some(lane))?;
        }
        if let Some(lane) = initial_lane {
            controller.select_lane(lane.as_str())?;
        }
        Ok(controller)
    }

    pub fn register_signal(&mut self, signal_id: &str, lane: Option<Lane>) -> ControlResult<()> {
        if self.signals.contains_key(signal_id) {
            return Err(ControlError::InvalidInput(format!(
                "signal {} is already registered",
                signal_id
            )));
        }
        if let Some(lane) = lane {
            if let Some(owner) = self.lanes.get(&lane) {
                return Err(ControlError::InvalidInput(format!(
                    "lane {} already belongs to signal {}",
                    lane, owner
                )));
            }
        }
        let mut controller = SignalController::new(
            signal_id,
            lane,
            self.config.timing.clone(),
            self.mode.pinned(),
            self.priority.clone(),
        )?;
        if self.running {
            controller.start();
        }
        if let Some(lane) = lane {
            self.lanes.insert(lane, signal_id.to_string());
        }
        self.signals.insert(signal_id.to_string(), controller);
        log::info!("Signal registered: {} ({:?})", signal_id, lane);
        Ok(())
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn selected_lane(&self) -> Option<Lane> {
        self.selected_lane
    }

    pub fn signal(&self, signal_id: &str) -> ControlResult<&SignalController> {
        self.signals
            .get(signal_id)
            .ok_or_else(|| ControlError::UnknownSignal(signal_id.to_string()))
    }

    fn signal_mut(&mut self, signal_id: &str) -> ControlResult<&mut SignalController> {
        self.signals
            .get_mut(signal_id)
            .ok_or_else(|| ControlError::UnknownSignal(signal_id.to_string()))
    }

    pub fn signal_ids(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    pub fn priority(&self) -> &SharedPriority {
        &self.priority
    }

    /// Gives `lane` adaptive timing and pins every other lane to the baseline.
    ///
    /// Both the outgoing and the incoming lane start from an empty smoothing
    /// window. Selecting the lane that is already selected changes nothing.
    pub fn select_lane(&mut self, lane: &str) -> ControlResult<LaneSelection> {
        let lane: Lane = lane.parse()?;
        if let ControlMode::Manual { .. } = self.mode {
            return Err(ControlError::InvalidInput(
                "lane selection is not available in manual mode".to_string(),
            ));
        }
        let signal_id = self
            .lanes
            .get(&lane)
            .cloned()
            .ok_or_else(|| ControlError::InvalidInput(format!("lane {} has no signal", lane)))?;
        let selection = LaneSelection {
            lane,
            signal_id: signal_id.clone(),
            phase: lane.phase(),
        };
        if self.selected_lane == Some(lane) {
            return Ok(selection);
        }

        if let Some(previous) = self.selected_lane.take() {
            self.revert_to_baseline(previous);
        }
        self.signal_mut(&signal_id)?.set_timing_mode(TimingMode::Adaptive);
        self.selected_lane = Some(lane);
        log::info!(
            "Lane selected: {} (signal {}, {}); other lanes hold {:?}",
            lane,
            signal_id,
            selection.phase,
            self.mode.pinned()
        );
        Ok(selection)
    }

    /// Returns every lane to the baseline.
    pub fn clear_lane_selection(&mut self) {
        if let Some(previous) = self.selected_lane.take() {
            self.revert_to_baseline(previous);
            log::info!("Lane selection cleared");
        }
    }

    fn revert_to_baseline(&mut self, lane: Lane) {
        let pinned = self.mode.pinned();
        if let Some(controller) = self
            .lanes
            .get(&lane)
            .and_then(|id| self.signals.get_mut(id))
        {
            controller.set_timing_mode(pinned);
        }
    }

    pub fn update_vehicle_count(&mut self, signal_id: &str, count: i64) -> ControlResult<()> {
        self.signal_mut(signal_id)?.update_vehicle_count(count)
    }

    pub fn force_emergency(
        &mut self,
        signal_id: &str,
        reason: &str,
    ) -> ControlResult<EmergencyGrant> {
        self.signal_mut(signal_id)?.force_emergency(reason)
    }

    pub fn clear_emergency(&mut self, signal_id: &str) -> ControlResult<()> {
        let events = self.signal_mut(signal_id)?.clear_emergency()?;
        self.pending_events.extend(events);
        // a queued request may have been promoted
        self.sync_all();
        Ok(())
    }

    /// Requests an emergency when the detector is confident and stable.
    /// A negative detection never clears an active emergency.
    pub fn report_emergency_detection(
        &mut self,
        signal_id: &str,
        detection: EmergencyDetection,
    ) -> ControlResult<Option<EmergencyGrant>> {
        let threshold = self.config.emergency_confidence_threshold;
        let controller = self.signal_mut(signal_id)?;
        if !(detection.detected && detection.stable && detection.confidence >= threshold) {
            return Ok(None);
        }
        let reason = format!(
            "Emergency vehicle detected ({:.0}% confidence)",
            detection.confidence * 100.0
        );
        controller.force_emergency(reason).map(Some)
    }

    /// Stores the count and acts on the emergency flag of one detector report.
    /// The count is validated before the emergency flag is acted on, so a
    /// rejected reading changes nothing.
    pub fn ingest(&mut self, reading: &DetectionReading) -> ControlResult<Option<EmergencyGrant>> {
        validate_vehicle_count(reading.vehicle_count)?;
        let grant = self.report_emergency_detection(&reading.signal_id, reading.emergency)?;
        self.update_vehicle_count(&reading.signal_id, reading.vehicle_count)?;
        Ok(grant)
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        for controller in self.signals.values_mut() {
            controller.start();
        }
        self.sync_all();
        log::info!("Started {} signals", self.signals.len());
    }

    /// Freezes every signal and the emergency clock until `start`.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        for controller in self.signals.values_mut() {
            controller.stop();
        }
        log::info!("Stopped {} signals", self.signals.len());
    }

    fn sync_all(&mut self) {
        for controller in self.signals.values_mut() {
            controller.sync_priority();
        }
    }

    /// Advances emergency timers, then ticks every signal. A stopped
    /// intersection returns its frozen snapshot.
    pub fn update(&mut self, elapsed: Duration) -> IntersectionStatus {
        if !self.running {
            self.last_events.clear();
            return self.status();
        }
        let mut events = std::mem::take(&mut self.pending_events);
        events.extend(lock_priority(&self.priority).tick(elapsed));
        for event in &events {
            match event {
                EmergencyEvent::Expired { signal_id } => {
                    log::info!("Emergency on {} expired, resuming normal cycle", signal_id)
                }
                EmergencyEvent::Activated { signal_id, reason } => {
                    log::warn!("Emergency on {} now active: {}", signal_id, reason)
                }
                _ => {}
            }
        }
        for controller in self.signals.values_mut() {
            controller.update(elapsed);
        }
        self.last_events = events;
        self.status()
    }

    pub fn status(&self) -> IntersectionStatus {
        let (active_emergency, queued_emergencies) = {
            let priority = lock_priority(&self.priority);
            let active = priority.active().map(|a| a.signal_id.clone());
            (active, priority.queued_signals())
        };
        IntersectionStatus {
            timestamp: current_timestamp(),
            mode: self.mode,
            selected_lane: self.selected_lane,
            active_emergency,
            queued_emergencies,
            events: self.last_events.clone(),
            signals: self.signals.values().map(SignalController::status).collect(),
        }
    }

    pub fn signal_status(&self, signal_id: &str) -> ControlResult<SignalStatus> {
        Ok(self.signal(signal_id)?.status())
    }

    pub fn timing_changes(
        &self,
        signal_id: &str,
        limit: usize,
    ) -> ControlResult<Vec<TimingChange>> {
        Ok(self.signal(signal_id)?.timing_changes(limit))
    }

    /// Applies a command from the transport layer. A rejected command leaves
    /// every signal untouched.
    pub fn apply_command(&mut self, command: ControlCommand) -> ControlResult<CommandOutcome> {
        match command {
            ControlCommand::SelectLane { lane } => {
                self.select_lane(&lane).map(CommandOutcome::LaneSelected)
            }
            ControlCommand::UpdateVehicleCount { signal_id, count } => {
                self.update_vehicle_count(&signal_id, count)?;
                Ok(CommandOutcome::VehicleCountStored { signal_id })
            }
            ControlCommand::ForceEmergency { signal_id, reason } => {
                let grant = self.force_emergency(&signal_id, &reason)?;
                Ok(CommandOutcome::Emergency { signal_id, grant })
            }
            ControlCommand::ClearEmergency { signal_id } => {
                self.clear_emergency(&signal_id)?;
                Ok(CommandOutcome::EmergencyCleared { signal_id })
            }
            ControlCommand::Start => {
                self.start();
                Ok(CommandOutcome::Started)
            }
            ControlCommand::Stop => {
                self.stop();
                Ok(CommandOutcome::Stopped)
            }
        }
    }
}
