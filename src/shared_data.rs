// src/shared_data.rs

use crate::control_system::intersection_controller::ControlMode;
use crate::control_system::lanes::{Lane, SignalPhase};
use crate::control_system::priority_manager::EmergencyEvent;
use crate::control_system::signal_controller::TimingMode;
use crate::control_system::signal_state_machine::LightState;
use crate::flow_analyzer::CongestionLevel;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Read-only snapshot of one signal, rebuilt on every controller tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStatus {
    pub signal_id: String,
    pub lane: Option<Lane>,
    pub phase: Option<SignalPhase>,
    pub state: LightState,
    /// A transition happened during the tick that produced this snapshot.
    pub state_changed: bool,
    pub green_duration: u32,
    pub yellow_duration: u32,
    pub red_duration: u32,
    /// Seconds left in the current phase (or emergency grant).
    pub time_remaining: f64,
    pub vehicle_count: u32,
    pub congestion_level: CongestionLevel,
    pub emergency_active: bool,
    pub emergency_reason: Option<String>,
    pub total_updates: u64,
    pub running: bool,
    pub timing_mode: TimingMode,
    pub timestamp: u64,
}

/// Aggregate snapshot across every signal of an intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionStatus {
    pub timestamp: u64,
    pub mode: ControlMode,
    pub selected_lane: Option<Lane>,
    pub active_emergency: Option<String>,
    pub queued_emergencies: Vec<String>,
    /// Grants that started, expired or ended since the previous tick.
    pub events: Vec<EmergencyEvent>,
    pub signals: Vec<SignalStatus>,
}

impl IntersectionStatus {
    pub fn signal(&self, signal_id: &str) -> Option<&SignalStatus> {
        self.signals.iter().find(|s| s.signal_id == signal_id)
    }
}

/// A green-duration change applied to a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingChange {
    pub timestamp: u64,
    pub old_green_duration: u32,
    pub new_green_duration: u32,
    pub vehicle_count: u32,
    pub congestion_level: CongestionLevel,
    pub reason: String,
}

/// Emergency-vehicle indicator as reported by the detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergencyDetection {
    pub detected: bool,
    pub confidence: f32,
    /// The detection held across consecutive frames.
    pub stable: bool,
}

/// One detector report for one signal's approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReading {
    pub signal_id: String,
    pub vehicle_count: i64,
    #[serde(default)]
    pub emergency: EmergencyDetection,
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
