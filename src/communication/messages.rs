use serde::{Deserialize, Serialize};

use crate::control_system::intersection_controller::LaneSelection;
use crate::control_system::priority_manager::EmergencyGrant;

/// Commands accepted from the serving/transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    SelectLane {
        lane: String,
    },
    UpdateVehicleCount {
        signal_id: String,
        count: i64,
    },
    ForceEmergency {
        signal_id: String,
        #[serde(default = "default_emergency_reason")]
        reason: String,
    },
    ClearEmergency {
        signal_id: String,
    },
    Start,
    Stop,
}

fn default_emergency_reason() -> String {
    "Ambulance detected".to_string()
}

/// What a successfully applied command did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    LaneSelected(LaneSelection),
    VehicleCountStored { signal_id: String },
    Emergency {
        signal_id: String,
        grant: EmergencyGrant,
    },
    EmergencyCleared { signal_id: String },
    Started,
    Stopped,
}
