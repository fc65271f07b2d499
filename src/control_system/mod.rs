pub mod intersection_controller;
pub mod lanes;
pub mod priority_manager;
pub mod signal_controller;
pub mod signal_state_machine;

pub use intersection_controller::{ControlMode, IntersectionController, LaneSelection};
pub use lanes::{Lane, SignalPhase};
pub use priority_manager::{EmergencyGrant, PriorityManager, SharedPriority};
pub use signal_controller::{SignalController, TimingMode};
pub use signal_state_machine::{LightState, SignalStateMachine};
