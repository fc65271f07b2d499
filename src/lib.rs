pub mod communication;
pub mod config;
pub mod control_system;
pub mod error;
pub mod flow_analyzer;
pub mod global_variables;
pub mod monitoring;
pub mod shared_data;

pub use config::{ControlConfig, TimingConfig};
pub use error::{ControlError, ControlResult};
