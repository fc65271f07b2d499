pub mod amqp;
pub mod messages;

pub use messages::{CommandOutcome, ControlCommand};
