use thiserror::Error;

/// Errors raised by the signal control core and its adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("status sink error: {0}")]
    Sink(String),
}

pub type ControlResult<T> = Result<T, ControlError>;

impl From<csv::Error> for ControlError {
    fn from(e: csv::Error) -> Self {
        ControlError::Sink(e.to_string())
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        ControlError::Sink(e.to_string())
    }
}

impl From<amiquip::Error> for ControlError {
    fn from(e: amiquip::Error) -> Self {
        ControlError::Sink(e.to_string())
    }
}

impl From<std::io::Error> for ControlError {
    fn from(e: std::io::Error) -> Self {
        ControlError::Sink(e.to_string())
    }
}
