pub mod congestion;
pub mod dynamic_timing;
pub mod smoothing;

// Re-export the items the controllers work with
pub use congestion::CongestionLevel;
pub use dynamic_timing::{TimingCalculator, TimingResult, TimingStatistics};
pub use smoothing::SmoothingHistory;
