use serde::{Deserialize, Serialize};
use std::fmt;

/// Discretized vehicle density bucket, ordered from empty to saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CongestionLevel {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl CongestionLevel {
    pub const ALL: [CongestionLevel; 5] = [
        CongestionLevel::None,
        CongestionLevel::Low,
        CongestionLevel::Moderate,
        CongestionLevel::High,
        CongestionLevel::Critical,
    ];

    /// Breakpoints: 0, 1-5, 6-15, 16-30, 31+.
    pub fn from_vehicle_count(count: u32) -> Self {
        match count {
            0 => CongestionLevel::None,
            1..=5 => CongestionLevel::Low,
            6..=15 => CongestionLevel::Moderate,
            16..=30 => CongestionLevel::High,
            _ => CongestionLevel::Critical,
        }
    }

    /// Position of the level on the 0..=4 scale used for green interpolation.
    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn reason(self) -> &'static str {
        match self {
            CongestionLevel::None => "No traffic - minimum green",
            CongestionLevel::Low => "Light traffic - short green",
            CongestionLevel::Moderate => "Moderate traffic - normal green",
            CongestionLevel::High => "Heavy traffic - extended green",
            CongestionLevel::Critical => "Very heavy traffic - maximum green",
        }
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            CongestionLevel::None => "NONE",
            CongestionLevel::Low => "LOW",
            CongestionLevel::Moderate => "MODERATE",
            CongestionLevel::High => "HIGH",
            CongestionLevel::Critical => "CRITICAL",
        };
        write!(f, "{}", label)
    }
}
