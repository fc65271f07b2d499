use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ControlError;

/// Compass approach feeding the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    North,
    South,
    East,
    West,
}

/// Signal phases of an eight-phase (dual ring) intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalPhase {
    #[serde(rename = "PHASE_1")]
    Phase1,
    #[serde(rename = "PHASE_2")]
    Phase2,
    #[serde(rename = "PHASE_3")]
    Phase3,
    #[serde(rename = "PHASE_4")]
    Phase4,
    #[serde(rename = "PHASE_5")]
    Phase5,
    #[serde(rename = "PHASE_6")]
    Phase6,
    #[serde(rename = "PHASE_7")]
    Phase7,
    #[serde(rename = "PHASE_8")]
    Phase8,
}

impl Lane {
    pub const ALL: [Lane; 4] = [Lane::North, Lane::South, Lane::East, Lane::West];

    /// Through-movement phase that gives this approach its green.
    pub fn phase(self) -> SignalPhase {
        match self {
            Lane::South => SignalPhase::Phase1,
            Lane::West => SignalPhase::Phase3,
            Lane::North => SignalPhase::Phase5,
            Lane::East => SignalPhase::Phase7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::North => "north",
            Lane::South => "south",
            Lane::East => "east",
            Lane::West => "west",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Lane {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" => Ok(Lane::North),
            "south" => Ok(Lane::South),
            "east" => Ok(Lane::East),
            "west" => Ok(Lane::West),
            _ => Err(ControlError::InvalidInput(format!("invalid lane: {}", s))),
        }
    }
}

impl SignalPhase {
    pub fn number(self) -> u8 {
        self as u8 + 1
    }
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PHASE_{}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanes_map_to_distinct_through_phases() {
        assert_eq!(Lane::North.phase().to_string(), "PHASE_5");
        assert_eq!(Lane::South.phase().to_string(), "PHASE_1");
        assert_eq!(Lane::East.phase().to_string(), "PHASE_7");
        assert_eq!(Lane::West.phase().to_string(), "PHASE_3");
        assert_eq!(serde_json::to_string(&Lane::West.phase()).unwrap(), "\"PHASE_3\"");
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("EAST".parse::<Lane>().unwrap(), Lane::East);
        assert_eq!(" west ".parse::<Lane>().unwrap(), Lane::West);
        assert!(matches!(
            "up".parse::<Lane>(),
            Err(ControlError::InvalidInput(_))
        ));
    }
}
