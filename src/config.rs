use crate::control_system::lanes::Lane;
use crate::error::{ControlError, ControlResult};
use crate::global_variables::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Green/yellow/red sizing parameters for one timing calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Total cycle time in seconds (green + yellow + red).
    pub base_cycle_time: u32,
    pub min_green: u32,
    pub max_green: u32,
    pub yellow_duration: u32,
    pub smoothing_enabled: bool,
    /// Number of raw green computations kept for smoothing.
    pub smoothing_window: usize,
    /// Weight of the newest raw green against the window average (0, 1].
    pub smoothing_weight: f64,
    /// Largest change in green seconds allowed per calculation when smoothing.
    pub max_step: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_cycle_time: DEFAULT_BASE_CYCLE_TIME,
            min_green: DEFAULT_MIN_GREEN,
            max_green: DEFAULT_MAX_GREEN,
            yellow_duration: DEFAULT_YELLOW,
            smoothing_enabled: true,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smoothing_weight: DEFAULT_SMOOTHING_WEIGHT,
            max_step: DEFAULT_MAX_STEP,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if self.min_green == 0 {
            return Err(config_error("min_green must be at least 1 second"));
        }
        if self.min_green > self.max_green {
            return Err(config_error(format!(
                "min_green ({}) exceeds max_green ({})",
                self.min_green, self.max_green
            )));
        }
        if self.yellow_duration >= self.base_cycle_time {
            return Err(config_error(format!(
                "yellow_duration ({}) must be shorter than base_cycle_time ({})",
                self.yellow_duration, self.base_cycle_time
            )));
        }
        let fits = self
            .min_green
            .checked_add(self.yellow_duration)
            .is_some_and(|sum| sum <= self.base_cycle_time);
        if !fits {
            return Err(config_error(format!(
                "min_green ({}) + yellow_duration ({}) exceeds base_cycle_time ({})",
                self.min_green, self.yellow_duration, self.base_cycle_time
            )));
        }
        if self.smoothing_enabled {
            if self.smoothing_window == 0 {
                return Err(config_error("smoothing_window must be at least 1"));
            }
            if !(self.smoothing_weight > 0.0 && self.smoothing_weight <= 1.0) {
                return Err(config_error(format!(
                    "smoothing_weight ({}) must be in (0, 1]",
                    self.smoothing_weight
                )));
            }
            if self.max_step == 0 {
                return Err(config_error("max_step must be at least 1 second"));
            }
        }
        Ok(())
    }

    /// Checks a pinned green (baseline or manual) against the green range.
    pub fn check_fixed_green(&self, name: &str, green: u32) -> ControlResult<()> {
        if green < self.min_green || green > self.green_ceiling() {
            return Err(config_error(format!(
                "{} ({}) must lie within [{}, {}] for a {}s cycle with {}s yellow",
                name,
                green,
                self.min_green,
                self.green_ceiling(),
                self.base_cycle_time,
                self.yellow_duration
            )));
        }
        Ok(())
    }

    /// Longest green that still leaves a non-negative red.
    pub fn green_ceiling(&self) -> u32 {
        self.max_green
            .min(self.base_cycle_time.saturating_sub(self.yellow_duration))
    }
}

/// Everything an intersection controller and its driver need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub timing: TimingConfig,
    /// Green held by every signal that is not under adaptive control.
    pub baseline_green: u32,
    pub emergency_max_duration_secs: u64,
    /// Minimum detector confidence before an emergency flag is acted on.
    pub emergency_confidence_threshold: f32,
    pub tick_interval_ms: u64,
    pub amqp_url: String,
    pub status_csv: Option<String>,
    pub initial_lane: Option<Lane>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            baseline_green: DEFAULT_BASELINE_GREEN,
            emergency_max_duration_secs: DEFAULT_EMERGENCY_MAX_DURATION_SECS,
            emergency_confidence_threshold: DEFAULT_EMERGENCY_CONFIDENCE,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            amqp_url: AMQP_URL.to_string(),
            status_csv: Some(DEFAULT_STATUS_CSV.to_string()),
            initial_lane: None,
        }
    }
}

impl ControlConfig {
    pub fn load(path: &str) -> ControlResult<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| config_error(format!("cannot read {}: {}", path, e)))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> ControlResult<Self> {
        let config: ControlConfig = serde_json::from_str(contents)
            .map_err(|e| config_error(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ControlResult<()> {
        self.timing.validate()?;
        self.timing.check_fixed_green("baseline_green", self.baseline_green)?;
        if self.emergency_max_duration_secs == 0 {
            return Err(config_error("emergency_max_duration_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.emergency_confidence_threshold) {
            return Err(config_error(format!(
                "emergency_confidence_threshold ({}) must be in [0, 1]",
                self.emergency_confidence_threshold
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(config_error("tick_interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn emergency_max_duration(&self) -> Duration {
        Duration::from_secs(self.emergency_max_duration_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn config_error(message: impl Into<String>) -> ControlError {
    ControlError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ControlConfig::default().validate().is_ok());
        assert_eq!(TimingConfig::default().green_ceiling(), 60);
    }

    #[test]
    fn min_green_above_max_green_is_rejected() {
        let timing = TimingConfig {
            min_green: 70,
            max_green: 60,
            ..TimingConfig::default()
        };
        assert!(matches!(timing.validate(), Err(ControlError::Configuration(_))));
    }

    #[test]
    fn yellow_not_shorter_than_cycle_is_rejected() {
        let timing = TimingConfig {
            base_cycle_time: 4,
            yellow_duration: 4,
            min_green: 1,
            max_green: 1,
            ..TimingConfig::default()
        };
        assert!(matches!(timing.validate(), Err(ControlError::Configuration(_))));
    }

    #[test]
    fn green_ceiling_leaves_room_for_yellow() {
        let timing = TimingConfig {
            base_cycle_time: 50,
            max_green: 60,
            ..TimingConfig::default()
        };
        assert!(timing.validate().is_ok());
        assert_eq!(timing.green_ceiling(), 46);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = ControlConfig::from_json(
            r#"{ "baseline_green": 30, "timing": { "max_green": 50 }, "initial_lane": "east" }"#,
        )
        .unwrap();
        assert_eq!(config.baseline_green, 30);
        assert_eq!(config.timing.max_green, 50);
        assert_eq!(config.timing.min_green, DEFAULT_MIN_GREEN);
        assert_eq!(config.initial_lane, Some(Lane::East));
    }

    #[test]
    fn huge_values_are_rejected_without_overflow() {
        let result = ControlConfig::from_json(
            r#"{"timing": {"min_green": 4294967295, "max_green": 4294967295}}"#,
        );
        assert!(matches!(result, Err(ControlError::Configuration(_))));

        let timing = TimingConfig {
            yellow_duration: u32::MAX - 1,
            base_cycle_time: u32::MAX,
            ..TimingConfig::default()
        };
        assert!(matches!(timing.validate(), Err(ControlError::Configuration(_))));

        let config = ControlConfig {
            baseline_green: u32::MAX,
            ..ControlConfig::default()
        };
        assert!(matches!(config.validate(), Err(ControlError::Configuration(_))));
    }

    #[test]
    fn baseline_must_lie_in_the_green_range() {
        for baseline_green in [10, 87] {
            let config = ControlConfig {
                baseline_green,
                ..ControlConfig::default()
            };
            assert!(matches!(config.validate(), Err(ControlError::Configuration(_))));
        }
        let timing = TimingConfig::default();
        assert!(timing.check_fixed_green("green", 15).is_ok());
        assert!(timing.check_fixed_green("green", 60).is_ok());
        assert!(timing.check_fixed_green("green", 61).is_err());
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        assert!(matches!(
            ControlConfig::from_json("{ not json"),
            Err(ControlError::Configuration(_))
        ));
    }
}
