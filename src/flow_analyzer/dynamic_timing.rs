// dynamic_timing.rs

use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;
use crate::error::{ControlError, ControlResult};
use crate::flow_analyzer::congestion::CongestionLevel;
use crate::flow_analyzer::smoothing::SmoothingHistory;

/// Timing for one full green/yellow/red cycle of a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingResult {
    pub green_duration: u32,
    pub yellow_duration: u32,
    pub red_duration: u32,
    pub vehicle_count: u32,
    pub congestion_level: CongestionLevel,
    pub reason: String,
}

impl TimingResult {
    /// Timing for a signal pinned to a fixed green, independent of traffic.
    pub fn fixed(config: &TimingConfig, green: u32, vehicle_count: u32) -> Self {
        let green_duration = green.min(config.green_ceiling());
        Self {
            green_duration,
            yellow_duration: config.yellow_duration,
            red_duration: config.base_cycle_time - green_duration - config.yellow_duration,
            vehicle_count,
            congestion_level: CongestionLevel::from_vehicle_count(vehicle_count),
            reason: format!("Fixed timing - {}s green", green_duration),
        }
    }

    pub fn cycle_time(&self) -> u32 {
        self.green_duration + self.yellow_duration + self.red_duration
    }
}

/// Running totals over every calculation since the last reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingStatistics {
    pub average_vehicle_count: f64,
    pub average_green_duration: f64,
    pub min_green_observed: Option<u32>,
    pub max_green_observed: Option<u32>,
    pub total_adjustments: u64,
}

#[derive(Debug, Clone, Default)]
struct Totals {
    calculations: u64,
    vehicle_sum: u64,
    green_sum: u64,
    min_green: Option<u32>,
    max_green: Option<u32>,
}

/// Sizes the green phase from a vehicle count.
///
/// The congestion level picks a raw green on a piecewise-linear scale from
/// `min_green` (NONE) to `max_green` (CRITICAL). With smoothing enabled the
/// raw value is blended with the average of the recent raw values and then
/// limited to `max_step` seconds away from the previous result, so a single
/// noisy frame can only nudge the timing.
#[derive(Debug, Clone)]
pub struct TimingCalculator {
    config: TimingConfig,
    history: SmoothingHistory,
    last_green: Option<u32>,
    last_result: Option<TimingResult>,
    totals: Totals,
}

impl TimingCalculator {
    pub fn new(config: TimingConfig) -> ControlResult<Self> {
        config.validate()?;
        if config.max_green > config.green_ceiling() {
            log::warn!(
                "max_green {}s does not fit a {}s cycle with {}s yellow; capping green at {}s",
                config.max_green,
                config.base_cycle_time,
                config.yellow_duration,
                config.green_ceiling()
            );
        }
        log::info!(
            "TimingCalculator initialized: cycle_time={}s, green={}-{}s, smoothing={}",
            config.base_cycle_time,
            config.min_green,
            config.max_green,
            config.smoothing_enabled
        );
        let window = if config.smoothing_enabled {
            config.smoothing_window
        } else {
            0
        };
        Ok(Self {
            history: SmoothingHistory::new(window),
            config,
            last_green: None,
            last_result: None,
            totals: Totals::default(),
        })
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Rejects negative counts; counts beyond `u32::MAX` saturate.
    pub fn calculate(&mut self, vehicle_count: i64) -> ControlResult<TimingResult> {
        let count = validate_vehicle_count(vehicle_count)?;
        Ok(self.calculate_count(count))
    }

    pub fn calculate_count(&mut self, vehicle_count: u32) -> TimingResult {
        let level = CongestionLevel::from_vehicle_count(vehicle_count);
        let raw_green = self.green_for_level(level);

        let green = if self.config.smoothing_enabled {
            self.smooth(raw_green)
        } else {
            raw_green
        }
        .clamp(self.config.min_green, self.config.green_ceiling());

        if self.config.smoothing_enabled {
            self.history.push(raw_green);
            self.last_green = Some(green);
        }
        self.record(vehicle_count, green);

        let result = self.build_result(vehicle_count, level, raw_green, green);
        log::debug!(
            "{} vehicles -> {} ({}s green, raw {}s)",
            vehicle_count,
            level,
            green,
            raw_green
        );
        self.last_result = Some(result.clone());
        result
    }

    /// Timing for a count without smoothing and without touching any history.
    pub fn unsmoothed(&self, vehicle_count: u32) -> TimingResult {
        let level = CongestionLevel::from_vehicle_count(vehicle_count);
        let green = self.green_for_level(level);
        self.build_result(vehicle_count, level, green, green)
    }

    fn build_result(
        &self,
        vehicle_count: u32,
        level: CongestionLevel,
        raw_green: u32,
        green: u32,
    ) -> TimingResult {
        let reason = if green == raw_green {
            level.reason().to_string()
        } else {
            format!("{} (smoothed from {}s)", level.reason(), raw_green)
        };
        TimingResult {
            green_duration: green,
            yellow_duration: self.config.yellow_duration,
            red_duration: self.config.base_cycle_time - green - self.config.yellow_duration,
            vehicle_count,
            congestion_level: level,
            reason,
        }
    }

    /// Raw green for a level before smoothing: `min + round(span * index / 4)`.
    pub fn green_for_level(&self, level: CongestionLevel) -> u32 {
        let span = u64::from(self.config.max_green - self.config.min_green);
        let top = u64::from(CongestionLevel::Critical.index());
        let offset = (span * u64::from(level.index()) * 2 + top) / (top * 2);
        let green = u64::from(self.config.min_green) + offset;
        green.min(u64::from(self.config.green_ceiling())) as u32
    }

    fn smooth(&self, raw_green: u32) -> u32 {
        let (Some(average), Some(previous)) = (self.history.average(), self.last_green) else {
            return raw_green;
        };
        let weight = self.config.smoothing_weight;
        let blended = (weight * raw_green as f64 + (1.0 - weight) * average).round() as u32;
        let step = self.config.max_step;
        blended.clamp(previous.saturating_sub(step), previous.saturating_add(step))
    }

    fn record(&mut self, vehicle_count: u32, green: u32) {
        let totals = &mut self.totals;
        totals.calculations += 1;
        totals.vehicle_sum += vehicle_count as u64;
        totals.green_sum += green as u64;
        totals.min_green = Some(totals.min_green.map_or(green, |m| m.min(green)));
        totals.max_green = Some(totals.max_green.map_or(green, |m| m.max(green)));
    }

    pub fn statistics(&self) -> TimingStatistics {
        let n = self.totals.calculations;
        let average = |sum: u64| if n == 0 { 0.0 } else { sum as f64 / n as f64 };
        TimingStatistics {
            average_vehicle_count: average(self.totals.vehicle_sum),
            average_green_duration: average(self.totals.green_sum),
            min_green_observed: self.totals.min_green,
            max_green_observed: self.totals.max_green,
            total_adjustments: n,
        }
    }

    pub fn last_result(&self) -> Option<&TimingResult> {
        self.last_result.as_ref()
    }

    pub fn history(&self) -> &SmoothingHistory {
        &self.history
    }

    /// Forget the smoothing window and statistics.
    pub fn reset_history(&mut self) {
        self.history.clear();
        self.last_green = None;
        self.last_result = None;
        self.totals = Totals::default();
        log::info!("TimingCalculator history reset");
    }
}

pub fn validate_vehicle_count(vehicle_count: i64) -> ControlResult<u32> {
    if vehicle_count < 0 {
        return Err(ControlError::InvalidInput(format!(
            "vehicle count must be non-negative, got {}",
            vehicle_count
        )));
    }
    Ok(u32::try_from(vehicle_count).unwrap_or(u32::MAX))
}
