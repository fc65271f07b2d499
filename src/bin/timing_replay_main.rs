use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fs::File;

use signal_control::config::ControlConfig;
use signal_control::flow_analyzer::TimingCalculator;

/// Input row: one detector count for one signal.
#[derive(Debug, Deserialize)]
struct CountRecord {
    #[serde(default = "default_signal")]
    signal_id: String,
    vehicle_count: i64,
}

fn default_signal() -> String {
    "signal".to_string()
}

#[derive(Debug, Serialize)]
struct TimingRecord {
    signal_id: String,
    vehicle_count: u32,
    congestion_level: String,
    green_duration: u32,
    yellow_duration: u32,
    red_duration: u32,
    reason: String,
}

/// Replays recorded vehicle counts through the timing calculator.
///
/// Usage: timing_replay_main <counts.csv> <timings.csv> [config.json]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <counts.csv> <timings.csv> [config.json]", args[0]);
        std::process::exit(2);
    }
    let config = match args.get(3) {
        Some(path) => ControlConfig::load(path)?,
        None => ControlConfig::default(),
    };

    let mut rdr = csv::Reader::from_reader(File::open(&args[1])?);
    let mut wtr = csv::Writer::from_writer(File::create(&args[2])?);
    let template = TimingCalculator::new(config.timing.clone())?;
    let mut calculators: HashMap<String, TimingCalculator> = HashMap::new();
    let (mut written, mut rejected) = (0usize, 0usize);

    for result in rdr.deserialize() {
        let record: CountRecord = result?;
        let calculator = calculators
            .entry(record.signal_id.clone())
            .or_insert_with(|| template.clone());
        match calculator.calculate(record.vehicle_count) {
            Ok(timing) => {
                wtr.serialize(TimingRecord {
                    signal_id: record.signal_id,
                    vehicle_count: timing.vehicle_count,
                    congestion_level: timing.congestion_level.to_string(),
                    green_duration: timing.green_duration,
                    yellow_duration: timing.yellow_duration,
                    red_duration: timing.red_duration,
                    reason: timing.reason,
                })?;
                written += 1;
            }
            Err(e) => {
                log::warn!("Skipping row for {}: {}", record.signal_id, e);
                rejected += 1;
            }
        }
    }
    wtr.flush()?;

    println!("Wrote {} timings to {} ({} rows rejected)", written, args[2], rejected);
    for (signal_id, calculator) in &calculators {
        let stats = calculator.statistics();
        println!(
            "{}: avg {:.1} vehicles, avg green {:.1}s, range {:?}-{:?}s",
            signal_id,
            stats.average_vehicle_count,
            stats.average_green_duration,
            stats.min_green_observed,
            stats.max_green_observed
        );
    }
    Ok(())
}
