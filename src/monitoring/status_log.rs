use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::communication::amqp::StatusSink;
use crate::error::ControlResult;
use crate::shared_data::{IntersectionStatus, SignalStatus};

/// One CSV row: a single signal at a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub timestamp: u64,
    pub signal_id: String,
    pub lane: Option<String>,
    pub state: String,
    pub state_changed: bool,
    pub green_duration: u32,
    pub yellow_duration: u32,
    pub red_duration: u32,
    pub time_remaining: f64,
    pub vehicle_count: u32,
    pub congestion_level: String,
    pub emergency_active: bool,
    pub emergency_reason: Option<String>,
}

impl From<&SignalStatus> for StatusRecord {
    fn from(status: &SignalStatus) -> Self {
        Self {
            timestamp: status.timestamp,
            signal_id: status.signal_id.clone(),
            lane: status.lane.map(|l| l.to_string()),
            state: format!("{:?}", status.state).to_uppercase(),
            state_changed: status.state_changed,
            green_duration: status.green_duration,
            yellow_duration: status.yellow_duration,
            red_duration: status.red_duration,
            time_remaining: status.time_remaining,
            vehicle_count: status.vehicle_count,
            congestion_level: status.congestion_level.to_string(),
            emergency_active: status.emergency_active,
            emergency_reason: status.emergency_reason.clone(),
        }
    }
}

/// Appends a record to a CSV file, writing the header only for a new file.
pub fn log_to_csv<T: Serialize>(path: &Path, records: &[T]) -> ControlResult<()> {
    let file_exists = path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Status sink writing one row per signal per snapshot.
#[derive(Debug, Clone)]
pub struct CsvStatusLog {
    path: PathBuf,
}

impl CsvStatusLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(&self) -> ControlResult<Vec<StatusRecord>> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::Reader::from_reader(file);
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }
}

impl StatusSink for CsvStatusLog {
    fn publish(&mut self, status: &IntersectionStatus) -> ControlResult<()> {
        let rows: Vec<StatusRecord> = status.signals.iter().map(StatusRecord::from).collect();
        log_to_csv(&self.path, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::control_system::IntersectionController;
    use std::time::Duration;

    #[test]
    fn appends_rows_with_a_single_header() {
        let path = std::env::temp_dir().join(format!("status_log_{}.csv", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut intersection = IntersectionController::four_way(ControlConfig::default()).unwrap();
        intersection.start();
        let mut log = CsvStatusLog::new(&path);
        log.publish(&intersection.update(Duration::from_secs(1))).unwrap();
        intersection.force_emergency("north", "Ambulance detected").unwrap();
        log.publish(&intersection.update(Duration::from_secs(1))).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 8);
        let north = records.iter().rev().find(|r| r.signal_id == "north").unwrap();
        assert_eq!(north.state, "EMERGENCY");
        assert!(north.state_changed);
        assert_eq!(north.lane.as_deref(), Some("north"));
        assert_eq!(north.emergency_reason.as_deref(), Some("Ambulance detected"));

        std::fs::remove_file(&path).unwrap();
    }
}
