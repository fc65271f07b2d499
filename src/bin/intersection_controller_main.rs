use std::error::Error;
use std::time::Instant;

use signal_control::communication::amqp::{listen_queue, AmqpStatusPublisher, StatusSink};
use signal_control::communication::ControlCommand;
use signal_control::config::ControlConfig;
use signal_control::control_system::IntersectionController;
use signal_control::global_variables::{QUEUE_DETECTIONS, QUEUE_SIGNAL_COMMANDS};
use signal_control::monitoring::status_log::CsvStatusLog;
use signal_control::shared_data::{DetectionReading, IntersectionStatus};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = match std::env::args().nth(1) {
        Some(path) => ControlConfig::load(&path)?,
        None => ControlConfig::default(),
    };
    log::info!("Starting intersection controller (tick {:?})", config.tick_interval());

    let mut intersection = IntersectionController::four_way(config.clone())?;
    intersection.start();

    let (command_tx, mut command_rx) = mpsc::channel::<ControlCommand>(64);
    let (detection_tx, mut detection_rx) = mpsc::channel::<DetectionReading>(256);
    let (status_tx, status_rx) = mpsc::channel::<IntersectionStatus>(16);

    spawn_listener(config.amqp_url.clone(), QUEUE_SIGNAL_COMMANDS, command_tx);
    spawn_listener(config.amqp_url.clone(), QUEUE_DETECTIONS, detection_tx);

    let publisher = tokio::task::spawn_blocking({
        let config = config.clone();
        move || publish_statuses(config, status_rx)
    });

    let mut interval = tokio::time::interval(config.tick_interval());
    let mut last_tick = Instant::now();
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                let status = intersection.update(now - last_tick);
                last_tick = now;
                if status_tx.try_send(status).is_err() {
                    log::warn!("Status publisher is behind, dropping snapshot");
                }
            }
            Some(command) = command_rx.recv() => {
                match intersection.apply_command(command.clone()) {
                    Ok(outcome) => log::info!("Applied {:?}: {:?}", command, outcome),
                    Err(e) => log::warn!("Rejected {:?}: {}", command, e),
                }
            }
            Some(reading) = detection_rx.recv() => {
                if let Err(e) = intersection.ingest(&reading) {
                    log::warn!("Rejected detection for {}: {}", reading.signal_id, e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    intersection.stop();
    drop(status_tx);
    publisher.await?;
    Ok(())
}

fn spawn_listener<T>(amqp_url: String, queue: &'static str, tx: mpsc::Sender<T>)
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::spawn(async move {
        match listen_queue(amqp_url, queue, tx).await {
            Ok(()) => log::info!("Listener on {} finished", queue),
            Err(e) => log::warn!("Listener on {} failed: {}", queue, e),
        }
    });
}

/// Drains status snapshots into the CSV log and, if reachable, the status queue.
fn publish_statuses(config: ControlConfig, mut status_rx: mpsc::Receiver<IntersectionStatus>) {
    let mut sinks: Vec<Box<dyn StatusSink>> = Vec::new();
    if let Some(path) = &config.status_csv {
        sinks.push(Box::new(CsvStatusLog::new(path)));
    }
    match AmqpStatusPublisher::connect(&config.amqp_url) {
        Ok(publisher) => sinks.push(Box::new(publisher)),
        Err(e) => log::warn!("Status queue unavailable, logging to CSV only: {}", e),
    }
    while let Some(status) = status_rx.blocking_recv() {
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.publish(&status) {
                log::warn!("Failed to publish status: {}", e);
            }
        }
    }
}
