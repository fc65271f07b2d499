use amiquip::{Connection, Exchange, Publish, QueueDeclareOptions};
use rand::Rng;
use std::collections::HashMap;
use std::error::Error;
use tokio::time::{sleep, Duration};

use signal_control::config::ControlConfig;
use signal_control::control_system::Lane;
use signal_control::global_variables::QUEUE_DETECTIONS;
use signal_control::shared_data::{DetectionReading, EmergencyDetection};

const MAX_COUNT: i64 = 45;
const EMERGENCY_CHANCE: f64 = 0.01;
/// Frames an emergency vehicle stays visible once it appears.
const EMERGENCY_FRAMES: u32 = 12;

/// Random-walk vehicle counts per lane, with the odd emergency vehicle.
struct DetectionFeed {
    counts: HashMap<Lane, i64>,
    emergency_frames: HashMap<Lane, u32>,
}

impl DetectionFeed {
    fn new() -> Self {
        let mut rng = rand::rng();
        let counts = Lane::ALL
            .iter()
            .map(|&lane| (lane, rng.random_range(0..=15)))
            .collect();
        Self {
            counts,
            emergency_frames: HashMap::new(),
        }
    }

    fn next_reading(&mut self, lane: Lane) -> DetectionReading {
        let mut rng = rand::rng();
        let count = self.counts.entry(lane).or_insert(0);
        *count = (*count + rng.random_range(-3..=3)).clamp(0, MAX_COUNT);

        let frames = self.emergency_frames.entry(lane).or_insert(0);
        if *frames == 0 && rng.random_bool(EMERGENCY_CHANCE) {
            *frames = EMERGENCY_FRAMES;
            println!("Emergency vehicle approaching on {}", lane);
        }
        let emergency = if *frames > 0 {
            *frames -= 1;
            EmergencyDetection {
                detected: true,
                confidence: rng.random_range(0.4..1.0),
                // the first couple of frames are not stable yet
                stable: *frames < EMERGENCY_FRAMES - 2,
            }
        } else {
            EmergencyDetection::default()
        };

        DetectionReading {
            signal_id: lane.as_str().to_string(),
            vehicle_count: *count,
            emergency,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = match std::env::args().nth(1) {
        Some(path) => ControlConfig::load(&path)?,
        None => ControlConfig::default(),
    };

    let mut connection = Connection::insecure_open(&config.amqp_url)?;
    let channel = connection.open_channel(None)?;
    channel.queue_declare(QUEUE_DETECTIONS, QueueDeclareOptions::default())?;
    let exchange = Exchange::direct(&channel);
    println!("Publishing simulated detections to {}...", QUEUE_DETECTIONS);

    let mut feed = DetectionFeed::new();
    loop {
        for lane in Lane::ALL {
            let reading = feed.next_reading(lane);
            log::debug!("{:?}", reading);
            let payload = serde_json::to_vec(&reading)?;
            exchange.publish(Publish::new(&payload, QUEUE_DETECTIONS))?;
        }
        tokio::select! {
            _ = sleep(Duration::from_millis(1000)) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    connection.close()?;
    Ok(())
}
