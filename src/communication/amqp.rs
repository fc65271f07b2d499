use amiquip::{
    Channel, Connection, ConsumerMessage, ConsumerOptions, Exchange, Publish, QueueDeclareOptions,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::{ControlError, ControlResult};
use crate::global_variables::QUEUE_SIGNAL_STATUS;
use crate::shared_data::IntersectionStatus;

/// Anything that can take a status snapshot after each tick.
pub trait StatusSink {
    fn publish(&mut self, status: &IntersectionStatus) -> ControlResult<()>;
}

/// Consumes JSON messages from `queue` and forwards each decoded one into `tx`.
///
/// Runs on the blocking pool since amiquip consumers are synchronous.
/// Messages that do not decode are acked and dropped with a warning. Returns
/// once the receiving side of `tx` is gone or the consumer is cancelled.
pub async fn listen_queue<T>(
    amqp_url: String,
    queue: &'static str,
    tx: mpsc::Sender<T>,
) -> ControlResult<()>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> ControlResult<()> {
        let mut connection = Connection::insecure_open(&amqp_url)?;
        let channel = connection.open_channel(None)?;
        let queue_handle = channel.queue_declare(queue, QueueDeclareOptions::default())?;
        let consumer = queue_handle.consume(ConsumerOptions::default())?;
        log::info!("Listening on queue {}", queue);
        for message in consumer.receiver() {
            match message {
                ConsumerMessage::Delivery(delivery) => {
                    let decoded = serde_json::from_slice::<T>(&delivery.body);
                    consumer.ack(delivery)?;
                    match decoded {
                        Ok(value) => {
                            if tx.blocking_send(value).is_err() {
                                log::info!("Receiver for {} dropped, stopping consumer", queue);
                                break;
                            }
                        }
                        Err(e) => log::warn!("Dropping malformed message on {}: {}", queue, e),
                    }
                }
                other => {
                    log::info!("Consumer on {} ended: {:?}", queue, other);
                    break;
                }
            }
        }
        connection.close()?;
        Ok(())
    })
    .await
    .map_err(|e| ControlError::Sink(format!("listener for {} panicked: {}", queue, e)))?
}

/// Publishes every status snapshot as JSON on the status queue.
pub struct AmqpStatusPublisher {
    // kept open for the lifetime of the channel
    _connection: Connection,
    channel: Channel,
    queue: String,
}

impl AmqpStatusPublisher {
    pub fn connect(amqp_url: &str) -> ControlResult<Self> {
        Self::connect_to(amqp_url, QUEUE_SIGNAL_STATUS)
    }

    pub fn connect_to(amqp_url: &str, queue: &str) -> ControlResult<Self> {
        let mut connection = Connection::insecure_open(amqp_url)?;
        let channel = connection.open_channel(None)?;
        channel.queue_declare(queue, QueueDeclareOptions::default())?;
        log::info!("Publishing status snapshots to {}", queue);
        Ok(Self {
            _connection: connection,
            channel,
            queue: queue.to_string(),
        })
    }
}

impl StatusSink for AmqpStatusPublisher {
    fn publish(&mut self, status: &IntersectionStatus) -> ControlResult<()> {
        let payload = serde_json::to_vec(status)?;
        Exchange::direct(&self.channel).publish(Publish::new(&payload, self.queue.as_str()))?;
        Ok(())
    }
}
