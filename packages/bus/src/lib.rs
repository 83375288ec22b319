//! Partitioned message bus used to hand jobs to workers.
//!
//! Goal:
//! - Records with the same key land on the same partition, in publish order
//! - Each partition is consumed by exactly one consumer
//! - Publishing applies backpressure once a partition is full
//!
//! The bus lives in process; each partition is a bounded `tokio::sync::mpsc`
//! channel with its own offset counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use queue_core::{DispatchError, DispatchPublisher, Job, encode_dispatch};
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("invalid bus config: {0}")]
    InvalidConfig(String),

    #[error("partition {0} does not exist")]
    UnknownPartition(usize),

    #[error("partition {0} already has a consumer")]
    ConsumerTaken(usize),

    #[error("topic {0} is closed")]
    Closed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub topic: String,
    pub partitions: usize,
    /// Records buffered per partition before publishers wait.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            topic: "job-dispatch".to_string(),
            partitions: 4,
            capacity: 1024,
        }
    }
}

impl BusConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), BusError> {
        if self.topic.trim().is_empty() {
            return Err(BusError::InvalidConfig("topic must not be empty".to_string()));
        }
        if self.partitions == 0 {
            return Err(BusError::InvalidConfig(
                "partitions must be at least 1".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(BusError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A record as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    pub key: String,
    pub payload: Bytes,
    pub partition: usize,
    pub offset: u64,
}

/// Where a published record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: usize,
    pub offset: u64,
}

struct PartitionWriter {
    sender: mpsc::Sender<BusRecord>,
    next_offset: u64,
}

struct Partition {
    writer: Mutex<PartitionWriter>,
    receiver: Mutex<Option<mpsc::Receiver<BusRecord>>>,
}

pub struct MessageBus {
    topic: String,
    partitions: Vec<Partition>,
    closed: AtomicBool,
}

impl MessageBus {
    pub fn new(cfg: BusConfig) -> Result<Self, BusError> {
        cfg.validate()?;

        let partitions = (0..cfg.partitions)
            .map(|_| {
                let (sender, receiver) = mpsc::channel(cfg.capacity);
                Partition {
                    writer: Mutex::new(PartitionWriter {
                        sender,
                        next_offset: 0,
                    }),
                    receiver: Mutex::new(Some(receiver)),
                }
            })
            .collect();

        Ok(Self {
            topic: cfg.topic,
            partitions,
            closed: AtomicBool::new(false),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition a key maps to. Stable for the lifetime of the bus.
    pub fn partition_for(&self, key: &str) -> usize {
        (fnv1a(key.as_bytes()) % self.partitions.len() as u64) as usize
    }

    /// Append a record to the key's partition, waiting while it is full.
    pub async fn publish(&self, key: &str, payload: Bytes) -> Result<Delivery, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed(self.topic.clone()));
        }

        let partition = self.partition_for(key);
        let mut writer = self.partitions[partition].writer.lock().await;
        let offset = writer.next_offset;

        writer
            .sender
            .send(BusRecord {
                key: key.to_string(),
                payload,
                partition,
                offset,
            })
            .await
            .map_err(|_| BusError::Closed(self.topic.clone()))?;
        writer.next_offset += 1;

        tracing::trace!(topic = %self.topic, partition, offset, key, "Published record");
        Ok(Delivery { partition, offset })
    }

    /// Take the consumer for `partition`. Each partition has exactly one.
    pub async fn consumer(&self, partition: usize) -> Result<PartitionConsumer, BusError> {
        let slot = self
            .partitions
            .get(partition)
            .ok_or(BusError::UnknownPartition(partition))?;
        let receiver = slot
            .receiver
            .lock()
            .await
            .take()
            .ok_or(BusError::ConsumerTaken(partition))?;

        Ok(PartitionConsumer {
            partition,
            receiver,
        })
    }

    /// Reject further publishes. Already buffered records stay readable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub struct PartitionConsumer {
    partition: usize,
    receiver: mpsc::Receiver<BusRecord>,
}

impl PartitionConsumer {
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Next record in offset order. `None` once the bus is dropped and drained.
    pub async fn recv(&mut self) -> Option<BusRecord> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BusRecord> {
        self.receiver.try_recv().ok()
    }
}

/// [`DispatchPublisher`] writing encoded dispatch messages to a [`MessageBus`],
/// keyed by job id.
#[derive(Clone)]
pub struct BusPublisher {
    bus: Arc<MessageBus>,
}

impl BusPublisher {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }
}

impl DispatchPublisher for BusPublisher {
    async fn dispatch(&self, job: &Job) -> Result<(), DispatchError> {
        let bytes = encode_dispatch(job)?;
        let delivery = self
            .bus
            .publish(&job.id.to_string(), Bytes::from(bytes))
            .await
            .map_err(|e| match e {
                BusError::Closed(topic) => DispatchError::Closed(topic),
                other => DispatchError::Publish(other.to_string()),
            })?;

        tracing::debug!(
            job_id = %job.id,
            topic = %self.bus.topic(),
            partition = delivery.partition,
            offset = delivery.offset,
            "Dispatched job"
        );
        Ok(())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::{JobId, JobType, decode_dispatch};
    use serde_json::json;

    fn bus(partitions: usize, capacity: usize) -> Result<Arc<MessageBus>, BusError> {
        Ok(Arc::new(MessageBus::new(
            BusConfig::new("test-dispatch")
                .with_partitions(partitions)
                .with_capacity(capacity),
        )?))
    }

    #[tokio::test]
    async fn same_key_keeps_publish_order() -> Result<(), BusError> {
        let bus = bus(4, 16)?;
        let partition = bus.partition_for("job-a");
        let mut consumer = bus.consumer(partition).await?;

        for n in 0..5u8 {
            let delivery = bus.publish("job-a", Bytes::from(vec![n])).await?;
            assert_eq!(delivery.partition, partition);
            assert_eq!(delivery.offset, u64::from(n));
        }

        for n in 0..5u8 {
            let record = consumer.recv().await.ok_or(BusError::Closed("test".into()))?;
            assert_eq!(record.key, "job-a");
            assert_eq!(record.payload.as_ref(), &[n]);
            assert_eq!(record.offset, u64::from(n));
        }
        assert!(consumer.try_recv().is_none());
        Ok(())
    }

    #[test]
    fn partition_is_stable_per_key() -> Result<(), BusError> {
        let bus = MessageBus::new(BusConfig::default().with_partitions(8))?;
        for key in ["a", "b", "01HZX3", "job-42"] {
            let first = bus.partition_for(key);
            assert!(first < 8);
            assert_eq!(bus.partition_for(key), first);
        }
        Ok(())
    }

    #[tokio::test]
    async fn consumer_can_be_taken_once() -> Result<(), BusError> {
        let bus = bus(2, 4)?;
        let _consumer = bus.consumer(1).await?;
        assert!(matches!(bus.consumer(1).await, Err(BusError::ConsumerTaken(1))));
        assert!(matches!(bus.consumer(2).await, Err(BusError::UnknownPartition(2))));
        Ok(())
    }

    #[tokio::test]
    async fn closed_bus_rejects_publish() -> Result<(), BusError> {
        let bus = bus(1, 4)?;
        bus.close();
        assert!(bus.is_closed());
        assert!(matches!(
            bus.publish("k", Bytes::from_static(b"x")).await,
            Err(BusError::Closed(_))
        ));
        Ok(())
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(MessageBus::new(BusConfig::default().with_partitions(0)).is_err());
        assert!(MessageBus::new(BusConfig::default().with_capacity(0)).is_err());
        assert!(MessageBus::new(BusConfig::new("  ")).is_err());
    }

    #[tokio::test]
    async fn publisher_writes_decodable_dispatch_messages() -> Result<(), Box<dyn std::error::Error>> {
        let bus = bus(3, 8)?;
        let publisher = BusPublisher::new(bus.clone());
        let job = Job::new(JobId::new(), JobType::Sleep, json!({ "duration_ms": 3000 }));

        publisher.dispatch(&job).await?;

        let mut consumer = bus.consumer(bus.partition_for(&job.id.to_string())).await?;
        let record = consumer.try_recv().ok_or("no record published")?;
        assert_eq!(record.key, job.id.to_string());

        let message = decode_dispatch(&record.payload)?;
        assert_eq!(message.job_id, job.id);
        assert_eq!(message.job_type, JobType::Sleep);
        assert_eq!(message.payload, r#"{"duration_ms":3000}"#);
        assert_eq!(message.created_at, job.created_at.timestamp());
        Ok(())
    }

    #[tokio::test]
    async fn publisher_reports_closed_topic() -> Result<(), BusError> {
        let bus = bus(1, 1)?;
        bus.close();
        let publisher = BusPublisher::new(bus);
        let job = Job::new(JobId::new(), JobType::HttpGet, json!({}));

        assert!(matches!(
            publisher.dispatch(&job).await,
            Err(DispatchError::Closed(_))
        ));
        Ok(())
    }
}
