//! Durable job queue over Redis Streams.
//!
//! One stream per priority class under a shared prefix; consumption drains
//! the interactive stream before the batch stream, FIFO within each.

use std::time::Duration;

use metrics::counter;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use clipforge_models::{JobId, QueueClass};

use crate::envelope::JobEnvelope;
use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for stream and key names
    pub key_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Max automatic retries before the DLQ
    pub max_retries: u32,
    /// Lease duration granted to a worker per heartbeat
    pub lease_ttl: Duration,
    /// How long enqueue dedup keys live
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "clipforge".to_string(),
            consumer_group: "clipforge:workers".to_string(),
            max_retries: 3,
            lease_ttl: Duration::from_secs(120),
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            lease_ttl: Duration::from_secs(
                std::env::var("QUEUE_LEASE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            dedup_ttl: Duration::from_secs(
                std::env::var("QUEUE_DEDUP_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }

    /// Stream name for a priority class.
    pub fn stream_name(&self, class: QueueClass) -> String {
        format!("{}:jobs:{}", self.key_prefix, class)
    }

    /// Dead letter stream name.
    pub fn dlq_stream_name(&self) -> String {
        format!("{}:dlq", self.key_prefix)
    }

    fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("{}:dedup:{}", self.key_prefix, idempotency_key)
    }

    fn retry_key(&self, job_id: &JobId) -> String {
        format!("{}:retry:{}", self.key_prefix, job_id)
    }

    fn cancel_key(&self, job_id: &JobId) -> String {
        format!("{}:cancel:{}", self.key_prefix, job_id)
    }
}

/// A job delivered to a worker, with the stream bookkeeping needed to ack it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Stream entry id
    pub message_id: String,
    /// Priority class the entry came from
    pub class: QueueClass,
    /// The job envelope
    pub envelope: JobEnvelope,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub(crate) fn redis_client(&self) -> &redis::Client {
        &self.client
    }

    /// Initialize the queue (create consumer groups if missing).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for class in [QueueClass::Interactive, QueueClass::Batch] {
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(self.config.stream_name(class))
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!(class = %class, "Created consumer group"),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(class = %class, "Consumer group already exists");
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Enqueue a job envelope onto its priority stream.
    ///
    /// Rejects duplicates via a TTL'd idempotency key shared by the
    /// interactive and live paths.
    pub async fn enqueue(&self, envelope: &JobEnvelope) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let idempotency_key = envelope.idempotency_key();
        let dedup_key = self.config.dedup_key(&idempotency_key);

        // SET NX EX is the dedup check and the claim in one step.
        let claimed: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(envelope.job_id.as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !claimed {
            warn!(key = %idempotency_key, "Duplicate job rejected");
            counter!("queue_enqueue_duplicates").increment(1);
            return Err(QueueError::duplicate(idempotency_key));
        }

        let payload = serde_json::to_string(envelope)?;
        let message_id: String = redis::cmd("XADD")
            .arg(self.config.stream_name(envelope.queue_class()))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        counter!("queue_enqueued", "class" => envelope.queue_class().as_str()).increment(1);
        info!(job_id = %envelope.job_id, %message_id, class = %envelope.queue_class(), "Enqueued job");

        Ok(message_id)
    }

    /// Put an envelope back on its stream for another attempt.
    ///
    /// Unlike `enqueue`, no dedup check applies: the original submission
    /// already owns the dedup key and retries must never collide with it.
    pub async fn requeue(&self, envelope: &JobEnvelope) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(envelope)?;
        let message_id: String = redis::cmd("XADD")
            .arg(self.config.stream_name(envelope.queue_class()))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(envelope.idempotency_key())
            .query_async(&mut conn)
            .await?;

        counter!("queue_requeued").increment(1);
        info!(job_id = %envelope.job_id, %message_id, "Requeued job");
        Ok(message_id)
    }

    /// Consume new jobs, draining interactive before batch.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        // Interactive is polled with the full block; batch only gets a
        // short follow-up read so an idle interactive stream cannot starve it.
        let interactive = self
            .read_stream(QueueClass::Interactive, consumer_name, block_ms, count)
            .await?;
        if !interactive.is_empty() {
            return Ok(interactive);
        }
        self.read_stream(QueueClass::Batch, consumer_name, 10, count)
            .await
    }

    async fn read_stream(
        &self,
        class: QueueClass,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.config.stream_name(class))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                match Self::decode_entry(&entry) {
                    Some(envelope) => deliveries.push(Delivery {
                        message_id: entry.id.clone(),
                        class,
                        envelope,
                    }),
                    None => {
                        warn!(message_id = %entry.id, "Dropping malformed queue entry");
                        self.ack(class, &entry.id).await.ok();
                    }
                }
            }
        }

        Ok(deliveries)
    }

    fn decode_entry(entry: &redis::streams::StreamId) -> Option<JobEnvelope> {
        match entry.map.get("job") {
            Some(redis::Value::BulkString(payload)) => serde_json::from_slice(payload).ok(),
            _ => None,
        }
    }

    /// Claim entries whose consumer stopped heartbeating (crashed workers).
    ///
    /// Entries idle longer than `min_idle` are redelivered to this consumer;
    /// the caller decides, via the retry counter, whether to run or DLQ them.
    pub async fn claim_stale(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut deliveries = Vec::new();

        for class in [QueueClass::Interactive, QueueClass::Batch] {
            let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
                .arg(self.config.stream_name(class))
                .arg(&self.config.consumer_group)
                .arg(consumer_name)
                .arg(min_idle.as_millis() as u64)
                .arg("0-0")
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;

            for entry in reply.claimed {
                match Self::decode_entry(&entry) {
                    Some(envelope) => {
                        info!(job_id = %envelope.job_id, "Claimed stale job from crashed worker");
                        deliveries.push(Delivery {
                            message_id: entry.id.clone(),
                            class,
                            envelope,
                        });
                    }
                    None => {
                        self.ack(class, &entry.id).await.ok();
                    }
                }
            }
        }

        Ok(deliveries)
    }

    /// Acknowledge and delete a processed entry.
    pub async fn ack(&self, class: QueueClass, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.config.stream_name(class);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(%message_id, "Acknowledged queue entry");
        Ok(())
    }

    /// Move an entry to the dead letter stream and ack the original.
    pub async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&delivery.envelope)?;
        redis::cmd("XADD")
            .arg(self.config.dlq_stream_name())
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery.class, &delivery.message_id).await?;

        counter!("queue_dead_lettered").increment(1);
        warn!(job_id = %delivery.envelope.job_id, error, "Moved job to DLQ");
        Ok(())
    }

    /// Get the retry count recorded for a job.
    pub async fn retry_count(&self, job_id: &JobId) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: Option<u32> = conn.get(self.config.retry_key(job_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment the retry count for a job (24h TTL).
    pub async fn increment_retry(&self, job_id: &JobId) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.config.retry_key(job_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86_400).await?;
        Ok(count)
    }

    /// Drop the enqueue dedup key so the same content can be resubmitted.
    pub async fn clear_dedup(&self, envelope: &JobEnvelope) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.config.dedup_key(&envelope.idempotency_key()))
            .await?;
        Ok(())
    }

    /// Flag a job for cancellation; workers check between stages.
    pub async fn request_cancel(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(self.config.cancel_key(job_id), "1", 86_400)
            .await?;
        info!(%job_id, "Cancellation requested");
        Ok(())
    }

    /// Check whether cancellation was requested.
    pub async fn is_cancel_requested(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(self.config.cancel_key(job_id)).await?;
        Ok(exists)
    }

    /// Queue depth for a priority class.
    pub async fn len(&self, class: QueueClass) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.config.stream_name(class)).await?;
        Ok(len)
    }

    /// Dead letter queue depth.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.config.dlq_stream_name()).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_names_are_per_class() {
        let config = QueueConfig::default();
        assert_eq!(
            config.stream_name(QueueClass::Interactive),
            "clipforge:jobs:interactive"
        );
        assert_eq!(config.stream_name(QueueClass::Batch), "clipforge:jobs:batch");
        assert_eq!(config.dlq_stream_name(), "clipforge:dlq");
    }

    #[test]
    fn key_layout_is_prefixed() {
        let config = QueueConfig::default();
        let id = JobId::from_string("j-1");
        assert_eq!(config.retry_key(&id), "clipforge:retry:j-1");
        assert_eq!(config.cancel_key(&id), "clipforge:cancel:j-1");
        assert_eq!(config.dedup_key("abc"), "clipforge:dedup:abc");
    }
}
