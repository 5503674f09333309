//! Exclusive per-job leases.
//!
//! A lease is a `SET NX PX` key holding a per-worker token. Renewal and
//! release compare the token server-side, so a worker that lost its lease
//! (TTL expiry, reclaim by another worker) can never stomp the new holder.

use std::time::Duration;

use redis::Script;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use clipforge_models::JobId;

use crate::error::{QueueError, QueueResult};
use crate::queue::JobQueue;

const RENEW_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// An exclusive, time-bounded hold on a job.
pub struct JobLease {
    client: redis::Client,
    key: String,
    token: String,
    job_id: JobId,
    ttl: Duration,
}

impl JobLease {
    /// Try to acquire the lease for a job.
    ///
    /// Returns `LeaseHeld` when another worker already owns it.
    pub async fn acquire(queue: &JobQueue, job_id: &JobId, worker_id: &str) -> QueueResult<Self> {
        let client = queue.redis_client().clone();
        let key = format!("{}:lease:{}", queue.config().key_prefix, job_id);
        let token = format!("{worker_id}:{}", Uuid::new_v4());
        let ttl = queue.config().lease_ttl;

        let mut conn = client.get_multiplexed_async_connection().await?;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        if acquired.is_none() {
            return Err(QueueError::LeaseHeld(job_id.to_string()));
        }

        debug!(%job_id, %worker_id, "Acquired job lease");
        Ok(Self {
            client,
            key,
            token,
            job_id: job_id.clone(),
            ttl,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Renew the lease TTL. Fails with `LeaseLost` if the token no longer
    /// matches (expired and taken over).
    pub async fn renew(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let renewed: i64 = Script::new(RENEW_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .arg(self.ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        if renewed == 0 {
            return Err(QueueError::LeaseLost(self.job_id.to_string()));
        }
        Ok(())
    }

    /// Release the lease if still held.
    pub async fn release(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;
        debug!(job_id = %self.job_id, "Released job lease");
        Ok(())
    }
}

/// Background renewal for a held lease.
///
/// Renews at a third of the TTL; flips the `lost` watch channel when a
/// renewal fails so the pipeline can abandon the job instead of racing the
/// replacement worker.
pub struct LeaseKeeper {
    handle: tokio::task::JoinHandle<()>,
    lost_rx: watch::Receiver<bool>,
}

impl LeaseKeeper {
    /// Spawn the renewal task for a lease.
    pub fn spawn(lease: std::sync::Arc<JobLease>) -> Self {
        let (lost_tx, lost_rx) = watch::channel(false);
        let interval = lease.ttl / 3;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = lease.renew().await {
                    warn!(job_id = %lease.job_id(), error = %e, "Lease renewal failed");
                    let _ = lost_tx.send(true);
                    break;
                }
            }
        });

        Self { handle, lost_rx }
    }

    /// Watch channel flipped to `true` when the lease is lost.
    pub fn lost(&self) -> watch::Receiver<bool> {
        self.lost_rx.clone()
    }

    /// Stop renewing (lease release is the caller's responsibility).
    pub fn stop(self) {
        self.handle.abort();
    }
}
