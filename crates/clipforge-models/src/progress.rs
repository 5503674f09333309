//! Progress messages and the poller status snapshot.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobStatus, ReasonCode, Stage};

/// A progress event published on every job transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// Job entered a new stage
    Stage { stage: Stage, percent: u8 },
    /// Free-form log line for the job feed
    Log { message: String },
    /// One clip finished rendering and publishing
    ClipPublished { rank: u32, total: u32 },
    /// One clip failed; siblings proceed
    ClipFailed { rank: u32, detail: String },
    /// Terminal success (possibly with per-clip warnings)
    Done { status: JobStatus },
    /// Terminal failure
    Error {
        reason_code: ReasonCode,
        message: String,
    },
}

/// Result summary returned by `getStatus` once a job is terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusSummary {
    /// Clips published successfully
    pub clips_published: u32,
    /// Clips that failed terminally
    pub clips_failed: u32,
    /// Per-clip failure details (rank, message)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<(u32, String)>,
}

/// Cached job status for fast polling queries.
///
/// Stored in Redis with a TTL; a snapshot of job state without a round
/// trip through the persistence seam. Progress is monotonic: `merge`
/// never lowers `progress` or resurrects a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    #[serde(default)]
    pub summary: StatusSummary,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last worker heartbeat while processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Monotonically increasing event sequence
    #[serde(default)]
    pub event_seq: u64,
}

impl JobStatusSnapshot {
    pub fn new(job_id: JobId, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            owner_id: owner_id.into(),
            status: JobStatus::Queued,
            progress: 0,
            stage: None,
            message: None,
            reason_code: None,
            summary: StatusSummary::default(),
            started_at: now,
            updated_at: now,
            last_heartbeat: None,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition if legal; illegal transitions are ignored
    /// so replayed or out-of-order events cannot corrupt the snapshot.
    pub fn set_status(&mut self, status: JobStatus) -> bool {
        if self.status == status {
            return true;
        }
        if !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        self.touch();
        true
    }

    /// Raise progress; never moves backwards.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
        self.touch();
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = Some(stage);
        self.set_progress(stage.entry_progress());
    }

    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Worker heartbeat staleness check.
    ///
    /// Stale when processing and the last heartbeat is older than
    /// `stale_threshold_secs`, or when no heartbeat arrived within
    /// `grace_period_secs` of the start.
    pub fn is_stale(&self, stale_threshold_secs: i64, grace_period_secs: i64) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let now = Utc::now();
        match self.last_heartbeat {
            Some(hb) => (now - hb).num_seconds() > stale_threshold_secs,
            None => (now - self.started_at).num_seconds() > grace_period_secs,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> JobStatusSnapshot {
        JobStatusSnapshot::new(JobId::new(), "user-1")
    }

    #[test]
    fn illegal_transitions_are_ignored() {
        let mut s = snapshot();
        assert!(!s.set_status(JobStatus::Completed)); // queued -> completed forbidden
        assert!(s.set_status(JobStatus::Processing));
        assert!(s.set_status(JobStatus::Completed));
        assert!(!s.set_status(JobStatus::Processing)); // terminal is final
        assert_eq!(s.status, JobStatus::Completed);
    }

    #[test]
    fn progress_never_regresses() {
        let mut s = snapshot();
        s.set_progress(60);
        s.set_progress(30);
        assert_eq!(s.progress, 60);
        s.set_progress(200);
        assert_eq!(s.progress, 100);
    }

    #[test]
    fn stale_detection_uses_grace_then_heartbeat() {
        let mut s = snapshot();
        s.set_status(JobStatus::Processing);
        assert!(!s.is_stale(60, 120));

        s.started_at = Utc::now() - chrono::Duration::seconds(300);
        assert!(s.is_stale(60, 120));

        s.record_heartbeat();
        assert!(!s.is_stale(60, 120));
    }

    #[test]
    fn event_seq_increases_on_updates() {
        let mut s = snapshot();
        let seq0 = s.event_seq;
        s.set_progress(10);
        s.set_status(JobStatus::Processing);
        assert!(s.event_seq > seq0);
    }
}
