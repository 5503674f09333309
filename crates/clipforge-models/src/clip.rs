//! Clip records and ranked candidate windows.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::job::JobId;

/// Unique identifier for a clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A half-open time window `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipWindow {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ClipWindow {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    /// True when the window lies within `[0, source_duration]`.
    pub fn within_bounds(&self, source_duration: f64) -> bool {
        self.start_secs >= 0.0 && self.end_secs <= source_duration && self.start_secs < self.end_secs
    }

    /// Clamp the window into `[0, source_duration]`, preserving validity.
    ///
    /// Returns `None` when nothing of the window survives clamping.
    pub fn clamped_to(&self, source_duration: f64) -> Option<ClipWindow> {
        let start = self.start_secs.max(0.0);
        let end = self.end_secs.min(source_duration);
        if end - start <= f64::EPSILON {
            return None;
        }
        Some(ClipWindow {
            start_secs: start,
            end_secs: end,
        })
    }

    /// True when `self` and `other` overlap.
    pub fn overlaps(&self, other: &ClipWindow) -> bool {
        self.start_secs < other.end_secs && other.start_secs < self.end_secs
    }
}

/// Hook category for a selected moment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClipCategory {
    Emotional,
    Educational,
    Controversial,
    Inspirational,
    Humorous,
    Dramatic,
    Surprising,
    #[serde(other)]
    Other,
}

/// A ranked candidate window returned by the selection stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    /// Time window within the source
    pub window: ClipWindow,

    /// Bounded virality estimate (0-100)
    pub virality_score: u8,

    /// Short hook line for the clip
    pub hook: String,

    /// Hook category
    pub category: ClipCategory,

    /// Why the model picked this moment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Candidate {
    /// Ranking order: score desc, then earlier start, then longer window.
    pub fn rank_cmp(&self, other: &Candidate) -> Ordering {
        other
            .virality_score
            .cmp(&self.virality_score)
            .then_with(|| {
                self.window
                    .start_secs
                    .partial_cmp(&other.window.start_secs)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                other
                    .window
                    .duration_secs()
                    .partial_cmp(&self.window.duration_secs())
                    .unwrap_or(Ordering::Equal)
            })
    }
}

/// Outcome of rendering + publishing one clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipOutcome {
    /// Still in the pipeline
    #[default]
    Pending,
    /// Rendered and stored
    Published,
    /// Terminal failure for this window only
    Failed,
}

/// A rendered short-form clip bound to a window within its parent job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    /// Unique clip ID
    pub id: ClipId,

    /// Parent job
    pub job_id: JobId,

    /// Position in the ranked result set (1-indexed)
    pub rank: u32,

    /// Time window within the source
    pub window: ClipWindow,

    /// Bounded virality estimate (0-100)
    pub virality_score: u8,

    /// Hook text
    pub hook: String,

    /// Hook category
    pub category: ClipCategory,

    /// Model reasoning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Opaque locator of the published artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_locator: Option<String>,

    /// Opaque locator of the SRT subtitle track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srt_locator: Option<String>,

    /// Opaque locator of the VTT subtitle track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vtt_locator: Option<String>,

    /// Per-clip outcome
    #[serde(default)]
    pub outcome: ClipOutcome,

    /// Failure detail when `outcome == Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Clip {
    /// Create a pending clip from a ranked candidate.
    pub fn from_candidate(job_id: JobId, rank: u32, candidate: &Candidate) -> Self {
        Self {
            id: ClipId::new(),
            job_id,
            rank,
            window: candidate.window,
            virality_score: candidate.virality_score,
            hook: candidate.hook.clone(),
            category: candidate.category.clone(),
            reasoning: candidate.reasoning.clone(),
            artifact_locator: None,
            srt_locator: None,
            vtt_locator: None,
            outcome: ClipOutcome::Pending,
            failure: None,
            created_at: Utc::now(),
        }
    }

    /// Record a successful publish.
    pub fn published(
        mut self,
        artifact: impl Into<String>,
        srt: impl Into<String>,
        vtt: impl Into<String>,
    ) -> Self {
        self.artifact_locator = Some(artifact.into());
        self.srt_locator = Some(srt.into());
        self.vtt_locator = Some(vtt.into());
        self.outcome = ClipOutcome::Published;
        self
    }

    /// Record a per-clip failure.
    pub fn failed(mut self, detail: impl Into<String>) -> Self {
        self.outcome = ClipOutcome::Failed;
        self.failure = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(start: f64, end: f64, score: u8) -> Candidate {
        Candidate {
            window: ClipWindow::new(start, end),
            virality_score: score,
            hook: "hook".into(),
            category: ClipCategory::Humorous,
            reasoning: None,
        }
    }

    #[test]
    fn window_bounds() {
        let w = ClipWindow::new(10.0, 40.0);
        assert!(w.within_bounds(600.0));
        assert!(!w.within_bounds(30.0));
        assert!((w.duration_secs() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn window_clamping() {
        let w = ClipWindow::new(590.0, 630.0);
        let clamped = w.clamped_to(600.0).unwrap();
        assert_eq!(clamped.end_secs, 600.0);
        assert_eq!(clamped.start_secs, 590.0);

        // fully out of bounds -> gone
        assert!(ClipWindow::new(700.0, 720.0).clamped_to(600.0).is_none());
    }

    #[test]
    fn overlap_detection() {
        let a = ClipWindow::new(0.0, 30.0);
        let b = ClipWindow::new(29.0, 60.0);
        let c = ClipWindow::new(30.0, 60.0);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // half-open
    }

    #[test]
    fn rank_ordering() {
        let mut cands = vec![
            candidate(100.0, 130.0, 80),
            candidate(10.0, 40.0, 90),
            candidate(10.0, 35.0, 90),
            candidate(5.0, 35.0, 90),
        ];
        cands.sort_by(|a, b| a.rank_cmp(b));
        // highest score first; within equal score, earlier start; then longer
        assert_eq!(cands[0].window.start_secs, 5.0);
        assert_eq!(cands[1].window.start_secs, 10.0);
        assert_eq!(cands[1].window.end_secs, 40.0);
        assert_eq!(cands[2].window.end_secs, 35.0);
        assert_eq!(cands[3].virality_score, 80);
    }
}
