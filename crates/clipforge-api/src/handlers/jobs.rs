//! Job submission, status, cancellation, and clip listing.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use clipforge_models::{
    AspectRatio, CaptionStyle, Clip, JobId, JobParams, JobRecord, JobStatus, JobStatusSnapshot,
    QueueClass, ReasonCode, SourceDescriptor, Stage, StatusSummary,
};
use clipforge_queue::JobEnvelope;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Caller identity arrives from the CRUD/auth layer as a trusted header.
pub const OWNER_HEADER: &str = "x-owner-id";

fn owner_from(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("missing owner header"))
}

/// Submitted source descriptor.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitSource {
    Upload { path: String },
    Url { url: String },
}

/// Job submission body.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    pub source: SubmitSource,

    #[serde(default = "default_clip_count")]
    #[validate(range(min = 1, max = 10))]
    pub clip_count: u32,

    #[serde(default = "default_target_duration")]
    #[validate(range(min = 10, max = 120))]
    pub target_duration_secs: u32,

    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    #[serde(default)]
    pub caption_style: CaptionStyle,

    #[serde(default)]
    pub queue_class: QueueClass,

    #[validate(length(max = 2000))]
    pub prompt_instructions: Option<String>,
}

fn default_clip_count() -> u32 {
    5
}

fn default_target_duration() -> u32 {
    30
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// `POST /jobs`: validate, persist, enqueue, return. Never blocks on
/// pipeline work.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let owner = owner_from(&headers)?;
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let source = match request.source {
        SubmitSource::Upload { path } => SourceDescriptor::Upload { path },
        SubmitSource::Url { url } => {
            url::check(&url)?;
            SourceDescriptor::Url { url }
        }
    };
    let params = JobParams {
        clip_count: request.clip_count,
        target_duration_secs: request.target_duration_secs,
        aspect_ratio: request.aspect_ratio,
        caption_style: request.caption_style,
        queue_class: request.queue_class,
        prompt_instructions: request.prompt_instructions,
    };

    let record = JobRecord::new(owner.clone(), source, params);
    state.jobs.create_job(&record).await?;

    let envelope = JobEnvelope::from_record(&record);
    state.queue.enqueue(&envelope).await?;

    state
        .status
        .put(&JobStatusSnapshot::new(record.id.clone(), owner))
        .await
        .ok();

    info!(job_id = %record.id, "Job submitted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse { job_id: record.id }),
    ))
}

/// Status payload for pollers.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    pub result_summary: StatusSummary,
    pub retry_count: u32,
}

/// `GET /jobs/:id/status`: snapshot first, record as fallback. Reads are
/// idempotent; progress only ever moves forward.
pub async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let owner = owner_from(&headers)?;
    let job_id = JobId::from_string(job_id);

    let record = state
        .jobs
        .get_job(&job_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if record.owner_id != owner {
        return Err(ApiError::Forbidden);
    }

    let snapshot = state.status.get(&job_id).await.ok().flatten();
    let response = match snapshot {
        Some(snapshot) => StatusResponse {
            job_id,
            status: snapshot.status,
            progress: snapshot.progress,
            stage: snapshot.stage,
            message: snapshot.message,
            reason_code: snapshot.reason_code,
            result_summary: snapshot.summary,
            retry_count: record.retry_count,
        },
        None => StatusResponse {
            job_id,
            status: record.status,
            progress: record.progress,
            stage: record.stage,
            message: record.message,
            reason_code: record.reason_code,
            result_summary: StatusSummary::default(),
            retry_count: record.retry_count,
        },
    };
    Ok(Json(response))
}

/// `POST /jobs/:id/cancel`: flag only; the worker honors it between
/// stages and releases its lease.
pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let owner = owner_from(&headers)?;
    let job_id = JobId::from_string(job_id);

    let record = state
        .jobs
        .get_job(&job_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if record.owner_id != owner {
        return Err(ApiError::Forbidden);
    }
    if record.status.is_terminal() {
        return Err(ApiError::bad_request("job already finished"));
    }

    state.jobs.request_cancel(&job_id).await?;
    state.queue.request_cancel(&job_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /jobs/:id/clips`: the clip set, ordered by rank.
pub async fn list_clips(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Vec<Clip>>> {
    let owner = owner_from(&headers)?;
    let job_id = JobId::from_string(job_id);

    let record = state
        .jobs
        .get_job(&job_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if record.owner_id != owner {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(state.clips.list_clips(&job_id).await?))
}

mod url {
    use crate::error::{ApiError, ApiResult};

    pub fn check(raw: &str) -> ApiResult<()> {
        let parsed = ::url::Url::parse(raw)
            .map_err(|e| ApiError::bad_request(format!("invalid url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::bad_request("only http(s) sources are accepted"));
        }
        Ok(())
    }
}
