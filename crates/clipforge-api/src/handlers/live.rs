//! Live signal event ingest.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use clipforge_models::{SignalEvent, SignalPayload, StreamId};

use crate::error::ApiResult;
use crate::state::AppState;

/// One event from a stream relay.
///
/// ```json
/// {"stream_ts_secs": 123.4, "type": "audio_peak", "rms": 0.8}
/// {"stream_ts_secs": 124.0, "type": "chat_spike", "count": 42}
/// ```
#[derive(Debug, Deserialize)]
pub struct SignalEventBody {
    pub stream_ts_secs: f64,
    #[serde(flatten)]
    pub payload: SignalPayload,
}

/// `POST /live/:stream_id/events`: fire-and-forget. The event goes to the
/// router's bounded channel and the relay gets 202 regardless of what
/// detection later decides.
pub async fn publish_signal_event(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(body): Json<SignalEventBody>,
) -> ApiResult<StatusCode> {
    let event = SignalEvent::new(
        StreamId::new(stream_id),
        body.stream_ts_secs,
        body.payload,
    );
    state.live.publish(event);
    Ok(StatusCode::ACCEPTED)
}
