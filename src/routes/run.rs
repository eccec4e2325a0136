use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::error::HarnessError;
use crate::mode::{self, RunMode, StartParams};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct AuthRunRequest {
    pub app_id: String,
}

/// POST /run/auth: join the sender's existing session and run the visible tests.
pub async fn run_auth(
    State(state): State<SharedState>,
    Json(body): Json<AuthRunRequest>,
) -> Result<(StatusCode, Json<Value>), HarnessError> {
    start_run(&state, RunMode::Auth, StartParams::auth(body.app_id)).await
}

/// POST /run/no-auth: open a fresh session, load the given media, run the visible tests.
pub async fn run_no_auth(
    State(state): State<SharedState>,
    Json(params): Json<StartParams>,
) -> Result<(StatusCode, Json<Value>), HarnessError> {
    start_run(&state, RunMode::NoAuth, params).await
}

async fn start_run(
    state: &SharedState,
    mode: RunMode,
    params: StartParams,
) -> Result<(StatusCode, Json<Value>), HarnessError> {
    let handle = mode::start(state, mode, params).await?;
    info!("Accepted {} run {}", mode.as_str(), handle.run_id);

    // The handle is dropped here; the run keeps going on its own task and reports
    // through /run/status, /verdicts and the streams.
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok": true,
            "run_id": handle.run_id,
            "mode": mode,
            "message": "Setup started. Tests run once the session is ready",
        })),
    ))
}

/// GET /verdicts: every verdict recorded so far, in run order.
pub async fn verdicts(State(state): State<SharedState>) -> Json<Value> {
    let verdicts = state.verdicts.all().await;
    let passed = verdicts.iter().filter(|v| v.passed).count();
    Json(json!({
        "total": verdicts.len(),
        "passed": passed,
        "failed": verdicts.len() - passed,
        "verdicts": verdicts,
    }))
}

/// GET /verdicts/stream: SSE stream of verdicts as they are recorded.
pub async fn verdict_stream(
    State(state): State<SharedState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.verdicts.subscribe());

    let event_stream = stream.filter_map(|result| match result {
        Ok(verdict) => {
            let data = serde_json::to_string(&verdict).unwrap_or_default();
            Some(Ok(Event::default().event("verdict").data(data)))
        }
        Err(_) => None,
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
