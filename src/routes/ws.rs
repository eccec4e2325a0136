//! Live run status over a websocket.
//!
//! Every frame is a JSON object with a `type` field: `status` frames carry the same
//! snapshot as `GET /run/status`, and a final `shutdown` frame precedes the close.
//! The runner flips `Waiting` and `Executing` for every test and records a verdict right
//! after, so a burst of status notifications is collapsed into one frame per test step.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Serialize;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::routes::health::{build_status_response, StatusResponse};
use crate::state::SharedState;

/// Quiet period that closes a burst of status notifications.
const COALESCE_WINDOW: Duration = Duration::from_millis(50);

#[derive(Serialize)]
struct StatusFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    status: StatusResponse,
}

async fn status_frame(state: &SharedState) -> Option<String> {
    let frame = StatusFrame {
        kind: "status",
        status: build_status_response(state).await,
    };
    serde_json::to_string(&frame).ok()
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState) {
    if let Some(json) = status_frame(&state).await {
        if socket.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    let mut rx = state.status_tx.subscribe();
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = socket.send(Message::Text(r#"{"type":"shutdown"}"#.into())).await;
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            result = rx.recv() => {
                match result {
                    // Lagging only means several changes piled up; one snapshot covers them.
                    Ok(()) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        sleep(COALESCE_WINDOW).await;
                        while rx.try_recv().is_ok() {}

                        if let Some(json) = status_frame(&state).await {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    debug!("Status websocket client disconnected");
}
