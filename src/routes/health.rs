use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::{RunPhase, RunState, SharedState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub run: RunState,
    pub verdicts: VerdictCounts,
    pub harness: HarnessInfo,
}

#[derive(Serialize)]
pub struct VerdictCounts {
    pub recorded: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Serialize)]
pub struct HarnessInfo {
    pub version: String,
    pub pacing_ms: u64,
    pub test_timeout_secs: Option<u64>,
}

/// Collapse the run phase into the coarse status shown to clients.
/// This is a pure function extracted for testability.
pub fn determine_overall_status(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Idle => "idle",
        RunPhase::SettingUp => "setting_up",
        RunPhase::Draining | RunPhase::Waiting | RunPhase::Executing => "running",
        RunPhase::Finished => "finished",
        RunPhase::SetupFailed => "setup_failed",
    }
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let phase = state.run.read().await.phase;
    Json(HealthResponse {
        status: determine_overall_status(phase),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(build_status_response(&state).await)
}

pub async fn build_status_response(state: &SharedState) -> StatusResponse {
    let run = state.run.read().await.clone();
    let (passed, failed) = state.verdicts.counts().await;

    StatusResponse {
        status: determine_overall_status(run.phase),
        run,
        verdicts: VerdictCounts {
            recorded: passed + failed,
            passed,
            failed,
        },
        harness: HarnessInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pacing_ms: state.config.pacing.as_millis() as u64,
            test_timeout_secs: state.config.test_timeout.map(|t| t.as_secs()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_before_start() {
        assert_eq!(determine_overall_status(RunPhase::Idle), "idle");
    }

    #[test]
    fn test_running_covers_every_drain_phase() {
        assert_eq!(determine_overall_status(RunPhase::Draining), "running");
        assert_eq!(determine_overall_status(RunPhase::Waiting), "running");
        assert_eq!(determine_overall_status(RunPhase::Executing), "running");
    }

    #[test]
    fn test_terminal_statuses() {
        assert_eq!(determine_overall_status(RunPhase::Finished), "finished");
        assert_eq!(
            determine_overall_status(RunPhase::SetupFailed),
            "setup_failed"
        );
    }

    #[test]
    fn test_status_response_serializes_to_json() {
        let response = StatusResponse {
            status: "running",
            run: RunState {
                phase: RunPhase::Waiting,
                total_tests: 7,
                current_index: 2,
                ..RunState::new()
            },
            verdicts: VerdictCounts {
                recorded: 2,
                passed: 1,
                failed: 1,
            },
            harness: HarnessInfo {
                version: "0.1.0".to_string(),
                pacing_ms: 1000,
                test_timeout_secs: None,
            },
        };

        let json = serde_json::to_string(&response).expect("should serialize");
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"phase\":\"waiting\""));
        assert!(json.contains("\"total_tests\":7"));
        assert!(json.contains("\"pacing_ms\":1000"));
    }
}
