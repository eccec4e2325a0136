use crate::config::HarnessConfig;
use crate::log_capture::LogState;
use crate::mode::RunMode;
use crate::provider::SessionProvider;
use crate::registry::{TestId, TestMarkup};
use crate::verdict::VerdictLog;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

pub type SharedState = Arc<HarnessState>;

/// Everything one harness process owns for the lifetime of its single run.
pub struct HarnessState {
    pub config: HarnessConfig,
    pub provider: Arc<dyn SessionProvider>,
    pub markup: RwLock<TestMarkup>,
    pub run: RwLock<RunState>,
    pub verdicts: VerdictLog,
    pub logs: LogState,
    pub status_tx: broadcast::Sender<()>,
    pub shutdown_tx: broadcast::Sender<()>,
    run_claimed: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    SettingUp,
    Draining,
    Waiting,
    Executing,
    Finished,
    SetupFailed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Finished | RunPhase::SetupFailed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub phase: RunPhase,
    pub run_id: Option<String>,
    pub mode: Option<RunMode>,
    pub session_id: Option<String>,
    pub current_test: Option<TestId>,
    pub current_index: usize,
    pub total_tests: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub setup_error: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            run_id: None,
            mode: None,
            session_id: None,
            current_test: None,
            current_index: 0,
            total_tests: 0,
            started_at: None,
            finished_at: None,
            setup_error: None,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessState {
    pub fn new(
        config: HarnessConfig,
        provider: Arc<dyn SessionProvider>,
        markup: TestMarkup,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(16);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            provider,
            markup: RwLock::new(markup),
            run: RwLock::new(RunState::new()),
            verdicts: VerdictLog::new(),
            logs: LogState::new(),
            status_tx,
            shutdown_tx,
            run_claimed: AtomicBool::new(false),
        }
    }

    pub fn run_claimed(&self) -> bool {
        self.run_claimed.load(Ordering::SeqCst)
    }

    /// Returns true for exactly one caller per process.
    pub fn try_claim_run(&self) -> bool {
        self.run_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn notify_status_change(&self) {
        let _ = self.status_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedReceiver;

    fn make_state() -> HarnessState {
        let config = HarnessConfig::default();
        let provider = Arc::new(SimulatedReceiver::new(config.receiver.clone()));
        HarnessState::new(config, provider, TestMarkup::builtin())
    }

    #[test]
    fn test_run_state_new_defaults() {
        let run = RunState::new();
        assert_eq!(run.phase, RunPhase::Idle);
        assert!(run.run_id.is_none());
        assert!(run.current_test.is_none());
        assert_eq!(run.total_tests, 0);
    }

    #[test]
    fn test_claim_run_only_once() {
        let state = make_state();
        assert!(!state.run_claimed());
        assert!(state.try_claim_run());
        assert!(!state.try_claim_run());
        assert!(state.run_claimed());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(RunPhase::Finished.is_terminal());
        assert!(RunPhase::SetupFailed.is_terminal());
        assert!(!RunPhase::Waiting.is_terminal());
        assert!(!RunPhase::Idle.is_terminal());
    }

    #[tokio::test]
    async fn test_status_broadcast_reaches_subscribers() {
        let state = make_state();
        let mut rx = state.status_tx.subscribe();
        state.notify_status_change();
        assert!(rx.try_recv().is_ok());
    }
}
