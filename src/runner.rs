use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::checks::{self, CheckContext, CheckResult};
use crate::error::SetupError;
use crate::log_capture::{LogLevel, LogSource};
use crate::mode::{ReadySignal, SessionReady};
use crate::registry::{TestCase, TestId};
use crate::state::{HarnessState, RunPhase, SharedState};
use crate::verdict::{CheckOutcome, Verdict, VerdictSink};

/// FIFO of the tests a run will execute. Filled once, drained once.
#[derive(Debug, Clone, Default)]
pub struct TestQueue {
    items: VecDeque<TestCase>,
}

impl TestQueue {
    pub fn pop(&mut self) -> Option<TestCase> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<TestCase>> for TestQueue {
    fn from(cases: Vec<TestCase>) -> Self {
        Self {
            items: cases.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunSummary),
    SetupFailed(SetupError),
}

/// Wait for the session-ready signal, then drain the enabled tests against it.
pub async fn run_when_ready(
    state: SharedState,
    ready_rx: oneshot::Receiver<ReadySignal>,
) -> RunOutcome {
    let signal = ready_rx.await.unwrap_or(Err(SetupError::Interrupted));
    let ready = match signal {
        Ok(ready) => ready,
        Err(e) => {
            {
                let mut run = state.run.write().await;
                run.phase = RunPhase::SetupFailed;
                run.setup_error = Some(e.to_string());
                run.finished_at = Some(Utc::now());
            }
            state.notify_status_change();
            return RunOutcome::SetupFailed(e);
        }
    };

    // Visibility depends on the selected mode, so resolve it only now.
    let queue = TestQueue::from(state.markup.read().await.list_enabled_tests());
    RunOutcome::Completed(run_queue(&state, queue, ready).await)
}

pub async fn run_queue(state: &HarnessState, queue: TestQueue, ready: SessionReady) -> RunSummary {
    run_queue_with(state, queue, ready, &state.verdicts, checks::dispatch).await
}

/// Run every queued test strictly one after another, handing each verdict to `sink`.
///
/// Each test is awaited to completion before the next is dispatched, so at most one
/// command against the shared session is outstanding. Failed tests never stop the queue.
pub async fn run_queue_with<F>(
    state: &HarnessState,
    mut queue: TestQueue,
    ready: SessionReady,
    sink: &dyn VerdictSink,
    dispatch: F,
) -> RunSummary
where
    F: Fn(TestId, CheckContext) -> BoxFuture<'static, CheckResult>,
{
    let total = queue.len();
    let ctx = CheckContext {
        session: ready.session,
        mode: ready.mode,
    };

    {
        let mut run = state.run.write().await;
        run.phase = RunPhase::Draining;
        run.session_id = Some(ctx.session.session_id());
        run.total_tests = total;
        run.current_index = 0;
    }
    state.notify_status_change();
    state
        .logs
        .emit(LogSource::Test, LogLevel::Info, "starting tests")
        .await;

    let mut passed = 0;
    let mut index = 0;
    while let Some(case) = queue.pop() {
        {
            let mut run = state.run.write().await;
            run.phase = RunPhase::Waiting;
            run.current_index = index;
            run.current_test = Some(case.id);
        }
        state.notify_status_change();

        tokio::time::sleep(state.config.pacing).await;

        state.run.write().await.phase = RunPhase::Executing;
        state.notify_status_change();
        state
            .logs
            .emit(
                LogSource::Test,
                LogLevel::Info,
                format!("running test: {}", case.id),
            )
            .await;

        let outcome = execute(dispatch(case.id, ctx.clone()), state.config.test_timeout).await;

        match &outcome.message {
            Some(message) if !outcome.passed => {
                state
                    .logs
                    .emit(
                        LogSource::Test,
                        LogLevel::Warn,
                        format!("Test failed with - {}", message),
                    )
                    .await;
            }
            _ => {
                info!(
                    "  {} {}/{}: {}",
                    case.id,
                    index + 1,
                    total,
                    if outcome.passed { "pass" } else { "fail" }
                );
            }
        }
        if outcome.passed {
            passed += 1;
        }

        sink.record(Verdict::new(index, case.id, outcome)).await;
        index += 1;
    }

    {
        let mut run = state.run.write().await;
        run.phase = RunPhase::Finished;
        run.current_test = None;
        run.current_index = total;
        run.finished_at = Some(Utc::now());
    }
    state.notify_status_change();

    let summary = RunSummary {
        total,
        passed,
        failed: total - passed,
    };
    state
        .logs
        .emit(
            LogSource::Test,
            LogLevel::Info,
            format!(
                "tests complete: {} passed, {} failed",
                summary.passed, summary.failed
            ),
        )
        .await;
    summary
}

/// Resolve one check to an outcome no matter how it ends.
async fn execute(
    check: BoxFuture<'static, CheckResult>,
    timeout: Option<Duration>,
) -> CheckOutcome {
    let guarded = AssertUnwindSafe(check).catch_unwind();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Check did not resolve within {:?}", limit);
                return CheckOutcome::fail("timeout");
            }
        },
        None => guarded.await,
    };

    match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => CheckOutcome::fail(e.describe()),
        Err(panic) => CheckOutcome::fail(format!("check panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::connect;
    use crate::config::HarnessConfig;
    use crate::mode::RunMode;
    use crate::provider::{ErrorCode, ProviderError, ReceiverBehavior};
    use crate::registry::TestMarkup;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Keeps verdicts to itself so tests can tell it apart from the state's log.
    #[derive(Default)]
    struct CollectingSink {
        verdicts: Mutex<Vec<Verdict>>,
    }

    #[async_trait]
    impl VerdictSink for CollectingSink {
        async fn record(&self, verdict: Verdict) {
            self.verdicts.lock().unwrap().push(verdict);
        }
    }

    async fn ready_state() -> (HarnessState, SessionReady) {
        let (receiver, ctx) = connect(ReceiverBehavior::default(), RunMode::Auth).await;
        let config = HarnessConfig {
            pacing: Duration::ZERO,
            ..HarnessConfig::default()
        };
        let state = HarnessState::new(config, Arc::new(receiver), TestMarkup::builtin());
        let ready = SessionReady {
            session: ctx.session,
            mode: ctx.mode,
        };
        (state, ready)
    }

    #[tokio::test]
    async fn test_run_queue_with_records_into_given_sink() {
        let (state, ready) = ready_state().await;
        let sink = CollectingSink::default();
        let queue = TestQueue::from(vec![
            TestCase {
                id: TestId::InvalidRequest,
                visible: true,
            },
            TestCase {
                id: TestId::StopRequest,
                visible: true,
            },
        ]);

        let summary = run_queue_with(&state, queue, ready, &sink, |id, _ctx| {
            let result: BoxFuture<'static, CheckResult> = match id {
                TestId::StopRequest => async { Ok(CheckOutcome::fail("media still attached")) }.boxed(),
                _ => async { Ok(CheckOutcome::pass()) }.boxed(),
            };
            result
        })
        .await;

        assert_eq!(
            summary,
            RunSummary {
                total: 2,
                passed: 1,
                failed: 1
            }
        );
        let recorded = sink.verdicts.lock().unwrap().clone();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].test_id, TestId::InvalidRequest);
        assert_eq!(recorded[1].message.as_deref(), Some("media still attached"));
        assert!(state.verdicts.is_empty().await);
        assert_eq!(state.run.read().await.phase, RunPhase::Finished);
    }

    #[tokio::test]
    async fn test_execute_passes_outcome_through() {
        let check: BoxFuture<'static, CheckResult> = async { Ok(CheckOutcome::pass()) }.boxed();
        let outcome = execute(check, None).await;
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn test_execute_converts_provider_error() {
        let check: BoxFuture<'static, CheckResult> = async {
            Err(ProviderError::new(
                ErrorCode::SessionError,
                "session has no current media",
            ))
        }
        .boxed();
        let outcome = execute(check, None).await;
        assert_eq!(
            outcome,
            CheckOutcome::fail("session has no current media")
        );
    }

    #[tokio::test]
    async fn test_execute_converts_panic() {
        let check: BoxFuture<'static, CheckResult> = async {
            if true {
                panic!("receiver exploded");
            }
            Ok(CheckOutcome::pass())
        }
        .boxed();
        let outcome = execute(check, None).await;
        assert_eq!(
            outcome,
            CheckOutcome::fail("check panicked: receiver exploded")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out_hung_check() {
        let check = futures::future::pending::<CheckResult>().boxed();
        let outcome = execute(check, Some(Duration::from_secs(5))).await;
        assert_eq!(outcome, CheckOutcome::fail("timeout"));
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = TestQueue::from(vec![
            TestCase {
                id: TestId::StopRequest,
                visible: true,
            },
            TestCase {
                id: TestId::StopSessionRequest,
                visible: true,
            },
        ]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().id, TestId::StopRequest);
        assert_eq!(queue.pop().unwrap().id, TestId::StopSessionRequest);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }
}
