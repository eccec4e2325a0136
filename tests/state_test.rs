use std::io::Write;
use std::sync::Arc;

use mpc_harness::config::HarnessConfig;
use mpc_harness::error::{HarnessError, MarkupError};
use mpc_harness::mode::RunMode;
use mpc_harness::provider::SimulatedReceiver;
use mpc_harness::registry::{TestId, TestMarkup};
use mpc_harness::state::{HarnessState, RunPhase};

#[tokio::test]
async fn test_state_creation() {
    let config = HarnessConfig::default();
    let provider = Arc::new(SimulatedReceiver::new(config.receiver.clone()));
    let state = HarnessState::new(config, provider, TestMarkup::builtin());

    let run = state.run.read().await;
    assert_eq!(run.phase, RunPhase::Idle);
    assert!(run.mode.is_none());
    assert!(run.session_id.is_none());
    drop(run);

    assert!(!state.run_claimed());
    assert!(state.verdicts.is_empty().await);
    assert!(state.logs.history().await.is_empty());
}

#[test]
fn test_markup_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "hidden_groups": ["slow"],
            "rows": [
                {{ "test": "testStopRequest" }},
                {{ "test": "testTimepointControl", "groups": ["slow"] }},
                {{ "test": "testStopSessionRequest" }}
            ]
        }}"#
    )
    .unwrap();

    let mut markup = TestMarkup::load(file.path()).unwrap();
    let ids: Vec<TestId> = markup.list_enabled_tests().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![TestId::StopRequest, TestId::StopSessionRequest]);

    markup.toggle(&["slow"], &[]);
    assert_eq!(markup.list_enabled_tests().len(), 3);
    // Selecting a mode leaves unrelated groups alone.
    markup.select_mode(RunMode::Auth);
    assert_eq!(markup.list_enabled_tests().len(), 3);
}

#[test]
fn test_markup_file_with_unknown_test_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "rows": [ {{ "test": "testTeleport" }} ] }}"#).unwrap();

    match TestMarkup::load(file.path()) {
        Err(HarnessError::Markup(MarkupError::UnknownTest(id))) => assert_eq!(id, "testTeleport"),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_markup_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TestMarkup::load(&dir.path().join("absent.json")).err().unwrap();
    assert!(matches!(err, HarnessError::Io(_)));
}
