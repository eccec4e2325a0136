//! Run mode selection and session setup.
//!
//! `start` refuses a second run, validates user input, claims the run, then spawns the
//! setup sequence for the chosen mode. Setup ends by sending exactly one message on a oneshot
//! channel whose only receiver is the queue runner: the session on success, the setup error
//! otherwise.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::APP_ID_LEN;
use crate::error::{HarnessError, SetupError};
use crate::log_capture::{LogLevel, LogSource, LogState};
use crate::provider::{
    ApiConfig, LoadRequest, MediaInfo, ReceiverAvailability, SessionEvent, SessionHandle,
    SessionProvider,
};
use crate::runner::{self, RunOutcome};
use crate::state::{RunPhase, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Join a session the sender app already set up and reuse its media.
    #[serde(rename = "auth")]
    Auth,
    /// Start a fresh session and load the user's media into it.
    #[serde(rename = "no-auth")]
    NoAuth,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Auth => "auth",
            RunMode::NoAuth => "no-auth",
        }
    }

    pub fn other(&self) -> RunMode {
        match self {
            RunMode::Auth => RunMode::NoAuth,
            RunMode::NoAuth => RunMode::Auth,
        }
    }
}

/// Form input for a run. Media fields only matter in no-auth mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StartParams {
    pub app_id: String,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub media_type: String,
}

impl StartParams {
    pub fn auth(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    pub fn no_auth(
        app_id: impl Into<String>,
        media_url: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            media_url: media_url.into(),
            media_type: media_type.into(),
        }
    }
}

/// Emitted once setup succeeds; the runner's only start trigger.
#[derive(Clone)]
pub struct SessionReady {
    pub session: SessionHandle,
    pub mode: RunMode,
}

pub type ReadySignal = Result<SessionReady, SetupError>;

pub struct RunHandle {
    pub run_id: String,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Wait for setup and the queue drain to finish.
    pub async fn wait(self) -> Result<RunOutcome, tokio::task::JoinError> {
        self.join.await
    }
}

pub fn validate_app_id(params: &StartParams) -> Result<(), HarnessError> {
    if params.app_id.chars().count() != APP_ID_LEN {
        return Err(HarnessError::Validation(
            "Please enter a valid application id".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_media(mode: RunMode, params: &StartParams) -> Result<(), HarnessError> {
    if mode == RunMode::NoAuth {
        if params.media_url.trim().is_empty() {
            return Err(HarnessError::Validation(
                "Please enter a valid media URL".to_string(),
            ));
        }
        if params.media_type.trim().is_empty() {
            return Err(HarnessError::Validation(
                "Please enter a valid media content type".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate, claim the run, and spawn setup followed by the queue drain.
///
/// Fails synchronously without touching the provider when a run has already started in
/// this process (whatever the input) or on bad input.
pub async fn start(
    state: &SharedState,
    mode: RunMode,
    params: StartParams,
) -> Result<RunHandle, HarnessError> {
    if state.run_claimed() {
        return Err(HarnessError::AlreadyRunning);
    }
    validate_app_id(&params)?;
    validate_media(mode, &params)?;
    if !state.try_claim_run() {
        return Err(HarnessError::AlreadyRunning);
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    {
        let mut run = state.run.write().await;
        run.run_id = Some(run_id.clone());
        run.mode = Some(mode);
        run.phase = RunPhase::SettingUp;
        run.started_at = Some(chrono::Utc::now());
    }
    state.markup.write().await.select_mode(mode);
    state.notify_status_change();
    info!("Run {} starting in {} mode", run_id, mode.as_str());

    let (ready_tx, ready_rx) = oneshot::channel::<ReadySignal>();

    let setup_state = state.clone();
    tokio::spawn(async move {
        let signal = establish_session(
            setup_state.provider.as_ref(),
            &setup_state.logs,
            mode,
            &params,
        )
        .await;
        match &signal {
            Ok(ready) => {
                // Subscribe before the runner can issue its first command.
                let events = ready.session.subscribe();
                let session_id = ready.session.session_id();
                tokio::spawn(watch_session(setup_state.clone(), session_id, events));
            }
            Err(e) => error!("Setup failed: {}", e),
        }
        let _ = ready_tx.send(signal);
    });

    let runner_state = state.clone();
    let join = tokio::spawn(async move { runner::run_when_ready(runner_state, ready_rx).await });

    Ok(RunHandle { run_id, join })
}

/// initialize → request session → (auth) require existing media / (no-auth) load media.
pub async fn establish_session(
    provider: &dyn SessionProvider,
    logs: &LogState,
    mode: RunMode,
    params: &StartParams,
) -> Result<SessionReady, SetupError> {
    let config = ApiConfig {
        app_id: params.app_id.clone(),
    };

    let availability = match provider.initialize(&config).await {
        Ok(availability) => {
            logs.emit(LogSource::Harness, LogLevel::Info, "Init success").await;
            availability
        }
        Err(e) => {
            logs.emit(LogSource::Harness, LogLevel::Error, "Init failure").await;
            logs.emit(LogSource::Harness, LogLevel::Error, e.describe()).await;
            return Err(SetupError::Initialize(e));
        }
    };
    match availability {
        ReceiverAvailability::Available => {
            logs.emit(LogSource::Session, LogLevel::Info, "receiver found").await;
        }
        ReceiverAvailability::Unavailable => {
            logs.emit(LogSource::Session, LogLevel::Warn, "receiver list empty")
                .await;
        }
    }

    logs.emit(LogSource::Session, LogLevel::Info, "launching app...").await;
    let session = match provider.request_session().await {
        Ok(session) => session,
        Err(e) => {
            logs.emit(LogSource::Session, LogLevel::Error, "launch error").await;
            logs.emit(LogSource::Session, LogLevel::Error, e.describe()).await;
            return Err(SetupError::RequestSession(e));
        }
    };
    let session_id = session.session_id();
    logs.emit(
        LogSource::Session,
        LogLevel::Info,
        format!("session success: {}", session_id),
    )
    .await;
    let mut events = session.subscribe();

    match mode {
        RunMode::Auth => match session.media().await {
            Some(media) => {
                logs.emit(
                    LogSource::Media,
                    LogLevel::Info,
                    "Found 1 existing media sessions.",
                )
                .await;
                logs.emit(
                    LogSource::Media,
                    LogLevel::Info,
                    format!(
                        "new media session ID:{} (onRequestSession)",
                        media.media_session_id
                    ),
                )
                .await;
            }
            None => {
                let err = SetupError::NoExistingMedia;
                logs.emit(LogSource::Media, LogLevel::Error, err.to_string())
                    .await;
                let _ = session.stop().await;
                drain_session_events(&mut events, logs, &session_id).await;
                return Err(err);
            }
        },
        RunMode::NoAuth => {
            let request = LoadRequest::new(MediaInfo::new(
                params.media_url.clone(),
                params.media_type.clone(),
            ));
            match session.load_media(request).await {
                Ok(media) => {
                    logs.emit(
                        LogSource::Media,
                        LogLevel::Info,
                        format!("new media session ID:{} (loadMedia)", media.media_session_id),
                    )
                    .await;
                }
                Err(e) => {
                    logs.emit(LogSource::Media, LogLevel::Error, "media error").await;
                    logs.emit(LogSource::Media, LogLevel::Error, e.describe()).await;
                    let _ = session.stop().await;
                    drain_session_events(&mut events, logs, &session_id).await;
                    return Err(SetupError::LoadMedia(e));
                }
            }
        }
    }

    drain_session_events(&mut events, logs, &session_id).await;
    Ok(SessionReady { session, mode })
}

/// Mirror a session's lifecycle events into the diagnostic log until it is removed.
pub async fn watch_session(
    state: SharedState,
    session_id: String,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                log_session_event(&state.logs, &session_id, event).await;
                if event == SessionEvent::Removed {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Session {} watcher skipped {} events", session_id, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Stopped watching session {}", session_id);
}

/// Log whatever the session reported while setup was driving it.
async fn drain_session_events(
    events: &mut broadcast::Receiver<SessionEvent>,
    logs: &LogState,
    session_id: &str,
) {
    while let Ok(event) = events.try_recv() {
        log_session_event(logs, session_id, event).await;
    }
}

async fn log_session_event(logs: &LogState, session_id: &str, event: SessionEvent) {
    match event {
        SessionEvent::Updated => {
            logs.emit(
                LogSource::Session,
                LogLevel::Info,
                format!("Session Updated: {}", session_id),
            )
            .await;
        }
        SessionEvent::Removed => {
            logs.emit(
                LogSource::Session,
                LogLevel::Info,
                format!("Session Removed: {}", session_id),
            )
            .await;
        }
        SessionEvent::MediaDiscovered { media_session_id } => {
            logs.emit(
                LogSource::Media,
                LogLevel::Info,
                format!("new media session ID:{} (addMediaListener)", media_session_id),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatedReceiverConfig;
    use crate::provider::simulated::Command;
    use crate::provider::{ErrorCode, ReceiverBehavior, SimulatedReceiver};
    use std::time::Duration;

    fn receiver(preloaded: bool, behavior: ReceiverBehavior) -> SimulatedReceiver {
        SimulatedReceiver::with_behavior(
            SimulatedReceiverConfig {
                preloaded_media: preloaded.then(|| "http://media.example/a.mp4".to_string()),
                ..SimulatedReceiverConfig::default()
            },
            ReceiverBehavior {
                latency: Duration::ZERO,
                ..behavior
            },
        )
    }

    #[test]
    fn test_app_id_must_be_eight_chars() {
        assert!(validate_app_id(&StartParams::auth("abc")).is_err());
        assert!(validate_app_id(&StartParams::auth("ABCD12345")).is_err());
        assert!(validate_app_id(&StartParams::auth("ABCD1234")).is_ok());
    }

    #[test]
    fn test_no_auth_requires_media_fields() {
        let missing_url = StartParams::no_auth("ABCD1234", "", "video/mp4");
        let missing_type = StartParams::no_auth("ABCD1234", "http://m/a.mp4", " ");
        assert!(validate_media(RunMode::NoAuth, &missing_url).is_err());
        assert!(validate_media(RunMode::NoAuth, &missing_type).is_err());
        assert!(validate_media(RunMode::Auth, &missing_url).is_ok());
    }

    #[test]
    fn test_mode_serializes_as_markup_group() {
        assert_eq!(serde_json::to_string(&RunMode::NoAuth).unwrap(), "\"no-auth\"");
        assert_eq!(RunMode::Auth.other(), RunMode::NoAuth);
    }

    #[tokio::test]
    async fn test_auth_setup_reuses_existing_media() {
        let receiver = receiver(true, ReceiverBehavior::default());
        let logs = LogState::new();
        let ready = establish_session(&receiver, &logs, RunMode::Auth, &StartParams::auth("ABCD1234"))
            .await
            .ok()
            .unwrap();
        assert_eq!(ready.mode, RunMode::Auth);
        assert!(!receiver.calls().await.contains(&Command::LoadMedia));

        let lines: Vec<String> = logs.history().await.into_iter().map(|e| e.message).collect();
        assert_eq!(lines[0], "Init success");
        assert_eq!(lines[1], "receiver found");
        assert_eq!(lines[2], "launching app...");
        assert!(lines[3].starts_with("session success: "));
        assert_eq!(lines[4], "Found 1 existing media sessions.");
        assert!(lines[5].ends_with("(onRequestSession)"));
    }

    #[tokio::test]
    async fn test_auth_setup_without_media_halts_and_stops_session() {
        let receiver = receiver(false, ReceiverBehavior::default());
        let logs = LogState::new();
        let err = establish_session(&receiver, &logs, RunMode::Auth, &StartParams::auth("ABCD1234"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::NoExistingMedia));
        assert!(!receiver.session_alive());

        let last = logs.history().await.pop().unwrap();
        assert!(last.message.starts_with("Session Removed: "));
    }

    #[tokio::test]
    async fn test_no_auth_setup_loads_media() {
        let receiver = receiver(false, ReceiverBehavior::default());
        let logs = LogState::new();
        let params = StartParams::no_auth("ABCD1234", "http://media.example/b.mp4", "video/mp4");
        establish_session(&receiver, &logs, RunMode::NoAuth, &params)
            .await
            .ok()
            .unwrap();
        let media = receiver.current_media().await.unwrap();
        assert_eq!(media.media.content_id, "http://media.example/b.mp4");
        assert!(media.player_state.is_playing());

        let lines: Vec<String> = logs.history().await.into_iter().map(|e| e.message).collect();
        let loaded = lines.iter().position(|l| l.ends_with("(loadMedia)")).unwrap();
        assert!(lines[loaded + 1].starts_with("Session Updated: "));
    }

    #[tokio::test]
    async fn test_no_auth_setup_load_failure_is_fatal() {
        let receiver = receiver(false, ReceiverBehavior::default());
        let logs = LogState::new();
        let params = StartParams::no_auth("ABCD1234", "ftp://nowhere/b.mp4", "video/mp4");
        let err = establish_session(&receiver, &logs, RunMode::NoAuth, &params)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::LoadMedia(ref e) if e.code == ErrorCode::LoadMediaFailed));
        let history = logs.history().await;
        assert!(history.iter().any(|e| e.message == "media error"));
        assert!(history.iter().any(|e| e.message.starts_with("Session Removed: ")));
    }

    #[tokio::test]
    async fn test_initialize_failure_stops_before_session() {
        let behavior = ReceiverBehavior {
            initialize_error: Some(ErrorCode::ExtensionMissing),
            ..ReceiverBehavior::default()
        };
        let receiver = receiver(true, behavior);
        let logs = LogState::new();
        let err = establish_session(&receiver, &logs, RunMode::Auth, &StartParams::auth("ABCD1234"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Initialize(_)));
        assert_eq!(receiver.calls().await, vec![Command::Initialize]);
    }

    #[tokio::test]
    async fn test_unavailable_receiver_fails_session_request() {
        let behavior = ReceiverBehavior {
            receiver_available: false,
            ..ReceiverBehavior::default()
        };
        let receiver = receiver(true, behavior);
        let logs = LogState::new();
        let err = establish_session(&receiver, &logs, RunMode::Auth, &StartParams::auth("ABCD1234"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::RequestSession(ref e) if e.code == ErrorCode::ReceiverUnavailable));
        let history = logs.history().await;
        assert!(history.iter().any(|e| e.message == "receiver list empty"));
        assert!(history.iter().any(|e| e.message == "launch error"));
    }

    #[tokio::test]
    async fn test_watcher_logs_external_media_and_removal() {
        use crate::config::HarnessConfig;
        use crate::registry::TestMarkup;
        use crate::state::HarnessState;
        use std::sync::Arc;

        let receiver = receiver(true, ReceiverBehavior::default());
        let state: SharedState = Arc::new(HarnessState::new(
            HarnessConfig::default(),
            Arc::new(receiver.clone()),
            TestMarkup::builtin(),
        ));
        let ready = establish_session(&receiver, &state.logs, RunMode::Auth, &StartParams::auth("ABCD1234"))
            .await
            .ok()
            .unwrap();
        let session_id = ready.session.session_id();
        let watcher = tokio::spawn(watch_session(
            state.clone(),
            session_id.clone(),
            ready.session.subscribe(),
        ));

        let external = receiver
            .attach_external_media(MediaInfo::new("http://media.example/c.mp4", "video/mp4"))
            .await
            .unwrap();
        ready.session.stop().await.unwrap();
        watcher.await.unwrap();

        let lines: Vec<String> = state.logs.history().await.into_iter().map(|e| e.message).collect();
        let n = lines.len();
        assert_eq!(
            lines[n - 2],
            format!("new media session ID:{} (addMediaListener)", external.media_session_id)
        );
        assert_eq!(lines[n - 1], format!("Session Removed: {}", session_id));
    }
}
