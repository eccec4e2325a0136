//! In-process receiver used by the headless CLI, the control surface and the test suite.
//!
//! Models the parts of a media receiver the checks observe: a session carrying at most one
//! media item, a player state machine, seek position and volume. Every command is counted
//! and overlapping commands are recorded so callers can assert the single-flight discipline.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use super::{
    ApiConfig, CastSession, ErrorCode, LoadRequest, MediaInfo, MediaStatus, PlayerState,
    ProviderError, ReceiverAvailability, SeekRequest, SessionEvent, SessionHandle,
    SessionProvider, Volume,
};
use crate::config::{
    SimulatedReceiverConfig, INVALID_MEDIA_URL, LOAD_FAILED_DESCRIPTION, MEDIA_NAMESPACE,
};

const DEFAULT_COMMAND_LATENCY_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Initialize,
    RequestSession,
    LoadMedia,
    SendMessage,
    Play,
    Pause,
    Seek,
    SetVolume,
    StopMedia,
    StopSession,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Initialize => "initialize",
            Command::RequestSession => "request_session",
            Command::LoadMedia => "load_media",
            Command::SendMessage => "send_message",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Seek => "seek",
            Command::SetVolume => "set_volume",
            Command::StopMedia => "stop_media",
            Command::StopSession => "stop_session",
        };
        f.write_str(name)
    }
}

/// Faults and quirks injected into the simulated receiver.
#[derive(Debug, Clone)]
pub struct ReceiverBehavior {
    pub receiver_available: bool,
    pub initialize_error: Option<ErrorCode>,
    pub session_error: Option<ErrorCode>,
    /// Content ids whose load fails as if the host were unreachable.
    pub unreachable_media: Vec<String>,
    pub load_failure_description: String,
    /// Accept messages the receiver should reject as malformed.
    pub accept_malformed_messages: bool,
    /// Acknowledge seeks without moving the playhead.
    pub ignore_seek: bool,
    /// Acknowledge play without leaving the paused state.
    pub ignore_play: bool,
    /// Acknowledge stop_media but keep the media attached.
    pub stop_keeps_media: bool,
    /// Never resolve this command.
    pub hang_on: Option<Command>,
    /// Reject this command with the given code.
    pub fail_on: Option<(Command, ErrorCode)>,
    pub latency: Duration,
}

impl Default for ReceiverBehavior {
    fn default() -> Self {
        Self {
            receiver_available: true,
            initialize_error: None,
            session_error: None,
            unreachable_media: vec![INVALID_MEDIA_URL.to_string()],
            load_failure_description: LOAD_FAILED_DESCRIPTION.to_string(),
            accept_malformed_messages: false,
            ignore_seek: false,
            ignore_play: false,
            stop_keeps_media: false,
            hang_on: None,
            fail_on: None,
            latency: Duration::from_millis(DEFAULT_COMMAND_LATENCY_MS),
        }
    }
}

struct Shared {
    config: SimulatedReceiverConfig,
    behavior: ReceiverBehavior,
    media: Mutex<Option<MediaStatus>>,
    calls: Mutex<Vec<Command>>,
    initialized: AtomicBool,
    session_alive: AtomicBool,
    next_media_session_id: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: broadcast::Sender<SessionEvent>,
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    /// Account for a command, apply latency and injected faults.
    async fn enter(&self, command: Command) -> Result<InFlightGuard<'_>, ProviderError> {
        self.calls.lock().await.push(command);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlightGuard {
            counter: &self.in_flight,
        };
        debug!("simulated receiver: {} (in flight: {})", command, now);

        if !self.behavior.latency.is_zero() {
            tokio::time::sleep(self.behavior.latency).await;
        }
        if self.behavior.hang_on == Some(command) {
            std::future::pending::<()>().await;
        }
        if let Some((failing, code)) = self.behavior.fail_on {
            if failing == command {
                return Err(ProviderError::new(code, format!("{} rejected", command)));
            }
        }
        Ok(guard)
    }

    fn notify(&self, event: SessionEvent) {
        // No listener is fine.
        let _ = self.events.send(event);
    }

    fn ensure_alive(&self) -> Result<(), ProviderError> {
        if self.session_alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::new(ErrorCode::SessionError, "session stopped"))
        }
    }

    fn duration(&self) -> f64 {
        self.config.media_duration_secs as f64
    }

    fn is_reachable(&self, content_id: &str) -> bool {
        (content_id.starts_with("http://") || content_id.starts_with("https://"))
            && !self
                .behavior
                .unreachable_media
                .iter()
                .any(|url| url == content_id)
    }

    fn new_media(&self, info: MediaInfo, state: PlayerState, current_time: f64) -> MediaStatus {
        let media_session_id = self.next_media_session_id.fetch_add(1, Ordering::SeqCst);
        MediaStatus {
            media_session_id,
            media: MediaInfo {
                duration: Some(self.duration()),
                ..info
            },
            player_state: state,
            current_time,
            volume: Volume::default(),
        }
    }

    async fn with_media<F>(&self, f: F) -> Result<(), ProviderError>
    where
        F: FnOnce(&mut MediaStatus, &ReceiverBehavior) -> Result<(), ProviderError>,
    {
        let mut media = self.media.lock().await;
        match media.as_mut() {
            Some(status) => f(status, &self.behavior),
            None => Err(ProviderError::new(
                ErrorCode::SessionError,
                "no media session",
            )),
        }
    }

    fn check_position(&self, current_time: f64) -> Result<(), ProviderError> {
        if current_time.is_finite() && current_time >= 0.0 && current_time <= self.duration() {
            Ok(())
        } else {
            Err(ProviderError::new(
                ErrorCode::InvalidParameter,
                format!("currentTime {} out of range", current_time),
            ))
        }
    }

    async fn apply_media_message(&self, message: &serde_json::Value) -> Result<(), ProviderError> {
        let invalid = |detail: &str| ProviderError::new(ErrorCode::InvalidParameter, detail);
        match message.get("type").and_then(|t| t.as_str()) {
            Some("SEEK") => {
                let current_time = message
                    .get("currentTime")
                    .and_then(|t| t.as_f64())
                    .ok_or_else(|| invalid("currentTime must be a number"))?;
                self.check_position(current_time)?;
                self.with_media(|status, behavior| {
                    if !behavior.ignore_seek {
                        status.current_time = current_time;
                    }
                    Ok(())
                })
                .await
            }
            Some("PLAY") => {
                self.with_media(|status, _| {
                    status.player_state = PlayerState::Playing;
                    Ok(())
                })
                .await
            }
            Some("PAUSE") => {
                self.with_media(|status, _| {
                    status.player_state = PlayerState::Paused;
                    Ok(())
                })
                .await
            }
            Some(other) => Err(invalid(&format!("unsupported request type {}", other))),
            None => Err(invalid("missing request type")),
        }
    }
}

/// Receiver simulation implementing [`SessionProvider`].
#[derive(Clone)]
pub struct SimulatedReceiver {
    shared: Arc<Shared>,
}

impl SimulatedReceiver {
    pub fn new(config: SimulatedReceiverConfig) -> Self {
        Self::with_behavior(config, ReceiverBehavior::default())
    }

    pub fn with_behavior(config: SimulatedReceiverConfig, behavior: ReceiverBehavior) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            shared: Arc::new(Shared {
                config,
                behavior,
                media: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                initialized: AtomicBool::new(false),
                session_alive: AtomicBool::new(false),
                next_media_session_id: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                events,
            }),
        }
    }

    /// Every command received so far, in arrival order.
    pub async fn calls(&self) -> Vec<Command> {
        self.shared.calls.lock().await.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// True if a command ever arrived while another was still outstanding.
    pub fn overlap_detected(&self) -> bool {
        self.max_in_flight() > 1
    }

    pub fn session_alive(&self) -> bool {
        self.shared.session_alive.load(Ordering::SeqCst)
    }

    pub async fn current_media(&self) -> Option<MediaStatus> {
        self.shared.media.lock().await.clone()
    }

    /// Play media on the live session as another sender would, outside the command path.
    pub async fn attach_external_media(&self, info: MediaInfo) -> Option<MediaStatus> {
        if !self.session_alive() {
            return None;
        }
        let status = self.shared.new_media(info, PlayerState::Playing, 0.0);
        *self.shared.media.lock().await = Some(status.clone());
        self.shared.notify(SessionEvent::MediaDiscovered {
            media_session_id: status.media_session_id,
        });
        Some(status)
    }
}

#[async_trait]
impl SessionProvider for SimulatedReceiver {
    async fn initialize(&self, config: &ApiConfig) -> Result<ReceiverAvailability, ProviderError> {
        let _guard = self.shared.enter(Command::Initialize).await?;
        if let Some(code) = self.shared.behavior.initialize_error {
            return Err(ProviderError::new(
                code,
                format!("cannot initialize application {}", config.app_id),
            ));
        }
        self.shared.initialized.store(true, Ordering::SeqCst);

        if self.shared.behavior.receiver_available {
            Ok(ReceiverAvailability::Available)
        } else {
            Ok(ReceiverAvailability::Unavailable)
        }
    }

    async fn request_session(&self) -> Result<SessionHandle, ProviderError> {
        let _guard = self.shared.enter(Command::RequestSession).await?;
        if !self.shared.initialized.load(Ordering::SeqCst) {
            return Err(ProviderError::code(ErrorCode::ApiNotInitialized));
        }
        if !self.shared.behavior.receiver_available {
            return Err(ProviderError::code(ErrorCode::ReceiverUnavailable));
        }
        if let Some(code) = self.shared.behavior.session_error {
            return Err(ProviderError::new(code, "receiver refused the session"));
        }

        if let Some(url) = &self.shared.config.preloaded_media {
            let info = MediaInfo::new(url.clone(), self.shared.config.preloaded_content_type.clone());
            let status = self.shared.new_media(info, PlayerState::Playing, 0.0);
            *self.shared.media.lock().await = Some(status);
        }
        self.shared.session_alive.store(true, Ordering::SeqCst);

        Ok(Arc::new(SimulatedSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            shared: self.shared.clone(),
        }))
    }
}

pub struct SimulatedSession {
    session_id: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl CastSession for SimulatedSession {
    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    async fn namespaces(&self) -> Vec<String> {
        self.shared.config.namespaces.clone()
    }

    async fn media(&self) -> Option<MediaStatus> {
        self.shared.media.lock().await.clone()
    }

    async fn load_media(&self, request: LoadRequest) -> Result<MediaStatus, ProviderError> {
        let _guard = self.shared.enter(Command::LoadMedia).await?;
        self.shared.ensure_alive()?;

        if !self.shared.is_reachable(&request.media.content_id) {
            // A failed load leaves the player idle with nothing attached.
            *self.shared.media.lock().await = None;
            return Err(ProviderError::new(
                ErrorCode::LoadMediaFailed,
                self.shared.behavior.load_failure_description.clone(),
            ));
        }
        self.shared.check_position(request.current_time)?;

        let state = if request.autoplay {
            PlayerState::Playing
        } else {
            PlayerState::Paused
        };
        let status = self
            .shared
            .new_media(request.media, state, request.current_time);
        *self.shared.media.lock().await = Some(status.clone());
        self.shared.notify(SessionEvent::Updated);
        Ok(status)
    }

    async fn send_message(&self, namespace: &str, message: &str) -> Result<(), ProviderError> {
        let _guard = self.shared.enter(Command::SendMessage).await?;
        self.shared.ensure_alive()?;

        if !self.shared.config.namespaces.iter().any(|ns| ns == namespace) {
            return Err(ProviderError::new(
                ErrorCode::ChannelError,
                format!("namespace {} not supported", namespace),
            ));
        }
        if self.shared.behavior.accept_malformed_messages {
            return Ok(());
        }

        let parsed: serde_json::Value = serde_json::from_str(message).map_err(|e| {
            ProviderError::new(ErrorCode::InvalidParameter, format!("malformed message: {}", e))
        })?;
        if namespace == MEDIA_NAMESPACE {
            self.shared.apply_media_message(&parsed).await
        } else {
            Ok(())
        }
    }

    async fn play(&self) -> Result<(), ProviderError> {
        let _guard = self.shared.enter(Command::Play).await?;
        self.shared.ensure_alive()?;
        self.shared
            .with_media(|status, behavior| {
                if !behavior.ignore_play {
                    status.player_state = PlayerState::Playing;
                }
                Ok(())
            })
            .await
    }

    async fn pause(&self) -> Result<(), ProviderError> {
        let _guard = self.shared.enter(Command::Pause).await?;
        self.shared.ensure_alive()?;
        self.shared
            .with_media(|status, _| {
                status.player_state = PlayerState::Paused;
                Ok(())
            })
            .await
    }

    async fn seek(&self, request: SeekRequest) -> Result<(), ProviderError> {
        let _guard = self.shared.enter(Command::Seek).await?;
        self.shared.ensure_alive()?;
        self.shared.check_position(request.current_time)?;
        self.shared
            .with_media(|status, behavior| {
                if !behavior.ignore_seek {
                    status.current_time = request.current_time;
                }
                Ok(())
            })
            .await
    }

    async fn set_volume(&self, volume: Volume) -> Result<(), ProviderError> {
        let _guard = self.shared.enter(Command::SetVolume).await?;
        self.shared.ensure_alive()?;
        if !(0.0..=1.0).contains(&volume.level) {
            return Err(ProviderError::new(
                ErrorCode::InvalidParameter,
                format!("volume level {} out of range", volume.level),
            ));
        }
        self.shared
            .with_media(|status, _| {
                status.volume = volume;
                Ok(())
            })
            .await
    }

    async fn stop_media(&self) -> Result<(), ProviderError> {
        let _guard = self.shared.enter(Command::StopMedia).await?;
        self.shared.ensure_alive()?;
        let mut media = self.shared.media.lock().await;
        if media.is_none() {
            return Err(ProviderError::new(
                ErrorCode::SessionError,
                "no media session",
            ));
        }
        if !self.shared.behavior.stop_keeps_media {
            *media = None;
        }
        self.shared.notify(SessionEvent::Updated);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        let _guard = self.shared.enter(Command::StopSession).await?;
        self.shared.ensure_alive()?;
        self.shared.session_alive.store(false, Ordering::SeqCst);
        *self.shared.media.lock().await = None;
        self.shared.notify(SessionEvent::Removed);
        Ok(())
    }
}
