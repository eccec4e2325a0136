//! Seam between the harness and a cast sender SDK.
//!
//! The harness never talks to a receiver directly. It drives a [`SessionProvider`] to get a
//! [`SessionHandle`] and then issues every command through that handle. Implementations own
//! the wire protocol; the harness only relies on the shapes below.

pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use simulated::{ReceiverBehavior, SimulatedReceiver};

/// Error codes reported by the sender SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Cancel,
    Timeout,
    ApiNotInitialized,
    InvalidParameter,
    ExtensionNotCompatible,
    ExtensionMissing,
    ReceiverUnavailable,
    SessionError,
    ChannelError,
    LoadMediaFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Cancel => "cancel",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ApiNotInitialized => "api_not_initialized",
            ErrorCode::InvalidParameter => "invalid_parameter",
            ErrorCode::ExtensionNotCompatible => "extension_not_compatible",
            ErrorCode::ExtensionMissing => "extension_missing",
            ErrorCode::ReceiverUnavailable => "receiver_unavailable",
            ErrorCode::SessionError => "session_error",
            ErrorCode::ChannelError => "channel_error",
            ErrorCode::LoadMediaFailed => "load_media_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: ErrorCode,
    pub description: Option<String>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.describe())
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
        }
    }

    pub fn code(code: ErrorCode) -> Self {
        Self {
            code,
            description: None,
        }
    }

    /// Human readable description, falling back to the error code.
    pub fn describe(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.code.as_str().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub app_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverAvailability {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    Buffering,
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Buffering)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub content_id: String,
    pub content_type: String,
    /// Seconds; `None` for live streams or before metadata arrives.
    pub duration: Option<f64>,
}

impl MediaInfo {
    pub fn new(content_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            duration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub level: f64,
    pub muted: bool,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            level: 1.0,
            muted: false,
        }
    }
}

/// Snapshot of the session's current media as last reported by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaStatus {
    pub media_session_id: u64,
    pub media: MediaInfo,
    pub player_state: PlayerState,
    pub current_time: f64,
    pub volume: Volume,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub media: MediaInfo,
    pub autoplay: bool,
    pub current_time: f64,
}

impl LoadRequest {
    pub fn new(media: MediaInfo) -> Self {
        Self {
            media,
            autoplay: true,
            current_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    pub current_time: f64,
}

/// Lifecycle notifications pushed by a session, independent of any command in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session status changed and the session is still alive.
    Updated,
    /// The session is gone. No further events follow.
    Removed,
    /// Media attached to the session by someone other than this sender.
    MediaDiscovered { media_session_id: u64 },
}

/// A live session with a receiver application.
///
/// Not safe for concurrent commands: callers must await each command before issuing the next.
#[async_trait]
pub trait CastSession: Send + Sync {
    fn session_id(&self) -> String;

    /// Listen for lifecycle events from now on. Earlier events are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    async fn namespaces(&self) -> Vec<String>;

    /// Current media, or `None` once it has been stopped or was never loaded.
    async fn media(&self) -> Option<MediaStatus>;

    async fn load_media(&self, request: LoadRequest) -> Result<MediaStatus, ProviderError>;

    /// Send a raw JSON message on a namespace.
    async fn send_message(&self, namespace: &str, message: &str) -> Result<(), ProviderError>;

    async fn play(&self) -> Result<(), ProviderError>;

    async fn pause(&self) -> Result<(), ProviderError>;

    async fn seek(&self, request: SeekRequest) -> Result<(), ProviderError>;

    async fn set_volume(&self, volume: Volume) -> Result<(), ProviderError>;

    async fn stop_media(&self) -> Result<(), ProviderError>;

    /// Tear down the session on the receiver.
    async fn stop(&self) -> Result<(), ProviderError>;
}

pub type SessionHandle = Arc<dyn CastSession>;

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn initialize(&self, config: &ApiConfig) -> Result<ReceiverAvailability, ProviderError>;

    async fn request_session(&self) -> Result<SessionHandle, ProviderError>;
}
