use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::mode::RunMode;

/// mpc-harness: media player conformance checks against a cast receiver session.
#[derive(Parser, Debug, Clone)]
#[command(name = "mpc-harness")]
pub struct CliArgs {
    /// Control surface HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// JSON test markup to load instead of the built-in table
    #[arg(long = "plan")]
    pub plan: Option<PathBuf>,

    /// Delay before each test, in milliseconds
    #[arg(long = "pacing-ms", default_value_t = DEFAULT_PACING_MS)]
    pub pacing_ms: u64,

    /// Fail a test that has not resolved after this many seconds (unset = wait forever)
    #[arg(long = "test-timeout-secs")]
    pub test_timeout_secs: Option<u64>,

    /// Also write tracing output to this file
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Run a single pass headless and exit instead of serving the control surface
    #[arg(long = "mode", value_enum)]
    pub mode: Option<ModeArg>,

    /// Receiver application id (headless mode)
    #[arg(long = "app-id")]
    pub app_id: Option<String>,

    /// Media URL to load (headless no-auth mode)
    #[arg(long = "media-url")]
    pub media_url: Option<String>,

    /// Media content type (headless no-auth mode)
    #[arg(long = "media-type")]
    pub media_type: Option<String>,

    /// Media already playing on the simulated receiver when a session is joined
    #[arg(long = "preloaded-media")]
    pub preloaded_media: Option<String>,

    /// Duration in seconds reported by the simulated receiver for loaded media
    #[arg(long = "media-duration-secs", default_value_t = DEFAULT_MEDIA_DURATION_SECS)]
    pub media_duration_secs: u32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Auth,
    NoAuth,
}

impl From<ModeArg> for RunMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Auth => RunMode::Auth,
            ModeArg::NoAuth => RunMode::NoAuth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub port: u16,
    pub plan: Option<PathBuf>,
    pub pacing: Duration,
    pub test_timeout: Option<Duration>,
    pub log_file: Option<PathBuf>,
    pub receiver: SimulatedReceiverConfig,
}

/// Knobs for the built-in simulated receiver.
#[derive(Debug, Clone)]
pub struct SimulatedReceiverConfig {
    pub preloaded_media: Option<String>,
    pub preloaded_content_type: String,
    pub media_duration_secs: u32,
    pub namespaces: Vec<String>,
}

impl Default for SimulatedReceiverConfig {
    fn default() -> Self {
        Self {
            preloaded_media: None,
            preloaded_content_type: "video/mp4".to_string(),
            media_duration_secs: DEFAULT_MEDIA_DURATION_SECS,
            namespaces: vec![MEDIA_NAMESPACE.to_string()],
        }
    }
}

// Port constants
pub const DEFAULT_PORT: u16 = 9890;

// Run constants
pub const APP_ID_LEN: usize = 8;
pub const DEFAULT_PACING_MS: u64 = 1_000;

// Log constants
pub const LOG_BUFFER_SIZE: usize = 2_000;

// Receiver protocol constants
pub const MEDIA_NAMESPACE: &str = "urn:x-cast:com.google.cast.media";
pub const INVALID_MEDIA_URL: &str = "http://xyz.zz/invalid.mp4";
pub const INVALID_MEDIA_CONTENT_TYPE: &str = "video/mp4";
pub const LOAD_FAILED_DESCRIPTION: &str = "LOAD_FAILED";
pub const INVALID_SEEK_TIME: &str = "INVALID_TIME";
pub const DEFAULT_MEDIA_DURATION_SECS: u32 = 600;

impl HarnessConfig {
    pub fn from_args(args: &CliArgs) -> Self {
        HarnessConfig {
            port: args.port,
            plan: args.plan.clone(),
            pacing: Duration::from_millis(args.pacing_ms),
            test_timeout: args.test_timeout_secs.map(Duration::from_secs),
            log_file: args.log_file.clone(),
            receiver: SimulatedReceiverConfig {
                preloaded_media: args.preloaded_media.clone(),
                media_duration_secs: args.media_duration_secs,
                ..SimulatedReceiverConfig::default()
            },
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            plan: None,
            pacing: Duration::from_millis(DEFAULT_PACING_MS),
            test_timeout: None,
            log_file: None,
            receiver: SimulatedReceiverConfig::default(),
        }
    }
}
