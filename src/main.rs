use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mpc_harness::config::{CliArgs, HarnessConfig};
use mpc_harness::log_capture::{LogLevel, LogSource};
use mpc_harness::mode::{self, RunMode, StartParams};
use mpc_harness::provider::SimulatedReceiver;
use mpc_harness::registry::TestMarkup;
use mpc_harness::runner::RunOutcome;
use mpc_harness::server;
use mpc_harness::state::{HarnessState, SharedState};
use mpc_harness::verdict::render_table;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    let config = HarnessConfig::from_args(&args);

    // Keep the guard alive for the whole process so buffered file lines are flushed.
    let _file_guard = init_tracing(config.log_file.as_deref())?;

    info!("Starting mpc-harness v{}", env!("CARGO_PKG_VERSION"));

    let markup = match &config.plan {
        Some(path) => {
            info!("Loading test markup from {:?}", path);
            TestMarkup::load(path).with_context(|| format!("loading test markup {:?}", path))?
        }
        None => TestMarkup::builtin(),
    };

    let port = config.port;
    let provider = Arc::new(SimulatedReceiver::new(config.receiver.clone()));
    let state: SharedState = Arc::new(HarnessState::new(config, provider, markup));

    if let Some(mode) = args.mode {
        return run_headless(state, mode.into(), &args).await;
    }

    state
        .logs
        .emit(
            LogSource::Harness,
            LogLevel::Info,
            format!("Harness starting on port {}", port),
        )
        .await;

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Harness listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("Harness shutting down");
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mpc_harness=info,tower_http=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file path {:?} has no file name", path))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

/// One pass without the control surface. Exit status is non-zero on setup failure
/// or when any verdict failed.
async fn run_headless(state: SharedState, mode: RunMode, args: &CliArgs) -> anyhow::Result<ExitCode> {
    let app_id = args.app_id.clone().unwrap_or_default();
    let params = match mode {
        RunMode::Auth => StartParams::auth(app_id),
        RunMode::NoAuth => StartParams::no_auth(
            app_id,
            args.media_url.clone().unwrap_or_default(),
            args.media_type.clone().unwrap_or_default(),
        ),
    };

    let handle = match mode::start(&state, mode, params).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Run rejected: {}", e);
            eprintln!("{}", e);
            return Ok(ExitCode::from(2));
        }
    };
    info!("Headless {} run {}", mode.as_str(), handle.run_id);

    match handle.wait().await? {
        RunOutcome::SetupFailed(e) => {
            eprintln!("setup failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
        RunOutcome::Completed(summary) => {
            print!("{}", render_table(&state.verdicts.all().await));
            println!(
                "{} tests, {} passed, {} failed",
                summary.total, summary.passed, summary.failed
            );
            if summary.failed == 0 {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received shutdown signal");
    state
        .logs
        .emit(
            LogSource::Harness,
            LogLevel::Info,
            "Shutdown signal received",
        )
        .await;
    let _ = state.shutdown_tx.send(());
}
