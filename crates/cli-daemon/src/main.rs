//! CLI entry point for the playout daemon
//!
//! All settings come from the environment; the command line only carries
//! `--help` and `--version`.

use clap::Parser;
use playout_daemon::{spawn_signal_listener, Daemon};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Playout Daemon - streams a directory of media files through a remote
/// production controller.
///
/// Configure with environment variables: STREAM_URL, STREAM_KEY, VIDEO_DIR
/// and OBS_PASSWORD are required.
#[derive(Parser, Debug)]
#[command(name = "playout-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let _args = Args::parse();
    init_tracing();

    let daemon = match Daemon::from_env() {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "failed to initialize daemon");
            return ExitCode::from(e.exit_code());
        }
    };

    info!(
        dir = %daemon.config.media.video_dir.display(),
        controller = %format!("{}:{}", daemon.config.controller.host, daemon.config.controller.port),
        scene = %daemon.config.controller.scene,
        looping = daemon.config.media.loop_playlist,
        "playout daemon starting"
    );

    let shutdown = CancellationToken::new();
    let listener = spawn_signal_listener(shutdown.clone());

    let result = daemon.run(&shutdown).await;
    listener.abort();

    match result {
        Ok(()) => {
            info!("playout daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "playout daemon failed");
            ExitCode::from(e.exit_code())
        }
    }
}
