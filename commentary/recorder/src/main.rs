//! Commentary Recorder
//!
//! Records the live commentary of one room to a JSONL file while a programme
//! is being recorded. Launched by the recording pipeline next to the video
//! capture, so it always exits with status 0.
//!
//! # Usage
//!
//! ```bash
//! # Record jk1 for 30 minutes
//! jikkyo-rec jk1 1800 /recordings/programme.jsonl
//!
//! # Against another commentary host, with verbose logging
//! RUST_LOG=debug jikkyo-rec --host jikkyo.example jk1 60 out.jsonl
//! ```
//!
//! # Environment Variables
//!
//! - `COMMENTARY_HOST`: Commentary server host
//! - `COMMENTARY_CONFIG`: Config file path (default: `~/.config/autorec/commentary.toml`)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Stop recording; lines already written are kept

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use commentary_core::config::{default_config_path, load_config_from_path, CommentaryConfig};
use commentary_core::recorder::Recorder;
use commentary_core::transport::WebSocketConnector;

/// Record a live commentary room to JSONL
#[derive(Debug, Parser)]
#[command(name = "jikkyo-rec", version)]
struct Args {
    /// Commentary room identifier (e.g. jk1)
    room_id: String,

    /// How long to record, in seconds
    duration_seconds: u64,

    /// JSONL file to write; truncated if it exists
    output_file: PathBuf,

    /// Commentary server host
    #[arg(long)]
    host: Option<String>,

    /// Config file path
    #[arg(long, env = "COMMENTARY_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help, version and usage errors alike
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    init_logging();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build runtime");
            return ExitCode::SUCCESS;
        }
    };

    if let Err(e) = runtime.block_on(run(args)) {
        error!(error = %e, "Recording failed");
    }
    ExitCode::SUCCESS
}

fn init_logging() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["jikkyo_rec=info", "commentary_core=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config);
    if let Some(host) = args.host {
        config.connection.host = host;
    }

    info!(
        room = %args.room_id,
        duration_secs = args.duration_seconds,
        output = %args.output_file.display(),
        host = %config.connection.host,
        "Starting commentary recording"
    );

    let recorder = Recorder::new(WebSocketConnector::default(), config.connection);
    let summary = recorder
        .record_to_file(
            &args.room_id,
            Duration::from_secs(args.duration_seconds),
            &args.output_file,
            shutdown_signal(),
        )
        .await?;

    info!(
        lines = summary.lines_written,
        reason = ?summary.stop_reason,
        "Commentary recording saved"
    );
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> CommentaryConfig {
    match load_config_from_path(path.or_else(default_config_path)) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Ignoring unusable config, using defaults");
            CommentaryConfig::default()
        }
    }
}

/// Resolves on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, stopping"),
        () = terminate => info!("Received SIGTERM, stopping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_positional_arguments() {
        let args = Args::try_parse_from(["jikkyo-rec", "jk1", "1800", "/tmp/out.jsonl"]).unwrap();
        assert_eq!(args.room_id, "jk1");
        assert_eq!(args.duration_seconds, 1800);
        assert_eq!(args.output_file, PathBuf::from("/tmp/out.jsonl"));
        assert!(args.host.is_none());
    }

    #[test]
    fn test_rejects_non_numeric_duration() {
        assert!(Args::try_parse_from(["jikkyo-rec", "jk1", "soon", "out.jsonl"]).is_err());
    }

    #[test]
    fn test_missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path().join("absent.toml")));
        assert!(config.config_file_path.is_none());
    }
}
