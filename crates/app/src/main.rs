use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use fieldrec_app::runtime::{ControlLoop, MicBackend, RuntimeOptions};
use fieldrec_foundation::{
    install_signal_handlers, ShutdownToken, StateManager, DEFAULT_CONFIG_PATH,
};
use fieldrec_telemetry::RecorderMetrics;

#[derive(Parser, Debug)]
#[command(
    name = "fieldrec",
    about = "Field audio recorder with background upload"
)]
struct Cli {
    /// Path to the config file.
    #[arg(long, env = "FIELDREC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Record into this directory instead of the configured storage root.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Audio source backend.
    #[arg(long, value_enum, default_value = "cpal")]
    mic: MicBackend,

    /// Input device name for the cpal backend; default device when absent.
    #[arg(long)]
    device: Option<String>,

    /// Upload target override, "dir:<path>" or "tcp:<host>:<port>".
    #[arg(long)]
    remote: Option<String>,

    /// Record for N seconds, wait for the upload drain, then exit.
    #[arg(long)]
    auto_record_secs: Option<u64>,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "fieldrec.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging().map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    tracing::info!("Starting fieldrec");

    let shutdown = ShutdownToken::new();
    install_signal_handlers(&shutdown).context("Failed to install signal handlers")?;

    let state = StateManager::new();
    let metrics = RecorderMetrics::new();

    let opts = RuntimeOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
        mic: cli.mic,
        device: cli.device,
        remote_override: cli.remote,
        auto_record: cli.auto_record_secs.map(Duration::from_secs),
    };

    let result = ControlLoop::new(opts, state, metrics.clone(), shutdown).run();
    tracing::info!("Run summary: {}", metrics.snapshot());
    result
}
