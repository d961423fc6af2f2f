/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Streamed market data, periodic latency statistics, graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deribit_stream_runner::{RunnerConfig, StreamSession};

const READY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "deribit-stream-runner", version, about = "Deribit market data stream runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting deribit-stream-runner"
    );

    let config = load_config(&args.config_path)?;
    config.validate().context("validate config")?;
    let channels = config.channels();
    info!(
        channel_count = channels.len(),
        authenticated = config.credentials().is_some(),
        "configuration loaded"
    );

    if args.dry_run {
        for channel in &channels {
            info!(channel = channel.channel(), "would subscribe");
        }
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let session = Arc::new(StreamSession::new(&config).context("build session")?);
    session.cancel_on_disconnect(shutdown.clone());
    session.register_feeds();

    let starting = session.clone();
    tokio::task::spawn_blocking(move || starting.start(READY_TIMEOUT))
        .await
        .context("join session start")?
        .context("start session")?;
    info!("session started");

    if config.rest_snapshot {
        session.fetch_snapshots().await;
    }

    let mut stats = tokio::time::interval(config.stats_interval());
    stats.set_missed_tick_behavior(MissedTickBehavior::Delay);
    stats.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = stats.tick() => info!("latency statistics\n{}", session.stats_report()),
        }
    }
    info!("shutdown signal received");

    let closing = session.clone();
    tokio::task::spawn_blocking(move || closing.shutdown())
        .await
        .context("join session shutdown")?;
    info!("session shutdown complete");

    println!("{}", session.stats_report());
    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<RunnerConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    RunnerConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
