// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use logshifter::config::Config;
use logshifter::constants::{DEFAULT_CONFIG_FILE, DEFAULT_STATS_INTERVAL, DEFAULT_TAG};
use logshifter::shifter::{Shifter, ShifterConfig};
use logshifter::sink;
use logshifter::stats::StatsConfig;

/// Time given to the blocking stdin reader to notice shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Relays stdin, line by line, to syslog or a file without ever blocking the
/// producer.
#[derive(Debug, Parser)]
#[command(name = "logshifter", version, about)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Syslog identity, and file name for the file output
    #[arg(long, default_value = DEFAULT_TAG)]
    tag: String,

    /// Append a JSON stats snapshot to this file periodically
    #[arg(long)]
    stats_file: Option<PathBuf>,

    /// Seconds between stats snapshots
    #[arg(long, default_value_t = DEFAULT_STATS_INTERVAL.as_secs())]
    stats_interval: u64,

    /// Report lifetime totals only, never resetting the window counters
    #[arg(long)]
    no_stats_window: bool,

    #[arg(long, env = "LOGSHIFTER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Unable to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(args));
    // stdin is read on a blocking thread that may still be parked in read(2)
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    code
}

fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_new(log_level.to_lowercase()).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{log_level}' ({e}), using info");
        EnvFilter::new("info")
    });

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
    }
    debug!("Logging subsystem enabled");
}

async fn run(args: Args) -> ExitCode {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading config on logshifter startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    let output_type = config.effective_output_type();
    info!("Relaying stdin to {output_type} as '{}'", args.tag);
    let sink = sink::build(&config, output_type, &args.tag);

    let stats = args.stats_file.map(|destination| StatsConfig {
        destination,
        interval: Duration::from_secs(args.stats_interval),
        windowed: !args.no_stats_window,
    });

    let cancel_token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel_token.clone()));

    let shifter = Shifter::new(ShifterConfig::from_config(&config, stats));
    match shifter.run(tokio::io::stdin(), sink, cancel_token).await {
        Ok(stats) => {
            info!("Final stats: {stats:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("logshifter failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config, logshifter::errors::ConfigError> {
    let config = Config::load(&args.config)?;
    config.validate()?;
    Ok(config)
}

async fn cancel_on_signal(cancel_token: CancellationToken) {
    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, draining buffered records");
    cancel_token.cancel();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("Unable to listen for SIGTERM: {e}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for SIGINT: {e}");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Unable to listen for SIGINT: {e}");
                terminate.recv().await;
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
