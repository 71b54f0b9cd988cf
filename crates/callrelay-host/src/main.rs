// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// callrelay — native telephony bridge, desktop host
//
// Entry point. Initialises logging, loads the relay configuration, starts the
// relay against the platform bridge and a console endpoint, then replays
// host events read from stdin.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use callrelay_core::RelayConfig;
use callrelay_relay::CallRelay;

use services::console::ConsoleEndpoint;
use services::{data_dir, replay};

/// Replay recorded native telephony events through the call relay.
///
/// Reads one JSON host event per line from stdin and prints every message
/// the application layer would receive as a JSON line on stdout.
#[derive(Parser)]
#[command(name = "callrelay", version)]
struct Cli {
    /// Configuration file [default: <data dir>/callrelay/callrelay.json]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,

    /// Start with the application endpoint detached (until an `attach` event)
    #[arg(long)]
    detached: bool,

    /// Milliseconds to wait for outstanding deliveries once input ends
    #[arg(long, default_value = "10000")]
    drain_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!("callrelay starting");

    let config_path = cli.config.unwrap_or_else(data_dir::config_path);
    let config = RelayConfig::load_or_default(&config_path);

    if cli.write_config {
        return match config.save(&config_path) {
            Ok(()) => {
                tracing::info!(path = %config_path.display(), "configuration written");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(path = %config_path.display(), error = %e, "configuration not written");
                ExitCode::FAILURE
            }
        };
    }

    let platform = match callrelay_bridge::platform_bridge() {
        Ok(platform) => platform,
        Err(e) => {
            tracing::error!(error = %e, "platform bridge unavailable");
            return ExitCode::FAILURE;
        }
    };

    let endpoint = Arc::new(ConsoleEndpoint::new(std::io::stdout(), !cli.detached));
    let mut relay = match CallRelay::start(&config, platform, endpoint.clone()) {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(error = %e, "call relay failed to start");
            return ExitCode::FAILURE;
        }
    };
    let reports = relay.reports();

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let stats = replay::replay(input, &mut relay, &*endpoint).await;
    let tally = replay::drain(reports, stats.forwarded, Duration::from_millis(cli.drain_ms)).await;
    relay.shutdown();

    tracing::info!(
        delivered = tally.delivered,
        failed = tally.failed,
        timed_out = tally.timed_out,
        duplicate = tally.duplicate,
        outstanding = stats.forwarded.saturating_sub(tally.resolved()),
        "callrelay finished"
    );
    ExitCode::SUCCESS
}
