//! Bluno capture replay
//!
//! Reads raw BLE captures (one file per peripheral, named by MAC address or
//! any label), deframes and decodes them, and appends the typed records to a
//! session log under the configured output directory.

use std::path::PathBuf;

use anyhow::Context;
use bluno_relay::config::RelayConfig;
use bluno_relay::replay::replay;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Replay captured Bluno BLE streams into session logs.
#[derive(Parser, Debug)]
#[command(name = "bluno-relay", about = "Replay captured Bluno BLE streams")]
struct Cli {
    /// Relay config (TOML). Built-in roster and timings when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session label; records go to `<output-dir>/<label>.dat`.
    #[arg(long, default_value = "session")]
    label: String,

    /// Override the configured output directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Accept frames without checking their CRC.
    #[arg(long, default_value_t = false)]
    no_crc: bool,

    /// Raw capture files, one per peripheral.
    #[arg(required = true)]
    captures: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if cli.no_crc {
        config.verify_crc = false;
    }

    tracing::info!(
        label = %cli.label,
        captures = cli.captures.len(),
        devices = config.roster.len(),
        service = %config.gatt.service_uuid,
        output_dir = %config.output_dir.display(),
        "bluno-relay starting"
    );

    let report = replay(&cli.captures, &config, &cli.label)?;

    for snapshot in report.players.values() {
        tracing::info!(%snapshot, "final player state");
    }
    println!(
        "{} records from {} frames written to {} ({} action windows)",
        report.records,
        report.frames,
        report.session_log.display(),
        report.actions
    );
    Ok(())
}
