//! # Capture Replay
//!
//! Replays raw byte captures, one per peripheral, through the same path live
//! links take: one producer thread per device deframes and decodes, a shared
//! bounded queue carries typed records, and a single consumer appends them to
//! the session log, folds per-player state and cuts glove readings into
//! action windows.
//!
//! ```text
//!   capture A ─▶ producer ─┐
//!   capture B ─▶ producer ─┼─▶ queue ─▶ consumer ─▶ <label>.dat
//!   capture C ─▶ producer ─┘               ├──▶ action queue ─▶ <label>-actions.dat
//!                                          └──▶ <label>-players.dat
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use bluno_wire::framer::{Deframer, DeframerStats};
use bluno_wire::payload::{Payload, PlayerData};
use bluno_wire::wire::SeqNum;
use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::action::{ActionWindow, ImuRelay};
use crate::config::{Device, MacAddr, RelayConfig};
use crate::sink::{drain_queue_to_file, session_path, RecordLog};

/// Read size per notification-sized chunk of a capture.
const READ_CHUNK: usize = 64;

/// A decoded frame tagged with the device it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub device: String,
    pub seq_num: SeqNum,
    pub payload: Payload,
}

impl fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} {}", self.device, self.seq_num, self.payload)
    }
}

/// Per-producer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub deframer: DeframerStats,
    pub decode_errors: u64,
    /// Payloads whose player disagrees with the roster entry for the device.
    pub roster_mismatches: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub frames: u64,
    pub records: u64,
    pub decode_errors: u64,
    pub skipped_bytes: u64,
    pub crc_failures: u64,
    pub roster_mismatches: u64,
    /// Complete action windows written to the actions log.
    pub actions: u64,
    /// Glove readings dropped during action cooldowns.
    pub cooldown_drops: u64,
    pub players: BTreeMap<u8, PlayerData>,
    pub session_log: PathBuf,
}

impl ReplayReport {
    fn absorb(&mut self, stats: ProducerStats) {
        self.frames += stats.deframer.frames;
        self.skipped_bytes += stats.deframer.skipped_bytes;
        self.crc_failures += stats.deframer.crc_failures;
        self.decode_errors += stats.decode_errors;
        self.roster_mismatches += stats.roster_mismatches;
    }
}

/// Device label for a capture: its file stem.
fn device_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Deframe and decode one capture, forwarding records until the input ends.
pub fn produce(
    mut input: impl Read,
    device: &str,
    roster_entry: Option<&Device>,
    verify_crc: bool,
    tx: &Sender<DecodedRecord>,
) -> Result<ProducerStats> {
    let mut deframer = if verify_crc {
        Deframer::new()
    } else {
        Deframer::new().without_crc_check()
    };
    let mut stats = ProducerStats::default();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = input
            .read(&mut chunk)
            .with_context(|| format!("reading capture for {device}"))?;
        if n == 0 {
            break;
        }
        deframer.push(&chunk[..n]);

        while let Some(packet) = deframer.next_packet() {
            let payload = match packet.payload() {
                Ok(p) => p,
                Err(e) => {
                    stats.decode_errors += 1;
                    tracing::warn!(
                        device,
                        seq = packet.seq_num.value(),
                        error = %e,
                        "dropping frame"
                    );
                    continue;
                }
            };
            if let (Some(entry), Some(player)) = (roster_entry, payload.player_id()) {
                if entry.player_id != player {
                    stats.roster_mismatches += 1;
                    tracing::warn!(
                        device,
                        expected = entry.player_id,
                        got = player,
                        "payload player does not match roster"
                    );
                }
            }
            let record = DecodedRecord {
                device: device.to_string(),
                seq_num: packet.seq_num,
                payload,
            };
            if tx.send(record).is_err() {
                tracing::debug!(device, "consumer gone, stopping producer");
                stats.deframer = deframer.stats();
                return Ok(stats);
            }
        }
    }

    if deframer.buffered() > 0 {
        tracing::debug!(device, trailing = deframer.buffered(), "incomplete trailing frame");
    }
    stats.deframer = deframer.stats();
    Ok(stats)
}

/// Replay `captures` into `<output_dir>/<label>.dat`. Completed action
/// windows go to `<label>-actions.dat` and the final per-player snapshots to
/// `<label>-players.dat`.
pub fn replay(captures: &[PathBuf], config: &RelayConfig, label: &str) -> Result<ReplayReport> {
    let log_path = session_path(&config.output_dir, label);
    let log = RecordLog::open(&log_path)
        .with_context(|| format!("opening session log {}", log_path.display()))?;

    let (tx, rx) = crossbeam_channel::bounded::<DecodedRecord>(config.timing.queue_capacity);

    let mut producers = Vec::with_capacity(captures.len());
    for path in captures {
        let file = File::open(path).with_context(|| format!("opening capture {}", path.display()))?;
        let device = device_label(path);
        let entry = device
            .parse::<MacAddr>()
            .ok()
            .and_then(|mac| config.roster.get(&mac).cloned());
        match &entry {
            Some(d) => tracing::info!(
                device = %device,
                player = d.player_id,
                role = ?d.role,
                "replaying known device"
            ),
            None => tracing::info!(device = %device, "replaying capture"),
        }
        let tx = tx.clone();
        let verify_crc = config.verify_crc;
        let handle = thread::Builder::new()
            .name(format!("producer-{device}"))
            .spawn(move || produce(file, &device, entry.as_ref(), verify_crc, &tx))
            .context("spawning producer thread")?;
        producers.push(handle);
    }
    drop(tx);

    let mut report = ReplayReport {
        session_log: log_path.clone(),
        ..ReplayReport::default()
    };
    let mut relays: BTreeMap<u8, ImuRelay> = BTreeMap::new();
    let (action_tx, action_rx) = crossbeam_channel::unbounded::<ActionWindow>();

    loop {
        match rx.recv_timeout(config.timing.queue_get_timeout) {
            Ok(record) => {
                if let Payload::Imu(imu) = &record.payload {
                    let relay = relays
                        .entry(imu.player_id)
                        .or_insert_with(|| config.imu_relay(imu.player_id));
                    if let Some(window) = relay.on_imu(imu) {
                        report.actions += 1;
                        action_tx.send(window).context("queueing action window")?;
                    }
                }
                if let Some(id) = record.payload.player_id() {
                    let snapshot = report
                        .players
                        .get(&id)
                        .copied()
                        .unwrap_or_else(|| PlayerData::new(id))
                        .with(&record.payload);
                    report.players.insert(id, snapshot);
                }
                log.append(&record)
                    .with_context(|| format!("appending to {}", log_path.display()))?;
                report.records += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::trace!("queue idle");
                relays.values_mut().for_each(ImuRelay::poll);
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log.flush()?;

    for handle in producers {
        let stats = handle
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
        report.absorb(stats);
    }

    for relay in relays.values() {
        report.cooldown_drops += relay.dropped();
        if relay.pending() > 0 {
            tracing::debug!(pending = relay.pending(), "partial action window discarded");
        }
    }
    drop(action_tx);
    drain_queue_to_file(&action_rx, &config.output_dir, &format!("{label}-actions"))
        .context("writing action windows")?;

    let players_path = session_path(&config.output_dir, &format!("{label}-players"));
    let players = RecordLog::open(&players_path)
        .with_context(|| format!("opening {}", players_path.display()))?;
    for snapshot in report.players.values() {
        players.append(snapshot)?;
    }
    players.flush()?;

    tracing::info!(
        frames = report.frames,
        records = report.records,
        actions = report.actions,
        decode_errors = report.decode_errors,
        crc_failures = report.crc_failures,
        skipped_bytes = report.skipped_bytes,
        "replay finished"
    );
    Ok(report)
}
