//! Relay-side collaborators for Bluno links.
//!
//! - **Config** — device roster, GATT identifiers, timing constants
//! - **Sink** — append-only `.dat` session logs
//! - **Action** — per-player IMU action windows with cooldown
//! - **Replay** — multi-producer capture replay into the sink

pub mod action;
pub mod config;
pub mod replay;
pub mod sink;
