//! # bluno-wire
//!
//! Packet framing for the Bluno Beetle BLE links worn by each player.
//!
//! Every frame on the serial GATT characteristic is exactly 20 bytes: a
//! metadata byte whose low nibble names the packet type, a little-endian
//! 16-bit sequence number, a 16-byte payload and a CRC-8 trailer.
//!
//! ## Crate structure
//!
//! - [`wire`] — `BlePacket`, sequence numbers, frame encode/decode
//! - [`classify`] — Metadata byte → `BlePacketType`
//! - [`payload`] — Typed interpretation of the 16-byte payload
//! - [`crc`] — CRC-8 trailer computation
//! - [`framer`] — Resynchronising deframer for raw byte streams
//! - [`handshake`] — Central-side HELLO/ACK/SYN+ACK state machine
//! - [`error`] — `WireError`

pub mod classify;
pub mod crc;
pub mod error;
pub mod framer;
pub mod handshake;
pub mod payload;
pub mod wire;

pub use classify::{classify, is_metadata_byte, BlePacketType};
pub use error::WireError;
pub use payload::Payload;
pub use wire::{BlePacket, SeqNum};
