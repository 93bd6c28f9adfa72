use thiserror::Error;

use crate::classify::BlePacketType;

/// Errors reported by the codec, classifier and payload registry.
///
/// None of these are fatal: a stream reader drops the offending bytes and
/// keeps scanning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("malformed frame: expected {expected} bytes, got {len}")]
    MalformedFrame { len: usize, expected: usize },
    #[error("invalid packet type nibble {nibble:#x}")]
    InvalidPacketType { nibble: u8 },
    #[error("payload layout mismatch for {packet_type:?}: {reason}")]
    PayloadLayoutMismatch {
        packet_type: BlePacketType,
        reason: &'static str,
    },
    #[error("sequence number {0} exceeds 16 bits")]
    SequenceOutOfRange(u32),
    #[error("unknown player id {0}")]
    UnknownPlayer(u8),
}
