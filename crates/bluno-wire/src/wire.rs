//! # Bluno Wire Format
//!
//! Fixed 20-byte frame, no padding, sequence number little-endian (the
//! Beetle firmware reassembles it as `low + (high << 8)`).
//!
//! ```text
//!  0        1        2        3                              18       19
//! +--------+--------+--------+------------ ... -------------+--------+
//! |metadata| seq lo | seq hi |        data (16 bytes)        |  crc   |
//! +--------+--------+--------+------------ ... -------------+--------+
//!  metadata: high nibble reserved (padding count), low nibble packet type
//! ```

use bytes::{Buf, BufMut};
use std::fmt;

use crate::classify::{classify, BlePacketType, LOWER_4BITS_MASK, PACKET_TYPE_ID_LENGTH};
use crate::crc::frame_crc;
use crate::error::WireError;
use crate::payload::Payload;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Total encoded frame length.
pub const PACKET_SIZE: usize = 20;

/// Length of the opaque payload field.
pub const PACKET_DATA_SIZE: usize = 16;

/// Largest sequence number before wrapping.
pub const MAX_SEQ_NUM: u16 = u16::MAX;

/// Sequence number a fresh link starts from.
pub const INITIAL_SEQ_NUM: SeqNum = SeqNum(0);

// ─── Sequence Number ─────────────────────────────────────────────────────────

/// A 16-bit frame sequence number. Advancing past 65535 wraps to 0.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(u16);

impl SeqNum {
    #[inline]
    pub const fn new(val: u16) -> Self {
        SeqNum(val)
    }

    #[inline]
    pub fn value(self) -> u16 {
        self.0
    }

    /// The following sequence number, wrapping at [`MAX_SEQ_NUM`].
    #[inline]
    pub fn next(self) -> Self {
        SeqNum(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNum({})", self.0)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for SeqNum {
    fn from(v: u16) -> Self {
        SeqNum(v)
    }
}

impl TryFrom<u32> for SeqNum {
    type Error = WireError;

    /// Values above 65535 are rejected rather than silently truncated.
    fn try_from(v: u32) -> Result<Self, Self::Error> {
        u16::try_from(v)
            .map(SeqNum)
            .map_err(|_| WireError::SequenceOutOfRange(v))
    }
}

// ─── BlePacket ───────────────────────────────────────────────────────────────

/// One frame exactly as it travels over the serial characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlePacket {
    pub metadata: u8,
    pub seq_num: SeqNum,
    pub data: [u8; PACKET_DATA_SIZE],
    /// Carried as received. Use [`BlePacket::has_valid_crc`] to check it.
    pub crc: u8,
}

impl BlePacket {
    /// Build a frame of `packet_type` with a freshly computed CRC.
    pub fn new(packet_type: BlePacketType, seq_num: SeqNum, data: [u8; PACKET_DATA_SIZE]) -> Self {
        let metadata = packet_type.value();
        BlePacket {
            metadata,
            seq_num,
            data,
            crc: frame_crc(metadata, seq_num, &data),
        }
    }

    pub fn hello(seq_num: SeqNum) -> Self {
        Self::new(BlePacketType::Hello, seq_num, [0; PACKET_DATA_SIZE])
    }

    pub fn ack(seq_num: SeqNum) -> Self {
        Self::new(BlePacketType::Ack, seq_num, [0; PACKET_DATA_SIZE])
    }

    /// NACK carrying `reason` zero padded. Longer reasons are cut to 16 bytes
    /// at a char boundary; [`Payload::encode`] rejects them instead.
    pub fn nack(seq_num: SeqNum, reason: &str) -> Self {
        Self::new(
            BlePacketType::Nack,
            seq_num,
            crate::payload::ascii_field(reason),
        )
    }

    /// Encode a typed payload into a frame.
    pub fn from_payload(seq_num: SeqNum, payload: &Payload) -> Result<Self, WireError> {
        let (packet_type, data) = payload.encode()?;
        Ok(Self::new(packet_type, seq_num, data))
    }

    /// Write the 20-byte frame into `buf`. Panics if `buf` lacks capacity.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.metadata);
        buf.put_u16_le(self.seq_num.value());
        buf.put_slice(&self.data);
        buf.put_u8(self.crc);
    }

    /// The encoded frame as a fixed array.
    pub fn to_frame(&self) -> [u8; PACKET_SIZE] {
        let mut frame = [0u8; PACKET_SIZE];
        let mut cursor = &mut frame[..];
        self.encode(&mut cursor);
        frame
    }

    /// Decode a frame. The input must be exactly [`PACKET_SIZE`] bytes; the
    /// metadata and CRC are not validated here.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != PACKET_SIZE {
            return Err(WireError::MalformedFrame {
                len: bytes.len(),
                expected: PACKET_SIZE,
            });
        }
        let mut buf = bytes;
        let metadata = buf.get_u8();
        let seq_num = SeqNum(buf.get_u16_le());
        let mut data = [0u8; PACKET_DATA_SIZE];
        buf.copy_to_slice(&mut data);
        let crc = buf.get_u8();
        Ok(BlePacket {
            metadata,
            seq_num,
            data,
            crc,
        })
    }

    /// Packet type from the metadata nibble.
    pub fn packet_type(&self) -> Result<BlePacketType, WireError> {
        classify(self.metadata)
    }

    /// Reserved high nibble of the metadata byte.
    pub fn padding_len(&self) -> u8 {
        self.metadata >> PACKET_TYPE_ID_LENGTH
    }

    /// Raw low nibble, even when it names no known type.
    pub fn type_nibble(&self) -> u8 {
        self.metadata & LOWER_4BITS_MASK
    }

    /// CRC the sender should have computed for this frame.
    pub fn compute_crc(&self) -> u8 {
        frame_crc(self.metadata, self.seq_num, &self.data)
    }

    pub fn has_valid_crc(&self) -> bool {
        self.compute_crc() == self.crc
    }

    /// Known packet type and matching CRC.
    pub fn is_valid(&self) -> bool {
        self.packet_type().is_ok() && self.has_valid_crc()
    }

    /// Interpret the payload according to the metadata type.
    pub fn payload(&self) -> Result<Payload, WireError> {
        Payload::decode(self.packet_type()?, &self.data)
    }
}

impl fmt::Display for BlePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlePacket(metadata={:#04x}, seq_num={}, data={:02x?}, crc={:#04x})",
            self.metadata, self.seq_num, self.data, self.crc
        )
    }
}
