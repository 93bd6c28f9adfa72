//! # Stream Deframer
//!
//! BLE notifications do not respect frame boundaries: a 20-byte frame may
//! arrive split across notifications, and a link that drops a byte leaves the
//! reader misaligned. The deframer buffers incoming bytes and resynchronises
//! on the next byte that could be a metadata byte and, when CRC checking is
//! enabled, whose frame checksums correctly.

use bytes::{Buf, BytesMut};

use crate::classify::is_metadata_byte;
use crate::wire::{BlePacket, PACKET_SIZE};

/// Counters for a [`Deframer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeframerStats {
    /// Frames returned to the caller.
    pub frames: u64,
    /// Bytes discarded while resynchronising.
    pub skipped_bytes: u64,
    /// Candidate frames rejected on CRC.
    pub crc_failures: u64,
}

/// Incremental frame extractor over a raw byte stream.
#[derive(Debug)]
pub struct Deframer {
    buf: BytesMut,
    verify_crc: bool,
    stats: DeframerStats,
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer {
    /// Deframer that requires a valid CRC on every frame.
    pub fn new() -> Self {
        Deframer {
            buf: BytesMut::with_capacity(4 * PACKET_SIZE),
            verify_crc: true,
            stats: DeframerStats::default(),
        }
    }

    /// Accept frames regardless of their CRC byte.
    pub fn without_crc_check(mut self) -> Self {
        self.verify_crc = false;
        self
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> DeframerStats {
        self.stats
    }

    /// Extract the next frame, or `None` until more bytes are pushed.
    pub fn next_packet(&mut self) -> Option<BlePacket> {
        loop {
            let skipped = self.skip_to_metadata();
            if skipped > 0 {
                tracing::trace!(skipped, "deframer skipped non-metadata bytes");
            }
            if self.buf.len() < PACKET_SIZE {
                return None;
            }

            // Length is exactly PACKET_SIZE, so decode cannot fail.
            let packet = BlePacket::decode(&self.buf[..PACKET_SIZE]).ok()?;
            if self.verify_crc && !packet.has_valid_crc() {
                self.stats.crc_failures += 1;
                self.stats.skipped_bytes += 1;
                tracing::debug!(
                    metadata = packet.metadata,
                    seq = packet.seq_num.value(),
                    expected = packet.compute_crc(),
                    got = packet.crc,
                    "crc mismatch, resynchronising"
                );
                self.buf.advance(1);
                continue;
            }

            self.buf.advance(PACKET_SIZE);
            self.stats.frames += 1;
            return Some(packet);
        }
    }

    /// Drain every complete frame currently buffered.
    pub fn drain_packets(&mut self) -> impl Iterator<Item = BlePacket> + '_ {
        std::iter::from_fn(move || self.next_packet())
    }

    fn skip_to_metadata(&mut self) -> usize {
        let skip = self
            .buf
            .iter()
            .position(|&b| is_metadata_byte(b))
            .unwrap_or(self.buf.len());
        self.buf.advance(skip);
        self.stats.skipped_bytes += skip as u64;
        skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BlePacketType;
    use crate::wire::SeqNum;

    fn frame(seq: u16) -> [u8; PACKET_SIZE] {
        let mut data = [0u8; 16];
        data[0] = 1;
        BlePacket::new(BlePacketType::P1IrTrans, SeqNum::new(seq), data).to_frame()
    }

    #[test]
    fn reassembles_split_frames() {
        let f = frame(5);
        let mut d = Deframer::new();
        d.push(&f[..7]);
        assert!(d.next_packet().is_none());
        d.push(&f[7..]);
        let pkt = d.next_packet().unwrap();
        assert_eq!(pkt.seq_num.value(), 5);
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn skips_garbage_prefix() {
        let mut d = Deframer::new();
        d.push(&[0xFA, 0xFB, 0x0C]);
        d.push(&frame(1));
        let pkts: Vec<_> = d.drain_packets().collect();
        assert_eq!(pkts.len(), 1);
        assert_eq!(d.stats().skipped_bytes, 3);
        assert_eq!(d.stats().frames, 1);
    }

    #[test]
    fn recovers_after_corrupted_frame() {
        let mut bad = frame(1);
        bad[19] ^= 0x5A;
        let mut d = Deframer::new();
        d.push(&bad);
        d.push(&frame(2));
        d.push(&frame(3));
        let seqs: Vec<u16> = d.drain_packets().map(|p| p.seq_num.value()).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert!(d.stats().crc_failures >= 1);
    }

    #[test]
    fn crc_check_can_be_disabled() {
        let mut bad = frame(9);
        bad[19] ^= 0xFF;
        let mut d = Deframer::new().without_crc_check();
        d.push(&bad);
        let pkt = d.next_packet().unwrap();
        assert!(!pkt.has_valid_crc());
        assert_eq!(d.stats().crc_failures, 0);
    }
}
