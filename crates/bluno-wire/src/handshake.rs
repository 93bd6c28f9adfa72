//! # Link Handshake
//!
//! Central (laptop) side of the three-way handshake with a Beetle:
//!
//! ```text
//!   Hello ──send HELLO──▶ Ack ──recv ACK──▶ Syn ──send SYN+ACK──▶ Complete
//!                          │
//!                 NACK / timeout: resend HELLO, up to max_retransmits
//!                          │
//!                          ▼
//!                        Failed
//! ```
//!
//! Sans-I/O: the caller sends the packets this returns and feeds received
//! frames back in.

use quanta::{Clock, Instant};
use std::time::Duration;

use crate::classify::BlePacketType;
use crate::wire::{BlePacket, SeqNum, INITIAL_SEQ_NUM};

/// Time to wait for an ACK before retransmitting HELLO.
pub const BLE_TIMEOUT: Duration = Duration::from_millis(250);

/// HELLO retransmissions before giving up.
pub const MAX_RETRANSMITS: u32 = 5;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// HELLO not sent yet.
    Hello,
    /// HELLO sent, waiting for the Beetle's ACK.
    Ack,
    /// ACK received, SYN+ACK still to be sent.
    Syn,
    Complete,
    /// Retransmit budget exhausted.
    Failed,
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// Call [`Handshake::make_syn_ack`] and send the result.
    SendSynAck,
    /// Send this HELLO again.
    Retransmit(BlePacket),
    Failed,
    /// Frame not expected in the current state; drop it.
    Unexpected,
}

pub struct Handshake {
    status: HandshakeStatus,
    seq_num: SeqNum,
    clock: Clock,
    sent_at: Option<Instant>,
    timeout: Duration,
    max_retransmits: u32,
    retransmits: u32,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new(BLE_TIMEOUT, MAX_RETRANSMITS)
    }
}

impl Handshake {
    pub fn new(timeout: Duration, max_retransmits: u32) -> Self {
        Self::with_clock(Clock::new(), timeout, max_retransmits)
    }

    /// Use an explicit clock, e.g. `Clock::mock()` in tests.
    pub fn with_clock(clock: Clock, timeout: Duration, max_retransmits: u32) -> Self {
        Handshake {
            status: HandshakeStatus::Hello,
            seq_num: INITIAL_SEQ_NUM,
            clock,
            sent_at: None,
            timeout,
            max_retransmits,
            retransmits: 0,
        }
    }

    pub fn status(&self) -> HandshakeStatus {
        self.status
    }

    pub fn retransmits(&self) -> u32 {
        self.retransmits
    }

    pub fn is_complete(&self) -> bool {
        self.status == HandshakeStatus::Complete
    }

    /// Generate the HELLO that opens the handshake.
    pub fn start(&mut self) -> BlePacket {
        self.status = HandshakeStatus::Ack;
        self.retransmits = 0;
        self.sent_at = Some(self.clock.now());
        BlePacket::hello(self.seq_num)
    }

    /// Feed a received frame.
    pub fn on_packet(&mut self, pkt: &BlePacket) -> HandshakeEvent {
        if !pkt.is_valid() {
            return HandshakeEvent::Unexpected;
        }
        match (self.status, pkt.packet_type()) {
            (HandshakeStatus::Ack, Ok(BlePacketType::Ack)) => {
                self.status = HandshakeStatus::Syn;
                self.seq_num = pkt.seq_num;
                self.sent_at = None;
                HandshakeEvent::SendSynAck
            }
            (HandshakeStatus::Ack, Ok(BlePacketType::Nack)) => self.retransmit(),
            _ => HandshakeEvent::Unexpected,
        }
    }

    /// Generate the SYN+ACK that completes the handshake.
    pub fn make_syn_ack(&mut self) -> BlePacket {
        self.status = HandshakeStatus::Complete;
        BlePacket::ack(self.seq_num)
    }

    /// Check the ACK timer. Call periodically.
    pub fn check_timeout(&mut self) -> Option<HandshakeEvent> {
        if self.status != HandshakeStatus::Ack {
            return None;
        }
        let sent_at = self.sent_at?;
        if self.clock.now().duration_since(sent_at) <= self.timeout {
            return None;
        }
        Some(self.retransmit())
    }

    /// Return to the initial state, e.g. after the link reconnects.
    pub fn reset(&mut self) {
        self.status = HandshakeStatus::Hello;
        self.seq_num = INITIAL_SEQ_NUM;
        self.sent_at = None;
        self.retransmits = 0;
    }

    fn retransmit(&mut self) -> HandshakeEvent {
        self.retransmits += 1;
        if self.retransmits > self.max_retransmits {
            tracing::warn!(
                retransmits = self.retransmits,
                "handshake failed, no ACK from peripheral"
            );
            self.status = HandshakeStatus::Failed;
            self.sent_at = None;
            return HandshakeEvent::Failed;
        }
        tracing::debug!(attempt = self.retransmits, "retransmitting HELLO");
        self.sent_at = Some(self.clock.now());
        HandshakeEvent::Retransmit(BlePacket::hello(self.seq_num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mocked(max_retransmits: u32) -> (Handshake, std::sync::Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        (
            Handshake::with_clock(clock, Duration::from_millis(100), max_retransmits),
            mock,
        )
    }

    #[test]
    fn completes_on_ack() {
        let (mut hs, _mock) = mocked(3);
        let hello = hs.start();
        assert_eq!(hello.packet_type(), Ok(BlePacketType::Hello));
        assert_eq!(hs.status(), HandshakeStatus::Ack);

        let ev = hs.on_packet(&BlePacket::ack(SeqNum::new(0)));
        assert_eq!(ev, HandshakeEvent::SendSynAck);
        assert_eq!(hs.status(), HandshakeStatus::Syn);

        let syn_ack = hs.make_syn_ack();
        assert_eq!(syn_ack.packet_type(), Ok(BlePacketType::Ack));
        assert!(hs.is_complete());
    }

    #[test]
    fn retransmits_on_timeout_then_fails() {
        let (mut hs, mock) = mocked(2);
        hs.start();
        assert_eq!(hs.check_timeout(), None);

        mock.increment(Duration::from_millis(150));
        assert!(matches!(
            hs.check_timeout(),
            Some(HandshakeEvent::Retransmit(_))
        ));
        mock.increment(Duration::from_millis(150));
        assert!(matches!(
            hs.check_timeout(),
            Some(HandshakeEvent::Retransmit(_))
        ));
        mock.increment(Duration::from_millis(150));
        assert_eq!(hs.check_timeout(), Some(HandshakeEvent::Failed));
        assert_eq!(hs.status(), HandshakeStatus::Failed);
        assert_eq!(hs.check_timeout(), None);
    }

    #[test]
    fn nack_triggers_retransmit() {
        let (mut hs, _mock) = mocked(5);
        hs.start();
        let ev = hs.on_packet(&BlePacket::nack(SeqNum::new(0), "busy"));
        match ev {
            HandshakeEvent::Retransmit(pkt) => {
                assert_eq!(pkt.packet_type(), Ok(BlePacketType::Hello))
            }
            other => panic!("expected retransmit, got {other:?}"),
        }
        assert_eq!(hs.retransmits(), 1);
    }

    #[test]
    fn corrupted_or_out_of_order_frames_are_unexpected() {
        let (mut hs, _mock) = mocked(5);
        let mut ack = BlePacket::ack(SeqNum::new(0));
        assert_eq!(hs.on_packet(&ack), HandshakeEvent::Unexpected);

        hs.start();
        ack.crc ^= 1;
        assert_eq!(hs.on_packet(&ack), HandshakeEvent::Unexpected);
        assert_eq!(hs.status(), HandshakeStatus::Ack);
    }

    #[test]
    fn reset_returns_to_hello() {
        let (mut hs, _mock) = mocked(5);
        hs.start();
        hs.reset();
        assert_eq!(hs.status(), HandshakeStatus::Hello);
        assert_eq!(hs.check_timeout(), None);
    }
}
