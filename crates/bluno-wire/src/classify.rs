//! # Packet Classifier
//!
//! The low nibble of a frame's metadata byte is the packet type ordinal. The
//! high nibble is reserved (the Beetle firmware documents it as a padding
//! count) and is ignored here.
//!
//! The classifier doubles as the stream resynchronisation heuristic: a byte
//! whose low nibble is outside `[HELLO, GAME_STAT]` cannot start a frame.

use std::fmt;

use crate::error::WireError;

/// Mask selecting the packet type bits of a metadata byte.
pub const LOWER_4BITS_MASK: u8 = 0x0F;

/// Number of metadata bits used for the packet type.
pub const PACKET_TYPE_ID_LENGTH: u32 = 4;

// ─── Packet Type ─────────────────────────────────────────────────────────────

/// Packet type carried in the low nibble of the metadata byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BlePacketType {
    Hello = 0,
    Ack = 1,
    Nack = 2,
    P1Imu = 3,
    /// Player 1 vest received an IR hit.
    P1IrRecv = 4,
    /// Player 1 gun transmitted an IR shot.
    P1IrTrans = 5,
    P2Imu = 6,
    P2IrRecv = 7,
    P2IrTrans = 8,
    GameStat = 9,
}

impl BlePacketType {
    /// Every packet type, in ordinal order.
    pub const ALL: [BlePacketType; 10] = [
        BlePacketType::Hello,
        BlePacketType::Ack,
        BlePacketType::Nack,
        BlePacketType::P1Imu,
        BlePacketType::P1IrRecv,
        BlePacketType::P1IrTrans,
        BlePacketType::P2Imu,
        BlePacketType::P2IrRecv,
        BlePacketType::P2IrTrans,
        BlePacketType::GameStat,
    ];

    /// Look up a type by its (already masked) ordinal.
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(BlePacketType::Hello),
            1 => Some(BlePacketType::Ack),
            2 => Some(BlePacketType::Nack),
            3 => Some(BlePacketType::P1Imu),
            4 => Some(BlePacketType::P1IrRecv),
            5 => Some(BlePacketType::P1IrTrans),
            6 => Some(BlePacketType::P2Imu),
            7 => Some(BlePacketType::P2IrRecv),
            8 => Some(BlePacketType::P2IrTrans),
            9 => Some(BlePacketType::GameStat),
            _ => None,
        }
    }

    /// The ordinal as written into the metadata byte.
    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Player (1 or 2) implied by a per-player packet type.
    pub fn player(self) -> Option<u8> {
        match self {
            BlePacketType::P1Imu | BlePacketType::P1IrRecv | BlePacketType::P1IrTrans => Some(1),
            BlePacketType::P2Imu | BlePacketType::P2IrRecv | BlePacketType::P2IrTrans => Some(2),
            _ => None,
        }
    }

    /// HELLO, ACK and NACK carry link control rather than game data.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            BlePacketType::Hello | BlePacketType::Ack | BlePacketType::Nack
        )
    }

    pub(crate) fn imu_for(player_id: u8) -> Result<Self, WireError> {
        match player_id {
            1 => Ok(BlePacketType::P1Imu),
            2 => Ok(BlePacketType::P2Imu),
            other => Err(WireError::UnknownPlayer(other)),
        }
    }

    pub(crate) fn ir_recv_for(player_id: u8) -> Result<Self, WireError> {
        match player_id {
            1 => Ok(BlePacketType::P1IrRecv),
            2 => Ok(BlePacketType::P2IrRecv),
            other => Err(WireError::UnknownPlayer(other)),
        }
    }

    pub(crate) fn ir_trans_for(player_id: u8) -> Result<Self, WireError> {
        match player_id {
            1 => Ok(BlePacketType::P1IrTrans),
            2 => Ok(BlePacketType::P2IrTrans),
            other => Err(WireError::UnknownPlayer(other)),
        }
    }
}

impl fmt::Display for BlePacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlePacketType::Hello => "HELLO",
            BlePacketType::Ack => "ACK",
            BlePacketType::Nack => "NACK",
            BlePacketType::P1Imu => "P1_IMU",
            BlePacketType::P1IrRecv => "P1_IR_RECV",
            BlePacketType::P1IrTrans => "P1_IR_TRANS",
            BlePacketType::P2Imu => "P2_IMU",
            BlePacketType::P2IrRecv => "P2_IR_RECV",
            BlePacketType::P2IrTrans => "P2_IR_TRANS",
            BlePacketType::GameStat => "GAME_STAT",
        };
        f.write_str(name)
    }
}

impl TryFrom<u8> for BlePacketType {
    type Error = WireError;

    fn try_from(metadata: u8) -> Result<Self, Self::Error> {
        classify(metadata)
    }
}

// ─── Free functions ──────────────────────────────────────────────────────────

/// Raw packet type ordinal of a metadata byte (may be out of range).
#[inline]
pub fn metadata_to_packet_type(metadata: u8) -> u8 {
    metadata & LOWER_4BITS_MASK
}

/// Resolve a metadata byte to its packet type.
pub fn classify(metadata: u8) -> Result<BlePacketType, WireError> {
    let nibble = metadata_to_packet_type(metadata);
    BlePacketType::from_nibble(nibble).ok_or(WireError::InvalidPacketType { nibble })
}

/// Whether `byte` could be the first byte of a frame.
#[inline]
pub fn is_metadata_byte(byte: u8) -> bool {
    let nibble = metadata_to_packet_type(byte);
    (BlePacketType::Hello.value()..=BlePacketType::GameStat.value()).contains(&nibble)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_examples() {
        assert_eq!(classify(0x00), Ok(BlePacketType::Hello));
        assert_eq!(classify(0x13), Ok(BlePacketType::P1Imu));
        assert_eq!(classify(0x09), Ok(BlePacketType::GameStat));
        assert_eq!(classify(0xF6), Ok(BlePacketType::P2Imu));
    }

    #[test]
    fn classify_rejects_high_nibbles() {
        for b in 0x0Au8..=0x0F {
            assert_eq!(
                classify(b),
                Err(WireError::InvalidPacketType { nibble: b }),
                "{b:#x} should be invalid"
            );
            assert!(!is_metadata_byte(b));
            assert!(!is_metadata_byte(b | 0x70));
        }
    }

    #[test]
    fn classify_is_total_over_all_bytes() {
        for b in 0..=u8::MAX {
            let first = classify(b);
            assert_eq!(first, classify(b));
            assert_eq!(first.is_ok(), is_metadata_byte(b));
            assert_eq!(first.is_ok(), (b & 0x0F) <= 9);
        }
    }

    #[test]
    fn ordinals_roundtrip_through_nibble() {
        for t in BlePacketType::ALL {
            assert_eq!(BlePacketType::from_nibble(t.value()), Some(t));
            assert_eq!(BlePacketType::try_from(t.value() | 0xA0), Ok(t));
        }
    }

    #[test]
    fn player_and_control_partition() {
        assert_eq!(BlePacketType::P1IrTrans.player(), Some(1));
        assert_eq!(BlePacketType::P2IrRecv.player(), Some(2));
        assert_eq!(BlePacketType::GameStat.player(), None);
        assert!(BlePacketType::Nack.is_control());
        assert!(!BlePacketType::P1Imu.is_control());
        assert_eq!(BlePacketType::imu_for(3), Err(WireError::UnknownPlayer(3)));
    }

    #[test]
    fn display_uses_protocol_names() {
        assert_eq!(BlePacketType::P2IrTrans.to_string(), "P2_IR_TRANS");
        assert_eq!(BlePacketType::GameStat.to_string(), "GAME_STAT");
    }
}
