//! # Typed Payload Registry
//!
//! Interprets the 16-byte frame body according to the packet type. All
//! multi-byte fields are little-endian. Per-player types take the player id
//! from the type itself (P1_* / P2_*), leaving the whole body for readings.
//!
//! ```text
//! P1_IMU / P2_IMU     [0..12) accX accY accZ gyroX gyroY gyroZ (i16 LSB)
//!                     [12]    limb tag: 0 or 4 = glove, 1 = ankle
//!                     [13..16) padding, 4 (the padding count)
//! P*_IR_TRANS (gun)   [0]     is_fired (0/1)
//! P*_IR_RECV (vest)   [0]     is_hit (0/1)
//! GAME_STAT           [0..4)  player_id, player_hp, shield_hp, gun_ammo
//! NACK                [0..16) ASCII reason, zero padded, no NUL
//! HELLO / ACK         body ignored
//! ```

use bytes::{Buf, BufMut};
use std::fmt;

use crate::classify::BlePacketType;
use crate::error::WireError;
use crate::wire::PACKET_DATA_SIZE;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Axes per IMU sensor.
pub const IMU_DIMENSION: usize = 3;

/// Accelerometer LSB per g at the ±2 g range.
pub const ACC_LSB_SCALE: f32 = 16384.0;

/// Gyroscope LSB per deg/s at the ±250 deg/s range.
pub const GYRO_LSB_SCALE: f32 = 131.0;

const IMU_RAW_LEN: usize = 2 * 2 * IMU_DIMENSION;
const LIMB_OFFSET: usize = IMU_RAW_LEN;

/// Filler the glove firmware writes after the six axes: the number of
/// padding bytes, repeated.
const IMU_PADDING: u8 = (PACKET_DATA_SIZE - IMU_RAW_LEN) as u8;

/// Which body-worn IMU produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Limb {
    Glove = 0,
    Ankle = 1,
}

impl Limb {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 | IMU_PADDING => Some(Limb::Glove),
            1 => Some(Limb::Ankle),
            _ => None,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Limb::Glove => IMU_PADDING,
            Limb::Ankle => 1,
        }
    }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Glove IMU reading: acceleration in g, angular rate in deg/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuPacket {
    pub player_id: u8,
    pub accel: [f32; IMU_DIMENSION],
    pub gyro: [f32; IMU_DIMENSION],
}

/// Ankle IMU reading, same units as [`ImuPacket`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnklePacket {
    pub player_id: u8,
    pub accel: [f32; IMU_DIMENSION],
    pub gyro: [f32; IMU_DIMENSION],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStatePacket {
    pub player_id: u8,
    pub player_hp: u8,
    pub shield_hp: u8,
    pub gun_ammo: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GunPacket {
    pub player_id: u8,
    pub is_fired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VestPacket {
    pub player_id: u8,
    pub is_hit: bool,
}

/// Latest sensor picture of one player, folded from individual payloads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerData {
    pub player_id: u8,
    pub accel: [f32; IMU_DIMENSION],
    pub gyro: [f32; IMU_DIMENSION],
    pub is_fired: bool,
    pub is_hit: bool,
}

impl ImuPacket {
    /// Scale raw sensor counts (`accX..accZ, gyroX..gyroZ`).
    pub fn from_raw(player_id: u8, raw: [i16; 2 * IMU_DIMENSION]) -> Self {
        let (accel, gyro) = scale_raw(raw);
        ImuPacket {
            player_id,
            accel,
            gyro,
        }
    }

    /// Quantise back to sensor counts, saturating at the i16 range.
    pub fn to_raw(&self) -> [i16; 2 * IMU_DIMENSION] {
        quantise(&self.accel, &self.gyro)
    }
}

impl AnklePacket {
    pub fn from_raw(player_id: u8, raw: [i16; 2 * IMU_DIMENSION]) -> Self {
        let (accel, gyro) = scale_raw(raw);
        AnklePacket {
            player_id,
            accel,
            gyro,
        }
    }

    pub fn to_raw(&self) -> [i16; 2 * IMU_DIMENSION] {
        quantise(&self.accel, &self.gyro)
    }
}

impl PlayerData {
    pub fn new(player_id: u8) -> Self {
        PlayerData {
            player_id,
            accel: [0.0; IMU_DIMENSION],
            gyro: [0.0; IMU_DIMENSION],
            is_fired: false,
            is_hit: false,
        }
    }

    /// Fold one payload into a new snapshot. Payloads for other players, ankle
    /// readings and control packets leave the snapshot unchanged.
    pub fn with(self, payload: &Payload) -> Self {
        if payload.player_id() != Some(self.player_id) {
            return self;
        }
        match payload {
            Payload::Imu(imu) => PlayerData {
                accel: imu.accel,
                gyro: imu.gyro,
                ..self
            },
            Payload::Gun(gun) => PlayerData {
                is_fired: gun.is_fired,
                ..self
            },
            Payload::Vest(vest) => PlayerData {
                is_hit: vest.is_hit,
                ..self
            },
            _ => self,
        }
    }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// A frame body interpreted according to its packet type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Hello,
    Ack,
    Nack { reason: String },
    Imu(ImuPacket),
    Ankle(AnklePacket),
    Gun(GunPacket),
    Vest(VestPacket),
    GameState(GameStatePacket),
}

impl Payload {
    /// Reinterpret `data` as the record `packet_type` calls for.
    pub fn decode(packet_type: BlePacketType, data: &[u8]) -> Result<Self, WireError> {
        if data.len() != PACKET_DATA_SIZE {
            return Err(mismatch(packet_type, "payload must be 16 bytes"));
        }
        match packet_type {
            BlePacketType::Hello => Ok(Payload::Hello),
            BlePacketType::Ack => Ok(Payload::Ack),
            BlePacketType::Nack => Ok(Payload::Nack {
                reason: ascii_reason(data),
            }),
            BlePacketType::P1Imu => decode_imu(packet_type, 1, data),
            BlePacketType::P2Imu => decode_imu(packet_type, 2, data),
            BlePacketType::P1IrTrans => Ok(Payload::Gun(GunPacket {
                player_id: 1,
                is_fired: flag(packet_type, data[0])?,
            })),
            BlePacketType::P2IrTrans => Ok(Payload::Gun(GunPacket {
                player_id: 2,
                is_fired: flag(packet_type, data[0])?,
            })),
            BlePacketType::P1IrRecv => Ok(Payload::Vest(VestPacket {
                player_id: 1,
                is_hit: flag(packet_type, data[0])?,
            })),
            BlePacketType::P2IrRecv => Ok(Payload::Vest(VestPacket {
                player_id: 2,
                is_hit: flag(packet_type, data[0])?,
            })),
            BlePacketType::GameStat => {
                let mut buf = data;
                let state = GameStatePacket {
                    player_id: buf.get_u8(),
                    player_hp: buf.get_u8(),
                    shield_hp: buf.get_u8(),
                    gun_ammo: buf.get_u8(),
                };
                check_player(state.player_id)?;
                Ok(Payload::GameState(state))
            }
        }
    }

    /// Packet type and body for this payload.
    pub fn encode(&self) -> Result<(BlePacketType, [u8; PACKET_DATA_SIZE]), WireError> {
        let mut data = [0u8; PACKET_DATA_SIZE];
        let packet_type = match self {
            Payload::Hello => BlePacketType::Hello,
            Payload::Ack => BlePacketType::Ack,
            Payload::Nack { reason } => {
                if !reason.is_ascii() || reason.contains('\0') {
                    return Err(mismatch(BlePacketType::Nack, "reason must be ASCII without NUL"));
                }
                if reason.len() > PACKET_DATA_SIZE {
                    return Err(mismatch(BlePacketType::Nack, "reason longer than 16 bytes"));
                }
                data = ascii_field(reason);
                BlePacketType::Nack
            }
            Payload::Imu(imu) => {
                write_imu(&mut data, imu.to_raw(), Limb::Glove);
                BlePacketType::imu_for(imu.player_id)?
            }
            Payload::Ankle(ankle) => {
                write_imu(&mut data, ankle.to_raw(), Limb::Ankle);
                BlePacketType::imu_for(ankle.player_id)?
            }
            Payload::Gun(gun) => {
                data[0] = gun.is_fired as u8;
                BlePacketType::ir_trans_for(gun.player_id)?
            }
            Payload::Vest(vest) => {
                data[0] = vest.is_hit as u8;
                BlePacketType::ir_recv_for(vest.player_id)?
            }
            Payload::GameState(state) => {
                check_player(state.player_id)?;
                let mut buf = &mut data[..];
                buf.put_u8(state.player_id);
                buf.put_u8(state.player_hp);
                buf.put_u8(state.shield_hp);
                buf.put_u8(state.gun_ammo);
                BlePacketType::GameStat
            }
        };
        Ok((packet_type, data))
    }

    /// Player this payload concerns, if any.
    pub fn player_id(&self) -> Option<u8> {
        match self {
            Payload::Imu(p) => Some(p.player_id),
            Payload::Ankle(p) => Some(p.player_id),
            Payload::Gun(p) => Some(p.player_id),
            Payload::Vest(p) => Some(p.player_id),
            Payload::GameState(p) => Some(p.player_id),
            Payload::Hello | Payload::Ack | Payload::Nack { .. } => None,
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn mismatch(packet_type: BlePacketType, reason: &'static str) -> WireError {
    WireError::PayloadLayoutMismatch {
        packet_type,
        reason,
    }
}

fn check_player(player_id: u8) -> Result<(), WireError> {
    match player_id {
        1 | 2 => Ok(()),
        other => Err(WireError::UnknownPlayer(other)),
    }
}

fn flag(packet_type: BlePacketType, b: u8) -> Result<bool, WireError> {
    match b {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(mismatch(packet_type, "flag byte must be 0 or 1")),
    }
}

fn decode_imu(
    packet_type: BlePacketType,
    player_id: u8,
    data: &[u8],
) -> Result<Payload, WireError> {
    let mut buf = &data[..IMU_RAW_LEN];
    let mut raw = [0i16; 2 * IMU_DIMENSION];
    for axis in raw.iter_mut() {
        *axis = buf.get_i16_le();
    }
    match Limb::from_byte(data[LIMB_OFFSET]) {
        Some(Limb::Glove) => Ok(Payload::Imu(ImuPacket::from_raw(player_id, raw))),
        Some(Limb::Ankle) => Ok(Payload::Ankle(AnklePacket::from_raw(player_id, raw))),
        None => Err(mismatch(packet_type, "unknown IMU limb tag")),
    }
}

fn write_imu(data: &mut [u8; PACKET_DATA_SIZE], raw: [i16; 2 * IMU_DIMENSION], limb: Limb) {
    let mut buf = &mut data[..IMU_RAW_LEN];
    for axis in raw {
        buf.put_i16_le(axis);
    }
    data[IMU_RAW_LEN..].fill(IMU_PADDING);
    data[LIMB_OFFSET] = limb.tag();
}

fn scale_raw(raw: [i16; 2 * IMU_DIMENSION]) -> ([f32; IMU_DIMENSION], [f32; IMU_DIMENSION]) {
    let mut accel = [0.0; IMU_DIMENSION];
    let mut gyro = [0.0; IMU_DIMENSION];
    for i in 0..IMU_DIMENSION {
        accel[i] = raw[i] as f32 / ACC_LSB_SCALE;
        gyro[i] = raw[IMU_DIMENSION + i] as f32 / GYRO_LSB_SCALE;
    }
    (accel, gyro)
}

fn quantise(
    accel: &[f32; IMU_DIMENSION],
    gyro: &[f32; IMU_DIMENSION],
) -> [i16; 2 * IMU_DIMENSION] {
    // `as` saturates and maps NaN to 0.
    let mut raw = [0i16; 2 * IMU_DIMENSION];
    for i in 0..IMU_DIMENSION {
        raw[i] = (accel[i] * ACC_LSB_SCALE).round() as i16;
        raw[IMU_DIMENSION + i] = (gyro[i] * GYRO_LSB_SCALE).round() as i16;
    }
    raw
}

/// `s` as zero-padded bytes, cut at the last char boundary that fits.
pub(crate) fn ascii_field(s: &str) -> [u8; PACKET_DATA_SIZE] {
    let mut data = [0u8; PACKET_DATA_SIZE];
    let mut n = s.len().min(PACKET_DATA_SIZE);
    while !s.is_char_boundary(n) {
        n -= 1;
    }
    data[..n].copy_from_slice(&s.as_bytes()[..n]);
    data
}

fn ascii_reason(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

// ─── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for ImuPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImuPacket(playerID={}, accel={:?}, gyro={:?})",
            self.player_id, self.accel, self.gyro
        )
    }
}

impl fmt::Display for AnklePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AnklePacket(playerID={}, accel={:?}, gyro={:?})",
            self.player_id, self.accel, self.gyro
        )
    }
}

impl fmt::Display for GameStatePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GameStatePacket(playerID={}, playerHP={}, shieldHP={}, gunAmmo={})",
            self.player_id, self.player_hp, self.shield_hp, self.gun_ammo
        )
    }
}

impl fmt::Display for GunPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GunPacket(playerID={}, isFired={})",
            self.player_id, self.is_fired
        )
    }
}

impl fmt::Display for VestPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VestPacket(playerID={}, isHit={})",
            self.player_id, self.is_hit
        )
    }
}

impl fmt::Display for PlayerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlayerData(playerID={}, accel={:?}, gyro={:?}, isFired={}, isHit={})",
            self.player_id, self.accel, self.gyro, self.is_fired, self.is_hit
        )
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Hello => f.write_str("HELLO"),
            Payload::Ack => f.write_str("ACK"),
            Payload::Nack { reason } => write!(f, "NACK(reason={reason:?})"),
            Payload::Imu(p) => fmt::Display::fmt(p, f),
            Payload::Ankle(p) => fmt::Display::fmt(p, f),
            Payload::Gun(p) => fmt::Display::fmt(p, f),
            Payload::Vest(p) => fmt::Display::fmt(p, f),
            Payload::GameState(p) => fmt::Display::fmt(p, f),
        }
    }
}
