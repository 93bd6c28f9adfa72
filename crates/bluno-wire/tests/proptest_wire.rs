//! Property-based tests for the Bluno wire format.
//!
//! Frame length, decode/encode identity, classifier totality and deframer
//! resynchronisation across arbitrary inputs.

use proptest::prelude::*;

use bluno_wire::classify::{classify, is_metadata_byte, BlePacketType};
use bluno_wire::framer::Deframer;
use bluno_wire::payload::{GameStatePacket, GunPacket, ImuPacket, Payload, VestPacket};
use bluno_wire::wire::{BlePacket, SeqNum, PACKET_DATA_SIZE, PACKET_SIZE};
use bluno_wire::WireError;

// ─── Strategies ──────────────────────────────────────────────────────────────

fn packet_type() -> impl Strategy<Value = BlePacketType> {
    prop::sample::select(BlePacketType::ALL.to_vec())
}

fn ble_packet() -> impl Strategy<Value = BlePacket> {
    (
        any::<u8>(),
        any::<u16>(),
        any::<[u8; PACKET_DATA_SIZE]>(),
        any::<u8>(),
    )
        .prop_map(|(metadata, seq, data, crc)| BlePacket {
            metadata,
            seq_num: SeqNum::new(seq),
            data,
            crc,
        })
}

fn player() -> impl Strategy<Value = u8> {
    prop_oneof![Just(1u8), Just(2u8)]
}

fn game_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        (player(), any::<[i16; 6]>())
            .prop_map(|(id, raw)| Payload::Imu(ImuPacket::from_raw(id, raw))),
        (player(), any::<bool>()).prop_map(|(player_id, is_fired)| Payload::Gun(GunPacket {
            player_id,
            is_fired
        })),
        (player(), any::<bool>()).prop_map(|(player_id, is_hit)| Payload::Vest(VestPacket {
            player_id,
            is_hit
        })),
        (player(), any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(id, hp, shield, ammo)| {
            Payload::GameState(GameStatePacket {
                player_id: id,
                player_hp: hp,
                shield_hp: shield,
                gun_ammo: ammo,
            })
        }),
    ]
}

// ─── Codec ───────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn decode_inverts_encode(pkt in ble_packet()) {
        let frame = pkt.to_frame();
        prop_assert_eq!(frame.len(), PACKET_SIZE);
        prop_assert_eq!(BlePacket::decode(&frame).unwrap(), pkt);
    }

    #[test]
    fn decode_rejects_any_other_length(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assume!(bytes.len() != PACKET_SIZE);
        prop_assert_eq!(
            BlePacket::decode(&bytes),
            Err(WireError::MalformedFrame { len: bytes.len(), expected: PACKET_SIZE })
        );
    }

    #[test]
    fn constructed_packets_carry_valid_crc(
        t in packet_type(),
        seq in any::<u16>(),
        data in any::<[u8; PACKET_DATA_SIZE]>(),
    ) {
        let pkt = BlePacket::new(t, SeqNum::new(seq), data);
        prop_assert!(pkt.is_valid());
        prop_assert_eq!(pkt.packet_type(), Ok(t));
    }

    #[test]
    fn seq_num_accepts_exactly_16_bits(v in any::<u32>()) {
        let res = SeqNum::try_from(v);
        if v <= u16::MAX as u32 {
            prop_assert_eq!(res.map(SeqNum::value), Ok(v as u16));
        } else {
            prop_assert_eq!(res, Err(WireError::SequenceOutOfRange(v)));
        }
    }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn classify_is_idempotent_and_masks_high_nibble(b in any::<u8>()) {
        let once = classify(b);
        prop_assert_eq!(once.clone(), classify(b));
        prop_assert_eq!(once.clone(), classify(b & 0x0F));
        prop_assert_eq!(once.is_ok(), is_metadata_byte(b));
        if let Ok(t) = once {
            prop_assert_eq!(t.value(), b & 0x0F);
        }
    }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn typed_payload_survives_a_frame(seq in any::<u16>(), payload in game_payload()) {
        let pkt = BlePacket::from_payload(SeqNum::new(seq), &payload).unwrap();
        let decoded = BlePacket::decode(&pkt.to_frame()).unwrap();
        prop_assert!(decoded.is_valid());
        prop_assert_eq!(decoded.payload().unwrap(), payload);
    }
}

// ─── Deframer ────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn deframer_finds_frames_after_invalid_prefix(
        prefix in prop::collection::vec(0x0Au8..=0x0F, 0..32),
        seqs in prop::collection::vec(any::<u16>(), 1..8),
        split in 1usize..PACKET_SIZE,
    ) {
        let mut stream = prefix.clone();
        for &s in &seqs {
            stream.extend_from_slice(&BlePacket::ack(SeqNum::new(s)).to_frame());
        }

        let mut d = Deframer::new();
        let mut got = Vec::new();
        for chunk in stream.chunks(split) {
            d.push(chunk);
            got.extend(d.drain_packets().map(|p| p.seq_num.value()));
        }
        prop_assert_eq!(got, seqs);
        prop_assert_eq!(d.stats().skipped_bytes, prefix.len() as u64);
        prop_assert_eq!(d.buffered(), 0);
    }
}
