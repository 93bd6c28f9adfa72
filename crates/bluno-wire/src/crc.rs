//! CRC-8 trailer.
//!
//! The Beetles use the Arduino `CRC8` library with its defaults (poly 0x07,
//! init 0, no reflection, no final xor), which is CRC-8/SMBUS. The checksum
//! covers metadata, both sequence bytes (low first) and the 16 payload bytes,
//! i.e. the first 19 bytes of the encoded frame.

use crc::{Crc, CRC_8_SMBUS};

use crate::wire::SeqNum;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Checksum over an arbitrary byte run.
pub fn crc8(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}

/// Checksum over the header and body fields of a frame.
pub fn frame_crc(metadata: u8, seq_num: SeqNum, data: &[u8]) -> u8 {
    let mut digest = CRC8.digest();
    digest.update(&[metadata]);
    digest.update(&seq_num.value().to_le_bytes());
    digest.update(data);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smbus_check_value() {
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn frame_crc_matches_flat_checksum() {
        let data = [0xAAu8; 16];
        let seq = SeqNum::new(0x1234);
        let mut flat = vec![0x03, 0x34, 0x12];
        flat.extend_from_slice(&data);
        assert_eq!(frame_crc(0x03, seq, &data), crc8(&flat));
    }

    #[test]
    fn sequence_byte_order_matters() {
        let data = [0u8; 16];
        assert_ne!(
            frame_crc(0x01, SeqNum::new(0x0102), &data),
            frame_crc(0x01, SeqNum::new(0x0201), &data)
        );
    }
}
