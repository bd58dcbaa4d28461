// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Frame parsing and CRC validation for 1K blocks

use crate::crc::crc16;
use crate::protocol::*;
use crate::receiver::ReceiverError;

/// Check the CRC trailer of `region` (payload followed by a big-endian CRC-16).
///
/// A mismatch is `Ok(false)`, a region too short to hold a 1K block is a
/// framing error.
pub fn validate(region: &[u8]) -> Result<bool, ReceiverError> {
    if region.len() < MIN_BLOCK_LEN {
        return Err(ReceiverError::Framing(format!(
            "block too short: {} bytes, need at least {}",
            region.len(),
            MIN_BLOCK_LEN
        )));
    }

    let (data, trailer) = region.split_at(region.len() - CRC_LEN);
    let expected = u16::from_be_bytes([trailer[0], trailer[1]]);
    Ok(crc16(data) == expected)
}

/// Sequence number that follows `seq`. Runs 1..=255 and wraps back to 1.
pub fn next_sequence(seq: u8) -> u8 {
    if seq == u8::MAX { 1 } else { seq + 1 }
}

/// One STX frame split into its fields
#[derive(Debug)]
pub struct Block<'a> {
    pub control: u8,
    pub sequence: u8,
    pub complement: u8,
    pub payload: &'a [u8],
    pub trailer: u16,
    body: &'a [u8],
}

impl<'a> Block<'a> {
    pub fn parse(frame: &'a [u8]) -> Result<Self, ReceiverError> {
        if frame.len() < FRAME_LEN {
            return Err(ReceiverError::Framing(format!(
                "frame too short: {} bytes, need {}",
                frame.len(),
                FRAME_LEN
            )));
        }

        let body = &frame[HEADER_LEN..FRAME_LEN];
        let (payload, trailer) = body.split_at(BLOCK_PAYLOAD_LEN);

        Ok(Block {
            control: frame[0],
            sequence: frame[1],
            complement: frame[2],
            payload,
            trailer: u16::from_be_bytes([trailer[0], trailer[1]]),
            body,
        })
    }

    pub fn crc_ok(&self) -> Result<bool, ReceiverError> {
        validate(self.body)
    }

    pub fn complement_ok(&self) -> bool {
        self.complement == !self.sequence
    }
}

/// Build a well formed STX frame, for driving the receiver in tests
#[cfg(test)]
pub fn build_frame(sequence: u8, payload: &[u8]) -> Vec<u8> {
    assert_eq!(payload.len(), BLOCK_PAYLOAD_LEN);

    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.push(STX);
    frame.push(sequence);
    frame.push(!sequence);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc16(payload).to_be_bytes());
    frame
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_payload() -> Vec<u8> {
        let mut payload = vec![0u8; BLOCK_PAYLOAD_LEN];
        rand::thread_rng().fill_bytes(&mut payload);
        payload
    }

    fn with_crc(payload: &[u8]) -> Vec<u8> {
        let mut region = payload.to_vec();
        region.extend_from_slice(&crc16(payload).to_be_bytes());
        region
    }

    #[test]
    fn test_validate_accepts_correct_trailer() {
        for _ in 0..16 {
            let region = with_crc(&random_payload());
            assert!(validate(&region).expect("Region is long enough"));
        }
    }

    #[test]
    fn test_validate_rejects_wrong_trailer() {
        let mut region = with_crc(&[0x1A; BLOCK_PAYLOAD_LEN]);
        let last = region.len() - 1;
        region[last] ^= 0x01;
        assert!(!validate(&region).expect("Mismatch is not an error"));
    }

    #[test]
    fn test_validate_short_region_is_framing_error() {
        let region = vec![0u8; MIN_BLOCK_LEN - 1];
        match validate(&region) {
            Err(ReceiverError::Framing(_)) => {}
            other => panic!("Expected framing error, got {:?}", other),
        }
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let region = with_crc(&random_payload());

        for byte in 0..region.len() {
            for bit in 0..8 {
                let mut corrupted = region.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    !validate(&corrupted).expect("Region is long enough"),
                    "Flip of bit {} in byte {} went undetected", bit, byte
                );
            }
        }
    }

    #[test]
    fn test_parse_fields() {
        let payload = random_payload();
        let frame = build_frame(7, &payload);
        let block = Block::parse(&frame).expect("Frame is complete");

        assert_eq!(block.control, STX);
        assert_eq!(block.sequence, 7);
        assert_eq!(block.complement, 0xF8);
        assert_eq!(block.payload, &payload[..]);
        assert_eq!(block.trailer, crc16(&payload));
        assert!(block.complement_ok());
        assert!(block.crc_ok().expect("Frame is complete"));
    }

    #[test]
    fn test_parse_short_frame() {
        let frame = vec![STX, 1, 0xFE, 0x00];
        assert!(matches!(Block::parse(&frame), Err(ReceiverError::Framing(_))));
    }

    #[test]
    fn test_bad_complement() {
        let mut frame = build_frame(3, &[0u8; BLOCK_PAYLOAD_LEN]);
        frame[2] = 3;
        let block = Block::parse(&frame).expect("Frame is complete");
        assert!(!block.complement_ok());
        assert!(block.crc_ok().expect("Frame is complete"));
    }

    #[test]
    fn test_next_sequence_wraps_to_one() {
        assert_eq!(next_sequence(1), 2);
        assert_eq!(next_sequence(254), 255);
        assert_eq!(next_sequence(255), 1);
    }
}
