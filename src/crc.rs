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

//! CRC-16/XMODEM: polynomial 0x1021, initial value 0, no reflection

const POLY: u16 = 0x1021;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Lookup table, one entry per value of the accumulator's high byte
/// XORed with the next input byte. Built at compile time, never mutated.
pub static CRC_TABLE: [u16; 256] = build_table();

/// CRC-16/XMODEM of `data`
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        let idx = ((crc >> 8) as u8 ^ byte) as usize;
        (crc << 8) ^ CRC_TABLE[idx]
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, RngCore};

    fn crc16_bitwise(data: &[u8]) -> u16 {
        let mut crc = 0u16;
        for &byte in data {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            }
        }
        crc
    }

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_table_matches_canonical_entries() {
        assert_eq!(CRC_TABLE[0x00], 0x0000);
        assert_eq!(CRC_TABLE[0x01], 0x1021);
        assert_eq!(CRC_TABLE[0x0F], 0xF1EF);
        assert_eq!(CRC_TABLE[0x10], 0x1231);
        assert_eq!(CRC_TABLE[0x80], 0x9188);
        assert_eq!(CRC_TABLE[0xC0], 0xD94C);
        assert_eq!(CRC_TABLE[0xC8], 0x5844);
        assert_eq!(CRC_TABLE[0xFF], 0x1EF0);
    }

    #[test]
    fn test_full_table_matches_bitwise() {
        for (i, &entry) in CRC_TABLE.iter().enumerate() {
            // One byte through a zero accumulator yields table[byte]
            assert_eq!(entry, crc16_bitwise(&[i as u8]), "entry 0x{:02X}", i);
        }
    }

    #[test]
    fn test_table_rows_match_published_table() {
        assert_eq!(
            &CRC_TABLE[0x00..0x08],
            &[0x0000u16, 0x1021, 0x2042, 0x3063, 0x4084, 0x50A5, 0x60C6, 0x70E7]
        );
        assert_eq!(
            &CRC_TABLE[0x78..0x80],
            &[0xFF9Fu16, 0xEFBE, 0xDFDD, 0xCFFC, 0xBF1B, 0xAF3A, 0x9F59, 0x8F78]
        );
        assert_eq!(
            &CRC_TABLE[0xF8..0x100],
            &[0x6E17u16, 0x7E36, 0x4E55, 0x5E74, 0x2E93, 0x3EB2, 0x0ED1, 0x1EF0]
        );
    }

    #[test]
    fn test_deterministic() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let first = crc16(data);
        for _ in 0..10 {
            assert_eq!(crc16(data), first);
        }
    }

    #[test]
    fn test_matches_bitwise_and_reference() {
        let reference = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);
        let mut rng = rand::thread_rng();

        for _ in 0..64 {
            let len = rng.gen_range(0..2048);
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);

            let expected = reference.checksum(&data);
            assert_eq!(crc16(&data), expected, "len {}", len);
            assert_eq!(crc16_bitwise(&data), expected, "len {}", len);
        }
    }
}
