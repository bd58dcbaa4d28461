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

//! XMODEM-1K (CRC) protocol constants

use std::time::Duration;

/// 'C' - receiver requests a CRC-16 mode transmission
pub const CRC_REQUEST: u8 = b'C';

/// Start of header - a 128-byte block follows (not supported)
pub const SOH: u8 = 0x01;

/// Start of text - a 1024-byte block follows
pub const STX: u8 = 0x02;

/// End of transmission - sender has no more blocks
pub const EOT: u8 = 0x04;

/// Acknowledge - block or phase accepted
pub const ACK: u8 = 0x06;

/// Negative acknowledge - block rejected, retransmit
pub const NAK: u8 = 0x15;

/// End of transmission block - sender confirms shutdown
pub const ETB: u8 = 0x17;

/// Cancel - sender aborted the transfer
pub const CAN: u8 = 0x18;

/// Control code, sequence number and its complement
pub const HEADER_LEN: usize = 3;

/// Payload carried by an STX block
pub const BLOCK_PAYLOAD_LEN: usize = 1024;

/// Big-endian CRC-16 trailer
pub const CRC_LEN: usize = 2;

/// A complete STX frame on the wire
pub const FRAME_LEN: usize = HEADER_LEN + BLOCK_PAYLOAD_LEN + CRC_LEN;

/// Smallest region accepted by the validator (payload + trailer)
pub const MIN_BLOCK_LEN: usize = BLOCK_PAYLOAD_LEN + CRC_LEN;

/// Deadline applied to every read and write
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Write attempts for the 'C' request before giving up
pub const HANDSHAKE_ATTEMPTS: u32 = 10;

/// NAKs in a row without an accepted block before the session aborts
pub const MAX_CONSECUTIVE_NAKS: u32 = 10;

/// Human readable name of a control byte, for diagnostics
pub fn control_name(byte: u8) -> &'static str {
    match byte {
        CRC_REQUEST => "'C'",
        SOH => "SOH",
        STX => "STX",
        EOT => "EOT",
        ACK => "ACK",
        NAK => "NAK",
        ETB => "ETB",
        CAN => "CAN",
        _ => "unknown",
    }
}
