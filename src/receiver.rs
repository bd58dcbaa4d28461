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

use std::io;
use std::marker::PhantomData;
use std::time::Duration;
use log::{debug, info, warn};
use crate::block::{Block, next_sequence};
use crate::protocol::*;
use crate::transport::{Transport, TransportErrorKind};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum ReceiverError {
    HandshakeTimeout { attempts: u32 },
    TransportTimeout(io::Error),
    Transport(TransportErrorKind, io::Error),
    Framing(String),
    TooManyRetries { sequence: u8, naks: u32 },
    Cancelled,
}

impl std::fmt::Display for ReceiverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiverError::HandshakeTimeout { attempts } => {
                write!(f, "Sender did not accept 'C' after {} attempts", attempts)
            }
            ReceiverError::TransportTimeout(e) => write!(f, "Timed out: {}", e),
            ReceiverError::Transport(kind, e) => write!(f, "Transport error ({}): {}", kind, e),
            ReceiverError::Framing(msg) => write!(f, "Framing error: {}", msg),
            ReceiverError::TooManyRetries { sequence, naks } => {
                write!(f, "Block {} rejected {} times in a row", sequence, naks)
            }
            ReceiverError::Cancelled => write!(f, "Transfer cancelled by sender"),
        }
    }
}

impl std::error::Error for ReceiverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReceiverError::TransportTimeout(e) => Some(e),
            ReceiverError::Transport(_, e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ReceiverError {
    fn from(err: io::Error) -> Self {
        match TransportErrorKind::of(&err) {
            TransportErrorKind::Timeout => ReceiverError::TransportTimeout(err),
            kind => ReceiverError::Transport(kind, err),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Deadline for each read and write
    pub timeout: Duration,
    /// Write attempts for the initial 'C'
    pub handshake_attempts: u32,
    /// NAKs in a row tolerated before aborting
    pub max_consecutive_naks: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            timeout: DEFAULT_TIMEOUT,
            handshake_attempts: HANDSHAKE_ATTEMPTS,
            max_consecutive_naks: MAX_CONSECUTIVE_NAKS,
        }
    }
}

// ============================================================================
// States
// ============================================================================

pub struct AwaitingStart;
pub struct Receiving;
pub struct NextFrame;
pub struct Terminating;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct ReceiverFsm<State> {
    state: PhantomData<State>,
    transport: Box<dyn Transport>,
    config: ReceiverConfig,
    frame: [u8; FRAME_LEN],
    frame_len: usize,
    expected_sequence: u8,
    blocks_received: usize,
    handshake_attempts: u32,
    consecutive_naks: u32,
    output: Vec<u8>,
}

// ============================================================================
// Trait
// ============================================================================

pub enum Transition {
    Next(Box<dyn ReceiverState>),
    Complete(Vec<u8>),
}

pub trait ReceiverState: Send {
    fn step(self: Box<Self>) -> Result<Transition, ReceiverError>;
}

// ============================================================================
// Helpers shared by all states
// ============================================================================

impl<S> ReceiverFsm<S> {
    fn transition<T>(self) -> Box<ReceiverFsm<T>> {
        Box::new(ReceiverFsm {
            state: PhantomData,
            transport: self.transport,
            config: self.config,
            frame: self.frame,
            frame_len: self.frame_len,
            expected_sequence: self.expected_sequence,
            blocks_received: self.blocks_received,
            handshake_attempts: self.handshake_attempts,
            consecutive_naks: self.consecutive_naks,
            output: self.output,
        })
    }

    fn io_error(&self, e: io::Error) -> ReceiverError {
        let type_name = std::any::type_name::<S>();
        let state_name = type_name.split("::").last().unwrap_or(type_name);
        ReceiverError::from(io::Error::new(
            e.kind(),
            format!("{} (in state: {})", e, state_name)
        ))
    }

    fn send(&mut self, byte: u8) -> Result<(), ReceiverError> {
        match self.transport.write_timeout(&[byte], self.config.timeout) {
            Ok(0) => Err(self.io_error(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("{} not written", control_name(byte))
            ))),
            Ok(_) => {
                debug!("Sent: {}", control_name(byte));
                Ok(())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn read_control(&mut self) -> Result<u8, ReceiverError> {
        let mut buf = [0u8; 1];
        match self.transport.read_timeout(&mut buf, self.config.timeout) {
            Ok(0) => Err(self.io_error(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by sender"
            ))),
            Ok(_) => {
                debug!("Received: {} (0x{:02X})", control_name(buf[0]), buf[0]);
                Ok(buf[0])
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Read the next frame into `frame`. Only STX frames carry more than
    /// the control byte.
    fn read_frame(&mut self) -> Result<(), ReceiverError> {
        self.frame[0] = self.read_control()?;
        self.frame_len = 1;

        if self.frame[0] != STX {
            return Ok(());
        }

        while self.frame_len < FRAME_LEN {
            let timeout = self.config.timeout;
            match self.transport.read_timeout(&mut self.frame[self.frame_len..], timeout) {
                Ok(0) => return Err(self.short_frame("connection closed")),
                Ok(n) => self.frame_len += n,
                Err(e) if TransportErrorKind::of(&e) == TransportErrorKind::Timeout => {
                    return Err(self.short_frame("timed out"));
                }
                Err(e) => return Err(self.io_error(e)),
            }
        }

        debug!("Received: {} byte frame", self.frame_len);
        Ok(())
    }

    fn short_frame(&self, why: &str) -> ReceiverError {
        ReceiverError::Framing(format!(
            "short block, {} of {} bytes before sender {}",
            self.frame_len, FRAME_LEN, why
        ))
    }

    /// Pick the next state from the control byte of the frame just read
    fn dispatch(mut self) -> Result<Transition, ReceiverError> {
        match self.frame[0] {
            STX => {
                self.blocks_received += 1;
                let next = self.transition::<Receiving>();
                Ok(Transition::Next(next))
            }
            EOT => {
                info!("Sender finished after {} blocks", self.blocks_received);
                let next = self.transition::<Terminating>();
                Ok(Transition::Next(next))
            }
            CAN => Err(ReceiverError::Cancelled),
            SOH => Err(ReceiverError::Framing(
                "128-byte SOH blocks are not supported".to_string()
            )),
            other => Err(ReceiverError::Framing(format!(
                "unexpected control byte 0x{:02X}", other
            ))),
        }
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl ReceiverState for ReceiverFsm<AwaitingStart> {
    fn step(self: Box<Self>) -> Result<Transition, ReceiverError> {
        let mut fsm = *self;

        if fsm.handshake_attempts >= fsm.config.handshake_attempts {
            return Err(ReceiverError::HandshakeTimeout { attempts: fsm.handshake_attempts });
        }
        fsm.handshake_attempts += 1;

        match fsm.transport.write_timeout(&[CRC_REQUEST], fsm.config.timeout) {
            Ok(0) => {
                debug!("'C' not written, retrying");
                Ok(Transition::Next(Box::new(fsm)))
            }
            Ok(_) => {
                debug!("Sent: 'C' (attempt {})", fsm.handshake_attempts);
                fsm.read_frame()?;
                fsm.dispatch()
            }
            Err(e) if TransportErrorKind::of(&e) == TransportErrorKind::Timeout => {
                warn!("Timed out sending 'C' (attempt {})", fsm.handshake_attempts);
                Ok(Transition::Next(Box::new(fsm)))
            }
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

impl ReceiverState for ReceiverFsm<Receiving> {
    fn step(self: Box<Self>) -> Result<Transition, ReceiverError> {
        let mut fsm = *self;

        let block = Block::parse(&fsm.frame[..fsm.frame_len])?;
        let crc_ok = block.crc_ok()?;
        let accepted = crc_ok && block.complement_ok() && block.sequence == fsm.expected_sequence;

        if accepted {
            fsm.output.extend_from_slice(block.payload);
            debug!(
                "{} block {} accepted, {} bytes total",
                control_name(block.control),
                block.sequence,
                fsm.output.len()
            );

            fsm.send(ACK)?;
            fsm.expected_sequence = next_sequence(fsm.expected_sequence);
            fsm.consecutive_naks = 0;
        } else {
            warn!(
                "Rejecting block {} (expected {}, crc 0x{:04X} {}, complement {})",
                block.sequence,
                fsm.expected_sequence,
                block.trailer,
                if crc_ok { "ok" } else { "bad" },
                if block.complement_ok() { "ok" } else { "bad" }
            );

            fsm.consecutive_naks += 1;
            if fsm.consecutive_naks > fsm.config.max_consecutive_naks {
                return Err(ReceiverError::TooManyRetries {
                    sequence: fsm.expected_sequence,
                    naks: fsm.config.max_consecutive_naks,
                });
            }
            fsm.send(NAK)?;
        }

        let next = fsm.transition::<NextFrame>();
        Ok(Transition::Next(next))
    }
}

impl ReceiverState for ReceiverFsm<NextFrame> {
    fn step(self: Box<Self>) -> Result<Transition, ReceiverError> {
        let mut fsm = *self;
        fsm.read_frame()?;
        fsm.dispatch()
    }
}

impl ReceiverState for ReceiverFsm<Terminating> {
    fn step(self: Box<Self>) -> Result<Transition, ReceiverError> {
        let mut fsm = *self;

        fsm.send(ACK)?;

        let last = fsm.read_control()?;
        if last == ETB || last == EOT {
            fsm.send(ACK)?;
        }

        Ok(Transition::Complete(fsm.output))
    }
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl ReceiverFsm<AwaitingStart> {
    pub fn new(transport: Box<dyn Transport>, config: ReceiverConfig) -> Box<dyn ReceiverState> {
        Box::new(ReceiverFsm {
            state: PhantomData::<AwaitingStart>,
            transport,
            config,
            frame: [0; FRAME_LEN],
            frame_len: 0,
            expected_sequence: 1,
            blocks_received: 0,
            handshake_attempts: 0,
            consecutive_naks: 0,
            output: Vec::new(),
        })
    }
}

/// Run one XMODEM-1K reception over `transport` and return the payload.
///
/// Blocks until the sender finishes or the session fails; nothing received
/// so far is returned on failure.
pub fn receive(transport: Box<dyn Transport>, config: ReceiverConfig) -> Result<Vec<u8>, ReceiverError> {
    info!("Starting XMODEM-1K receive");

    let mut state = ReceiverFsm::new(transport, config);
    loop {
        match state.step()? {
            Transition::Next(next) => state = next,
            Transition::Complete(data) => {
                info!("Received {} bytes", data.len());
                return Ok(data);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
