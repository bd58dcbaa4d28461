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

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;
use serialport::{SerialPort, DataBits, Parity, StopBits};

// ============================================================================
// Transport Trait
// ============================================================================

/// Duplex byte stream the receiver talks XMODEM over. Every call carries
/// its own deadline.
pub trait Transport: Send {
    fn write_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize>;

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Transport failures as the protocol cares about them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Closed,
    Other,
}

impl TransportErrorKind {
    pub fn of(err: &io::Error) -> Self {
        match err.kind() {
            // Socket timeouts surface as WouldBlock on unix
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => TransportErrorKind::Closed,
            _ => TransportErrorKind::Other,
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Closed => write!(f, "closed"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

// ============================================================================
// Serial Port Transport
// ============================================================================

/// Serial line transport backed by the serialport crate
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn write_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout).map_err(io::Error::other)?;
        let written = self.port.write(buf)?;
        self.port.flush()?;
        Ok(written)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout).map_err(io::Error::other)?;
        self.port.read(buf)
    }
}

// ============================================================================
// TCP Transport
// ============================================================================

/// TCP transport; deadlines map onto the socket read/write timeouts
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }

    /// Dial `address`, trying each resolved address in turn
    pub fn connect<A: ToSocketAddrs>(address: A, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(TcpTransport::new(stream)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        }))
    }

    /// Listen on `address` and take the first connection
    pub fn accept<A: ToSocketAddrs>(address: A) -> io::Result<(Self, SocketAddr)> {
        let listener = TcpListener::bind(address)?;
        let (stream, peer) = listener.accept()?;
        Ok((TcpTransport::new(stream), peer))
    }
}

impl Transport for TcpTransport {
    fn write_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        self.stream.set_write_timeout(Some(timeout))?;
        self.stream.write(buf)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.read(buf)
    }
}

// ============================================================================
// Mock Transport for Testing
// ============================================================================

#[cfg(test)]
pub struct MockTransport {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Per write call: Some(kind) fails that call
    write_errors: Vec<Option<io::ErrorKind>>,
    write_calls: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    // Deadline every call must carry, when set
    expected_timeout: Option<Duration>,
    timeouts: Vec<Duration>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockTransport {
            read_buffer: responses,
            read_pos: 0,
            write_errors: Vec::new(),
            write_calls: 0,
            write_log: Vec::new(),
            expected_writes,
            expected_timeout: None,
            timeouts: Vec::new(),
        }
    }

    pub fn with_write_errors(mut self, errors: Vec<Option<io::ErrorKind>>) -> Self {
        self.write_errors = errors;
        self
    }

    pub fn with_expected_timeout(mut self, timeout: Duration) -> Self {
        self.expected_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    fn write_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        self.timeouts.push(timeout);
        let call = self.write_calls;
        self.write_calls += 1;

        if let Some(Some(kind)) = self.write_errors.get(call) {
            return Err(io::Error::new(*kind, "Mock write failure"));
        }

        self.write_log.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.timeouts.push(timeout);

        // Out of responses = timeout
        if self.read_pos >= self.read_buffer.len() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Mock timeout"));
        }

        // If current response is None = timeout
        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Mock timeout"));
        }

        let mut bytes_read = 0;
        while bytes_read < buf.len() && self.read_pos < self.read_buffer.len() {
            match self.read_buffer[self.read_pos] {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                    self.read_pos += 1;
                }
                None => break,  // Stop at timeout marker
            }
        }

        Ok(bytes_read)
    }
}

#[cfg(test)]
impl Drop for MockTransport {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockTransport dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        if let Some(expected) = self.expected_timeout {
            assert!(!self.timeouts.is_empty(), "MockTransport was never called");
            for (call, timeout) in self.timeouts.iter().enumerate() {
                assert_eq!(
                    *timeout, expected,
                    "MockTransport call {} used deadline {:?}, expected {:?}",
                    call, timeout, expected
                );
            }
        }

        assert!(
            self.write_calls >= self.write_errors.len(),
            "MockTransport dropped with {} unused write failures",
            self.write_errors.len() - self.write_calls
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockTransport write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let kind = |k| TransportErrorKind::of(&io::Error::new(k, "x"));

        assert_eq!(kind(io::ErrorKind::TimedOut), TransportErrorKind::Timeout);
        assert_eq!(kind(io::ErrorKind::WouldBlock), TransportErrorKind::Timeout);
        assert_eq!(kind(io::ErrorKind::ConnectionReset), TransportErrorKind::Closed);
        assert_eq!(kind(io::ErrorKind::BrokenPipe), TransportErrorKind::Closed);
        assert_eq!(kind(io::ErrorKind::UnexpectedEof), TransportErrorKind::Closed);
        assert_eq!(kind(io::ErrorKind::PermissionDenied), TransportErrorKind::Other);
    }

    #[test]
    fn test_tcp_read_timeout_is_classified_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Should bind");
        let addr = listener.local_addr().expect("Should have address");

        let mut client = TcpTransport::connect(addr, Duration::from_secs(1)).expect("Should connect");
        let (_server, _) = listener.accept().expect("Should accept");

        let mut buf = [0u8; 1];
        let err = client
            .read_timeout(&mut buf, Duration::from_millis(50))
            .expect_err("Silent peer should time out");
        assert_eq!(TransportErrorKind::of(&err), TransportErrorKind::Timeout);
    }

    #[test]
    fn test_mock_stops_at_timeout_marker() {
        let mut mock = MockTransport::new(vec![Some(1), Some(2), None, Some(3)], vec![]);
        let mut buf = [0u8; 8];

        assert_eq!(mock.read_timeout(&mut buf, Duration::ZERO).expect("Data"), 2);
        assert_eq!(&buf[..2], &[1, 2]);
        assert!(mock.read_timeout(&mut buf, Duration::ZERO).is_err());
        assert_eq!(mock.read_timeout(&mut buf, Duration::ZERO).expect("Data"), 1);
    }
}
