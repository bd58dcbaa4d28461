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

// XMODEM-1K receiver
mod block;
mod crc;
mod protocol;
mod receiver;
mod transport;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use serialport::{DataBits, Parity, StopBits};
use std::path::{Path, PathBuf};
use std::time::Duration;
use receiver::ReceiverConfig;
use transport::{SerialTransport, TcpTransport, Transport};

#[derive(Parser)]
#[command(name = "xmodem-rx")]
#[command(about = "Receive a file with XMODEM-1K (CRC) over a serial line or TCP", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// File to write the received data to
    #[arg(short, long)]
    output: PathBuf,

    /// Seconds to wait for each read or write
    #[arg(long, default_value = "10", value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Write attempts for the initial 'C' request
    #[arg(long, default_value = "10", value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    handshake_attempts: u32,

    /// Rejected blocks in a row before giving up
    #[arg(long, default_value = "10", value_name = "N")]
    retries: u32,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive over a serial port
    Serial {
        /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
        #[arg(short, long)]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value = "115200")]
        baud: u32,

        /// Data bits (5, 6, 7, or 8)
        #[arg(long, default_value = "8", value_name = "BITS")]
        data_bits: u8,

        /// Parity (none, odd, or even)
        #[arg(long, default_value = "none")]
        parity: String,

        /// Stop bits (1 or 2)
        #[arg(long, default_value = "1", value_name = "BITS")]
        stop_bits: u8,
    },
    /// Receive over TCP, either dialing the sender or waiting for it
    Tcp {
        /// Sender address to connect to (host:port)
        #[arg(long, value_name = "ADDR", conflicts_with = "listen", required_unless_present = "listen")]
        connect: Option<String>,

        /// Local address to accept one connection on (host:port)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity: {}. Must be 'none', 'odd', or 'even'", parity)),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

fn open_serial(port: &str, baud: u32, data_bits: u8, parity: &str, stop_bits: u8) -> Result<Box<dyn Transport>, String> {
    let data_bits = parse_data_bits(data_bits)?;
    let parity = parse_parity(parity)?;
    let stop_bits = parse_stop_bits(stop_bits)?;

    println!("Opening serial port: {}", port);
    println!("Settings: {} baud, {:?}, {:?}, {:?}", baud, data_bits, parity, stop_bits);

    let transport = SerialTransport::open(port, baud, data_bits, parity, stop_bits)
        .map_err(|e| format!("Failed to open serial port: {}", e))?;
    Ok(Box::new(transport))
}

fn open_tcp(connect: Option<String>, listen: Option<String>, timeout: Duration) -> Result<Box<dyn Transport>, String> {
    match (connect, listen) {
        (Some(addr), _) => {
            println!("Connecting to {}", addr);
            let transport = TcpTransport::connect(addr.as_str(), timeout)
                .map_err(|e| format!("Failed to connect to {}: {}", addr, e))?;
            Ok(Box::new(transport))
        }
        (None, Some(addr)) => {
            println!("Waiting for sender on {}", addr);
            let (transport, peer) = TcpTransport::accept(addr.as_str())
                .map_err(|e| format!("Failed to accept on {}: {}", addr, e))?;
            println!("Sender connected from {}", peer);
            Ok(Box::new(transport))
        }
        (None, None) => Err("Either --connect or --listen is required".to_string()),
    }
}

fn check_output(output: &Path) -> Result<(), String> {
    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(format!("Output directory not found: {}", parent.display()));
    }
    Ok(())
}

fn receive_file(transport: Box<dyn Transport>, output: &Path, config: ReceiverConfig) -> Result<usize, Box<dyn std::error::Error>> {
    let data = receiver::receive(transport, config)?;
    std::fs::write(output, &data)?;
    Ok(data.len())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = check_output(&cli.output) {
        fail(e);
    }

    let timeout = Duration::from_secs(cli.timeout);
    let config = ReceiverConfig {
        timeout,
        handshake_attempts: cli.handshake_attempts,
        max_consecutive_naks: cli.retries,
    };

    let transport = match cli.command {
        Commands::Serial { port, baud, data_bits, parity, stop_bits } => {
            open_serial(&port, baud, data_bits, &parity, stop_bits)
        }
        Commands::Tcp { connect, listen } => open_tcp(connect, listen, timeout),
    };
    let transport = match transport {
        Ok(t) => t,
        Err(e) => fail(e),
    };

    println!("\nReceiving to: {}", cli.output.display());
    match receive_file(transport, &cli.output, config) {
        Ok(len) => println!("\nReceived {} bytes successfully!", len),
        Err(e) => {
            eprintln!("Receive failed: {}", e);
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["xmodem-rx", "-o", "out.bin", "tcp", "--connect", "host:1234"])
            .expect("Should parse");
        assert_eq!(cli.timeout, 10);
        assert_eq!(cli.handshake_attempts, 10);
        assert_eq!(cli.retries, 10);
    }

    #[test]
    fn test_cli_rejects_zero_timeout() {
        let result = Cli::try_parse_from([
            "xmodem-rx", "-o", "out.bin", "--timeout", "0", "tcp", "--connect", "host:1234",
        ]);
        assert!(result.is_err(), "A zero deadline should be rejected");
    }

    #[test]
    fn test_cli_rejects_zero_handshake_attempts() {
        let result = Cli::try_parse_from([
            "xmodem-rx", "-o", "out.bin", "--handshake-attempts", "0", "serial", "-p", "/dev/ttyUSB0",
        ]);
        assert!(result.is_err(), "Zero handshake attempts should be rejected");
    }
}
