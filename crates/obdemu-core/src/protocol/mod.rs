//! Emulator Serial Protocol
//!
//! Implements the line-oriented `AT` command protocol of the OBD-II emulator.
//!
//! Requests are ASCII lines terminated by `\r`. Responses carry no terminator
//! and are framed by silence: see [`frame`].

pub mod commands;
mod connection;
mod error;
pub mod frame;
pub mod serial;
pub mod transport;
mod writer;

pub use commands::{BusProtocol, Command};
pub use connection::{Connection, ConnectionConfig, ConnectionState, PortSelector, FIRST_AVAILABLE};
pub use error::ProtocolError;
pub use frame::{FrameReader, FramingPolicy};
pub use serial::{list_ports, PortInfo, SerialPorts, SerialTransport};
pub use transport::{ByteTransport, PortProvider};
pub use writer::CommandWriter;

/// Baud rate the emulator listens on
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Silence that ends a response, in milliseconds
pub const DEFAULT_IDLE_QUANTUM_MS: u64 = 100;

/// Cap on one response drain, in milliseconds
pub const DEFAULT_MAX_WAIT_MS: u64 = 5000;

/// Byte that ends every command line
pub const LINE_TERMINATOR: u8 = b'\r';

/// Byte stripped from every response
pub const CARRIAGE_RETURN: u8 = 13;

/// Acknowledgement sent for accepted settings
pub const ACK: &str = "OK";
