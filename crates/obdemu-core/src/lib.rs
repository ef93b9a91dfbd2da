//! # ObdEmu Core Library
//!
//! Client for the `AT` command protocol spoken by serial OBD-II vehicle
//! emulators.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Command framing and idle-timeout response framing over a serial link
//! - Get/set operations for the emulator's simulated vehicle parameters
//! - Hex and unit scaling conversions between device and physical values
//! - An in-process simulated emulator for running without hardware
//!
//! ## Example
//!
//! ```rust,no_run
//! use obdemu_core::protocol::{ConnectionConfig, PortSelector};
//! use obdemu_core::ProtocolClient;
//!
//! # fn main() -> Result<(), obdemu_core::protocol::ProtocolError> {
//! let mut car = ProtocolClient::new(ConnectionConfig::default());
//! car.connect(&PortSelector::named("/dev/ttyUSB0"))?;
//!
//! car.set_engine_started(true)?;
//! car.set_engine_rpm(2400)?;
//! println!("RPM: {}", car.get_engine_rpm()?);
//!
//! car.close()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod pid;
pub mod protocol;
pub mod sim;

pub use client::ProtocolClient;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{format_vin, ProtocolClient};
    pub use crate::codec::{hex_to_integer, integer_to_hex, DecodeError};
    pub use crate::pid::{MilStatus, Pid};
    pub use crate::protocol::{
        BusProtocol, ByteTransport, Command, ConnectionConfig, ConnectionState, FramingPolicy,
        PortProvider, PortSelector, ProtocolError,
    };
    pub use crate::sim::{SimulatedEmulator, SimulatedPorts};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
