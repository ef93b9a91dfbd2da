//! Protocol commands
//!
//! Defines the `AT` commands understood by the emulator and their wire text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ProtocolError, LINE_TERMINATOR};

/// Diagnostic bus the emulator presents to a scan tool (`ATBUS`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BusProtocol {
    /// ISO 15765-4 CAN, 11 bit ID, 500 kbaud
    Can11Bit500k,
    /// ISO 15765-4 CAN, 29 bit ID, 500 kbaud
    Can29Bit500k,
    /// ISO 15765-4 CAN, 11 bit ID, 250 kbaud
    Can11Bit250k,
    /// ISO 15765-4 CAN, 29 bit ID, 250 kbaud
    Can29Bit250k,
    /// Any other name, passed through verbatim
    Other(String),
}

impl BusProtocol {
    /// Name used on the wire
    pub fn name(&self) -> &str {
        match self {
            BusProtocol::Can11Bit500k => "CAN_11B_500K",
            BusProtocol::Can29Bit500k => "CAN_29B_500K",
            BusProtocol::Can11Bit250k => "CAN_11B_250K",
            BusProtocol::Can29Bit250k => "CAN_29B_250K",
            BusProtocol::Other(name) => name,
        }
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        !matches!(self, BusProtocol::Other(_))
    }
}

impl Default for BusProtocol {
    fn default() -> Self {
        BusProtocol::Can11Bit500k
    }
}

impl fmt::Display for BusProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for BusProtocol {
    fn from(name: String) -> Self {
        match name.as_str() {
            "CAN_11B_500K" => BusProtocol::Can11Bit500k,
            "CAN_29B_500K" => BusProtocol::Can29Bit500k,
            "CAN_11B_250K" => BusProtocol::Can11Bit250k,
            "CAN_29B_250K" => BusProtocol::Can29Bit250k,
            _ => BusProtocol::Other(name),
        }
    }
}

impl From<BusProtocol> for String {
    fn from(protocol: BusProtocol) -> Self {
        protocol.name().to_string()
    }
}

impl FromStr for BusProtocol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BusProtocol::from(s.trim().to_string()))
    }
}

/// Commands sent to the emulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read a PID (`ATGET <pid>`)
    Get { pid: String },

    /// Set a PID to a decimal value (`ATSET <pid>=<value>`)
    Set { pid: String, value: String },

    /// Set a PID using the space separated form (`ATSET <pid> <value>`)
    SetSpaced { pid: String, value: String },

    /// Engine on/off (`ATACC1` / `ATACC0`)
    Accessory(bool),

    /// VIN reporting on/off (`ATVIN1` / `ATVIN0`)
    VinReporting(bool),

    /// Set the reported VIN (`ATSET VIN=<vin>`)
    SetVin(String),

    /// Select the diagnostic bus (`ATBUS <name>`)
    Bus(BusProtocol),

    /// Set stored trouble codes (`ATSET DTC=<codes>`)
    SetDtc(String),

    /// Clear stored trouble codes (`ATCLR`)
    ClearDtc,
}

impl Command {
    /// `ATGET <pid>`
    pub fn get(pid: impl Into<String>) -> Self {
        Command::Get { pid: pid.into() }
    }

    /// `ATSET <pid>=<value>`
    pub fn set(pid: impl Into<String>, value: impl fmt::Display) -> Self {
        Command::Set {
            pid: pid.into(),
            value: value.to_string(),
        }
    }

    /// `ATSET <pid> <value>`
    pub fn set_spaced(pid: impl Into<String>, value: impl Into<String>) -> Self {
        Command::SetSpaced {
            pid: pid.into(),
            value: value.into(),
        }
    }

    /// Wire text without the line terminator
    pub fn wire_text(&self) -> String {
        match self {
            Command::Get { pid } => format!("ATGET {}", pid),
            Command::Set { pid, value } => format!("ATSET {}={}", pid, value),
            Command::SetSpaced { pid, value } => format!("ATSET {} {}", pid, value),
            Command::Accessory(on) => format!("ATACC{}", u8::from(*on)),
            Command::VinReporting(on) => format!("ATVIN{}", u8::from(*on)),
            Command::SetVin(vin) => format!("ATSET VIN={}", vin),
            Command::Bus(protocol) => format!("ATBUS {}", protocol),
            Command::SetDtc(codes) => format!("ATSET DTC={}", codes),
            Command::ClearDtc => "ATCLR".to_string(),
        }
    }

    /// Encode for transmission: ASCII wire text plus the line terminator
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let text = self.wire_text();
        if !text.is_ascii() {
            return Err(ProtocolError::NonAscii(text));
        }
        let mut bytes = text.into_bytes();
        bytes.push(LINE_TERMINATOR);
        Ok(bytes)
    }

    /// Whether the emulator answers with a `<pid>=<value>` frame rather than an ack
    pub fn expects_value(&self) -> bool {
        matches!(self, Command::Get { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_text())
    }
}

fn parse_switch(arg: &str, line: &str) -> Result<bool, String> {
    match arg {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(format!("expected 0 or 1 in '{}'", line)),
    }
}

/// Parses one command line as the emulator sees it (terminator already removed).
/// Payloads after `VIN=` and `DTC=` are kept verbatim, padding included.
impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let s = line.trim_start();

        if s == "ATCLR" {
            return Ok(Command::ClearDtc);
        }
        if let Some(arg) = s.strip_prefix("ATACC") {
            return parse_switch(arg.trim(), line).map(Command::Accessory);
        }
        if let Some(arg) = s.strip_prefix("ATVIN") {
            return parse_switch(arg.trim(), line).map(Command::VinReporting);
        }
        if let Some(name) = s.strip_prefix("ATBUS ") {
            return Ok(Command::Bus(BusProtocol::from(name.trim().to_string())));
        }
        if let Some(pid) = s.strip_prefix("ATGET ") {
            let pid = pid.trim();
            if pid.is_empty() {
                return Err(format!("missing PID in '{}'", line));
            }
            return Ok(Command::get(pid));
        }
        if let Some(rest) = s.strip_prefix("ATSET ") {
            if let Some(vin) = rest.strip_prefix("VIN=") {
                return Ok(Command::SetVin(vin.to_string()));
            }
            if let Some(codes) = rest.strip_prefix("DTC=") {
                return Ok(Command::SetDtc(codes.to_string()));
            }
            if let Some((pid, value)) = rest.split_once('=') {
                return Ok(Command::set(pid.trim(), value.trim()));
            }
            if let Some((pid, value)) = rest.trim().split_once(' ') {
                return Ok(Command::set_spaced(pid, value.trim()));
            }
            return Err(format!("missing value in '{}'", line));
        }

        Err(format!("unknown command '{}'", line))
    }
}
