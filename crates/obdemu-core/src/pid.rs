//! Emulator PID Definitions
//!
//! The closed set of parameter identifiers the emulator understands, and how
//! each one maps between the device's raw value and physical units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::{
    fuel_percentage_from_raw, fuel_rate_from_raw, fuel_raw_from_percentage, fuel_raw_from_rate,
    scale_from_device, scale_to_device_raw, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX,
};

/// Known OBD-II PIDs exposed by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pid {
    /// Engine RPM (010C)
    EngineRpm,
    /// Vehicle speed in km/h (010D)
    VehicleSpeed,
    /// Control module voltage (0142)
    BatteryVoltage,
    /// Fuel tank level input (012F)
    FuelTankLevel,
    /// Engine fuel rate (015E)
    EngineFuelRate,
    /// Monitor status: MIL state and DTC count (0101)
    MilStatus,
    /// Distance traveled with MIL on, km (0121)
    DistanceWithMil,
    /// Time run with MIL on, minutes (014D)
    TimeWithMil,
}

impl Pid {
    /// Every known PID
    pub const ALL: [Pid; 8] = [
        Pid::EngineRpm,
        Pid::VehicleSpeed,
        Pid::BatteryVoltage,
        Pid::FuelTankLevel,
        Pid::EngineFuelRate,
        Pid::MilStatus,
        Pid::DistanceWithMil,
        Pid::TimeWithMil,
    ];

    /// Wire code used in `ATGET`/`ATSET`
    pub fn code(&self) -> &'static str {
        match self {
            Pid::EngineRpm => "010C",
            Pid::VehicleSpeed => "010D",
            Pid::BatteryVoltage => "0142",
            Pid::FuelTankLevel => "012F",
            Pid::EngineFuelRate => "015E",
            Pid::MilStatus => "0101",
            Pid::DistanceWithMil => "0121",
            Pid::TimeWithMil => "014D",
        }
    }

    /// Look up a PID by its wire code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Pid> {
        Pid::ALL
            .into_iter()
            .find(|pid| pid.code().eq_ignore_ascii_case(code.trim()))
    }

    /// Physical unit label
    pub fn unit(&self) -> &'static str {
        match self {
            Pid::EngineRpm => "RPM",
            Pid::VehicleSpeed => "km/h",
            Pid::BatteryVoltage => "V",
            Pid::FuelTankLevel => "%",
            Pid::EngineFuelRate => "L/h",
            Pid::MilStatus => "",
            Pid::DistanceWithMil => "km",
            Pid::TimeWithMil => "min",
        }
    }

    /// Convert the raw device value into physical units
    pub fn to_physical(&self, raw: u32) -> u32 {
        match self {
            Pid::EngineRpm => scale_from_device(raw, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX),
            Pid::FuelTankLevel => fuel_percentage_from_raw(raw),
            Pid::EngineFuelRate => fuel_rate_from_raw(raw),
            _ => raw,
        }
    }

    /// Convert a physical value into the raw device value
    pub fn to_device(&self, physical: u32) -> u32 {
        match self {
            Pid::EngineRpm => scale_to_device_raw(physical, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX),
            Pid::FuelTankLevel => fuel_raw_from_percentage(physical),
            Pid::EngineFuelRate => fuel_raw_from_rate(physical),
            _ => physical,
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Pid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pid::from_code(s).ok_or_else(|| format!("unknown PID '{}'", s))
    }
}

/// Contents of the monitor status PID (0101): lamp state in bit 7, DTC count
/// in bits 0..=6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MilStatus {
    /// Malfunction indicator lamp lit
    pub lamp_on: bool,
    /// Number of stored trouble codes (0..=127)
    pub dtc_count: u8,
}

impl MilStatus {
    /// Create a status; counts above 127 are truncated when encoded
    pub fn new(lamp_on: bool, dtc_count: u8) -> Self {
        Self { lamp_on, dtc_count }
    }

    /// Encode as the status byte
    pub fn to_byte(self) -> u8 {
        let lamp = if self.lamp_on { 0x80 } else { 0x00 };
        lamp | (self.dtc_count & 0x7F)
    }

    /// Decode from the status byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            lamp_on: byte & 0x80 != 0,
            dtc_count: byte & 0x7F,
        }
    }
}
