//! Value Codec
//!
//! Conversions between the emulator's hex text and integers, plus the linear
//! scaling between device units and physical units:
//! - Hex text ↔ integer (`"9C 3C"` ↔ 39996)
//! - Device range ↔ physical range (RPM, fuel level, fuel rate)
//!
//! Everything here is pure; no I/O and no state.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

/// Device-side maximum for engine RPM, as the emulator reports it
pub const RPM_DEVICE_MAX_HEX: &str = "9C 3C";

/// Numeric value of [`RPM_DEVICE_MAX_HEX`]
pub const RPM_DEVICE_MAX: u32 = 0x9C3C;

/// Physical maximum for engine RPM
pub const RPM_PHYSICAL_MAX: u32 = 9999;

/// Raw fuel tank level that corresponds to a full tank
pub const FUEL_LEVEL_DEVICE_MAX: u32 = 254;

/// Raw fuel rate units per litre per hour
pub const FUEL_RATE_DIVISOR: u32 = 20;

/// Errors produced while decoding hex text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input held no hex digits at all
    #[error("no hex digits in '{0}'")]
    NoDigits(String),

    /// Value wider than 32 bits
    #[error("hex value '{0}' does not fit in 32 bits")]
    Overflow(String),
}

/// Parse hex text, ignoring every character that is not a hex digit.
///
/// `"9C 3C"`, `"9c3c"` and `"0x9C:3C"` all decode to 39996.
pub fn hex_to_integer(text: &str) -> Result<u32, DecodeError> {
    let digits: String = text.chars().filter(char::is_ascii_hexdigit).collect();
    if digits.is_empty() {
        return Err(DecodeError::NoDigits(text.to_string()));
    }
    u32::from_str_radix(&digits, 16).map_err(|_| DecodeError::Overflow(text.to_string()))
}

/// Format a value as space separated, uppercase hex bytes.
///
/// Most significant byte first, leading zero bytes dropped, but never fewer
/// than two bytes: `0x0C` becomes `"00 0C"`, `0x12345` becomes `"01 23 45"`.
pub fn integer_to_hex(value: u32) -> String {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, value);

    let first = buf
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(buf.len())
        .min(buf.len() - 2);

    buf[first..]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scale a raw device value into physical units: `floor(raw / device_max * physical_max)`
pub fn scale_from_device(raw: u32, device_max: u32, physical_max: u32) -> u32 {
    if device_max == 0 {
        return 0;
    }
    ((raw as f64 / device_max as f64) * physical_max as f64) as u32
}

/// Scale a physical value into device units, returned as device hex text
pub fn scale_to_device(physical: u32, device_max: u32, physical_max: u32) -> String {
    integer_to_hex(scale_to_device_raw(physical, device_max, physical_max))
}

/// Same as [`scale_to_device`] without the hex formatting
pub fn scale_to_device_raw(physical: u32, device_max: u32, physical_max: u32) -> u32 {
    if physical_max == 0 {
        return 0;
    }
    ((physical as f64 / physical_max as f64) * device_max as f64) as u32
}

/// Fuel tank level in percent from the raw 0..=254 reading
pub fn fuel_percentage_from_raw(raw: u32) -> u32 {
    scale_from_device(raw, FUEL_LEVEL_DEVICE_MAX, 100)
}

/// Raw fuel tank level for a percentage. Lossy: not an exact inverse of
/// [`fuel_percentage_from_raw`].
pub fn fuel_raw_from_percentage(percent: u32) -> u32 {
    scale_to_device_raw(percent, FUEL_LEVEL_DEVICE_MAX, 100)
}

/// Fuel rate in L/h from the raw reading (truncating)
pub fn fuel_rate_from_raw(raw: u32) -> u32 {
    raw / FUEL_RATE_DIVISOR
}

/// Raw fuel rate reading for a rate in L/h
pub fn fuel_raw_from_rate(liters_per_hour: u32) -> u32 {
    liters_per_hour.saturating_mul(FUEL_RATE_DIVISOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_integer_ignores_separators() {
        assert_eq!(hex_to_integer("9C 3C"), Ok(39996));
        assert_eq!(hex_to_integer("9c3c"), Ok(39996));
        assert_eq!(hex_to_integer("  00 0C\n"), Ok(12));
        assert_eq!(hex_to_integer("xx:FF"), Ok(255));
    }

    #[test]
    fn test_hex_to_integer_no_digits() {
        assert_eq!(hex_to_integer(""), Err(DecodeError::NoDigits(String::new())));
        assert!(matches!(hex_to_integer(" -- "), Err(DecodeError::NoDigits(_))));
    }

    #[test]
    fn test_hex_to_integer_overflow() {
        assert!(matches!(
            hex_to_integer("01 00 00 00 00"),
            Err(DecodeError::Overflow(_))
        ));
        // Leading zero bytes don't count against the width
        assert_eq!(hex_to_integer("00 00 00 00 00 0C"), Ok(12));
    }

    #[test]
    fn test_integer_to_hex_byte_layout() {
        assert_eq!(integer_to_hex(0), "00 00");
        assert_eq!(integer_to_hex(0x0C), "00 0C");
        assert_eq!(integer_to_hex(0xFF), "00 FF");
        assert_eq!(integer_to_hex(0xABC), "0A BC");
        assert_eq!(integer_to_hex(0x9C3C), "9C 3C");
        assert_eq!(integer_to_hex(0x12345), "01 23 45");
        assert_eq!(integer_to_hex(u32::MAX), "FF FF FF FF");
    }

    #[test]
    fn test_hex_round_trip() {
        for n in [0, 1, 0x7F, 0x100, 0x9C3C, 0xFFFF, 0x10000, 0xDEAD_BEEF, u32::MAX] {
            assert_eq!(hex_to_integer(&integer_to_hex(n)), Ok(n), "value {n:#x}");
        }
    }

    #[test]
    fn test_rpm_constant_matches_hex() {
        assert_eq!(hex_to_integer(RPM_DEVICE_MAX_HEX), Ok(RPM_DEVICE_MAX));
    }

    #[test]
    fn test_rpm_scaling_endpoints() {
        assert_eq!(
            scale_from_device(39996, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX),
            9999
        );
        assert_eq!(scale_from_device(0, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX), 0);
        assert_eq!(
            scale_to_device(RPM_PHYSICAL_MAX, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX),
            "9C 3C"
        );
    }

    #[test]
    fn test_scaling_round_trip_within_one_unit() {
        for p in (0..=RPM_PHYSICAL_MAX).step_by(37) {
            let hex = scale_to_device(p, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX);
            let raw = hex_to_integer(&hex).unwrap();
            let back = scale_from_device(raw, RPM_DEVICE_MAX, RPM_PHYSICAL_MAX);
            assert!(p.abs_diff(back) <= 1, "{p} came back as {back}");
        }
    }

    #[test]
    fn test_zero_ranges() {
        assert_eq!(scale_from_device(10, 0, 100), 0);
        assert_eq!(scale_to_device_raw(10, 100, 0), 0);
    }

    #[test]
    fn test_fuel_percentage() {
        assert_eq!(fuel_percentage_from_raw(254), 100);
        assert_eq!(fuel_percentage_from_raw(127), 50);
        assert_eq!(fuel_percentage_from_raw(0), 0);
        assert_eq!(fuel_percentage_from_raw(200), 78);
    }

    #[test]
    fn test_fuel_percentage_inverse_is_lossy() {
        assert_eq!(fuel_raw_from_percentage(100), 254);
        assert_eq!(fuel_raw_from_percentage(70), 177);
        // 177 / 254 * 100 = 69.68...
        assert_eq!(fuel_percentage_from_raw(fuel_raw_from_percentage(70)), 69);
    }

    #[test]
    fn test_fuel_rate() {
        assert_eq!(fuel_rate_from_raw(100), 5);
        assert_eq!(fuel_rate_from_raw(119), 5);
        assert_eq!(fuel_rate_from_raw(19), 0);
        assert_eq!(fuel_raw_from_rate(5), 100);
    }
}
