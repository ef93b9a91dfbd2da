//! Serial port handling
//!
//! Real-hardware implementations of [`ByteTransport`] and [`PortProvider`]
//! on top of the `serialport` crate.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::{debug, warn};

use super::transport::{ByteTransport, PortProvider};
use super::ProtocolError;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key: ttyACM* first, then ttyUSB* (both numerically), then the rest by
/// name. "First available" depends on this order being deterministic.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(ports) => {
            for info in ports {
                let p = PortInfo::from(info);
                map.entry(p.name.clone()).or_insert(p);
            }
        }
        Err(e) => warn!("Serial port enumeration failed: {}", e),
    }

    // The enumeration API misses some CDC devices on Linux
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port at the given baud rate
pub fn open_port(name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, ProtocolError> {
    // Reads are only issued for bytes already buffered, so a short timeout is enough
    serialport::new(name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| ProtocolError::ConnectionFailed(format!("{}: {}", name, e)))
}

/// Configure a serial port for the emulator: 8N1, no flow control, DTR high
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;

    // Toggling DTR on open resets Arduino-based emulator boards
    if let Err(e) = port.write_data_terminal_ready(true) {
        debug!("configure_port: failed to set DTR high: {} (continuing)", e);
    }

    Ok(())
}

/// Clear the serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))
}

/// [`ByteTransport`] over an open serial port
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Wrap a port opened with [`open_port`]
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl ByteTransport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let port = self.port_mut()?;
        let available = port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; available];
        let n = match port.read(&mut buffer) {
            Ok(n) => n,
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                0
            }
            Err(e) => return Err(e),
        };
        buffer.truncate(n);
        Ok(buffer)
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle closes the OS port
        self.port = None;
        Ok(())
    }
}

/// [`PortProvider`] backed by the system's serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPorts;

impl PortProvider for SerialPorts {
    fn list_ports(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(list_ports().into_iter().map(|p| p.name).collect())
    }

    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn ByteTransport>, ProtocolError> {
        let mut port = open_port(port_name, baud_rate)?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;
        Ok(Box::new(SerialTransport::new(port)))
    }
}
