//! Simulated Emulator - in-process stand-in for the serial OBD-II emulator
//!
//! Speaks the same `AT` command set over [`ByteTransport`], so the client can
//! be exercised without hardware. Like the real device it only answers once a
//! complete `\r`-terminated line has been written, and it never sends more
//! than one reply per command.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::codec::{hex_to_integer, integer_to_hex, FUEL_LEVEL_DEVICE_MAX};
use crate::pid::{MilStatus, Pid};
use crate::protocol::{
    BusProtocol, ByteTransport, Command, PortProvider, ProtocolError, ACK, DEFAULT_BAUD_RATE,
    LINE_TERMINATOR,
};

/// Reply to anything the emulator doesn't understand
pub const UNKNOWN_REPLY: &str = "?";

/// Reply to a GET for a PID with no value
pub const NO_DATA_REPLY: &str = "NO DATA";

#[derive(Debug)]
struct EmulatorState {
    /// Partial command line
    inbox: Vec<u8>,
    /// Reply bytes not yet read
    outbox: Vec<u8>,
    /// Raw device values keyed by upper-case PID code
    values: HashMap<String, u32>,
    engine_started: bool,
    vin_reporting: bool,
    vin: String,
    dtc_codes: Option<String>,
    bus: BusProtocol,
    /// Every command line received, in order
    received: Vec<String>,
    /// Replies that replace the normal answer for upcoming commands
    scripted: VecDeque<String>,
    closed: bool,
    broken: bool,
}

impl Default for EmulatorState {
    fn default() -> Self {
        let mut values = HashMap::new();
        for pid in Pid::ALL {
            values.insert(pid.code().to_string(), 0);
        }
        values.insert(Pid::BatteryVoltage.code().to_string(), 12);
        values.insert(Pid::FuelTankLevel.code().to_string(), FUEL_LEVEL_DEVICE_MAX);

        Self {
            inbox: Vec::new(),
            outbox: Vec::new(),
            values,
            engine_started: false,
            vin_reporting: false,
            vin: String::new(),
            dtc_codes: None,
            bus: BusProtocol::default(),
            received: Vec::new(),
            scripted: VecDeque::new(),
            closed: false,
            broken: false,
        }
    }
}

impl EmulatorState {
    fn store(&mut self, pid: &str, raw: u32) {
        self.values.insert(pid.to_uppercase(), raw);
    }

    fn handle(&mut self, line: &str) -> String {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                debug!("sim: {}", e);
                return UNKNOWN_REPLY.to_string();
            }
        };

        match command {
            Command::Get { pid } => match self.values.get(&pid.to_uppercase()) {
                Some(&raw) => format!("{}={}", pid, integer_to_hex(raw)),
                None => NO_DATA_REPLY.to_string(),
            },
            // Decimal physical value
            Command::Set { pid, value } => match value.parse::<u32>() {
                Ok(physical) => {
                    let raw = Pid::from_code(&pid).map_or(physical, |p| p.to_device(physical));
                    self.store(&pid, raw);
                    ACK.to_string()
                }
                Err(_) => UNKNOWN_REPLY.to_string(),
            },
            // Raw device value in hex
            Command::SetSpaced { pid, value } => match hex_to_integer(&value) {
                Ok(raw) => {
                    self.store(&pid, raw);
                    ACK.to_string()
                }
                Err(_) => UNKNOWN_REPLY.to_string(),
            },
            Command::Accessory(on) => {
                self.engine_started = on;
                ACK.to_string()
            }
            Command::VinReporting(on) => {
                self.vin_reporting = on;
                ACK.to_string()
            }
            Command::SetVin(vin) => {
                self.vin = vin;
                ACK.to_string()
            }
            Command::Bus(bus) => {
                self.bus = bus;
                ACK.to_string()
            }
            Command::SetDtc(codes) => {
                let count = codes.split(',').filter(|c| !c.trim().is_empty()).count();
                let status = MilStatus::new(count > 0, count.min(0x7F) as u8);
                self.store(Pid::MilStatus.code(), status.to_byte() as u32);
                self.dtc_codes = Some(codes);
                ACK.to_string()
            }
            Command::ClearDtc => {
                self.store(Pid::MilStatus.code(), 0);
                self.dtc_codes = None;
                ACK.to_string()
            }
        }
    }

    fn check_link(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "emulator port closed"));
        }
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "emulator link broken"));
        }
        Ok(())
    }
}

/// Handle to a simulated emulator. Clones share the same device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEmulator {
    state: Arc<Mutex<EmulatorState>>,
}

impl SimulatedEmulator {
    /// Create an emulator with the engine off, 12 V battery and a full tank
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EmulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Command lines received so far
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    /// Raw device value stored for a PID
    pub fn raw_value(&self, pid: &str) -> Option<u32> {
        self.lock().values.get(&pid.to_uppercase()).copied()
    }

    /// Overwrite the raw device value for a PID
    pub fn set_raw_value(&self, pid: &str, raw: u32) {
        self.lock().store(pid, raw);
    }

    pub fn engine_started(&self) -> bool {
        self.lock().engine_started
    }

    pub fn vin_reporting(&self) -> bool {
        self.lock().vin_reporting
    }

    pub fn vin(&self) -> String {
        self.lock().vin.clone()
    }

    pub fn dtc_codes(&self) -> Option<String> {
        self.lock().dtc_codes.clone()
    }

    pub fn bus(&self) -> BusProtocol {
        self.lock().bus.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Answer the next command with `reply` (a `\r` is appended)
    pub fn script_reply(&self, reply: impl Into<String>) {
        self.lock().scripted.push_back(reply.into());
    }

    /// Queue unsolicited bytes, as a device would after a late reply
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().outbox.extend_from_slice(bytes);
    }

    /// Make every subsequent read and write fail
    pub fn break_link(&self) {
        self.lock().broken = true;
    }

    fn reopen(&self) {
        let mut state = self.lock();
        state.closed = false;
        state.broken = false;
        state.inbox.clear();
        state.outbox.clear();
    }
}

impl ByteTransport for SimulatedEmulator {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        state.check_link()?;

        for &b in bytes {
            if b != LINE_TERMINATOR {
                state.inbox.push(b);
                continue;
            }

            let line = String::from_utf8_lossy(&std::mem::take(&mut state.inbox)).into_owned();
            let reply = match state.scripted.pop_front() {
                Some(reply) => reply,
                None => state.handle(&line),
            };
            debug!("sim: {:?} -> {:?}", line, reply);

            state.received.push(line);
            state.outbox.extend_from_slice(reply.as_bytes());
            state.outbox.push(LINE_TERMINATOR);
        }
        Ok(())
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut state = self.lock();
        state.check_link()?;
        Ok(std::mem::take(&mut state.outbox))
    }

    fn close(&mut self) -> io::Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

/// [`PortProvider`] over a fixed set of named simulators
#[derive(Debug, Clone, Default)]
pub struct SimulatedPorts {
    ports: Vec<(String, SimulatedEmulator)>,
}

impl SimulatedPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port; enumeration order is insertion order
    pub fn with_port(mut self, name: impl Into<String>, emulator: SimulatedEmulator) -> Self {
        self.ports.push((name.into(), emulator));
        self
    }

    /// One fresh emulator on `name`
    pub fn single(name: impl Into<String>) -> (Self, SimulatedEmulator) {
        let emulator = SimulatedEmulator::new();
        (Self::new().with_port(name, emulator.clone()), emulator)
    }

    pub fn emulator(&self, name: &str) -> Option<&SimulatedEmulator> {
        self.ports.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }
}

impl PortProvider for SimulatedPorts {
    fn list_ports(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(self.ports.iter().map(|(name, _)| name.clone()).collect())
    }

    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn ByteTransport>, ProtocolError> {
        let emulator = self
            .emulator(port_name)
            .ok_or_else(|| ProtocolError::PortNotFound(port_name.to_string()))?;
        if baud_rate != DEFAULT_BAUD_RATE {
            return Err(ProtocolError::ConnectionFailed(format!(
                "{} only runs at {} baud",
                port_name, DEFAULT_BAUD_RATE
            )));
        }
        emulator.reopen();
        Ok(Box::new(emulator.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn send(emulator: &mut SimulatedEmulator, line: &str) -> String {
        emulator.write(line.as_bytes()).unwrap();
        emulator.write(b"\r").unwrap();
        String::from_utf8(emulator.read_available().unwrap()).unwrap()
    }

    #[test]
    fn test_reply_only_after_full_line() {
        let mut emulator = SimulatedEmulator::new();
        emulator.write(b"ATGET 01").unwrap();
        assert!(emulator.read_available().unwrap().is_empty());
        emulator.write(b"42\r").unwrap();
        assert_eq!(emulator.read_available().unwrap(), b"0142=00 0C\r".to_vec());
    }

    #[test]
    fn test_set_then_get_uses_device_encoding() {
        let mut emulator = SimulatedEmulator::new();
        assert_eq!(send(&mut emulator, "ATSET 010C=9999"), "OK\r");
        assert_eq!(emulator.raw_value("010C"), Some(0x9C3C));
        assert_eq!(send(&mut emulator, "ATGET 010C"), "010C=9C 3C\r");

        assert_eq!(send(&mut emulator, "ATSET 015E=5"), "OK\r");
        assert_eq!(emulator.raw_value("015E"), Some(100));
    }

    #[test]
    fn test_spaced_set_takes_raw_hex() {
        let mut emulator = SimulatedEmulator::new();
        assert_eq!(send(&mut emulator, "ATSET 010D 00 58"), "OK\r");
        assert_eq!(emulator.raw_value("010D"), Some(0x58));
    }

    #[test]
    fn test_state_commands() {
        let mut emulator = SimulatedEmulator::new();
        send(&mut emulator, "ATACC1");
        send(&mut emulator, "ATVIN1");
        send(&mut emulator, "ATBUS CAN_29B_500K");
        send(&mut emulator, "ATSET DTC=P0302,P0493");
        assert!(emulator.engine_started());
        assert!(emulator.vin_reporting());
        assert_eq!(emulator.bus(), BusProtocol::Can29Bit500k);
        assert_eq!(emulator.dtc_codes().as_deref(), Some("P0302,P0493"));
        assert_eq!(emulator.raw_value("0101"), Some(0x82));

        send(&mut emulator, "ATCLR");
        assert_eq!(emulator.dtc_codes(), None);
        assert_eq!(emulator.raw_value("0101"), Some(0));
    }

    #[test]
    fn test_unknown_commands() {
        let mut emulator = SimulatedEmulator::new();
        assert_eq!(send(&mut emulator, "ATZ"), "?\r");
        assert_eq!(send(&mut emulator, "ATGET 0199"), "NO DATA\r");
        assert_eq!(send(&mut emulator, "ATSET 010D=fast"), "?\r");
        assert_eq!(emulator.received().len(), 3);
    }

    #[test]
    fn test_scripted_reply_and_injection() {
        let mut emulator = SimulatedEmulator::new();
        emulator.script_reply("BUSY");
        assert_eq!(send(&mut emulator, "ATGET 010C"), "BUSY\r");
        emulator.inject(b"late");
        assert_eq!(emulator.read_available().unwrap(), b"late".to_vec());
    }

    #[test]
    fn test_closed_and_broken_links_fail() {
        let mut emulator = SimulatedEmulator::new();
        emulator.close().unwrap();
        assert_eq!(
            emulator.write(b"ATCLR\r").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );

        let mut other = SimulatedEmulator::new();
        other.break_link();
        assert_eq!(
            other.read_available().unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }

    #[test]
    fn test_ports_open_by_name_and_baud() {
        let (ports, emulator) = SimulatedPorts::single("sim0");
        assert_eq!(ports.list_ports().unwrap(), vec!["sim0".to_string()]);
        assert!(matches!(
            ports.open("sim1", DEFAULT_BAUD_RATE),
            Err(ProtocolError::PortNotFound(_))
        ));
        assert!(matches!(
            ports.open("sim0", 9600),
            Err(ProtocolError::ConnectionFailed(_))
        ));

        let mut transport = ports.open("sim0", DEFAULT_BAUD_RATE).unwrap();
        transport.close().unwrap();
        assert!(emulator.is_closed());
        ports.open("sim0", DEFAULT_BAUD_RATE).unwrap();
        assert!(!emulator.is_closed());
    }
}
