//! Connection management
//!
//! A [`Connection`] owns one open transport and runs strictly half-duplex
//! command cycles on it: write one command, drain one response.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use super::frame::{FrameReader, FramingPolicy};
use super::transport::ByteTransport;
use super::writer::CommandWriter;
use super::{Command, ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_IDLE_QUANTUM_MS, DEFAULT_MAX_WAIT_MS};

/// Selector value meaning "bind to the first enumerated port"
pub const FIRST_AVAILABLE: &str = "CHOOSE_FIRST_AVAILABLE";

/// Which port `connect` should bind to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortSelector {
    /// First port in enumeration order
    FirstAvailable,
    /// Exact port name, e.g. "/dev/ttyUSB0" or "COM3"
    Named(String),
}

impl PortSelector {
    /// Select a port by exact name
    pub fn named(name: impl Into<String>) -> Self {
        PortSelector::Named(name.into())
    }

    /// Pick a port out of an enumerated list
    pub fn resolve(&self, ports: &[String]) -> Option<String> {
        match self {
            PortSelector::FirstAvailable => ports.first().cloned(),
            PortSelector::Named(name) => ports.iter().find(|p| *p == name).cloned(),
        }
    }
}

impl Default for PortSelector {
    fn default() -> Self {
        PortSelector::FirstAvailable
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::FirstAvailable => f.write_str(FIRST_AVAILABLE),
            PortSelector::Named(name) => f.write_str(name),
        }
    }
}

impl From<String> for PortSelector {
    fn from(s: String) -> Self {
        if s == FIRST_AVAILABLE {
            PortSelector::FirstAvailable
        } else {
            PortSelector::Named(s)
        }
    }
}

impl From<PortSelector> for String {
    fn from(selector: PortSelector) -> Self {
        selector.to_string()
    }
}

impl FromStr for PortSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PortSelector::from(s.to_string()))
    }
}

/// Client session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Connected and ready
    Connected,
    /// Closed by the caller or torn down after a transport failure
    Closed,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Port to bind to
    pub port: PortSelector,
    /// Baud rate
    pub baud_rate: u32,
    /// Idle period that ends a response, in milliseconds
    pub idle_quantum_ms: u64,
    /// Cap on a single response drain, in milliseconds
    pub max_wait_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: PortSelector::FirstAvailable,
            baud_rate: DEFAULT_BAUD_RATE,
            idle_quantum_ms: DEFAULT_IDLE_QUANTUM_MS,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

impl ConnectionConfig {
    /// Default configuration bound to a named port
    pub fn for_port(name: impl Into<String>) -> Self {
        Self {
            port: PortSelector::named(name),
            ..Self::default()
        }
    }

    /// Framing policy derived from the timing fields
    pub fn framing_policy(&self) -> FramingPolicy {
        FramingPolicy::new(
            Duration::from_millis(self.idle_quantum_ms),
            Duration::from_millis(self.max_wait_ms),
        )
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Save as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}

/// One open session with the emulator
pub struct Connection {
    /// Transport handle
    transport: Box<dyn ByteTransport>,
    /// Port the transport was opened on
    port_name: String,
    /// Baud rate the port was opened at
    baud_rate: u32,
    reader: FrameReader,
    writer: CommandWriter,
    /// Metrics: cumulative bytes/frames sent & received
    tx_bytes: u64,
    rx_bytes: u64,
    tx_frames: u64,
    rx_frames: u64,
}

impl Connection {
    /// Wrap an already opened transport
    pub fn new(
        transport: Box<dyn ByteTransport>,
        port_name: impl Into<String>,
        baud_rate: u32,
        policy: FramingPolicy,
    ) -> Self {
        Self {
            transport,
            port_name: port_name.into(),
            baud_rate,
            reader: FrameReader::new(policy),
            writer: CommandWriter,
            tx_bytes: 0,
            rx_bytes: 0,
            tx_frames: 0,
            rx_frames: 0,
        }
    }

    /// Port the session is bound to
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn framing_policy(&self) -> FramingPolicy {
        self.reader.policy()
    }

    /// Get cumulative tx/rx bytes and frame counters
    pub fn get_counters(&self) -> (u64, u64, u64, u64) {
        (self.tx_bytes, self.rx_bytes, self.tx_frames, self.rx_frames)
    }

    /// Read whatever the device sends until it goes idle
    pub fn drain(&mut self) -> Result<String, ProtocolError> {
        let frame = self.reader.read_frame(self.transport.as_mut())?;
        if !frame.is_empty() {
            self.rx_bytes = self.rx_bytes.saturating_add(frame.len() as u64);
            self.rx_frames = self.rx_frames.saturating_add(1);
        }
        Ok(frame)
    }

    /// One full command cycle: write the command, then drain exactly one response
    pub fn transact(&mut self, command: &Command) -> Result<String, ProtocolError> {
        let sent = self.writer.write(self.transport.as_mut(), command)?;
        self.tx_bytes = self.tx_bytes.saturating_add(sent as u64);
        self.tx_frames = self.tx_frames.saturating_add(1);

        let response = self.drain()?;
        debug!("{} -> {:?}", command, response);
        Ok(response)
    }

    /// Close the underlying transport
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        debug!("Closing transport on {}", self.port_name);
        self.transport.close()?;
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("policy", &self.reader.policy())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    /// Echoes a canned reply once a full line has been written
    struct Canned {
        replies: VecDeque<&'static [u8]>,
        pending: Vec<u8>,
        written: Vec<u8>,
    }

    impl ByteTransport for Canned {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(bytes);
            if bytes.ends_with(b"\r") {
                if let Some(reply) = self.replies.pop_front() {
                    self.pending.extend_from_slice(reply);
                }
            }
            Ok(())
        }

        fn read_available(&mut self) -> io::Result<Vec<u8>> {
            Ok(std::mem::take(&mut self.pending))
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn connection(replies: &[&'static [u8]]) -> Connection {
        let transport = Canned {
            replies: replies.iter().copied().collect(),
            pending: Vec::new(),
            written: Vec::new(),
        };
        Connection::new(Box::new(transport), "sim0", DEFAULT_BAUD_RATE, FramingPolicy::immediate())
    }

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.port, PortSelector::FirstAvailable);
        assert_eq!(config.framing_policy(), FramingPolicy::default());
    }

    #[test]
    fn test_port_selector_resolve() {
        let ports = vec!["/dev/ttyACM0".to_string(), "COM3".to_string()];
        assert_eq!(
            PortSelector::FirstAvailable.resolve(&ports),
            Some("/dev/ttyACM0".to_string())
        );
        assert_eq!(PortSelector::named("COM3").resolve(&ports), Some("COM3".to_string()));
        assert_eq!(PortSelector::named("COM4").resolve(&ports), None);
        assert_eq!(PortSelector::FirstAvailable.resolve(&[]), None);
    }

    #[test]
    fn test_port_selector_strings() {
        assert_eq!(
            "CHOOSE_FIRST_AVAILABLE".parse::<PortSelector>().unwrap(),
            PortSelector::FirstAvailable
        );
        assert_eq!(PortSelector::named("COM3").to_string(), "COM3");
    }

    #[test]
    fn test_config_json_partial() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "port": "COM3", "idle_quantum_ms": 20 }"#).unwrap();
        assert_eq!(config.port, PortSelector::named("COM3"));
        assert_eq!(config.idle_quantum_ms, 20);
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.max_wait_ms, 5000);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emulator.json");
        let mut config = ConnectionConfig::for_port("/dev/ttyUSB3");
        config.max_wait_ms = 750;
        config.save(&path).unwrap();

        assert_eq!(ConnectionConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_config_load_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ port: ").unwrap();
        let err = ConnectionConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_transact_counts_traffic() {
        let mut conn = connection(&[b"OK\r"]);
        let response = conn.transact(&Command::Accessory(true)).unwrap();
        assert_eq!(response, "OK");
        assert_eq!(conn.get_counters(), (7, 2, 1, 1));
    }

    #[test]
    fn test_drain_on_quiet_link() {
        let mut conn = connection(&[]);
        assert_eq!(conn.drain().unwrap(), "");
        assert_eq!(conn.get_counters(), (0, 0, 0, 0));
    }

    #[test]
    fn test_debug_hides_transport() {
        let conn = connection(&[]);
        let text = format!("{:?}", conn);
        assert!(text.contains("sim0"));
        assert!(text.contains("38400"));
    }
}
