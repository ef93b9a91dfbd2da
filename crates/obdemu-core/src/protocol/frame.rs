//! Idle-timeout response framing
//!
//! The emulator never sends a terminator we can rely on. A response is
//! considered complete once a full idle quantum passes with no bytes
//! available. A device that pauses mid-response for longer than a quantum
//! gets its response split; that is a property of the protocol.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::transport::ByteTransport;
use super::{ProtocolError, CARRIAGE_RETURN, DEFAULT_IDLE_QUANTUM_MS, DEFAULT_MAX_WAIT_MS};

/// Timing policy for idle-timeout framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingPolicy {
    /// Silence that ends a frame; also the initial settle delay
    pub idle_quantum: Duration,
    /// Upper bound on one drain while the device keeps talking
    pub max_wait: Duration,
}

impl Default for FramingPolicy {
    fn default() -> Self {
        Self {
            idle_quantum: Duration::from_millis(DEFAULT_IDLE_QUANTUM_MS),
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }
}

impl FramingPolicy {
    /// Policy with explicit timings
    pub fn new(idle_quantum: Duration, max_wait: Duration) -> Self {
        Self {
            idle_quantum,
            max_wait,
        }
    }

    /// Zero-latency policy for in-process transports
    pub fn immediate() -> Self {
        Self {
            idle_quantum: Duration::ZERO,
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }
}

/// Drains a transport into one response string per call
#[derive(Debug, Clone, Default)]
pub struct FrameReader {
    policy: FramingPolicy,
}

impl FrameReader {
    /// Create a reader with the given timing policy
    pub fn new(policy: FramingPolicy) -> Self {
        Self { policy }
    }

    /// Timing policy in use
    pub fn policy(&self) -> FramingPolicy {
        self.policy
    }

    fn settle(&self) {
        if !self.policy.idle_quantum.is_zero() {
            std::thread::sleep(self.policy.idle_quantum);
        }
    }

    /// Read until the transport stays silent for one idle quantum.
    ///
    /// Carriage returns are dropped and every other byte becomes one char.
    /// Returns an empty string if nothing arrived at all.
    pub fn read_frame<T>(&self, transport: &mut T) -> Result<String, ProtocolError>
    where
        T: ByteTransport + ?Sized,
    {
        let start = Instant::now();
        let mut frame = String::new();

        self.settle();
        loop {
            let chunk = transport.read_available()?;
            if chunk.is_empty() {
                break;
            }

            frame.extend(
                chunk
                    .iter()
                    .filter(|&&b| b != CARRIAGE_RETURN)
                    .map(|&b| b as char),
            );

            if start.elapsed() >= self.policy.max_wait {
                warn!(
                    "read_frame: device still sending after {}ms, returning {} chars",
                    self.policy.max_wait.as_millis(),
                    frame.len()
                );
                break;
            }
            self.settle();
        }

        debug!("read_frame: {:?}", frame);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Hands out pre-scripted chunks, one per poll
    struct ScriptedTransport {
        chunks: VecDeque<io::Result<Vec<u8>>>,
        polls: usize,
    }

    impl ScriptedTransport {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| Ok(c.to_vec())).collect(),
                polls: 0,
            }
        }
    }

    impl ByteTransport for ScriptedTransport {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read_available(&mut self) -> io::Result<Vec<u8>> {
            self.polls += 1;
            self.chunks.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reader() -> FrameReader {
        FrameReader::new(FramingPolicy::immediate())
    }

    #[test]
    fn test_silent_device_yields_empty_frame() {
        let mut transport = ScriptedTransport::new(&[]);
        assert_eq!(reader().read_frame(&mut transport).unwrap(), "");
        assert_eq!(transport.polls, 1);
    }

    #[test]
    fn test_strips_carriage_returns() {
        let mut transport = ScriptedTransport::new(&[b"01=2400\r"]);
        assert_eq!(reader().read_frame(&mut transport).unwrap(), "01=2400");
    }

    #[test]
    fn test_accumulates_chunks_until_idle() {
        let mut transport = ScriptedTransport::new(&[b"010C", b"=9C", b" 3C\r\r\n"]);
        assert_eq!(reader().read_frame(&mut transport).unwrap(), "010C=9C 3C\n");
        assert_eq!(transport.polls, 4);
    }

    #[test]
    fn test_gap_splits_frames() {
        let mut transport = ScriptedTransport::new(&[b"OK\r", b"", b"010D=00 58\r"]);
        let reader = reader();
        assert_eq!(reader.read_frame(&mut transport).unwrap(), "OK");
        assert_eq!(reader.read_frame(&mut transport).unwrap(), "010D=00 58");
    }

    #[test]
    fn test_read_error_propagates() {
        let mut transport = ScriptedTransport::new(&[b"01"]);
        transport
            .chunks
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        let err = reader().read_frame(&mut transport).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn test_max_wait_bounds_a_chatty_device() {
        struct Chatty;
        impl ByteTransport for Chatty {
            fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
                Ok(())
            }
            fn read_available(&mut self) -> io::Result<Vec<u8>> {
                Ok(b"x".to_vec())
            }
            fn close(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let reader = FrameReader::new(FramingPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(20),
        ));
        let frame = reader.read_frame(&mut Chatty).unwrap();
        assert!(!frame.is_empty());
        assert!(frame.chars().all(|c| c == 'x'));
    }

    #[test]
    fn test_default_policy() {
        let policy = FramingPolicy::default();
        assert_eq!(policy.idle_quantum, Duration::from_millis(100));
        assert_eq!(policy.max_wait, Duration::from_millis(5000));
    }
}
