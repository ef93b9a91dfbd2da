//! Protocol errors

use thiserror::Error;

use crate::codec::DecodeError;

/// Errors that can occur while talking to the emulator
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to emulator")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Malformed response: {0:?}")]
    MalformedResponse(String),

    #[error("Command contains non-ASCII text: {0:?}")]
    NonAscii(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the session is unusable after this error.
    ///
    /// There is no resynchronization on the wire, so any transport failure
    /// mid-session requires a reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Io(_) | ProtocolError::SerialError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_fatal_classification() {
        assert!(ProtocolError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).is_fatal());
        assert!(ProtocolError::SerialError("unplugged".into()).is_fatal());
        assert!(!ProtocolError::MalformedResponse("OK".into()).is_fatal());
        assert!(!ProtocolError::PortNotFound("COM3".into()).is_fatal());
        assert!(!ProtocolError::NotConnected.is_fatal());
    }

    #[test]
    fn test_decode_error_converts() {
        let err: ProtocolError = DecodeError::NoDigits("zz".into()).into();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert_eq!(err.to_string(), "Decode error: no hex digits in 'zz'");
    }
}
