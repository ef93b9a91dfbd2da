//! Command writer

use tracing::debug;

use super::transport::ByteTransport;
use super::{Command, ProtocolError};

/// Serializes commands onto a transport, one `\r`-terminated line each
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandWriter;

impl CommandWriter {
    /// Write one command and return how many bytes went out.
    ///
    /// Non-ASCII text is rejected before anything touches the transport.
    pub fn write<T>(&self, transport: &mut T, command: &Command) -> Result<usize, ProtocolError>
    where
        T: ByteTransport + ?Sized,
    {
        let bytes = command.to_bytes()?;
        debug!("write: {:?}", command.wire_text());
        transport.write(&bytes)?;
        Ok(bytes.len())
    }
}
