//! Transport abstractions
//!
//! The protocol engine only needs three byte-level operations from a link and
//! two from whatever enumerates links. Serial ports implement both (see
//! [`super::serial`]); so does the in-process simulator in [`crate::sim`].

use std::io;

use super::ProtocolError;

/// A half-duplex byte link to the emulator
pub trait ByteTransport: Send {
    /// Write every byte or fail
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Take all bytes currently buffered without blocking. An empty vector
    /// means nothing has arrived yet.
    fn read_available(&mut self) -> io::Result<Vec<u8>>;

    /// Release the link
    fn close(&mut self) -> io::Result<()>;
}

/// Something that can enumerate and open links by name
pub trait PortProvider {
    /// Names of the ports currently present, in a stable order
    fn list_ports(&self) -> Result<Vec<String>, ProtocolError>;

    /// Open a port by exact name
    fn open(&self, port_name: &str, baud_rate: u32)
        -> Result<Box<dyn ByteTransport>, ProtocolError>;
}

impl<T: ByteTransport + ?Sized> ByteTransport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_available()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}
