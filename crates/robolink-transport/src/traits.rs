use bytes::Bytes;

use crate::error::Result;

/// A physical or logical byte stream a link runs over.
///
/// A port is driven by exactly one thread (the link's I/O thread), so it
/// only needs to be `Send`.
pub trait LinkPort: Send {
    /// Return the bytes that have arrived since the last call.
    ///
    /// May wait up to the port's read timeout; returns an empty buffer when
    /// nothing arrived in that window. A closed medium is
    /// [`TransportError::Closed`](crate::TransportError::Closed).
    fn read_available(&mut self) -> Result<Bytes>;

    /// Write all of `bytes` to the medium, in order.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Short transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<P: LinkPort + ?Sized> LinkPort for Box<P> {
    fn read_available(&mut self) -> Result<Bytes> {
        (**self).read_available()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(bytes)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
