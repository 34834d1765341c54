use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::LinkPort;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Adapts any blocking `Read + Write` stream into a [`LinkPort`].
///
/// Read timeouts (`WouldBlock` / `TimedOut`) surface as an empty read so the
/// link loop can service its outbound queues. End of stream is
/// [`TransportError::Closed`].
pub struct StreamPort<T> {
    inner: T,
    chunk: Box<[u8]>,
    name: &'static str,
}

impl<T: Read + Write + Send> StreamPort<T> {
    /// Wrap a stream.
    pub fn new(inner: T) -> Self {
        Self::named(inner, "stream")
    }

    /// Wrap a stream with an explicit transport name.
    pub fn named(inner: T, name: &'static str) -> Self {
        Self {
            inner,
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            name,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the port and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<T: Read + Write + Send> LinkPort for StreamPort<T> {
    fn read_available(&mut self) -> Result<Bytes> {
        loop {
            match self.inner.read(&mut self.chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    trace!(bytes = n, transport = self.name, "read");
                    return Ok(Bytes::copy_from_slice(&self.chunk[..n]));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(Bytes::new());
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        self.flush()
    }

    fn transport_name(&self) -> &'static str {
        self.name
    }
}
