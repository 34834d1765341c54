//! Byte-stream transport abstraction for robot links.
//!
//! The link layer only needs two things from a physical medium: "give me
//! whatever bytes have arrived" and "write these bytes". [`LinkPort`] is that
//! contract. Implementations provided here:
//! - [`StreamPort`] over any `Read + Write` stream (serial device files, sockets)
//! - [`UnixDomainSocket`] bind/accept/connect producing [`LinkStream`], and
//!   [`LinkStream::pair`] for in-process links (Unix)

pub mod error;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::StreamPort;
pub use traits::LinkPort;

#[cfg(unix)]
pub use uds::{LinkStream, UnixDomainSocket};
