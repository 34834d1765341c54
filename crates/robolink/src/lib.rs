//! Master/slave robot links.
//!
//! A controlling process (master) and a robot (slave) exchange small typed
//! binary messages over one byte stream, multiplexed by channel number.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams a link runs over (sockets, in-memory pairs)
//! - [`frame`]: channel numbers, field buffers, link framing
//! - [`link`]: channels, protocols, the link itself, robot control and driver protocols

/// Re-export transport types.
pub mod transport {
    pub use robolink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use robolink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use robolink_link::*;
}
