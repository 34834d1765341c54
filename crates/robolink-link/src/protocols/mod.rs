//! Concrete protocols carried by robot links.

pub mod control;
pub mod driver;

pub use control::{ControlMessage, RobotControl};
pub use driver::{DriverMessage, RobotDriver};
