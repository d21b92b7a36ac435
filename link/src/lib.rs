//! Mount Command Link
//!
//! Sends single textual commands to a mount controller and decodes the
//! replies. The link hides two things from the rest of the system: the
//! transport's unreliability (every failure becomes an absent result) and
//! which of several equivalent command entry points the connected driver
//! actually exposes.
//!
//! The driver-facing seam is [`MountDevice`]; hosts hand the link a
//! [`MountMediator`] that yields the currently connected device, if any.

mod decoder;
mod device;
mod error;
mod link;
mod protocol;

pub use decoder::*;
pub use device::*;
pub use error::*;
pub use link::*;
pub use protocol::*;

/// Command asking the mount firmware for the remaining safe tracking time, in hours
pub const SAFE_TIME_COMMAND: &str = ":XGST#";

/// Meade-style command terminator
pub const TERMINATOR: char = '#';
