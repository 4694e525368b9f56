//! OpenIGTLink protocol layer
//!
//! Frame header, CRC, message kinds and the tag dispatch table used by the
//! listener to turn incoming frames into typed messages.

pub mod any_message;
pub mod crc;
pub mod dispatch;
pub mod header;
pub mod message;
pub mod types;

pub use any_message::{AnyMessage, IntoAnyMessage};
pub use crc::{calculate_crc, verify_crc};
pub use dispatch::{BaseKind, ControlVariant, DispatchEntry, DispatchTable};
pub use header::{DeviceName, Header, Timestamp, TypeName, KEEP_ALIVE_PROBE};
pub use message::{IgtlMessage, Message};
