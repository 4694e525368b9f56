//! Message kinds carried by the transport
//!
//! Base kinds and their GET_/STT_/STP_/RTS_ control variants.

pub mod image;
pub mod query;
pub mod status;
pub mod string;
pub mod tdata;
pub mod transform;

pub use image::{CoordinateSystem, Endian, ImageMessage, ImageScalarType};
pub use query::*;
pub use status::{StatusCode, StatusMessage};
pub use string::StringMessage;
pub use tdata::{TDataMessage, TrackingDataElement, TrackingInstrumentType};
pub use transform::TransformMessage;
