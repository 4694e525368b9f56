//! TDATA (TrackingData) message type implementation
//!
//! An array of named 3x4 transforms, one per tracked tool. Preferred over
//! TRANSFORM when several tools are streamed at the same rate.

use crate::error::{IgtlError, Result};
use crate::protocol::message::Message;
use bytes::{Buf, BufMut};

const ELEMENT_SIZE: usize = 70;
const NAME_LEN: usize = 20;

/// Instrument type for tracking data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackingInstrumentType {
    Tracker = 1,
    Instrument6D = 2,
    Instrument3D = 3,
    Instrument5D = 4,
}

impl TrackingInstrumentType {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(TrackingInstrumentType::Tracker),
            2 => Ok(TrackingInstrumentType::Instrument6D),
            3 => Ok(TrackingInstrumentType::Instrument3D),
            4 => Ok(TrackingInstrumentType::Instrument5D),
            _ => Err(IgtlError::InvalidHeader(format!(
                "Invalid tracking instrument type: {}",
                value
            ))),
        }
    }
}

/// Tracking data element with name, type, and transformation matrix
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingDataElement {
    /// Name/ID of the instrument (max 19 chars on the wire)
    pub name: String,
    /// Type of instrument
    pub instrument_type: TrackingInstrumentType,
    /// Upper 3x4 portion of the 4x4 transformation matrix (row-major)
    pub matrix: [[f32; 4]; 3],
}

impl TrackingDataElement {
    /// Create a new tracking data element
    pub fn new(
        name: impl Into<String>,
        instrument_type: TrackingInstrumentType,
        matrix: [[f32; 4]; 3],
    ) -> Self {
        TrackingDataElement {
            name: name.into(),
            instrument_type,
            matrix,
        }
    }

    /// Create with translation only
    pub fn with_translation(
        name: impl Into<String>,
        instrument_type: TrackingInstrumentType,
        x: f32,
        y: f32,
        z: f32,
    ) -> Self {
        Self::new(
            name,
            instrument_type,
            [[1.0, 0.0, 0.0, x], [0.0, 1.0, 0.0, y], [0.0, 0.0, 1.0, z]],
        )
    }
}

/// TDATA message containing multiple tracking data elements
///
/// # OpenIGTLink Specification
/// - Message type: "TDATA"
/// - Each element: NAME (char[20]) + TYPE (uint8) + Reserved (uint8) + MATRIX (float32[12])
/// - Element size: 70 bytes
#[derive(Debug, Clone, PartialEq)]
pub struct TDataMessage {
    /// List of tracking data elements
    pub elements: Vec<TrackingDataElement>,
}

impl TDataMessage {
    /// Create a new TDATA message with elements
    pub fn new(elements: Vec<TrackingDataElement>) -> Self {
        TDataMessage { elements }
    }

    /// Get number of tracking elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if message has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl Message for TDataMessage {
    fn message_type() -> &'static str {
        "TDATA"
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.elements.len() * ELEMENT_SIZE);

        for element in &self.elements {
            let mut name_bytes = [0u8; NAME_LEN];
            let name = element.name.as_bytes();
            let copy_len = name.len().min(NAME_LEN - 1);
            name_bytes[..copy_len].copy_from_slice(&name[..copy_len]);
            buf.extend_from_slice(&name_bytes);

            buf.put_u8(element.instrument_type as u8);
            buf.put_u8(0);

            for row in &element.matrix {
                for &val in row {
                    buf.put_f32(val);
                }
            }
        }

        Ok(buf)
    }

    fn decode_content(mut data: &[u8]) -> Result<Self> {
        if data.len() % ELEMENT_SIZE != 0 {
            return Err(IgtlError::InvalidSize {
                expected: (data.len() / ELEMENT_SIZE + 1) * ELEMENT_SIZE,
                actual: data.len(),
            });
        }

        let mut elements = Vec::with_capacity(data.len() / ELEMENT_SIZE);
        while data.has_remaining() {
            let name_bytes = &data[..NAME_LEN];
            let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
            let name = String::from_utf8(name_bytes[..name_len].to_vec())?;
            data.advance(NAME_LEN);

            let instrument_type = TrackingInstrumentType::from_u8(data.get_u8())?;
            let _reserved = data.get_u8();

            let mut matrix = [[0.0f32; 4]; 3];
            for row in &mut matrix {
                for val in row {
                    *val = data.get_f32();
                }
            }

            elements.push(TrackingDataElement {
                name,
                instrument_type,
                matrix,
            });
        }

        Ok(TDataMessage { elements })
    }

    fn describe(&self) -> String {
        let names: Vec<&str> = self.elements.iter().map(|e| e.name.as_str()).collect();
        format!("TDATA [{}]", names.join(", "))
    }
}
