//! TRANSFORM message type implementation
//!
//! A 4x4 homogeneous transformation matrix. Only the upper 3x4 portion is
//! transmitted (48 bytes = 12 floats); the last row is always [0, 0, 0, 1].

use crate::error::{IgtlError, Result};
use crate::protocol::message::Message;
use bytes::{Buf, BufMut};

/// Body size of a TRANSFORM message in bytes
pub const TRANSFORM_BODY_SIZE: usize = 48;

/// TRANSFORM message containing a 4x4 homogeneous transformation matrix
///
/// # OpenIGTLink Specification
/// - Message type: "TRANSFORM"
/// - Body size: 48 bytes (12 × 4-byte floats)
/// - Encoding: 3×4 matrix column by column, big-endian
#[derive(Debug, Clone, PartialEq)]
pub struct TransformMessage {
    /// 4x4 transformation matrix, indexed `[row][col]`
    pub matrix: [[f32; 4]; 4],
}

impl TransformMessage {
    /// Create a new identity transformation
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0, 0.0)
    }

    /// Create a transformation with only translation
    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        TransformMessage {
            matrix: [
                [1.0, 0.0, 0.0, x],
                [0.0, 1.0, 0.0, y],
                [0.0, 0.0, 1.0, z],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Create from a full matrix; the bottom row is normalized on the wire
    pub fn from_matrix(matrix: [[f32; 4]; 4]) -> Self {
        TransformMessage { matrix }
    }

    /// Translation component (x, y, z)
    pub fn position(&self) -> [f32; 3] {
        [self.matrix[0][3], self.matrix[1][3], self.matrix[2][3]]
    }
}

impl Message for TransformMessage {
    fn message_type() -> &'static str {
        "TRANSFORM"
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(TRANSFORM_BODY_SIZE);

        // R11, R21, R31, R12, R22, R32, R13, R23, R33, TX, TY, TZ
        for col in 0..4 {
            for row in 0..3 {
                buf.put_f32(self.matrix[row][col]);
            }
        }

        Ok(buf)
    }

    fn decode_content(data: &[u8]) -> Result<Self> {
        if data.len() != TRANSFORM_BODY_SIZE {
            return Err(IgtlError::InvalidSize {
                expected: TRANSFORM_BODY_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = std::io::Cursor::new(data);
        let mut matrix = [[0.0f32; 4]; 4];

        for col in 0..4 {
            for row in matrix.iter_mut().take(3) {
                row[col] = cursor.get_f32();
            }
        }
        matrix[3] = [0.0, 0.0, 0.0, 1.0];

        Ok(TransformMessage { matrix })
    }

    fn describe(&self) -> String {
        let [x, y, z] = self.position();
        format!("TRANSFORM t=({:.3}, {:.3}, {:.3})", x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type() {
        assert_eq!(TransformMessage::message_type(), "TRANSFORM");
    }

    #[test]
    fn test_transform_roundtrip() {
        let original = TransformMessage::from_matrix([
            [0.0, -1.0, 0.0, 10.0],
            [1.0, 0.0, 0.0, 20.0],
            [0.0, 0.0, 1.0, 30.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);

        let encoded = original.encode_content().unwrap();
        assert_eq!(encoded.len(), TRANSFORM_BODY_SIZE);
        assert_eq!(TransformMessage::decode_content(&encoded).unwrap(), original);
    }

    #[test]
    fn test_column_order_on_wire() {
        let mut transform = TransformMessage::identity();
        transform.matrix[1][0] = 1.5;
        let encoded = transform.encode_content().unwrap();

        // R21 is the second float; 1.5 is 0x3FC00000
        assert_eq!(&encoded[4..8], &[0x3F, 0xC0, 0x00, 0x00]);
    }

    #[test]
    fn test_decode_invalid_size() {
        assert!(matches!(
            TransformMessage::decode_content(&[0u8; 40]),
            Err(IgtlError::InvalidSize { .. })
        ));
        assert!(matches!(
            TransformMessage::decode_content(&[0u8; 50]),
            Err(IgtlError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_describe_includes_translation() {
        let text = TransformMessage::translation(1.0, 2.0, 3.0).describe();
        assert!(text.starts_with("TRANSFORM"));
        assert!(text.contains("2.000"));
    }
}
