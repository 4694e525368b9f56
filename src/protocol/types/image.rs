//! IMAGE message type implementation
//!
//! 2D/3D image data with orientation, spacing and origin. The body is a
//! 72-byte image header followed by raw pixel data.

use crate::error::{IgtlError, Result};
use crate::protocol::message::Message;
use bytes::{Buf, BufMut};

const IMAGE_HEADER_SIZE: usize = 72;

/// Image scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageScalarType {
    Int8 = 2,
    Uint8 = 3,
    Int16 = 4,
    Uint16 = 5,
    Int32 = 6,
    Uint32 = 7,
    Float32 = 10,
    Float64 = 11,
}

impl ImageScalarType {
    /// Size of one scalar in bytes
    pub fn size(&self) -> usize {
        match self {
            ImageScalarType::Int8 | ImageScalarType::Uint8 => 1,
            ImageScalarType::Int16 | ImageScalarType::Uint16 => 2,
            ImageScalarType::Int32 | ImageScalarType::Uint32 | ImageScalarType::Float32 => 4,
            ImageScalarType::Float64 => 8,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            2 => Ok(ImageScalarType::Int8),
            3 => Ok(ImageScalarType::Uint8),
            4 => Ok(ImageScalarType::Int16),
            5 => Ok(ImageScalarType::Uint16),
            6 => Ok(ImageScalarType::Int32),
            7 => Ok(ImageScalarType::Uint32),
            10 => Ok(ImageScalarType::Float32),
            11 => Ok(ImageScalarType::Float64),
            _ => Err(IgtlError::InvalidHeader(format!(
                "Invalid image scalar type: {}",
                value
            ))),
        }
    }
}

/// Byte order of the pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big = 1,
    Little = 2,
}

/// Patient coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    RAS = 1,
    LPS = 2,
}

/// IMAGE message for 2D/3D image data
///
/// # OpenIGTLink Specification
/// - Message type: "IMAGE"
/// - Image header: VERSION (uint16) + NUM_COMPONENTS (uint8) + SCALAR_TYPE (uint8)
///   + ENDIAN (uint8) + COORD (uint8) + SIZE (`uint16[3]`) + MATRIX (`float32[12]`)
///   + SUBVOL_OFFSET (`uint16[3]`) + SUBVOL_SIZE (`uint16[3]`) = 72 bytes
/// - Followed by the pixels of the sub-volume
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMessage {
    /// Image header version
    pub version: u16,
    /// Number of components (1=scalar, 3=RGB, 4=RGBA)
    pub num_components: u8,
    /// Scalar type
    pub scalar_type: ImageScalarType,
    /// Byte order of `data`
    pub endian: Endian,
    /// Coordinate system
    pub coordinate: CoordinateSystem,
    /// Image size [columns, rows, slices]
    pub size: [u16; 3],
    /// Upper 3x4 of the image-to-patient matrix, row-major
    pub matrix: [[f32; 4]; 3],
    /// Sub-volume offset
    pub subvolume_offset: [u16; 3],
    /// Sub-volume size
    pub subvolume_size: [u16; 3],
    /// Raw pixel bytes of the sub-volume
    pub data: Vec<u8>,
}

impl ImageMessage {
    /// Create a single-component image covering the whole volume
    pub fn new(scalar_type: ImageScalarType, size: [u16; 3], data: Vec<u8>) -> Result<Self> {
        let image = ImageMessage {
            version: 1,
            num_components: 1,
            scalar_type,
            endian: Endian::Big,
            coordinate: CoordinateSystem::RAS,
            size,
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            subvolume_offset: [0, 0, 0],
            subvolume_size: size,
            data,
        };

        let expected = image.expected_data_len();
        if image.data.len() != expected {
            return Err(IgtlError::InvalidSize {
                expected,
                actual: image.data.len(),
            });
        }
        Ok(image)
    }

    /// Set coordinate system
    pub fn with_coordinate(mut self, coordinate: CoordinateSystem) -> Self {
        self.coordinate = coordinate;
        self
    }

    /// Set the image-to-patient matrix
    pub fn with_matrix(mut self, matrix: [[f32; 4]; 3]) -> Self {
        self.matrix = matrix;
        self
    }

    fn expected_data_len(&self) -> usize {
        self.subvolume_size.iter().map(|&s| s as usize).product::<usize>()
            * self.num_components as usize
            * self.scalar_type.size()
    }
}

impl Message for ImageMessage {
    fn message_type() -> &'static str {
        "IMAGE"
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(IMAGE_HEADER_SIZE + self.data.len());

        buf.put_u16(self.version);
        buf.put_u8(self.num_components);
        buf.put_u8(self.scalar_type as u8);
        buf.put_u8(self.endian as u8);
        buf.put_u8(self.coordinate as u8);
        for &s in &self.size {
            buf.put_u16(s);
        }
        for col in 0..4 {
            for row in &self.matrix {
                buf.put_f32(row[col]);
            }
        }
        for &o in &self.subvolume_offset {
            buf.put_u16(o);
        }
        for &s in &self.subvolume_size {
            buf.put_u16(s);
        }

        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    fn decode_content(mut data: &[u8]) -> Result<Self> {
        if data.len() < IMAGE_HEADER_SIZE {
            return Err(IgtlError::InvalidSize {
                expected: IMAGE_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let version = data.get_u16();
        let num_components = data.get_u8();
        let scalar_type = ImageScalarType::from_u8(data.get_u8())?;
        let endian = match data.get_u8() {
            2 => Endian::Little,
            _ => Endian::Big,
        };
        let coordinate = match data.get_u8() {
            2 => CoordinateSystem::LPS,
            _ => CoordinateSystem::RAS,
        };
        let size = [data.get_u16(), data.get_u16(), data.get_u16()];

        let mut matrix = [[0.0f32; 4]; 3];
        for col in 0..4 {
            for row in matrix.iter_mut() {
                row[col] = data.get_f32();
            }
        }

        let subvolume_offset = [data.get_u16(), data.get_u16(), data.get_u16()];
        let subvolume_size = [data.get_u16(), data.get_u16(), data.get_u16()];

        let image = ImageMessage {
            version,
            num_components,
            scalar_type,
            endian,
            coordinate,
            size,
            matrix,
            subvolume_offset,
            subvolume_size,
            data: data.to_vec(),
        };

        let expected = image.expected_data_len();
        if image.data.len() != expected {
            return Err(IgtlError::InvalidSize {
                expected,
                actual: image.data.len(),
            });
        }
        Ok(image)
    }

    fn describe(&self) -> String {
        format!(
            "IMAGE {}x{}x{} {:?}x{}",
            self.size[0], self.size[1], self.size[2], self.scalar_type, self.num_components
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_16bit_slice() {
        let data: Vec<u8> = (0..(4 * 3 * 2)).map(|i| i as u8).collect();
        let original = ImageMessage::new(ImageScalarType::Uint16, [4, 3, 1], data)
            .unwrap()
            .with_coordinate(CoordinateSystem::LPS);

        let encoded = original.encode_content().unwrap();
        assert_eq!(encoded.len(), IMAGE_HEADER_SIZE + 24);
        assert_eq!(ImageMessage::decode_content(&encoded).unwrap(), original);
    }

    #[test]
    fn test_new_rejects_wrong_data_len() {
        let result = ImageMessage::new(ImageScalarType::Float32, [2, 2, 1], vec![0u8; 4]);
        assert!(matches!(result, Err(IgtlError::InvalidSize { .. })));
    }

    #[test]
    fn test_decode_truncated_pixels() {
        let image = ImageMessage::new(ImageScalarType::Uint8, [8, 8, 1], vec![7u8; 64]).unwrap();
        let encoded = image.encode_content().unwrap();
        assert!(matches!(
            ImageMessage::decode_content(&encoded[..encoded.len() - 1]),
            Err(IgtlError::InvalidSize { .. })
        ));
    }
}
