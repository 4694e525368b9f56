//! STRING message type implementation
//!
//! Carries a character string of up to 65535 bytes tagged with its
//! IANA MIBenum encoding.

use crate::error::{IgtlError, Result};
use crate::protocol::message::Message;
use bytes::{Buf, BufMut};

/// MIBenum for US-ASCII
pub const ENCODING_US_ASCII: u16 = 3;
/// MIBenum for UTF-8
pub const ENCODING_UTF8: u16 = 106;

/// STRING message containing a text string with encoding information
///
/// # OpenIGTLink Specification
/// - Message type: "STRING"
/// - Body format: ENCODING (uint16) + LENGTH (uint16) + STRING (uint8[LENGTH])
#[derive(Debug, Clone, PartialEq)]
pub struct StringMessage {
    /// Character encoding as MIBenum value
    pub encoding: u16,
    /// The text content
    pub string: String,
}

impl StringMessage {
    /// Create a new STRING message with US-ASCII encoding
    pub fn new(string: impl Into<String>) -> Self {
        StringMessage {
            encoding: ENCODING_US_ASCII,
            string: string.into(),
        }
    }

    /// Create a STRING message with UTF-8 encoding
    pub fn utf8(string: impl Into<String>) -> Self {
        StringMessage {
            encoding: ENCODING_UTF8,
            string: string.into(),
        }
    }

    /// Get the string content as a reference
    pub fn as_str(&self) -> &str {
        &self.string
    }
}

impl Message for StringMessage {
    fn message_type() -> &'static str {
        "STRING"
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        let bytes = self.string.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(IgtlError::BodyTooLarge {
                size: bytes.len(),
                max: u16::MAX as usize,
            });
        }

        let mut buf = Vec::with_capacity(4 + bytes.len());
        buf.put_u16(self.encoding);
        buf.put_u16(bytes.len() as u16);
        buf.extend_from_slice(bytes);
        Ok(buf)
    }

    fn decode_content(mut data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IgtlError::InvalidSize {
                expected: 4,
                actual: data.len(),
            });
        }

        let encoding = data.get_u16();
        let length = data.get_u16() as usize;
        if data.len() < length {
            return Err(IgtlError::InvalidSize {
                expected: length,
                actual: data.len(),
            });
        }

        let string = String::from_utf8(data[..length].to_vec())?;
        Ok(StringMessage { encoding, string })
    }

    fn describe(&self) -> String {
        format!("STRING \"{}\"", self.string)
    }
}

impl From<&str> for StringMessage {
    fn from(s: &str) -> Self {
        StringMessage::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_utf8() {
        let original = StringMessage::utf8("こんにちは");
        let encoded = original.encode_content().unwrap();
        assert_eq!(&encoded[0..2], &[0x00, 0x6A]);
        assert_eq!(StringMessage::decode_content(&encoded).unwrap(), original);
    }

    #[test]
    fn test_too_long() {
        let msg = StringMessage::new("x".repeat(70_000));
        assert!(matches!(
            msg.encode_content(),
            Err(IgtlError::BodyTooLarge { .. })
        ));
    }

    #[test]
    fn test_declared_length_exceeds_body() {
        let data = [0x00, 0x03, 0x00, 0x10, b'a', b'b'];
        assert!(matches!(
            StringMessage::decode_content(&data),
            Err(IgtlError::InvalidSize { .. })
        ));
    }
}
