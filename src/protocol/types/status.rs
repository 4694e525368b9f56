//! STATUS message type implementation
//!
//! Notifies the receiver about the sender's current status: a code, a
//! sub-code, a short error name and a free-form status string.

use crate::error::{IgtlError, Result};
use crate::protocol::message::Message;
use bytes::{Buf, BufMut};

const ERROR_NAME_LEN: usize = 20;
const MIN_BODY_SIZE: usize = 2 + 8 + ERROR_NAME_LEN + 1;

/// Status code values defined by OpenIGTLink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    Invalid = 0,
    Ok = 1,
    UnknownError = 2,
    Panic = 3,
    NotFound = 4,
    AccessDenied = 5,
    Busy = 6,
    TimeOut = 7,
    Overflow = 8,
    ChecksumError = 9,
    ConfigError = 10,
    ResourceError = 11,
    UnknownInstruction = 12,
    NotReady = 13,
    ManualMode = 14,
    Disabled = 15,
    NotPresent = 16,
    UnknownVersion = 17,
    HardwareFailure = 18,
    ShutDown = 19,
}

/// STATUS message containing device status information
///
/// # OpenIGTLink Specification
/// - Message type: "STATUS"
/// - Body size: 30 bytes + status string + null terminator
/// - Encoding:
///   - Code: u16 (2 bytes, big-endian)
///   - Subcode: i64 (8 bytes, big-endian)
///   - Error name: 20 bytes (null-padded)
///   - Status string: variable length (null-terminated)
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    /// Status code (0 = invalid, 1 = OK, others are device-specific)
    pub code: u16,
    /// Sub-code for additional status information
    pub subcode: i64,
    /// Error name (max 20 characters)
    pub error_name: String,
    /// Status message string
    pub status_string: String,
}

impl StatusMessage {
    /// Create a new STATUS message with OK status
    pub fn ok(status_string: &str) -> Self {
        StatusMessage {
            code: StatusCode::Ok as u16,
            subcode: 0,
            error_name: String::new(),
            status_string: status_string.to_string(),
        }
    }

    /// Create a new STATUS message with a generic error status
    pub fn error(error_name: &str, status_string: &str) -> Self {
        StatusMessage {
            code: StatusCode::UnknownError as u16,
            subcode: 0,
            error_name: error_name.to_string(),
            status_string: status_string.to_string(),
        }
    }

    /// Create with an explicit status code
    pub fn with_code(code: StatusCode, status_string: &str) -> Self {
        StatusMessage {
            code: code as u16,
            subcode: 0,
            error_name: String::new(),
            status_string: status_string.to_string(),
        }
    }

    /// Whether the code is `OK`
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok as u16
    }
}

impl Message for StatusMessage {
    fn message_type() -> &'static str {
        "STATUS"
    }

    fn encode_content(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(MIN_BODY_SIZE + self.status_string.len());

        buf.put_u16(self.code);
        buf.put_i64(self.subcode);

        let mut name_bytes = [0u8; ERROR_NAME_LEN];
        let name_len = self.error_name.len().min(ERROR_NAME_LEN);
        name_bytes[..name_len].copy_from_slice(&self.error_name.as_bytes()[..name_len]);
        buf.extend_from_slice(&name_bytes);

        buf.extend_from_slice(self.status_string.as_bytes());
        buf.put_u8(0);

        Ok(buf)
    }

    fn decode_content(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_BODY_SIZE {
            return Err(IgtlError::InvalidSize {
                expected: MIN_BODY_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = std::io::Cursor::new(data);
        let code = cursor.get_u16();
        let subcode = cursor.get_i64();

        let mut name_bytes = [0u8; ERROR_NAME_LEN];
        cursor.copy_to_slice(&mut name_bytes);
        let error_name = String::from_utf8_lossy(&name_bytes)
            .trim_end_matches('\0')
            .to_string();

        let remaining = &data[cursor.position() as usize..];
        let status_bytes: Vec<u8> = remaining.iter().take_while(|&&b| b != 0).copied().collect();
        let status_string = String::from_utf8(status_bytes)?;

        Ok(StatusMessage {
            code,
            subcode,
            error_name,
            status_string,
        })
    }

    fn describe(&self) -> String {
        if self.error_name.is_empty() {
            format!("STATUS code={} \"{}\"", self.code, self.status_string)
        } else {
            format!(
                "STATUS code={} {} \"{}\"",
                self.code, self.error_name, self.status_string
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status() {
        let status = StatusMessage::ok("Operation successful");
        assert!(status.is_ok());
        assert_eq!(status.error_name, "");
    }

    #[test]
    fn test_status_roundtrip() {
        let original = StatusMessage {
            code: StatusCode::Busy as u16,
            subcode: 42,
            error_name: "TestError".to_string(),
            status_string: "Test status message".to_string(),
        };

        let encoded = original.encode_content().unwrap();
        assert_eq!(encoded.len(), 30 + original.status_string.len() + 1);
        assert_eq!(StatusMessage::decode_content(&encoded).unwrap(), original);
    }

    #[test]
    fn test_long_error_name_truncation() {
        let long_name = "ThisIsAVeryLongErrorNameThatExceeds20Characters";
        let status = StatusMessage::error(long_name, "Error");
        let decoded = StatusMessage::decode_content(&status.encode_content().unwrap()).unwrap();
        assert_eq!(decoded.error_name, &long_name[..20]);
    }

    #[test]
    fn test_decode_short_body() {
        assert!(matches!(
            StatusMessage::decode_content(&[0u8; 20]),
            Err(IgtlError::InvalidSize { .. })
        ));
    }
}
