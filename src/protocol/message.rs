//! OpenIGTLink message trait and envelope
//!
//! Every message kind implements [`Message`], giving the transport the
//! pack / unpack / describe capability it needs. [`IgtlMessage`] pairs a
//! content value with its generic header.

use crate::error::{IgtlError, Result};
use crate::protocol::crc::calculate_crc;
use crate::protocol::header::{Header, Timestamp};

/// Common interface for all OpenIGTLink message types
///
/// Each message type (TRANSFORM, IMAGE, STATUS, etc.) must implement this trait
/// to provide encoding/decoding functionality.
pub trait Message: Sized {
    /// Returns the wire type tag (e.g., "TRANSFORM", "STT_TRANS")
    ///
    /// Must fit the 12-byte type field of the header.
    fn message_type() -> &'static str;

    /// Encode message content to bytes
    ///
    /// # Returns
    /// Byte vector containing the encoded message content (without header)
    fn encode_content(&self) -> Result<Vec<u8>>;

    /// Decode message content from bytes
    ///
    /// # Arguments
    /// * `data` - Byte slice containing the message content (without header)
    fn decode_content(data: &[u8]) -> Result<Self>;

    /// Short human-readable summary used in logs
    fn describe(&self) -> String {
        Self::message_type().to_string()
    }
}

/// Complete OpenIGTLink message: header plus typed content
///
/// # Type Parameters
/// * `T` - Message type that implements the `Message` trait
#[derive(Debug, Clone, PartialEq)]
pub struct IgtlMessage<T: Message> {
    /// Message header (58 bytes)
    pub header: Header,
    /// Message content
    pub content: T,
}

impl<T: Message> IgtlMessage<T> {
    /// Create a new message with the given content and device name
    ///
    /// The header is stamped with the current time.
    ///
    /// # Examples
    /// ```
    /// # use openigtlink_transport::protocol::{IgtlMessage, types::TransformMessage};
    /// let msg = IgtlMessage::new(TransformMessage::identity(), "Tracker").unwrap();
    /// assert_eq!(msg.header.type_name.as_str().unwrap(), "TRANSFORM");
    /// ```
    pub fn new(content: T, device_name: &str) -> Result<Self> {
        let header = Header::new(T::message_type(), device_name)?;
        Ok(IgtlMessage { header, content })
    }

    /// Replace the creation timestamp
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.header.timestamp = timestamp;
        self
    }

    /// Encode the complete frame (header + body) to bytes
    ///
    /// Body size and CRC in the emitted header are computed from the
    /// encoded content.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = self.content.encode_content()?;

        let mut header = self.header.clone();
        header.body_size = body.len() as u64;
        header.crc = calculate_crc(&body);

        let mut buf = Vec::with_capacity(Header::SIZE + body.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Decode a complete frame from bytes, verifying the CRC
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_with_options(data, true)
    }

    /// Decode a complete frame from bytes
    ///
    /// # Arguments
    /// * `data` - Byte slice containing header and body
    /// * `verify_crc` - Whether to check the body against the header CRC
    pub fn decode_with_options(data: &[u8], verify_crc: bool) -> Result<Self> {
        let header = Header::decode(data)?;

        let body_end = usize::try_from(header.body_size)
            .ok()
            .and_then(|size| size.checked_add(Header::SIZE))
            .ok_or(IgtlError::BodyTooLarge {
                size: usize::try_from(header.body_size).unwrap_or(usize::MAX),
                max: usize::MAX - Header::SIZE,
            })?;
        if data.len() < body_end {
            return Err(IgtlError::InvalidSize {
                expected: body_end,
                actual: data.len(),
            });
        }

        Self::from_parts(header, &data[Header::SIZE..body_end], verify_crc)
    }

    /// Build a message from an already-parsed header and its body
    ///
    /// This is the path used by the listener, which reads header and body
    /// in separate socket calls.
    pub fn from_parts(header: Header, body: &[u8], verify_crc: bool) -> Result<Self> {
        if body.len() as u64 != header.body_size {
            return Err(IgtlError::InvalidSize {
                expected: header.body_size as usize,
                actual: body.len(),
            });
        }

        if verify_crc {
            let actual = calculate_crc(body);
            if actual != header.crc {
                return Err(IgtlError::CrcMismatch {
                    expected: header.crc,
                    actual,
                });
            }
        }

        let content = T::decode_content(body)?;
        Ok(IgtlMessage { header, content })
    }

    /// Device name from the header, lossy
    pub fn device_name(&self) -> String {
        self.header.device_name.to_string_lossy()
    }
}
