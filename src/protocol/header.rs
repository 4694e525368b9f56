//! OpenIGTLink generic header
//!
//! The header is a fixed 58-byte structure that precedes every frame on the
//! wire. The only other thing a peer may write between frames is the
//! two-byte keep-alive probe, which can never be mistaken for a header
//! because no valid header starts with version 0.

use crate::error::{IgtlError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::time::Duration;

/// Two-byte keep-alive probe written by an idle sender
///
/// Consumed silently by the receiving listener; it only re-arms the idle
/// timer.
pub const KEEP_ALIVE_PROBE: [u8; 2] = [0x00, 0x00];

/// Type-safe wrapper for message type name (12 bytes, null-padded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName([u8; 12]);

impl TypeName {
    /// Create a new TypeName from a string
    pub fn new(name: &str) -> Result<Self> {
        if name.len() > 12 {
            return Err(IgtlError::InvalidHeader(format!(
                "Type name too long: {} bytes (max: 12)",
                name.len()
            )));
        }
        let mut bytes = [0u8; 12];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(TypeName(bytes))
    }

    /// Get the type name as a string (trimming null bytes)
    pub fn as_str(&self) -> Result<&str> {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(12);
        std::str::from_utf8(&self.0[..len])
            .map_err(|_| IgtlError::InvalidHeader("Invalid UTF-8 in type name".to_string()))
    }
}

impl From<[u8; 12]> for TypeName {
    fn from(bytes: [u8; 12]) -> Self {
        TypeName(bytes)
    }
}

/// Type-safe wrapper for device name (20 bytes, null-padded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName([u8; 20]);

impl DeviceName {
    /// Create a new DeviceName from a string
    pub fn new(name: &str) -> Result<Self> {
        if name.len() > 20 {
            return Err(IgtlError::InvalidHeader(format!(
                "Device name too long: {} bytes (max: 20)",
                name.len()
            )));
        }
        let mut bytes = [0u8; 20];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(DeviceName(bytes))
    }

    /// Get the device name as a string (trimming null bytes)
    pub fn as_str(&self) -> Result<&str> {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(20);
        std::str::from_utf8(&self.0[..len])
            .map_err(|_| IgtlError::InvalidHeader("Invalid UTF-8 in device name".to_string()))
    }

    /// Lossy string form for logging
    pub fn to_string_lossy(&self) -> String {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(20);
        String::from_utf8_lossy(&self.0[..len]).into_owned()
    }
}

impl From<[u8; 20]> for DeviceName {
    fn from(bytes: [u8; 20]) -> Self {
        DeviceName(bytes)
    }
}

/// OpenIGTLink timestamp
///
/// The 64-bit wire value holds seconds since the Unix epoch in the upper
/// 32 bits and a binary fraction of a second in the lower 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    /// Seconds since Unix epoch (1970-01-01 00:00:00 UTC)
    pub seconds: u32,
    /// Fractional seconds as a 32-bit value (nanoseconds * 2^32 / 1_000_000_000)
    pub fraction: u32,
}

impl Timestamp {
    /// Create a new timestamp from seconds and fraction
    pub fn new(seconds: u32, fraction: u32) -> Self {
        Timestamp { seconds, fraction }
    }

    /// Create a timestamp representing the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use openigtlink_transport::protocol::header::Timestamp;
    ///
    /// let ts = Timestamp::now();
    /// assert!(ts.seconds > 0);
    /// ```
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_nanos(now.as_nanos() as u64)
    }

    /// Create a zero timestamp (no timestamp)
    pub fn zero() -> Self {
        Timestamp::default()
    }

    /// Convert to OpenIGTLink wire format (u64)
    pub fn to_u64(self) -> u64 {
        ((self.seconds as u64) << 32) | (self.fraction as u64)
    }

    /// Create from OpenIGTLink wire format (u64)
    pub fn from_u64(value: u64) -> Self {
        Timestamp {
            seconds: (value >> 32) as u32,
            fraction: (value & 0xFFFF_FFFF) as u32,
        }
    }

    /// Convert to nanoseconds since Unix epoch
    ///
    /// # Examples
    ///
    /// ```
    /// use openigtlink_transport::protocol::header::Timestamp;
    ///
    /// let ts = Timestamp::new(1000, 0x80000000); // 1000.5 seconds
    /// assert_eq!(ts.to_nanos(), 1_000_500_000_000);
    /// ```
    pub fn to_nanos(self) -> u64 {
        let sec_nanos = (self.seconds as u64) * 1_000_000_000;
        let frac_nanos = ((self.fraction as u64) * 1_000_000_000) >> 32;
        sec_nanos + frac_nanos
    }

    /// Create from nanoseconds since Unix epoch
    pub fn from_nanos(nanos: u64) -> Self {
        let seconds = (nanos / 1_000_000_000) as u32;
        let remaining = nanos % 1_000_000_000;
        let fraction = ((remaining << 32) / 1_000_000_000) as u32;
        Timestamp { seconds, fraction }
    }

    /// Convert to floating-point seconds
    pub fn to_f64(self) -> f64 {
        let frac_f64 = (self.fraction as f64) / (u32::MAX as f64 + 1.0);
        (self.seconds as f64) + frac_f64
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later
    ///
    /// # Examples
    ///
    /// ```
    /// use openigtlink_transport::protocol::header::Timestamp;
    /// use std::time::Duration;
    ///
    /// let created = Timestamp::new(10, 0);
    /// let received = Timestamp::new(10, 0x80000000);
    /// assert_eq!(received.duration_since(created), Duration::from_millis(500));
    /// assert_eq!(created.duration_since(received), Duration::ZERO);
    /// ```
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.to_nanos().saturating_sub(earlier.to_nanos()))
    }

    /// Whether this timestamp was never set
    pub fn is_zero(self) -> bool {
        self.to_u64() == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}

/// OpenIGTLink message header (58 bytes fixed size)
///
/// # Header Structure (all numerical values in big-endian)
/// - Version: u16 (2 bytes)
/// - Type: `char[12]` (12 bytes, null-padded)
/// - Device Name: `char[20]` (20 bytes, null-padded)
/// - Timestamp: u64 (8 bytes) - high 32 bits: seconds, low 32 bits: fraction
/// - Body Size: u64 (8 bytes)
/// - CRC: u64 (8 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Protocol version number
    pub version: u16,
    /// Message type name
    pub type_name: TypeName,
    /// Unique device name
    pub device_name: DeviceName,
    /// Creation timestamp
    pub timestamp: Timestamp,
    /// Size of the body in bytes
    pub body_size: u64,
    /// 64-bit CRC for body data
    pub crc: u64,
}

impl Header {
    /// Header size in bytes
    pub const SIZE: usize = 58;

    /// Header version written by this crate
    pub const VERSION: u16 = 2;

    /// Build a header for an outgoing message stamped with the current time
    ///
    /// Body size and CRC are filled in when the frame is encoded.
    pub fn new(type_tag: &str, device_name: &str) -> Result<Self> {
        Ok(Header {
            version: Self::VERSION,
            type_name: TypeName::new(type_tag)?,
            device_name: DeviceName::new(device_name)?,
            timestamp: Timestamp::now(),
            body_size: 0,
            crc: 0,
        })
    }

    /// Decode a header from a byte slice
    ///
    /// # Arguments
    /// * `buf` - Byte slice containing at least 58 bytes
    ///
    /// # Errors
    /// - [`IgtlError::InvalidSize`] if the buffer is too short
    /// - [`IgtlError::InvalidHeader`] if the version field is 0
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(IgtlError::InvalidSize {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let mut cursor = std::io::Cursor::new(buf);

        let version = cursor.get_u16();
        if version == 0 {
            return Err(IgtlError::InvalidHeader(
                "Version 0 is reserved for the keep-alive probe".to_string(),
            ));
        }

        let mut type_bytes = [0u8; 12];
        cursor.copy_to_slice(&mut type_bytes);

        let mut device_bytes = [0u8; 20];
        cursor.copy_to_slice(&mut device_bytes);

        let timestamp = Timestamp::from_u64(cursor.get_u64());
        let body_size = cursor.get_u64();
        let crc = cursor.get_u64();

        Ok(Header {
            version,
            type_name: TypeName::from(type_bytes),
            device_name: DeviceName::from(device_bytes),
            timestamp,
            body_size,
            crc,
        })
    }

    /// Encode the header into a 58-byte vector
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16(self.version);
        buf.put_slice(&self.type_name.0);
        buf.put_slice(&self.device_name.0);
        buf.put_u64(self.timestamp.to_u64());
        buf.put_u64(self.body_size);
        buf.put_u64(self.crc);
        buf.to_vec()
    }
}

/// Whether the first bytes of a stream are a keep-alive probe
pub fn is_keep_alive(prefix: &[u8]) -> bool {
    prefix.len() >= KEEP_ALIVE_PROBE.len() && prefix[..KEEP_ALIVE_PROBE.len()] == KEEP_ALIVE_PROBE
}
