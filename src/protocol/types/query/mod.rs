//! Query and streaming control messages
//!
//! Every base kind has four control variants sharing a fixed body layout:
//!
//! - **GET_***: Request the current value (empty body)
//! - **STT_***: Start streaming (resolution + coordinate name)
//! - **STP_***: Stop streaming (empty body)
//! - **RTS_***: Ready-to-send acknowledgement (u16 status)
//!
//! Tags follow the C++ OpenIGTLink spelling; TRANSFORM is abbreviated to
//! `TRANS` so every tag fits the 12-byte type field.

pub mod get;
pub mod rts;
pub mod streaming;

pub use get::*;
pub use rts::*;
pub use streaming::*;

/// Length of the coordinate-name field of STT_* bodies
pub const COORDINATE_NAME_LEN: usize = 32;

/// Body size of STT_* messages
pub const START_STREAM_BODY_SIZE: usize = 4 + COORDINATE_NAME_LEN;

/// RTS_* status: request accepted
pub const RTS_OK: u16 = 1;

/// RTS_* status: request rejected
pub const RTS_ERROR: u16 = 0;

/// Define an empty-body control message (GET_*, STP_*)
///
/// ```ignore
/// impl_empty_query!(GetTransformMessage, "GET_TRANS");
/// ```
macro_rules! impl_empty_query {
    ($name:ident, $type_str:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct $name;

        impl $crate::protocol::message::Message for $name {
            fn message_type() -> &'static str {
                $type_str
            }

            fn encode_content(&self) -> $crate::error::Result<Vec<u8>> {
                Ok(vec![])
            }

            fn decode_content(_data: &[u8]) -> $crate::error::Result<Self> {
                Ok(Self)
            }
        }
    };
}

/// Define a start-streaming message (STT_*)
///
/// Body: RESOLUTION (uint32, milliseconds between updates) +
/// COORDINATE_NAME (char[32], null-padded).
macro_rules! impl_start_stream {
    ($name:ident, $type_str:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Minimum interval between streamed messages in milliseconds
            pub resolution: u32,
            /// Coordinate system name (max 32 bytes)
            pub coordinate_name: String,
        }

        impl $name {
            /// Create a start request
            pub fn new(resolution: u32, coordinate_name: impl Into<String>) -> Self {
                Self {
                    resolution,
                    coordinate_name: coordinate_name.into(),
                }
            }
        }

        impl $crate::protocol::message::Message for $name {
            fn message_type() -> &'static str {
                $type_str
            }

            fn encode_content(&self) -> $crate::error::Result<Vec<u8>> {
                $crate::protocol::types::query::encode_start_stream(
                    self.resolution,
                    &self.coordinate_name,
                )
            }

            fn decode_content(data: &[u8]) -> $crate::error::Result<Self> {
                let (resolution, coordinate_name) =
                    $crate::protocol::types::query::decode_start_stream(data)?;
                Ok(Self {
                    resolution,
                    coordinate_name,
                })
            }

            fn describe(&self) -> String {
                format!(
                    "{} resolution={}ms coord={}",
                    $type_str, self.resolution, self.coordinate_name
                )
            }
        }
    };
}

/// Define a ready-to-send acknowledgement (RTS_*)
macro_rules! impl_rts {
    ($name:ident, $type_str:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Status code: 0 = error, 1 = ok
            pub status: u16,
        }

        impl $name {
            /// Create OK response
            pub fn ok() -> Self {
                Self {
                    status: $crate::protocol::types::query::RTS_OK,
                }
            }

            /// Create error response
            pub fn error() -> Self {
                Self {
                    status: $crate::protocol::types::query::RTS_ERROR,
                }
            }

            /// Create with specific status code
            pub fn new(status: u16) -> Self {
                Self { status }
            }
        }

        impl $crate::protocol::message::Message for $name {
            fn message_type() -> &'static str {
                $type_str
            }

            fn encode_content(&self) -> $crate::error::Result<Vec<u8>> {
                Ok(self.status.to_be_bytes().to_vec())
            }

            fn decode_content(data: &[u8]) -> $crate::error::Result<Self> {
                if data.len() < 2 {
                    return Err($crate::error::IgtlError::InvalidSize {
                        expected: 2,
                        actual: data.len(),
                    });
                }
                Ok(Self {
                    status: u16::from_be_bytes([data[0], data[1]]),
                })
            }

            fn describe(&self) -> String {
                format!("{} status={}", $type_str, self.status)
            }
        }
    };
}

pub(crate) use impl_empty_query;
pub(crate) use impl_rts;
pub(crate) use impl_start_stream;

pub(crate) fn encode_start_stream(
    resolution: u32,
    coordinate_name: &str,
) -> crate::error::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(START_STREAM_BODY_SIZE);
    buf.extend_from_slice(&resolution.to_be_bytes());

    let mut name = [0u8; COORDINATE_NAME_LEN];
    let bytes = coordinate_name.as_bytes();
    let len = bytes.len().min(COORDINATE_NAME_LEN);
    name[..len].copy_from_slice(&bytes[..len]);
    buf.extend_from_slice(&name);

    Ok(buf)
}

/// Some peers send a bare resolution without the coordinate field
pub(crate) fn decode_start_stream(data: &[u8]) -> crate::error::Result<(u32, String)> {
    if data.len() < 4 {
        return Err(crate::error::IgtlError::InvalidSize {
            expected: START_STREAM_BODY_SIZE,
            actual: data.len(),
        });
    }

    let resolution = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let name_field = &data[4..data.len().min(START_STREAM_BODY_SIZE)];
    let len = name_field.iter().position(|&b| b == 0).unwrap_or(name_field.len());
    let coordinate_name = String::from_utf8(name_field[..len].to_vec())?;

    Ok((resolution, coordinate_name))
}
