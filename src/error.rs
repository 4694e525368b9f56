//! Error types for the OpenIGTLink transport
//!
//! Covers both the frame codec (header, CRC, message bodies) and the
//! connection layer (bind, resolution, connect, mid-session I/O).
//! Establishment failures are returned from `listen`/`connect`; failures
//! after a connection is up never reach the caller as an error and are
//! reported as disconnect events instead.

use thiserror::Error;

/// OpenIGTLink transport error types
///
/// All fallible operations in this library return `Result<T, IgtlError>`.
#[derive(Error, Debug)]
pub enum IgtlError {
    /// Invalid header format or content
    ///
    /// This error occurs when:
    /// - Header version field is 0 or otherwise unsupported
    /// - Type tag or device name is longer than its fixed field
    /// - Type tag contains invalid UTF-8
    ///
    /// # Example
    /// ```no_run
    /// # use openigtlink_transport::error::IgtlError;
    /// let err = IgtlError::InvalidHeader("Version must be 1 or 2".to_string());
    /// ```
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// CRC checksum mismatch between the header and the received body
    ///
    /// The listener logs this and discards the frame; framing is preserved
    /// because the body was read in full.
    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch {
        /// CRC value carried in the message header
        expected: u64,
        /// CRC value calculated from the received body
        actual: u64,
    },

    /// Type tag has no entry in the dispatch table
    ///
    /// # Example
    /// ```no_run
    /// # use openigtlink_transport::error::IgtlError;
    /// let err = IgtlError::UnknownMessageType("CUSTOM_MSG".to_string());
    /// ```
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message size
    ///
    /// This error occurs when:
    /// - A body is shorter or longer than its fixed layout requires
    /// - Array sizes in a body don't match declared counts
    /// - A buffer is too short to hold a header
    #[error("Invalid message size: expected {expected}, got {actual}")]
    InvalidSize {
        /// Expected size in bytes based on message format
        expected: usize,
        /// Actual size in bytes received or parsed
        actual: usize,
    },

    /// I/O error on an established connection
    ///
    /// Always fatal to that connection. Never retried.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error in a text field
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Message body size exceeds the configured maximum
    #[error("Message body too large: {size} bytes (max: {max})")]
    BodyTooLarge {
        /// Actual body size in bytes
        size: usize,
        /// Maximum allowed size in bytes
        max: usize,
    },

    /// Listening port could not be bound
    ///
    /// # Example
    /// ```no_run
    /// # use openigtlink_transport::error::IgtlError;
    /// # use std::io;
    /// let err = IgtlError::Bind {
    ///     port: 18944,
    ///     source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
    /// };
    /// ```
    #[error("Cannot bind port {port}: {source}")]
    Bind {
        /// Requested port
        port: u16,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Host could not be resolved to a reachable IPv4 address
    #[error("Cannot resolve host: {0}")]
    Resolution(String),

    /// Single connection attempt to the remote peer failed
    #[error("Cannot connect to {addr}: {reason}")]
    Connect {
        /// Resolved remote address
        addr: String,
        /// Failure description (refused, timed out, ...)
        reason: String,
    },

    /// A bounded wait expired (connect, idle, worker startup, socket I/O)
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The peer closed the connection or the socket was already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation is not valid in the endpoint's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Endpoint configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IgtlError {
    /// Whether this error means the connection is gone
    ///
    /// Codec errors (bad CRC, malformed body) are recoverable per frame;
    /// I/O errors, closures and timeouts end the session.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            IgtlError::Io(_) | IgtlError::ConnectionClosed | IgtlError::Timeout(_)
        )
    }
}

/// Result type alias for OpenIGTLink operations
pub type Result<T> = std::result::Result<T, IgtlError>;
