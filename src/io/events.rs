//! Events delivered to the application
//!
//! Establishment failures are reported here exactly once in addition to
//! the `Err` returned by `listen`/`connect`. Mid-session failures are only
//! ever reported here.

use crate::protocol::any_message::AnyMessage;
use crate::protocol::header::Timestamp;
use std::net::SocketAddr;
use std::time::Duration;

/// A message decoded by the listener, with its receive timing
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    /// Decoded message
    pub message: AnyMessage,
    /// Creation time stamped by the sender
    pub created: Timestamp,
    /// When the first header byte was read
    pub arrived: Timestamp,
    /// When the body was fully read
    pub received: Timestamp,
    /// Remote port of the connection it arrived on
    pub sender_port: u16,
    /// Declared body length
    pub body_size: u64,
}

impl ReceivedMessage {
    /// Wire type tag
    pub fn type_tag(&self) -> &'static str {
        self.message.message_type()
    }

    /// Streaming resolution for STT_* messages
    pub fn resolution(&self) -> Option<u32> {
        self.message.resolution()
    }

    /// Received time minus creation time, zero if clocks disagree
    pub fn latency(&self) -> Duration {
        self.received.duration_since(self.created)
    }

    /// Total frame size on the wire
    pub fn frame_size(&self) -> u64 {
        crate::protocol::header::Header::SIZE as u64 + self.body_size
    }
}

/// Connection lifecycle and traffic events
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Initiator: outgoing connection established and both workers running
    ConnectedToRemote { peer: SocketAddr },
    /// Initiator: the single connection attempt failed
    CannotConnectToRemote { reason: String },
    /// Initiator: the established connection was lost
    LostConnectionToRemote { reason: String },
    /// Acceptor: a client connected and both workers are running
    ClientConnected { peer: SocketAddr },
    /// Acceptor: the client was lost; the listener accepts again
    ClientDisconnected { reason: String },
    /// A frame of a known type was received and decoded
    MessageReceived(Box<ReceivedMessage>),
    /// A queued frame was fully written
    MessageSent {
        type_tag: &'static str,
        timestamp: Timestamp,
    },
    /// The outbound queue drained after at least one write
    SendingFinished,
}

impl ConnectionEvent {
    /// Whether this event reports the end of a connection
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::LostConnectionToRemote { .. } | ConnectionEvent::ClientDisconnected { .. }
        )
    }
}
