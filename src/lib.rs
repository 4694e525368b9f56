//! OpenIGTLink point-to-point transport in Rust
//!
//! This library moves OpenIGTLink messages over a single TCP connection
//! between two endpoints, as used between navigation software, trackers
//! and imaging devices in image-guided therapy setups.
//!
//! # Features
//!
//! - **One connection, two workers** - a sender drains a FIFO queue and a
//!   listener reads and dispatches frames, both on the same socket
//! - **Both roles** - listen for one client at a time, or connect to a peer
//! - **Liveness** - keep-alive probes on an idle sender, idle timeout on
//!   the listener, both surfaced as ordinary disconnect events
//! - **Lossless framing** - unknown type tags are skipped by their declared
//!   body length without breaking the stream
//! - **Streaming control** - GET_/STT_/STP_/RTS_ variants of every kind
//!
//! # Quick Start
//!
//! ```no_run
//! use openigtlink_transport::io::{ConnectionEndpoint, ConnectionEvent, EndpointConfig};
//! use openigtlink_transport::protocol::types::{StartTransformMessage, TransformMessage};
//! use openigtlink_transport::protocol::IgtlMessage;
//!
//! # async fn run() -> openigtlink_transport::Result<()> {
//! // Tracker side: accept a navigation client
//! let (tracker, mut tracker_events) = ConnectionEndpoint::new(EndpointConfig::default())?;
//! let port = tracker.listen(18944).await?;
//!
//! // Navigation side: connect and ask for a 100 ms transform stream
//! let (navigation, mut navigation_events) = ConnectionEndpoint::new(EndpointConfig::default())?;
//! navigation.connect("localhost", port).await?;
//! navigation.send(&IgtlMessage::new(StartTransformMessage::new(100, "RAS"), "Navigation")?)?;
//!
//! while let Some(event) = tracker_events.recv().await {
//!     if let ConnectionEvent::MessageReceived(received) = event {
//!         if let Some(resolution) = received.resolution() {
//!             let pose = IgtlMessage::new(TransformMessage::translation(10.0, 0.0, 5.0), "Tool")?;
//!             tracker.send(&pose)?;
//!             println!("streaming every {} ms", resolution);
//!             break;
//!         }
//!     }
//! }
//!
//! if let Some(ConnectionEvent::MessageReceived(received)) = navigation_events.recv().await {
//!     println!("{}", received.message.describe());
//! }
//!
//! navigation.close().await;
//! tracker.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **`protocol`** - frame codec
//!   - `header` - 58-byte generic header and the keep-alive probe
//!   - `crc` - CRC-64 body checksum
//!   - `types` - TRANSFORM, TDATA, IMAGE, STRING, STATUS and their control variants
//!   - `dispatch` - immutable type-tag table used on receive
//!
//! - **`io`** - transport
//!   - `ConnectionEndpoint` - listen/connect/send/close façade
//!   - `SenderWorker` / `ListenerWorker` - per-connection worker tasks
//!   - `ConnectionEvent` - lifecycle and traffic events
//!
//! - **`error`** - `IgtlError` and `Result<T>`
//!
//! # Error Handling
//!
//! Establishment failures (`listen`, `connect`) are returned as errors.
//! Once a connection is up, nothing is returned as an error: peer loss,
//! write failures and idle timeouts arrive as a single disconnect event.
//!
//! ```no_run
//! use openigtlink_transport::io::{ConnectionEndpoint, EndpointConfig};
//! use openigtlink_transport::IgtlError;
//!
//! # async fn run() -> openigtlink_transport::Result<()> {
//! let (endpoint, _events) = ConnectionEndpoint::new(EndpointConfig::default())?;
//! match endpoint.connect("localhost", 18944).await {
//!     Ok(()) => println!("Connected"),
//!     Err(IgtlError::Resolution(e)) => eprintln!("Bad host: {}", e),
//!     Err(e) => eprintln!("Cannot connect: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod io;
pub mod protocol;

// Re-export commonly used types
pub use error::{IgtlError, Result};
