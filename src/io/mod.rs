//! Network transport for OpenIGTLink connections
//!
//! [`ConnectionEndpoint`] owns one TCP connection and runs two workers on it:
//! a [`SenderWorker`] draining an outbound queue and a [`ListenerWorker`]
//! reading and dispatching frames. Their reports are folded into
//! [`ConnectionEvent`]s for the application.

pub mod config;
pub mod endpoint;
pub mod events;
pub mod listener;
pub mod queue;
pub mod sender;
pub mod socket;
pub mod state;
pub mod stats;
mod supervisor;
pub mod worker;

pub use config::EndpointConfig;
pub use endpoint::ConnectionEndpoint;
pub use events::{ConnectionEvent, ReceivedMessage};
pub use listener::ListenerWorker;
pub use queue::{OutboundFrame, OutboundQueue, QueueStats};
pub use sender::SenderWorker;
pub use socket::SharedSocket;
pub use state::{ConnectionState, RoleFlags};
pub use stats::{StatisticsSnapshot, TrafficStatistics, TypeStats};
pub use worker::{
    SenderHandle, WorkerControl, WorkerEvent, WorkerEventReceiver, WorkerEventSender, WorkerHandle,
    WorkerId,
};
