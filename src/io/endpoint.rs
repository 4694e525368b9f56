//! Connection endpoint
//!
//! [`ConnectionEndpoint`] is the application-facing half of the transport.
//! One endpoint drives exactly one TCP connection in one of two roles:
//!
//! - **Acceptor**: [`listen`](ConnectionEndpoint::listen) binds a port and
//!   starts a server-role listener. Each accepted client gets a sender on the
//!   same socket; losing the client returns the endpoint to waiting.
//! - **Initiator**: [`connect`](ConnectionEndpoint::connect) starts a sender
//!   that opens the connection, then a passive listener on the same socket.
//!   Losing the peer tears both workers down.
//!
//! Lifecycle changes and traffic are reported on the event channel returned
//! by [`ConnectionEndpoint::new`].
//!
//! # Examples
//!
//! ```no_run
//! use openigtlink_transport::io::{ConnectionEndpoint, ConnectionEvent, EndpointConfig};
//! use openigtlink_transport::protocol::types::TransformMessage;
//! use openigtlink_transport::protocol::IgtlMessage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (server, mut server_events) = ConnectionEndpoint::new(EndpointConfig::default())?;
//!     let port = server.listen(0).await?;
//!
//!     let (client, _client_events) = ConnectionEndpoint::new(EndpointConfig::default())?;
//!     client.connect("127.0.0.1", port).await?;
//!
//!     let msg = IgtlMessage::new(TransformMessage::identity(), "Tracker")?;
//!     client.send(&msg)?;
//!
//!     while let Some(event) = server_events.recv().await {
//!         if let ConnectionEvent::MessageReceived(received) = event {
//!             println!("{}", received.message.describe());
//!             break;
//!         }
//!     }
//!
//!     client.close().await;
//!     server.close().await;
//!     Ok(())
//! }
//! ```

use crate::error::{IgtlError, Result};
use crate::io::config::EndpointConfig;
use crate::io::events::ConnectionEvent;
use crate::io::listener::ListenerWorker;
use crate::io::queue::{OutboundFrame, QueueStats};
use crate::io::sender::SenderWorker;
use crate::io::state::{ConnectionState, RoleFlags};
use crate::io::stats::{StatisticsSnapshot, TrafficStatistics};
use crate::io::supervisor::Supervisor;
use crate::io::worker::{SenderHandle, WorkerEventReceiver, WorkerEventSender, WorkerHandle, WorkerId};
use crate::protocol::any_message::AnyMessage;
use crate::protocol::message::{IgtlMessage, Message};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Initiator,
    Acceptor,
}

/// Mutable endpoint state, guarded by a synchronous mutex that is never
/// held across an await
pub(crate) struct Status {
    pub(crate) state: ConnectionState,
    pub(crate) flags: RoleFlags,
    pub(crate) role: Option<Role>,
    pub(crate) local_port: Option<u16>,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) sender: Option<SenderHandle>,
    pub(crate) listener: Option<WorkerHandle>,
    /// ClientConnected was emitted for the current client
    pub(crate) client_announced: bool,
    pub(crate) last_error: Option<String>,
}

impl Status {
    fn new() -> Self {
        Status {
            state: ConnectionState::NotInitialized,
            flags: RoleFlags::default(),
            role: None,
            local_port: None,
            peer: None,
            sender: None,
            listener: None,
            client_announced: false,
            last_error: None,
        }
    }

    pub(crate) fn is_sender(&self, worker: WorkerId) -> bool {
        self.sender.as_ref().map(|h| h.id()) == Some(worker)
    }

    pub(crate) fn is_listener(&self, worker: WorkerId) -> bool {
        self.listener.as_ref().map(|h| h.id()) == Some(worker)
    }

    fn reset_roles(&mut self) {
        self.flags = RoleFlags::default();
        self.role = None;
        self.peer = None;
        self.client_announced = false;
    }
}

/// State shared between the endpoint and its supervisor task
pub(crate) struct Shared {
    pub(crate) config: EndpointConfig,
    status: Mutex<Status>,
    state_tx: watch::Sender<ConnectionState>,
    app_tx: mpsc::UnboundedSender<ConnectionEvent>,
    pub(crate) stats: TrafficStatistics,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a state change; call with the status lock held
    pub(crate) fn set_state(&self, status: &mut Status, state: ConnectionState) {
        if status.state != state {
            debug!(from = %status.state, to = %state, "State change");
            status.state = state;
        }
        self.state_tx.send_replace(state);
    }

    /// Deliver an event to the application; a dropped receiver is ignored
    pub(crate) fn notify(&self, event: ConnectionEvent) {
        let _ = self.app_tx.send(event);
    }
}

/// Stop both workers concurrently, each bounded by `grace`
pub(crate) async fn stop_workers(
    sender: Option<SenderHandle>,
    listener: Option<WorkerHandle>,
    grace: Duration,
) {
    let stop_sender = async {
        if let Some(sender) = sender {
            sender.handle.shutdown(grace).await;
        }
    };
    let stop_listener = async {
        if let Some(listener) = listener {
            listener.shutdown(grace).await;
        }
    };
    tokio::join!(stop_sender, stop_listener);
}

struct Session {
    shutdown: Arc<Notify>,
    supervisor: JoinHandle<()>,
}

/// One endpoint of a point-to-point OpenIGTLink connection
pub struct ConnectionEndpoint {
    shared: Arc<Shared>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl ConnectionEndpoint {
    /// Create an idle endpoint and the receiver for its events
    ///
    /// # Errors
    ///
    /// - [`IgtlError::InvalidConfig`] if `config` fails validation
    pub fn new(config: EndpointConfig) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        config.validate()?;

        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::NotInitialized);

        let endpoint = ConnectionEndpoint {
            shared: Arc::new(Shared {
                config,
                status: Mutex::new(Status::new()),
                state_tx,
                app_tx,
                stats: TrafficStatistics::new(),
            }),
            session: tokio::sync::Mutex::new(None),
        };
        Ok((endpoint, app_rx))
    }

    /// Bind `port` on all IPv4 interfaces and wait for clients
    ///
    /// Returns once the listener's accept loop is running. Port 0 binds an
    /// ephemeral port; the bound port is returned.
    ///
    /// # Errors
    ///
    /// - [`IgtlError::InvalidState`] if the endpoint is already active
    /// - [`IgtlError::Bind`] if the port cannot be bound
    /// - [`IgtlError::Timeout`] if the listener does not start in time
    pub async fn listen(&self, port: u16) -> Result<u16> {
        let mut session = self.session.lock().await;
        self.ensure_idle()?;
        self.end_session(&mut session).await;

        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let listener = match ListenerWorker::bind(port, self.shared.config.clone(), worker_tx.clone()).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(port = port, error = %e, "Listen failed");
                self.shared.lock().last_error = Some(e.to_string());
                return Err(e);
            }
        };
        let bound = listener.local_port();

        {
            let mut status = self.shared.lock();
            status.reset_roles();
            status.role = Some(Role::Acceptor);
            status.flags.listening = true;
            status.local_port = Some(bound);
            status.last_error = None;
            self.shared.set_state(&mut status, ConnectionState::Listening);
        }

        *session = Some(self.spawn_supervisor(worker_tx, worker_rx));

        let handle = listener.start();
        let control = Arc::clone(handle.control());
        self.shared.lock().listener = Some(handle);

        if !control.wait_live(self.shared.config.startup_timeout).await {
            warn!(port = bound, "Listener did not start");
            self.end_session(&mut session).await;
            let mut status = self.shared.lock();
            status.reset_roles();
            status.local_port = None;
            self.shared.set_state(&mut status, ConnectionState::NotInitialized);
            return Err(IgtlError::Timeout("listener did not start".to_string()));
        }

        {
            let mut status = self.shared.lock();
            if status.state == ConnectionState::Listening {
                self.shared.set_state(&mut status, ConnectionState::WaitingForClient);
            }
        }

        info!(port = bound, "Listening");
        Ok(bound)
    }

    /// Open a connection to `host:port`
    ///
    /// Makes a single bounded attempt; there is no retry. Resolves once both
    /// workers are running on the new connection or the attempt has failed.
    /// A failure is returned here and emitted once as
    /// [`ConnectionEvent::CannotConnectToRemote`].
    ///
    /// # Errors
    ///
    /// - [`IgtlError::InvalidState`] if the endpoint is already active
    /// - [`IgtlError::Resolution`] if `host` has no IPv4 address
    /// - [`IgtlError::Connect`] if the peer cannot be reached
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_idle()?;
        self.end_session(&mut session).await;

        let addr = match self.resolve(host, port).await {
            Ok(addr) => addr,
            Err(e) => {
                warn!(host = host, port = port, error = %e, "Cannot resolve remote");
                let reason = e.to_string();
                self.shared.lock().last_error = Some(reason.clone());
                self.shared.notify(ConnectionEvent::CannotConnectToRemote { reason });
                return Err(e);
            }
        };

        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let mut state_rx = self.shared.state_tx.subscribe();
        {
            let mut status = self.shared.lock();
            status.reset_roles();
            status.role = Some(Role::Initiator);
            status.peer = Some(addr);
            status.local_port = None;
            status.last_error = None;
            self.shared.set_state(&mut status, ConnectionState::Connecting);
        }

        *session = Some(self.spawn_supervisor(worker_tx.clone(), worker_rx));

        let sender = SenderWorker::connect_to(addr, self.shared.config.clone(), worker_tx).start();
        self.shared.lock().sender = Some(sender);

        let limit = self.shared.config.connect_timeout + self.shared.config.startup_timeout * 2;
        let settled = match timeout(limit, state_rx.wait_for(|s| !s.is_establishing())).await {
            Ok(Ok(state)) => Some(*state),
            _ => None,
        };

        if settled == Some(ConnectionState::AbleToSend) {
            info!(remote = %addr, "Connection established");
            return Ok(());
        }

        // Stop the supervisor before deciding who reports the failure
        self.end_session(&mut session).await;

        let mut status = self.shared.lock();
        let reason = status
            .last_error
            .clone()
            .unwrap_or_else(|| format!("no connection within {}ms", limit.as_millis()));
        if status.state.is_establishing() {
            status.last_error = Some(reason.clone());
            self.shared.notify(ConnectionEvent::CannotConnectToRemote {
                reason: reason.clone(),
            });
        }
        status.reset_roles();
        self.shared.set_state(&mut status, ConnectionState::NotInitialized);

        Err(IgtlError::Connect {
            addr: addr.to_string(),
            reason,
        })
    }

    /// Queue a message for sending
    ///
    /// Never blocks on the network. Completion is reported later by
    /// [`ConnectionEvent::MessageSent`].
    ///
    /// # Returns
    /// `Ok(true)` if enqueued, `Ok(false)` if the endpoint cannot send right
    /// now or a bounded queue is full
    ///
    /// # Errors
    ///
    /// Only encoding failures, e.g. an over-long device name
    pub fn send<T: Message>(&self, message: &IgtlMessage<T>) -> Result<bool> {
        if !self.is_able_to_send() {
            trace!(type_tag = T::message_type(), "Not able to send, message dropped");
            return Ok(false);
        }
        self.enqueue(OutboundFrame::encode(message)?)
    }

    /// Queue a dynamically typed message, e.g. one received from a peer
    pub fn send_any(&self, message: &AnyMessage) -> Result<bool> {
        if !self.is_able_to_send() {
            trace!(type_tag = message.message_type(), "Not able to send, message dropped");
            return Ok(false);
        }
        self.enqueue(OutboundFrame::from_any(message)?)
    }

    fn enqueue(&self, frame: OutboundFrame) -> Result<bool> {
        let status = self.shared.lock();
        if !status.flags.able_to_send {
            return Ok(false);
        }
        match &status.sender {
            Some(sender) => Ok(sender.queue().push(frame)),
            None => Ok(false),
        }
    }

    /// Stop both workers and release the connection
    ///
    /// Waits up to the configured grace period for each worker. Safe to call
    /// repeatedly; always leaves the endpoint [`ConnectionState::Terminated`].
    pub async fn close(&self) {
        let mut session = self.session.lock().await;

        {
            let mut status = self.shared.lock();
            if status.state == ConnectionState::Terminated && session.is_none() {
                debug!("Endpoint already closed");
                return;
            }
            status.flags.able_to_send = false;
            self.shared.set_state(&mut status, ConnectionState::ShuttingDown);
        }

        self.end_session(&mut session).await;

        let mut status = self.shared.lock();
        status.reset_roles();
        status.local_port = None;
        self.shared.set_state(&mut status, ConnectionState::Terminated);
        info!("Endpoint closed");
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Current role flags
    pub fn flags(&self) -> RoleFlags {
        self.shared.lock().flags
    }

    /// Whether [`send`](Self::send) currently enqueues
    pub fn is_able_to_send(&self) -> bool {
        self.shared.lock().flags.able_to_send
    }

    /// Bound port (acceptor) or local port of the connection (initiator)
    pub fn local_port(&self) -> Option<u16> {
        self.shared.lock().local_port
    }

    /// Remote address of the current connection
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.lock().peer
    }

    /// Description of the last establishment or connection failure
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// Frames waiting in the outbound queue
    pub fn queued(&self) -> usize {
        self.shared
            .lock()
            .sender
            .as_ref()
            .map_or(0, |sender| sender.queue().len())
    }

    /// Counters of the current outbound queue
    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.shared.lock().sender.as_ref().map(|sender| sender.queue().stats())
    }

    /// Traffic counters since creation
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Endpoint configuration
    pub fn config(&self) -> &EndpointConfig {
        &self.shared.config
    }

    fn ensure_idle(&self) -> Result<()> {
        let state = self.state();
        if state.is_idle() {
            Ok(())
        } else {
            Err(IgtlError::InvalidState(format!(
                "endpoint is {}, close it first",
                state
            )))
        }
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let mut addrs = timeout(self.shared.config.connect_timeout, lookup_host((host, port)))
            .await
            .map_err(|_| IgtlError::Resolution(format!("{}: lookup timed out", host)))?
            .map_err(|e| IgtlError::Resolution(format!("{}: {}", host, e)))?;

        addrs
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| IgtlError::Resolution(format!("{}: no IPv4 address", host)))
    }

    fn spawn_supervisor(
        &self,
        worker_tx: WorkerEventSender,
        worker_rx: WorkerEventReceiver,
    ) -> Session {
        let shutdown = Arc::new(Notify::new());
        let supervisor = Supervisor::new(
            Arc::clone(&self.shared),
            worker_rx,
            worker_tx,
            Arc::clone(&shutdown),
        )
        .spawn();

        Session {
            shutdown,
            supervisor,
        }
    }

    /// Stop the supervisor, then both workers
    async fn end_session(&self, session: &mut Option<Session>) {
        let grace = self.shared.config.shutdown_grace;

        if let Some(session) = session.take() {
            session.shutdown.notify_one();
            if timeout(grace, session.supervisor).await.is_err() {
                warn!(grace_ms = grace.as_millis() as u64, "Supervisor did not stop within grace period");
            }
        }

        let (sender, listener) = {
            let mut status = self.shared.lock();
            (status.sender.take(), status.listener.take())
        };
        stop_workers(sender, listener, grace).await;
    }
}

impl Drop for ConnectionEndpoint {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.shutdown.notify_one();
        }
        let status = self.shared.lock();
        if let Some(sender) = &status.sender {
            sender.handle.stop();
        }
        if let Some(listener) = &status.listener {
            listener.stop();
        }
    }
}

impl std::fmt::Debug for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.shared.lock();
        f.debug_struct("ConnectionEndpoint")
            .field("state", &status.state)
            .field("flags", &status.flags)
            .field("local_port", &status.local_port)
            .field("peer", &status.peer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_invalid_config_rejected() {
        let config = EndpointConfig::default().with_idle_timeout(Duration::from_millis(100));
        assert!(matches!(
            ConnectionEndpoint::new(config),
            Err(IgtlError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_send_before_connect_is_dropped() {
        let (endpoint, _events) = assert_ok!(ConnectionEndpoint::new(EndpointConfig::default()));
        let msg = IgtlMessage::new(crate::protocol::types::StatusMessage::ok("x"), "Dev").unwrap();
        assert!(!endpoint.send(&msg).unwrap());
        assert_eq!(endpoint.queued(), 0);
        assert_eq!(endpoint.state(), ConnectionState::NotInitialized);
    }

    #[tokio::test]
    async fn test_resolution_failure_emits_once() {
        let (endpoint, mut events) = ConnectionEndpoint::new(EndpointConfig::default()).unwrap();
        let result = endpoint.connect("host.invalid", 18944).await;
        assert!(matches!(result, Err(IgtlError::Resolution(_))));
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::CannotConnectToRemote { .. })
        ));
        assert!(events.try_recv().is_err());
        assert_eq!(endpoint.state(), ConnectionState::NotInitialized);
    }

    #[tokio::test]
    async fn test_listen_twice_is_invalid_state() {
        let (endpoint, _events) = ConnectionEndpoint::new(EndpointConfig::default()).unwrap();
        let port = endpoint.listen(0).await.unwrap();
        assert_ne!(port, 0);
        assert_eq!(endpoint.state(), ConnectionState::WaitingForClient);
        assert!(endpoint.flags().listening);
        assert!(matches!(endpoint.listen(0).await, Err(IgtlError::InvalidState(_))));
        endpoint.close().await;
        assert_eq!(endpoint.state(), ConnectionState::Terminated);
    }

    #[tokio::test]
    async fn test_close_without_open() {
        let (endpoint, _events) = ConnectionEndpoint::new(EndpointConfig::default()).unwrap();
        endpoint.close().await;
        endpoint.close().await;
        assert_eq!(endpoint.state(), ConnectionState::Terminated);
    }
}
