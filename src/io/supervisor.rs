//! Endpoint supervisor
//!
//! A task per listen/connect session that consumes worker events, drives
//! the endpoint's state machine, starts the second worker once a socket is
//! up, and forwards traffic to the application. Every failure path tears
//! down both workers of the connection and emits exactly one event.

use crate::io::endpoint::{stop_workers, Role, Shared};
use crate::io::events::{ConnectionEvent, ReceivedMessage};
use crate::io::listener::ListenerWorker;
use crate::io::sender::SenderWorker;
use crate::io::socket::SharedSocket;
use crate::io::state::ConnectionState;
use crate::io::worker::{WorkerEvent, WorkerEventReceiver, WorkerEventSender, WorkerId};
use crate::protocol::header::Timestamp;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, info_span, trace, warn, Instrument};

pub(crate) struct Supervisor {
    shared: Arc<Shared>,
    events: WorkerEventReceiver,
    worker_tx: WorkerEventSender,
    shutdown: Arc<Notify>,
}

impl Supervisor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        events: WorkerEventReceiver,
        worker_tx: WorkerEventSender,
        shutdown: Arc<Notify>,
    ) -> Self {
        Supervisor {
            shared,
            events,
            worker_tx,
            shutdown,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run().instrument(info_span!("supervisor")))
    }

    async fn run(mut self) {
        let mut ticker = self.shared.config.stats_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = next_tick(&mut ticker) => {
                    info!(summary = %self.shared.stats.snapshot().summary(), "Traffic statistics");
                }
            }
        }

        debug!("Supervisor stopped");
    }

    async fn handle(&self, event: WorkerEvent) {
        let worker = event.worker();
        match event {
            WorkerEvent::Connected { socket, .. } => self.on_connected(worker, socket).await,
            WorkerEvent::CannotConnect { reason, .. } => self.on_cannot_connect(worker, reason).await,
            WorkerEvent::ClientConnected { socket, peer, .. } => {
                self.on_client_connected(worker, socket, peer).await
            }
            WorkerEvent::ClientDisconnected { reason, .. } => {
                self.on_client_disconnected(worker, reason).await
            }
            WorkerEvent::ConnectionLost { reason, .. } => self.on_connection_lost(worker, reason).await,
            WorkerEvent::MessageReceived { message, .. } => self.on_message_received(worker, message),
            WorkerEvent::MessageSent {
                type_tag,
                bytes,
                sent_at,
                ..
            } => self.on_message_sent(worker, type_tag, bytes, sent_at),
            WorkerEvent::SendingFinished { .. } => {
                if self.shared.lock().is_sender(worker) {
                    self.shared.notify(ConnectionEvent::SendingFinished);
                }
            }
            WorkerEvent::ShutdownComplete { .. } => trace!(worker = %worker, "Worker exited"),
        }
    }

    /// Initiator: the sender's socket is open, start the passive listener
    async fn on_connected(&self, worker: WorkerId, socket: Arc<SharedSocket>) {
        let config = &self.shared.config;
        let peer = socket.peer_addr();

        let sender_control = {
            let mut status = self.shared.lock();
            let sender = match &status.sender {
                Some(sender) if sender.id() == worker => Arc::clone(sender.handle.control()),
                _ => return,
            };
            if status.state != ConnectionState::Connecting {
                return;
            }
            status.flags.connected_to_remote = true;
            status.peer = Some(peer);
            status.local_port = Some(socket.local_addr().port());
            self.shared.set_state(&mut status, ConnectionState::ConnectedToRemote);
            sender
        };

        let listener = ListenerWorker::adopt(socket, config.clone(), self.worker_tx.clone()).start();
        let listener_control = Arc::clone(listener.control());
        self.shared.lock().listener = Some(listener);

        let live = listener_control.wait_live(config.startup_timeout).await
            && sender_control.wait_live(config.startup_timeout).await;

        if !live {
            let reason = "workers did not start on the new connection".to_string();
            warn!(remote = %peer, "Connection setup failed");
            let (sender, listener) = {
                let mut status = self.shared.lock();
                if status.state != ConnectionState::ConnectedToRemote {
                    return;
                }
                status.flags = Default::default();
                status.last_error = Some(reason.clone());
                self.shared.notify(ConnectionEvent::CannotConnectToRemote { reason });
                self.shared.set_state(&mut status, ConnectionState::NotInitialized);
                (status.sender.take(), status.listener.take())
            };
            stop_workers(sender, listener, config.shutdown_grace).await;
            return;
        }

        let mut status = self.shared.lock();
        if status.state != ConnectionState::ConnectedToRemote {
            return;
        }
        status.flags.able_to_send = true;
        info!(remote = %peer, "Connected to remote");
        self.shared.notify(ConnectionEvent::ConnectedToRemote { peer });
        self.shared.set_state(&mut status, ConnectionState::AbleToSend);
    }

    /// Initiator: the single connection attempt failed
    async fn on_cannot_connect(&self, worker: WorkerId, reason: String) {
        let sender = {
            let mut status = self.shared.lock();
            if !status.is_sender(worker) || status.state != ConnectionState::Connecting {
                return;
            }
            status.flags = Default::default();
            status.last_error = Some(reason.clone());
            self.shared.notify(ConnectionEvent::CannotConnectToRemote { reason });
            self.shared.set_state(&mut status, ConnectionState::NotInitialized);
            status.sender.take()
        };
        stop_workers(sender, None, self.shared.config.shutdown_grace).await;
    }

    /// Acceptor: attach a sender to the accepted socket
    async fn on_client_connected(&self, worker: WorkerId, socket: Arc<SharedSocket>, peer: SocketAddr) {
        let config = &self.shared.config;

        let stale = {
            let mut status = self.shared.lock();
            if !status.is_listener(worker)
                || !matches!(
                    status.state,
                    ConnectionState::Listening | ConnectionState::WaitingForClient
                )
            {
                return;
            }
            status.flags.client_connected = true;
            status.peer = Some(peer);
            status.client_announced = false;
            self.shared.set_state(&mut status, ConnectionState::ClientConnected);
            status.sender.take()
        };
        stop_workers(stale, None, config.shutdown_grace).await;

        let sender = SenderWorker::adopt(Arc::clone(&socket), config.clone(), self.worker_tx.clone()).start();
        let sender_control = Arc::clone(sender.handle.control());
        self.shared.lock().sender = Some(sender);

        if !sender_control.wait_live(config.startup_timeout).await {
            warn!(peer = %peer, "Sender did not start, dropping client");
            // Only this client's socket; the listener reports the disconnect
            socket.close();
            return;
        }

        let mut status = self.shared.lock();
        if status.state != ConnectionState::ClientConnected {
            return;
        }
        status.flags.able_to_send = true;
        status.client_announced = true;
        info!(peer = %peer, "Client connected");
        self.shared.notify(ConnectionEvent::ClientConnected { peer });
        self.shared.set_state(&mut status, ConnectionState::AbleToSend);
    }

    /// Acceptor: the client is gone and the listener is accepting again
    async fn on_client_disconnected(&self, worker: WorkerId, reason: String) {
        let sender = {
            let mut status = self.shared.lock();
            if !status.is_listener(worker) {
                return;
            }
            status.flags.client_connected = false;
            status.flags.able_to_send = false;
            status.peer = None;
            if std::mem::take(&mut status.client_announced) {
                info!(reason = %reason, "Client disconnected");
                self.shared.notify(ConnectionEvent::ClientDisconnected { reason });
            }
            if matches!(
                status.state,
                ConnectionState::ClientConnected | ConnectionState::AbleToSend
            ) {
                self.shared.set_state(&mut status, ConnectionState::WaitingForClient);
            }
            status.sender.take()
        };
        stop_workers(sender, None, self.shared.config.shutdown_grace).await;
    }

    async fn on_connection_lost(&self, worker: WorkerId, reason: String) {
        let role = self.shared.lock().role;
        match role {
            Some(Role::Initiator) => self.on_remote_lost(worker, reason).await,
            Some(Role::Acceptor) => {
                // The sender closed its socket on the way out, so the
                // listener's read fails and it reports the disconnect
                if self.shared.lock().is_sender(worker) {
                    debug!(reason = %reason, "Sender lost the client");
                }
            }
            None => {}
        }
    }

    /// Initiator: either worker lost the peer, tear down both
    async fn on_remote_lost(&self, worker: WorkerId, reason: String) {
        let (sender, listener) = {
            let mut status = self.shared.lock();
            if !(status.is_sender(worker) || status.is_listener(worker)) {
                return;
            }
            if !matches!(
                status.state,
                ConnectionState::ConnectedToRemote | ConnectionState::AbleToSend
            ) {
                return;
            }
            warn!(reason = %reason, "Lost connection to remote");
            status.flags = Default::default();
            status.last_error = Some(reason.clone());
            self.shared.notify(ConnectionEvent::LostConnectionToRemote { reason });
            self.shared.set_state(&mut status, ConnectionState::NotInitialized);
            (status.sender.take(), status.listener.take())
        };
        stop_workers(sender, listener, self.shared.config.shutdown_grace).await;
    }

    fn on_message_received(&self, worker: WorkerId, message: Box<ReceivedMessage>) {
        if !self.shared.lock().is_listener(worker) {
            return;
        }
        self.shared
            .stats
            .record_received(message.type_tag(), message.frame_size(), message.latency());
        self.shared.notify(ConnectionEvent::MessageReceived(message));
    }

    fn on_message_sent(&self, worker: WorkerId, type_tag: &'static str, bytes: usize, sent_at: Timestamp) {
        if !self.shared.lock().is_sender(worker) {
            return;
        }
        self.shared.stats.record_sent(bytes as u64);
        self.shared.notify(ConnectionEvent::MessageSent {
            type_tag,
            timestamp: sent_at,
        });
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
