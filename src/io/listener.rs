//! Listener worker
//!
//! In server role it accepts one client at a time on a bound port and reads
//! from it until the client is lost, then accepts again. In passive role it
//! reads from a socket opened by a sender.
//!
//! The reading loop peeks at the stream: a two-byte keep-alive probe is
//! consumed silently, anything else is a 58-byte header followed by its
//! declared body. Tags missing from the dispatch table are skipped by
//! body length so framing survives. Silence longer than the idle timeout,
//! EOF, or any read error ends the session as peer loss.

use crate::error::{IgtlError, Result};
use crate::io::config::EndpointConfig;
use crate::io::events::ReceivedMessage;
use crate::io::socket::SharedSocket;
use crate::io::worker::{emit, WorkerControl, WorkerEvent, WorkerEventSender, WorkerHandle, WorkerId};
use crate::protocol::dispatch::DispatchTable;
use crate::protocol::header::{is_keep_alive, Header, Timestamp, KEEP_ALIVE_PROBE};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, info_span, trace, warn, Instrument};

enum Mode {
    Server(TcpListener),
    Passive(Arc<SharedSocket>),
}

enum SessionEnd {
    Stopped,
    Lost(String),
}

/// Listener worker, configured but not yet started
pub struct ListenerWorker {
    id: WorkerId,
    config: EndpointConfig,
    mode: Mode,
    events: WorkerEventSender,
    local_port: u16,
}

impl ListenerWorker {
    /// Bind the wildcard IPv4 address on `port` (0 picks an ephemeral port)
    ///
    /// # Errors
    ///
    /// - [`IgtlError::Bind`] if the port cannot be bound
    pub async fn bind(port: u16, config: EndpointConfig, events: WorkerEventSender) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| IgtlError::Bind { port, source })?;
        let local_port = listener
            .local_addr()
            .map_err(|source| IgtlError::Bind { port, source })?
            .port();

        info!(port = local_port, "Listener bound");

        Ok(ListenerWorker {
            id: WorkerId::next(),
            config,
            mode: Mode::Server(listener),
            events,
            local_port,
        })
    }

    /// Listener that reads from an already connected socket
    pub fn adopt(socket: Arc<SharedSocket>, config: EndpointConfig, events: WorkerEventSender) -> Self {
        let local_port = socket.local_addr().port();
        ListenerWorker {
            id: WorkerId::next(),
            config,
            mode: Mode::Passive(socket),
            events,
            local_port,
        }
    }

    /// Worker identifier
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Bound port (server role) or local port of the adopted socket
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Spawn the worker task
    pub fn start(self) -> WorkerHandle {
        let id = self.id;
        let control = WorkerControl::new();
        let span = match &self.mode {
            Mode::Server(_) => info_span!("listener", worker = %id, role = "server", port = self.local_port),
            Mode::Passive(socket) => {
                info_span!("listener", worker = %id, role = "passive", remote = %socket.peer_addr())
            }
        };

        let task_control = Arc::clone(&control);
        let join = tokio::spawn(self.run(task_control).instrument(span));

        WorkerHandle { id, control, join }
    }

    async fn run(self, control: Arc<WorkerControl>) {
        control.mark_live();

        match &self.mode {
            Mode::Server(listener) => self.serve(listener, &control).await,
            Mode::Passive(socket) => {
                debug!("Reading from adopted socket");
                let end = self.read_session(socket, &control).await;
                socket.close();
                if let SessionEnd::Lost(reason) = end {
                    emit(
                        &self.events,
                        WorkerEvent::ConnectionLost {
                            worker: self.id,
                            reason,
                        },
                    );
                }
            }
        }

        control.mark_inactive();
        debug!("Listener stopped");
        emit(&self.events, WorkerEvent::ShutdownComplete { worker: self.id });
    }

    async fn serve(&self, listener: &TcpListener, control: &WorkerControl) {
        debug!("Waiting for client");

        while control.is_running() {
            let (stream, peer) = match timeout(self.config.accept_poll_interval, listener.accept()).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
                Ok(Ok(accepted)) => accepted,
            };

            let socket = match SharedSocket::new(stream, &self.config) {
                Ok(socket) => Arc::new(socket),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Rejecting client, socket setup failed");
                    continue;
                }
            };

            info!(peer = %peer, "Client connected");
            emit(
                &self.events,
                WorkerEvent::ClientConnected {
                    worker: self.id,
                    socket: Arc::clone(&socket),
                    peer,
                },
            );

            let end = self.read_session(&socket, control).await;
            socket.close();

            if let SessionEnd::Lost(reason) = end {
                info!(peer = %peer, reason = %reason, "Client disconnected");
                emit(
                    &self.events,
                    WorkerEvent::ClientDisconnected {
                        worker: self.id,
                        reason,
                    },
                );
            }
        }
    }

    fn read_wait(&self) -> Duration {
        self.config.io_timeout.min(self.config.idle_timeout)
    }

    async fn read_session(&self, socket: &SharedSocket, control: &WorkerControl) -> SessionEnd {
        let idle_timeout = self.config.idle_timeout;
        let sender_port = socket.peer_addr().port();
        let mut last_rx = Instant::now();
        let mut peek = [0u8; KEEP_ALIVE_PROBE.len()];

        loop {
            if !control.is_running() {
                return SessionEnd::Stopped;
            }

            let idle = last_rx.elapsed();
            if idle >= idle_timeout {
                warn!(idle_ms = idle.as_millis() as u64, "Idle timeout, peer lost");
                return SessionEnd::Lost(format!("idle timeout after {}ms", idle.as_millis()));
            }

            let wait = self.config.poll_interval.min(idle_timeout - idle);
            match socket.peek_available(&mut peek, wait).await {
                Ok(None) => continue,
                Ok(Some(n)) if n < peek.len() => {
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    if !control.is_running() {
                        return SessionEnd::Stopped;
                    }
                    debug!(error = %e, "Read side closed");
                    return SessionEnd::Lost(e.to_string());
                }
            }

            let result = if is_keep_alive(&peek) {
                self.consume_keep_alive(socket).await
            } else {
                self.read_frame(socket, sender_port, &mut last_rx).await
            };

            match result {
                Ok(()) => last_rx = Instant::now(),
                Err(e) => {
                    if !control.is_running() {
                        return SessionEnd::Stopped;
                    }
                    warn!(error = %e, "Read failed, peer lost");
                    return SessionEnd::Lost(e.to_string());
                }
            }
        }
    }

    async fn consume_keep_alive(&self, socket: &SharedSocket) -> Result<()> {
        let mut probe = [0u8; KEEP_ALIVE_PROBE.len()];
        socket.read_exact(&mut probe, self.read_wait()).await?;
        trace!("Keep-alive received");
        Ok(())
    }

    async fn read_frame(&self, socket: &SharedSocket, sender_port: u16, last_rx: &mut Instant) -> Result<()> {
        let wait = self.read_wait();
        let arrived = Timestamp::now();

        let mut raw = [0u8; Header::SIZE];
        socket.read_exact(&mut raw, wait).await?;
        *last_rx = Instant::now();

        let header = Header::decode(&raw)?;
        let type_tag = header.type_name.as_str()?;
        let body_size = header.body_size;

        let Some(entry) = DispatchTable::global().resolve(type_tag) else {
            info!(type_tag = type_tag, body_size = body_size, "Unknown message type, skipping body");
            return socket.skip(body_size, wait).await;
        };

        if body_size > self.config.max_body_size as u64 {
            warn!(
                type_tag = type_tag,
                body_size = body_size,
                max = self.config.max_body_size,
                "Body exceeds maximum size, skipping"
            );
            return socket.skip(body_size, wait).await;
        }

        let mut body = vec![0u8; body_size as usize];
        let mut filled = 0;
        while filled < body.len() {
            filled += socket.read_some(&mut body[filled..], wait).await?;
            *last_rx = Instant::now();
        }
        let received = Timestamp::now();

        match entry.decode(&header, &body, self.config.verify_crc) {
            Ok(message) => {
                debug!(
                    type_tag = type_tag,
                    device = %message.device_name(),
                    body_size = body_size,
                    "Message received"
                );
                let created = header.timestamp;
                emit(
                    &self.events,
                    WorkerEvent::MessageReceived {
                        worker: self.id,
                        message: Box::new(ReceivedMessage {
                            message,
                            created,
                            arrived,
                            received,
                            sender_port,
                            body_size,
                        }),
                    },
                );
            }
            Err(e) => {
                warn!(type_tag = type_tag, error = %e, "Discarding undecodable frame");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::IgtlMessage;
    use crate::protocol::types::{StatusMessage, TransformMessage};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;

    fn unknown_frame(body_len: usize) -> Vec<u8> {
        let mut header = Header::new("POSITION", "Dev").unwrap();
        header.body_size = body_len as u64;
        let mut frame = header.encode();
        frame.extend(std::iter::repeat(0xAB).take(body_len));
        frame
    }

    async fn next_non_lifecycle(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> WorkerEvent {
        loop {
            let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
            if !matches!(event, WorkerEvent::ClientConnected { .. }) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = ListenerWorker::bind(0, EndpointConfig::default(), tx.clone()).await.unwrap();
        let port = first.local_port();
        let second = ListenerWorker::bind(port, EndpointConfig::default(), tx).await;
        assert!(matches!(second, Err(IgtlError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_unknown_tag_skipped_then_valid_frame_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = ListenerWorker::bind(0, EndpointConfig::default(), tx).await.unwrap();
        let port = listener.local_port();
        let handle = listener.start();

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let valid = IgtlMessage::new(StatusMessage::ok("after skip"), "Dev").unwrap();

        let mut stream = Vec::new();
        stream.extend_from_slice(&KEEP_ALIVE_PROBE);
        stream.extend(unknown_frame(37));
        stream.extend(valid.encode().unwrap());
        client.write_all(&stream).await.unwrap();

        match next_non_lifecycle(&mut rx).await {
            WorkerEvent::MessageReceived { message, .. } => {
                assert_eq!(message.type_tag(), "STATUS");
                assert_eq!(message.message.as_status().unwrap().content.status_string, "after skip");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        drop(client);
        assert!(matches!(
            next_non_lifecycle(&mut rx).await,
            WorkerEvent::ClientDisconnected { .. }
        ));

        assert!(handle.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_crc_failure_keeps_connection() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = ListenerWorker::bind(0, EndpointConfig::default(), tx).await.unwrap();
        let port = listener.local_port();
        let handle = listener.start();

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut corrupt = IgtlMessage::new(TransformMessage::identity(), "Dev")
            .unwrap()
            .encode()
            .unwrap();
        corrupt[Header::SIZE] ^= 0xFF;
        let good = IgtlMessage::new(TransformMessage::translation(1.0, 2.0, 3.0), "Dev")
            .unwrap()
            .encode()
            .unwrap();
        client.write_all(&corrupt).await.unwrap();
        client.write_all(&good).await.unwrap();

        match next_non_lifecycle(&mut rx).await {
            WorkerEvent::MessageReceived { message, .. } => {
                let transform = message.message.as_transform().unwrap();
                assert_eq!(transform.content.position(), [1.0, 2.0, 3.0]);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(handle.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_passive_idle_timeout() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = server.accept().await.unwrap();

        let config = EndpointConfig::default()
            .with_keep_alive(None)
            .with_idle_timeout(Duration::from_millis(100));
        let socket = Arc::new(SharedSocket::new(accepted, &config).unwrap());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let handle = ListenerWorker::adopt(socket, config, tx).start();

        match timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap() {
            WorkerEvent::ConnectionLost { reason, .. } => assert!(reason.contains("idle")),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(matches!(rx.recv().await.unwrap(), WorkerEvent::ShutdownComplete { .. }));
        assert!(handle.shutdown(Duration::from_secs(1)).await);
    }
}
