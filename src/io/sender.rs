//! Sender worker
//!
//! Owns the outbound queue of one connection. In connect role it opens the
//! connection itself (one bounded attempt, no retry); in adopted role it
//! writes to a socket accepted by a listener. The drain loop writes frames
//! in FIFO order and, once the queue has been empty for the keep-alive
//! interval, writes a two-byte probe. Any failed write is peer loss.

use crate::io::config::EndpointConfig;
use crate::io::queue::OutboundQueue;
use crate::io::socket::SharedSocket;
use crate::io::worker::{
    emit, SenderHandle, WorkerControl, WorkerEvent, WorkerEventSender, WorkerHandle, WorkerId,
};
use crate::protocol::header::KEEP_ALIVE_PROBE;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, info_span, trace, warn, Instrument};

enum Target {
    Connect(SocketAddr),
    Adopted(Arc<SharedSocket>),
}

/// Sender worker, configured but not yet started
pub struct SenderWorker {
    id: WorkerId,
    config: EndpointConfig,
    target: Target,
    queue: Arc<OutboundQueue>,
    events: WorkerEventSender,
}

impl SenderWorker {
    /// Sender that opens its own connection to `addr`
    pub fn connect_to(addr: SocketAddr, config: EndpointConfig, events: WorkerEventSender) -> Self {
        Self::with_target(Target::Connect(addr), config, events)
    }

    /// Sender that writes to an already connected socket
    pub fn adopt(socket: Arc<SharedSocket>, config: EndpointConfig, events: WorkerEventSender) -> Self {
        Self::with_target(Target::Adopted(socket), config, events)
    }

    fn with_target(target: Target, config: EndpointConfig, events: WorkerEventSender) -> Self {
        let queue = Arc::new(OutboundQueue::new(config.queue_capacity));
        SenderWorker {
            id: WorkerId::next(),
            config,
            target,
            queue,
            events,
        }
    }

    /// Worker identifier
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Spawn the worker task
    pub fn start(self) -> SenderHandle {
        let id = self.id;
        let control = WorkerControl::new();
        let queue = Arc::clone(&self.queue);
        let span = match &self.target {
            Target::Connect(addr) => info_span!("sender", worker = %id, role = "connect", remote = %addr),
            Target::Adopted(socket) => {
                info_span!("sender", worker = %id, role = "adopted", remote = %socket.peer_addr())
            }
        };

        let task_control = Arc::clone(&control);
        let join = tokio::spawn(self.run(task_control).instrument(span));

        SenderHandle {
            handle: WorkerHandle { id, control, join },
            queue,
        }
    }

    async fn run(self, control: Arc<WorkerControl>) {
        let socket = match &self.target {
            Target::Adopted(socket) => Arc::clone(socket),
            Target::Connect(addr) => match self.open(*addr).await {
                Ok(socket) => socket,
                Err(reason) => {
                    warn!(reason = %reason, "Cannot connect to remote");
                    emit(
                        &self.events,
                        WorkerEvent::CannotConnect {
                            worker: self.id,
                            reason,
                        },
                    );
                    self.finish(&control);
                    return;
                }
            },
        };

        if matches!(self.target, Target::Connect(_)) {
            if !control.is_running() {
                socket.close();
                self.finish(&control);
                return;
            }
            emit(
                &self.events,
                WorkerEvent::Connected {
                    worker: self.id,
                    socket: Arc::clone(&socket),
                },
            );
        }

        control.mark_live();
        debug!("Sender loop started");

        let lost = self.drain(&socket, &control).await;

        socket.close();
        let discarded = self.queue.clear();
        if discarded > 0 {
            info!(discarded = discarded, "Dropped unsent frames");
        }

        if let Some(reason) = lost {
            emit(
                &self.events,
                WorkerEvent::ConnectionLost {
                    worker: self.id,
                    reason,
                },
            );
        }
        self.finish(&control);
    }

    async fn open(&self, addr: SocketAddr) -> Result<Arc<SharedSocket>, String> {
        info!("Connecting to remote");
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => {
                return Err(format!(
                    "connect timed out after {}ms",
                    self.config.connect_timeout.as_millis()
                ))
            }
        };

        let socket = SharedSocket::new(stream, &self.config).map_err(|e| e.to_string())?;
        info!(local = %socket.local_addr(), "Connected to remote");
        Ok(Arc::new(socket))
    }

    /// Returns the loss reason, or `None` for a requested stop
    async fn drain(&self, socket: &SharedSocket, control: &WorkerControl) -> Option<String> {
        let mut last_write = Instant::now();
        let mut in_burst = false;

        while control.is_running() {
            if let Some(mut frame) = self.queue.pop() {
                if let Err(e) = socket.write_all(&frame.bytes).await {
                    warn!(type_tag = frame.type_tag, error = %e, "Write failed, peer lost");
                    return Some(format!("write failed: {}", e));
                }

                let sent_at = frame.mark_sent();
                debug!(
                    type_tag = frame.type_tag,
                    device = %frame.device_name,
                    bytes = frame.len(),
                    "Frame sent"
                );
                emit(
                    &self.events,
                    WorkerEvent::MessageSent {
                        worker: self.id,
                        type_tag: frame.type_tag,
                        bytes: frame.len(),
                        sent_at,
                    },
                );
                in_burst = true;
                last_write = Instant::now();
                continue;
            }

            if in_burst {
                in_burst = false;
                emit(&self.events, WorkerEvent::SendingFinished { worker: self.id });
            }

            let mut wait = self.config.poll_interval;
            if let Some(interval) = self.config.keep_alive_interval {
                let idle = last_write.elapsed();
                if idle >= interval {
                    trace!("Sending keep-alive probe");
                    if let Err(e) = socket.write_all(&KEEP_ALIVE_PROBE).await {
                        warn!(error = %e, "Keep-alive failed, peer lost");
                        return Some(format!("keep-alive failed: {}", e));
                    }
                    last_write = Instant::now();
                    continue;
                }
                wait = wait.min(interval - idle);
            }

            self.queue.wait(wait).await;
        }

        None
    }

    fn finish(&self, control: &WorkerControl) {
        control.mark_inactive();
        debug!("Sender stopped");
        emit(&self.events, WorkerEvent::ShutdownComplete { worker: self.id });
    }
}
