//! Worker plumbing shared by the sender and the listener
//!
//! Each worker is a spawned task with a [`WorkerControl`] block of flags
//! that the owner uses for cooperative cancellation, and an unbounded
//! channel on which it reports [`WorkerEvent`]s back to the owner.

use crate::io::events::ReceivedMessage;
use crate::io::queue::OutboundQueue;
use crate::protocol::header::Timestamp;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Process-unique worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Allocate the next identifier
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        WorkerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Flags shared between a worker task and its owner
#[derive(Debug)]
pub struct WorkerControl {
    running: AtomicBool,
    live: AtomicBool,
    active: AtomicBool,
}

impl WorkerControl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(WorkerControl {
            running: AtomicBool::new(true),
            live: AtomicBool::new(false),
            active: AtomicBool::new(true),
        })
    }

    /// Whether the worker should keep looping
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the worker's run loop has started
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn mark_live(&self) {
        self.live.store(true, Ordering::Release);
    }

    /// Whether the worker task has not yet exited
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn mark_inactive(&self) {
        self.live.store(false, Ordering::Release);
        self.active.store(false, Ordering::Release);
    }

    /// Poll until the run loop is live, the worker exits, or `limit` elapses
    ///
    /// # Returns
    /// `true` if the worker reported live in time
    pub async fn wait_live(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.is_live() {
                return true;
            }
            if !self.is_active() || Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// Owner-side handle to a spawned worker
#[derive(Debug)]
pub struct WorkerHandle {
    pub(crate) id: WorkerId,
    pub(crate) control: Arc<WorkerControl>,
    pub(crate) join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Worker identifier
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Shared control flags
    pub fn control(&self) -> &Arc<WorkerControl> {
        &self.control
    }

    /// Request a cooperative stop without waiting
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Stop the worker and wait up to `grace` for it to exit
    ///
    /// Every blocking call inside a worker is itself bounded, so the flag
    /// check is always reached; the task is never aborted. If the grace
    /// period still expires the task is left to finish on its own.
    ///
    /// # Returns
    /// `true` if the worker exited within `grace`
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.control.stop();
        match tokio::time::timeout(grace, self.join).await {
            Ok(Ok(())) => {
                debug!(worker = %self.id, "Worker stopped");
                true
            }
            Ok(Err(e)) => {
                warn!(worker = %self.id, error = %e, "Worker task failed");
                true
            }
            Err(_) => {
                warn!(
                    worker = %self.id,
                    grace_ms = grace.as_millis() as u64,
                    "Worker did not stop within grace period"
                );
                false
            }
        }
    }
}

/// Sender worker handle: the task plus its outbound queue
#[derive(Debug)]
pub struct SenderHandle {
    pub(crate) handle: WorkerHandle,
    pub(crate) queue: Arc<OutboundQueue>,
}

impl SenderHandle {
    /// The queue drained by this sender
    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    /// Worker identifier
    pub fn id(&self) -> WorkerId {
        self.handle.id
    }
}

/// Reports from a worker to its owning endpoint
#[derive(Debug)]
pub enum WorkerEvent {
    /// Sender opened its outgoing connection
    Connected {
        worker: WorkerId,
        socket: Arc<crate::io::socket::SharedSocket>,
    },
    /// Sender's single connection attempt failed
    CannotConnect { worker: WorkerId, reason: String },
    /// Sender wrote a frame
    MessageSent {
        worker: WorkerId,
        type_tag: &'static str,
        bytes: usize,
        sent_at: Timestamp,
    },
    /// Sender's queue became empty after at least one write
    SendingFinished { worker: WorkerId },
    /// Server-role listener accepted a client
    ClientConnected {
        worker: WorkerId,
        socket: Arc<crate::io::socket::SharedSocket>,
        peer: SocketAddr,
    },
    /// Server-role listener lost its client and resumed accepting
    ClientDisconnected { worker: WorkerId, reason: String },
    /// Listener decoded a frame
    MessageReceived {
        worker: WorkerId,
        message: Box<ReceivedMessage>,
    },
    /// Worker detected peer loss (write failure, EOF, idle timeout)
    ConnectionLost { worker: WorkerId, reason: String },
    /// Worker task is about to exit
    ShutdownComplete { worker: WorkerId },
}

impl WorkerEvent {
    /// Worker that produced this event
    pub fn worker(&self) -> WorkerId {
        match self {
            WorkerEvent::Connected { worker, .. }
            | WorkerEvent::CannotConnect { worker, .. }
            | WorkerEvent::MessageSent { worker, .. }
            | WorkerEvent::SendingFinished { worker }
            | WorkerEvent::ClientConnected { worker, .. }
            | WorkerEvent::ClientDisconnected { worker, .. }
            | WorkerEvent::MessageReceived { worker, .. }
            | WorkerEvent::ConnectionLost { worker, .. }
            | WorkerEvent::ShutdownComplete { worker } => *worker,
        }
    }
}

/// Sending half of the worker event channel
pub type WorkerEventSender = mpsc::UnboundedSender<WorkerEvent>;

/// Receiving half of the worker event channel
pub type WorkerEventReceiver = mpsc::UnboundedReceiver<WorkerEvent>;

/// Emit an event; a closed channel means the owner is gone and is ignored
pub(crate) fn emit(tx: &WorkerEventSender, event: WorkerEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_ids_unique() {
        let a = WorkerId::next();
        let b = WorkerId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("worker-"));
    }

    #[tokio::test]
    async fn test_wait_live() {
        let control = WorkerControl::new();
        let remote = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            remote.mark_live();
        });
        assert!(control.wait_live(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_wait_live_gives_up_when_inactive() {
        let control = WorkerControl::new();
        control.mark_inactive();
        assert!(!control.wait_live(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_shutdown_within_grace() {
        let control = WorkerControl::new();
        let task_control = Arc::clone(&control);
        let join = tokio::spawn(async move {
            while task_control.is_running() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            task_control.mark_inactive();
        });
        let handle = WorkerHandle {
            id: WorkerId::next(),
            control: Arc::clone(&control),
            join,
        };
        assert!(handle.shutdown(Duration::from_secs(1)).await);
        assert!(!control.is_active());
    }
}
