//! Endpoint configuration
//!
//! Every blocking point of the transport is bounded by one of these
//! durations, so no public operation can wait indefinitely.

use crate::error::{IgtlError, Result};
use std::time::Duration;

/// Configuration for a [`ConnectionEndpoint`](crate::io::ConnectionEndpoint)
///
/// # Examples
///
/// ```
/// use openigtlink_transport::io::EndpointConfig;
/// use std::time::Duration;
///
/// let config = EndpointConfig::default()
///     .with_keep_alive(Some(Duration::from_millis(200)))
///     .with_idle_timeout(Duration::from_secs(1));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Bound on the single outgoing connection attempt
    pub connect_timeout: Duration,
    /// Queue idle time after which a keep-alive probe is written (None = never)
    pub keep_alive_interval: Option<Duration>,
    /// Silence after which the listener declares the peer lost
    pub idle_timeout: Duration,
    /// Sleep between polls of an empty queue or an empty socket
    pub poll_interval: Duration,
    /// Bound on each `accept` call, so the server loop can observe stop requests
    pub accept_poll_interval: Duration,
    /// Bound on waiting for socket readiness during a read or write
    pub io_timeout: Duration,
    /// How long `close()` waits for each worker to exit
    pub shutdown_grace: Duration,
    /// How long `listen`/`connect` wait for a spawned worker to report live
    pub startup_timeout: Duration,
    /// Verify body CRC on receive
    pub verify_crc: bool,
    /// Bodies larger than this are skipped instead of buffered
    pub max_body_size: usize,
    /// Set TCP_NODELAY on connected sockets
    pub nodelay: bool,
    /// SO_RCVBUF override
    pub recv_buffer_size: Option<usize>,
    /// SO_SNDBUF override
    pub send_buffer_size: Option<usize>,
    /// Outbound queue bound (None = unbounded)
    pub queue_capacity: Option<usize>,
    /// Interval for logging a traffic summary (None = disabled)
    pub stats_interval: Option<Duration>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            keep_alive_interval: Some(Duration::from_millis(500)),
            idle_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(5),
            accept_poll_interval: Duration::from_millis(100),
            io_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
            startup_timeout: Duration::from_secs(2),
            verify_crc: true,
            max_body_size: 256 * 1024 * 1024,
            nodelay: true,
            recv_buffer_size: None,
            send_buffer_size: None,
            queue_capacity: None,
            stats_interval: None,
        }
    }
}

impl EndpointConfig {
    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set or disable the keep-alive interval
    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Enable or disable CRC verification on receive
    pub fn with_verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Set the maximum accepted body size
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Bound the outbound queue
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set socket buffer sizes (SO_RCVBUF / SO_SNDBUF)
    pub fn with_buffer_sizes(mut self, recv: Option<usize>, send: Option<usize>) -> Self {
        self.recv_buffer_size = recv;
        self.send_buffer_size = send;
        self
    }

    /// Log a traffic summary at this interval
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = Some(interval);
        self
    }

    /// Check the configuration for contradictions
    ///
    /// # Errors
    ///
    /// [`IgtlError::InvalidConfig`] when the keep-alive interval is not
    /// shorter than the idle timeout (the peer would drop a healthy idle
    /// connection), or a poll interval or timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(keep_alive) = self.keep_alive_interval {
            if keep_alive.is_zero() {
                return Err(IgtlError::InvalidConfig(
                    "keep_alive_interval must be non-zero".to_string(),
                ));
            }
            if keep_alive >= self.idle_timeout {
                return Err(IgtlError::InvalidConfig(format!(
                    "keep_alive_interval ({:?}) must be shorter than idle_timeout ({:?})",
                    keep_alive, self.idle_timeout
                )));
            }
        }

        let non_zero = [
            ("connect_timeout", self.connect_timeout),
            ("idle_timeout", self.idle_timeout),
            ("poll_interval", self.poll_interval),
            ("accept_poll_interval", self.accept_poll_interval),
            ("io_timeout", self.io_timeout),
            ("startup_timeout", self.startup_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(IgtlError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }

        if self.queue_capacity == Some(0) {
            return Err(IgtlError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
