//! Traffic statistics
//!
//! A pure observer fed by the endpoint's supervisor: every delivered
//! message and every written frame is recorded, and a human-readable
//! summary can be logged periodically.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Per-type receive counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeStats {
    /// Messages received
    pub messages: u64,
    /// Frame bytes received (header + body)
    pub bytes: u64,
    /// Sum of latencies, for the mean
    pub total_latency: Duration,
    /// Largest latency seen
    pub max_latency: Duration,
}

impl TypeStats {
    /// Mean latency
    pub fn mean_latency(&self) -> Duration {
        if self.messages == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total_latency.as_nanos() / u128::from(self.messages)) as u64)
        }
    }
}

/// Point-in-time copy of the statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Receive counters keyed by wire type tag
    pub received: BTreeMap<String, TypeStats>,
    /// Frames written
    pub sent_messages: u64,
    /// Bytes written
    pub sent_bytes: u64,
}

impl StatisticsSnapshot {
    /// Total messages received across all types
    pub fn total_received(&self) -> u64 {
        self.received.values().map(|s| s.messages).sum()
    }

    /// One-line summary
    ///
    /// # Examples
    ///
    /// ```
    /// use openigtlink_transport::io::TrafficStatistics;
    /// use std::time::Duration;
    ///
    /// let stats = TrafficStatistics::new();
    /// stats.record_received("TRANSFORM", 106, Duration::from_millis(2));
    /// assert!(stats.snapshot().summary().contains("TRANSFORM: 1 msgs"));
    /// ```
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "received {} msgs, sent {} msgs ({} bytes)",
            self.total_received(),
            self.sent_messages,
            self.sent_bytes
        )];
        for (tag, s) in &self.received {
            parts.push(format!(
                "{}: {} msgs {} bytes, latency mean {:.2}ms max {:.2}ms",
                tag,
                s.messages,
                s.bytes,
                s.mean_latency().as_secs_f64() * 1000.0,
                s.max_latency.as_secs_f64() * 1000.0
            ));
        }
        parts.join("; ")
    }
}

/// Thread-safe traffic statistics accumulator
#[derive(Debug, Default)]
pub struct TrafficStatistics {
    inner: Mutex<StatisticsSnapshot>,
}

impl TrafficStatistics {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut StatisticsSnapshot) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Record a delivered message
    pub fn record_received(&self, type_tag: &str, bytes: u64, latency: Duration) {
        self.with(|snap| {
            let entry = snap.received.entry(type_tag.to_string()).or_default();
            entry.messages += 1;
            entry.bytes += bytes;
            entry.total_latency += latency;
            entry.max_latency = entry.max_latency.max(latency);
        });
    }

    /// Record a written frame
    pub fn record_sent(&self, bytes: u64) {
        self.with(|snap| {
            snap.sent_messages += 1;
            snap.sent_bytes += bytes;
        });
    }

    /// Copy the current counters
    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.with(|snap| snap.clone())
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.with(|snap| *snap = StatisticsSnapshot::default());
    }
}
