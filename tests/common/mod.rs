//! Shared helpers for endpoint integration tests

#![allow(dead_code)]

use openigtlink_transport::io::{ConnectionEndpoint, ConnectionEvent, EndpointConfig};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Instant};

pub type Events = UnboundedReceiver<ConnectionEvent>;

/// Install a test-writer subscriber honouring RUST_LOG (once per binary)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Short timeouts so liveness tests finish quickly
pub fn fast_config() -> EndpointConfig {
    EndpointConfig::default()
        .with_connect_timeout(Duration::from_secs(2))
        .with_keep_alive(Some(Duration::from_millis(50)))
        .with_idle_timeout(Duration::from_millis(300))
        .with_shutdown_grace(Duration::from_secs(1))
}

/// Listening endpoint and a connected endpoint, both able to send
pub async fn connected_pair(
    config: EndpointConfig,
) -> (ConnectionEndpoint, Events, ConnectionEndpoint, Events) {
    init_tracing();

    let (server, mut server_events) = ConnectionEndpoint::new(config.clone()).unwrap();
    let port = server.listen(0).await.unwrap();

    let (client, mut client_events) = ConnectionEndpoint::new(config).unwrap();
    client.connect("127.0.0.1", port).await.unwrap();

    expect(&mut client_events, |e| matches!(e, ConnectionEvent::ConnectedToRemote { .. })).await;
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientConnected { .. })).await;

    (server, server_events, client, client_events)
}

/// Wait for the next event matching `pred`, skipping others
pub async fn expect<F>(events: &mut Events, pred: F) -> ConnectionEvent
where
    F: Fn(&ConnectionEvent) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, events.recv()).await {
            Ok(Some(event)) if pred(&event) => return event,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("event channel closed"),
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

/// Collect every event that arrives within `window`
pub async fn drain_for(events: &mut Events, window: Duration) -> Vec<ConnectionEvent> {
    let deadline = Instant::now() + window;
    let mut collected = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, events.recv()).await {
            Ok(Some(event)) => collected.push(event),
            Ok(None) | Err(_) => return collected,
        }
    }
}

/// Wait until `cond` holds, polling every millisecond
pub async fn wait_until<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    cond()
}
