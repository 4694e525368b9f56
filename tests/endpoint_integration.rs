//! End-to-end tests for ConnectionEndpoint over loopback TCP
//!
//! Every test binds port 0 so tests can run in parallel.

mod common;

use common::{connected_pair, drain_for, expect, fast_config, init_tracing, wait_until};
use openigtlink_transport::io::{ConnectionEndpoint, ConnectionEvent, ConnectionState, EndpointConfig};
use openigtlink_transport::protocol::header::{Header, KEEP_ALIVE_PROBE};
use openigtlink_transport::protocol::types::{
    RtsTransformMessage, StartTransformMessage, StatusMessage, StringMessage, TransformMessage,
};
use openigtlink_transport::protocol::{AnyMessage, IgtlMessage};
use openigtlink_transport::IgtlError;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

fn received(event: &ConnectionEvent) -> bool {
    matches!(event, ConnectionEvent::MessageReceived(_))
}

fn count<F: Fn(&ConnectionEvent) -> bool>(events: &[ConnectionEvent], pred: F) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[tokio::test]
async fn test_handshake_reaches_able_to_send() {
    let (server, _server_events, client, _client_events) = connected_pair(fast_config()).await;

    assert_eq!(client.state(), ConnectionState::AbleToSend);
    assert!(client.is_able_to_send());
    assert!(client.flags().connected_to_remote);

    assert!(wait_until(|| server.is_able_to_send(), Duration::from_secs(1)).await);
    assert_eq!(server.state(), ConnectionState::AbleToSend);
    let flags = server.flags();
    assert!(flags.listening && flags.client_connected);

    assert_eq!(server.peer_addr().map(|a| a.port()), client.local_port());

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
    let (server, mut server_events, client, mut client_events) = connected_pair(fast_config()).await;

    for i in 0..50 {
        let msg = IgtlMessage::new(StringMessage::new(format!("msg-{}", i)), "Client").unwrap();
        assert!(client.send(&msg).unwrap());
    }

    for i in 0..50 {
        match expect(&mut server_events, received).await {
            ConnectionEvent::MessageReceived(r) => {
                assert_eq!(r.type_tag(), "STRING");
                assert_eq!(r.message.as_string().unwrap().content.as_str(), format!("msg-{}", i));
                assert_eq!(r.message.device_name(), "Client");
            }
            _ => unreachable!(),
        }
    }

    let mut sent = 0;
    while sent < 50 {
        if let ConnectionEvent::MessageSent { type_tag, .. } = expect(&mut client_events, |e| {
            matches!(e, ConnectionEvent::MessageSent { .. })
        })
        .await
        {
            assert_eq!(type_tag, "STRING");
            sent += 1;
        }
    }
    expect(&mut client_events, |e| matches!(e, ConnectionEvent::SendingFinished)).await;

    assert_eq!(server.statistics().received["STRING"].messages, 50);
    assert_eq!(client.statistics().sent_messages, 50);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_start_stream_then_transform_burst() {
    let (server, mut server_events, client, mut client_events) = connected_pair(fast_config()).await;

    let request = IgtlMessage::new(StartTransformMessage::new(100, "RAS"), "Navigation").unwrap();
    assert!(client.send(&request).unwrap());

    let resolution = match expect(&mut server_events, received).await {
        ConnectionEvent::MessageReceived(r) => {
            assert_eq!(r.type_tag(), "STT_TRANS");
            r.resolution()
        }
        _ => unreachable!(),
    };
    assert_eq!(resolution, Some(100));

    assert!(wait_until(|| server.is_able_to_send(), Duration::from_secs(1)).await);
    let ack = IgtlMessage::new(RtsTransformMessage::ok(), "Tracker").unwrap();
    assert!(server.send(&ack).unwrap());
    for i in 0..25 {
        let pose = TransformMessage::translation(i as f32, 0.0, 0.0);
        assert!(server.send(&IgtlMessage::new(pose, "Tool").unwrap()).unwrap());
    }

    match expect(&mut client_events, received).await {
        ConnectionEvent::MessageReceived(r) => assert_eq!(r.type_tag(), "RTS_TRANS"),
        _ => unreachable!(),
    }
    for i in 0..25 {
        match expect(&mut client_events, received).await {
            ConnectionEvent::MessageReceived(r) => {
                let transform = r.message.as_transform().unwrap();
                assert_eq!(transform.content.position()[0], i as f32);
                assert!(r.received >= r.arrived);
            }
            _ => unreachable!(),
        }
    }

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_listener_requests_stream_from_connector() {
    init_tracing();
    let config = fast_config();
    let (listener, mut listener_events) = ConnectionEndpoint::new(config.clone()).unwrap();
    let port = listener.listen(0).await.unwrap();

    let (connector, mut connector_events) = ConnectionEndpoint::new(config.clone()).unwrap();
    let started = Instant::now();
    connector.connect("localhost", port).await.unwrap();
    assert!(connector.is_able_to_send());
    assert!(wait_until(|| listener.is_able_to_send(), config.connect_timeout).await);
    assert!(started.elapsed() <= config.connect_timeout);
    assert_eq!(connector.peer_addr().map(|a| a.ip().is_loopback()), Some(true));

    let request = IgtlMessage::new(StartTransformMessage::new(100, "RAS"), "Tracker").unwrap();
    assert!(listener.send(&request).unwrap());
    match expect(&mut connector_events, received).await {
        ConnectionEvent::MessageReceived(r) => {
            assert_eq!(r.type_tag(), "STT_TRANS");
            assert_eq!(r.resolution(), Some(100));
        }
        _ => unreachable!(),
    }

    let pose = TransformMessage::from_matrix([
        [0.0, -1.0, 0.0, 12.5],
        [1.0, 0.0, 0.0, -3.25],
        [0.0, 0.0, 1.0, 40.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    for _ in 0..25 {
        let msg = IgtlMessage::new(pose.clone(), "Navigation").unwrap();
        assert!(connector.send(&msg).unwrap());
    }

    let mut seen = Vec::new();
    while seen.len() < 25 {
        match expect(&mut listener_events, received).await {
            ConnectionEvent::MessageReceived(r) => seen.push(r),
            _ => unreachable!(),
        }
    }
    for r in &seen {
        match &r.message {
            AnyMessage::Transform(msg) => assert_eq!(msg.content, pose),
            other => panic!("unexpected message: {}", other.describe()),
        }
    }
    assert!(seen.windows(2).all(|w| w[0].arrived <= w[1].arrived));

    let rest = drain_for(&mut listener_events, Duration::from_millis(200)).await;
    assert_eq!(count(&rest, received), 0);

    connector.close().await;
    listener.close().await;
}

#[tokio::test]
async fn test_keep_alive_holds_idle_connection() {
    let (server, mut server_events, client, mut client_events) = connected_pair(fast_config()).await;

    // Three idle timeouts without application traffic
    let quiet = Duration::from_millis(900);
    let server_seen = drain_for(&mut server_events, quiet).await;
    let client_seen = drain_for(&mut client_events, Duration::ZERO).await;

    assert_eq!(count(&server_seen, ConnectionEvent::is_disconnect), 0);
    assert_eq!(count(&client_seen, ConnectionEvent::is_disconnect), 0);
    assert_eq!(count(&server_seen, received), 0);
    assert!(client.is_able_to_send());
    assert!(server.is_able_to_send());

    let msg = IgtlMessage::new(StatusMessage::ok("still here"), "Client").unwrap();
    assert!(client.send(&msg).unwrap());
    expect(&mut server_events, received).await;

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_idle_timeout_reports_one_disconnect() {
    init_tracing();
    let (server, mut server_events) = ConnectionEndpoint::new(fast_config()).unwrap();
    let port = server.listen(0).await.unwrap();

    // Client never probes, so the server's listener goes idle
    let client_config = fast_config().with_keep_alive(None);
    let (client, mut client_events) = ConnectionEndpoint::new(client_config).unwrap();
    let started = Instant::now();
    client.connect("127.0.0.1", port).await.unwrap();

    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientConnected { .. })).await;
    expect(&mut server_events, ConnectionEvent::is_disconnect).await;
    let elapsed = started.elapsed();
    let idle_timeout = fast_config().idle_timeout;
    assert!(elapsed >= idle_timeout, "disconnected after {:?}", elapsed);
    assert!(
        elapsed <= idle_timeout + Duration::from_millis(500),
        "disconnected after {:?}",
        elapsed
    );
    expect(&mut client_events, ConnectionEvent::is_disconnect).await;

    let server_rest = drain_for(&mut server_events, Duration::from_millis(500)).await;
    let client_rest = drain_for(&mut client_events, Duration::ZERO).await;
    assert_eq!(count(&server_rest, ConnectionEvent::is_disconnect), 0);
    assert_eq!(count(&client_rest, ConnectionEvent::is_disconnect), 0);

    assert_eq!(server.state(), ConnectionState::WaitingForClient);
    assert!(!server.is_able_to_send());
    assert_eq!(client.state(), ConnectionState::NotInitialized);

    let msg = IgtlMessage::new(StatusMessage::ok("late"), "Client").unwrap();
    assert!(!client.send(&msg).unwrap());

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_unknown_tag_is_skipped() {
    init_tracing();
    let config = fast_config().with_idle_timeout(Duration::from_secs(2));
    let (server, mut server_events) = ConnectionEndpoint::new(config).unwrap();
    let port = server.listen(0).await.unwrap();

    let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientConnected { .. })).await;

    let mut unknown = Header::new("NDARRAY", "Raw").unwrap();
    unknown.body_size = 64;
    let mut stream = KEEP_ALIVE_PROBE.to_vec();
    stream.extend(unknown.encode());
    stream.extend(vec![0x5A; 64]);
    stream.extend(
        IgtlMessage::new(StatusMessage::ok("after unknown"), "Raw")
            .unwrap()
            .encode()
            .unwrap(),
    );
    raw.write_all(&stream).await.unwrap();

    let seen = drain_for(&mut server_events, Duration::from_millis(200)).await;
    assert_eq!(count(&seen, received), 1);
    assert_eq!(count(&seen, ConnectionEvent::is_disconnect), 0);
    match seen.iter().find(|e| received(e)) {
        Some(ConnectionEvent::MessageReceived(r)) => {
            assert_eq!(r.message.as_status().unwrap().content.status_string, "after unknown");
            assert_eq!(r.sender_port, raw.local_addr().unwrap().port());
        }
        _ => unreachable!(),
    }

    server.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (server, mut server_events, client, _client_events) = connected_pair(fast_config()).await;

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Terminated);
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Terminated);
    assert!(!client.is_able_to_send());

    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientDisconnected { .. })).await;

    server.close().await;
    server.close().await;
    assert_eq!(server.state(), ConnectionState::Terminated);
}

#[tokio::test]
async fn test_listener_accepts_next_client() {
    let (server, mut server_events, first, _first_events) = connected_pair(fast_config()).await;
    let port = server.local_port().unwrap();

    first.close().await;
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientDisconnected { .. })).await;
    assert!(wait_until(
        || server.state() == ConnectionState::WaitingForClient,
        Duration::from_secs(1)
    )
    .await);

    let (second, _second_events) = ConnectionEndpoint::new(fast_config()).unwrap();
    second.connect("127.0.0.1", port).await.unwrap();
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientConnected { .. })).await;

    let msg = IgtlMessage::new(StatusMessage::ok("second"), "Second").unwrap();
    assert!(second.send(&msg).unwrap());
    match expect(&mut server_events, received).await {
        ConnectionEvent::MessageReceived(r) => assert_eq!(r.message.device_name(), "Second"),
        _ => unreachable!(),
    }

    second.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_client_loss_while_sending_then_next_client() {
    init_tracing();
    let config = fast_config();
    let (server, mut server_events) = ConnectionEndpoint::new(config.clone()).unwrap();
    let port = server.listen(0).await.unwrap();

    let raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientConnected { .. })).await;
    assert!(wait_until(|| server.is_able_to_send(), Duration::from_secs(1)).await);
    drop(raw);

    // Keep writing until the loss is noticed
    let pose = IgtlMessage::new(TransformMessage::identity(), "Tracker").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.is_able_to_send() && Instant::now() < deadline {
        server.send(&pose).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientDisconnected { .. })).await;
    assert!(wait_until(
        || server.state() == ConnectionState::WaitingForClient,
        Duration::from_secs(1)
    )
    .await);

    let (next, mut next_events) = ConnectionEndpoint::new(config).unwrap();
    next.connect("127.0.0.1", port).await.unwrap();
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientConnected { .. })).await;
    assert!(wait_until(|| server.is_able_to_send(), Duration::from_secs(1)).await);

    assert!(server.send(&pose).unwrap());
    expect(&mut next_events, received).await;

    let rest = drain_for(&mut server_events, Duration::from_millis(400)).await;
    assert_eq!(count(&rest, ConnectionEvent::is_disconnect), 0);
    assert!(server.is_able_to_send());

    next.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_server_close_is_lost_connection() {
    let (server, _server_events, client, mut client_events) = connected_pair(fast_config()).await;

    server.close().await;

    match expect(&mut client_events, ConnectionEvent::is_disconnect).await {
        ConnectionEvent::LostConnectionToRemote { .. } => {}
        other => panic!("unexpected event: {:?}", other),
    }
    let rest = drain_for(&mut client_events, Duration::from_millis(300)).await;
    assert_eq!(count(&rest, ConnectionEvent::is_disconnect), 0);
    assert_eq!(client.state(), ConnectionState::NotInitialized);
    assert!(client.last_error().is_some());

    client.close().await;
}

#[tokio::test]
async fn test_reconnect_after_close() {
    let (server, mut server_events, client, mut client_events) = connected_pair(fast_config()).await;
    let port = server.local_port().unwrap();

    client.close().await;
    expect(&mut server_events, |e| matches!(e, ConnectionEvent::ClientDisconnected { .. })).await;

    client.connect("127.0.0.1", port).await.unwrap();
    expect(&mut client_events, |e| matches!(e, ConnectionEvent::ConnectedToRemote { .. })).await;
    assert_eq!(client.state(), ConnectionState::AbleToSend);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_connect_failure_reported_once() {
    init_tracing();
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = unused.local_addr().unwrap().port();
    drop(unused);

    let (client, mut events) = ConnectionEndpoint::new(fast_config()).unwrap();
    let result = client.connect("127.0.0.1", port).await;
    assert!(matches!(result, Err(IgtlError::Connect { .. })));

    let seen = drain_for(&mut events, Duration::from_millis(200)).await;
    assert_eq!(
        count(&seen, |e| matches!(e, ConnectionEvent::CannotConnectToRemote { .. })),
        1
    );
    assert_eq!(seen.len(), 1);
    assert_eq!(client.state(), ConnectionState::NotInitialized);
    assert!(!client.is_able_to_send());

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Terminated);
}

#[tokio::test]
async fn test_bind_on_used_port_fails() {
    init_tracing();
    let (first, _first_events) = ConnectionEndpoint::new(EndpointConfig::default()).unwrap();
    let port = first.listen(0).await.unwrap();

    let (second, _second_events) = ConnectionEndpoint::new(EndpointConfig::default()).unwrap();
    let result = second.listen(port).await;
    assert!(matches!(result, Err(IgtlError::Bind { port: p, .. }) if p == port));
    assert_eq!(second.state(), ConnectionState::NotInitialized);
    assert!(!second.flags().listening);

    first.close().await;
}

#[tokio::test]
async fn test_unresolvable_host() {
    init_tracing();
    let (client, mut events) = ConnectionEndpoint::new(fast_config()).unwrap();
    let result = client.connect("no-such-host.invalid", 18944).await;
    assert!(matches!(result, Err(IgtlError::Resolution(_))));
    expect(&mut events, |e| matches!(e, ConnectionEvent::CannotConnectToRemote { .. })).await;
}

#[tokio::test]
async fn test_state_watch_sees_progression() {
    init_tracing();
    let (server, _server_events) = ConnectionEndpoint::new(fast_config()).unwrap();
    let port = server.listen(0).await.unwrap();

    let (client, _client_events) = ConnectionEndpoint::new(fast_config()).unwrap();
    let mut states = client.watch_state();
    client.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::AbleToSend);

    client.close().await;
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Terminated);

    server.close().await;
}
