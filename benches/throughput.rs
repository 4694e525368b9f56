//! Loopback throughput through a pair of connected endpoints
//!
//! Measures messages per second from `send` on one endpoint to
//! `MessageReceived` on the other, for small and large frames.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use openigtlink_transport::io::{ConnectionEndpoint, ConnectionEvent, EndpointConfig};
use openigtlink_transport::protocol::types::{ImageMessage, ImageScalarType, TransformMessage};
use openigtlink_transport::protocol::{AnyMessage, IgtlMessage};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;

struct Pair {
    server: ConnectionEndpoint,
    server_events: UnboundedReceiver<ConnectionEvent>,
    client: ConnectionEndpoint,
}

async fn connect_pair() -> Pair {
    let (server, server_events) = ConnectionEndpoint::new(EndpointConfig::default()).unwrap();
    let port = server.listen(0).await.unwrap();
    let (client, _client_events) = ConnectionEndpoint::new(EndpointConfig::default()).unwrap();
    client.connect("127.0.0.1", port).await.unwrap();
    while !server.is_able_to_send() {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    Pair {
        server,
        server_events,
        client,
    }
}

async fn round(pair: &mut Pair, message: &AnyMessage, count: usize) {
    for _ in 0..count {
        pair.client.send_any(message).unwrap();
    }
    let mut received = 0;
    while received < count {
        if let Some(ConnectionEvent::MessageReceived(_)) = pair.server_events.recv().await {
            received += 1;
        }
    }
}

fn bench_loopback(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut pair = rt.block_on(connect_pair());

    let transform: AnyMessage = IgtlMessage::new(TransformMessage::identity(), "Bench").unwrap().into();
    let image: AnyMessage = IgtlMessage::new(
        ImageMessage::new(ImageScalarType::Uint8, [256, 256, 1], vec![0u8; 256 * 256]).unwrap(),
        "Bench",
    )
    .unwrap()
    .into();

    let mut group = c.benchmark_group("loopback");
    let batch = 100;
    for (name, message) in [("transform", &transform), ("image_256x256", &image)] {
        let bytes = message.encode().unwrap().len() as u64;
        group.throughput(Throughput::Bytes(bytes * batch as u64));
        group.bench_with_input(BenchmarkId::new("send_receive", name), message, |b, message| {
            b.iter(|| rt.block_on(round(&mut pair, message, batch)))
        });
    }
    group.finish();

    rt.block_on(async {
        pair.client.close().await;
        pair.server.close().await;
    });
}

criterion_group!(benches, bench_loopback);
criterion_main!(benches);
