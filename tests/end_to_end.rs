//! Full client/server lifecycle tests over loopback TCP.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framelink::{
    open_policy_factory, AcceptancePolicy, AppError, Client, ClientOptions, ClientState,
    DispatchTable, MessagePacket, Packet, PacketId, PacketIds, PayloadReader, PayloadWriter,
    PolicyContext, PolicyFactory, PolicyOutcome, Server, ServerOptions, ServerState, Session,
    SessionFactory, SessionHooks, StockPackets,
};

async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}

/// Zero-payload application packet.
struct MarkerPacket {
    id: PacketId,
}

impl Packet for MarkerPacket {
    fn id(&self) -> PacketId {
        self.id
    }

    fn read(&mut self, _reader: &mut PayloadReader<'_>) -> framelink::AppResult<()> {
        Ok(())
    }

    fn write(&self, _writer: &mut PayloadWriter<'_>) {}
}

#[derive(Clone, Default)]
struct ServerProbe {
    markers: Arc<AtomicUsize>,
    messages: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<Mutex<Vec<bool>>>,
}

struct ServerHooks {
    stock: Arc<StockPackets>,
    marker_id: PacketId,
    probe: ServerProbe,
}

impl SessionHooks for ServerHooks {
    fn register_packets(&mut self, table: &mut DispatchTable) {
        let marker_id = self.marker_id;
        let markers = self.probe.markers.clone();
        table.register(
            marker_id,
            move || MarkerPacket { id: marker_id },
            move |_client: &Client, _id, _packet: MarkerPacket| {
                markers.fetch_add(1, Ordering::SeqCst);
            },
        );

        let message_id = self.stock.message;
        let messages = self.probe.messages.clone();
        table.register(
            message_id,
            move || MessagePacket::empty(message_id),
            move |_client: &Client, _id, packet: MessagePacket| {
                messages.lock().unwrap().push(packet.message);
            },
        );
    }

    fn on_disconnected(&mut self, _client: &Client, self_initiated: bool) {
        self.probe.disconnects.lock().unwrap().push(self_initiated);
    }
}

struct QuietHooks;

impl SessionHooks for QuietHooks {
    fn register_packets(&mut self, _table: &mut DispatchTable) {}
}

fn server_factory(
    stock: Arc<StockPackets>,
    marker_id: PacketId,
    probe: ServerProbe,
) -> SessionFactory {
    Arc::new(move |session_id| {
        Session::new(
            session_id,
            Box::new(ServerHooks {
                stock: stock.clone(),
                marker_id,
                probe: probe.clone(),
            }),
        )
    })
}

fn quiet_factory() -> SessionFactory {
    Arc::new(|session_id| Session::new(session_id, Box::new(QuietHooks)))
}

fn fast_server_options(port: u16) -> ServerOptions {
    let mut opts = ServerOptions::new("127.0.0.1", port);
    opts.tick_interval = Duration::from_millis(2);
    opts
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_lifecycle_round_trip() {
    let ids = PacketIds::new();
    let stock = Arc::new(StockPackets::register(&ids));
    let marker_id = ids.allocate();
    let probe = ServerProbe::default();

    let server = Server::host(
        fast_server_options(0),
        stock.clone(),
        server_factory(stock.clone(), marker_id, probe.clone()),
        open_policy_factory(),
    );
    let accepted = Arc::new(AtomicUsize::new(0));
    {
        let accepted = accepted.clone();
        server.set_on_accepted(Box::new(move |_client| {
            accepted.fetch_add(1, Ordering::SeqCst);
        }));
    }

    assert!(
        wait_until(Duration::from_secs(5), || {
            server.is_hosting() && server.local_addr().is_some()
        })
        .await,
        "server never started hosting"
    );
    let addr = server.local_addr().unwrap();

    let client = Client::connect(
        ClientOptions::new("127.0.0.1", addr.port()),
        stock.clone(),
        quiet_factory(),
    );

    assert!(
        wait_until(Duration::from_secs(5), || client.has_session()).await,
        "client never received its session"
    );
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(server.client_count(), 1);
    assert!(client.session_id().is_some());

    // a zero-payload application packet dispatches exactly once
    client.send(&MarkerPacket { id: marker_id });
    assert!(
        wait_until(Duration::from_secs(5), || {
            probe.markers.load(Ordering::SeqCst) == 1
        })
        .await,
        "marker packet never dispatched"
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(probe.markers.load(Ordering::SeqCst), 1);

    client.disconnect();
    assert!(
        wait_until(Duration::from_secs(5), || {
            client.state() == ClientState::DisconnectedSelf
        })
        .await
    );
    // the server observes the orderly end and evicts the dead client
    assert!(
        wait_until(Duration::from_secs(5), || server.client_count() == 0).await,
        "server never evicted the disconnected client"
    );
    assert!(
        wait_until(Duration::from_secs(5), || {
            probe.disconnects.lock().unwrap().len() == 1
        })
        .await,
        "server session was never notified"
    );
    assert_eq!(probe.disconnects.lock().unwrap().as_slice(), &[false]);

    server.close();
    assert!(
        wait_until(Duration::from_secs(5), || {
            server.state() == ServerState::HostEnded
        })
        .await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unregistered_packet_is_dropped_and_stream_stays_aligned() {
    let ids = PacketIds::new();
    let stock = Arc::new(StockPackets::register(&ids));
    let marker_id = ids.allocate();
    let unknown_id = ids.allocate();
    let probe = ServerProbe::default();

    let server = Server::host(
        fast_server_options(0),
        stock.clone(),
        server_factory(stock.clone(), marker_id, probe.clone()),
        open_policy_factory(),
    );
    assert!(
        wait_until(Duration::from_secs(5), || {
            server.is_hosting() && server.local_addr().is_some()
        })
        .await
    );
    let addr = server.local_addr().unwrap();

    let client = Client::connect(
        ClientOptions::new("127.0.0.1", addr.port()),
        stock.clone(),
        quiet_factory(),
    );
    assert!(wait_until(Duration::from_secs(5), || client.has_session()).await);

    // an unregistered packet with a real payload, then a registered one:
    // the unknown frame is dropped whole and the marker still dispatches
    client.send(&MessagePacket::new(unknown_id, "nobody is listening"));
    client.send(&MarkerPacket { id: marker_id });

    assert!(
        wait_until(Duration::from_secs(5), || {
            probe.markers.load(Ordering::SeqCst) == 1
        })
        .await,
        "marker packet lost after unregistered frame"
    );
    let server_client = {
        let mut found = None;
        for id in 1..=1024 {
            if let Some(client) = server.client(id) {
                found = Some(client);
                break;
            }
        }
        found
    };
    if let Some(server_client) = server_client {
        assert!(server_client.is_connected());
    }
    server.close();
}

struct DenyPolicy;

impl AcceptancePolicy for DenyPolicy {
    fn enforce<'a>(
        &'a self,
        _ctx: &'a PolicyContext,
    ) -> Pin<Box<dyn Future<Output = PolicyOutcome> + Send + 'a>> {
        Box::pin(async { PolicyOutcome::Failure("denied by test policy".to_string()) })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_client_gets_the_reason_and_disconnects() {
    let ids = PacketIds::new();
    let stock = Arc::new(StockPackets::register(&ids));

    let deny: PolicyFactory = Arc::new(|| Box::new(DenyPolicy));
    let server = Server::host(fast_server_options(0), stock.clone(), quiet_factory(), deny);
    assert!(
        wait_until(Duration::from_secs(5), || {
            server.is_hosting() && server.local_addr().is_some()
        })
        .await
    );
    let addr = server.local_addr().unwrap();

    let client = Client::connect(
        ClientOptions::new("127.0.0.1", addr.port()),
        stock.clone(),
        quiet_factory(),
    );

    assert!(
        wait_until(Duration::from_secs(5), || client.did_disconnect()).await,
        "rejected client never disconnected"
    );
    assert!(!client.has_session());
    assert_eq!(server.client_count(), 0);

    let top = client.top_error().expect("rejection should be recorded");
    match top.error.as_deref() {
        Some(AppError::Rejected(reason)) => assert_eq!(reason, "denied by test policy"),
        other => panic!("expected a rejection error, got {:?}", other),
    }
    server.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_connect_parks_the_client_with_a_top_error() {
    let ids = PacketIds::new();
    let stock = Arc::new(StockPackets::register(&ids));

    // grab a port that nothing listens on
    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    };

    let client = Client::connect(
        ClientOptions::new("127.0.0.1", dead_port),
        stock,
        quiet_factory(),
    );

    assert!(
        wait_until(Duration::from_secs(5), || {
            client.state() == ClientState::FailedToConnect
        })
        .await,
        "client never reached FailedToConnect"
    );
    let top = client.top_error().expect("connect failure should be recorded");
    assert!(matches!(top.error.as_deref(), Some(AppError::Connect(_))));
}
