//! Frame-boundary and close-contract tests over in-memory duplex streams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use framelink::{Connection, ConnectionSettings, MessagePacket, PacketId, StreamWriter};

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

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn back_to_back_minimal_frames_dispatch_exactly_twice() {
    let (local, mut remote) = tokio::io::duplex(4096);
    let conn = Connection::open(local, None, ConnectionSettings::default());

    let seen: Arc<Mutex<Vec<PacketId>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    conn.set_packet_receiver(Box::new(move |id, _reader| {
        sink.lock().unwrap().push(id);
    }));

    // two minimal frames (length=2, id=1, empty payload) in one chunk
    let chunk = [0, 0, 0, 2, 0, 1, 0, 0, 0, 2, 0, 1];
    remote.write_all(&chunk).await.unwrap();
    remote.flush().await.unwrap();

    let framer = conn.framer();
    assert!(
        wait_until(Duration::from_secs(2), || framer.reader().available() >= chunk.len()).await
    );
    conn.process();
    assert_eq!(seen.lock().unwrap().as_slice(), &[1, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_frame_waits_for_remaining_payload() {
    let (local, mut remote) = tokio::io::duplex(4096);
    let conn = Connection::open(local, None, ConnectionSettings::default());

    let dispatched = Arc::new(AtomicUsize::new(0));
    let counter = dispatched.clone();
    conn.set_packet_receiver(Box::new(move |_id, reader| {
        assert_eq!(reader.remaining(), 4);
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    // header claims id + 4 payload bytes, but only half the payload arrives
    remote.write_all(&[0, 0, 0, 6, 0, 7, 0xaa, 0xbb]).await.unwrap();
    remote.flush().await.unwrap();

    let framer = conn.framer();
    assert!(wait_until(Duration::from_secs(2), || framer.reader().available() >= 8).await);
    conn.process();
    assert_eq!(dispatched.load(Ordering::SeqCst), 0);

    remote.write_all(&[0xcc, 0xdd]).await.unwrap();
    remote.flush().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || framer.reader().available() >= 10).await);
    conn.process();
    assert_eq!(dispatched.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frame_too_short_for_an_id_closes_abortively() {
    let (local, mut remote) = tokio::io::duplex(4096);
    let conn = Connection::open(local, None, ConnectionSettings::default());
    conn.set_packet_receiver(Box::new(|_id, _reader| {
        panic!("no frame should be dispatched");
    }));

    // length=1 cannot hold a 2-byte packet id
    remote.write_all(&[0, 0, 0, 1, 9]).await.unwrap();
    remote.flush().await.unwrap();

    let framer = conn.framer();
    assert!(wait_until(Duration::from_secs(2), || framer.reader().available() >= 5).await);
    conn.process();

    assert!(conn.is_closed());
    let violations = conn
        .errors()
        .flatten()
        .into_iter()
        .filter(|entry| {
            entry
                .error
                .as_ref()
                .map(|e| e.is_protocol_violation())
                .unwrap_or(false)
        })
        .count();
    assert_eq!(violations, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn written_frame_has_the_documented_layout() {
    let (local, mut remote) = tokio::io::duplex(4096);
    let conn = Connection::open(local, None, ConnectionSettings::default());

    assert!(conn.send(&MessagePacket::new(5, "hi")));

    // length covers id + payload: 2 + (4 + 2) = 8
    let expected = [0, 0, 0, 8, 0, 5, 0, 0, 0, 2, b'h', b'i'];
    let mut wire = [0u8; 12];
    remote.read_exact(&mut wire).await.unwrap();
    assert_eq!(wire, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_never_interleave_frames() {
    let (local, peer) = tokio::io::duplex(1 << 20);
    let sender = Connection::open(local, None, ConnectionSettings::default());
    let receiver = Connection::open(peer, None, ConnectionSettings::default());

    let seen: Arc<Mutex<Vec<(PacketId, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    receiver.set_packet_receiver(Box::new(move |id, reader| {
        let message = reader.read_string().expect("frame should decode cleanly");
        sink.lock().unwrap().push((id, message));
    }));

    const PER_SENDER: usize = 50;
    let first = sender.clone();
    let second = sender.clone();
    let task_a = tokio::spawn(async move {
        for i in 0..PER_SENDER {
            assert!(first.send(&MessagePacket::new(3, format!("alpha-{:04}", i))));
            tokio::time::sleep(Duration::from_micros(100)).await;
        }
    });
    let task_b = tokio::spawn(async move {
        for i in 0..PER_SENDER {
            assert!(second.send(&MessagePacket::new(4, format!("omega-{:04}", i))));
            tokio::time::sleep(Duration::from_micros(100)).await;
        }
    });
    task_a.await.unwrap();
    task_b.await.unwrap();

    let drained = wait_until(Duration::from_secs(5), || {
        receiver.process();
        seen.lock().unwrap().len() == PER_SENDER * 2
    })
    .await;
    assert!(drained, "expected all frames to decode");

    let seen = seen.lock().unwrap();
    let alpha: Vec<&String> = seen.iter().filter(|(id, _)| *id == 3).map(|(_, m)| m).collect();
    let omega: Vec<&String> = seen.iter().filter(|(id, _)| *id == 4).map(|(_, m)| m).collect();
    assert_eq!(alpha.len(), PER_SENDER);
    assert_eq!(omega.len(), PER_SENDER);
    // per-sender order survives even though the streams interleave
    for (i, message) in alpha.iter().enumerate() {
        assert_eq!(**message, format!("alpha-{:04}", i));
    }
    for (i, message) in omega.iter().enumerate() {
        assert_eq!(**message, format!("omega-{:04}", i));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_closes_run_the_close_sequence_once() {
    let (local, _keep_remote) = tokio::io::duplex(4096);
    let conn = Connection::open(local, None, ConnectionSettings::default());

    let wins = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let conn = conn.clone();
        let wins = wins.clone();
        tasks.push(tokio::spawn(async move {
            if conn.close() {
                wins.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert!(conn.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writer_on_closed_fires_exactly_once() {
    let (local, _keep_remote) = tokio::io::duplex(4096);
    let (_read_half, write_half) = tokio::io::split(local);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let writer = StreamWriter::spawn_with(
        write_half,
        Duration::from_millis(2),
        Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let writer = writer.clone();
        tasks.push(tokio::spawn(async move {
            writer.close();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(wait_until(Duration::from_secs(2), || fired.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
