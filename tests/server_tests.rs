//! Tests for the dispatcher
//!
//! These tests drive a real dispatcher over a unix socket in a temp
//! directory: one framed request per connection, serialized engine
//! access, error mapping, and shutdown behavior.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blockkv::client::Client;
use blockkv::protocol::{read_response, Response, HEADER_SIZE};
use blockkv::server::Dispatcher;
use blockkv::{Config, StorageEngine, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    _temp: TempDir,
    dispatcher: Arc<Dispatcher>,
    handle: Option<thread::JoinHandle<blockkv::Result<()>>>,
    socket_path: PathBuf,
}

fn start_server() -> TestServer {
    let temp = TempDir::new().unwrap();
    let socket_path = temp.path().join("kv.sock");
    let storage_path = temp.path().join("store.db");

    let config = Config::builder()
        .storage_path(&storage_path)
        .socket_path(&socket_path)
        .accept_poll_ms(10)
        .read_timeout_ms(2000)
        .write_timeout_ms(2000)
        .build();

    let engine = StorageEngine::open(&storage_path).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(config, engine));

    let runner = Arc::clone(&dispatcher);
    let handle = thread::spawn(move || runner.run());

    // Wait until the listener is accepting
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if UnixStream::connect(&socket_path).is_ok() {
            break;
        }
        assert!(Instant::now() < deadline, "server did not come up");
        thread::sleep(Duration::from_millis(10));
    }

    TestServer {
        _temp: temp,
        dispatcher,
        handle: Some(handle),
        socket_path,
    }
}

impl TestServer {
    fn client(&self) -> Client {
        Client::new(&self.socket_path)
    }

    fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.dispatcher
            .shutdown_handle()
            .store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown_and_join();
        }
    }
}

/// Build a raw frame from scratch for malformed-request tests
fn raw_frame(msg_type: u32, payload: &[u8], sequence_id: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&msg_type.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&sequence_id.to_le_bytes());
    frame.extend_from_slice(&0u32.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// A 256-byte NUL-padded key field
fn key_field(key: &str) -> [u8; 256] {
    let mut field = [0u8; 256];
    field[..key.len()].copy_from_slice(key.as_bytes());
    field
}

/// Send raw bytes on a fresh connection and read back one response
fn raw_roundtrip(server: &TestServer, bytes: &[u8]) -> (Response, u32) {
    let mut stream = UnixStream::connect(&server.socket_path).unwrap();
    stream.write_all(bytes).unwrap();
    stream.flush().unwrap();
    read_response(&mut stream).unwrap()
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete_over_socket() {
    let server = start_server();
    let mut client = server.client();

    client.put("greeting", b"hello daemon").unwrap();
    assert_eq!(client.get("greeting").unwrap(), b"hello daemon");

    client.delete("greeting").unwrap();
    assert!(matches!(client.get("greeting"), Err(StoreError::NotFound)));
}

#[test]
fn test_get_missing_key_maps_to_not_found() {
    let server = start_server();
    let mut client = server.client();

    assert!(matches!(client.get("missing"), Err(StoreError::NotFound)));
    assert!(matches!(
        client.delete("missing"),
        Err(StoreError::NotFound)
    ));
}

#[test]
fn test_overwrite_over_socket() {
    let server = start_server();
    let mut client = server.client();

    client.put("key", b"first").unwrap();
    client.put("key", b"second").unwrap();
    assert_eq!(client.get("key").unwrap(), b"second");
}

#[test]
fn test_empty_value_over_socket() {
    let server = start_server();
    let mut client = server.client();

    client.put("empty", b"").unwrap();
    assert_eq!(client.get("empty").unwrap(), b"");
}

#[test]
fn test_multi_block_value_over_socket() {
    let server = start_server();
    let mut client = server.client();

    let value: Vec<u8> = (0..10_000).map(|i| (i % 253) as u8).collect();
    client.put("big", &value).unwrap();
    assert_eq!(client.get("big").unwrap(), value);
}

#[test]
fn test_directory_full_over_socket() {
    let server = start_server();
    let mut client = server.client();

    for i in 0..7 {
        client.put(&format!("key{}", i), b"v").unwrap();
    }

    let result = client.put("key7", b"v");
    assert!(matches!(result, Err(StoreError::DirectoryFull)));
}

#[test]
fn test_many_sequential_connections() {
    let server = start_server();
    let mut client = server.client();

    // Each call is its own connection; the loop exercises the accept
    // cycle repeatedly
    for i in 0..20 {
        let key = format!("k{}", i % 5);
        client.put(&key, format!("v{}", i).as_bytes()).unwrap();
        assert_eq!(client.get(&key).unwrap(), format!("v{}", i).as_bytes());
    }
}

// =============================================================================
// Malformed Request Tests
// =============================================================================

#[test]
fn test_inconsistent_put_rejected_without_mutation() {
    let server = start_server();

    // Declared value_size disagrees with the payload remainder
    let mut payload = Vec::new();
    payload.extend_from_slice(&key_field("sneaky"));
    payload.extend_from_slice(&100u32.to_le_bytes());
    payload.extend_from_slice(b"short");

    let (response, seq) = raw_roundtrip(&server, &raw_frame(1, &payload, 77));

    assert_eq!(seq, 77);
    assert!(matches!(response, Response::Error { .. }));

    // The store was not touched
    let mut client = server.client();
    assert!(matches!(client.get("sneaky"), Err(StoreError::NotFound)));
}

#[test]
fn test_unknown_message_type_gets_error_frame() {
    let server = start_server();

    let (response, seq) = raw_roundtrip(&server, &raw_frame(99, &[], 123));

    assert_eq!(seq, 123);
    match response {
        Response::Error { code, message } => {
            assert!(code < 0);
            assert!(!message.is_empty());
        }
        other => panic!("expected ERROR frame, got {:?}", other),
    }
}

#[test]
fn test_oversized_payload_refused_before_read() {
    let server = start_server();

    // Header alone, declaring a payload far beyond the transport bound
    let mut header = Vec::new();
    header.extend_from_slice(&3u32.to_le_bytes());
    header.extend_from_slice(&(u32::MAX).to_le_bytes());
    header.extend_from_slice(&55u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());

    let mut stream = UnixStream::connect(&server.socket_path).unwrap();
    stream.write_all(&header).unwrap();
    stream.flush().unwrap();

    let (response, seq) = read_response(&mut stream).unwrap();
    assert_eq!(seq, 55);
    assert!(matches!(response, Response::Error { .. }));
}

#[test]
fn test_sequence_id_echoed() {
    let server = start_server();

    let (response, seq) = raw_roundtrip(&server, &raw_frame(3, &key_field("nope"), 0xDEAD_BEEF));

    assert_eq!(seq, 0xDEAD_BEEF);
    assert_eq!(
        response,
        Response::Get {
            result: -1,
            value: None
        }
    );
}

#[test]
fn test_client_disconnect_without_request() {
    let server = start_server();

    // Connect and immediately hang up; the dispatcher must keep serving
    drop(UnixStream::connect(&server.socket_path).unwrap());

    let mut client = server.client();
    client.put("after", b"disconnect").unwrap();
    assert_eq!(client.get("after").unwrap(), b"disconnect");
}

#[test]
fn test_half_frame_then_disconnect() {
    let server = start_server();

    // Send a header promising 256 payload bytes, then vanish; the read
    // timeout or EOF ends that connection, not the dispatcher
    let mut stream = UnixStream::connect(&server.socket_path).unwrap();
    let frame = raw_frame(3, &key_field("k"), 1);
    stream.write_all(&frame[..HEADER_SIZE + 10]).unwrap();
    drop(stream);

    let mut client = server.client();
    client.put("alive", b"yes").unwrap();
    assert_eq!(client.get("alive").unwrap(), b"yes");
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_shutdown_removes_socket_file() {
    let server = start_server();
    let socket_path = server.socket_path.clone();
    assert!(socket_path.exists());

    server.stop();
    assert!(!socket_path.exists());
}

#[test]
fn test_data_survives_daemon_restart() {
    let temp = TempDir::new().unwrap();
    let socket_path = temp.path().join("kv.sock");
    let storage_path = temp.path().join("store.db");

    let config = Config::builder()
        .storage_path(&storage_path)
        .socket_path(&socket_path)
        .accept_poll_ms(10)
        .build();

    // First daemon instance writes a key
    {
        let engine = StorageEngine::open(&storage_path).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(config.clone(), engine));
        let runner = Arc::clone(&dispatcher);
        let handle = thread::spawn(move || runner.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while UnixStream::connect(&socket_path).is_err() {
            assert!(Instant::now() < deadline, "server did not come up");
            thread::sleep(Duration::from_millis(10));
        }

        let mut client = Client::new(&socket_path);
        client.put("durable", b"across restarts").unwrap();

        dispatcher.shutdown_handle().store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    // Second instance reopens the same file and still serves the key
    {
        let engine = StorageEngine::open(&storage_path).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(config, engine));
        let runner = Arc::clone(&dispatcher);
        let handle = thread::spawn(move || runner.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while UnixStream::connect(&socket_path).is_err() {
            assert!(Instant::now() < deadline, "server did not come up");
            thread::sleep(Duration::from_millis(10));
        }

        let mut client = Client::new(&socket_path);
        assert_eq!(client.get("durable").unwrap(), b"across restarts");

        dispatcher.shutdown_handle().store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }
}

#[test]
fn test_concurrent_clients_serialized() {
    let server = start_server();

    // Several threads hammer the daemon at once; the engine mutex keeps
    // every operation atomic, so each key always reads back one of its
    // own writes
    let mut handles = Vec::new();
    for t in 0..4 {
        let socket_path = server.socket_path.clone();
        handles.push(thread::spawn(move || {
            let mut client = Client::new(&socket_path);
            let key = format!("thread{}", t);
            for i in 0..10 {
                let value = format!("t{}v{}", t, i);
                client.put(&key, value.as_bytes()).unwrap();
                let got = client.get(&key).unwrap();
                assert_eq!(got, value.as_bytes());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}
