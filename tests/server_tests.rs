//! Server Tests
//!
//! End-to-end tests over real loopback connections. These tests verify:
//! - Per-command semantics through a ClientSession
//! - Concurrent sessions against one shared store
//! - Malformed input only costs the offending connection
//! - Listener lifecycle and both shutdown policies

use std::collections::HashSet;
use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel;
use rolodex::protocol::{read_response, CommandType, Response};
use rolodex::{
    ClientSession, Config, MemoryStore, Record, RolodexError, Server, ServerHandle, ServerState,
    SharedStore, ShutdownPolicy, Store,
};

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    store: SharedStore<MemoryStore>,
    thread: Option<JoinHandle<rolodex::Result<()>>>,
}

impl TestServer {
    fn start(policy: ShutdownPolicy) -> Self {
        let config = Config::builder()
            .listen_addr("127.0.0.1:0")
            .accept_poll_ms(10)
            .read_timeout_ms(50)
            .write_timeout_ms(2000)
            .shutdown_policy(policy)
            .build();

        let server = Server::bind(config, SharedStore::new(MemoryStore::new())).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let store = server.store();
        let thread = thread::spawn(move || server.run());

        Self {
            addr,
            handle,
            store,
            thread: Some(thread),
        }
    }

    fn session(&self) -> ClientSession {
        let session = ClientSession::connect_with_timeout(self.addr, Some(Duration::from_secs(5)));
        assert!(session.is_connected(), "{:?}", session.failure());
        session
    }

    fn stop(&mut self) {
        self.handle.shutdown();
        assert!(self.handle.wait_stopped(Duration::from_secs(5)));
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn person(name: &str) -> Record {
    Record::new(name)
        .with_street(format!("{} Example Rd", name.len()))
        .with_suburb("Kelvin Grove")
        .with_phone("07 3000 0000")
        .with_email(format!("{}@example.com", name.to_lowercase()))
}

// =============================================================================
// End-to-End Scenarios
// =============================================================================

#[test]
fn test_add_then_get_returns_same_record() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();
    let alice = person("Alice");

    session.add(&alice).unwrap();

    assert_eq!(session.get("Alice").unwrap(), Some(alice));
}

#[test]
fn test_get_on_empty_store_is_absent() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();

    assert_eq!(session.get("Nobody").unwrap(), None);
    assert_eq!(session.count().unwrap(), 0);
    assert!(session.names().unwrap().is_empty());
}

#[test]
fn test_two_clients_add_fifty_each() {
    let server = TestServer::start(ShutdownPolicy::Detach);

    let workers: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|prefix| {
            let mut session = server.session();
            thread::spawn(move || {
                for i in 0..50 {
                    session.add(&person(&format!("{}-{}", prefix, i))).unwrap();
                }
                // A read round trip guarantees the server has applied every ADD
                session.count().unwrap()
            })
        })
        .collect();

    for worker in workers {
        assert!(worker.join().unwrap() >= 50);
    }

    let mut session = server.session();
    assert_eq!(session.count().unwrap(), 100);
    let names = session.names().unwrap();
    assert_eq!(names.len(), 100);
    assert!(names.contains("left-0"));
    assert!(names.contains("right-49"));
}

#[test]
fn test_malformed_payload_only_closes_that_connection() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut good = server.session();
    good.add(&person("Alice")).unwrap();

    // ADD with a record body that is not a record
    let mut raw = TcpStream::connect(server.addr).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&[0x01, 0, 0, 0, 3, 1, 2, 3]).unwrap();

    let mut buf = [0u8; 16];
    match raw.read(&mut buf) {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("server answered a malformed request with {} bytes", n),
    }

    // Existing and fresh connections are unaffected
    let mut fresh = server.session();
    fresh.add(&person("Bob")).unwrap();
    assert_eq!(fresh.get("Bob").unwrap(), Some(person("Bob")));
    assert_eq!(good.get("Alice").unwrap(), Some(person("Alice")));
    assert_eq!(good.count().unwrap(), 2);
}

#[test]
fn test_unknown_tag_closes_connection() {
    let server = TestServer::start(ShutdownPolicy::Detach);

    let mut raw = TcpStream::connect(server.addr).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&[0x7F]).unwrap();

    let mut buf = [0u8; 1];
    assert!(matches!(raw.read(&mut buf), Ok(0) | Err(_)));

    let mut session = server.session();
    assert_eq!(session.count().unwrap(), 0);
}

#[test]
fn test_raw_wire_exchange() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    server.store.lock().add_or_replace(Record::new("Zed"));

    let mut raw = TcpStream::connect(server.addr).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    // COUNT → u64 big-endian
    raw.write_all(&[0x04]).unwrap();
    let mut count = [0u8; 8];
    raw.read_exact(&mut count).unwrap();
    assert_eq!(u64::from_be_bytes(count), 1);

    // GET of an absent name → single absent marker
    raw.write_all(&[0x02, 0, 0, 0, 3, b'B', b'o', b'b']).unwrap();
    let mut marker = [0u8; 1];
    raw.read_exact(&mut marker).unwrap();
    assert_eq!(marker[0], 0x00);
}

// =============================================================================
// Command Semantics
// =============================================================================

#[test]
fn test_delete_then_get_is_absent() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();

    session.add(&person("Alice")).unwrap();
    session.delete("Alice").unwrap();

    assert_eq!(session.get("Alice").unwrap(), None);
    assert_eq!(session.count().unwrap(), 0);
}

#[test]
fn test_delete_unknown_name_is_noop() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();
    session.add(&person("Alice")).unwrap();

    session.delete("Nobody").unwrap();

    assert_eq!(session.count().unwrap(), 1);
    assert!(session.is_connected());
}

#[test]
fn test_overwrite_semantics() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();

    session.add(&person("Alice")).unwrap();
    assert_eq!(session.count().unwrap(), 1);

    let moved = person("Alice").with_suburb("Fortitude Valley");
    session.add(&moved).unwrap();
    assert_eq!(session.count().unwrap(), 1);
    assert_eq!(session.get("Alice").unwrap(), Some(moved));

    session.add(&person("Bob")).unwrap();
    assert_eq!(session.count().unwrap(), 2);
}

#[test]
fn test_names_track_adds_and_deletes() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();

    for name in ["Alice", "Bob", "Carol", "Dave"] {
        session.add(&person(name)).unwrap();
    }
    session.delete("Carol").unwrap();
    session.add(&person("Alice")).unwrap();
    session.delete("Nobody").unwrap();

    let names = session.names().unwrap();
    let expected: HashSet<String> = ["Alice", "Bob", "Dave"].iter().map(|s| s.to_string()).collect();
    assert_eq!(names, expected);
    for name in &names {
        assert!(session.get(name).unwrap().is_some());
    }
    assert_eq!(session.get("Carol").unwrap(), None);
    assert_eq!(session.count().unwrap(), names.len() as u64);
}

#[test]
fn test_idle_connection_survives_read_timeouts() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();
    session.add(&person("Alice")).unwrap();

    // Several server-side read timeouts pass with nothing sent
    thread::sleep(Duration::from_millis(300));

    assert_eq!(session.get("Alice").unwrap(), Some(person("Alice")));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_sessions_lose_no_updates() {
    let server = TestServer::start(ShutdownPolicy::Detach);

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let mut session = server.session();
            thread::spawn(move || {
                for i in 0..25 {
                    session.add(&person(&format!("client{}-{}", t, i))).unwrap();
                }
                session.count().unwrap();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let mut session = server.session();
    assert_eq!(session.count().unwrap(), 200);
    assert_eq!(session.names().unwrap().len(), 200);
    assert_eq!(server.store.lock().count(), 200);
}

#[test]
fn test_readers_never_see_partial_records() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    let first = person("Shared").with_phone("1111");
    let second = person("Shared").with_suburb("Elsewhere").with_phone("2222");

    let mut writer = server.session();
    writer.add(&first).unwrap();

    let writer_thread = {
        let (first, second) = (first.clone(), second.clone());
        thread::spawn(move || {
            for i in 0..200 {
                writer.add(if i % 2 == 0 { &second } else { &first }).unwrap();
            }
            writer.count().unwrap();
        })
    };

    let mut reader = server.session();
    for _ in 0..200 {
        let seen = reader.get("Shared").unwrap().unwrap();
        assert!(seen == first || seen == second, "unexpected record {:?}", seen);
    }

    writer_thread.join().unwrap();
}

#[test]
fn test_reader_holds_store_until_reply_is_sent() {
    let server = TestServer::start(ShutdownPolicy::Detach);
    {
        // Large enough that the reply cannot fit in the socket buffers
        let mut store = server.store.lock();
        for i in 0..3000 {
            store.add_or_replace(Record::new(format!("{:04}{}", i, "n".repeat(8192))));
        }
    }

    // Ask for every name, then stop reading
    let mut raw = TcpStream::connect(server.addr).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&[CommandType::ListNames as u8]).unwrap();
    thread::sleep(Duration::from_millis(300));

    let (tx, rx) = channel::unbounded();
    let mut counter = server.session();
    thread::spawn(move || {
        let _ = tx.send(counter.count());
    });

    // The name-set reply is stuck in flight, so the store is still held
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());

    match read_response(&mut BufReader::new(raw), CommandType::ListNames).unwrap() {
        Response::Names(names) => assert_eq!(names.len(), 3000),
        other => panic!("Expected name set, got {:?}", other),
    }

    let count = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(count, 3000);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_shutdown_reaches_stopped() {
    let mut server = TestServer::start(ShutdownPolicy::Detach);
    assert_eq!(server.handle.state(), ServerState::Running);

    server.stop();

    assert_eq!(server.handle.state(), ServerState::Stopped);
    assert!(!ClientSession::connect(server.addr).is_connected());
}

#[test]
fn test_shutdown_is_idempotent() {
    let mut server = TestServer::start(ShutdownPolicy::Detach);
    server.handle.shutdown();
    server.handle.shutdown();
    server.stop();
    server.handle.shutdown();
    assert_eq!(server.handle.state(), ServerState::Stopped);
}

#[test]
fn test_detach_leaves_live_connections_running() {
    let mut server = TestServer::start(ShutdownPolicy::Detach);
    let mut session = server.session();
    session.add(&person("Alice")).unwrap();

    server.stop();

    // The worker outlives the listener and keeps serving its client
    assert_eq!(session.get("Alice").unwrap(), Some(person("Alice")));
    session.add(&person("Bob")).unwrap();
    assert_eq!(session.count().unwrap(), 2);
}

#[test]
fn test_drain_closes_idle_connections() {
    let mut server = TestServer::start(ShutdownPolicy::Drain);
    let mut session = server.session();
    session.add(&person("Alice")).unwrap();
    assert_eq!(session.count().unwrap(), 1);

    server.stop();

    assert_eq!(server.handle.active_connections(), 0);
    assert!(session.count().is_err());
    assert!(!session.is_connected());
}

#[test]
fn test_active_connection_count() {
    let server = TestServer::start(ShutdownPolicy::Detach);

    let mut sessions: Vec<_> = (0..3).map(|_| server.session()).collect();
    for session in &mut sessions {
        session.count().unwrap();
    }
    assert!(wait_for(Duration::from_secs(5), || server.handle.active_connections() == 3));

    sessions[0].close();
    assert!(wait_for(Duration::from_secs(5), || server.handle.active_connections() == 2));
}

#[test]
fn test_bind_failure_is_reported() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap();

    let config = Config::builder().listen_addr(addr.to_string()).build();
    let result = Server::bind(config, SharedStore::new(MemoryStore::new()));

    assert!(matches!(result, Err(RolodexError::Io(_))));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(0)
        .build();
    assert!(matches!(
        Server::bind(config, SharedStore::new(MemoryStore::new())),
        Err(RolodexError::Config(_))
    ));

    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .read_timeout_ms(0)
        .shutdown_policy(ShutdownPolicy::Drain)
        .build();
    assert!(matches!(
        Server::bind(config, SharedStore::new(MemoryStore::new())),
        Err(RolodexError::Config(_))
    ));

    // A stalled reader must not be able to hold the store forever
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .write_timeout_ms(0)
        .build();
    assert!(matches!(
        Server::bind(config, SharedStore::new(MemoryStore::new())),
        Err(RolodexError::Config(_))
    ));
}
