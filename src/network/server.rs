//! TCP Server
//!
//! Accepts connections and gives each one its own worker thread.
//!
//! ## Lifecycle
//! ```text
//! Running ──shutdown()──▶ Stopping ──accept loop exits──▶ Stopped
//! ```
//! The accept loop polls a non-blocking listener, waiting at most
//! `accept_poll_ms` between attempts, so a shutdown request is seen within
//! one poll interval. What happens to live connections at that point is set
//! by `ShutdownPolicy`.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use super::Connection;
use crate::config::{Config, ShutdownPolicy};
use crate::error::Result;
use crate::store::{SharedStore, Store};

/// Listener lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopping,
    Stopped,
}

struct Lifecycle {
    state: Mutex<ServerState>,
    changed: Condvar,
    active: AtomicUsize,
}

/// Cloneable handle for observing and stopping a running server
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Lifecycle>,
}

impl ServerHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(Lifecycle {
                state: Mutex::new(ServerState::Running),
                changed: Condvar::new(),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Ask the server to stop accepting connections
    ///
    /// Takes effect within one accept poll interval. Calling it again, or
    /// after the server stopped, does nothing.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if *state == ServerState::Running {
            *state = ServerState::Stopping;
            self.inner.changed.notify_all();
            info!("shutdown requested");
        }
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Number of connection workers currently alive
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Block until the server reports `Stopped` or `timeout` elapses.
    /// Returns whether it stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while *state != ServerState::Stopped {
            if self.inner.changed.wait_until(&mut state, deadline).timed_out() {
                return *state == ServerState::Stopped;
            }
        }
        true
    }

    fn mark_stopped(&self) {
        let mut state = self.inner.state.lock();
        *state = ServerState::Stopped;
        self.inner.changed.notify_all();
    }
}

/// Keeps the live-connection count and exit notification right even when a
/// worker unwinds.
struct WorkerGuard {
    id: u64,
    server: ServerHandle,
    done: Sender<u64>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.server.inner.active.fetch_sub(1, Ordering::SeqCst);
        // The listener may already be gone; nobody needs the notification then
        let _ = self.done.send(self.id);
    }
}

/// TCP server for Rolodex
pub struct Server<S: Store> {
    config: Config,
    store: SharedStore<S>,
    listener: TcpListener,
    handle: ServerHandle,
}

impl<S: Store> Server<S> {
    /// Bind the listen address
    ///
    /// Failing to bind is the one fatal server error; the caller decides how
    /// to exit.
    pub fn bind(config: Config, store: SharedStore<S>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "listening");

        Ok(Self {
            config,
            store,
            listener,
            handle: ServerHandle::new(),
        })
    }

    /// The address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn store(&self) -> SharedStore<S> {
        self.store.clone()
    }

    /// Run the accept loop until `ServerHandle::shutdown` is called (blocking)
    pub fn run(self) -> Result<()> {
        let (done_tx, done_rx) = channel::unbounded();
        let mut workers: HashMap<u64, JoinHandle<()>> = HashMap::new();
        let mut next_id: u64 = 0;
        let poll = self.config.accept_poll_interval();

        while self.handle.is_running() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    next_id += 1;
                    match self.spawn_worker(next_id, stream, done_tx.clone()) {
                        Ok(worker) => {
                            debug!(conn = next_id, %peer, "accepted connection");
                            workers.insert(next_id, worker);
                        }
                        Err(e) => {
                            warn!(conn = next_id, %peer, error = %e, "failed to start connection worker");
                        }
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    // Nothing to accept; wait out the poll interval, reaping
                    // any worker that finishes meanwhile
                    if let Ok(id) = done_rx.recv_timeout(poll) {
                        reap(id, &mut workers);
                    }
                    drain_finished(&done_rx, &mut workers);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    thread::sleep(poll);
                }
            }
        }

        let Server {
            config, listener, handle, ..
        } = self;
        drop(listener);
        drain_finished(&done_rx, &mut workers);

        match config.shutdown_policy {
            ShutdownPolicy::Detach => {
                if !workers.is_empty() {
                    info!(connections = workers.len(), "leaving live connections running");
                }
            }
            ShutdownPolicy::Drain => {
                info!(connections = workers.len(), "draining live connections");
                for (id, worker) in workers.drain() {
                    if worker.join().is_err() {
                        error!(conn = id, "connection worker panicked");
                    }
                }
            }
        }

        handle.mark_stopped();
        info!("server stopped");
        Ok(())
    }

    fn spawn_worker(&self, id: u64, stream: TcpStream, done: Sender<u64>) -> Result<JoinHandle<()>> {
        // Accepted sockets can inherit the listener's non-blocking flag
        stream.set_nonblocking(false)?;

        let store = self.store.clone();
        let server = self.handle.clone();
        let config = self.config.clone();

        self.handle.inner.active.fetch_add(1, Ordering::SeqCst);
        let guard = WorkerGuard {
            id,
            server: server.clone(),
            done,
        };

        let spawned = thread::Builder::new()
            .name(format!("rolodex-conn-{}", id))
            .spawn(move || {
                let _guard = guard;
                match Connection::new(stream, store, server, id, &config) {
                    Ok(mut connection) => {
                        let _ = connection.handle();
                    }
                    Err(e) => warn!(conn = id, error = %e, "failed to set up connection"),
                }
            });

        // On failure the closure (and the guard inside it) is dropped, which
        // undoes the count above
        Ok(spawned?)
    }
}

fn reap(id: u64, workers: &mut HashMap<u64, JoinHandle<()>>) {
    if let Some(worker) = workers.remove(&id) {
        if worker.join().is_err() {
            error!(conn = id, "connection worker panicked");
        }
    }
}

fn drain_finished(done: &Receiver<u64>, workers: &mut HashMap<u64, JoinHandle<()>>) {
    while let Ok(id) = done.try_recv() {
        reap(id, workers);
    }
}
