//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;

use tracing::{debug, info, trace, warn};

use super::ServerHandle;
use crate::config::{Config, ShutdownPolicy};
use crate::error::Result;
use crate::protocol::{read_command_type, read_request_payload, write_response, Request, Response};
use crate::store::{SharedStore, Store};

/// Handles a single client connection
pub struct Connection<S: Store> {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// The store shared with every other connection
    store: SharedStore<S>,

    /// Lifecycle of the server that accepted this connection
    server: ServerHandle,

    /// Close at the next idle tick once the server stops running
    drain_on_shutdown: bool,

    /// Connection number assigned by the listener
    id: u64,

    /// Peer address for logging
    peer_addr: String,
}

impl<S: Store> Connection<S> {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and configures timeouts
    pub fn new(
        stream: TcpStream,
        store: SharedStore<S>,
        server: ServerHandle,
        id: u64,
        config: &Config,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(Some(config.write_timeout()))?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            store,
            server,
            drain_on_shutdown: config.shutdown_policy == ShutdownPolicy::Drain,
            id,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Returns `Ok` when the client went away or the server drained this
    /// connection, and the failure otherwise. Either way the socket is done.
    pub fn handle(&mut self) -> Result<()> {
        debug!(conn = self.id, peer = %self.peer_addr, "connection established");

        match self.serve() {
            Ok(()) => {
                info!(conn = self.id, peer = %self.peer_addr, "connection closed for shutdown");
                Ok(())
            }
            Err(e) if e.is_disconnect() => {
                debug!(conn = self.id, peer = %self.peer_addr, "connection closed by client");
                Ok(())
            }
            Err(e) => {
                warn!(conn = self.id, peer = %self.peer_addr, error = %e, "closing connection");
                Err(e)
            }
        }
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            if self.drain_on_shutdown && !self.server.is_running() {
                return Ok(());
            }

            let command = match read_command_type(&mut self.reader) {
                Ok(command) => command,
                Err(e) if e.is_timeout() => {
                    // Idle tick: nothing was read, the client is just quiet
                    trace!(conn = self.id, "idle");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let request = read_request_payload(&mut self.reader, command)?;
            self.dispatch(request)?;
        }
    }

    /// Run one request against the store and answer it
    ///
    /// For reads the store guard is held until the response has been flushed.
    fn dispatch(&mut self, request: Request) -> Result<()> {
        let op = request.command_type();
        info!(
            conn = self.id,
            peer = %self.peer_addr,
            %op,
            key = request.key().unwrap_or("-"),
            "request"
        );

        match request {
            Request::Add { record } => {
                self.store.lock().add_or_replace(record);
            }
            Request::Get { name } => {
                let store = self.store.lock();
                let record = store.get_by_name(&name);
                let found = record.is_some();
                write_response(&mut self.writer, &Response::Record(record))?;
                drop(store);
                debug!(conn = self.id, found, "sent record");
            }
            Request::Delete { name } => {
                self.store.lock().delete_by_name(&name);
            }
            Request::Count => {
                let store = self.store.lock();
                let count = store.count() as u64;
                write_response(&mut self.writer, &Response::Count(count))?;
                drop(store);
                debug!(conn = self.id, count, "sent count");
            }
            Request::ListNames => {
                let store = self.store.lock();
                let names = store.names();
                let count = names.len();
                write_response(&mut self.writer, &Response::Names(names))?;
                drop(store);
                debug!(conn = self.id, count, "sent name set");
            }
        }

        Ok(())
    }
}
