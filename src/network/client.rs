//! Client Session
//!
//! Holds one persistent connection to a server and exposes one blocking call
//! per command.
//!
//! A session never reconnects. If connecting fails, or any exchange fails
//! part-way, the session records the cause and every later call returns
//! `NotConnected` with that cause. Inputs that can be rejected locally are
//! rejected before any bytes are sent and leave the session untouched.

use std::collections::HashSet;
use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, RolodexError};
use crate::protocol::{encode_request, read_response, CommandType, Request, Response};
use crate::record::{validate_name, Record};

enum SessionState {
    Connected {
        reader: BufReader<TcpStream>,
        writer: BufWriter<TcpStream>,
    },
    Failed(String),
}

/// Client side of one long-lived connection
pub struct ClientSession {
    state: SessionState,
}

impl ClientSession {
    /// Connect to `addr`
    ///
    /// Does not fail: a connect error is kept and reported by the first
    /// operation that needs the connection.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Self {
        Self::connect_with_timeout(addr, None)
    }

    /// Connect to `addr`, applying `timeout` to every socket read and write
    pub fn connect_with_timeout<A: ToSocketAddrs>(addr: A, timeout: Option<Duration>) -> Self {
        let state = match open(addr, timeout) {
            Ok((reader, writer)) => {
                debug!(peer = ?reader.get_ref().peer_addr().ok(), "connected to server");
                SessionState::Connected { reader, writer }
            }
            Err(e) => {
                warn!(error = %e, "failed to connect to server");
                SessionState::Failed(e.to_string())
            }
        };
        Self { state }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// Why the session is unusable, if it is
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            SessionState::Connected { .. } => None,
            SessionState::Failed(cause) => Some(cause),
        }
    }

    /// Store a record on the server, replacing any record with the same name.
    /// The server sends no acknowledgement.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        record.validate()?;
        self.exchange(&Request::Add {
            record: record.clone(),
        })?;
        Ok(())
    }

    /// Fetch a record by name. `Ok(None)` means the server has no such record.
    pub fn get(&mut self, name: &str) -> Result<Option<Record>> {
        validate_name(name)?;
        match self.exchange(&Request::Get {
            name: name.to_string(),
        })? {
            Some(Response::Record(record)) => Ok(record),
            other => Err(unexpected(CommandType::Get, other)),
        }
    }

    /// Remove a record by name. Removing an absent name is not an error.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.exchange(&Request::Delete {
            name: name.to_string(),
        })?;
        Ok(())
    }

    /// Number of records on the server
    pub fn count(&mut self) -> Result<u64> {
        match self.exchange(&Request::Count)? {
            Some(Response::Count(count)) => Ok(count),
            other => Err(unexpected(CommandType::Count, other)),
        }
    }

    /// Names of all records on the server
    pub fn names(&mut self) -> Result<HashSet<String>> {
        match self.exchange(&Request::ListNames)? {
            Some(Response::Names(names)) => Ok(names),
            other => Err(unexpected(CommandType::ListNames, other)),
        }
    }

    /// Close the connection. Later calls fail with `NotConnected`.
    pub fn close(&mut self) {
        if let SessionState::Connected { writer, .. } = &self.state {
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
        self.state = SessionState::Failed("session closed".to_string());
    }

    /// Send one request and read its response, if it has one.
    ///
    /// The request is encoded before the connection is touched: a request
    /// that cannot be encoded is invalid input and leaves the session as it
    /// was. Any failure after that leaves the session failed.
    fn exchange(&mut self, request: &Request) -> Result<Option<Response>> {
        let bytes = encode_request(request).map_err(|e| {
            RolodexError::InvalidInput(format!("cannot encode {}: {}", request.command_type(), e))
        })?;

        let result = match &mut self.state {
            SessionState::Connected { reader, writer } => round_trip(reader, writer, request, &bytes),
            SessionState::Failed(cause) => return Err(RolodexError::NotConnected(cause.clone())),
        };

        if let Err(e) = &result {
            warn!(op = %request.command_type(), error = %e, "request failed; session is now unusable");
            self.state = SessionState::Failed(e.to_string());
        }
        result
    }
}

fn open<A: ToSocketAddrs>(
    addr: A,
    timeout: Option<Duration>,
) -> Result<(BufReader<TcpStream>, BufWriter<TcpStream>)> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    let read_stream = stream.try_clone()?;
    Ok((BufReader::new(read_stream), BufWriter::new(stream)))
}

fn round_trip(
    reader: &mut BufReader<TcpStream>,
    writer: &mut BufWriter<TcpStream>,
    request: &Request,
    bytes: &[u8],
) -> Result<Option<Response>> {
    // Flush before reading, so the server has the whole request before we
    // start waiting on its answer
    writer.write_all(bytes)?;
    writer.flush()?;

    if request.expects_response() {
        read_response(reader, request.command_type()).map(Some)
    } else {
        Ok(None)
    }
}

fn unexpected(command: CommandType, response: Option<Response>) -> RolodexError {
    RolodexError::Protocol(format!(
        "{} answered with unexpected response {:?}",
        command, response
    ))
}
