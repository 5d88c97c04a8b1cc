//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! Outgoing messages are assembled in a `BytesMut` and written in one
//! `write_all` followed by a flush, so a response never reaches the wire in
//! pieces. Incoming values are read straight off the stream with
//! `read_exact`, validated against the payload shape of their command.

use std::collections::HashSet;
use std::io::{Cursor, ErrorKind, Read, Write};

use bincode::Options;
use bytes::{BufMut, BytesMut};

use super::{CommandType, Request, Response};
use crate::error::{Result, RolodexError};
use crate::record::Record;

/// Maximum length of any single value (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum number of names in a LIST_NAMES response. Every entry costs at
/// least its 4-byte length prefix.
pub const MAX_NAME_SET_LEN: u32 = MAX_PAYLOAD_SIZE / 4;

/// GET response marker: record absent
const MARKER_ABSENT: u8 = 0x00;

/// GET response marker: record follows
const MARKER_PRESENT: u8 = 0x01;

/// bincode settings for record bodies. Trailing bytes inside a record body
/// are rejected.
fn record_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_PAYLOAD_SIZE as u64)
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
///
/// Format: cmd_type (1) + payload
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(request.command_type() as u8);

    match request {
        Request::Add { record } => put_record(&mut buf, record)?,
        Request::Get { name } | Request::Delete { name } => put_string(&mut buf, name)?,
        Request::Count | Request::ListNames => {}
    }

    Ok(buf.to_vec())
}

/// Decode a request from bytes
///
/// The slice must hold exactly one request.
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let mut cursor = Cursor::new(bytes);
    let request = read_request(&mut cursor).map_err(truncated("request"))?;
    ensure_consumed(&cursor, "request")?;
    Ok(request)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(64);

    match response {
        Response::Record(None) => buf.put_u8(MARKER_ABSENT),
        Response::Record(Some(record)) => {
            buf.put_u8(MARKER_PRESENT);
            put_record(&mut buf, record)?;
        }
        Response::Count(count) => buf.put_u64(*count),
        Response::Names(names) => {
            if names.len() > MAX_NAME_SET_LEN as usize {
                return Err(RolodexError::Protocol(format!(
                    "name set too large: {} entries (max {})",
                    names.len(),
                    MAX_NAME_SET_LEN
                )));
            }
            buf.put_u32(names.len() as u32);
            for name in names {
                put_string(&mut buf, name)?;
            }
        }
    }

    Ok(buf.to_vec())
}

/// Decode the response to a `command` from bytes
///
/// The slice must hold exactly one response.
pub fn decode_response(command: CommandType, bytes: &[u8]) -> Result<Response> {
    let mut cursor = Cursor::new(bytes);
    let response = read_response(&mut cursor, command).map_err(truncated("response"))?;
    ensure_consumed(&cursor, "response")?;
    Ok(response)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read the one-byte command tag that starts every request
///
/// A read timeout here surfaces as an `Io` error with nothing consumed, so the
/// caller may simply try again.
pub fn read_command_type<R: Read>(reader: &mut R) -> Result<CommandType> {
    let tag = read_u8(reader)?;
    CommandType::from_byte(tag)
}

/// Read the payload that follows a command tag
pub fn read_request_payload<R: Read>(reader: &mut R, command: CommandType) -> Result<Request> {
    match command {
        CommandType::Add => {
            let record = read_record(reader)?;
            if record.name.is_empty() {
                return Err(RolodexError::Protocol(
                    "ADD command: record name is empty".to_string(),
                ));
            }
            Ok(Request::Add { record })
        }
        CommandType::Get => Ok(Request::Get {
            name: read_string(reader, "GET name")?,
        }),
        CommandType::Delete => Ok(Request::Delete {
            name: read_string(reader, "DELETE name")?,
        }),
        CommandType::Count => Ok(Request::Count),
        CommandType::ListNames => Ok(Request::ListNames),
    }
}

/// Read a complete request from a stream
///
/// Blocks until a complete request is received or an error occurs
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    let command = read_command_type(reader)?;
    read_request_payload(reader, command)
}

/// Write a request to a stream and flush it
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    let bytes = encode_request(request)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read the response to `command` from a stream
pub fn read_response<R: Read>(reader: &mut R, command: CommandType) -> Result<Response> {
    match command {
        CommandType::Get => match read_u8(reader)? {
            MARKER_ABSENT => Ok(Response::Record(None)),
            MARKER_PRESENT => Ok(Response::Record(Some(read_record(reader)?))),
            marker => Err(RolodexError::Protocol(format!(
                "GET response: unknown marker 0x{:02x}",
                marker
            ))),
        },
        CommandType::Count => Ok(Response::Count(read_u64(reader)?)),
        CommandType::ListNames => Ok(Response::Names(read_name_set(reader)?)),
        CommandType::Add | CommandType::Delete => Err(RolodexError::Protocol(format!(
            "{} has no response",
            command
        ))),
    }
}

/// Write a response to a stream and flush it
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Value helpers
// =============================================================================

fn checked_len(len: usize, what: &str) -> Result<u32> {
    if len > MAX_PAYLOAD_SIZE as usize {
        return Err(RolodexError::Protocol(format!(
            "{} too large: {} (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as u32)
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<()> {
    buf.put_u32(checked_len(value.len(), "string")?);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_record(buf: &mut BytesMut, record: &Record) -> Result<()> {
    let body = record_options().serialize(record)?;
    buf.put_u32(checked_len(body.len(), "record")?);
    buf.put_slice(&body);
    Ok(())
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_be_bytes(bytes))
}

/// Read a length prefix and then that many bytes
fn read_lengthed<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let len = read_u32(reader)?;
    if len > MAX_PAYLOAD_SIZE {
        return Err(RolodexError::Protocol(format!(
            "{} too large: {} bytes (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_string<R: Read>(reader: &mut R, what: &str) -> Result<String> {
    let bytes = read_lengthed(reader, what)?;
    String::from_utf8(bytes)
        .map_err(|e| RolodexError::Protocol(format!("{}: invalid UTF-8: {}", what, e)))
}

fn read_record<R: Read>(reader: &mut R) -> Result<Record> {
    let body = read_lengthed(reader, "record")?;
    record_options()
        .deserialize(&body)
        .map_err(|e| RolodexError::Protocol(format!("malformed record: {}", e)))
}

fn read_name_set<R: Read>(reader: &mut R) -> Result<HashSet<String>> {
    let count = read_u32(reader)?;
    if count > MAX_NAME_SET_LEN {
        return Err(RolodexError::Protocol(format!(
            "name set too large: {} entries (max {})",
            count, MAX_NAME_SET_LEN
        )));
    }

    let mut names = HashSet::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let name = read_string(reader, "name")?;
        if !names.insert(name) {
            return Err(RolodexError::Protocol(
                "name set contains a duplicate".to_string(),
            ));
        }
    }
    Ok(names)
}

/// Running out of bytes in an in-memory buffer is a malformed message, not a
/// transport failure.
fn truncated(what: &'static str) -> impl Fn(RolodexError) -> RolodexError {
    move |e| match e {
        RolodexError::Io(ref io) if io.kind() == ErrorKind::UnexpectedEof => {
            RolodexError::Protocol(format!("Incomplete {}", what))
        }
        other => other,
    }
}

fn ensure_consumed(cursor: &Cursor<&[u8]>, what: &str) -> Result<()> {
    let total = cursor.get_ref().len() as u64;
    if cursor.position() != total {
        return Err(RolodexError::Protocol(format!(
            "{} has {} trailing bytes",
            what,
            total - cursor.position()
        )));
    }
    Ok(())
}
