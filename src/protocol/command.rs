//! Command definitions
//!
//! Represents requests from clients.

use std::fmt;

use crate::error::{Result, RolodexError};
use crate::record::Record;

/// Command types, sent as the first byte of every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    Add = 0x01,
    Get = 0x02,
    Delete = 0x03,
    Count = 0x04,
    ListNames = 0x05,
}

impl CommandType {
    /// Parse a wire tag
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(CommandType::Add),
            0x02 => Ok(CommandType::Get),
            0x03 => Ok(CommandType::Delete),
            0x04 => Ok(CommandType::Count),
            0x05 => Ok(CommandType::ListNames),
            _ => Err(RolodexError::Protocol(format!(
                "Unknown command type: 0x{:02x}",
                byte
            ))),
        }
    }

    /// Whether the server writes anything back for this command
    pub fn expects_response(self) -> bool {
        !matches!(self, CommandType::Add | CommandType::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::Add => "ADD",
            CommandType::Get => "GET",
            CommandType::Delete => "DELETE",
            CommandType::Count => "COUNT",
            CommandType::ListNames => "LIST_NAMES",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Store a record, replacing any record with the same name
    Add { record: Record },

    /// Fetch a record by name
    Get { name: String },

    /// Remove a record by name
    Delete { name: String },

    /// Number of stored records
    Count,

    /// Names of all stored records
    ListNames,
}

impl Request {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Request::Add { .. } => CommandType::Add,
            Request::Get { .. } => CommandType::Get,
            Request::Delete { .. } => CommandType::Delete,
            Request::Count => CommandType::Count,
            Request::ListNames => CommandType::ListNames,
        }
    }

    pub fn expects_response(&self) -> bool {
        self.command_type().expects_response()
    }

    /// The record name this request targets, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Request::Add { record } => Some(&record.name),
            Request::Get { name } | Request::Delete { name } => Some(name),
            Request::Count | Request::ListNames => None,
        }
    }
}
