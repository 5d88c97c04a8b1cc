//! Response definitions
//!
//! Represents responses to clients. Responses carry no tag of their own; the
//! reader knows which shape to expect from the request it just sent.

use std::collections::HashSet;

use super::CommandType;
use crate::record::Record;

/// A response to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Answer to GET; `None` is the explicit "not found" marker
    Record(Option<Record>),

    /// Answer to COUNT
    Count(u64),

    /// Answer to LIST_NAMES
    Names(HashSet<String>),
}

impl Response {
    /// The command this response answers
    pub fn answers(&self) -> CommandType {
        match self {
            Response::Record(_) => CommandType::Get,
            Response::Count(_) => CommandType::Count,
            Response::Names(_) => CommandType::ListNames,
        }
    }
}
