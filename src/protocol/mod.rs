//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format
//!
//! There is no frame header. A request is a one-byte command tag followed by
//! the payload that tag implies; a response is the value(s) implied by the
//! request it answers.
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────────────────────────────────────┐
//! │ Cmd (1)  │  Payload (shape fixed by Cmd)            │
//! └──────────┴──────────────────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: ADD        - Payload: record        Response: none
//! - 0x02: GET        - Payload: string        Response: optional record
//! - 0x03: DELETE     - Payload: string        Response: none
//! - 0x04: COUNT      - Payload: empty         Response: u64
//! - 0x05: LIST_NAMES - Payload: empty         Response: string set
//!
//! ### Values (big-endian)
//! - string:          len (4) + UTF-8 bytes
//! - record:          len (4) + bincode(Record)
//! - optional record: 0x00 (absent) | 0x01 + record
//! - string set:      count (4) + count × string

mod command;
mod response;
mod codec;

pub use command::{CommandType, Request};
pub use response::Response;
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_command_type,
    read_request, read_request_payload, read_response, write_request, write_response,
    MAX_NAME_SET_LEN, MAX_PAYLOAD_SIZE,
};
