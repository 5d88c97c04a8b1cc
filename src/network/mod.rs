//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor loop on the caller's thread
//! - One dedicated worker thread per connection
//! - Every worker goes through the same `SharedStore` lock
//! - `ClientSession` is the matching blocking client

mod server;
mod connection;
mod client;

pub use server::{Server, ServerHandle, ServerState};
pub use connection::Connection;
pub use client::ClientSession;
