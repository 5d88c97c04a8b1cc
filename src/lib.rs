//! # Rolodex
//!
//! A networked address-book record store with:
//! - One long-lived TCP connection per client
//! - One dedicated worker thread per connection
//! - A single store shared by all connections behind one lock
//! - A compact tag-then-payload binary protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ClientSession │   │ClientSession │   (one persistent connection each)
//! └──────┬───────┘   └──────┬───────┘
//!        │     TCP          │
//! ┌──────▼──────────────────▼───────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (accept loop, bounded wait)                     │
//! └──────┬──────────────────┬───────────────────────────────────┘
//!        │                  │
//!        ▼                  ▼
//! ┌─────────────┐    ┌─────────────┐
//! │ Connection  │    │ Connection  │     (one thread per client)
//! └──────┬──────┘    └──────┬──────┘
//!        └────────┬─────────┘
//!                 ▼
//!          ┌─────────────┐
//!          │ SharedStore │  (one Mutex, held across read + send)
//!          └──────┬──────┘
//!                 ▼
//!          ┌─────────────┐
//!          │    Store    │
//!          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod store;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, RolodexError};
pub use config::{Config, ShutdownPolicy};
pub use record::Record;
pub use store::{MemoryStore, SharedStore, Store};
pub use network::{ClientSession, Server, ServerHandle, ServerState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Rolodex
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
