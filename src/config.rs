//! Configuration for Rolodex
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{Result, RolodexError};

/// Default listen address for the server and default target for clients
pub const DEFAULT_ADDR: &str = "127.0.0.1:10000";

/// Main configuration for a Rolodex server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Upper bound on how long the accept loop waits before re-checking
    /// for shutdown (milliseconds)
    pub accept_poll_ms: u64,

    /// Connection read timeout (milliseconds). A timeout with no data is an
    /// idle tick, not a disconnect. Zero disables the timeout.
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds). Must be non-zero: a reply to
    /// a read is written while the store lock is held, so a client that stops
    /// reading would otherwise stall every other connection.
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Lifecycle Configuration
    // -------------------------------------------------------------------------
    /// What happens to live connections when the server stops
    pub shutdown_policy: ShutdownPolicy,
}

/// Treatment of connection workers that are still running at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Leave workers running until their clients disconnect; do not wait
    #[default]
    Detach,

    /// Close each worker's connection at its next idle tick and wait for all
    /// of them before reporting the server stopped
    Drain,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_ADDR.to_string(),
            accept_poll_ms: 100,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            shutdown_policy: ShutdownPolicy::Detach,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would make the server misbehave
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.trim().is_empty() {
            return Err(RolodexError::Config("listen address is empty".to_string()));
        }
        if self.accept_poll_ms == 0 {
            return Err(RolodexError::Config(
                "accept poll interval must be at least 1 ms".to_string(),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(RolodexError::Config(
                "write timeout must be at least 1 ms".to_string(),
            ));
        }
        if self.shutdown_policy == ShutdownPolicy::Drain && self.read_timeout_ms == 0 {
            // Without a read timeout an idle worker never wakes up to notice shutdown
            return Err(RolodexError::Config(
                "drain shutdown requires a non-zero read timeout".to_string(),
            ));
        }
        Ok(())
    }

    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the accept poll interval (in milliseconds)
    pub fn accept_poll_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the shutdown policy for live connections
    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
