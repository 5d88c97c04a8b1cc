//! Rolodex Server Binary
//!
//! Starts the TCP server for Rolodex.

use clap::Parser;
use rolodex::config::DEFAULT_ADDR;
use rolodex::{Config, MemoryStore, Server, SharedStore, ShutdownPolicy};
use tracing_subscriber::{fmt, EnvFilter};

/// Rolodex Server
#[derive(Parser, Debug)]
#[command(name = "rolodex-server")]
#[command(about = "Networked address-book record store")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    listen: String,

    /// Longest wait between accept attempts, in milliseconds
    #[arg(long, default_value = "100")]
    accept_poll_ms: u64,

    /// Per-connection read timeout in milliseconds (0 = none)
    #[arg(long, default_value = "5000")]
    read_timeout_ms: u64,

    /// Per-connection write timeout in milliseconds (must be non-zero)
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,

    /// On shutdown, close idle connections and wait for them instead of
    /// leaving them running
    #[arg(long)]
    drain: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rolodex=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Rolodex Server v{}", rolodex::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let policy = if args.drain {
        ShutdownPolicy::Drain
    } else {
        ShutdownPolicy::Detach
    };

    let config = Config::builder()
        .listen_addr(&args.listen)
        .accept_poll_ms(args.accept_poll_ms)
        .read_timeout_ms(args.read_timeout_ms)
        .write_timeout_ms(args.write_timeout_ms)
        .shutdown_policy(policy)
        .build();

    let store = SharedStore::new(MemoryStore::new());

    let server = match Server::bind(config, store) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    let handle = server.handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        handle.shutdown();
    }) {
        tracing::warn!("Could not install Ctrl+C handler: {}", e);
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
    // Detached connection threads must not keep the process alive
    std::process::exit(0);
}
