//! Rolodex CLI Client
//!
//! Command-line interface for interacting with a Rolodex server.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rolodex::config::DEFAULT_ADDR;
use rolodex::{ClientSession, Record};
use tracing_subscriber::{fmt, EnvFilter};

/// Rolodex CLI
#[derive(Parser, Debug)]
#[command(name = "rolodex-cli")]
#[command(about = "CLI for the Rolodex record store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    server: String,

    /// Socket timeout in milliseconds (0 = none)
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add or replace a record
    Add {
        /// Record name (unique key)
        name: String,

        #[arg(long, default_value = "")]
        street: String,

        #[arg(long, default_value = "")]
        suburb: String,

        #[arg(long, default_value = "")]
        phone: String,

        #[arg(long, default_value = "")]
        email: String,
    },

    /// Get a record by name
    Get {
        /// The name to look up
        name: String,
    },

    /// Delete a record by name
    Del {
        /// The name to delete
        name: String,
    },

    /// Print the number of records
    Count,

    /// List all record names
    List,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let timeout = (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms));
    let mut session = ClientSession::connect_with_timeout(args.server.as_str(), timeout);

    let result = match args.command {
        Commands::Add {
            name,
            street,
            suburb,
            phone,
            email,
        } => {
            let record = Record::new(name)
                .with_street(street)
                .with_suburb(suburb)
                .with_phone(phone)
                .with_email(email);
            session.add(&record).map(|()| println!("OK"))
        }
        Commands::Get { name } => session.get(&name).map(|record| match record {
            Some(r) => {
                println!("name:   {}", r.name);
                println!("street: {}", r.street);
                println!("suburb: {}", r.suburb);
                println!("phone:  {}", r.phone);
                println!("email:  {}", r.email);
            }
            None => println!("(not found)"),
        }),
        Commands::Del { name } => session.delete(&name).map(|()| println!("OK")),
        Commands::Count => session.count().map(|count| println!("{}", count)),
        Commands::List => session.names().map(|names| {
            let mut names: Vec<_> = names.into_iter().collect();
            names.sort();
            for name in names {
                println!("{}", name);
            }
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
