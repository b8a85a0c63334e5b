//! Cartwheel CLI - database migrations and development tokens.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! cartwheel migrate
//!
//! # Mint a bearer token for local testing
//! cartwheel token --client-id device-42
//! cartwheel token --client-id ops@example.com --role admin
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `token` - Issue a signed bearer token

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cartwheel")]
#[command(author, version, about = "Cartwheel CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Issue a signed bearer token
    Token {
        /// Client identity the token is issued for
        #[arg(short, long)]
        client_id: String,

        /// Role (`customer` or `admin`)
        #[arg(short, long, default_value = "customer")]
        role: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Token { client_id, role } => {
            let token = commands::token::issue(&client_id, &role)?;
            #[allow(clippy::print_stdout)]
            {
                println!("{token}");
            }
        }
    }
    Ok(())
}
