//! Pickup CLI - database migrations and operational tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! pickup-cli migrate
//!
//! # Register a customer (optionally with admin access)
//! pickup-cli customer create -e sam@example.com -n "Sam" --admin
//!
//! # Add a catalog product
//! pickup-cli product add -n "Sourdough loaf" -p 7.50
//!
//! # Mint a bearer token for a customer
//! pickup-cli token -u 6f1c...-uuid --hours 12
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "pickup-cli")]
#[command(author, version, about = "Pickup order service CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage customers
    Customer {
        #[command(subcommand)]
        action: CustomerAction,
    },
    /// Manage the product catalog
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Issue a bearer token for an existing customer
    Token {
        /// Customer id
        #[arg(short, long)]
        user: String,

        /// Token lifetime in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[derive(Subcommand)]
enum CustomerAction {
    /// Create a new customer
    Create {
        /// Customer email address
        #[arg(short, long)]
        email: String,

        /// Customer display name
        #[arg(short, long)]
        name: String,

        /// Grant admin access
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// Add a product to the catalog
    Add {
        /// Product name
        #[arg(short, long)]
        name: String,

        /// Unit price in dollars
        #[arg(short, long)]
        price: Decimal,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Customer { action } => match action {
            CustomerAction::Create { email, name, admin } => {
                commands::customer::create(&email, &name, admin).await?;
            }
        },
        Commands::Product { action } => match action {
            ProductAction::Add { name, price } => {
                commands::product::add(&name, price).await?;
            }
        },
        Commands::Token { user, hours } => commands::token::issue(&user, hours).await?,
    }
    Ok(())
}
