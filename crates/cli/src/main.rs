//! Bytestall CLI - Database migrations and order administration.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations (schema + session table)
//! bs-cli migrate storefront
//!
//! # Override an order's status (audited)
//! bs-cli order set-status <ORDER_ID> verified --operator ops@bytestall.shop --reason "paid by bank"
//!
//! # Show an order's audit trail
//! bs-cli order audit <ORDER_ID>
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use bytestall_core::{Email, OrderId, OrderStatus};

mod commands;

#[derive(Parser)]
#[command(name = "bs-cli")]
#[command(author, version, about = "Bytestall CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Administer orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Run storefront database migrations
    Storefront,
}

#[derive(Subcommand)]
enum OrderAction {
    /// Set an order's status, bypassing the transition table
    SetStatus {
        /// Order id
        id: OrderId,

        /// New status (`pending`, `payment_submitted`, `verified`, `completed`, `cancelled`)
        status: OrderStatus,

        /// Operator email recorded in the audit trail
        #[arg(short, long)]
        operator: Email,

        /// Why the override was needed
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Print an order's audit trail
    Audit {
        /// Order id
        id: OrderId,
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
        Commands::Migrate { target } => match target {
            MigrateTarget::Storefront => commands::migrate::storefront().await?,
        },
        Commands::Order { action } => match action {
            OrderAction::SetStatus {
                id,
                status,
                operator,
                reason,
            } => {
                commands::order::set_status(&id, status, &operator, reason.as_deref()).await?;
            }
            OrderAction::Audit { id } => commands::order::audit(&id).await?,
        },
    }
    Ok(())
}
