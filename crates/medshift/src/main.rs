// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Medshift - urgent shift-coverage marketplace.
//!
//! This is the binary entry point for the Medshift service and its
//! operator commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use medshift_core::Urgency;

/// Medshift - urgent shift-coverage marketplace.
#[derive(Parser, Debug)]
#[command(name = "medshift", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the marketplace service: expiry sweeper and realtime session.
    Serve,
    /// Show the credit cost of posting a request.
    Price {
        /// Urgency tier: normal, high, critical, or emergency.
        #[arg(long, default_value = "normal")]
        urgency: Urgency,
        /// Include the priority boost add-on.
        #[arg(long)]
        boost: bool,
        /// Include the featured placement add-on.
        #[arg(long)]
        featured: bool,
    },
    /// Expire overdue open requests once and exit.
    Sweep,
    /// Manage requester credit accounts.
    Credits {
        #[command(subcommand)]
        action: CreditsCommand,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Subcommand, Debug)]
enum CreditsCommand {
    /// Open an account for a requester.
    Open {
        requester_id: String,
        #[arg(long, default_value_t = 0)]
        balance: u32,
    },
    /// Add credits to an existing account.
    Grant {
        requester_id: String,
        amount: u32,
        #[arg(long, default_value = "grant")]
        reason: String,
    },
    /// Show the current balance.
    Balance { requester_id: String },
    /// Show the ledger, oldest entry first.
    History { requester_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => medshift_config::load_and_validate_path(path),
        None => medshift_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            medshift_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Price {
            urgency,
            boost,
            featured,
        }) => {
            admin::print_price(&config, urgency, boost, featured);
            Ok(())
        }
        Some(Commands::Sweep) => admin::run_sweep(&config).await,
        Some(Commands::Credits { action }) => admin::run_credits(&config, action).await,
        Some(Commands::Config) => admin::print_config(&config),
        None => {
            println!("medshift: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}

/// Initialize tracing. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("medshift={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
