//! # bidsync
//!
//! Command-line front end for the bidsync controller.
//!
//! ## Commands
//!
//! - `init`: Create the store, optionally seeded with demo projects
//! - `show`: Load everything and print the board
//! - `category`: Add, edit or delete demand categories
//! - `bid`: Move bids through the pipeline
//! - `status`: Show load status and counts
//!
//! ## Example
//!
//! ```bash
//! # Offline demo
//! bidsync --local init --demo
//! bidsync --local show
//!
//! # Add a category to a project (by id or name)
//! bidsync --local category add demo-p1 "Okna a dveře" --budget 420000
//!
//! # Shortlist a bid
//! bidsync --local bid status demo-p1 demo-b1 shortlist
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod config;

use commands::{bid, category, init, show, status};
use config::Context;

/// Command-line front end for the bidsync controller.
#[derive(Parser, Debug)]
#[command(name = "bidsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the store and configuration
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Client configuration file (default: <data-dir>/bidsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the local JSON blob instead of the SQLite store
    #[arg(long, global = true)]
    local: bool,

    /// Session email for the SQLite store
    #[arg(long, global = true, default_value = "owner@bidsync.local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store
    Init {
        /// Seed demo projects, bids and subcontractors
        #[arg(long)]
        demo: bool,
    },

    /// Load everything and print the board
    Show {
        /// Project (id or name) to hydrate first
        #[arg(long)]
        priority: Option<String>,
    },

    /// Manage demand categories
    Category {
        #[command(subcommand)]
        action: category::CategoryAction,
    },

    /// Move bids through the pipeline
    Bid {
        #[command(subcommand)]
        action: bid::BidAction,
    },

    /// Show load status and counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let ctx = Context {
        data_dir,
        config_path: cli.config,
        local: cli.local,
        user: cli.user,
    };

    match cli.command {
        Commands::Init { demo } => init::run(&ctx, demo).await?,
        Commands::Show { priority } => show::run(&ctx, priority.as_deref()).await?,
        Commands::Category { action } => category::run(&ctx, action).await?,
        Commands::Bid { action } => bid::run(&ctx, action).await?,
        Commands::Status => status::run(&ctx).await?,
    }

    Ok(())
}

/// Get the default data directory for bidsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "bidsync", "bidsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
