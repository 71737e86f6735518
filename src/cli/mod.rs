//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-tenant user administration backend
#[derive(Parser)]
#[command(name = "bizpanel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Create a default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
