//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ragcore-rs: operator tooling for the hybrid retrieval core.
///
/// Dry-run and validation commands for the retrieval pipeline: theme
/// catalog checks, routing previews and context-shaping plans. None of
/// these touch the vector index.
#[derive(Parser, Debug)]
#[command(name = "ragcore-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the theme catalog (YAML).
    #[arg(short, long, env = "RAGCORE_THEMES_CONFIG_PATH")]
    pub themes: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and the theme catalog.
    ///
    /// Reads configuration from the environment, checks every value, loads
    /// the theme catalog and prints non-fatal warnings (including the
    /// url/canonical_url ambiguity).
    Validate,

    /// Preview heuristic theme routing for a query.
    Route {
        /// Query text to route.
        query: String,

        /// User role hint (e.g. admin, agent).
        #[arg(long)]
        role: Option<String>,

        /// User platform hint (e.g. android, web).
        #[arg(long)]
        platform: Option<String>,
    },

    /// Show the context-shaping plan for a query.
    ///
    /// Prints the normalized text, recognized entities, derived boosts,
    /// complexity class, target document count and whether the
    /// list-intent rule matches.
    Plan {
        /// Query text to analyze.
        query: String,
    },
}
