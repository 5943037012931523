//! CLI layer for ragcore-rs.
//!
//! Provides the command-line interface using clap, with offline commands
//! for validating configuration and previewing routing and shaping
//! decisions.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
