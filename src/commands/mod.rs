//! CLI command implementations for jvm-gc-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: configuration and JDK tool validation
//! - `config`: configuration file generation
//! - `once`: a single collection cycle printed to stdout

pub mod check;
pub mod config;
pub mod once;

// Re-export command functions
pub use check::command_check;
pub use config::{command_config, render_config};
pub use once::command_once;
