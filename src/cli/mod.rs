//! CLI module for the Cairn orchestration tool.
//!
//! This module provides the command-line interface for previewing,
//! applying and destroying deployments.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
