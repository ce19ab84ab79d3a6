//! CLI layer for crosscite.
//!
//! Provides the command-line interface using clap: `query` runs one question
//! against `SQLite` FTS5 sources, `strategies` prints the strategy table and
//! `init-prompts` writes editable prompt templates.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, SourceSpec};
