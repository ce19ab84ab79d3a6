//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::SourceFamily;

/// crosscite: ask one question across knowledge stores.
///
/// Fans a question out to the configured sources, ranks the evidence and,
/// when a completion service is configured, returns a cited answer.
#[derive(Parser, Debug)]
#[command(name = "crosscite")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose logging.
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
    /// Run one query against the given sources.
    #[command(after_help = r#"Examples:
  crosscite query "what does USM mean" --strategy rapid --source kb=./kb.db
  crosscite query "why does PROJ-42 crash" --source tickets=./jira.db#issues --source commits=./git.db
  crosscite --format json query "session timeouts" --strategy swarm --source kb=./kb.db | jq .status
"#)]
    Query {
        /// Question text.
        text: String,

        /// Strategy: rapid, focused, comprehensive, swarm.
        #[arg(short, long, default_value = "focused")]
        strategy: String,

        /// Source as <family>=<sqlite-path>[#table]; repeatable.
        ///
        /// Families: kb, tickets, commits, code. The table defaults to the
        /// family name.
        #[arg(long = "source", value_parser = parse_source_spec)]
        sources: Vec<SourceSpec>,

        /// Only evidence for this project key.
        #[arg(long)]
        project: Option<String>,

        /// Only evidence updated at or after this unix timestamp.
        #[arg(long)]
        since: Option<i64>,

        /// Only evidence updated at or before this unix timestamp.
        #[arg(long)]
        until: Option<i64>,

        /// Latency ceiling in milliseconds.
        #[arg(long)]
        max_latency_ms: Option<u64>,

        /// Model for the synthesizer (overrides `CROSSCITE_SYNTHESIZER_MODEL`).
        #[arg(long)]
        synthesizer_model: Option<String>,

        /// Directory containing prompt templates.
        #[arg(long, env = "CROSSCITE_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,
    },

    /// Print the strategy table.
    Strategies,

    /// Write default prompt templates to a directory.
    ///
    /// Files that already exist are left untouched.
    #[command(after_help = r"Examples:
  crosscite init-prompts                # ~/.config/crosscite/prompts
  crosscite init-prompts ./prompts      # Custom directory
")]
    InitPrompts {
        /// Target directory (defaults to `~/.config/crosscite/prompts`).
        dir: Option<PathBuf>,
    },
}

/// A parsed `--source` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Source family.
    pub family: SourceFamily,
    /// `SQLite` database path.
    pub path: PathBuf,
    /// FTS5 table name.
    pub table: String,
}

impl SourceSpec {
    /// Identifier the source is registered under: `<family>:<table>`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}", self.family, self.table)
    }
}

/// Parses `<family>=<path>[#table]`.
///
/// # Errors
///
/// Returns a message naming the problem when the spec is malformed.
pub fn parse_source_spec(spec: &str) -> Result<SourceSpec, String> {
    let (family, location) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected <family>=<path>[#table], got '{spec}'"))?;
    let family = SourceFamily::parse(family.trim())
        .ok_or_else(|| format!("unknown source family '{}'", family.trim()))?;
    let (path, table) = match location.rsplit_once('#') {
        Some((path, table)) => (path, table.trim().to_string()),
        None => (location, family.as_str().to_string()),
    };
    if path.trim().is_empty() {
        return Err(format!("missing database path in '{spec}'"));
    }
    if table.is_empty() {
        return Err(format!("empty table name in '{spec}'"));
    }
    Ok(SourceSpec {
        family,
        path: PathBuf::from(path.trim()),
        table,
    })
}

impl Cli {
    /// Log filter directive implied by `--verbose`.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "warn" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_spec_with_table() {
        let spec = parse_source_spec("tickets=./jira.db#issues").unwrap_or_else(|_| unreachable!());
        assert_eq!(spec.family, SourceFamily::Tickets);
        assert_eq!(spec.path, PathBuf::from("./jira.db"));
        assert_eq!(spec.table, "issues");
        assert_eq!(spec.id(), "tickets:issues");
    }

    #[test]
    fn test_parse_source_spec_default_table() {
        let spec = parse_source_spec("kb=/data/kb.sqlite").unwrap_or_else(|_| unreachable!());
        assert_eq!(spec.family, SourceFamily::KnowledgeBase);
        assert_eq!(spec.table, "knowledge_base");
    }

    #[test]
    fn test_parse_source_spec_errors() {
        assert!(parse_source_spec("kb").is_err());
        assert!(parse_source_spec("wiki=./x.db").is_err());
        assert!(parse_source_spec("code=").is_err());
        assert!(parse_source_spec("code=./x.db#").is_err());
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "crosscite",
            "--format",
            "json",
            "query",
            "what does USM mean",
            "--strategy",
            "rapid",
            "--source",
            "kb=./kb.db",
            "--max-latency-ms",
            "500",
        ])
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.format, "json");
        let Commands::Query {
            text,
            strategy,
            sources,
            max_latency_ms,
            ..
        } = cli.command
        else {
            unreachable!("expected query");
        };
        assert_eq!(text, "what does USM mean");
        assert_eq!(strategy, "rapid");
        assert_eq!(sources.len(), 1);
        assert_eq!(max_latency_ms, Some(500));
    }

    #[test]
    fn test_verbose_log_level() {
        let cli = Cli::try_parse_from(["crosscite", "-v", "strategies"]).unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.log_level(), "debug");
    }
}
