//! CLI command implementations.
//!
//! Each command returns its rendered output; `main` writes it to stdout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::output::{OutputFormat, format_response, format_strategies};
use crate::cli::parser::{Cli, Commands, SourceSpec};
use crate::config::EngineConfig;
use crate::core::{Query, QueryFilters, SourceId, StrategyName};
use crate::engine::Engine;
use crate::error::{CommandError, Result};
use crate::llm::PromptSet;
use crate::retrieval::StrategyConfig;
use crate::source::{SourceRegistry, SqliteAdapter};

/// Parameters for the query command.
#[derive(Debug, Clone)]
pub struct QueryCommandParams<'a> {
    /// Question text.
    pub text: &'a str,
    /// Strategy name as typed.
    pub strategy: &'a str,
    /// `--source` arguments.
    pub sources: &'a [SourceSpec],
    /// Structured filters.
    pub filters: QueryFilters,
    /// Latency ceiling in milliseconds.
    pub max_latency_ms: Option<u64>,
    /// Synthesizer model override.
    pub synthesizer_model: Option<&'a str>,
    /// Prompt template directory.
    pub prompt_dir: Option<&'a Path>,
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Query {
            text,
            strategy,
            sources,
            project,
            since,
            until,
            max_latency_ms,
            synthesizer_model,
            prompt_dir,
        } => {
            let params = QueryCommandParams {
                text,
                strategy,
                sources,
                filters: QueryFilters {
                    project: project.clone(),
                    since: *since,
                    until: *until,
                },
                max_latency_ms: *max_latency_ms,
                synthesizer_model: synthesizer_model.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_query(&params, format)
        }
        Commands::Strategies => Ok(cmd_strategies(format)),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Registers one read-only `SQLite` adapter per `--source`.
fn build_registry(specs: &[SourceSpec]) -> Result<SourceRegistry> {
    if specs.is_empty() {
        return Err(CommandError::ExecutionFailed(
            "at least one --source <family>=<path>[#table] is required".to_string(),
        )
        .into());
    }

    let mut registry = SourceRegistry::new();
    for spec in specs {
        if !spec.path.is_file() {
            return Err(CommandError::ExecutionFailed(format!(
                "source database not found: {}",
                spec.path.display()
            ))
            .into());
        }
        let adapter = SqliteAdapter::new(
            SourceId::new(spec.id()),
            spec.family,
            spec.path.clone(),
            spec.table.clone(),
        )?;
        registry.register(Arc::new(adapter))?;
    }
    Ok(registry)
}

fn cmd_query(params: &QueryCommandParams<'_>, format: OutputFormat) -> Result<String> {
    let strategy: StrategyName = params.strategy.parse()?;
    let registry = build_registry(params.sources)?;

    let mut builder = EngineConfig::builder();
    if let Some(model) = params.synthesizer_model {
        builder = builder.synthesizer_model(model);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder
        .from_env()
        .build()
        .map_err(|e| CommandError::ExecutionFailed(format!("Engine configuration error: {e}")))?;

    let engine = Engine::new(config, registry)?;

    let mut query = Query::new(params.text, strategy).with_filters(params.filters.clone());
    if let Some(ms) = params.max_latency_ms {
        query = query.with_max_latency(Duration::from_millis(ms));
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })?;
    let response = rt.block_on(engine.query(query));

    match format {
        OutputFormat::Text => Ok(format_response(&response)),
        OutputFormat::Json => Ok(format.to_json(&response)),
    }
}

fn cmd_strategies(format: OutputFormat) -> String {
    let table = StrategyConfig::table();
    match format {
        OutputFormat::Text => format_strategies(&table),
        OutputFormat::Json => format.to_json(&table),
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown");
                output.push_str("  ");
                output.push_str(name);
                output.push('\n');
            }
            output.push_str("\nEdit these files to customize agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceFamily;
    use crate::error::Error;
    use clap::Parser;

    fn run(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(args).unwrap_or_else(|_| unreachable!());
        execute(&cli)
    }

    #[test]
    fn test_strategies_json() {
        let out = run(&["crosscite", "--format", "json", "strategies"]).unwrap_or_default();
        let rows: serde_json::Value = serde_json::from_str(&out).unwrap_or_default();
        assert_eq!(rows.as_array().map(Vec::len), Some(4));
        assert_eq!(rows[0]["name"], "rapid");
        assert_eq!(rows[3]["multi_agent"], true);
    }

    #[test]
    fn test_init_prompts_writes_once() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let target = dir.path().join("prompts");
        let target_str = target.to_string_lossy().into_owned();

        let first = run(&["crosscite", "init-prompts", &target_str]).unwrap_or_default();
        assert!(first.contains("Wrote 2 prompt template(s)"));
        assert!(target.join("synthesizer.md").is_file());

        let second = run(&["crosscite", "init-prompts", &target_str]).unwrap_or_default();
        assert!(second.contains("already exist"));
    }

    #[test]
    fn test_query_requires_a_source() {
        let err = run(&["crosscite", "query", "what does USM mean"]);
        assert!(matches!(err, Err(Error::Command(CommandError::ExecutionFailed(_)))));
    }

    #[test]
    fn test_query_rejects_unknown_strategy() {
        let err = run(&["crosscite", "query", "x", "--strategy", "exhaustive", "--source", "kb=./kb.db"]);
        assert!(matches!(err, Err(Error::Engine(_))));
    }

    #[test]
    fn test_build_registry_missing_file() {
        let specs = [SourceSpec {
            family: SourceFamily::Code,
            path: "/nonexistent/crosscite/code.db".into(),
            table: "code".to_string(),
        }];
        assert!(build_registry(&specs).is_err());
    }
}
