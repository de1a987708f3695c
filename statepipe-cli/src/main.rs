//! statepipe: extract states, edit a canonical field, write it back.

mod commands;
mod error;
mod output;
mod telemetry;

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use statepipe_core::{IdentityFilter, StateId};
use statepipe_pg::{DbConfig, PgStateRepository};
use statepipe_storage::{EditPipeline, PersistMode};

use crate::commands::EditRequest;
use crate::error::CliResult;
use crate::telemetry::{init_tracing, TelemetryConfig};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// How `edit` writes records back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Targeted update of the document column; unknown ids fail
    Update,
    /// Insert-or-update of the whole record
    Upsert,
}

impl From<ModeArg> for PersistMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Update => PersistMode::TargetedUpdate,
            ModeArg::Upsert => PersistMode::Upsert,
        }
    }
}

/// Extract, edit, and persist JSON documents in the states table.
#[derive(Parser)]
#[command(name = "statepipe", version, about = "Extract, edit, and persist state documents")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Identifier filters shared by `extract` and `edit`.
#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    trace_id: Option<String>,
    #[arg(long)]
    doc_id: Option<String>,
    #[arg(long)]
    workflow_id: Option<String>,
    #[arg(long)]
    tenant_id: Option<String>,
    #[arg(long)]
    step_id: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> IdentityFilter {
        let mut filter = IdentityFilter::new();
        if let Some(v) = &self.trace_id {
            filter = filter.with_trace_id(v);
        }
        if let Some(v) = &self.doc_id {
            filter = filter.with_doc_id(v);
        }
        if let Some(v) = &self.workflow_id {
            filter = filter.with_workflow_id(v);
        }
        if let Some(v) = &self.tenant_id {
            filter = filter.with_tenant_id(v);
        }
        if let Some(v) = &self.step_id {
            filter = filter.with_step_id(v);
        }
        filter
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List records matching the identifier filters
    Extract {
        #[command(flatten)]
        filter: FilterArgs,
        /// Maximum number of rows to read
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Set a `{value, confidence}` field in every matching record
    Edit {
        /// Dotted path from the document root, e.g. canonical_schema.parties.shipper.name
        #[arg(long)]
        path: String,
        /// Extracted value to store
        #[arg(long)]
        value: String,
        /// Extractor confidence
        #[arg(long)]
        confidence: f64,
        #[command(flatten)]
        filter: FilterArgs,
        /// Maximum number of rows to edit
        #[arg(long, default_value_t = 2)]
        limit: usize,
        /// How to write the records back
        #[arg(long, value_enum, default_value = "update")]
        mode: ModeArg,
        /// Re-read each record and report the stored field
        #[arg(long)]
        verify: bool,
    },

    /// Show one record by state id
    Show {
        state_id: StateId,
    },

    /// List state table columns whose names start with a prefix
    CheckColumns {
        #[arg(long, default_value = "_dlt")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = TelemetryConfig::from_env().and_then(|config| init_tracing(&config)) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(rendered) => {
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<String> {
    let config = DbConfig::from_env()?;
    tracing::debug!(?config, "Loaded database configuration");
    let repository = PgStateRepository::from_config(&config)?;

    match cli.command {
        Commands::CheckColumns { prefix } => {
            let columns = repository.list_columns(&prefix).await?;
            if !columns.is_empty() {
                tracing::warn!(
                    count = columns.len(),
                    %prefix,
                    "State table carries pipeline bookkeeping columns"
                );
            }
            output::render_columns(&columns, &prefix, cli.output)
        }
        Commands::Extract { filter, limit } => {
            let pipeline = EditPipeline::new(repository);
            let records = commands::extract(&pipeline, &filter.to_filter(), limit).await?;
            output::render_records(&records, cli.output)
        }
        Commands::Edit {
            path,
            value,
            confidence,
            filter,
            limit,
            mode,
            verify,
        } => {
            let pipeline = EditPipeline::new(repository);
            let request = EditRequest {
                path,
                value,
                confidence,
                filter: filter.to_filter(),
                limit,
                mode: mode.into(),
                verify,
            };
            let outcomes = commands::edit(&pipeline, &request).await?;
            output::render_edits(&outcomes, cli.output)
        }
        Commands::Show { state_id } => {
            let pipeline = EditPipeline::new(repository);
            let detail = commands::show(&pipeline, state_id).await?;
            output::render_detail(&detail, cli.output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_edit() {
        let cli = Cli::try_parse_from([
            "statepipe",
            "--output",
            "json",
            "edit",
            "--path",
            "canonical_schema.parties.shipper.name",
            "--value",
            "ABC Logistics",
            "--confidence",
            "0.98",
            "--trace-id",
            "t1",
            "--step-id",
            "S01",
            "--mode",
            "upsert",
            "--verify",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Edit {
                path,
                confidence,
                filter,
                limit,
                mode,
                verify,
                ..
            } => {
                assert_eq!(path, "canonical_schema.parties.shipper.name");
                assert_eq!(confidence, 0.98);
                assert_eq!(limit, 2);
                assert_eq!(PersistMode::from(mode), PersistMode::Upsert);
                assert!(verify);
                let filter = filter.to_filter();
                assert_eq!(filter, IdentityFilter::new().with_trace_id("t1").with_step_id("S01"));
            }
            _ => panic!("expected edit"),
        }
    }

    #[test]
    fn test_parse_extract_defaults() {
        let cli = Cli::try_parse_from(["statepipe", "extract"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Text);
        match cli.command {
            Commands::Extract { filter, limit } => {
                assert!(filter.to_filter().is_empty());
                assert_eq!(limit, 5);
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_parse_show_requires_uuid() {
        assert!(Cli::try_parse_from(["statepipe", "show", "not-a-uuid"]).is_err());
        assert!(Cli::try_parse_from(["statepipe", "show", "0192f0a4-7c1e-7b6a-9d2e-3f4a5b6c7d8e"]).is_ok());
    }

    #[test]
    fn test_parse_check_columns_default_prefix() {
        let cli = Cli::try_parse_from(["statepipe", "check-columns"]).unwrap();
        match cli.command {
            Commands::CheckColumns { prefix } => assert_eq!(prefix, "_dlt"),
            _ => panic!("expected check-columns"),
        }
    }

    #[test]
    fn test_edit_requires_confidence() {
        assert!(Cli::try_parse_from(["statepipe", "edit", "--path", "a", "--value", "v"]).is_err());
    }
}
