//! inc-index - CLI for the incremental symbol index
//!
//! Drives the index core from the shell: feed it parser output, mark files
//! dirty and ask which `#include` brings a symbol into scope.
//!
//! # Usage
//!
//! ```bash
//! # Load parser output for a workspace
//! inc-index ingest --workspace /path/to/repo index.json
//!
//! # Invalidate everything derived from edited files
//! inc-index dirty --workspace /path/to/repo include/widget.h
//!
//! # Suggest includes for a symbol used in src/main.cpp
//! inc-index include --workspace /path/to/repo Widget --file src/main.cpp
//! ```
//!
//! Index data lives under `<workspace>/.inc-index` unless `--data-dir` or
//! `INC_INDEX_DATA_DIR` says otherwise.
//!
//! Exit codes: 0 = success, 1 = error, 2 = no build record for the file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inc_index::{
    DirtyReport, IncludeQuery, IndexConfig, IndexService, IndexSnapshot, ResolveOutcome,
    ServiceStats, cache, service::IngestResponse,
};
use std::path::{Path, PathBuf};

/// Exit code when no build record covers the requested file.
const EXIT_NO_BUILD_RECORD: i32 = 2;

#[derive(Parser)]
#[command(name = "inc-index")]
#[command(version)]
#[command(about = "Incremental symbol index - dirty reconciliation and #include suggestions")]
#[command(long_about = r#"
inc-index keeps a symbol database consistent as files change.

It provides:
  - Ingestion of parser output (JSON)
  - Dirty invalidation of changed files
  - Ranked #include suggestions for a symbol

Designed for automation: use --json for machine-readable output.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace (project root) directory
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Where index data is stored (default: <workspace>/.inc-index)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// fsync every database write
    #[arg(long, global = true)]
    sync: bool,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load parser output, replacing any previous data for the same files
    Ingest {
        /// JSON snapshot produced by the parser
        input: PathBuf,
    },

    /// Invalidate index entries derived from changed files
    Dirty {
        /// Changed files, relative to the workspace or absolute
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Suggest #include lines for a symbol
    Include {
        /// Symbol name (exact, or an unambiguous prefix)
        symbol: String,

        /// File the include is for
        #[arg(short, long)]
        file: PathBuf,

        /// Build configuration of the file
        #[arg(short, long)]
        build_index: Option<usize>,
    },

    /// Show index statistics
    Stats,

    /// Rewrite database logs as compact snapshots
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only to stderr to keep stdout clean)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let workspace = cli.workspace.clone();
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    match run_command(&cli, &workspace).await {
        Ok(output) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_human_readable(&output);
            }
            if output.is_missing_build_record() {
                std::process::exit(EXIT_NO_BUILD_RECORD);
            }
            Ok(())
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({
                    "error": format!("{:#}", e)
                });
                eprintln!("{}", serde_json::to_string_pretty(&err)?);
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(1);
        }
    }
}

fn config_for(cli: &Cli, workspace: &Path) -> IndexConfig {
    let mut config = IndexConfig::persistent(cache::data_dir(workspace)).with_env_overrides();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    config.with_sync_writes(cli.sync)
}

async fn run_command(cli: &Cli, workspace: &Path) -> Result<Output> {
    let config = config_for(cli, workspace);
    let default_build_index = config.default_build_index;
    let service = IndexService::open(config);

    match &cli.command {
        Commands::Ingest { input } => {
            let json = tokio::fs::read_to_string(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let snapshot = IndexSnapshot::from_json(&json)
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            let response = service.ingest(workspace, snapshot).await?;
            Ok(Output::Ingest {
                workspace: workspace.display().to_string(),
                response,
            })
        }

        Commands::Dirty { files } => {
            let report = service.dirty(workspace, files.clone()).await?;
            Ok(Output::Dirty {
                files: files.len(),
                report,
            })
        }

        Commands::Include {
            symbol,
            file,
            build_index,
        } => {
            let query = IncludeQuery {
                symbol: symbol.clone(),
                file: file.clone(),
                build_index: build_index.unwrap_or(default_build_index),
            };
            let response = service.include_file(workspace, query).await?;
            Ok(Output::Include {
                symbol: symbol.clone(),
                file: file.display().to_string(),
                outcome: response.outcome,
                includes: response.includes,
            })
        }

        Commands::Stats => {
            let stats = service.stats(workspace).await?;
            Ok(Output::Stats { stats })
        }

        Commands::Compact => {
            service.compact(workspace).await?;
            Ok(Output::Compact {
                workspace: workspace.display().to_string(),
            })
        }
    }
}

#[derive(serde::Serialize)]
#[serde(tag = "type")]
enum Output {
    Ingest {
        workspace: String,
        #[serde(flatten)]
        response: IngestResponse,
    },
    Dirty {
        files: usize,
        report: DirtyReport,
    },
    Include {
        symbol: String,
        file: String,
        outcome: ResolveOutcome,
        includes: Vec<String>,
    },
    Stats {
        #[serde(flatten)]
        stats: ServiceStats,
    },
    Compact {
        workspace: String,
    },
}

impl Output {
    fn is_missing_build_record(&self) -> bool {
        matches!(
            self,
            Output::Include {
                outcome: ResolveOutcome::NoBuildRecord,
                ..
            }
        )
    }
}

fn print_human_readable(output: &Output) {
    match output {
        Output::Ingest {
            workspace,
            response,
        } => {
            let ingested = &response.ingested;
            println!(
                "Ingested {} files ({} symbols, {} names, {} build records) into {}",
                ingested.files,
                ingested.symbols,
                ingested.names,
                ingested.build_records,
                workspace
            );
            if response.dirtied.total() > 0 {
                println!(
                    "Replaced {} stale symbols and {} stale names",
                    response.dirtied.symbols_removed,
                    response.dirtied.names_rewritten + response.dirtied.names_removed
                );
            }
        }
        Output::Dirty { files, report } => {
            println!("Dirtied {} files:", files);
            println!("  symbols removed: {}", report.symbols_removed);
            println!("  names rewritten: {}", report.names_rewritten);
            println!("  names removed:   {}", report.names_removed);
        }
        Output::Include {
            symbol,
            file,
            outcome,
            includes,
        } => match outcome {
            ResolveOutcome::NoBuildRecord => {
                eprintln!("No build record for {}", file);
            }
            ResolveOutcome::Resolved { .. } if includes.is_empty() => {
                eprintln!("No includes found for \"{}\"", symbol);
            }
            ResolveOutcome::Resolved { .. } => {
                for line in includes {
                    println!("{}", line);
                }
            }
        },
        Output::Stats { stats } => {
            println!("Project {} ({})", stats.project, stats.root.display());
            println!("  files:         {}", stats.metadata.file_count);
            println!("  include edges: {}", stats.metadata.include_edges);
            println!("  build records: {}", stats.metadata.build_records);
            println!("  symbols:       {}", stats.symbols);
            println!("  symbol names:  {}", stats.symbol_names);
        }
        Output::Compact { workspace } => {
            println!("Compacted index for {}", workspace);
        }
    }
}
