//! Lineage CLI - function intelligence for a single function

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Logs go to stderr; stdout carries only the report

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lineage_core::config::{self, ResolvedConfig};
use lineage_core::error::AnalysisError;
use lineage_core::report::{render_history_json, render_json, render_text};
use lineage_core::{render_history, AnalysisRequest, Pipeline, PipelineOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit code when the structural stage cannot answer the request
const EXIT_ANALYSIS_UNAVAILABLE: i32 = 2;

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Function intelligence: history, dependencies and change risk for one function")]
#[command(version = env!("LINEAGE_VERSION"))]
struct Cli {
    /// Log at debug level (overrides LINEAGE_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one function
    Analyze {
        /// Repository root
        repo: PathBuf,

        /// File defining the function (repository-relative)
        #[arg(long)]
        file: PathBuf,

        /// Function name (qualified names like `Worker.run` are accepted)
        #[arg(long)]
        function: String,

        /// Commit to analyze (default: the working tree, fingerprinted against HEAD)
        #[arg(long)]
        commit: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep results in memory only
        #[arg(long)]
        ephemeral: bool,

        /// Skip the language model; narrative sections are placeholders
        #[arg(long)]
        offline: bool,
    },
    /// List stored analyses of a function, oldest first
    History {
        /// Repository root
        repo: PathBuf,

        /// Function name
        #[arg(long)]
        function: String,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running analysis
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Analyze {
            repo,
            file,
            function,
            commit,
            format,
            config: config_path,
            ephemeral,
            offline,
        } => {
            let repo_root = resolve_repo_root(&repo)?;
            let file_path = repo_relative(&repo_root, &file)?;

            let resolved = load_config(&repo_root, config_path.as_deref())?;
            let pipeline = Pipeline::from_config(
                &repo_root,
                &resolved,
                PipelineOptions { ephemeral, offline },
            )?;

            let mut request = AnalysisRequest::new(&repo_root, file_path, function);
            if let Some(commit) = commit {
                request = request.at_commit(commit);
            }

            let spinner = spinner(&format!(
                "Analyzing {}#{}",
                request.file_path, request.function_name
            ));
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let result = pipeline.analyze_with_cancellation(&request, &cancel).await;
            spinner.finish_and_clear();

            match result {
                Ok(record) => match format {
                    OutputFormat::Text => print!("{}", render_text(&record)),
                    OutputFormat::Json => println!("{}", render_json(&record)),
                },
                Err(e @ AnalysisError::AnalysisUnavailable(_)) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(EXIT_ANALYSIS_UNAVAILABLE);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::History {
            repo,
            function,
            format,
            config: config_path,
        } => {
            let repo_root = resolve_repo_root(&repo)?;
            let resolved = load_config(&repo_root, config_path.as_deref())?;
            let pipeline = Pipeline::from_config(
                &repo_root,
                &resolved,
                PipelineOptions {
                    ephemeral: false,
                    offline: true,
                },
            )?;

            let records = pipeline
                .history(&repo_root, &function)
                .await
                .context("failed to read stored analyses")?;

            match format {
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("No stored analyses for `{}`.", function);
                    } else {
                        print!("{}", render_history(&records));
                    }
                }
                OutputFormat::Json => println!("{}", render_history_json(&records)),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

/// `LINEAGE_LOG` controls the filter; `--verbose` forces debug
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LINEAGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn load_config(repo_root: &Path, config_path: Option<&Path>) -> anyhow::Result<ResolvedConfig> {
    let resolved = config::load_and_resolve(repo_root, config_path)
        .context("failed to load configuration")?;
    if let Some(path) = &resolved.config_path {
        tracing::info!(path = %path.display(), "using config");
    }
    Ok(resolved)
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Normalization ranges:");
    let ranges = &resolved.ranges;
    for (name, range) in [
        ("complexity", ranges.complexity),
        ("modification_frequency", ranges.modification_frequency),
        ("call_sites", ranges.call_sites),
        ("lines_of_code", ranges.lines_of_code),
    ] {
        println!("  {}: [{}, {}]", name, range.min, range.max);
    }
    println!();
    println!("Pipeline:");
    println!("  cache_ttl_hours: {}", resolved.cache_ttl_hours);
    println!("  stage_timeout_secs: {}", resolved.stage_timeout_secs);
    println!();
    println!("Synthesis:");
    println!("  token_budget: {}", resolved.token_budget);
    println!("  max_retries: {}", resolved.max_retries);
    println!(
        "  backoff_ms: {} .. {}",
        resolved.initial_backoff_ms, resolved.max_backoff_ms
    );
    println!("  endpoint: {}", resolved.llm_endpoint);
    println!("  model: {}", resolved.llm_model);
    println!("  api_key_env: {}", resolved.api_key_env);
    println!();
    println!("Store:");
    println!("  path: {}", resolved.store_path.display());
    println!("  blob_dir: {}", resolved.blob_dir.display());
    println!();
    println!("Filters:");
    println!(
        "  include: {}",
        if resolved.include.is_empty() {
            "all files".to_string()
        } else {
            resolved.include.join(", ")
        }
    );
    println!("  exclude: {}", resolved.exclude.join(", "));
}

/// Absolute repository root; must be an existing directory
fn resolve_repo_root(repo: &Path) -> anyhow::Result<PathBuf> {
    let root = if repo.is_relative() {
        std::env::current_dir()?.join(repo)
    } else {
        repo.to_path_buf()
    };
    if !root.is_dir() {
        anyhow::bail!("Repository root does not exist: {}", root.display());
    }
    Ok(root)
}

/// Express `file` relative to `repo_root`
fn repo_relative(repo_root: &Path, file: &Path) -> anyhow::Result<String> {
    if file.is_relative() {
        return Ok(file.to_string_lossy().replace('\\', "/"));
    }

    let canonical_file = file
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", file.display()))?;
    let canonical_root = repo_root
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", repo_root.display()))?;
    let relative = canonical_file.strip_prefix(&canonical_root).with_context(|| {
        format!(
            "{} is outside the repository {}",
            canonical_file.display(),
            canonical_root.display()
        )
    })?;
    Ok(relative.to_string_lossy().replace('\\', "/"))
}
