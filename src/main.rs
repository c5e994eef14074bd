//! Command-line interface for drift-rs
//!
//! A thin shell over the library: every subcommand maps 1:1 to an engine
//! operation. Exit codes follow the contract: 0 success, 1 user error,
//! 2 partial success with errors, 3 cancelled or timed out, 10+ internal
//! faults.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use console::style;
use env_logger::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

use drift_rs::model::{PatternCategory, PatternStatus, VariantScope};
use drift_rs::output;
use drift_rs::store::VariantInput;
use drift_rs::workspace::WorkspaceManager;
use drift_rs::{DriftEngine, Error, PatternFilter, TraversalOptions};

/// A multi-language architectural drift detector
#[derive(Parser, Debug)]
#[command(
    name = "drift-rs",
    version,
    author,
    about = "Mines the conventions a codebase actually follows and flags the places that deviate",
    long_about = None
)]
struct Cli {
    /// Project root
    #[arg(short = 'p', long, value_name = "PATH", default_value = ".")]
    project: PathBuf,

    /// Set verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a `.drift` workspace for the project
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Scan the project and update the pattern store
    Scan {
        /// Re-scan only files that changed since the last scan
        #[arg(short, long)]
        incremental: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Build the call graph from the latest scan
    Callgraph,

    /// Scan, then build the call graph
    Full {
        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Show the project status from caches, without re-scanning
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Approve a discovered pattern as the project convention
    Approve {
        /// Pattern id (e.g. api/route-structure/url-casing)
        id: String,

        /// Who approved it
        #[arg(long)]
        by: Option<String>,
    },

    /// Ignore a pattern
    Ignore {
        /// Pattern id
        id: String,
    },

    /// Create a sanctioned variant of a pattern
    Variant {
        /// Pattern id the variant excepts
        #[arg(long)]
        pattern: String,

        /// Short name
        #[arg(long)]
        name: String,

        /// Why the deviation is sanctioned
        #[arg(long)]
        reason: String,

        /// Scope kind
        #[arg(long, value_enum, default_value = "global")]
        scope: ScopeKind,

        /// Directory or file the scope applies to
        #[arg(long)]
        value: Option<String>,
    },

    /// Query stored patterns
    Query {
        /// Filter by status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        /// Filter by category (kebab-case)
        #[arg(long)]
        category: Option<String>,

        /// Minimum confidence score
        #[arg(long)]
        min_confidence: Option<f64>,
    },

    /// Enumerate entry-point paths to data accessors
    Reachability {
        /// Start nodes (defaults to every entry point)
        #[arg(long)]
        from: Vec<String>,

        /// Maximum path length in edges
        #[arg(long, default_value = "8")]
        max_depth: usize,

        /// Maximum number of paths
        #[arg(long, default_value = "64")]
        max_paths: usize,

        /// Follow unresolved edges by name, at a confidence penalty
        #[arg(long)]
        include_unresolved: bool,
    },

    /// Impact analysis for a change set
    Impact {
        /// Changed files (project-relative)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Reverse traversal depth
        #[arg(long, default_value = "5")]
        depth: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Human,
    /// JSON for machine processing
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeKind {
    /// Covers every location of the pattern
    Global,
    /// Covers a directory prefix
    Directory,
    /// Covers one file
    File,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    /// Mined but not reviewed
    Discovered,
    /// Accepted as the convention
    Approved,
    /// Dismissed
    Ignored,
}

impl From<StatusArg> for PatternStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Discovered => PatternStatus::Discovered,
            StatusArg::Approved => PatternStatus::Approved,
            StatusArg::Ignored => PatternStatus::Ignored,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);
    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            // User errors get exit code 1; internal faults 10+.
            let code = match e.downcast_ref::<Error>() {
                Some(drift_error) => drift_error.exit_code(),
                None => 11,
            };
            error!("{:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(code as u8)
        }
    }
}

/// Initialize the logger based on verbosity settings
fn init_logger(verbosity: u8, quiet: bool) {
    let mut builder = Builder::from_default_env();
    if quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else {
        let level = match verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        builder.filter_level(level);
    }
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Init { force } => handle_init(&cli.project, *force),
        Commands::Scan {
            incremental,
            format,
        } => handle_scan(&cli.project, *incremental, *format, cli.quiet),
        Commands::Callgraph => handle_callgraph(&cli.project),
        Commands::Full { format } => handle_full(&cli.project, *format, cli.quiet),
        Commands::Status { format } => handle_status(&cli.project, *format),
        Commands::Approve { id, by } => {
            let engine = DriftEngine::open(&cli.project)?;
            let pattern = engine.approve(id, by.as_deref())?;
            println!("{} {}", "approved".green(), pattern.id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ignore { id } => {
            let engine = DriftEngine::open(&cli.project)?;
            let pattern = engine.ignore(id)?;
            println!("{} {}", "ignored".yellow(), pattern.id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Variant {
            pattern,
            name,
            reason,
            scope,
            value,
        } => handle_variant(&cli.project, pattern, name, reason, *scope, value.as_deref()),
        Commands::Query {
            status,
            category,
            min_confidence,
        } => handle_query(&cli.project, *status, category.as_deref(), *min_confidence),
        Commands::Reachability {
            from,
            max_depth,
            max_paths,
            include_unresolved,
        } => handle_reachability(&cli.project, from, *max_depth, *max_paths, *include_unresolved),
        Commands::Impact { files, depth } => handle_impact(&cli.project, files, *depth),
    }
}

fn handle_init(project: &PathBuf, force: bool) -> anyhow::Result<ExitCode> {
    let state_dir = project.join(".drift");
    let mut manager = WorkspaceManager::open(&state_dir)?;
    let registered = manager.init_project(project, force)?;
    println!(
        "{} {} ({})",
        "initialized".green(),
        registered.name,
        registered.root.display()
    );
    println!();
    println!("Next steps:");
    println!("  {} to mine conventions", style("drift-rs scan").cyan());
    println!("  {} to build the call graph", style("drift-rs callgraph").cyan());
    println!("  {} to see where you stand", style("drift-rs status").cyan());
    Ok(ExitCode::SUCCESS)
}

fn scan_spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("spinner template"),
    );
    pb.set_message("Scanning project...");
    Some(pb)
}

fn scan_exit_code(outcome: &drift_rs::ScanOutcome) -> ExitCode {
    if outcome.result.cancelled || outcome.result.timed_out {
        ExitCode::from(3)
    } else if !outcome.result.errors.is_empty() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

fn handle_scan(
    project: &PathBuf,
    incremental: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let spinner = match format {
        OutputFormat::Human => scan_spinner(quiet),
        OutputFormat::Json => None,
    };
    let outcome = engine.scan(incremental).context("scan failed")?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    match format {
        OutputFormat::Human => print!("{}", output::render_human(&outcome)),
        OutputFormat::Json => println!("{}", output::render_json(&outcome)?),
    }
    Ok(scan_exit_code(&outcome))
}

fn handle_callgraph(project: &PathBuf) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let result = engine.build_call_graph().context("call graph build failed")?;
    println!("{}", style("Call Graph Build").bold());
    println!("  Files:        {}", result.files_processed);
    println!("  Functions:    {}", result.total_functions);
    println!("  Calls:        {}", result.total_calls);
    println!(
        "  Resolved:     {} ({:.1}%)",
        result.resolved_calls,
        result.resolution_rate * 100.0
    );
    println!("  Entry points: {}", result.entry_points);
    println!("  Data access:  {}", result.data_accessors);
    println!("  Duration:     {} ms", result.duration_ms);
    if result.errors.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        println!("  Errors:       {} (non-fatal)", result.errors.len());
        Ok(ExitCode::from(2))
    }
}

fn handle_full(project: &PathBuf, format: OutputFormat, quiet: bool) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let spinner = match format {
        OutputFormat::Human => scan_spinner(quiet),
        OutputFormat::Json => None,
    };
    let (outcome, graph) = engine.full().context("full pipeline failed")?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    match format {
        OutputFormat::Human => {
            print!("{}", output::render_human(&outcome));
            if let Some(graph) = &graph {
                println!();
                println!("{}", style("Call Graph").bold());
                println!(
                    "  {} functions, {} calls, {:.1}% resolved",
                    graph.total_functions,
                    graph.total_calls,
                    graph.resolution_rate * 100.0
                );
            }
        }
        OutputFormat::Json => println!("{}", output::render_json(&outcome)?),
    }
    Ok(scan_exit_code(&outcome))
}

fn handle_status(project: &PathBuf, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let status = engine.status()?;
    match format {
        OutputFormat::Human => print!("{}", output::render_status_human(&status)),
        OutputFormat::Json => println!("{}", output::render_status_json(&status)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_variant(
    project: &PathBuf,
    pattern: &str,
    name: &str,
    reason: &str,
    scope: ScopeKind,
    value: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let scope = match (scope, value) {
        (ScopeKind::Global, _) => VariantScope::Global,
        (ScopeKind::Directory, Some(dir)) => VariantScope::Directory(dir.to_string()),
        (ScopeKind::File, Some(file)) => VariantScope::File(file.to_string()),
        _ => {
            return Err(Error::InvalidArgument(
                "directory and file scopes need --value".into(),
            )
            .into())
        }
    };
    let variant = engine.create_variant(VariantInput {
        pattern_id: pattern.to_string(),
        name: name.to_string(),
        reason: reason.to_string(),
        scope,
        locations: Vec::new(),
    })?;
    println!("{} {} ({})", "created variant".green(), variant.name, variant.id);
    Ok(ExitCode::SUCCESS)
}

fn handle_query(
    project: &PathBuf,
    status: Option<StatusArg>,
    category: Option<&str>,
    min_confidence: Option<f64>,
) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let category = match category {
        Some(raw) => Some(PatternCategory::parse(raw).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown category '{}'", raw))
        })?),
        None => None,
    };
    let patterns = engine.query_patterns(&PatternFilter {
        status: status.map(Into::into),
        category,
        min_confidence,
    })?;
    for pattern in &patterns {
        println!(
            "{:<10} {:<7} {:.2}  {}  ({} locations, {} outliers)",
            pattern.status.to_string(),
            pattern.confidence.level.as_str(),
            pattern.confidence.score,
            pattern.id,
            pattern.locations.len(),
            pattern.outliers.len(),
        );
    }
    println!("{} patterns", patterns.len());
    Ok(ExitCode::SUCCESS)
}

fn handle_reachability(
    project: &PathBuf,
    from: &[String],
    max_depth: usize,
    max_paths: usize,
    include_unresolved: bool,
) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let options = TraversalOptions {
        max_depth,
        max_paths,
        traverse_unresolved: include_unresolved,
    };
    let starts = if from.is_empty() { None } else { Some(from) };
    let paths = engine.reachability(starts, &options)?;
    if paths.is_empty() {
        println!("no paths found");
        return Ok(ExitCode::SUCCESS);
    }
    for path in &paths {
        println!(
            "[{:.2}] {}",
            path.confidence,
            path.nodes.join(&format!(" {} ", style("→").cyan()))
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_impact(project: &PathBuf, files: &[PathBuf], depth: usize) -> anyhow::Result<ExitCode> {
    let engine = DriftEngine::open(project)?;
    let impact = engine.impact(files, depth)?;
    println!("{}", style("Impact Analysis").bold());
    println!("  Affected files:     {}", impact.affected_files.len());
    println!("  Affected functions: {}", impact.affected_functions.len());
    println!("  Entry points:       {}", impact.entry_points_touched.len());
    println!("  Data access:        {}", impact.data_access_touched.len());
    let risk = if impact.risk_score >= 50 {
        impact.risk_score.to_string().red().bold().to_string()
    } else if impact.risk_score >= 25 {
        impact.risk_score.to_string().yellow().to_string()
    } else {
        impact.risk_score.to_string().green().to_string()
    };
    println!("  Risk score:         {}/100", risk);
    for function in impact.entry_points_touched.iter().take(10) {
        println!("    {} {}", "entry".cyan(), function);
    }
    Ok(ExitCode::SUCCESS)
}
