//! featcheck - feature-conformance harness CLI
//!
//! The `featcheck` command builds, runs and checks every C exemplar in a
//! corpus against its declared expected outcome.
//!
//! ## Commands
//!
//! - `run`: Build, execute and classify exemplars, then print a report
//! - `list`: Show discovered exemplars and their fixture status
//!
//! Exit status: 0 when every exemplar passes, 1 when any does not, 2 when the
//! harness itself fails (bad root, no exemplars, missing toolchain, bad config).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};

use featcheck_core::{
    BuiltinToolchain, ConfigError, Harness, HarnessConfig, HarnessError, Registry, ReportFormat,
};

/// Exit status for harness-level errors.
const EXIT_HARNESS_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "featcheck")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Feature-conformance harness for C exemplars", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, run and check exemplars
    Run(RunArgs),

    /// List discovered exemplars and their fixtures
    List {
        /// Corpus root directory
        #[arg(long, env = "FEATCHECK_ROOT")]
        root: Option<PathBuf>,

        /// Restrict to a category (repeatable)
        #[arg(long = "category", value_name = "NAME")]
        categories: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Corpus root directory (default: corpus)
    #[arg(long, env = "FEATCHECK_ROOT")]
    root: Option<PathBuf>,

    /// Restrict to a category (repeatable)
    #[arg(long = "category", value_name = "NAME")]
    categories: Vec<String>,

    /// Per-exemplar execution timeout in seconds (fractions allowed)
    #[arg(long, env = "FEATCHECK_TIMEOUT", value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Per-exemplar build timeout in seconds
    #[arg(long, env = "FEATCHECK_BUILD_TIMEOUT", value_name = "SECONDS")]
    build_timeout: Option<u64>,

    /// Deadline for the whole run in seconds
    #[arg(long, env = "FEATCHECK_RUN_TIMEOUT", value_name = "SECONDS")]
    run_timeout: Option<u64>,

    /// Maximum number of exemplars in flight (default: available parallelism)
    #[arg(short, long, env = "FEATCHECK_JOBS")]
    jobs: Option<usize>,

    /// Report format: text or json
    #[arg(long, env = "FEATCHECK_FORMAT")]
    format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(long, env = "FEATCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Builtin toolchain: cc, gcc or clang
    #[arg(long, env = "FEATCHECK_TOOLCHAIN")]
    toolchain: Option<String>,

    /// Compiler program, keeping the toolchain's argument template
    #[arg(long, env = "FEATCHECK_CC", value_name = "PROGRAM")]
    cc: Option<String>,

    /// Extra compiler argument placed before the template (repeatable)
    #[arg(long = "cflag", value_name = "ARG", allow_hyphen_values = true)]
    cflags: Vec<String>,

    /// Directory for per-exemplar scratch directories (default: system temp)
    #[arg(long, env = "FEATCHECK_SCRATCH")]
    scratch: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    featcheck_core::init_tracing(cli.log_json, level);

    let result = match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::List { root, categories } => cmd_list(root, categories),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_HARNESS_ERROR)
        }
    }
}

/// Build the effective configuration: file (if any), then flags and env.
fn resolve_config(args: &RunArgs) -> Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if !args.categories.is_empty() {
        config.categories = args.categories.clone();
    }
    if let Some(secs) = args.timeout {
        config.sandbox.timeout_ms = (secs * 1000.0).round().max(0.0) as u64;
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if let Some(secs) = args.run_timeout {
        config.run_timeout_secs = Some(secs);
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(scratch) = &args.scratch {
        config.sandbox.scratch_root = Some(scratch.clone());
    }

    if let Some(name) = &args.toolchain {
        let builtin = BuiltinToolchain::from_name(name).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown toolchain '{}' (expected cc, gcc or clang)",
                name
            ))
        })?;
        config.toolchain.program = builtin.program().to_string();
        config.toolchain.args = builtin.args();
    }
    if let Some(cc) = &args.cc {
        config.toolchain.program = cc.clone();
    }
    if !args.cflags.is_empty() {
        let mut toolchain_args = args.cflags.clone();
        toolchain_args.append(&mut config.toolchain.args);
        config.toolchain.args = toolchain_args;
    }
    if let Some(secs) = args.build_timeout {
        config.toolchain.timeout_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

async fn cmd_run(args: &RunArgs) -> Result<u8> {
    let config = resolve_config(args)?;
    let format = config.format;

    info!(
        root = %config.root.display(),
        toolchain = %config.toolchain.program,
        jobs = config.jobs,
        "Running featcheck"
    );

    let report = Harness::new(config)
        .run()
        .await
        .context("featcheck run aborted")?;

    let rendered = report
        .render(format)
        .context("Failed to render report")?;

    match &args.output {
        Some(path) => {
            write_report(path, &rendered)?;
            println!("{}", report.summary_line());
            println!(
                "Status: {}",
                if report.success { "✓ PASSED" } else { "✗ FAILED" }
            );
            println!("Report written to {}", path.display());
        }
        None => print!("{}", ensure_trailing_newline(rendered)),
    }

    Ok(report.exit_code() as u8)
}

fn cmd_list(root: Option<PathBuf>, categories: Vec<String>) -> Result<u8> {
    let root = root.unwrap_or_else(|| HarnessConfig::default().root);
    let exemplars = Registry::new(root)
        .with_categories(categories)
        .discover()
        .map_err(|e| anyhow::Error::new(HarnessError::from(e)))?;

    for exemplar in &exemplars {
        let fixture = if exemplar.checks_stdout() {
            format!("stdout, exit {}", exemplar.expected_exit)
        } else {
            format!("exit {} only", exemplar.expected_exit)
        };
        println!(
            "{:<40} {:<10} {}",
            exemplar.id, exemplar.category, fixture
        );
    }
    println!();
    println!("{} exemplar(s)", exemplars.len());

    Ok(0)
}

fn write_report(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, ensure_trailing_newline(rendered.to_string()))
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

fn ensure_trailing_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
