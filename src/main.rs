mod callgraph;
mod context;
mod engine;
mod error;
mod eval;
mod ir;
mod parameter;
mod report;
mod rules;
mod scan;
mod sequence;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::callgraph::MAX_SEARCH_DEPTH;
use crate::engine::{EngineConfig, RuleEngine, evaluate_rules};
use crate::report::{build_invocation, build_json, build_sarif};
use crate::rules::load::load_rules;
use crate::scan::scan_input;
use crate::sequence::SequenceMode;

/// Output document written to `--output`.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Sarif,
    Json,
}

/// CLI arguments for dexsieve execution.
#[derive(Parser, Debug)]
#[command(
    name = "dexsieve",
    about = "Score behavioral rules against a disassembled Android application.",
    version
)]
struct Cli {
    /// Disassembly snapshot (JSON).
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Rule file or directory of rule files.
    #[arg(long, value_name = "PATH")]
    rules: PathBuf,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Sarif)]
    format: OutputFormat,
    /// Caller layers searched for a common caller.
    #[arg(long, default_value_t = MAX_SEARCH_DEPTH, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    max_depth: usize,
    #[arg(long, value_enum, default_value_t = SequenceMode::Loose)]
    sequence: SequenceMode,
    /// Evaluate rules on all cores.
    #[arg(long)]
    parallel: bool,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn init_logging(verbose: bool) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("dexsieve=debug")
    } else {
        EnvFilter::new("dexsieve=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_line_number(true)
        .with_writer(io::stderr)
        .init();

    debug!(verbose, "logging initialized");
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    if !cli.rules.exists() {
        anyhow::bail!("rules not found: {}", cli.rules.display());
    }

    let started_at = Instant::now();
    let scan = scan_input(&cli.input)?;
    let rules = load_rules(&cli.rules)?;
    let config = EngineConfig {
        max_depth: cli.max_depth,
        sequence_mode: cli.sequence,
    };
    let engine = RuleEngine::new(&scan.context, config);
    info!(
        methods = scan.method_count,
        rules = rules.len(),
        parallel = cli.parallel,
        "evaluating rules"
    );
    let board = evaluate_rules(&engine, &rules, cli.parallel)?;

    let mut writer = output_writer(cli.output.as_deref())?;
    match cli.format {
        OutputFormat::Sarif => {
            let sarif = build_sarif(&board, build_invocation());
            serde_json::to_writer_pretty(&mut writer, &sarif)
                .context("failed to serialize SARIF output")?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &build_json(&board, config))
                .context("failed to serialize JSON output")?;
        }
    }
    writer
        .write_all(b"\n")
        .context("failed to write report output")?;

    if !cli.quiet {
        eprintln!(
            "{}: total_score={} total_weight={} rules={}",
            board.risk_level(),
            board.total_score,
            board.total_weight,
            board.reports.len()
        );
    }
    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} methods={} instructions={} rules={}",
            started_at.elapsed().as_millis(),
            scan.method_count,
            scan.instruction_count,
            rules.len()
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
