//! CLI for the source patch engine.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use source_patch::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "srcpatch")]
#[command(author, version, about = "Safe, idempotent source patching", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run rules over the configured roots
    Run(RunArgs),

    /// Re-validate every modified file of a prior report
    Lint {
        /// Report written by a previous apply run
        report: PathBuf,

        /// Configuration file (YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Validator timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List registered rules
    Rules,
}

#[derive(Args)]
#[group(id = "mode", required = true, multiple = false)]
struct ModeArgs {
    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,

    /// Write changes with backup and validation
    #[arg(long)]
    apply: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    mode: ModeArgs,

    /// Rule id to run (repeatable); every default rule when omitted
    #[arg(short, long = "rule")]
    rules: Vec<String>,

    /// Directory to scan (repeatable); overrides the configured roots
    #[arg(long = "root")]
    roots: Vec<PathBuf>,

    /// Re-drive the files of a prior report instead of walking
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the run report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the colorized diff of every changed file
    #[arg(long)]
    diff: bool,

    /// Keep the patched file when validation fails
    #[arg(long)]
    no_restore: bool,

    /// Validator timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// File extension to include (repeatable); overrides the configured list
    #[arg(short, long = "ext")]
    extensions: Vec<String>,

    /// Glob pattern a file must match (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Glob pattern to exclude (repeatable)
    #[arg(long)]
    exclude: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Lint {
            report,
            config,
            timeout,
        } => cmd_lint(&report, config.as_deref(), timeout),
        Commands::Rules => cmd_rules(),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let usage = e
                .downcast_ref::<PatchError>()
                .is_some_and(PatchError::is_usage);
            ExitCode::from(if usage { 2 } else { 1 })
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "source_patch=debug"
    } else {
        "source_patch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let config = EngineConfig::discover(path, &cwd).context("Failed to load configuration")?;
    Ok(config)
}

fn cmd_run(args: RunArgs) -> Result<u8> {
    let mut config = load_config(args.config.as_deref())?;
    if !args.roots.is_empty() {
        config.roots = args.roots;
    }
    if !args.extensions.is_empty() {
        config.extensions = args
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
    }
    config.include.extend(args.include);
    config.exclude.extend(args.exclude);
    if let Some(report) = args.report {
        config.report_path = report;
    }
    if args.no_restore {
        config.restore_on_failure = false;
    }
    if let Some(secs) = args.timeout {
        config.validator_timeout_secs = secs;
    }

    let mode = if args.mode.apply {
        RunMode::Apply
    } else {
        RunMode::DryRun
    };
    let report_path = config.report_path.clone();
    let registry_path = config.registry_path();

    let mut patcher = Patcher::new(config)
        .rules(args.rules)
        .mode(mode)
        .registry(registry_path);

    if let Some(input) = &args.input {
        let prior = RunReport::load(input).context("Failed to read input report")?;
        patcher = patcher.from_report(&prior);
    }

    let result = patcher.run().context("Run failed")?;

    if args.diff && !result.changes.is_empty() {
        println!("{}", result.colorized_diff());
        println!("{}\n", result.diff_summary());
    }

    println!("{}", result.report.summary());
    for entry in result.report.results.iter().filter(|r| r.status.is_failure()) {
        println!(
            "  {} [{}] {}: {}",
            entry.status,
            entry.rule,
            entry.path.display(),
            entry.diagnostic.as_deref().unwrap_or("")
        );
    }
    if let Some(gate) = &result.gate {
        print_gate(gate);
    }

    result
        .report
        .save(&report_path)
        .with_context(|| format!("Failed to write report {}", report_path.display()))?;
    println!("Report written to {}", report_path.display());

    Ok(result.exit_code())
}

fn cmd_lint(report: &Path, config: Option<&Path>, timeout: Option<u64>) -> Result<u8> {
    let mut config = load_config(config)?;
    if let Some(secs) = timeout {
        config.validator_timeout_secs = secs;
    }
    config.validate().context("Invalid configuration")?;

    let report = RunReport::load(report).context("Failed to read report")?;
    let validators = ValidatorRegistry::from_config(&config);
    let gate = lint_report(&report, &validators);
    print_gate(&gate);

    Ok(u8::from(!gate.passed()))
}

fn print_gate(gate: &GateResult) {
    println!(
        "Re-validated {} file(s): {} failed",
        gate.checked,
        gate.failures.len()
    );
    for (path, diagnostic) in &gate.failures {
        println!("  {}: {}", path.display(), diagnostic.trim());
    }
}

fn cmd_rules() -> Result<u8> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let config = load_config(None)?;
    let registry = RuleRegistry::new(&config.rules, &cwd).context("Invalid rule settings")?;
    println!("Registered rules:");
    for rule in registry.all() {
        let opt_in = if rule.runs_by_default() { "" } else { " (opt-in)" };
        println!("  {:<24} {}{}", rule.id(), rule.description(), opt_in);
    }
    Ok(0)
}
