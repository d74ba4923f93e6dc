use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quarantiner::config::{Config, ConfigUpdate, ResolverKind};
use quarantiner::golang::{BuildGraph, Engine, GoList, TestTarget, WalkGraph};
use quarantiner::results::{commit_changes, write_results_to_files, Results};
use quarantiner::telemetry::init_tracing;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "quarantiner",
    about = "Quarantine and unquarantine flaky Go tests",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert the skip block at the top of each target test
    Quarantine(RunArgs),
    /// Remove the skip block from each target test
    Unquarantine(RunArgs),
    /// Show or update the saved defaults
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Default build flag for `go list` (repeatable; replaces the saved list)
    #[arg(long = "tags", value_name = "FLAG", allow_hyphen_values = true)]
    build_flags: Vec<String>,

    /// Forget the saved build flags
    #[arg(long, conflicts_with = "build_flags")]
    clear_tags: bool,

    /// Default package resolver
    #[arg(long, value_enum)]
    resolver: Option<ResolverArg>,

    /// Default skip reason (empty resets to the built-in one)
    #[arg(long)]
    skip_reason: Option<String>,

    /// Log as JSON lines by default
    #[arg(long)]
    log_json: Option<bool>,

    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Path to the repository (defaults to current directory)
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Target as PKG=TestA,TestB (repeatable)
    #[arg(short, long = "target", value_name = "PKG=TESTS")]
    targets: Vec<String>,

    /// JSON file holding [{"package": ..., "tests": [...]}, ...]
    #[arg(long, value_name = "FILE")]
    targets_file: Option<PathBuf>,

    /// Build flag passed to `go list`, e.g. -tags=integration (repeatable)
    #[arg(long = "tags", value_name = "FLAG", allow_hyphen_values = true)]
    build_flags: Vec<String>,

    /// Package resolver; overrides the config file
    #[arg(long, value_enum)]
    resolver: Option<ResolverArg>,

    /// Skip reason written into quarantined tests; overrides the config file
    #[arg(long)]
    skip_reason: Option<String>,

    /// Write modified files back to disk
    #[arg(short, long)]
    write: bool,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// GitHub owner for markdown permalinks
    #[arg(long, default_value = "")]
    owner: String,

    /// GitHub repository name for markdown permalinks
    #[arg(long, default_value = "")]
    name: String,

    /// Branch for markdown permalinks
    #[arg(long, default_value = "main")]
    branch: String,

    /// Also print the commit message for the changes
    #[arg(long)]
    commit_message: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ResolverArg {
    GoList,
    Walk,
}

impl From<ResolverArg> for ResolverKind {
    fn from(arg: ResolverArg) -> Self {
        match arg {
            ResolverArg::GoList => ResolverKind::GoList,
            ResolverArg::Walk => ResolverKind::Walk,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Text,
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (quarantine, run) = match args.command {
        Command::Quarantine(run) => (true, run),
        Command::Unquarantine(run) => (false, run),
        Command::Config(config) => return update_config(config),
    };

    let config = match &run.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let level = if run.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(run.log_json || config.log_json, level);

    let repo = run
        .repo
        .canonicalize()
        .with_context(|| format!("repository not found: {}", run.repo.display()))?;
    let targets = collect_targets(&run.targets, run.targets_file.as_deref())?;
    if targets.is_empty() {
        bail!("no targets given; use --target PKG=TestA,TestB or --targets-file");
    }

    let build_flags = if run.build_flags.is_empty() {
        config.build_flags.clone()
    } else {
        run.build_flags.clone()
    };
    let resolver = run.resolver.map(ResolverKind::from).unwrap_or(config.resolver);
    let graph: Arc<dyn BuildGraph> = match resolver {
        ResolverKind::GoList => Arc::new(GoList::default()),
        ResolverKind::Walk => Arc::new(WalkGraph),
    };

    let mut engine = Engine::new(graph);
    if let Some(reason) = run.skip_reason.clone().or(config.skip_reason.clone()) {
        engine = engine.with_skip_reason(reason);
    }

    let results = if quarantine {
        engine.quarantine_tests(&repo, targets, &build_flags).await?
    } else {
        engine.unquarantine_tests(&repo, targets, &build_flags).await?
    };

    print_report(&results, &run)?;

    if run.write {
        write_results_to_files(&results).context("failed to write modified files")?;
    }
    Ok(())
}

fn update_config(args: ConfigArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let build_flags = if args.clear_tags {
        Some(Vec::new())
    } else {
        Some(args.build_flags).filter(|flags| !flags.is_empty())
    };
    config.update(ConfigUpdate {
        build_flags,
        resolver: args.resolver.map(ResolverKind::from),
        skip_reason: args.skip_reason,
        log_json: args.log_json,
    });

    let location = match &args.config {
        Some(path) => {
            config.save_to(path).map_err(anyhow::Error::msg)?;
            path.display().to_string()
        }
        None => {
            config.save().map_err(anyhow::Error::msg)?;
            Config::config_location()
        }
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    eprintln!("  + Saved to {}", location);
    Ok(())
}

fn collect_targets(specs: &[String], file: Option<&Path>) -> Result<Vec<TestTarget>> {
    let mut targets = Vec::new();
    for spec in specs {
        let Some(target) = TestTarget::parse(spec) else {
            bail!("invalid target {:?}; expected PKG=TestA,TestB", spec);
        };
        targets.push(target);
    }
    if let Some(path) = file {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let listed: Vec<TestTarget> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse targets in {}", path.display()))?;
        targets.extend(listed);
    }
    Ok(targets)
}

fn print_report(results: &Results, run: &RunArgs) -> Result<()> {
    match run.format {
        Format::Text => print!("{}", results),
        Format::Markdown => print!("{}", results.markdown(&run.owner, &run.name, &run.branch)),
        Format::Json => println!("{}", serde_json::to_string_pretty(results)?),
    }

    if run.commit_message {
        let (message, files) = commit_changes(results);
        println!();
        print!("{}", message);
        if run.format == Format::Text && !files.is_empty() {
            println!();
            for path in files.keys() {
                println!("  modified: {}", path);
            }
        }
    }
    Ok(())
}
