//! bangumi-filter - run condition queries against a Bangumi archive dump
//!
//! Usage:
//!   bangumi-filter run --query filters.txt [--archive DIR] [--output PREFIX]
//!                      [--parallel] [--all-matches] [--config FILE] [--force]
//!   bangumi-filter check --query filters.txt
//!   bangumi-filter codes --type 书籍
//!
//! `--query -` reads the query from stdin.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bangumi_filter::codes::CodeTable;
use bangumi_filter::loader::Archive;
use bangumi_filter::report::ReportFiles;
use bangumi_filter::{parse_query, Config, Executor, ParsedQuery, SubjectType};

#[derive(Parser, Debug)]
#[command(name = "bangumi-filter", version, about = "Condition queries over Bangumi archive dumps")]
struct Cli {
    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a query and write `<prefix>.jsonlines` and `<prefix>.csv`
    Run(RunArgs),
    /// Parse a query and report problems without touching the archive
    Check {
        #[arg(short, long)]
        query: PathBuf,
    },
    /// Print the relation and staff-position tables of a subject type
    Codes {
        #[arg(short = 't', long = "type")]
        subject_type: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Query file, one condition per line
    #[arg(short, long)]
    query: PathBuf,

    /// Directory holding the archive dump
    #[arg(short, long)]
    archive: Option<PathBuf>,

    /// Output file prefix
    #[arg(short, long)]
    output: Option<String>,

    /// Evaluate subjects in parallel
    #[arg(long)]
    parallel: bool,

    /// Capture every matching relation, staff member and episode
    #[arg(long)]
    all_matches: bool,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overwrite existing output files
    #[arg(long)]
    force: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_query(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("failed to read query from stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read query file {}", path.display()))
}

fn load_query(path: &Path) -> Result<ParsedQuery> {
    let text = read_query(path)?;
    Ok(parse_query(&text))
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("invalid config file {}", path.display()))?,
        None => Config::default(),
    }
    .with_env_overrides();
    if let Some(archive) = args.archive {
        config.archive_dir = archive;
    }
    if let Some(output) = args.output {
        config.output_prefix = output;
    }
    config.parallel |= args.parallel;
    config.exhaustive |= args.all_matches;
    config.validate()?;

    let parsed = load_query(&args.query)?;
    if !parsed.errors.is_empty() {
        warn!("{} line(s) dropped from the query", parsed.errors.len());
    }
    let query = parsed.query;
    info!(conditions = query.len(), "query parsed");

    let archive = Archive::load(&config, query.requirements())
        .with_context(|| format!("failed to load archive from {}", config.archive_dir.display()))?;
    let executor = Executor::new(&query, &archive.indices, Some(&archive.records), config.eval_options())?;
    let mut report = ReportFiles::create(&config.jsonl_output(), &config.csv_output(), query.columns(), args.force)?;

    let stats = if config.parallel {
        let (entries, stats) = executor.run_parallel(archive.records.records());
        for entry in &entries {
            report.write(entry)?;
        }
        stats
    } else {
        let mut run = executor.run(&archive.records);
        for entry in run.by_ref() {
            report.write(&entry)?;
        }
        run.stats()
    };
    report.finish()?;

    if !stats.warnings.is_empty() {
        warn!(
            regex_fallbacks = stats.warnings.regex_fallbacks,
            unresolved_names = stats.warnings.unresolved_names,
            missing_targets = stats.warnings.missing_targets,
            missing_references = stats.warnings.missing_references,
            "evaluation warnings"
        );
    }
    println!("{} of {} subjects matched", stats.matched, stats.scanned);
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let parsed = load_query(path)?;
    for error in &parsed.errors {
        println!("{}", error);
    }

    let required = parsed.query.requirements();
    println!("{} condition(s) parsed", parsed.query.len());
    let mut dumps = vec!["subjects"];
    if required.relations {
        dumps.push("relations");
    }
    if required.staff {
        dumps.push("staff");
    }
    if required.episodes {
        dumps.push("episodes");
    }
    println!("needs: {}", dumps.join(", "));

    if !parsed.errors.is_empty() {
        bail!("{} line(s) failed to parse", parsed.errors.len());
    }
    Ok(())
}

fn codes(name: &str) -> Result<()> {
    let Some(subject_type) = SubjectType::from_name(name) else {
        bail!("unknown subject type '{}'", name);
    };
    println!("# {} ({}) relations", subject_type, subject_type.code());
    for (code, name) in CodeTable::relations(subject_type).entries() {
        println!("{}\t{}", code, name);
    }
    println!("\n# {} ({}) staff positions", subject_type, subject_type.code());
    for (code, name) in CodeTable::positions(subject_type).entries() {
        println!("{}\t{}", code, name);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args),
        Command::Check { query } => check(&query),
        Command::Codes { subject_type } => codes(&subject_type),
    }
}
