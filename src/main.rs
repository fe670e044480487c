use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use clio::broker::{Broker, FactWriter, ProgressObserver};
use clio::config::PROGRESS_INTERVAL;
use clio::emit::{EmitterPolicy, LineSink, RankFilter, UnresolvedPolicy};
use clio::pipeline::{self, PipelineOptions};
use clio::registry::{PropertyRegistry, SiteRegistry};
use clio::stats::RunStats;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "clio")]
#[command(about = "Extract timestamped facts from Wikibase full-history dumps")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract facts from a pages-meta-history dump
    Extract(ExtractArgs),
    /// Parse a dump end to end without writing facts
    Check(CheckArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to the history dump (.xml, .xml.bz2, or .xml.gz)
    #[arg(short, long)]
    input: PathBuf,

    /// Output fact file
    #[arg(short, long)]
    output: PathBuf,

    /// Property registry CSV (property,predicate,datatype)
    #[arg(long)]
    properties: Option<PathBuf>,

    /// MediaWiki sites table dump (.sql or .sql.gz)
    #[arg(long)]
    sites: Option<PathBuf>,

    /// Skip label facts
    #[arg(long)]
    no_labels: bool,

    /// Skip description facts
    #[arg(long)]
    no_descriptions: bool,

    /// Skip alias facts
    #[arg(long)]
    no_aliases: bool,

    /// Skip sitelink facts
    #[arg(long)]
    no_sitelinks: bool,

    /// Emit only the best-ranked statement group per property
    #[arg(long)]
    best_rank_only: bool,

    /// Drop statements whose property is missing from the registry
    #[arg(long)]
    skip_unresolved: bool,

    /// Limit number of revisions to process (for testing)
    #[arg(long)]
    limit: Option<u64>,

    /// Treat recoverable revision errors as fatal
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// Path to the history dump (.xml, .xml.bz2, or .xml.gz)
    #[arg(short, long)]
    input: PathBuf,

    /// Limit number of revisions to process
    #[arg(long)]
    limit: Option<u64>,

    /// Treat recoverable revision errors as fatal
    #[arg(long)]
    strict: bool,
}

fn load_registries(
    properties: Option<&PathBuf>,
    sites: Option<&PathBuf>,
) -> Result<(Arc<PropertyRegistry>, Arc<SiteRegistry>)> {
    let properties = match properties {
        Some(path) => {
            let registry = PropertyRegistry::from_csv(path)
                .with_context(|| format!("Failed to load property registry: {}", path.display()))?;
            info!(properties = registry.len(), "Loaded property registry");
            registry
        }
        None => {
            info!("No property registry given; statement values stay unresolved");
            PropertyRegistry::empty()
        }
    };

    let sites = match sites {
        Some(path) => {
            let registry = SiteRegistry::from_sql_dump(path)
                .with_context(|| format!("Failed to load sites table: {}", path.display()))?;
            info!(sites = registry.len(), "Loaded site registry");
            registry
        }
        None => {
            info!("No sites table given; sitelinks stay unresolved");
            SiteRegistry::empty()
        }
    };

    Ok((Arc::new(properties), Arc::new(sites)))
}

fn print_summary(stats: &RunStats, elapsed: std::time::Duration) {
    println!();
    println!("=== Summary ===");
    println!("Total time:           {:.2}s", elapsed.as_secs_f64());
    println!();
    println!("Pages seen:           {}", stats.pages());
    println!("Revisions read:       {}", stats.revisions());
    println!("Revisions processed:  {}", stats.processed());
    println!("Facts emitted:        {}", stats.facts());
    println!("Malformed revisions:  {}", stats.malformed());
    println!("Truncated pages:      {}", stats.truncated());
    println!("Deserialize failures: {}", stats.deserialize_failures());
    println!("Redirect revisions:   {}", stats.redirects());
    println!("Unsupported models:   {}", stats.unsupported());
    println!("Registry misses:      {}", stats.misses());
    println!("Consistency warnings: {}", stats.warnings());
    println!("Revisions skipped:    {}", stats.skipped());
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let (properties, sites) = load_registries(args.properties.as_ref(), args.sites.as_ref())?;

    let policy = EmitterPolicy {
        include_labels: !args.no_labels,
        include_descriptions: !args.no_descriptions,
        include_aliases: !args.no_aliases,
        include_sitelinks: !args.no_sitelinks,
        rank_filter: if args.best_rank_only {
            RankFilter::BestRankOnly
        } else {
            RankFilter::All
        },
        unresolved: if args.skip_unresolved {
            UnresolvedPolicy::SkipStatement
        } else {
            UnresolvedPolicy::EmitLiteral
        },
    };

    let output = File::create(&args.output)
        .with_context(|| format!("Failed to create output file: {}", args.output.display()))?;
    let sink = LineSink::new(BufWriter::new(output));

    let stats = Arc::new(RunStats::new());
    let mut broker = Broker::new();
    broker.register(Box::new(ProgressObserver::new(PROGRESS_INTERVAL)));
    broker.register(Box::new(FactWriter::new(
        policy,
        properties,
        sites,
        Box::new(sink),
        Arc::clone(&stats),
    )));

    let start = Instant::now();
    pipeline::run(
        &args.input,
        PipelineOptions {
            limit: args.limit,
            strict: args.strict,
        },
        &mut broker,
        &stats,
    )?;

    print_summary(&stats, start.elapsed());
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<()> {
    let stats = Arc::new(RunStats::new());
    let mut broker = Broker::new();
    broker.register(Box::new(ProgressObserver::new(PROGRESS_INTERVAL)));

    let start = Instant::now();
    pipeline::run(
        &args.input,
        PipelineOptions {
            limit: args.limit,
            strict: args.strict,
        },
        &mut broker,
        &stats,
    )?;

    print_summary(&stats, start.elapsed());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Check(args) => run_check(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
