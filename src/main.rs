use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use theseus::client::{ApiClient, ClientConfig};
use theseus::dedup::{self, DedupGate};
use theseus::pipeline::{run_pipeline, PipelineOptions, Shutdown};
use theseus::sink::OutputSinks;
use theseus::stats::RunStats;
use theseus::{config, input};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "theseus")]
#[command(about = "Trace who introduced external links on Wikipedia and profile those editors")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full scan-resolve-enrich pipeline
    Trace(TraceArgs),
    /// Sort and deduplicate the admitted-user log in place
    CompactUsers(CompactArgs),
}

#[derive(Args)]
struct TraceArgs {
    /// CSV of wiki editions; needs a "Language Code" column
    #[arg(short, long)]
    languages: String,

    /// Single-column CSV of target domains, no header
    #[arg(short, long)]
    domains: String,

    /// Output directory for the three CSV streams and the user log
    #[arg(short, long)]
    output: String,

    /// Concurrency budget shared by all remote-call types
    #[arg(long, default_value_t = config::DEFAULT_MAX_WORKERS)]
    max_workers: usize,

    /// Recent contributions fetched per discovered user
    #[arg(long, default_value_t = config::DEFAULT_CONTRIB_LIMIT)]
    contrib_limit: u32,

    /// Revisions examined per page before the scan reports truncation
    #[arg(long, default_value_t = config::DEFAULT_SCAN_DEPTH)]
    scan_depth: u32,

    /// API endpoint template; `{lang}` is replaced per task
    #[arg(long, default_value = config::DEFAULT_API_TEMPLATE)]
    api_template: String,

    /// Resume: skip users already admitted in a previous run
    #[arg(long)]
    resume: bool,

    /// Clear existing outputs before starting
    #[arg(long)]
    clean: bool,
}

#[derive(Args)]
struct CompactArgs {
    /// Output directory containing the admitted-user log
    #[arg(short, long)]
    output: String,
}

fn run_trace(args: TraceArgs) -> Result<()> {
    if args.max_workers == 0 {
        bail!("--max-workers must be at least 1");
    }

    // All input problems surface here, before any work is dispatched
    let languages = input::read_language_codes(Path::new(&args.languages))?;
    let domains = input::read_domains(Path::new(&args.domains))?;
    if languages.is_empty() {
        bail!("Language file {} contains no language codes", args.languages);
    }
    if domains.is_empty() {
        bail!("Domain file {} contains no domains", args.domains);
    }
    let tasks = input::build_tasks(&languages, &domains);

    let output_dir = PathBuf::from(&args.output);
    if args.clean && output_dir.exists() {
        info!("Cleaning output directory: {}", args.output);
        fs::remove_dir_all(&output_dir)
            .with_context(|| format!("Failed to clean output directory: {}", args.output))?;
    }
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {}", args.output))?;

    let sinks = Arc::new(OutputSinks::open(&output_dir)?);
    let gate = Arc::new(DedupGate::open(
        &output_dir.join(config::USER_LOG_FILE),
        args.resume && !args.clean,
    )?);
    let client = Arc::new(ApiClient::new(ClientConfig {
        api_template: args.api_template.clone(),
        max_workers: args.max_workers,
        ..ClientConfig::default()
    })?);
    let stats = Arc::new(RunStats::new());

    info!(
        languages = languages.len(),
        domains = domains.len(),
        tasks = tasks.len(),
        max_workers = args.max_workers,
        "Starting trace"
    );

    let options = PipelineOptions {
        max_workers: args.max_workers,
        contrib_limit: args.contrib_limit,
        scan_depth: args.scan_depth,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("theseus-worker")
        .enable_io()
        .enable_time()
        .build()?;

    let start = Instant::now();
    rt.block_on(async {
        let shutdown = Shutdown::new();
        let signal_flag = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, draining in-flight work");
                signal_flag.trigger();
            }
        });

        run_pipeline(
            client.clone(),
            tasks,
            sinks,
            gate.clone(),
            stats.clone(),
            options,
            shutdown,
        )
        .await
    })?;
    let elapsed = start.elapsed();

    print_summary(&stats, &client, gate.len(), elapsed);
    Ok(())
}

fn print_summary(
    stats: &RunStats,
    client: &ApiClient,
    distinct_users: usize,
    elapsed: Duration,
) {
    println!();
    println!("=== Summary ===");
    println!("Total time:           {:.2}s", elapsed.as_secs_f64());
    println!("API requests:         {}", client.stats().requests());
    println!("Request retries:      {}", client.stats().retries());
    println!();
    println!("Pages discovered:     {}", stats.pages());
    println!("Links resolved:       {}", stats.resolved());
    println!("Scans truncated:      {}", stats.truncated());
    println!("Links vanished:       {}", stats.vanished());
    println!();
    println!("Distinct users:       {}", distinct_users);
    println!("Users admitted:       {}", stats.admitted());
    println!("Duplicates skipped:   {}", stats.suppressed());
    println!("Users enriched:       {}", stats.enriched());
    println!("Contributions saved:  {}", stats.contributions());
    println!();
    println!("Failed tasks:         {}", stats.failed_tasks());
    println!("Failed resolutions:   {}", stats.resolve_failed());
    println!("Failed profiles:      {}", stats.profile_failed());
    println!("Failed contributions: {}", stats.contrib_failed());
}

fn run_compact(args: CompactArgs) -> Result<()> {
    let log_path = Path::new(&args.output).join(config::USER_LOG_FILE);
    if !log_path.exists() {
        bail!(
            "No user log found at {log_path:?}.\n\
             Run 'theseus trace' first."
        );
    }

    let summary = dedup::compact(&log_path)?;
    println!(
        "Compacted {} log lines into {} unique users",
        summary.total_lines, summary.unique_keys
    );
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
        Commands::Trace(args) => run_trace(args),
        Commands::CompactUsers(args) => run_compact(args),
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
