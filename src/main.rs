//! RegionRunner CLI Entry Point
//!
//! Provides command-line interface for pipeline execution.
//!
//! # Usage
//!
//! ```bash
//! # Run every region through suitability
//! regionrunner
//!
//! # Preview what would run
//! regionrunner --dry-run
//!
//! # Limit parallelism and throttle a shared resource
//! regionrunner --cores 8 --resources openeo_req=1
//!
//! # Rerun exclusion for one region, regardless of markers
//! regionrunner --region Beijing --until exclusion --forceall
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::{error, info};

use regionrunner::execution::{Engine, RunSummary};
use regionrunner::workflow::config::{load_config, parse_resource_limit, DEFAULT_CONFIG_PATH};
use regionrunner::workflow::Target;
use regionrunner::{APP_NAME, VERSION};

#[derive(Parser, Debug)]
#[command(name = "regionrunner")]
#[command(version)]
#[command(about = "Marker-driven runner for the per-region suitability pipeline", long_about = None)]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory that holds data/ and the stage scripts
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,

    /// Maximum number of cores used by running jobs
    #[arg(short = 'j', long)]
    cores: Option<usize>,

    /// Limit for a named resource, e.g. api_calls=1 (repeatable)
    #[arg(long, value_name = "NAME=N", value_parser = parse_resource_limit)]
    resources: Vec<(String, usize)>,

    /// Print the jobs that would run without executing them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Rerun every selected job regardless of its marker
    #[arg(short = 'F', long)]
    forceall: bool,

    /// Stop after this stage (spatial_data_prep, exclusion, suitability, or all)
    #[arg(long, value_name = "STAGE", default_value = "all")]
    until: Target,

    /// Only process this region (repeatable)
    #[arg(long = "region", value_name = "REGION")]
    regions: Vec<String>,

    /// List jobs and their marker status, then exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Regional Suitability Pipeline Runner");
    println!();
}

/// Prints the end-of-run summary.
fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    if summary.nothing_to_do() {
        println!(
            "{} all {} markers are up to date",
            "Nothing to be done:".green(),
            summary.total
        );
        return;
    }

    let verb = if dry_run { "would run" } else { "executed" };
    println!(
        "{} {} jobs {}, {} up to date ({:.1}s)",
        "Done:".green().bold(),
        summary.executed.len(),
        verb,
        summary.skipped,
        summary.elapsed.as_secs_f64()
    );
    println!(
        "Started {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S")
    );

    if !dry_run {
        print!("{}", summary.timeline.gantt_chart());
    }
}

/// Main application entry point.
fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    print_banner();

    info!("Loading configuration: {}", cli.config.display());
    let config = load_config(&cli.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let mut engine = Engine::new(config);

    if let Some(dir) = cli.working_dir {
        if !dir.is_dir() {
            return Err(format!("Working directory does not exist: {}", dir.display()).into());
        }
        engine.set_working_dir(dir);
    }
    info!("Working directory: {}", engine.working_dir().display());

    if let Some(cores) = cli.cores {
        engine.set_cores(cores);
    }
    for (name, limit) in cli.resources {
        engine.set_resource_limit(name, limit);
    }
    engine.set_target(cli.until);
    engine.set_regions(cli.regions);
    engine.set_force(cli.forceall);
    engine.set_dry_run(cli.dry_run);

    if cli.list {
        for report in engine.list_jobs()? {
            let status = if report.up_to_date {
                "up to date".green()
            } else {
                "pending".yellow()
            };
            println!(
                "{:<40} {:<12} {}",
                report.id,
                status,
                report.marker.display()
            );
        }
        return Ok(());
    }

    if cli.dry_run {
        info!("Mode: DRY RUN (stage scripts will not execute)");
    }

    let summary = engine.run()?;
    print_summary(&summary, cli.dry_run);

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
