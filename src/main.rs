//! fiberloom - CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fiberloom::util::config::{load_config, Config};
use fiberloom::util::logger::{self, LogLevel};
use fiberloom::{run_counter, run_list, DemoReport, NAME, VERSION};

/// Cooperative scheduler and fiber reconciler demos
#[derive(Parser, Debug)]
#[command(name = "fiberloom")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mount a counter and click it
    Counter {
        /// Number of clicks
        #[arg(short = 'n', long, default_value_t = 3)]
        clicks: usize,
    },

    /// Reorder a keyed list and print the host operations
    List {
        /// Initial keys, comma separated
        #[arg(long, value_delimiter = ',', default_value = "a,b,c,d")]
        from: Vec<String>,

        /// Final keys, comma separated
        #[arg(long, value_delimiter = ',', default_value = "d,a,c,e")]
        to: Vec<String>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };
    let config = config.with_env().context("Failed to apply environment overrides")?;
    logger::init_with_level(if args.verbose { LogLevel::Debug } else { config.log.level });

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("frame interval: {}ms", config.scheduler.frame_interval_ms);
    }

    let report = match args.command {
        Commands::Counter { clicks } => run_counter(config.scheduler, clicks).context("counter demo failed")?,
        Commands::List { from, to } => run_list(config.scheduler, &from, &to).context("list demo failed")?,
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
            return Ok(());
        }
    };

    print_report(&report, args.json)
}

fn print_report(
    report: &DemoReport,
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}", report.markup);
    for op in &report.ops {
        println!("  {:?}", op);
    }
    println!(
        "commits: {}, last: {} placed, {} deleted, {} updated",
        report.commits, report.last_commit.placements, report.last_commit.deletions, report.last_commit.updates
    );
    Ok(())
}
