mod engine;
mod listing;
mod paths;
mod pool;
mod report;
mod sync;
mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;

use crate::engine::{DEFAULT_JOBS, DEFAULT_OP_TIMEOUT, Engine, EngineConfig};
use crate::listing::ListingClient;
use crate::paths::SyncPaths;
use crate::report::RunReport;

#[derive(Parser)]
#[command(
    name = "ghsync",
    about = "Mirror every GitHub repository you can access into a local directory tree"
)]
struct Cli {
    /// Target directory (defaults to ~/github)
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Number of repositories to sync concurrently
    #[arg(short, long, default_value_t = DEFAULT_JOBS)]
    jobs: usize,

    /// GitHub token (falls back to the GITHUB_TOKEN environment variable)
    #[arg(long)]
    token: Option<String>,

    /// Per-git-operation timeout in seconds
    #[arg(long, default_value_t = DEFAULT_OP_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Emit the run report as JSON instead of a text summary
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let Some(token) = cli.token.or_else(|| std::env::var("GITHUB_TOKEN").ok()) else {
        eprintln!("Error: no GitHub token (pass --token or set GITHUB_TOKEN)");
        std::process::exit(2);
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("interrupt received, finishing in-flight repositories");
        cancel_handler.store(true, Ordering::Relaxed);
    }) {
        log::warn!("could not install interrupt handler: {}", e);
    }

    let descriptors = match ListingClient::new(token).list_accessible(&cancel) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let target_root = cli
        .target
        .unwrap_or_else(|| SyncPaths::default().root().to_path_buf());

    let engine = Engine::new(
        EngineConfig {
            target_root,
            jobs: cli.jobs,
            op_timeout: Duration::from_secs(cli.timeout_secs),
        },
        cancel,
    );
    let report = engine.run(descriptors);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: could not encode report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print_summary(&report);
    }

    if report.has_failures() {
        std::process::exit(1);
    }
}

fn print_summary(report: &RunReport) {
    let counts = &report.counts;
    println!(
        "Synced {} repositories: {} cloned, {} updated, {} skipped, {} failed",
        counts.total(),
        counts.cloned,
        counts.updated,
        counts.skipped,
        counts.failed
    );

    if !report.has_failures() {
        return;
    }

    println!();
    println!("{:<40} {}", "FAILED REPO", "REASON");
    println!("{}", "-".repeat(80));
    for outcome in report.failures() {
        println!(
            "{:<40} {}",
            outcome.repo.to_string(),
            outcome.action.reason().unwrap_or_default()
        );
    }
}
