//! Miruken release automation
//!
//! The `miruken-release` command runs one release of the repository checked
//! out at `repositoryPath`:
//!
//! - run the test suite
//! - resolve the semantic version with GitVersion
//! - push an annotated `v<version>` tag
//! - notify dependent repositories through `repository_dispatch`
//!
//! All inputs come from the environment (see `miruken_release_core::domain::config::names`).

use anyhow::{Context, Result};
use clap::Parser;
use miruken_release_ci::{ReleaseOrchestrator, ReleaseServices, RunResult};
use miruken_release_core::EnvSnapshot;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "miruken-release")]
#[command(author = "Miruken")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test, version, tag and announce a Miruken release", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines and print the run result as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    miruken_release_core::init_tracing(cli.json, level);

    let result = ReleaseOrchestrator::new()
        .run(&EnvSnapshot::from_process(), ReleaseServices::production)
        .await;

    if cli.json {
        let rendered = result
            .to_json()
            .context("Failed to serialize release result")?;
        println!("{rendered}");
    } else {
        report(&result);
    }
    Ok(ExitCode::from(result.exit_code()))
}

fn report(result: &RunResult) {
    match result {
        RunResult::Success(summary) => {
            info!(
                run_id = %summary.run_id,
                tag = %summary.tag,
                delivered = summary.dispatch.delivered_count(),
                skipped = summary.dispatch.skipped_count(),
                "Released {}",
                summary.tag
            );
            for failed in &summary.tolerated_failures {
                info!(target_repo = %failed.target, reason = %failed.reason, "Tolerated dispatch failure");
            }
        }
        RunResult::Failure { stage, error, .. } => {
            eprintln!("release failed during {stage}: {error}");
        }
    }
}
