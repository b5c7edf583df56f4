//! sourcemap-check: runs source map fixtures through bun and `svelte/compiler`.

mod cli;

use bun_runner::BunRunner;
use clap::Parser;
use cli::Args;
use miette::{miette, IntoDiagnostic, Result};
use sourcemap_check::orchestrator::{build_filter, discover, run_fixtures, RunOptions};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sourcemap_check=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let bun_path = args
        .bun
        .clone()
        .or_else(|| BunRunner::find_bun(Some(args.workspace.as_path())))
        .ok_or_else(|| miette!("bun not found; install it or pass --bun"))?;
    let runner = BunRunner::new(bun_path, args.workspace.clone()).into_diagnostic()?;

    let filter = build_filter(&args.filter).into_diagnostic()?;
    let fixtures = discover(&args.fixtures, filter.as_ref()).into_diagnostic()?;
    info!(count = fixtures.len(), root = %args.fixtures, "discovered fixtures");

    let options = RunOptions {
        jobs: args.jobs,
        persist: !args.no_persist,
    };
    let summary = run_fixtures(fixtures, Arc::new(runner), options)
        .await
        .into_diagnostic()?;

    for (name, error) in &summary.failed {
        eprintln!("FAIL {name}: {error}");
    }
    println!(
        "{} passed, {} failed, {} skipped",
        summary.passed.len(),
        summary.failed.len(),
        summary.skipped.len()
    );

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
