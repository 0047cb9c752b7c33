// Copyright 2026 Revharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Thin CLI over the acquisition engine: argument parsing, interactive
//! disambiguation, and JSON export. No engine logic lives here.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use revharvest::challenge::ConsolePrompt;
use revharvest::daterange::DateRange;
use revharvest::engine::{AcquisitionEngine, EngineConfig};
use revharvest::error::AcquireError;
use revharvest::export;
use revharvest::model::{ProductCandidate, Source};
use revharvest::session::BrowserSession;
use revharvest::source::adapter_for;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "revharvest",
    about = "Scrape B2B product reviews from G2 and Capterra",
    version
)]
struct Cli {
    /// Source platform (g2 or capterra)
    #[arg(long)]
    source: Source,

    /// Product name to search
    #[arg(long)]
    product: String,

    /// Start date (YYYY-MM-DD), inclusive
    #[arg(long)]
    start_date: NaiveDate,

    /// End date (YYYY-MM-DD), inclusive
    #[arg(long)]
    end_date: NaiveDate,

    /// Persistent browser profile directory
    #[arg(long, default_value = "chrome_profile")]
    profile_dir: PathBuf,

    /// Directory for the exported JSON file
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Maximum listing pages to fetch
    #[arg(long, default_value = "100")]
    max_pages: u32,

    /// Enable verbose/debug logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "revharvest=debug"
    } else {
        "revharvest=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let range = DateRange::new(cli.start_date, cli.end_date)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current page and unwinding");
            let _ = cancel_tx.send(true);
        }
    });

    let mut session = BrowserSession::launch(&cli.profile_dir).await?;
    let outcome = run(&mut session, &cli, &range, cancel_rx).await;
    if let Err(e) = session.close().await {
        warn!("session close failed: {e}");
    }
    outcome
}

async fn run(
    session: &mut BrowserSession,
    cli: &Cli,
    range: &DateRange,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let mut adapter = adapter_for(cli.source, session);
    let config = EngineConfig {
        walker: revharvest::walker::WalkerConfig {
            max_pages: cli.max_pages,
            ..Default::default()
        },
    };
    let mut engine = AcquisitionEngine::new(config, Box::new(ConsolePrompt), cancel);

    let result = match engine
        .acquire(adapter.as_mut(), &cli.product, range, None)
        .await
    {
        Ok(result) => result,
        Err(AcquireError::Ambiguous { candidates, .. }) => {
            let chosen = pick_candidate(&cli.product, &candidates)?;
            engine
                .acquire(adapter.as_mut(), &cli.product, range, Some(chosen))
                .await
                .map_err(|e| report_failure(e, cli, range))?
        }
        Err(e) => return Err(report_failure(e, cli, range)),
    };

    let path = export::output_path(&cli.out_dir, cli.source, &result.product_name, range);
    export::write_reviews(&path, &result.reviews)?;
    info!(
        reviews = result.reviews.len(),
        dropped = result.dropped,
        status = ?result.status,
        path = %path.display(),
        "done"
    );
    Ok(())
}

/// Interactive disambiguation when the query had no exact match.
fn pick_candidate(query: &str, candidates: &[ProductCandidate]) -> Result<ProductCandidate> {
    eprintln!("No exact match for \"{query}\". Candidates:");
    for (i, c) in candidates.iter().enumerate() {
        eprintln!("  {}. {} ({})", i + 1, c.display_name, c.url);
    }

    let mut rl = rustyline::DefaultEditor::new().context("failed to open prompt")?;
    let line = rl
        .readline(&format!("Select a product [1-{}]: ", candidates.len()))
        .context("selection aborted")?;
    let idx: usize = line.trim().parse().context("not a number")?;
    if idx == 0 || idx > candidates.len() {
        bail!("selection out of range");
    }
    Ok(candidates[idx - 1].clone())
}

/// Surface a terminal failure, exporting whatever was collected first.
fn report_failure(e: AcquireError, cli: &Cli, range: &DateRange) -> anyhow::Error {
    let partial = e.partial_reviews();
    if !partial.is_empty() {
        let path = export::output_path(&cli.out_dir, cli.source, &cli.product, range)
            .with_extension("partial.json");
        match export::write_reviews(&path, partial) {
            Ok(()) => info!(path = %path.display(), count = partial.len(), "partial reviews saved"),
            Err(w) => error!("failed to save partial reviews: {w}"),
        }
    }
    anyhow::anyhow!("{e}")
}
