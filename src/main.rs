//! Skoob export CLI - exports the read shelf of a Skoob account to CSV.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use skoob_export::config::Config;
use skoob_export::console::Console;
use skoob_export::enrich::{DetailEnricher, LayeredExtractor};
use skoob_export::export;
use skoob_export::listing::{CollectionLister, HttpListingSource};
use skoob_export::record::merge_all;
use skoob_export::session::{self, AuthSession};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exports the books on your Skoob "read" shelf to a CSV file.
#[derive(Parser, Debug)]
#[command(name = "skoob-export")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose logging and a raw dump of the listing responses.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);
    let console = Console::new();

    console.section("Skoob Export - Bookshelf Exporter");

    console.step("Loading configuration...");
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    console.success("Configuration loaded");
    if let Ok(path) = Config::config_path() {
        console.info(&format!("Config file: {}", console.path(&path)));
    }

    let (session, window) = session::acquire(&config, &console)
        .await
        .context("Failed to acquire an authenticated session")?;

    let result = run(&config, &console, &session, args.debug).await;
    if let Some(window) = window {
        window.close().await;
    }
    let path = result?;

    console.section("Done!");
    console.info(&format!("Open {} in your spreadsheet or import it elsewhere.", console.path(&path)));
    Ok(())
}

/// Lists, enriches, merges and exports. Returns the export path.
async fn run(
    config: &Config,
    console: &Console,
    session: &AuthSession,
    debug: bool,
) -> Result<PathBuf> {
    console.step("Fetching bookshelf...");
    let source = HttpListingSource::new(
        &config.listing,
        &session.token,
        session.user_id.as_deref(),
    )
    .context("Failed to set up the listing client")?;
    let collection = CollectionLister::new(&source, &config.listing).collect().await;

    console.success(&format!(
        "Found {} books on {} pages",
        console.count(collection.entries.len()),
        collection.pages_fetched
    ));
    match source.user_id() {
        Some(user_id) => console.info(&format!("User id: {}", user_id)),
        None => console.warning("User id unknown; the listing may be empty."),
    }

    if debug {
        match export::write_debug_dump(
            &config.export.output_directory,
            &collection.debug_document(),
            Local::now(),
        ) {
            Ok(path) => console.info(&format!("Raw listing saved to {}", console.path(&path))),
            Err(e) => console.warning(&format!("Could not write debug dump: {}", e)),
        }
    }

    let details = if collection.entries.is_empty() {
        console.warning("No books found; the export will contain only the header row.");
        Vec::new()
    } else {
        console.step(&format!(
            "Fetching book details with {} workers...",
            config.enrich.workers
        ));
        let extractor = LayeredExtractor::skoob();
        let enricher = DetailEnricher::new(session, &extractor, &config.enrich);
        let progress = |done: usize, total: usize| {
            console.progress_update(&console.enrich_progress(done, total));
        };
        let details = enricher.enrich(&collection.entries, &progress).await;
        console.progress_done();

        let enriched = details.iter().filter(|d| !d.is_empty()).count();
        console.success(&format!(
            "Enriched {} of {} books",
            console.count(enriched),
            collection.entries.len()
        ));
        details
    };

    console.step("Writing CSV...");
    let records = merge_all(&collection.entries, &details);
    let path = export::export_records(&records, &config.export, Local::now())
        .context("Failed to write the export file")?;
    console.success(&format!(
        "Exported {} books to {}",
        console.count(records.len()),
        console.path(&path)
    ));

    Ok(path)
}

/// Sets up diagnostic logging on stderr. `RUST_LOG` takes precedence.
fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,skoob_export={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
