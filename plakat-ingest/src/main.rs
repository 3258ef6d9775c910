//! plakat-ingest - Event Poster Extraction
//!
//! Extracts structured event data from German event poster images using a
//! three-stage pipeline: local QR/URL detection, vision model extraction,
//! and web-scraping enrichment of the extracted record.

use anyhow::{bail, Context, Result};
use clap::Parser;
use plakat_ingest::config::{self, IngestConfig};
use plakat_ingest::export;
use plakat_ingest::services::{FileScanner, PosterAnalyzer};
use plakat_common::models::EventRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for plakat-ingest
#[derive(Parser, Debug)]
#[command(name = "plakat-ingest")]
#[command(about = "Extract structured event data from German event poster images")]
#[command(version)]
struct Args {
    /// Poster image or directory of poster images
    path: PathBuf,

    /// API key for the vision model (falls back to ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Output directory for extracted records
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of posters analyzed concurrently
    #[arg(long, default_value = "3")]
    max_concurrent: usize,

    /// Disable web enrichment of extracted records
    #[arg(long)]
    no_enrichment: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "plakat_ingest=debug,plakat_common=debug"
    } else {
        "plakat_ingest=info,plakat_common=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tokio::select! {
        result = run(args) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Analysis interrupted");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let image_paths = FileScanner::new()
        .scan(&args.path)
        .with_context(|| format!("Could not resolve input path {}", args.path.display()))?;
    if image_paths.is_empty() {
        bail!("No poster images found in {}", args.path.display());
    }

    let api_key = config::resolve_api_key(args.api_key)?;
    let config = IngestConfig {
        api_key,
        max_concurrent_posters: args.max_concurrent,
        enrichment_enabled: !args.no_enrichment,
        ..IngestConfig::default()
    };

    info!("Initializing poster analyzer");
    let analyzer = Arc::new(PosterAnalyzer::new(config).context("Analyzer setup failed")?);
    if !analyzer.validate_credential().await {
        bail!("API credential rejected; aborting before processing any posters");
    }

    if image_paths.len() == 1 {
        let record = analyzer.analyze_poster(&image_paths[0]).await;
        match record {
            Some(record) => {
                log_record_summary(&record);
                if let Some(output) = &args.output {
                    export_record(&image_paths[0], &record, output)?;
                }
            }
            None => bail!(
                "Analysis failed for {} - no event data extracted",
                image_paths[0].display()
            ),
        }
        return Ok(());
    }

    let outcome = analyzer.analyze_batch(&image_paths).await;
    info!(
        successful = outcome.results.len(),
        skipped = outcome.failed,
        total = outcome.total,
        "Batch finished"
    );

    for (_, record) in &outcome.results {
        log_record_summary(record);
    }
    log_batch_statistics(&outcome.results);

    if let Some(output) = &args.output {
        for (path, record) in &outcome.results {
            export_record(path, record, output)?;
        }
        export::write_batch_summary(&outcome, &output.join("batch_summary.json"))?;
    }

    Ok(())
}

/// Write the per-poster JSON and CSV exports, named after the image stem
fn export_record(image_path: &Path, record: &EventRecord, output_dir: &Path) -> Result<()> {
    let stem = image_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("poster");

    export::write_json(record, &output_dir.join(format!("{}_analysis.json", stem)))?;
    export::write_csv(record, &output_dir.join(format!("{}_analysis.csv", stem)))?;
    Ok(())
}

fn log_record_summary(record: &EventRecord) {
    let price = if record.pricing.free {
        "kostenlos".to_string()
    } else {
        record
            .pricing
            .price
            .map(|p| format!("{:.2}€", p))
            .unwrap_or_else(|| "unbekannt".to_string())
    };

    info!(
        event = %record.name,
        venue = record.location.venue.as_deref().unwrap_or("unbekannt"),
        start = %record
            .schedule
            .start
            .map(|t| t.format("%d.%m.%Y %H:%M").to_string())
            .unwrap_or_else(|| "unbekannt".to_string()),
        price = %price,
        category = record.category.as_str(),
        confidence = record.metadata.confidence,
        qr_codes = record.detected_qr_codes.len(),
        urls = record.detected_links.len(),
        "Event extracted"
    );
}

fn log_batch_statistics(results: &[(PathBuf, EventRecord)]) {
    if results.is_empty() {
        return;
    }

    let prices: Vec<f64> = results
        .iter()
        .filter_map(|(_, record)| record.pricing.price)
        .collect();
    if !prices.is_empty() {
        let average = prices.iter().sum::<f64>() / prices.len() as f64;
        let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        info!(
            average = %format!("{:.2}", average),
            min = %format!("{:.2}", min),
            max = %format!("{:.2}", max),
            "Price statistics"
        );
    }

    let average_confidence = results
        .iter()
        .map(|(_, record)| record.metadata.confidence)
        .sum::<f32>()
        / results.len() as f32;
    info!(average_confidence, "Confidence statistics");
}
