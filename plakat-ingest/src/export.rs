//! Record export: JSON, flattened CSV, and batch summary
//!
//! Thin I/O wrappers around the canonical record. JSON keeps the full
//! nested structure with nulls preserved; CSV flattens one record to a
//! single row, joining nested lists with "; ".

use crate::services::workflow_orchestrator::BatchOutcome;
use plakat_common::models::EventRecord;
use plakat_common::{Error, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// CSV header of the flattened record
const CSV_FIELDS: &[&str] = &[
    "veranstaltungsname",
    "kategorie",
    "beschreibung",
    "veranstaltungsort",
    "adresse",
    "stadt",
    "postleitzahl",
    "bundesland",
    "beginn",
    "ende",
    "kostenlos",
    "preis",
    "vorverkauf",
    "abendkasse",
    "veranstalter",
    "telefon",
    "email",
    "website",
    "vertrauenswuerdigkeit",
    "erkannte_links",
    "erkannte_qr_codes",
    "kuenstler",
];

/// Write the full record as pretty-printed JSON, nulls preserved
pub fn write_json(record: &EventRecord, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Internal(format!("JSON serialization failed: {}", e)))?;
    std::fs::write(path, json)?;

    info!(path = %path.display(), "Record exported as JSON");
    Ok(())
}

/// Write the record as one flattened CSV row
pub fn write_csv(record: &EventRecord, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| Error::Internal(format!("CSV writer failed: {}", e)))?;
    writer
        .write_record(CSV_FIELDS)
        .and_then(|_| writer.write_record(flatten(record)))
        .and_then(|_| writer.flush().map_err(csv::Error::from))
        .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;

    info!(path = %path.display(), "Record exported as CSV");
    Ok(())
}

/// Flatten a record into the CSV column order
fn flatten(record: &EventRecord) -> Vec<String> {
    let opt = |value: &Option<String>| value.clone().unwrap_or_default();
    let num = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    let time = |value: &Option<chrono::NaiveDateTime>| {
        value.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string()).unwrap_or_default()
    };

    vec![
        record.name.clone(),
        record.category.as_str().to_string(),
        opt(&record.description),
        opt(&record.location.venue),
        opt(&record.location.address),
        opt(&record.location.city),
        opt(&record.location.postal_code),
        opt(&record.location.state),
        time(&record.schedule.start),
        time(&record.schedule.end),
        record.pricing.free.to_string(),
        num(record.pricing.price),
        num(record.pricing.advance_price),
        num(record.pricing.box_office_price),
        opt(&record.metadata.contact.organizer),
        opt(&record.metadata.contact.phone),
        opt(&record.metadata.contact.email),
        opt(&record.metadata.contact.website),
        record.metadata.confidence.to_string(),
        record.detected_links.join("; "),
        record.detected_qr_codes.join("; "),
        record
            .metadata
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    ]
}

/// Write the batch summary: totals, category distribution, average
/// confidence, and the embedded records.
pub fn write_batch_summary(outcome: &BatchOutcome, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
    let mut confidence_sum = 0.0f32;
    for (_, record) in &outcome.results {
        *categories.entry(record.category.as_str()).or_insert(0) += 1;
        confidence_sum += record.metadata.confidence;
    }

    let average_confidence = if outcome.results.is_empty() {
        0.0
    } else {
        confidence_sum / outcome.results.len() as f32
    };

    let success_rate = if outcome.total == 0 {
        0.0
    } else {
        outcome.results.len() as f64 / outcome.total as f64
    };

    let summary = json!({
        "run_id": outcome.run_id,
        "total_analyzed": outcome.total,
        "successful_extractions": outcome.results.len(),
        "failed": outcome.failed,
        "success_rate": success_rate,
        "categories": categories,
        "average_confidence": average_confidence,
        "events": outcome.results.iter().map(|(_, record)| record).collect::<Vec<_>>(),
    });

    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| Error::Internal(format!("JSON serialization failed: {}", e)))?;
    std::fs::write(path, json)?;

    info!(path = %path.display(), "Batch summary exported");
    Ok(())
}
