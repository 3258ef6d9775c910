//! Quality scorer for extracted event records
//!
//! Assesses record completeness across seven fixed factors and feeds the
//! resulting score into the consolidated confidence recalculation. Runs
//! once per record, after enrichment (or directly after extraction when
//! enrichment is skipped).

use crate::confidence::{self, EvidenceSummary};
use plakat_common::models::{Category, EventRecord};
use tracing::info;

/// Number of completeness factors assessed
pub const FACTOR_COUNT: usize = 7;

/// Completeness assessment result
#[derive(Debug, Clone)]
pub struct QualityReport {
    /// Quality score: factors present / 7
    pub score: f32,
    /// Labels of the factors that were present
    pub factors: Vec<&'static str>,
}

/// Quality Scorer
///
/// Counts how many of seven completeness factors hold:
/// event name, location, datetime, pricing, contact channel,
/// QR/URL evidence, and a category other than the catch-all.
#[derive(Debug, Default)]
pub struct QualityScorer;

impl QualityScorer {
    pub fn new() -> Self {
        Self
    }

    /// Assess record completeness without touching the record
    pub fn assess(&self, record: &EventRecord) -> QualityReport {
        let mut factors = Vec::new();

        // Required field; the schema guarantees it is non-empty
        if !record.name.trim().is_empty() {
            factors.push("event_name");
        }

        if record.location.venue.is_some() || record.location.address.is_some() {
            factors.push("location");
        }

        if record.schedule.start.is_some() {
            factors.push("datetime");
        }

        if record.pricing.free || record.pricing.price.is_some() {
            factors.push("pricing");
        }

        let contact = &record.metadata.contact;
        if contact.phone.is_some() || contact.email.is_some() || contact.website.is_some() {
            factors.push("contact");
        }

        if !record.detected_qr_codes.is_empty() || !record.detected_links.is_empty() {
            factors.push("sources");
        }

        if record.category != Category::Andere {
            factors.push("category");
        }

        let score = factors.len() as f32 / FACTOR_COUNT as f32;

        QualityReport { score, factors }
    }

    /// Assess the record and fold the quality score into its confidence
    pub fn apply(&self, record: &mut EventRecord) -> QualityReport {
        let report = self.assess(record);

        record.metadata.confidence = confidence::recalculate(
            record.metadata.confidence,
            &EvidenceSummary {
                merged_signals: 0,
                quality: Some(report.score),
            },
        );

        info!(
            quality_score = report.score,
            factors = %report.factors.join(", "),
            confidence = record.metadata.confidence,
            "Quality assessment complete"
        );

        report
    }
}
