//! Poster analysis workflow orchestrator
//!
//! Drives one poster through all phases — local signal detection, primary
//! extraction, enrichment merge, quality pass — and fans out across a
//! batch with a bounded concurrency limit. A failing poster is logged and
//! absent from the results; it never aborts the batch.

use crate::config::IngestConfig;
use crate::services::{
    enrichment::MergeEngine, page_fetcher::PageFetcher, signal_detector::SignalDetector,
    vision_client::{VisionClient, VisionError},
};
use crate::validators::QualityScorer;
use futures::stream::{FuturesUnordered, StreamExt};
use plakat_common::models::EventRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Batch analysis outcome
#[derive(Debug)]
pub struct BatchOutcome {
    /// Batch run identifier (for log correlation)
    pub run_id: Uuid,
    /// Number of posters attempted
    pub total: usize,
    /// Successfully extracted records, paired with their poster path
    pub results: Vec<(PathBuf, EventRecord)>,
    /// Number of posters that yielded no record
    pub failed: usize,
}

/// Poster analysis orchestrator
pub struct PosterAnalyzer {
    config: IngestConfig,
    signal_detector: SignalDetector,
    vision_client: VisionClient,
    page_fetcher: PageFetcher,
    merge_engine: MergeEngine,
    quality_scorer: QualityScorer,
}

impl PosterAnalyzer {
    pub fn new(config: IngestConfig) -> Result<Self, VisionError> {
        let vision_client = VisionClient::new(&config)?;
        let page_fetcher = PageFetcher::new(&config);

        Ok(Self {
            config,
            signal_detector: SignalDetector::new(),
            vision_client,
            page_fetcher,
            merge_engine: MergeEngine::new(),
            quality_scorer: QualityScorer::new(),
        })
    }

    /// Confirm the configured API credential is usable.
    ///
    /// Must pass before any poster is processed; a failure here is fatal
    /// for the whole run.
    pub async fn validate_credential(&self) -> bool {
        self.vision_client.validate_api_key().await
    }

    /// Analyze a single poster image.
    ///
    /// Returns the enriched record, or `None` if no record could be
    /// extracted. All failures are handled here; nothing propagates.
    pub async fn analyze_poster(&self, image_path: &Path) -> Option<EventRecord> {
        if !image_path.exists() {
            error!(path = %image_path.display(), "Image file not found");
            return None;
        }

        info!(path = %image_path.display(), "Starting poster analysis");

        // Phase 1: QR code and URL detection
        let (qr_codes, raw_urls) = self.signal_detector.detect(image_path);
        let urls = self.signal_detector.validate_german_urls(&raw_urls);
        info!(
            qr_codes = qr_codes.len(),
            urls = urls.len(),
            "Local signal detection complete"
        );

        // Phase 2: Vision model extraction
        let mut record = self
            .vision_client
            .analyze_poster(image_path, &qr_codes, &urls)
            .await?;

        // Phase 3: Web enrichment
        if self.config.enrichment_enabled && !urls.is_empty() {
            self.enrich(&mut record, &urls).await;
        } else {
            debug!("Enrichment skipped (disabled or no URLs)");
        }

        // Phase 4: Quality assessment
        self.quality_scorer.apply(&mut record);

        info!(
            path = %image_path.display(),
            event = %record.name,
            confidence = record.metadata.confidence,
            "Poster analysis complete"
        );

        Some(record)
    }

    /// Fetch the detected URLs and merge their signals into the record.
    ///
    /// Per-page failures are already absorbed by the fetcher; an empty
    /// signal set leaves the record in its pre-enrichment state.
    async fn enrich(&self, record: &mut EventRecord, urls: &[String]) {
        let signals = self.page_fetcher.fetch_all(urls).await;
        self.merge_engine.merge(record, &signals);
        info!(
            pages = signals.len(),
            confidence = record.metadata.confidence,
            "Enrichment merge complete"
        );
    }

    /// Analyze a batch of posters concurrently.
    ///
    /// Pipelines are bounded by the configured poster concurrency limit.
    /// A poster that fails (or panics) is counted and logged; the batch
    /// always runs to completion.
    pub async fn analyze_batch(self: &Arc<Self>, image_paths: &[PathBuf]) -> BatchOutcome {
        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            posters = image_paths.len(),
            max_concurrent = self.config.max_concurrent_posters,
            "Starting batch analysis"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_posters));
        let mut tasks = FuturesUnordered::new();

        for path in image_paths {
            let analyzer = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let record = analyzer.analyze_poster(&path).await;
                if record.is_none() {
                    warn!(path = %path.display(), "Poster yielded no record");
                }
                record.map(|record| (path, record))
            }));
        }

        let mut results = Vec::new();
        let mut failed = 0;
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => failed += 1,
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "Poster analysis task aborted");
                }
            }
        }

        info!(
            run_id = %run_id,
            successful = results.len(),
            failed,
            "Batch analysis complete"
        );

        BatchOutcome {
            run_id,
            total: image_paths.len(),
            results,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_analyzer() -> Arc<PosterAnalyzer> {
        let config = IngestConfig {
            api_key: "test-key".to_string(),
            ..IngestConfig::default()
        };
        Arc::new(PosterAnalyzer::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_missing_poster_yields_none() {
        let analyzer = test_analyzer();
        let record = analyzer
            .analyze_poster(Path::new("/nonexistent/poster.jpg"))
            .await;
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_batch_failures_never_abort_batch() {
        let analyzer = test_analyzer();
        let paths = vec![
            PathBuf::from("/nonexistent/a.jpg"),
            PathBuf::from("/nonexistent/b.jpg"),
            PathBuf::from("/nonexistent/c.jpg"),
        ];

        let outcome = analyzer.analyze_batch(&paths).await;

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.failed, 3);
        assert!(outcome.results.is_empty());
    }
}
