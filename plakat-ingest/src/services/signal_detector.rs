//! QR code and link detection from event poster images
//!
//! Decodes machine-readable codes from the poster and pulls URL-like
//! strings out of the decoded payloads. Decoding runs over several
//! preprocessed variants of the source image and merges the results,
//! deduplicated by payload. Detection never fails the pipeline: any image
//! or decode problem is logged and yields empty results.

use image::GrayImage;
use imageproc::contrast::{adaptive_threshold, otsu_level, threshold};
use imageproc::filter::gaussian_blur_f32;
use regex::RegexBuilder;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Top-level domain fragments of German-speaking regions
const GERMAN_TLDS: &[&str] = &[".de", ".at", ".ch"];

/// Candidate URL patterns applied to free text
const URL_PATTERNS: &[&str] = &[
    // Standard HTTP/HTTPS URLs
    r"https?://(?:[-\w.])+(?::\d+)?(?:/(?:[\w/_.])*(?:\?(?:[\w&=%.])*)?(?:#(?:\w*))?)?",
    // German domain patterns
    r"www\.[\w\-]+\.(?:de|com|org|net|info)",
    // Email addresses
    r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
];

/// Signal detection errors (internal; `detect` recovers from all of them)
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Could not load image: {0}")]
    ImageLoad(String),
}

/// Detects QR codes and URLs from event poster images
pub struct SignalDetector {
    url_patterns: Vec<regex::Regex>,
    domain_pattern: Option<regex::Regex>,
}

impl SignalDetector {
    pub fn new() -> Self {
        let url_patterns = URL_PATTERNS
            .iter()
            .filter_map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .collect();

        // Bare-domain shape, e.g. "www.example.de"
        let domain_pattern =
            regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.\-]*\.[A-Za-z]{2,}$").ok();

        Self {
            url_patterns,
            domain_pattern,
        }
    }

    /// Detect QR codes and URLs from an image.
    ///
    /// Returns (decoded payloads, URL candidates). Never raises: on any
    /// processing failure both lists are empty and the failure is logged.
    pub fn detect(&self, image_path: &Path) -> (Vec<String>, Vec<String>) {
        let qr_codes = match self.decode_qr_codes(image_path) {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!(path = %image_path.display(), error = %e, "QR detection failed");
                return (Vec::new(), Vec::new());
            }
        };

        // Pull URLs out of the decoded payloads
        let mut urls = Vec::new();
        for payload in &qr_codes {
            for url in self.extract_urls(payload) {
                push_unique(&mut urls, url);
            }
        }

        (qr_codes, urls)
    }

    /// Decode QR codes across all preprocessing variants, deduplicated by payload
    fn decode_qr_codes(&self, image_path: &Path) -> Result<Vec<String>, DetectError> {
        let image =
            image::open(image_path).map_err(|e| DetectError::ImageLoad(e.to_string()))?;
        let gray = image.to_luma8();

        let mut payloads = Vec::new();
        for variant in preprocess_variants(&gray) {
            for payload in decode_variant(&variant) {
                if push_unique(&mut payloads, payload.clone()) {
                    debug!(payload = %payload, "QR code detected");
                }
            }
        }

        Ok(payloads)
    }

    /// Extract URL candidates from text using the pattern set.
    ///
    /// A candidate is kept if it parses as an absolute URL or looks like a
    /// bare domain; everything else (including plain email matches) is
    /// dropped.
    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        let mut urls = Vec::new();

        for pattern in &self.url_patterns {
            for candidate in pattern.find_iter(text) {
                let candidate = candidate.as_str();
                let is_domain = self
                    .domain_pattern
                    .as_ref()
                    .is_some_and(|pattern| pattern.is_match(candidate));
                if Url::parse(candidate).is_ok() || is_domain {
                    push_unique(&mut urls, candidate.to_string());
                }
            }
        }

        urls
    }

    /// Filter and repair URL candidates, German-region domains first.
    ///
    /// Well-formed absolute URLs pass unchanged. A candidate containing a
    /// German-region TLD fragment is repaired by prefixing `https://` when
    /// that yields a well-formed URL. Ordering is stable apart from the
    /// German-first partition.
    pub fn validate_german_urls(&self, urls: &[String]) -> Vec<String> {
        let mut valid = Vec::new();

        for url in urls {
            if Url::parse(url).is_ok() {
                valid.push(url.clone());
            } else if is_german_region(url)
                && !url.starts_with("http://")
                && !url.starts_with("https://")
            {
                let fixed = format!("https://{}", url);
                if Url::parse(&fixed).is_ok() {
                    valid.push(fixed);
                }
            }
        }

        valid.sort_by_key(|url| !is_german_region(url));
        valid
    }
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Append a value if the list does not already contain it
fn push_unique(list: &mut Vec<String>, value: String) -> bool {
    if list.contains(&value) {
        false
    } else {
        list.push(value);
        true
    }
}

fn is_german_region(url: &str) -> bool {
    let lower = url.to_lowercase();
    GERMAN_TLDS.iter().any(|tld| lower.contains(tld))
}

/// Build the preprocessing variants decoded for QR codes:
/// grayscale original, Otsu binary threshold, adaptive threshold,
/// and Gaussian blur + Otsu threshold.
fn preprocess_variants(gray: &GrayImage) -> Vec<GrayImage> {
    let mut variants = vec![gray.clone()];

    let level = otsu_level(gray);
    variants.push(threshold(gray, level));

    variants.push(adaptive_threshold(gray, 5));

    let blurred = gaussian_blur_f32(gray, 1.0);
    let blurred_level = otsu_level(&blurred);
    variants.push(threshold(&blurred, blurred_level));

    variants
}

/// Decode all QR grids found in one image variant
fn decode_variant(image: &GrayImage) -> Vec<String> {
    let (width, height) = image.dimensions();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            image.get_pixel(x as u32, y as u32)[0]
        });

    let mut payloads = Vec::new();
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => payloads.push(content),
            Err(e) => debug!(error = %e, "QR grid decode failed"),
        }
    }
    payloads
}
