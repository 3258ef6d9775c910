//! Configuration for the poster ingest pipeline
//!
//! Provides pipeline defaults plus API credential resolution with
//! CLI flag → environment priority.

use plakat_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Default vision model identifier
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default messages endpoint for the vision model
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Largest accepted image dimension before downscaling
pub const MAX_IMAGE_DIMENSION: u32 = 1568;

/// User agent sent with enrichment page fetches
pub const PAGE_FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// API credential for the vision model
    pub api_key: String,
    /// Vision model identifier
    pub model: String,
    /// Messages endpoint URL
    pub api_base_url: String,
    /// Simultaneous whole-poster pipelines
    pub max_concurrent_posters: usize,
    /// Simultaneous page fetches within one enrichment call
    pub max_concurrent_fetches: usize,
    /// Per-request timeout for enrichment page fetches
    pub fetch_timeout: Duration,
    /// Timeout for vision model requests
    pub model_timeout: Duration,
    /// Largest image dimension sent to the model
    pub max_image_dimension: u32,
    /// JPEG re-encode quality
    pub jpeg_quality: u8,
    /// User agent for page fetches
    pub user_agent: String,
    /// Whether the enrichment phase runs at all
    pub enrichment_enabled: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_concurrent_posters: 3,
            max_concurrent_fetches: 5,
            fetch_timeout: Duration::from_secs(10),
            model_timeout: Duration::from_secs(120),
            max_image_dimension: MAX_IMAGE_DIMENSION,
            jpeg_quality: 85,
            user_agent: PAGE_FETCH_USER_AGENT.to_string(),
            enrichment_enabled: true,
        }
    }
}

/// Resolve the vision model API key.
///
/// **Priority:** CLI flag → `ANTHROPIC_API_KEY` → `CLAUDE_API_KEY`
pub fn resolve_api_key(cli_key: Option<String>) -> Result<String> {
    let env_key = std::env::var("ANTHROPIC_API_KEY").ok();
    let legacy_env_key = std::env::var("CLAUDE_API_KEY").ok();

    let mut sources = Vec::new();
    if cli_key.as_deref().is_some_and(is_valid_key) {
        sources.push("command line");
    }
    if env_key.as_deref().is_some_and(is_valid_key) {
        sources.push("ANTHROPIC_API_KEY");
    }
    if legacy_env_key.as_deref().is_some_and(is_valid_key) {
        sources.push("CLAUDE_API_KEY");
    }

    if sources.len() > 1 {
        warn!(
            "API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (key, source) in [
        (cli_key, "command line"),
        (env_key, "environment variable ANTHROPIC_API_KEY"),
        (legacy_env_key, "environment variable CLAUDE_API_KEY"),
    ] {
        if let Some(key) = key {
            if is_valid_key(&key) {
                info!("API key loaded from {}", source);
                return Ok(key);
            }
        }
    }

    Err(Error::Config(
        "API key not configured. Provide one of:\n\
         1. Command line: --api-key your-key-here\n\
         2. Environment: ANTHROPIC_API_KEY=your-key-here"
            .to_string(),
    ))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
