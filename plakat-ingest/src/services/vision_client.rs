//! Vision model client for event poster analysis
//!
//! Sends the poster image plus locally detected signals to the vision
//! model and parses its JSON reply into a canonical [`EventRecord`]. All
//! failure modes (unreadable image, transport error, malformed reply,
//! schema rejection) collapse to "no record produced"; nothing is retried
//! here.

use crate::config::IngestConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use plakat_common::models::{EventRecord, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_REPLY_TOKENS: u32 = 2000;
// Low-randomness decoding for consistent JSON output
const TEMPERATURE: f32 = 0.1;

/// Vision client errors
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Could not load image: {0}")]
    ImageLoad(String),

    #[error("Could not encode image: {0}")]
    ImageEncode(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Reply contained no text block")]
    EmptyReply,

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Reply violates schema: {0}")]
    Schema(#[from] SchemaError),
}

// ── Messages API request/response ──

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'a str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

/// Vision model client for analyzing event posters
pub struct VisionClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_dimension: u32,
    jpeg_quality: u8,
}

impl VisionClient {
    pub fn new(config: &IngestConfig) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.model_timeout)
            .build()
            .map_err(|e| VisionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.api_base_url.clone(),
            max_dimension: config.max_image_dimension,
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Analyze an event poster.
    ///
    /// Returns the extracted record, or `None` on any failure (logged).
    pub async fn analyze_poster(
        &self,
        image_path: &Path,
        qr_codes: &[String],
        urls: &[String],
    ) -> Option<EventRecord> {
        let image_data = match self.prepare_image(image_path) {
            Ok(data) => data,
            Err(e) => {
                error!(path = %image_path.display(), error = %e, "Image preparation failed");
                return None;
            }
        };

        let prompt = build_prompt(qr_codes, urls);

        let reply = match self.invoke(&image_data, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(path = %image_path.display(), error = %e, "Vision model call failed");
                return None;
            }
        };

        match Self::parse_reply(&reply, qr_codes, urls) {
            Ok(record) => {
                info!(event = %record.name, "Successfully parsed event");
                Some(record)
            }
            Err(e) => {
                error!(path = %image_path.display(), error = %e, "Reply parsing failed");
                debug!(reply = %reply, "Raw model reply");
                None
            }
        }
    }

    /// Load, normalize and base64-encode the poster image.
    ///
    /// Converts to RGB, downscales so the largest dimension stays within
    /// the model's limit, and re-encodes as JPEG.
    fn prepare_image(&self, image_path: &Path) -> Result<String, VisionError> {
        let image =
            image::open(image_path).map_err(|e| VisionError::ImageLoad(e.to_string()))?;

        let image = if image.width().max(image.height()) > self.max_dimension {
            image.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
        } else {
            image
        };

        let rgb = image.to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| VisionError::ImageEncode(e.to_string()))?;

        Ok(BASE64.encode(&buffer))
    }

    /// Send the image + instruction and return the reply's text content
    async fn invoke(&self, image_data: &str, prompt: &str) -> Result<String, VisionError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_REPLY_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![RequestMessage {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type: "image/jpeg",
                            data: image_data,
                        },
                    },
                    ContentBlock::Text { text: prompt },
                ],
            }],
        };

        let response = self
            .http_client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Api(status.as_u16(), body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| VisionError::MalformedReply(e.to_string()))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .ok_or(VisionError::EmptyReply)
    }

    /// Parse the model reply into a validated record.
    ///
    /// Slices the reply from the first `{` to the last `}` to discard any
    /// prose wrapper, decodes it as JSON, overlays the locally detected
    /// evidence (overriding same-named keys from the model), and runs the
    /// schema validation step.
    pub fn parse_reply(
        reply: &str,
        qr_codes: &[String],
        urls: &[String],
    ) -> Result<EventRecord, VisionError> {
        let start = reply
            .find('{')
            .ok_or_else(|| VisionError::MalformedReply("no JSON object in reply".to_string()))?;
        let end = reply
            .rfind('}')
            .filter(|&end| end >= start)
            .ok_or_else(|| VisionError::MalformedReply("no JSON object in reply".to_string()))?;

        let mut value: serde_json::Value = serde_json::from_str(&reply[start..=end])
            .map_err(|e| VisionError::MalformedReply(e.to_string()))?;

        if !qr_codes.is_empty() {
            value["erkannte_qr_codes"] = json!(qr_codes);
        }
        if !urls.is_empty() {
            value["erkannte_links"] = json!(urls);
        }

        let mut record: EventRecord = serde_json::from_value(value)
            .map_err(|e| VisionError::MalformedReply(e.to_string()))?;

        record.validate()?;
        Ok(record)
    }

    /// Confirm the API credential is usable with a minimal text-only request.
    ///
    /// Called once at startup, before any poster is processed.
    pub async fn validate_api_key(&self) -> bool {
        let request = json!({
            "model": self.model,
            "max_tokens": 10,
            "messages": [{"role": "user", "content": "Test"}],
        });

        let result = self
            .http_client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                error!(
                    status = response.status().as_u16(),
                    "API key validation failed"
                );
                false
            }
            Err(e) => {
                error!(error = %e, "API key validation failed");
                false
            }
        }
    }
}

/// Build the German extraction instruction, embedding the JSON schema and
/// any locally detected signals as hints.
fn build_prompt(qr_codes: &[String], urls: &[String]) -> String {
    let mut additional_info = String::new();
    if !qr_codes.is_empty() {
        additional_info.push_str(&format!(
            "\n\nErkannte QR-Codes: {}",
            qr_codes.join(", ")
        ));
    }
    if !urls.is_empty() {
        additional_info.push_str(&format!("\n\nErkannte URLs: {}", urls.join(", ")));
    }

    format!(
        r#"
Analysiere dieses deutsche Veranstaltungsplakat und extrahiere alle Event-Informationen.
Gib die Daten im folgenden exakten JSON-Format zurück:

{{
    "veranstaltungsname": "Name der Veranstaltung (PFLICHT)",
    "ort": {{
        "veranstaltungsort": "Name der Location",
        "adresse": "Straße und Hausnummer",
        "stadt": "Stadt",
        "postleitzahl": "5-stellige PLZ",
        "bundesland": "Deutsches Bundesland"
    }},
    "termine": {{
        "beginn": "YYYY-MM-DDTHH:MM:SS (ISO format)",
        "ende": "YYYY-MM-DDTHH:MM:SS (optional)",
        "einlass": "YYYY-MM-DDTHH:MM:SS (optional)"
    }},
    "preise": {{
        "kostenlos": false,
        "preis": 25.50,
        "waehrung": "EUR",
        "vorverkauf": 20.00,
        "abendkasse": 25.50
    }},
    "beschreibung": "Event-Beschreibung vom Plakat",
    "kategorie": "musik|comedy|essen|party|theater|sport|workshop|festival|kultur|andere",
    "metadaten": {{
        "kuenstler": [
            {{"name": "Künstlername", "info": "Zusatzinfo über Künstler"}}
        ],
        "ticketinfo": {{
            "verkaufsstellen": ["Verkaufsstelle 1", "Verkaufsstelle 2"],
            "online_links": ["https://tickets.example.com"],
            "telefon": "Telefonnummer für Tickets"
        }},
        "kontakt": {{
            "veranstalter": "Name des Veranstalters",
            "telefon": "Kontakt-Telefon",
            "email": "kontakt@example.de",
            "website": "https://example.de"
        }},
        "quellen": ["Quellenangaben"],
        "vertrauenswuerdigkeit": 0.85
    }}
}}{additional_info}

WICHTIGE REGELN:
1. Gib NUR gültiges JSON zurück, keine zusätzlichen Texte
2. Verwende null für fehlende Werte, nicht leere Strings
3. Datums-/Zeitangaben immer im ISO-Format (YYYY-MM-DDTHH:MM:SS)
4. Deutsche Telefonnummern im Format +49 oder mit Vorwahl
5. Preise als Zahlen, nicht als Strings
6. Bei unklaren Kategorien verwende "andere"
7. Vertrauenswürdigkeit zwischen 0.0 und 1.0
8. Extrahiere ALLE sichtbaren Informationen vom Plakat
"#
    )
}
