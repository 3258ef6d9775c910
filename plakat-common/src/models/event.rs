//! Canonical event record extracted from German event posters
//!
//! The record is constructed once from the vision model's JSON reply and
//! validated in a single pass (`EventRecord::validate`). Later pipeline
//! stages only ever fill fields that are still empty; they never replace
//! the record or overwrite populated fields.
//!
//! JSON field names stay German so serialized records match the schema the
//! model is prompted with.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema violations detected when constructing a record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Event name missing or empty (the one required field)
    #[error("event name is missing or empty")]
    MissingName,

    /// Postal code must be exactly 5 digits
    #[error("postal code must be exactly 5 digits: {0}")]
    InvalidPostalCode(String),

    /// End time precedes start time
    #[error("end time precedes start time")]
    EndBeforeStart,

    /// Negative price
    #[error("price must be non-negative: {0}")]
    NegativePrice(String),
}

/// German event categories (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Musik,
    Comedy,
    Essen,
    Party,
    Theater,
    Sport,
    Workshop,
    Festival,
    Kultur,
    #[default]
    Andere,
}

impl Category {
    /// Serialized form (lowercase German tag)
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Musik => "musik",
            Category::Comedy => "comedy",
            Category::Essen => "essen",
            Category::Party => "party",
            Category::Theater => "theater",
            Category::Sport => "sport",
            Category::Workshop => "workshop",
            Category::Festival => "festival",
            Category::Kultur => "kultur",
            Category::Andere => "andere",
        }
    }
}

/// Event location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Venue name
    #[serde(rename = "veranstaltungsort")]
    pub venue: Option<String>,
    /// Street address (street + house number)
    #[serde(rename = "adresse")]
    pub address: Option<String>,
    /// City name
    #[serde(rename = "stadt")]
    pub city: Option<String>,
    /// German postal code (5 digits)
    #[serde(rename = "postleitzahl")]
    pub postal_code: Option<String>,
    /// German state
    #[serde(rename = "bundesland")]
    pub state: Option<String>,
}

/// Event timing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Event start time
    #[serde(rename = "beginn")]
    pub start: Option<NaiveDateTime>,
    /// Event end time (never before start)
    #[serde(rename = "ende")]
    pub end: Option<NaiveDateTime>,
    /// Door opening time
    #[serde(rename = "einlass")]
    pub doors_open: Option<NaiveDateTime>,
}

/// Event pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Free admission flag
    #[serde(rename = "kostenlos", default)]
    pub free: bool,
    /// Regular ticket price
    #[serde(rename = "preis")]
    pub price: Option<f64>,
    /// Currency code
    #[serde(rename = "waehrung", default = "default_currency")]
    pub currency: String,
    /// Advance sale price
    #[serde(rename = "vorverkauf")]
    pub advance_price: Option<f64>,
    /// Box office price
    #[serde(rename = "abendkasse")]
    pub box_office_price: Option<f64>,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            free: false,
            price: None,
            currency: default_currency(),
            advance_price: None,
            box_office_price: None,
        }
    }
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// Performer entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    /// Artist name
    pub name: String,
    /// Additional artist information
    pub info: Option<String>,
}

/// Ticket sales information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketInfo {
    /// Ticket outlets
    #[serde(rename = "verkaufsstellen", default)]
    pub outlets: Vec<String>,
    /// Online ticket links
    #[serde(rename = "online_links", default)]
    pub online_links: Vec<String>,
    /// Phone number for tickets
    #[serde(rename = "telefon")]
    pub phone: Option<String>,
}

/// Contact information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Event organizer
    #[serde(rename = "veranstalter")]
    pub organizer: Option<String>,
    /// Contact phone
    #[serde(rename = "telefon")]
    pub phone: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Website URL
    pub website: Option<String>,
}

/// Event metadata: performers, tickets, contacts, provenance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Performers
    #[serde(rename = "kuenstler", default)]
    pub artists: Vec<Artist>,
    /// Ticket information
    #[serde(rename = "ticketinfo", default)]
    pub ticket_info: TicketInfo,
    /// Contact details
    #[serde(rename = "kontakt", default)]
    pub contact: Contact,
    /// Source identifiers contributing evidence (no duplicates)
    #[serde(rename = "quellen", default)]
    pub sources: Vec<String>,
    /// Confidence score, always clamped to [0.0, 1.0]
    #[serde(rename = "vertrauenswuerdigkeit", default)]
    pub confidence: f32,
}

/// Canonical event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event name (required, never empty)
    #[serde(rename = "veranstaltungsname")]
    pub name: String,
    /// Location information
    #[serde(rename = "ort", default)]
    pub location: Location,
    /// Event timing
    #[serde(rename = "termine", default)]
    pub schedule: Schedule,
    /// Pricing information
    #[serde(rename = "preise", default)]
    pub pricing: Pricing,
    /// Event description from the poster
    #[serde(rename = "beschreibung", default)]
    pub description: Option<String>,
    /// Event category
    #[serde(rename = "kategorie", default)]
    pub category: Category,
    /// Additional metadata
    #[serde(rename = "metadaten", default)]
    pub metadata: Metadata,
    /// URLs detected on the poster
    #[serde(rename = "erkannte_links", default)]
    pub detected_links: Vec<String>,
    /// Decoded QR payloads detected on the poster
    #[serde(rename = "erkannte_qr_codes", default)]
    pub detected_qr_codes: Vec<String>,
    /// Language code
    #[serde(rename = "sprache", default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "de".to_string()
}

impl EventRecord {
    /// Create a minimal record with just a name; everything else defaulted
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: Location::default(),
            schedule: Schedule::default(),
            pricing: Pricing::default(),
            description: None,
            category: Category::default(),
            metadata: Metadata::default(),
            detected_links: Vec::new(),
            detected_qr_codes: Vec::new(),
            language: default_language(),
        }
    }

    /// Validate the record against the canonical schema, in one pass.
    ///
    /// Invariant checks are hard failures; confidence is clamped and the
    /// source list deduplicated rather than rejected. Called exactly once,
    /// when the record is constructed from the model reply; later stages
    /// assume a valid record.
    pub fn validate(&mut self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::MissingName);
        }

        if let Some(plz) = &self.location.postal_code {
            if plz.len() != 5 || !plz.chars().all(|c| c.is_ascii_digit()) {
                return Err(SchemaError::InvalidPostalCode(plz.clone()));
            }
        }

        if let (Some(start), Some(end)) = (self.schedule.start, self.schedule.end) {
            if end < start {
                return Err(SchemaError::EndBeforeStart);
            }
        }

        for price in [
            self.pricing.price,
            self.pricing.advance_price,
            self.pricing.box_office_price,
        ]
        .into_iter()
        .flatten()
        {
            if price < 0.0 {
                return Err(SchemaError::NegativePrice(price.to_string()));
            }
        }

        self.metadata.confidence = self.metadata.confidence.clamp(0.0, 1.0);

        let mut seen = Vec::with_capacity(self.metadata.sources.len());
        self.metadata.sources.retain(|source| {
            if seen.contains(source) {
                false
            } else {
                seen.push(source.clone());
                true
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn datetime(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut record = EventRecord::new("  ");
        assert_eq!(record.validate(), Err(SchemaError::MissingName));
    }

    #[test]
    fn test_postal_code_five_digits_accepted() {
        let mut record = EventRecord::new("Konzert");
        record.location.postal_code = Some("80331".to_string());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_postal_code_wrong_length_rejected() {
        for plz in ["8033", "803312", "8033a"] {
            let mut record = EventRecord::new("Konzert");
            record.location.postal_code = Some(plz.to_string());
            assert_eq!(
                record.validate(),
                Err(SchemaError::InvalidPostalCode(plz.to_string())),
                "PLZ {:?} should be rejected",
                plz
            );
        }
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut record = EventRecord::new("Konzert");
        record.schedule.start = Some(datetime(20));
        record.schedule.end = Some(datetime(18));
        assert_eq!(record.validate(), Err(SchemaError::EndBeforeStart));
    }

    #[test]
    fn test_end_equal_to_start_accepted() {
        let mut record = EventRecord::new("Konzert");
        record.schedule.start = Some(datetime(20));
        record.schedule.end = Some(datetime(20));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut record = EventRecord::new("Konzert");
        record.pricing.advance_price = Some(-5.0);
        assert!(matches!(
            record.validate(),
            Err(SchemaError::NegativePrice(_))
        ));
    }

    #[test]
    fn test_confidence_clamped() {
        let mut record = EventRecord::new("Konzert");
        record.metadata.confidence = 1.7;
        record.validate().unwrap();
        assert_eq!(record.metadata.confidence, 1.0);

        record.metadata.confidence = -0.3;
        record.validate().unwrap();
        assert_eq!(record.metadata.confidence, 0.0);
    }

    #[test]
    fn test_sources_deduplicated() {
        let mut record = EventRecord::new("Konzert");
        record.metadata.sources = vec![
            "https://a.de".to_string(),
            "https://b.de".to_string(),
            "https://a.de".to_string(),
        ];
        record.validate().unwrap();
        assert_eq!(record.metadata.sources, vec!["https://a.de", "https://b.de"]);
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let record: EventRecord =
            serde_json::from_str(r#"{"veranstaltungsname": "Sommerfest"}"#).unwrap();
        assert_eq!(record.name, "Sommerfest");
        assert_eq!(record.category, Category::Andere);
        assert_eq!(record.pricing.currency, "EUR");
        assert!(!record.pricing.free);
        assert_eq!(record.language, "de");
        assert_eq!(record.metadata.confidence, 0.0);
    }

    #[test]
    fn test_german_json_field_names_roundtrip() {
        let mut record = EventRecord::new("Jazzabend");
        record.location.city = Some("München".to_string());
        record.category = Category::Musik;

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["veranstaltungsname"], "Jazzabend");
        assert_eq!(json["ort"]["stadt"], "München");
        assert_eq!(json["kategorie"], "musik");
        // nulls preserved for unset fields
        assert!(json["termine"]["beginn"].is_null());

        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_datetime_iso_format_parsed() {
        let record: EventRecord = serde_json::from_str(
            r#"{"veranstaltungsname": "Fest", "termine": {"beginn": "2025-06-01T20:00:00"}}"#,
        )
        .unwrap();
        assert_eq!(record.schedule.start, Some(datetime(20)));
    }
}
