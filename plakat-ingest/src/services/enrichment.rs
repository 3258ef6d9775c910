//! Merge engine for scraped page signals
//!
//! Folds each page signal into the canonical record through an ordered
//! list of independent merge rules. Every rule only ever fills a
//! currently-empty field; values from the primary extraction are never
//! overwritten. Across signals, earlier signals win ties for which one
//! supplies a given field.

use crate::confidence::{self, EvidenceSummary};
use crate::services::page_fetcher::PageSignal;
use plakat_common::models::EventRecord;
use regex::Regex;
use tracing::debug;

/// Keywords marking a page as ticket-related (substring, case-insensitive)
const TICKET_KEYWORDS: &[&str] = &["tickets", "karten", "vorverkauf", "reservierung", "buchung"];

/// One fill-if-empty merge rule.
///
/// Rules are independent; the engine iterates them in declaration order
/// for every signal. `apply` returns true when it changed the record.
pub trait MergeRule: Send + Sync {
    /// Rule name for logging
    fn name(&self) -> &'static str;

    /// Fold one signal into the record, filling at most its own field
    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool;
}

/// Price from text adjacent to a currency symbol or word
struct PriceRule {
    pattern: Regex,
}

impl PriceRule {
    fn new() -> Option<Self> {
        let pattern = Regex::new(r"(\d+(?:,\d+)?)\s*€|euro?\s*(\d+(?:,\d+)?)").ok()?;
        Some(Self { pattern })
    }
}

impl MergeRule for PriceRule {
    fn name(&self) -> &'static str {
        "price"
    }

    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool {
        if record.pricing.price.is_some() || record.pricing.free {
            return false;
        }

        let text = signal.text.to_lowercase();
        let Some(captures) = self.pattern.captures(&text) else {
            return false;
        };
        let Some(price_str) = captures.get(1).or_else(|| captures.get(2)) else {
            return false;
        };

        match price_str.as_str().replace(',', ".").parse::<f64>() {
            Ok(price) => {
                record.pricing.price = Some(price);
                record.pricing.free = false;
                true
            }
            Err(_) => false,
        }
    }
}

/// German street address: street name, house number, PLZ, city — set
/// together or not at all
struct AddressRule {
    pattern: Regex,
}

impl AddressRule {
    fn new() -> Option<Self> {
        let pattern = Regex::new(
            r"([A-ZÄÖÜ][a-zäöüß\-]+(?:\s+[A-ZÄÖÜ][a-zäöüß\-]+)*)\s+(\d+[a-z]?),?\s*(\d{5})\s+([A-ZÄÖÜ][a-zäöüß\-]+)",
        )
        .ok()?;
        Some(Self { pattern })
    }
}

impl MergeRule for AddressRule {
    fn name(&self) -> &'static str {
        "address"
    }

    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool {
        if record.location.address.is_some() {
            return false;
        }

        let Some(captures) = self.pattern.captures(&signal.text) else {
            return false;
        };
        let (street, number, plz, city) = (
            &captures[1],
            &captures[2],
            &captures[3],
            &captures[4],
        );

        record.location.address = Some(format!("{} {}", street, number));
        record.location.postal_code = Some(plz.to_string());
        record.location.city = Some(city.to_string());
        true
    }
}

/// First email-shaped token, verbatim
struct EmailRule {
    pattern: Regex,
}

impl EmailRule {
    fn new() -> Option<Self> {
        let pattern =
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok()?;
        Some(Self { pattern })
    }
}

impl MergeRule for EmailRule {
    fn name(&self) -> &'static str {
        "email"
    }

    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool {
        if record.metadata.contact.email.is_some() {
            return false;
        }

        match self.pattern.find(&signal.text) {
            Some(m) => {
                record.metadata.contact.email = Some(m.as_str().to_string());
                true
            }
            None => false,
        }
    }
}

/// First German-style phone number, verbatim
struct PhoneRule {
    pattern: Regex,
}

impl PhoneRule {
    fn new() -> Option<Self> {
        let pattern = Regex::new(r"(?:\+49|0)[\s\-]?\d{2,5}[\s\-]?\d{3,8}").ok()?;
        Some(Self { pattern })
    }
}

impl MergeRule for PhoneRule {
    fn name(&self) -> &'static str {
        "phone"
    }

    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool {
        if record.metadata.contact.phone.is_some() {
            return false;
        }

        match self.pattern.find(&signal.text) {
            Some(m) => {
                record.metadata.contact.phone = Some(m.as_str().to_string());
                true
            }
            None => false,
        }
    }
}

/// The page's own URL as the contact website
struct WebsiteRule;

impl MergeRule for WebsiteRule {
    fn name(&self) -> &'static str {
        "website"
    }

    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool {
        if record.metadata.contact.website.is_some() {
            return false;
        }
        record.metadata.contact.website = Some(signal.url.clone());
        true
    }
}

/// Pages mentioning ticket keywords become online ticket links
struct TicketLinkRule;

impl MergeRule for TicketLinkRule {
    fn name(&self) -> &'static str {
        "ticket_link"
    }

    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool {
        let text = signal.text.to_lowercase();
        if !TICKET_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
            return false;
        }

        let links = &mut record.metadata.ticket_info.online_links;
        if links.contains(&signal.url) {
            return false;
        }
        links.push(signal.url.clone());
        true
    }
}

/// Every contributing page joins the source list
struct SourceRule;

impl MergeRule for SourceRule {
    fn name(&self) -> &'static str {
        "source"
    }

    fn apply(&self, record: &mut EventRecord, signal: &PageSignal) -> bool {
        let sources = &mut record.metadata.sources;
        if sources.contains(&signal.url) {
            return false;
        }
        sources.push(signal.url.clone());
        true
    }
}

/// Merge engine: ordered rule list plus the enrichment-stage confidence
/// transition
pub struct MergeEngine {
    rules: Vec<Box<dyn MergeRule>>,
}

impl MergeEngine {
    pub fn new() -> Self {
        let mut rules: Vec<Box<dyn MergeRule>> = Vec::new();
        if let Some(rule) = PriceRule::new() {
            rules.push(Box::new(rule));
        }
        if let Some(rule) = AddressRule::new() {
            rules.push(Box::new(rule));
        }
        if let Some(rule) = EmailRule::new() {
            rules.push(Box::new(rule));
        }
        if let Some(rule) = PhoneRule::new() {
            rules.push(Box::new(rule));
        }
        rules.push(Box::new(WebsiteRule));
        rules.push(Box::new(TicketLinkRule));
        rules.push(Box::new(SourceRule));

        Self { rules }
    }

    /// Fold all signals into the record, in list order, then apply the
    /// enrichment confidence transition exactly once.
    pub fn merge(&self, record: &mut EventRecord, signals: &[PageSignal]) {
        for signal in signals {
            for rule in &self.rules {
                if rule.apply(record, signal) {
                    debug!(rule = rule.name(), url = %signal.url, "Merge rule filled field");
                }
            }
        }

        record.metadata.confidence = confidence::recalculate(
            record.metadata.confidence,
            &EvidenceSummary {
                merged_signals: signals.len(),
                quality: None,
            },
        );
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(url: &str, text: &str) -> PageSignal {
        PageSignal {
            url: url.to_string(),
            text: text.to_string(),
            ..PageSignal::default()
        }
    }

    #[test]
    fn test_scenario_price_phone_email_from_one_page() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Rock Concert");
        record.metadata.confidence = 0.85;

        let signals = vec![signal(
            "https://konzert.de",
            "Eintritt 35,50€, Tel: +49 89 1234567, info@test.de",
        )];
        engine.merge(&mut record, &signals);

        assert_eq!(record.pricing.price, Some(35.50));
        assert!(!record.pricing.free);
        assert_eq!(
            record.metadata.contact.phone.as_deref(),
            Some("+49 89 1234567")
        );
        assert_eq!(record.metadata.contact.email.as_deref(), Some("info@test.de"));
        assert!(record
            .metadata
            .sources
            .contains(&"https://konzert.de".to_string()));
        assert!(record.metadata.confidence >= 0.85);
        assert!(record.metadata.confidence <= 1.0);
    }

    #[test]
    fn test_address_fills_all_three_fields_together() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Konzert");

        let signals = vec![signal(
            "https://venue.de",
            "Veranstaltungsort: Hauptstraße 12, 80331 München ab 19 Uhr",
        )];
        engine.merge(&mut record, &signals);

        assert_eq!(record.location.address.as_deref(), Some("Hauptstraße 12"));
        assert_eq!(record.location.postal_code.as_deref(), Some("80331"));
        assert_eq!(record.location.city.as_deref(), Some("München"));
    }

    #[test]
    fn test_existing_fields_never_overwritten() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Konzert");
        record.pricing.price = Some(20.0);
        record.metadata.contact.email = Some("vorhanden@plakat.de".to_string());
        record.metadata.contact.website = Some("https://original.de".to_string());

        let signals = vec![signal(
            "https://anders.de",
            "Eintritt 99€ kontakt@anders.de",
        )];
        engine.merge(&mut record, &signals);

        assert_eq!(record.pricing.price, Some(20.0));
        assert_eq!(
            record.metadata.contact.email.as_deref(),
            Some("vorhanden@plakat.de")
        );
        assert_eq!(
            record.metadata.contact.website.as_deref(),
            Some("https://original.de")
        );
    }

    #[test]
    fn test_free_event_price_not_searched() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Stadtfest");
        record.pricing.free = true;

        engine.merge(&mut record, &[signal("https://fest.de", "Spende 5€ erbeten")]);

        assert!(record.pricing.free);
        assert_eq!(record.pricing.price, None);
    }

    #[test]
    fn test_earlier_signal_wins_ties() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Konzert");

        let signals = vec![
            signal("https://erste.de", "Kontakt: erste@seite.de"),
            signal("https://zweite.de", "Kontakt: zweite@seite.de"),
        ];
        engine.merge(&mut record, &signals);

        assert_eq!(record.metadata.contact.email.as_deref(), Some("erste@seite.de"));
        // website comes from the first page as well
        assert_eq!(
            record.metadata.contact.website.as_deref(),
            Some("https://erste.de")
        );
        // but both pages end up in the source list
        assert_eq!(record.metadata.sources.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent_per_field() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Rock Concert");
        record.metadata.confidence = 0.5;

        let signals = vec![signal(
            "https://konzert.de",
            "Eintritt 35,50€ Tickets unter Tel 089 1234567",
        )];
        engine.merge(&mut record, &signals);
        let after_first = record.clone();

        engine.merge(&mut record, &signals);

        // only the confidence bonus moves; no field changes
        assert_eq!(record.pricing, after_first.pricing);
        assert_eq!(record.location, after_first.location);
        assert_eq!(record.metadata.contact, after_first.metadata.contact);
        assert_eq!(record.metadata.sources, after_first.metadata.sources);
        assert_eq!(
            record.metadata.ticket_info.online_links,
            after_first.metadata.ticket_info.online_links
        );
    }

    #[test]
    fn test_ticket_keyword_appends_link_once() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Konzert");

        let page = signal("https://vvk.de", "Karten im Vorverkauf erhältlich");
        engine.merge(&mut record, &[page.clone()]);
        engine.merge(&mut record, &[page]);

        assert_eq!(
            record.metadata.ticket_info.online_links,
            vec!["https://vvk.de"]
        );
    }

    #[test]
    fn test_no_ticket_keyword_no_link() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Konzert");

        engine.merge(
            &mut record,
            &[signal("https://blog.de", "Ein Bericht über das Konzert")],
        );

        assert!(record.metadata.ticket_info.online_links.is_empty());
    }

    #[test]
    fn test_confidence_bonus_capped_with_many_signals() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Konzert");
        record.metadata.confidence = 0.3;

        let signals: Vec<PageSignal> = (0..10)
            .map(|i| signal(&format!("https://quelle{}.de", i), "Bericht"))
            .collect();
        engine.merge(&mut record, &signals);

        // bonus component never exceeds 0.2
        assert!((record.metadata.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_merge_without_signals_changes_nothing() {
        let engine = MergeEngine::new();
        let mut record = EventRecord::new("Konzert");
        record.metadata.confidence = 0.6;

        engine.merge(&mut record, &[]);

        assert_eq!(record, EventRecord {
            metadata: plakat_common::models::Metadata {
                confidence: 0.6,
                ..Default::default()
            },
            ..EventRecord::new("Konzert")
        });
    }
}
