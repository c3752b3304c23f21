use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Note attached to a record whose asking price drifted since the last observation.
pub const NOTE_PRICE_UPDATED: &str = "PRICE_UPDATED";
/// Note attached to a record that was stored with some page elements missing.
pub const NOTE_EXTRACTION_INCOMPLETE: &str = "EXTRACTION_INCOMPLETE";

/// Identifies one physical listing across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingKey {
    pub city: String,
    pub address: String,
}

impl ListingKey {
    pub fn new(city: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.city, self.address)
    }
}

/// One row of the dataset, i.e. one observation of a listing.
///
/// Attribute columns are optional because not every listing page exposes
/// every field. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub url: String,
    pub extracted_on: NaiveDate,
    pub city: String,
    pub address: String,
    pub vraagprijs: Option<String>,
    pub vraagprijs_per_m2: Option<String>,
    pub bouwjaar: Option<String>,
    pub wonen: Option<String>,
    pub perceel: Option<String>,
    pub kamers: Option<String>,
    pub slaapkamers: Option<String>,
    pub energielabel: Option<String>,
    #[serde(default)]
    pub note: String,
}

impl ListingRecord {
    /// A record carrying only identity columns; attributes are filled in by the parser.
    pub fn new(url: &str, key: &ListingKey, extracted_on: NaiveDate) -> Self {
        Self {
            url: url.to_string(),
            extracted_on,
            city: key.city.clone(),
            address: key.address.clone(),
            vraagprijs: None,
            vraagprijs_per_m2: None,
            bouwjaar: None,
            wonen: None,
            perceel: None,
            kamers: None,
            slaapkamers: None,
            energielabel: None,
            note: String::new(),
        }
    }

    pub fn key(&self) -> ListingKey {
        ListingKey::new(self.city.clone(), self.address.clone())
    }

    pub fn has_key(&self, key: &ListingKey) -> bool {
        self.city == key.city && self.address == key.address
    }

    /// Appends a sentinel to the note column, `;`-separated, without repeating it.
    pub fn add_note(&mut self, note: &str) {
        if self.note.split(';').any(|n| n == note) {
            return;
        }
        if !self.note.is_empty() {
            self.note.push(';');
        }
        self.note.push_str(note);
    }
}

/// Outcome of comparing a freshly scraped record with what the dataset already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconciliationDecision {
    New,
    Unchanged,
    PriceChanged,
}

impl fmt::Display for ReconciliationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationDecision::New => write!(f, "NEW"),
            ReconciliationDecision::Unchanged => write!(f, "UNCHANGED"),
            ReconciliationDecision::PriceChanged => write!(f, "PRICE_CHANGED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ListingRecord {
        let key = ListingKey::new("amsterdam", "keizersgracht_12");
        ListingRecord::new(
            "https://www.funda.nl/detail/koop/amsterdam/huis-1-keizersgracht-12",
            &key,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
    }

    #[test]
    fn test_add_note_joins_distinct_sentinels() {
        let mut r = record();
        r.add_note(NOTE_EXTRACTION_INCOMPLETE);
        r.add_note(NOTE_PRICE_UPDATED);
        r.add_note(NOTE_PRICE_UPDATED);
        assert_eq!(r.note, "EXTRACTION_INCOMPLETE;PRICE_UPDATED");
    }

    #[test]
    fn test_has_key_uses_exact_equality() {
        let r = record();
        assert!(r.has_key(&ListingKey::new("amsterdam", "keizersgracht_12")));
        assert!(!r.has_key(&ListingKey::new("Amsterdam", "keizersgracht_12")));
        assert!(!r.has_key(&ListingKey::new("amsterdam", "keizersgracht_1")));
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(ReconciliationDecision::PriceChanged.to_string(), "PRICE_CHANGED");
        assert_eq!(ReconciliationDecision::New.to_string(), "NEW");
    }
}
