use crate::models::{ListingKey, ListingRecord};
use chrono::{Local, NaiveDate};
use regex::Regex;
use tracing::debug;

/// Boilerplate appended to price and energy label values on the listing page.
const BOILERPLATE_PATTERN: &str = r"(?i)\s*(kosten koper|vrij op naam|v\.o\.n\.|k\.k\.|wat betekent dit\?)";
const AREA_UNIT_PATTERN: &str = r"([\d\s])m[²2]";
const ROOMS_PATTERN: &str = r"(?i)(\d+)\s*kamers?(?:\s*\(\s*(\d+)\s*slaapkamers?\s*\))?";

/// Fields recognised in the "kenmerken" blocks of a listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    AskingPrice,
    AskingPricePerM2,
    ConstructionYear,
    LivingArea,
    PlotArea,
    Rooms,
    EnergyLabel,
}

impl Field {
    fn from_label(label: &str) -> Option<Field> {
        match label.trim().to_lowercase().as_str() {
            "vraagprijs" => Some(Field::AskingPrice),
            "vraagprijs per m²" | "vraagprijs per m2" => Some(Field::AskingPricePerM2),
            "bouwjaar" => Some(Field::ConstructionYear),
            "wonen" => Some(Field::LivingArea),
            "perceel" => Some(Field::PlotArea),
            "aantal kamers" => Some(Field::Rooms),
            "energielabel" => Some(Field::EnergyLabel),
            _ => None,
        }
    }
}

/// Normalizes a raw field value: drops boilerplate suffixes, the currency marker,
/// area units and thousand separators.
pub fn clean_string(raw: &str) -> String {
    let mut value = raw.to_string();

    if let Ok(re) = Regex::new(BOILERPLATE_PATTERN) {
        value = re.replace_all(&value, " ").into_owned();
    }
    if let Ok(re) = Regex::new(AREA_UNIT_PATTERN) {
        value = re.replace_all(&value, "$1").into_owned();
    }

    let value = value.replace('€', "").replace('.', "");
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `"4 kamers (3 slaapkamers)"` into `("4", "3")`. The bedroom part is optional.
pub fn split_rooms(raw: &str) -> (Option<String>, Option<String>) {
    let re = match Regex::new(ROOMS_PATTERN) {
        Ok(re) => re,
        Err(_) => return (None, None),
    };

    match re.captures(raw) {
        Some(captures) => (
            captures.get(1).map(|m| m.as_str().to_string()),
            captures.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (None, None),
    }
}

/// Builds a record from the raw text blocks of a listing page, dated today.
pub fn extract(sections: &[String], url: &str, key: &ListingKey) -> ListingRecord {
    extract_on(sections, url, key, Local::now().date_naive())
}

/// Builds a record from the raw text blocks of a listing page.
///
/// Every block is a newline separated sequence of `label`, `value` lines. Adjacent
/// line pairs whose first line is a recognised label fill the matching column; the
/// first occurrence of a label wins and everything else is ignored.
pub fn extract_on(
    sections: &[String],
    url: &str,
    key: &ListingKey,
    extracted_on: NaiveDate,
) -> ListingRecord {
    let mut record = ListingRecord::new(url, key, extracted_on);

    for section in sections {
        let lines: Vec<&str> = section
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        for pair in lines.windows(2) {
            let (label, value) = (pair[0], pair[1]);
            if let Some(field) = Field::from_label(label) {
                apply_field(&mut record, field, value);
            }
        }
    }

    debug!(
        "Extracted {}: price={:?}, rooms={:?}/{:?}, label={:?}",
        key, record.vraagprijs, record.kamers, record.slaapkamers, record.energielabel
    );

    record
}

fn apply_field(record: &mut ListingRecord, field: Field, raw: &str) {
    if field == Field::Rooms {
        let (rooms, bedrooms) = split_rooms(raw);
        if record.kamers.is_none() {
            record.kamers = rooms;
        }
        if record.slaapkamers.is_none() {
            record.slaapkamers = bedrooms;
        }
        return;
    }

    let cleaned = clean_string(raw);
    if cleaned.is_empty() {
        return;
    }

    let slot = match field {
        Field::AskingPrice => &mut record.vraagprijs,
        Field::AskingPricePerM2 => &mut record.vraagprijs_per_m2,
        Field::ConstructionYear => &mut record.bouwjaar,
        Field::LivingArea => &mut record.wonen,
        Field::PlotArea => &mut record.perceel,
        Field::EnergyLabel => &mut record.energielabel,
        Field::Rooms => return,
    };

    if slot.is_none() {
        *slot = Some(cleaned);
    }
}
