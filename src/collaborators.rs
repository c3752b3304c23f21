//! Capabilities the run orchestrator depends on. Concrete funda.nl
//! implementations live in [`crate::funda`]; tests substitute stubs.

use crate::error::ListingError;
use crate::funda::SearchParameters;
use crate::models::ListingKey;

/// The translation service rejects input longer than this many characters.
pub const MAX_TRANSLATION_LENGTH: usize = 5000;

/// Produces listing URLs for one page of search results. An empty page marks
/// the end of the results.
pub trait ListingSource {
    fn name(&self) -> &str;
    fn listing_page(&self, params: &SearchParameters, page: usize) -> Result<Vec<String>, ListingError>;
}

/// Minimal page rendering capability.
pub trait PageFetcher {
    type Page;

    fn fetch_page(&self, url: &str) -> Result<Self::Page, ListingError>;

    /// Text of every element matching `selector`, one string per element.
    fn find_text_blocks(&self, page: &Self::Page, selector: &str) -> Result<Vec<String>, ListingError>;

    /// Activates the control matching `selector`, e.g. to expand a collapsed section.
    fn click(&self, page: &mut Self::Page, selector: &str) -> Result<(), ListingError>;

    /// Value of `attribute` on every element matching `selector`, in document order.
    fn extract_attribute(
        &self,
        page: &Self::Page,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, ListingError>;

    /// Raw bytes behind `url`, used for photos.
    fn download(&self, url: &str) -> Result<Vec<u8>, ListingError>;
}

pub trait Translator {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ListingError>;
}

/// Storage for photos and description files, addressed by listing.
pub trait BlobStore {
    fn save(&self, key: &ListingKey, name: &str, bytes: &[u8]) -> Result<(), ListingError>;
}

/// Cuts `text` down to the translation service limit on a character boundary.
pub fn truncate_for_translation(text: &str) -> &str {
    match text.char_indices().nth(MAX_TRANSLATION_LENGTH) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// `NN_<file>` where `NN` is the 1-based display position, so photos sort in
/// the order the listing shows them.
pub fn photo_file_name(index: usize, source_url: &str) -> String {
    let path = source_url.split(['?', '#']).next().unwrap_or(source_url);
    let original = path.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("photo.jpg");
    format!("{:02}_{}", index + 1, original)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_translation() {
        let short = "Mooie woning";
        assert_eq!(truncate_for_translation(short), short);

        let long = "é".repeat(MAX_TRANSLATION_LENGTH + 10);
        let truncated = truncate_for_translation(&long);
        assert_eq!(truncated.chars().count(), MAX_TRANSLATION_LENGTH);

        let exact = "a".repeat(MAX_TRANSLATION_LENGTH);
        assert_eq!(truncate_for_translation(&exact).len(), MAX_TRANSLATION_LENGTH);
    }

    #[test]
    fn test_photo_file_name() {
        assert_eq!(
            photo_file_name(0, "https://cloud.funda.nl/valentina_media/180/123/456_720.jpg"),
            "01_456_720.jpg"
        );
        assert_eq!(
            photo_file_name(11, "https://cloud.funda.nl/media/abc.webp?width=1440"),
            "12_abc.webp"
        );
        assert_eq!(photo_file_name(2, "https://cloud.funda.nl/media/"), "03_photo.jpg");
    }
}
