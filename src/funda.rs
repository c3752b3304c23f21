use crate::collaborators::{BlobStore, ListingSource, PageFetcher, Translator};
use crate::error::ListingError;
use crate::models::ListingKey;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const BASE_URL: &str = "https://www.funda.nl";
const SEARCH_PATH: &str = "/zoeken/koop";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/60.0.3112.50 Safari/537.36";
const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Result entries on a search page; the first selector that matches anything wins.
const SEARCH_ENTRY_SELECTORS: [&str; 2] = [
    r#"a[class="h-full min-w-[228px] shrink-0 cursor-pointer"]"#,
    "a[href*='/detail/koop/']",
];

pub const DATA_SELECTOR: &str = ".object-kenmerken-list";
pub const DESCRIPTION_SELECTOR: &str = ".object-description-body";
pub const DESCRIPTION_OPEN_BUTTON_SELECTOR: &str = ".object-description-open-button";
pub const IMAGE_SELECTOR: &str = ".media-viewer-overview__section-image";
pub const MEDIA_FRAGMENT: &str = "/#overzicht";

/// Filters of a funda.nl "koop" search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParameters {
    pub price_min: Option<u64>,
    pub price_max: Option<u64>,
    pub bedrooms_min: Option<u32>,
    pub area_min: Option<u32>,
    pub city: String,
    pub within_distance: Option<String>,
    /// Only listings published within this many days.
    pub publication_days: Option<u32>,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            price_min: Some(400_000),
            price_max: Some(700_000),
            bedrooms_min: Some(3),
            area_min: Some(100),
            city: "amsterdam".to_string(),
            within_distance: Some("2km".to_string()),
            publication_days: Some(5),
        }
    }
}

impl SearchParameters {
    /// Search URL for the given 1-based results page.
    pub fn search_url(&self, page: usize) -> String {
        let mut query: Vec<(&str, String)> = Vec::new();

        if self.price_min.is_some() || self.price_max.is_some() {
            query.push(("price", range(self.price_min, self.price_max)));
        }
        if let Some(bedrooms) = self.bedrooms_min {
            query.push(("bedrooms", range(Some(bedrooms), None)));
        }
        if let Some(area) = self.area_min {
            query.push(("floor_area", range(Some(area), None)));
        }
        if let Some(days) = self.publication_days {
            query.push(("publication_date", format!("\"{}\"", days)));
        }

        let area = match &self.within_distance {
            Some(distance) => format!("[\"{},{}\"]", self.city, distance),
            None => format!("[\"{}\"]", self.city),
        };
        query.push(("selected_area", area));

        if page > 1 {
            query.push(("search_result", page.to_string()));
        }

        let query = query
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}{}?{}", BASE_URL, SEARCH_PATH, query)
    }
}

fn range<T: std::fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    let min = min.map(|v| v.to_string()).unwrap_or_default();
    let max = max.map(|v| v.to_string()).unwrap_or_default();
    format!("\"{}-{}\"", min, max)
}

fn build_client() -> Result<Client, ListingError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| ListingError::fetch(BASE_URL, e))
}

fn parse_selector(url: &str, selector: &str) -> Result<Selector, ListingError> {
    Selector::parse(selector)
        .map_err(|e| ListingError::fetch(url, format!("invalid selector '{}': {:?}", selector, e)))
}

fn get_text(client: &Client, url: &str) -> Result<String, ListingError> {
    let response = client.get(url).send().map_err(|e| ListingError::fetch(url, e))?;
    if !response.status().is_success() {
        return Err(ListingError::fetch(url, format!("HTTP {}", response.status())));
    }
    response.text().map_err(|e| ListingError::fetch(url, e))
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", BASE_URL, href)
    }
}

/// Search result pages of funda.nl.
pub struct FundaSearch {
    client: Client,
}

impl FundaSearch {
    pub fn new() -> Result<Self, ListingError> {
        Ok(Self { client: build_client()? })
    }
}

impl ListingSource for FundaSearch {
    fn name(&self) -> &str {
        "funda.nl"
    }

    fn listing_page(&self, params: &SearchParameters, page: usize) -> Result<Vec<String>, ListingError> {
        let url = params.search_url(page);
        debug!("Fetching search page {}: {}", page, url);

        let body = get_text(&self.client, &url)?;
        let document = Html::parse_document(&body);

        let mut listing_urls: Vec<String> = Vec::new();
        for selector_str in SEARCH_ENTRY_SELECTORS {
            let selector = parse_selector(&url, selector_str)?;
            for element in document.select(&selector) {
                if let Some(href) = element.value().attr("href") {
                    let full_url = absolute_url(href);
                    if !listing_urls.contains(&full_url) {
                        listing_urls.push(full_url);
                    }
                }
            }
            if !listing_urls.is_empty() {
                break;
            }
        }

        debug!("Found {} listing URLs on page {}", listing_urls.len(), page);
        Ok(listing_urls)
    }
}

/// A parsed listing page.
pub struct HtmlPage {
    pub url: String,
    document: Html,
}

impl HtmlPage {
    pub fn parse(url: &str, body: &str) -> Self {
        Self {
            url: url.to_string(),
            document: Html::parse_document(body),
        }
    }
}

/// Static HTML fetcher. Collapsed sections are already part of the served
/// markup, so `click` only has to confirm the control is present.
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, ListingError> {
        Ok(Self { client: build_client()? })
    }
}

impl PageFetcher for HttpPageFetcher {
    type Page = HtmlPage;

    fn fetch_page(&self, url: &str) -> Result<HtmlPage, ListingError> {
        debug!("Fetching listing page: {}", url);
        let body = get_text(&self.client, url)?;
        Ok(HtmlPage::parse(url, &body))
    }

    fn find_text_blocks(&self, page: &HtmlPage, selector: &str) -> Result<Vec<String>, ListingError> {
        let selector = parse_selector(&page.url, selector)?;
        Ok(page
            .document
            .select(&selector)
            .map(|element| {
                element
                    .text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect())
    }

    fn click(&self, page: &mut HtmlPage, selector: &str) -> Result<(), ListingError> {
        let parsed = parse_selector(&page.url, selector)?;
        if page.document.select(&parsed).next().is_none() {
            return Err(ListingError::ExtractionIncomplete {
                url: page.url.clone(),
                element: selector.to_string(),
            });
        }
        Ok(())
    }

    fn extract_attribute(
        &self,
        page: &HtmlPage,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, ListingError> {
        let selector = parse_selector(&page.url, selector)?;
        Ok(page
            .document
            .select(&selector)
            .filter_map(|element| element.value().attr(attribute))
            .map(str::to_string)
            .collect())
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ListingError> {
        let response = self.client.get(url).send().map_err(|e| ListingError::fetch(url, e))?;
        if !response.status().is_success() {
            return Err(ListingError::fetch(url, format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().map_err(|e| ListingError::fetch(url, e))?;
        Ok(bytes.to_vec())
    }
}

/// Google's public translate endpoint.
pub struct GoogleTranslator {
    client: Client,
}

impl GoogleTranslator {
    pub fn new() -> Result<Self, ListingError> {
        Ok(Self { client: build_client()? })
    }
}

impl Translator for GoogleTranslator {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ListingError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let response = self
            .client
            .post(TRANSLATE_URL)
            .query(&[("client", "gtx"), ("sl", source_lang), ("tl", target_lang), ("dt", "t")])
            .form(&[("q", text)])
            .send()
            .map_err(|e| ListingError::TranslationFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ListingError::TranslationFailure(format!("HTTP {}", response.status())));
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| ListingError::TranslationFailure(e.to_string()))?;

        parse_translation(&json)
    }
}

/// The response is `[[["translated", "original", ...], ...], ...]`; the
/// translated sentences are concatenated.
fn parse_translation(json: &serde_json::Value) -> Result<String, ListingError> {
    let sentences = json[0]
        .as_array()
        .ok_or_else(|| ListingError::TranslationFailure("unexpected response shape".to_string()))?;

    let translated: String = sentences
        .iter()
        .filter_map(|sentence| sentence[0].as_str())
        .collect();

    if translated.is_empty() {
        return Err(ListingError::TranslationFailure("empty translation".to_string()));
    }
    Ok(translated)
}

/// Stores blobs under `<root>/<city>/<address>/<name>`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn listing_dir(&self, key: &ListingKey) -> PathBuf {
        self.root.join(&key.city).join(&key.address)
    }
}

impl BlobStore for FsBlobStore {
    fn save(&self, key: &ListingKey, name: &str, bytes: &[u8]) -> Result<(), ListingError> {
        let dir = self.listing_dir(key);
        fs::create_dir_all(&dir)
            .map_err(|e| ListingError::Storage(format!("{}: {}", dir.display(), e)))?;
        let path = dir.join(name);
        fs::write(&path, bytes).map_err(|e| ListingError::Storage(format!("{}: {}", path.display(), e)))?;
        debug!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LISTING_HTML: &str = r#"
        <html><body>
          <dl class="object-kenmerken-list">
            <dt>Vraagprijs</dt><dd>€ 450.000 kosten koper</dd>
            <dt>Bouwjaar</dt><dd>1932</dd>
          </dl>
          <dl class="object-kenmerken-list">
            <dt>Aantal kamers</dt><dd>4 kamers (3 slaapkamers)</dd>
          </dl>
          <button class="object-description-open-button">Lees verder</button>
          <div class="object-description-body">Ruime woning met tuin.</div>
          <img class="media-viewer-overview__section-image" src="https://cloud.funda.nl/a/1.jpg">
          <img class="media-viewer-overview__section-image" src="https://cloud.funda.nl/a/2.jpg">
        </body></html>
    "#;

    fn fetcher() -> HttpPageFetcher {
        HttpPageFetcher::new().unwrap()
    }

    #[test]
    fn test_search_url_default_parameters() {
        let url = SearchParameters::default().search_url(1);
        assert!(url.starts_with("https://www.funda.nl/zoeken/koop?"));
        assert!(url.contains("price=%22400000-700000%22"));
        assert!(url.contains("bedrooms=%223-%22"));
        assert!(url.contains("floor_area=%22100-%22"));
        assert!(url.contains("publication_date=%225%22"));
        assert!(url.contains("selected_area=%5B%22amsterdam%2C2km%22%5D"));
        assert!(!url.contains("search_result"));
    }

    #[test]
    fn test_search_url_paging_and_open_ranges() {
        let params = SearchParameters {
            price_min: None,
            price_max: Some(500_000),
            bedrooms_min: None,
            area_min: None,
            city: "utrecht".to_string(),
            within_distance: None,
            publication_days: None,
        };
        let url = params.search_url(3);
        assert!(url.contains("price=%22-500000%22"));
        assert!(!url.contains("bedrooms"));
        assert!(url.contains("selected_area=%5B%22utrecht%22%5D"));
        assert!(url.ends_with("search_result=3"));
    }

    #[test]
    fn test_find_text_blocks_joins_text_nodes() {
        let page = HtmlPage::parse("https://x", LISTING_HTML);
        let blocks = fetcher().find_text_blocks(&page, DATA_SELECTOR).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], "Vraagprijs\n€ 450.000 kosten koper\nBouwjaar\n1932");
        assert_eq!(blocks[1], "Aantal kamers\n4 kamers (3 slaapkamers)");
    }

    #[test]
    fn test_click_requires_control() {
        let f = fetcher();
        let mut page = HtmlPage::parse("https://x", LISTING_HTML);
        assert!(f.click(&mut page, DESCRIPTION_OPEN_BUTTON_SELECTOR).is_ok());

        let mut bare = HtmlPage::parse("https://x", "<html><body></body></html>");
        let err = f.click(&mut bare, DESCRIPTION_OPEN_BUTTON_SELECTOR).unwrap_err();
        assert!(matches!(err, ListingError::ExtractionIncomplete { .. }));
    }

    #[test]
    fn test_extract_attribute_in_document_order() {
        let page = HtmlPage::parse("https://x", LISTING_HTML);
        let sources = fetcher().extract_attribute(&page, IMAGE_SELECTOR, "src").unwrap();
        assert_eq!(sources, vec!["https://cloud.funda.nl/a/1.jpg", "https://cloud.funda.nl/a/2.jpg"]);
    }

    #[test]
    fn test_parse_translation() {
        let json = serde_json::json!([[["Spacious house. ", "Ruime woning. ", null], ["With garden.", "Met tuin.", null]], null, "nl"]);
        assert_eq!(parse_translation(&json).unwrap(), "Spacious house. With garden.");

        let err = parse_translation(&serde_json::json!({"error": 1})).unwrap_err();
        assert!(matches!(err, ListingError::TranslationFailure(_)));
    }

    #[test]
    fn test_fs_blob_store_layout() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        let key = ListingKey::new("amsterdam", "dam_1");

        store.save(&key, "description.txt", b"Ruime woning").unwrap();

        let saved = fs::read_to_string(dir.path().join("amsterdam/dam_1/description.txt")).unwrap();
        assert_eq!(saved, "Ruime woning");
    }
}
