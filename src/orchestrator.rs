use crate::collaborators::{
    photo_file_name, truncate_for_translation, BlobStore, ListingSource, PageFetcher, Translator,
};
use crate::error::ListingError;
use crate::funda::{
    SearchParameters, DATA_SELECTOR, DESCRIPTION_OPEN_BUTTON_SELECTOR, DESCRIPTION_SELECTOR,
    IMAGE_SELECTOR, MEDIA_FRAGMENT,
};
use crate::identifier::{derive_key, normalize_url};
use crate::models::{ListingKey, ReconciliationDecision, NOTE_EXTRACTION_INCOMPLETE};
use crate::parser;
use crate::reconcile::{reconcile, PendingBatch, Reconciliation, SideEffect};
use crate::repository::ListingRepository;
use crate::tui::RunTUI;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DESCRIPTION_FILE: &str = "description.txt";
pub const TRANSLATED_DESCRIPTION_FILE: &str = "description_en.txt";

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop after this many search pages even if results continue.
    pub max_pages: Option<usize>,
    /// Stop after this many listings have been processed.
    pub max_items: Option<usize>,
    pub download_photos: bool,
    pub translate: bool,
    pub source_lang: String,
    pub target_lang: String,
    /// Base pause between listings; a random jitter of up to half of it is added.
    pub delay_ms: u64,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_items: None,
            download_photos: true,
            translate: true,
            source_lang: "nl".to_string(),
            target_lang: "en".to_string(),
            delay_ms: 500,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub pages_requested: usize,
    pub listings_seen: usize,
    pub new: usize,
    pub unchanged: usize,
    pub price_changed: usize,
    pub appended: usize,
    pub failures: Vec<ListingFailure>,
    /// Set when a search page failed and enumeration ended early.
    pub enumeration_error: Option<String>,
}

impl RunReport {
    fn count(&mut self, decision: ReconciliationDecision) {
        match decision {
            ReconciliationDecision::New => self.new += 1,
            ReconciliationDecision::Unchanged => self.unchanged += 1,
            ReconciliationDecision::PriceChanged => self.price_changed += 1,
        }
    }
}

/// Lazily walks search result pages, yielding listing URLs in page order.
///
/// Enumeration ends the moment a page yields no entries, when a page request
/// fails (the error is yielded once) or when `max_pages` pages were requested.
pub struct ListingUrls<'a, S: ListingSource + ?Sized> {
    source: &'a S,
    params: &'a SearchParameters,
    max_pages: Option<usize>,
    next_page: usize,
    pages_requested: usize,
    buffer: VecDeque<String>,
    finished: bool,
}

impl<'a, S: ListingSource + ?Sized> ListingUrls<'a, S> {
    pub fn new(source: &'a S, params: &'a SearchParameters, max_pages: Option<usize>) -> Self {
        Self {
            source,
            params,
            max_pages,
            next_page: 1,
            pages_requested: 0,
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    pub fn pages_requested(&self) -> usize {
        self.pages_requested
    }
}

impl<'a, S: ListingSource + ?Sized> Iterator for ListingUrls<'a, S> {
    type Item = Result<String, ListingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(url) = self.buffer.pop_front() {
                return Some(Ok(url));
            }
            if self.finished {
                return None;
            }
            if let Some(max) = self.max_pages {
                if self.pages_requested >= max {
                    debug!("Reached maximum number of pages ({}), stopping", max);
                    self.finished = true;
                    return None;
                }
            }

            let page = self.next_page;
            self.next_page += 1;
            self.pages_requested += 1;

            match self.source.listing_page(self.params, page) {
                Ok(urls) if urls.is_empty() => {
                    debug!("No more listings found on page {}, stopping pagination", page);
                    self.finished = true;
                }
                Ok(urls) => {
                    debug!("Page {}: found {} listing URLs", page, urls.len());
                    self.buffer.extend(urls);
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Writes to the terminal report without letting a broken terminal abort the
/// run; the report is switched off after its first write error.
fn show<F>(tui: &mut Option<&mut RunTUI>, write: F)
where
    F: FnOnce(&mut RunTUI) -> io::Result<()>,
{
    let failed = match tui.as_deref_mut() {
        Some(t) => write(t).err(),
        None => None,
    };
    if let Some(e) = failed {
        warn!("Terminal report disabled after write error: {}", e);
        *tui = None;
    }
}

/// Drives one crawl: enumerate, extract, reconcile, run side effects and
/// append everything that is not a redundant observation.
pub struct RunOrchestrator<S, F, T, B> {
    source: S,
    fetcher: F,
    translator: T,
    blobs: B,
    options: RunOptions,
}

impl<S, F, T, B> RunOrchestrator<S, F, T, B>
where
    S: ListingSource,
    F: PageFetcher,
    T: Translator,
    B: BlobStore,
{
    pub fn new(source: S, fetcher: F, translator: T, blobs: B, options: RunOptions) -> Self {
        Self {
            source,
            fetcher,
            translator,
            blobs,
            options,
        }
    }

    pub fn run<R: ListingRepository>(
        &self,
        params: &SearchParameters,
        repo: &mut R,
        mut tui: Option<&mut RunTUI>,
    ) -> Result<RunReport> {
        info!("Starting {} run for {}", self.source.name(), params.city);

        let mut report = RunReport::default();
        let mut batch = Vec::new();
        let mut urls = ListingUrls::new(&self.source, params, self.options.max_pages);
        let mut last_page_shown = 0;

        while let Some(next) = urls.next() {
            if urls.pages_requested() != last_page_shown {
                last_page_shown = urls.pages_requested();
                let shown = report.listings_seen + 1;
                show(&mut tui, |t| t.update_gathering_progress(last_page_shown, shown));
            }

            let url = match next {
                Ok(url) => url,
                Err(e) => {
                    warn!("Search enumeration stopped: {}", e);
                    report.enumeration_error = Some(e.to_string());
                    continue;
                }
            };

            if let Some(max) = self.options.max_items {
                if report.listings_seen >= max {
                    info!("Reached maximum number of items ({}), stopping", max);
                    break;
                }
            }
            if report.listings_seen > 0 {
                self.polite_delay();
            }
            report.listings_seen += 1;

            let outcome = {
                let lookup = PendingBatch {
                    batch: &batch,
                    persisted: &*repo,
                };
                self.process_listing(&url, &lookup)
            };

            match outcome {
                Ok(outcome) => {
                    info!("{} -> {}", url, outcome.decision);
                    report.count(outcome.decision);
                    show(&mut tui, |t| t.listing_result(&url, outcome.decision));
                    if let Some(record) = outcome.record {
                        batch.push(record);
                    }
                }
                Err(e) => {
                    warn!("Skipping listing {}: {}", url, e);
                    show(&mut tui, |t| t.listing_failed(&url, &e.to_string()));
                    report.failures.push(ListingFailure {
                        url: url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.pages_requested = urls.pages_requested();
        report.appended = batch.len();
        repo.append_all(batch)
            .context("Failed to append this run's records to the dataset")?;

        info!(
            "Run finished: {} listings, {} new, {} price updates, {} unchanged, {} failed",
            report.listings_seen,
            report.new,
            report.price_changed,
            report.unchanged,
            report.failures.len()
        );

        let total = repo.len();
        show(&mut tui, |t| t.show_final_summary(report.appended, total));

        Ok(report)
    }

    fn process_listing<R: ListingRepository>(
        &self,
        raw_url: &str,
        lookup: &PendingBatch<'_, R>,
    ) -> Result<Reconciliation, ListingError> {
        let key = derive_key(raw_url)?;
        let url = normalize_url(raw_url);
        debug!("Processing {} ({})", key, url);

        let mut page = self.fetcher.fetch_page(url)?;
        let sections = self.fetcher.find_text_blocks(&page, DATA_SELECTOR)?;

        let mut fresh = parser::extract(&sections, url, &key);
        if sections.is_empty() {
            warn!("No data blocks found for {}", key);
            fresh.add_note(NOTE_EXTRACTION_INCOMPLETE);
        }

        let mut outcome = reconcile(fresh, lookup);

        if outcome.requires(SideEffect::SaveDescription) && !self.save_description(&mut page, &key) {
            if let Some(record) = outcome.record.as_mut() {
                record.add_note(NOTE_EXTRACTION_INCOMPLETE);
            }
        }

        if outcome.requires(SideEffect::DownloadPhotos) && self.options.download_photos {
            match self.download_photos(url, &key) {
                Ok(count) => info!("{} photos have been downloaded for {}", count, key),
                Err(e) => warn!("Photo download failed for {}: {}", key, e),
            }
        }

        Ok(outcome)
    }

    /// Persists the original description and, best effort, its translation.
    /// Returns false when the description could not be captured completely.
    fn save_description(&self, page: &mut F::Page, key: &ListingKey) -> bool {
        let mut complete = true;

        if let Err(e) = self.fetcher.click(page, DESCRIPTION_OPEN_BUTTON_SELECTOR) {
            warn!("Could not expand description for {}: {}", key, e);
            complete = false;
        }

        let description = match self.fetcher.find_text_blocks(page, DESCRIPTION_SELECTOR) {
            Ok(blocks) => blocks.into_iter().next(),
            Err(e) => {
                warn!("Could not read description for {}: {}", key, e);
                None
            }
        };

        let description = match description {
            Some(d) => d,
            None => {
                warn!("No description found for {}", key);
                return false;
            }
        };

        if let Err(e) = self.blobs.save(key, DESCRIPTION_FILE, description.as_bytes()) {
            warn!("Could not store description for {}: {}", key, e);
            return false;
        }

        if self.options.translate {
            let text = truncate_for_translation(&description);
            match self
                .translator
                .translate(text, &self.options.source_lang, &self.options.target_lang)
            {
                Ok(translated) => {
                    if let Err(e) = self.blobs.save(key, TRANSLATED_DESCRIPTION_FILE, translated.as_bytes()) {
                        warn!("Could not store translated description for {}: {}", key, e);
                    }
                }
                Err(e) => warn!("Translation failed for {}, keeping original only: {}", key, e),
            }
        }

        complete
    }

    fn download_photos(&self, url: &str, key: &ListingKey) -> Result<usize, ListingError> {
        let media_url = format!("{}{}", url, MEDIA_FRAGMENT);
        let page = self.fetcher.fetch_page(&media_url)?;
        let sources = self.fetcher.extract_attribute(&page, IMAGE_SELECTOR, "src")?;

        let progress = if self.options.show_progress {
            ProgressBar::new(sources.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("  📷 [{bar:30}] {pos}/{len} photos") {
            progress.set_style(style);
        }

        let mut saved = 0;
        for (index, source) in sources.iter().enumerate() {
            let name = photo_file_name(index, source);
            match self
                .fetcher
                .download(source)
                .and_then(|bytes| self.blobs.save(key, &name, &bytes))
            {
                Ok(()) => saved += 1,
                Err(e) => warn!("Photo {} of {} failed: {}", index + 1, key, e),
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        Ok(saved)
    }

    fn polite_delay(&self) {
        if self.options.delay_ms == 0 {
            return;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.options.delay_ms / 2);
        std::thread::sleep(Duration::from_millis(self.options.delay_ms + jitter));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct PagedSource {
        pages: Vec<Vec<String>>,
        requests: RefCell<Vec<usize>>,
    }

    impl ListingSource for PagedSource {
        fn name(&self) -> &str {
            "stub"
        }

        fn listing_page(&self, _params: &SearchParameters, page: usize) -> Result<Vec<String>, ListingError> {
            self.requests.borrow_mut().push(page);
            Ok(self.pages.get(page - 1).cloned().unwrap_or_default())
        }
    }

    fn source(non_empty_pages: usize) -> PagedSource {
        let pages = (1..=non_empty_pages)
            .map(|p| vec![format!("u{}a", p), format!("u{}b", p)])
            .collect();
        PagedSource {
            pages,
            requests: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn test_pagination_stops_at_first_empty_page() {
        let source = source(3);
        let params = SearchParameters::default();

        let urls: Vec<String> = ListingUrls::new(&source, &params, None)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(*source.requests.borrow(), vec![1, 2, 3, 4]);
        assert_eq!(urls, vec!["u1a", "u1b", "u2a", "u2b", "u3a", "u3b"]);
    }

    #[test]
    fn test_pagination_is_lazy() {
        let source = source(3);
        let params = SearchParameters::default();

        let first: Vec<_> = ListingUrls::new(&source, &params, None).take(2).collect();

        assert_eq!(first.len(), 2);
        assert_eq!(*source.requests.borrow(), vec![1]);
    }

    #[test]
    fn test_pagination_respects_max_pages() {
        let source = source(5);
        let params = SearchParameters::default();

        let mut urls = ListingUrls::new(&source, &params, Some(2));
        let count = urls.by_ref().count();

        assert_eq!(count, 4);
        assert_eq!(urls.pages_requested(), 2);
    }

    struct FailingSource;

    impl ListingSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        fn listing_page(&self, params: &SearchParameters, page: usize) -> Result<Vec<String>, ListingError> {
            if page == 1 {
                Ok(vec!["first".to_string()])
            } else {
                Err(ListingError::fetch(&params.search_url(page), "HTTP 503"))
            }
        }
    }

    #[test]
    fn test_pagination_error_ends_enumeration() {
        let params = SearchParameters::default();
        let items: Vec<_> = ListingUrls::new(&FailingSource, &params, None).collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "first");
        assert!(matches!(items[1], Err(ListingError::Fetch { .. })));
    }
}
