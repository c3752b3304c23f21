use thiserror::Error;

/// Failures that are scoped to a single listing. The orchestrator logs these
/// and moves on to the next listing instead of aborting the run.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("malformed listing url '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("page element '{element}' missing on {url}")]
    ExtractionIncomplete { url: String, element: String },

    #[error("translation failed: {0}")]
    TranslationFailure(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl ListingError {
    pub fn malformed(url: &str, reason: impl Into<String>) -> Self {
        ListingError::MalformedUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        ListingError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
