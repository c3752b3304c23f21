use crate::error::ListingError;
use crate::models::ListingKey;

/// Returns the listing URL without fragment, query string or trailing `/`.
pub fn normalize_url(url: &str) -> &str {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);
    let url = url.split('?').next().unwrap_or(url);
    url.trim_end_matches('/')
}

/// Derives the (city, address) key from a listing URL of the form
/// `.../<city>/<type>-<id>-<street>-<number>`.
pub fn derive_key(url: &str) -> Result<ListingKey, ListingError> {
    let normalized = normalize_url(url);
    let segments: Vec<&str> = normalized.split('/').collect();

    if segments.len() < 4 {
        return Err(ListingError::malformed(
            url,
            format!("expected at least 4 path segments, found {}", segments.len()),
        ));
    }

    let city = segments[segments.len() - 2].to_lowercase();
    if !is_plain_segment(&city) {
        return Err(ListingError::malformed(url, format!("invalid city segment '{}'", city)));
    }

    // Address part has the form: { huis | appartement }-{id}-streetname-number
    let slug = segments[segments.len() - 1];
    let tokens: Vec<&str> = slug.split('-').collect();
    if tokens.len() < 3 {
        return Err(ListingError::malformed(
            url,
            format!("slug '{}' lacks <type>-<id>-<address> tokens", slug),
        ));
    }

    let address = tokens[2..].join("_").to_lowercase();
    if !is_plain_segment(&address) {
        return Err(ListingError::malformed(url, format!("invalid address '{}'", address)));
    }

    Ok(ListingKey { city, address })
}

// Key parts become directory names of the blob store.
fn is_plain_segment(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains('\\')
}
