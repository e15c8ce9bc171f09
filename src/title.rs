use percent_encoding::percent_decode_str;
use url::Url;

/// Turns a Wikipedia article URL into the title used by the dump index.
///
/// `https://nl.wikipedia.org/wiki/Caf%C3%A9_Americain` becomes `Café Americain`.
/// Anything that doesn't parse as a URL is treated as a bare path or title.
pub fn url_to_title(url: &str) -> Option<String> {
    let url = url.trim();
    let encoded = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(str::to_string),
        Err(_) => url.rsplit('/').find(|s| !s.is_empty()).map(str::to_string),
    }?;

    let decoded = percent_decode_str(&encoded).decode_utf8().ok()?;
    let title = decoded.replace('_', " ");
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Accepts either a full URL or a plain title; plain titles pass through untouched.
pub fn resolve_title(title_or_url: &str) -> Option<String> {
    if title_or_url.starts_with("http://") || title_or_url.starts_with("https://") {
        url_to_title(title_or_url)
    } else {
        let title = title_or_url.trim();
        (!title.is_empty()).then(|| title.to_string())
    }
}
