use crate::error::ExtractError;
use crate::index::SegmentIndexEntry;
use crate::models::ArticleRecord;
use crate::parser::PageReader;
use tracing::debug;

/// Picks the page with `entry.page_id` out of a decompressed segment.
///
/// Page ids are unique within a dump, so the first match is the only one.
/// No match means the index and the dump disagree.
pub fn extract_article(
    fragment: &str,
    entry: &SegmentIndexEntry,
    external_id: &str,
) -> Result<ArticleRecord, ExtractError> {
    let mut scanned = 0usize;
    for page in PageReader::from_fragment(fragment) {
        let page = page.map_err(|e| ExtractError::corrupt(entry.start, entry.end, e))?;
        scanned += 1;
        if page.id != entry.page_id {
            continue;
        }

        debug!(
            page_id = page.id,
            title = %page.title,
            scanned,
            "Article found in segment"
        );
        return Ok(ArticleRecord {
            id: external_id.to_string(),
            title: page.title,
            text: page.text.unwrap_or_default(),
        });
    }

    Err(ExtractError::ArticleNotFound {
        page_id: entry.page_id,
        start: entry.start,
    })
}
