use crate::cache::IndexCache;
use crate::error::ExtractError;
use crate::extract::extract_article;
use crate::index::SegmentIndex;
use crate::locator::{self, DumpArchive};
use crate::models::ArticleRecord;
use crate::segment::SegmentReader;
use crate::title::url_to_title;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// An opened dump: its files, its segment index and a reader on the dump.
///
/// `extract` takes `&self` and may be called from many threads at once.
#[derive(Debug)]
pub struct WikiArchive {
    archive: DumpArchive,
    index: Arc<SegmentIndex>,
    reader: SegmentReader,
}

impl WikiArchive {
    /// Locates the dump for `language` in `dump_dir` and loads its index.
    ///
    /// With a cache the index is served from (or saved to) it; without one it
    /// is rebuilt from the index file.
    pub fn open(
        dump_dir: &Path,
        language: &str,
        cache: Option<&IndexCache>,
    ) -> Result<Self, ExtractError> {
        let archive = locator::locate(dump_dir, language)?;
        info!(
            dump = ?archive.dump_path,
            date = %archive.date,
            "Opening multistream dump"
        );

        let index = match cache {
            Some(cache) => cache.load_or_build(&archive)?,
            None => SegmentIndex::build(&archive)?,
        };
        Self::from_parts(archive, Arc::new(index))
    }

    pub fn from_parts(archive: DumpArchive, index: Arc<SegmentIndex>) -> Result<Self, ExtractError> {
        let reader = SegmentReader::open(&archive.dump_path)?;
        Ok(Self {
            archive,
            index,
            reader,
        })
    }

    pub fn archive(&self) -> &DumpArchive {
        &self.archive
    }

    pub fn index(&self) -> &Arc<SegmentIndex> {
        &self.index
    }

    /// Swaps in a rebuilt index snapshot; the old one stays valid for anyone holding it.
    pub fn replace_index(&mut self, index: Arc<SegmentIndex>) {
        self.index = index;
    }

    /// Fetches the latest revision of `title`, tagged with the caller's `external_id`.
    pub fn extract(&self, title: &str, external_id: &str) -> Result<ArticleRecord, ExtractError> {
        let entry = self
            .index
            .get(title)
            .ok_or_else(|| ExtractError::UnknownTitle(title.to_string()))?;

        debug!(
            title,
            page_id = entry.page_id,
            start = entry.start,
            end = entry.end,
            "Reading segment"
        );
        let fragment = self.reader.read_segment(entry.start, entry.end)?;
        extract_article(&fragment, entry, external_id)
    }

    /// Like [`extract`](Self::extract), for a Wikipedia article URL.
    pub fn extract_url(&self, url: &str, external_id: &str) -> Result<ArticleRecord, ExtractError> {
        let title = url_to_title(url).ok_or_else(|| ExtractError::UnknownTitle(url.to_string()))?;
        self.extract(&title, external_id)
    }
}
