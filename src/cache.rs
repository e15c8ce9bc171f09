use crate::config::{CACHE_EXTENSION, CACHE_VERSION, INDEX_TEXT_EXTENSION, READ_BUFFER_SIZE};
use crate::error::ExtractError;
use crate::index::{SegmentIndex, SegmentIndexEntry};
use crate::locator::DumpArchive;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

#[derive(Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: u32,
    /// File name of the index the cache was built from
    pub index_file: String,
    pub archive_len: u64,
    pub segment_count: u64,
    pub entry_count: u64,
}

#[derive(Deserialize)]
struct IndexCacheDe {
    metadata: CacheMetadata,
    entries: Vec<(String, SegmentIndexEntry)>,
}

/// Borrows the titles so millions of strings aren't cloned during serialization.
#[derive(Serialize)]
struct IndexCacheSer<'a> {
    metadata: CacheMetadata,
    entries: Vec<(&'a str, &'a SegmentIndexEntry)>,
}

/// Binary snapshots of segment indexes, one file per index file name.
///
/// The key is derived from the index file name, which carries the dump date,
/// so a newer dump never picks up an older snapshot.
#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

fn index_file_name(index_path: &Path) -> String {
    index_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl IndexCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cache_path(&self, index_path: &Path) -> PathBuf {
        let name = index_file_name(index_path);
        let stem = name.strip_suffix(INDEX_TEXT_EXTENSION).unwrap_or(&name);
        self.dir.join(format!("{}{}", stem, CACHE_EXTENSION))
    }

    /// Returns `Ok(Some(index))` for a usable snapshot, `Ok(None)` if missing, corrupt or stale.
    pub fn load(&self, index_path: &Path) -> Result<Option<SegmentIndex>, ExtractError> {
        let path = self.cache_path(index_path);
        if !path.exists() {
            return Ok(None);
        }

        let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = File::open(&path)?;
        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let options = bincode::options().with_limit(file_size.saturating_add(1024));

        let cache: IndexCacheDe = match options.deserialize_from(reader) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, path = ?path, "Index cache is corrupt or unreadable");
                return Ok(None);
            }
        };

        if cache.metadata.version != CACHE_VERSION {
            info!(
                cached = cache.metadata.version,
                current = CACHE_VERSION,
                "Index cache version mismatch"
            );
            return Ok(None);
        }

        let expected = index_file_name(index_path);
        if cache.metadata.index_file != expected {
            info!(
                cached = cache.metadata.index_file,
                current = expected,
                "Index cache belongs to another index file"
            );
            return Ok(None);
        }

        if cache.entries.len() as u64 != cache.metadata.entry_count {
            warn!(
                expected = cache.metadata.entry_count,
                found = cache.entries.len(),
                "Index cache entry count mismatch"
            );
            return Ok(None);
        }

        info!(
            titles = cache.metadata.entry_count,
            segments = cache.metadata.segment_count,
            "Segment index loaded from cache"
        );

        Ok(Some(SegmentIndex::from_entries(
            cache.entries,
            cache.metadata.segment_count as usize,
            cache.metadata.archive_len,
        )))
    }

    /// Writes the snapshot to a uniquely named temp file and renames it into place.
    ///
    /// Concurrent stores of the same key each write their own temp file; the
    /// last rename wins and readers only ever see a complete snapshot.
    pub fn store(&self, index_path: &Path, index: &SegmentIndex) -> Result<(), ExtractError> {
        let path = self.cache_path(index_path);
        fs::create_dir_all(&self.dir)?;

        let entries = index.sorted_entries();
        let cache = IndexCacheSer {
            metadata: CacheMetadata {
                version: CACHE_VERSION,
                index_file: index_file_name(index_path),
                archive_len: index.archive_len(),
                segment_count: index.segment_count() as u64,
                entry_count: entries.len() as u64,
            },
            entries,
        };

        let mut writer = BufWriter::new(NamedTempFile::new_in(&self.dir)?);
        bincode::DefaultOptions::new().serialize_into(&mut writer, &cache)?;
        writer.flush()?;

        let tmp = writer.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        info!(
            titles = cache.metadata.entry_count,
            path = ?path,
            "Index cache saved"
        );

        Ok(())
    }

    /// Serves the index from cache, building and storing it on a miss.
    ///
    /// A snapshot taken when the dump had another length (say, a partial
    /// download) counts as a miss: its last segment would end at the old size.
    /// A failed store only costs a rebuild next time, so it is logged, not returned.
    pub fn load_or_build(&self, archive: &DumpArchive) -> Result<SegmentIndex, ExtractError> {
        if let Some(index) = self.load(&archive.index_path)? {
            let dump_len = archive.dump_len()?;
            if index.archive_len() == dump_len {
                return Ok(index);
            }
            info!(
                cached = index.archive_len(),
                current = dump_len,
                "Index cache was built for a different dump length"
            );
        }

        info!("Building index (cache miss or invalid)");
        let index = SegmentIndex::build(archive)?;
        if let Err(e) = self.store(&archive.index_path, &index) {
            warn!(error = %e, "Failed to save index cache");
        }
        Ok(index)
    }
}
