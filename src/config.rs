/// Bump whenever the on-disk layout of the index cache changes
pub const CACHE_VERSION: u32 = 1;

/// Default directory for index caches when the caller doesn't pass one
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Replaced in the dump file name to derive its index file name
pub const DUMP_EXTENSION: &str = ".xml.bz2";
pub const INDEX_EXTENSION: &str = "-index.txt.bz2";

/// Replaced in the index file name to derive its cache file name
pub const INDEX_TEXT_EXTENSION: &str = ".txt.bz2";
pub const CACHE_EXTENSION: &str = ".cache";

/// Pre-size for the title map (enwiki has ~17M index lines)
pub const INDEX_CAPACITY_HINT: usize = 1 << 16;

/// Read buffer for the bzip2 index file and the cache file
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Progress update interval (tick every N requests)
pub const PROGRESS_INTERVAL: u64 = 100;

/// Longest title used verbatim as an output file stem, leaving room for a
/// hash suffix and extension within a 255-byte file name
pub const MAX_STEM_BYTES: usize = 200;

/// Upper bound on the up-front buffer for one decompressed segment
pub const SEGMENT_RESERVE_CAP: usize = 4 * 1024 * 1024;
