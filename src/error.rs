use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the extraction engine.
///
/// `UnknownTitle` is expected during corpus builds and usually just skipped
/// by the caller. `CorruptSegment` and `ArticleNotFound` both mean the index
/// and the dump disagree; they fail the one request, not the archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no multistream dump for language '{language}' in {dir:?}")]
    NoMatchingDump { dir: PathBuf, language: String },

    #[error("malformed index: {0}")]
    MalformedIndex(String),

    #[error("unknown article title '{0}'")]
    UnknownTitle(String),

    #[error("corrupt segment [{start}, {end}): {reason}")]
    CorruptSegment { start: u64, end: u64, reason: String },

    #[error("page {page_id} not found in segment starting at {start}")]
    ArticleNotFound { page_id: u32, start: u64 },

    #[error("index cache error: {0}")]
    Cache(#[from] bincode::Error),

    #[error("failed to render article: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExtractError {
    pub(crate) fn corrupt(start: u64, end: u64, reason: impl ToString) -> Self {
        ExtractError::CorruptSegment {
            start,
            end,
            reason: reason.to_string(),
        }
    }

    /// True for failures that mean the index no longer matches the dump.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            ExtractError::CorruptSegment { .. } | ExtractError::ArticleNotFound { .. }
        )
    }
}
