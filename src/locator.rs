use crate::config::{DUMP_EXTENSION, INDEX_EXTENSION};
use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

static DUMP_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9_-]+)wiki-(\d{8})-pages-articles-multistream\.xml\.bz2$").unwrap()
});

/// A multistream dump and its offset index, both carrying the same date stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpArchive {
    pub dump_path: PathBuf,
    pub index_path: PathBuf,
    pub language: String,
    /// `YYYYMMDD` stamp taken from the file name
    pub date: String,
}

impl DumpArchive {
    pub fn dump_len(&self) -> Result<u64, ExtractError> {
        Ok(fs::metadata(&self.dump_path)?.len())
    }
}

/// Derives `<lang>wiki-<date>-pages-articles-multistream-index.txt.bz2` from the dump name.
pub fn index_file_name(dump_file_name: &str) -> Option<String> {
    dump_file_name
        .strip_suffix(DUMP_EXTENSION)
        .map(|stem| format!("{}{}", stem, INDEX_EXTENSION))
}

/// Finds the dump/index pair for `language` in `dir`.
///
/// When several dates are present the most recent one with an index wins;
/// a dump without its index is ignored.
pub fn locate(dir: &Path, language: &str) -> Result<DumpArchive, ExtractError> {
    let language = language.trim().to_lowercase();
    let no_match = || ExtractError::NoMatchingDump {
        dir: dir.to_path_buf(),
        language: language.clone(),
    };

    if language.is_empty() || !dir.is_dir() {
        return Err(no_match());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    let mut best: Option<DumpArchive> = None;
    for name in &names {
        let Some(caps) = DUMP_NAME_REGEX.captures(name) else {
            continue;
        };
        if caps[1] != *language {
            continue;
        }
        let date = caps[2].to_string();
        let Some(index_name) = index_file_name(name) else {
            continue;
        };
        if !names.contains(&index_name) {
            debug!(dump = %name, index = %index_name, "Dump has no matching index, skipping");
            continue;
        }
        if best.as_ref().is_some_and(|b| b.date >= date) {
            continue;
        }
        best = Some(DumpArchive {
            dump_path: dir.join(name),
            index_path: dir.join(&index_name),
            language: language.clone(),
            date,
        });
    }

    match best {
        Some(archive) => {
            debug!(
                dump = ?archive.dump_path,
                date = %archive.date,
                "Located multistream dump"
            );
            Ok(archive)
        }
        None => Err(no_match()),
    }
}
