use crate::config::{INDEX_CAPACITY_HINT, READ_BUFFER_SIZE};
use crate::error::ExtractError;
use crate::locator::DumpArchive;
use bzip2::read::MultiBzDecoder;
use memchr::memchr;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Where one article lives: the compressed segment `[start, end)` and its page id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentIndexEntry {
    pub page_id: u32,
    pub start: u64,
    pub end: u64,
}

impl SegmentIndexEntry {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Title to segment mapping for one dump. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentIndex {
    entries: FxHashMap<String, SegmentIndexEntry>,
    segment_count: usize,
    archive_len: u64,
}

/// One `offset:page_id:title` line, borrowed from the index text.
struct IndexLine<'a> {
    offset: u64,
    page_id: u32,
    title: &'a str,
}

/// Splits on the first two colons only; titles may contain colons themselves.
fn parse_line(line: &str) -> Option<IndexLine<'_>> {
    let bytes = line.as_bytes();
    let first = memchr(b':', bytes)?;
    let second = first + 1 + memchr(b':', &bytes[first + 1..])?;
    let title = &line[second + 1..];
    if title.is_empty() {
        return None;
    }
    Some(IndexLine {
        offset: line[..first].parse().ok()?,
        page_id: line[first + 1..second].parse().ok()?,
        title,
    })
}

/// Index titles are XML-escaped (`AT&amp;T`).
pub fn decode_title(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    match quick_xml::escape::unescape(raw) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Owned(raw.replace("&amp;", "&")),
    }
}

impl SegmentIndex {
    /// Builds the index from decompressed index text.
    ///
    /// `archive_len` closes the last segment. Malformed lines are skipped; only
    /// an index without a single usable line is an error.
    pub fn parse(text: &str, archive_len: u64) -> Result<Self, ExtractError> {
        // Pass 1: distinct segment starts in first-seen order, each ending where the next begins.
        let mut seen = FxHashSet::default();
        let mut starts = Vec::new();
        for line in text.lines().filter_map(parse_line) {
            if seen.insert(line.offset) {
                starts.push(line.offset);
            }
        }

        if starts.is_empty() {
            return Err(ExtractError::MalformedIndex(
                "no valid offset:page_id:title lines".to_string(),
            ));
        }

        let ends: FxHashMap<u64, u64> = starts
            .iter()
            .enumerate()
            .map(|(i, &start)| (start, starts.get(i + 1).copied().unwrap_or(archive_len)))
            .collect();

        // Pass 2: one entry per title, first occurrence wins.
        let mut entries =
            FxHashMap::with_capacity_and_hasher(INDEX_CAPACITY_HINT, Default::default());
        let mut duplicates = 0usize;
        for line in text.lines().filter_map(parse_line) {
            let title = decode_title(line.title);
            if entries.contains_key(title.as_ref()) {
                duplicates += 1;
                continue;
            }
            entries.insert(
                title.into_owned(),
                SegmentIndexEntry {
                    page_id: line.page_id,
                    start: line.offset,
                    end: ends[&line.offset],
                },
            );
        }

        if duplicates > 0 {
            debug!(duplicates, "Ignored duplicate titles in index");
        }

        Ok(Self {
            entries,
            segment_count: starts.len(),
            archive_len,
        })
    }

    /// Reads and parses the archive's bzip2 index file.
    pub fn build(archive: &DumpArchive) -> Result<Self, ExtractError> {
        let archive_len = archive.dump_len()?;
        info!("Building segment index from: {:?}", archive.index_path);

        let text = read_bz2_text(&archive.index_path)?;
        let index = Self::parse(&text, archive_len).map_err(|e| match e {
            ExtractError::MalformedIndex(reason) => ExtractError::MalformedIndex(format!(
                "{}: {}",
                archive.index_path.display(),
                reason
            )),
            other => other,
        })?;

        info!(
            titles = index.len(),
            segments = index.segment_count(),
            "Segment index built"
        );
        Ok(index)
    }

    /// Reassembles an index from previously built entries (used by the cache).
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, SegmentIndexEntry)>,
        segment_count: usize,
        archive_len: u64,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            segment_count,
            archive_len,
        }
    }

    pub fn get(&self, title: &str) -> Option<&SegmentIndexEntry> {
        self.entries.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.entries.contains_key(title)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn archive_len(&self) -> u64 {
        self.archive_len
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SegmentIndexEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries ordered by title, for deterministic serialization.
    pub fn sorted_entries(&self) -> Vec<(&str, &SegmentIndexEntry)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

fn read_bz2_text(path: &Path) -> Result<String, ExtractError> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, MultiBzDecoder::new(file));
    let mut text = String::new();
    match reader.read_to_string(&mut text) {
        Ok(_) => Ok(text),
        Err(e) if matches!(e.kind(), io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput) => {
            Err(ExtractError::MalformedIndex(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(page_id: u32, start: u64, end: u64) -> SegmentIndexEntry {
        SegmentIndexEntry {
            page_id,
            start,
            end,
        }
    }

    #[test]
    fn example_index_over_300_byte_archive() {
        let index = SegmentIndex::parse("0:10:Cat\n0:11:Dog\n150:12:Elephant", 300).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("Cat"), Some(&entry(10, 0, 150)));
        assert_eq!(index.get("Dog"), Some(&entry(11, 0, 150)));
        assert_eq!(index.get("Elephant"), Some(&entry(12, 150, 300)));
        assert_eq!(index.segment_count(), 2);
    }

    #[test]
    fn segment_ends_follow_next_distinct_start() {
        let text = "100:1:A\n100:2:B\n250:3:C\n250:4:D\n900:5:E\n";
        let index = SegmentIndex::parse(text, 1200).unwrap();
        for title in ["A", "B"] {
            let e = index.get(title).unwrap();
            assert_eq!((e.start, e.end), (100, 250));
        }
        for title in ["C", "D"] {
            let e = index.get(title).unwrap();
            assert_eq!((e.start, e.end), (250, 900));
        }
        assert_eq!(index.get("E").unwrap().end, 1200);
        assert_eq!(index.get("E").unwrap().len(), 300);
    }

    #[test]
    fn first_occurrence_of_title_wins() {
        let text = "0:1:Mercury\n50:2:Venus\n50:3:Mercury\n";
        let index = SegmentIndex::parse(text, 100).unwrap();
        assert_eq!(index.get("Mercury"), Some(&entry(1, 0, 50)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "0:1:Alpha\n0:2\nnot a line\nx:3:Gamma\n0:y:Delta\n0:4:Beta\n";
        let index = SegmentIndex::parse(text, 10).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains("Alpha"));
        assert!(index.contains("Beta"));
    }

    #[test]
    fn malformed_lines_do_not_create_segments() {
        // The bad line's offset must not split the segment of its neighbours.
        let text = "0:1:Alpha\n70:2\n200:3:Beta\n";
        let index = SegmentIndex::parse(text, 300).unwrap();
        assert_eq!(index.get("Alpha").unwrap().end, 200);
    }

    #[test]
    fn titles_keep_embedded_colons() {
        let index = SegmentIndex::parse("0:7:Star Wars: Episode IV\n", 10).unwrap();
        assert_eq!(index.get("Star Wars: Episode IV").unwrap().page_id, 7);
    }

    #[test]
    fn titles_are_entity_decoded() {
        let index = SegmentIndex::parse("0:1:AT&amp;T\n0:2:Tom &amp; Jerry\n", 10).unwrap();
        assert!(index.contains("AT&T"));
        assert!(index.contains("Tom & Jerry"));
        assert!(!index.contains("AT&amp;T"));
    }

    #[test]
    fn titles_are_case_sensitive() {
        let index = SegmentIndex::parse("0:1:Rust\n", 10).unwrap();
        assert!(index.contains("Rust"));
        assert!(!index.contains("rust"));
    }

    #[test]
    fn crlf_line_endings() {
        let index = SegmentIndex::parse("0:1:Alpha\r\n5:2:Beta\r\n", 10).unwrap();
        assert!(index.contains("Alpha"));
        assert_eq!(index.get("Beta").unwrap().end, 10);
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(
            SegmentIndex::parse("", 10),
            Err(ExtractError::MalformedIndex(_))
        ));
    }

    #[test]
    fn all_lines_malformed_is_malformed() {
        assert!(matches!(
            SegmentIndex::parse("garbage\n1:2\n:::\n", 10),
            Err(ExtractError::MalformedIndex(_))
        ));
    }

    #[test]
    fn decode_title_borrows_plain_titles() {
        assert!(matches!(decode_title("Plain"), Cow::Borrowed("Plain")));
        assert_eq!(decode_title("A &amp; B"), "A & B");
        assert_eq!(decode_title("&quot;Quoted&quot;"), "\"Quoted\"");
    }

    #[test]
    fn from_entries_matches_parsed_index() {
        let parsed = SegmentIndex::parse("0:1:A\n0:2:B\n50:3:C\n", 80).unwrap();
        let rebuilt = SegmentIndex::from_entries(
            vec![
                ("A".to_string(), entry(1, 0, 50)),
                ("B".to_string(), entry(2, 0, 50)),
                ("C".to_string(), entry(3, 50, 80)),
            ],
            2,
            80,
        );
        assert_eq!(rebuilt, parsed);
    }

    #[test]
    fn sorted_entries_are_ordered_by_title() {
        let index = SegmentIndex::parse("0:1:Zebra\n0:2:Aardvark\n0:3:Mole\n", 10).unwrap();
        let titles: Vec<_> = index.sorted_entries().into_iter().map(|(t, _)| t).collect();
        assert_eq!(titles, vec!["Aardvark", "Mole", "Zebra"]);
    }
}
