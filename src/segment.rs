use crate::config::SEGMENT_RESERVE_CAP;
use crate::error::ExtractError;
use bzip2::read::BzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Read-only handle on a multistream dump.
///
/// Reads are positioned, so one reader can serve many threads at once
/// without a shared seek cursor.
#[derive(Debug)]
pub struct SegmentReader {
    path: PathBuf,
    file: File,
    len: u64,
}

impl SegmentReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self { path, file, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the raw compressed bytes of `[start, end)`.
    pub fn read_raw(&self, start: u64, end: u64) -> Result<Vec<u8>, ExtractError> {
        if start >= end || end > self.len {
            return Err(ExtractError::corrupt(
                start,
                end,
                format!("range outside archive of {} bytes", self.len),
            ));
        }

        let len = usize::try_from(end - start)
            .map_err(|_| ExtractError::corrupt(start, end, "segment too large"))?;
        let mut buf = vec![0u8; len];
        self.read_exact_at(&mut buf, start)?;
        Ok(buf)
    }

    /// Reads `[start, end)` and decompresses it as one bzip2 stream.
    pub fn read_segment(&self, start: u64, end: u64) -> Result<String, ExtractError> {
        let raw = self.read_raw(start, end)?;
        let xml = decompress_segment(&raw)
            .map_err(|reason| ExtractError::corrupt(start, end, reason))?;
        trace!(
            start,
            end,
            compressed = raw.len(),
            decompressed = xml.len(),
            "Segment decompressed"
        );
        Ok(xml)
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), ExtractError> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), ExtractError> {
        use std::io::{Seek, SeekFrom};
        // Fresh handle per read keeps the shared handle's cursor untouched.
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}

/// Decodes the bzip2 stream at the start of `raw`.
///
/// The last segment of a dump runs to end of file and also covers the
/// `</mediawiki>` footer stream, so bytes after the first stream are ignored.
pub fn decompress_segment(raw: &[u8]) -> Result<String, String> {
    let mut decoder = BzDecoder::new(raw);
    let mut bytes = Vec::with_capacity(decoded_capacity(raw.len()));
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| format!("bzip2 decode failed: {}", e))?;

    String::from_utf8(bytes).map_err(|e| format!("segment is not valid UTF-8: {}", e))
}

/// Initial buffer for a segment that compressed to `compressed` bytes.
fn decoded_capacity(compressed: usize) -> usize {
    compressed.saturating_mul(8).min(SEGMENT_RESERVE_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn compress(text: &str) -> Vec<u8> {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    /// Writes independently compressed streams back to back, returning their offsets.
    fn multistream(parts: &[&str]) -> (NamedTempFile, Vec<u64>) {
        let mut tmp = NamedTempFile::new().unwrap();
        let mut offsets = vec![0u64];
        for part in parts {
            let bytes = compress(part);
            tmp.write_all(&bytes).unwrap();
            offsets.push(offsets.last().unwrap() + bytes.len() as u64);
        }
        tmp.flush().unwrap();
        (tmp, offsets)
    }

    #[test]
    fn reads_each_stream_independently() {
        let (tmp, offsets) =
            multistream(&["<page>one</page>", "<page>two</page>", "<page>three</page>"]);
        let reader = SegmentReader::open(tmp.path()).unwrap();

        assert_eq!(reader.len(), offsets[3]);
        let read = |i: usize| reader.read_segment(offsets[i], offsets[i + 1]).unwrap();
        assert_eq!(read(1), "<page>two</page>");
        assert_eq!(read(0), "<page>one</page>");
        assert_eq!(read(2), "<page>three</page>");
    }

    #[test]
    fn repeated_reads_are_identical() {
        let (tmp, offsets) = multistream(&["<page>a</page>", "<page>b</page>"]);
        let reader = SegmentReader::open(tmp.path()).unwrap();
        let first = reader.read_segment(offsets[1], offsets[2]).unwrap();
        let second = reader.read_segment(offsets[1], offsets[2]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn range_past_end_is_corrupt() {
        let (tmp, offsets) = multistream(&["<page>a</page>"]);
        let reader = SegmentReader::open(tmp.path()).unwrap();
        let result = reader.read_segment(0, offsets[1] + 1);
        assert!(matches!(result, Err(ExtractError::CorruptSegment { .. })));
    }

    #[test]
    fn empty_or_inverted_range_is_corrupt() {
        let (tmp, offsets) = multistream(&["<page>a</page>"]);
        let reader = SegmentReader::open(tmp.path()).unwrap();
        assert!(matches!(
            reader.read_segment(5, 5),
            Err(ExtractError::CorruptSegment { .. })
        ));
        assert!(matches!(
            reader.read_segment(offsets[1], 0),
            Err(ExtractError::CorruptSegment { .. })
        ));
    }

    #[test]
    fn misaligned_start_is_corrupt() {
        let (tmp, offsets) = multistream(&["<page>a</page>", "<page>b</page>"]);
        let reader = SegmentReader::open(tmp.path()).unwrap();
        let result = reader.read_segment(offsets[0] + 3, offsets[1]);
        assert!(matches!(result, Err(ExtractError::CorruptSegment { .. })));
    }

    #[test]
    fn truncated_segment_is_corrupt() {
        let (tmp, offsets) = multistream(&["<page>a</page>", "<page>b</page>"]);
        let reader = SegmentReader::open(tmp.path()).unwrap();
        let result = reader.read_segment(offsets[0], offsets[1] - 4);
        assert!(matches!(result, Err(ExtractError::CorruptSegment { .. })));
    }

    #[test]
    fn only_the_first_stream_is_decoded() {
        let (tmp, offsets) = multistream(&["<page>a</page>", "</mediawiki>"]);
        let reader = SegmentReader::open(tmp.path()).unwrap();
        assert_eq!(reader.read_segment(offsets[0], offsets[2]).unwrap(), "<page>a</page>");
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = SegmentReader::open("/nonexistent/dump.xml.bz2");
        assert!(matches!(result, Err(ExtractError::Io(_))));
    }

    #[test]
    fn concurrent_reads_share_one_handle() {
        let parts: Vec<String> = (0..8).map(|i| format!("<page>{}</page>", i)).collect();
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        let (tmp, offsets) = multistream(&refs);
        let reader = SegmentReader::open(tmp.path()).unwrap();

        std::thread::scope(|s| {
            for i in 0..8 {
                let reader = &reader;
                let offsets = &offsets;
                s.spawn(move || {
                    for _ in 0..20 {
                        let text = reader.read_segment(offsets[i], offsets[i + 1]).unwrap();
                        assert_eq!(text, format!("<page>{}</page>", i));
                    }
                });
            }
        });
    }

    #[test]
    fn decode_buffer_reservation_is_capped() {
        assert_eq!(decoded_capacity(1000), 8000);
        assert_eq!(decoded_capacity(256 * 1024 * 1024), SEGMENT_RESERVE_CAP);
        assert_eq!(decoded_capacity(usize::MAX), SEGMENT_RESERVE_CAP);
    }
}
