use crate::models::WikiPage;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::{BufRead, Chain, Read};
use thiserror::Error;

const ROOT_OPEN: &[u8] = b"<doc>";
const ROOT_CLOSE: &[u8] = b"</doc>";

/// Depth of `<page>` below the synthetic root.
const PAGE_DEPTH: usize = 2;

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error("page id is not a number: '{0}'")]
    InvalidId(String),
}

/// Text-bearing elements we collect; everything else inside a page is skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    PageId,
    Text,
}

/// Streams `<page>` elements out of a decompressed segment.
///
/// A segment is a run of sibling `<page>` elements with no common root, so the
/// input is wrapped in a synthetic `<doc>` element. Only `<id>` directly under
/// `<page>` is the page id; revision and contributor ids are ignored. When a
/// page lists several revisions the last one's text is kept.
pub struct PageReader<R: BufRead> {
    reader: Reader<Chain<Chain<&'static [u8], R>, &'static [u8]>>,
    buf: Vec<u8>,
    /// Element names from `<doc>` down to the current element, kept across pages
    path: Vec<Vec<u8>>,
    done: bool,
}

impl<'a> PageReader<&'a [u8]> {
    pub fn from_fragment(fragment: &'a str) -> Self {
        Self::new(fragment.as_bytes())
    }
}

impl<R: BufRead> PageReader<R> {
    pub fn new(fragment: R) -> Self {
        let wrapped = ROOT_OPEN.chain(fragment).chain(ROOT_CLOSE);
        let mut reader = Reader::from_reader(wrapped);
        reader.check_end_names(true);
        Self {
            reader,
            buf: Vec::with_capacity(8192),
            path: Vec::with_capacity(8),
            done: false,
        }
    }

    /// Returns the next page, `Ok(None)` at the end of the fragment.
    pub fn next_page(&mut self) -> Result<Option<WikiPage>, PageError> {
        let mut page: Option<WikiPage> = None;
        let mut field: Option<Field> = None;
        let mut value = String::new();
        let mut revision_text: Option<String> = None;

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    self.path.push(e.name().as_ref().to_vec());
                    let depth = self.path.len();
                    match (depth, self.path[depth - 1].as_slice()) {
                        (PAGE_DEPTH, b"page") => {
                            page = Some(WikiPage::default());
                        }
                        (3, b"revision") => {
                            revision_text = None;
                        }
                        _ if page.is_some() => {
                            field = field_for(&self.path);
                            value.clear();
                        }
                        _ => {}
                    }
                }
                Event::Empty(ref e) => {
                    if page.is_some() && is_revision_text(&self.path, e) {
                        // <text bytes="0" />
                        revision_text = Some(String::new());
                    }
                }
                Event::Text(ref e) => {
                    if field.is_some() {
                        value.push_str(&e.unescape()?);
                    }
                }
                Event::CData(ref e) => {
                    if field.is_some() {
                        value.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::End(_) => {
                    let depth = self.path.len();
                    if let Some(ref mut current) = page {
                        if let Some(f) = field.take() {
                            let text = std::mem::take(&mut value);
                            match f {
                                Field::Title => current.title = text,
                                Field::PageId => {
                                    current.id = text
                                        .trim()
                                        .parse()
                                        .map_err(|_| PageError::InvalidId(text))?;
                                }
                                Field::Text => revision_text = Some(text),
                            }
                        } else if depth == 3 && self.path[2] == b"revision" {
                            if let Some(text) = revision_text.take() {
                                current.text = Some(text);
                            }
                        }
                    }
                    self.path.pop();
                    if depth == PAGE_DEPTH {
                        if let Some(done) = page.take() {
                            return Ok(Some(done));
                        }
                    }
                }
                Event::Eof => {
                    self.done = true;
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for PageReader<R> {
    type Item = Result<WikiPage, PageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_page() {
            Ok(Some(page)) => Some(Ok(page)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Maps an element path (`doc/page/...`) to the field it carries, if any.
fn field_for(path: &[Vec<u8>]) -> Option<Field> {
    let names: Vec<&[u8]> = path.iter().map(Vec::as_slice).collect();
    match names.as_slice() {
        [_, b"page", b"title"] => Some(Field::Title),
        [_, b"page", b"id"] => Some(Field::PageId),
        [_, b"page", b"revision", b"text"] => Some(Field::Text),
        _ => None,
    }
}

fn is_revision_text(path: &[Vec<u8>], e: &BytesStart<'_>) -> bool {
    path.len() == 3 && path[2] == b"revision" && e.name().as_ref() == b"text"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(xml: &str) -> Vec<WikiPage> {
        PageReader::from_fragment(xml)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn numbered_fragment(count: u32) -> String {
        (1..=count)
            .map(|i| {
                format!(
                    "  <page>\n    <title>Page {i}</title>\n    <ns>0</ns>\n    <id>{i}</id>\n    \
                     <revision><id>{}</id><text>Body {i}</text></revision>\n  </page>\n",
                    i + 1000
                )
            })
            .collect()
    }

    const FRAGMENT: &str = r#"
  <page>
    <title>Amsterdam</title>
    <ns>0</ns>
    <id>12</id>
    <revision>
      <id>9001</id>
      <timestamp>2024-01-15T10:30:00Z</timestamp>
      <contributor><username>Editor</username><id>77</id></contributor>
      <text bytes="40" xml:space="preserve">'''Amsterdam''' is the capital &amp; largest city.</text>
    </revision>
  </page>
  <page>
    <title>Adam</title>
    <ns>0</ns>
    <id>13</id>
    <redirect title="Adam and Eve" />
    <revision>
      <id>9002</id>
      <text>#REDIRECT [[Adam and Eve]]</text>
    </revision>
  </page>
"#;

    #[test]
    fn reads_sibling_pages_without_root() {
        let pages = pages(FRAGMENT);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].title, "Amsterdam");
        assert_eq!(pages[1].title, "Adam");
        assert_eq!(pages[1].text.as_deref(), Some("#REDIRECT [[Adam and Eve]]"));
    }

    #[test]
    fn every_page_of_a_long_segment_is_read() {
        let pages = pages(&numbered_fragment(100));
        assert_eq!(pages.len(), 100);
        for (i, page) in pages.iter().enumerate() {
            let n = i as u32 + 1;
            assert_eq!(page.id, n);
            assert_eq!(page.title, format!("Page {}", n));
            assert_eq!(page.text.as_deref(), Some(format!("Body {}", n).as_str()));
        }
    }

    #[test]
    fn next_page_resumes_after_previous_page() {
        let fragment = numbered_fragment(3);
        let mut reader = PageReader::from_fragment(&fragment);
        assert_eq!(reader.next_page().unwrap().unwrap().id, 1);
        assert_eq!(reader.next_page().unwrap().unwrap().id, 2);
        assert_eq!(reader.next_page().unwrap().unwrap().id, 3);
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn page_id_ignores_revision_and_contributor_ids() {
        let pages = pages(FRAGMENT);
        assert_eq!(pages[0].id, 12);
        assert_eq!(pages[1].id, 13);
    }

    #[test]
    fn text_is_unescaped_and_whitespace_kept() {
        let pages = pages(FRAGMENT);
        assert_eq!(
            pages[0].text.as_deref(),
            Some("'''Amsterdam''' is the capital & largest city.")
        );
    }

    #[test]
    fn last_revision_wins() {
        let xml = "<page><title>T</title><id>1</id>\
            <revision><id>1</id><text>old</text></revision>\
            <revision><id>2</id><text>new</text></revision></page>";
        assert_eq!(pages(xml)[0].text.as_deref(), Some("new"));
    }

    #[test]
    fn empty_text_element() {
        let xml = r#"<page><title>T</title><id>1</id><revision><text bytes="0" /></revision></page>"#;
        assert_eq!(pages(xml)[0].text.as_deref(), Some(""));
    }

    #[test]
    fn cdata_text_is_kept() {
        let xml = "<page><title>T</title><id>1</id><revision><text><![CDATA[a < b]]></text></revision></page>";
        assert_eq!(pages(xml)[0].text.as_deref(), Some("a < b"));
    }

    #[test]
    fn page_without_revision_has_no_text() {
        let xml = "<page><title>T</title><id>1</id></page>";
        assert_eq!(pages(xml)[0].text, None);
    }

    #[test]
    fn empty_fragment_has_no_pages() {
        assert!(pages("").is_empty());
        assert!(pages("\n  \n").is_empty());
    }

    #[test]
    fn non_numeric_page_id_is_an_error() {
        let mut reader =
            PageReader::from_fragment("<page><title>T</title><id>12a</id></page>");
        assert!(matches!(reader.next(), Some(Err(PageError::InvalidId(id))) if id == "12a"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn mismatched_tags_are_an_error() {
        let mut reader = PageReader::from_fragment("<page><title>T</page>");
        assert!(matches!(reader.next(), Some(Err(PageError::Xml(_)))));
        assert!(reader.next().is_none());
    }
}
