use crate::config::MAX_STEM_BYTES;
use crate::error::ExtractError;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One `<page>` element of a decompressed segment.
#[derive(Debug, Clone, Default)]
pub struct WikiPage {
    pub id: u32,
    pub title: String,
    /// Text of the last `<revision>` seen
    pub text: Option<String>,
}

/// Normalized output of one extraction, tagged with the caller's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "article")]
pub struct ArticleRecord {
    pub id: String,
    pub title: String,
    pub text: String,
}

impl ArticleRecord {
    pub fn to_xml(&self) -> Result<String, ExtractError> {
        quick_xml::se::to_string(self).map_err(|e| ExtractError::Render(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ExtractError> {
        serde_json::to_string_pretty(self).map_err(|e| ExtractError::Render(e.to_string()))
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, ExtractError> {
        match format {
            OutputFormat::Xml => self.to_xml(),
            OutputFormat::Json => self.to_json(),
        }
    }

    /// File name (without extension) for this record.
    ///
    /// Titles that are not usable as-is (a `/`, or longer than `MAX_STEM_BYTES`)
    /// are cleaned up and suffixed with a hash of the full title, which keeps
    /// `AC/DC` and `AC_DC` apart.
    pub fn file_stem(&self) -> String {
        if !self.title.contains('/') && self.title.len() <= MAX_STEM_BYTES {
            return self.title.clone();
        }
        let cleaned = self.title.replace('/', "_");
        format!(
            "{}-{}",
            truncate_to_boundary(&cleaned, MAX_STEM_BYTES),
            short_hash(&self.title)
        )
    }
}

/// Eight hex digits identifying `value`; stable across runs.
pub fn short_hash(value: &str) -> String {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    format!("{:08x}", hasher.finish() as u32)
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
        }
    }
}
