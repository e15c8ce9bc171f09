use crate::archive::WikiArchive;
use crate::config::PROGRESS_INTERVAL;
use crate::error::ExtractError;
use crate::models::{short_hash, ArticleRecord, OutputFormat};
use crate::stats::ExtractionStats;
use crate::title::resolve_title;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One row of a request list: the caller's id and the article to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub external_id: String,
    /// Article title or full Wikipedia URL
    pub title_or_url: String,
}

/// Reads a headerless tab-separated `external_id<TAB>title_or_url` file.
pub fn read_requests(path: &Path) -> Result<Vec<ExtractRequest>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .with_context(|| format!("Failed to open request list: {:?}", path))?;

    let mut requests = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read request list: {:?}", path))?;
        match (record.get(0), record.get(1), record.len()) {
            (Some(id), Some(target), 2) if !target.trim().is_empty() => {
                requests.push(ExtractRequest {
                    external_id: id.trim().to_string(),
                    title_or_url: target.trim().to_string(),
                });
            }
            _ => {
                warn!(line = line + 1, fields = record.len(), "Skipping malformed request row");
            }
        }
    }

    info!(requests = requests.len(), "Request list loaded");
    Ok(requests)
}

/// Path the record is written to inside `output_dir`.
///
/// `shared` marks a title requested more than once; those files also carry a
/// hash of the external id so each request gets its own document.
pub fn output_path(
    output_dir: &Path,
    record: &ArticleRecord,
    format: OutputFormat,
    shared: bool,
) -> PathBuf {
    let stem = record.file_stem();
    let name = if shared {
        format!("{}-{}.{}", stem, short_hash(&record.id), format.extension())
    } else {
        format!("{}.{}", stem, format.extension())
    };
    output_dir.join(name)
}

/// Counts how often each resolved title is requested.
fn title_counts(requests: &[ExtractRequest]) -> FxHashMap<String, usize> {
    let mut counts = FxHashMap::default();
    for request in requests {
        if let Some(title) = resolve_title(&request.title_or_url) {
            *counts.entry(title).or_insert(0) += 1;
        }
    }
    counts
}

/// Extracts every request in parallel and writes one document per article.
///
/// Unknown titles are skipped. Extraction, rendering and write failures are
/// counted per request; only failing to create `output_dir` aborts the run.
pub fn run_batch(
    archive: &WikiArchive,
    requests: &[ExtractRequest],
    output_dir: &Path,
    format: OutputFormat,
    dry_run: bool,
) -> Result<ExtractionStats> {
    if !dry_run {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
    }

    let counts = title_counts(requests);
    let shared = counts.values().filter(|&&n| n > 1).count();
    if shared > 0 {
        info!(titles = shared, "Titles requested more than once get per-id file names");
    }

    let stats = ExtractionStats::new();
    let pb = ProgressBar::new(requests.len() as u64);

    requests.par_iter().for_each(|request| {
        stats.inc_requests();
        process_request(archive, request, output_dir, format, dry_run, &counts, &stats);
        if stats.requested() % PROGRESS_INTERVAL == 0 {
            pb.set_position(stats.requested());
        }
    });

    pb.finish_and_clear();

    info!(
        requested = stats.requested(),
        extracted = stats.extracted(),
        unknown = stats.unknown(),
        failed = stats.failed(),
        "Batch extraction complete"
    );
    Ok(stats)
}

fn process_request(
    archive: &WikiArchive,
    request: &ExtractRequest,
    output_dir: &Path,
    format: OutputFormat,
    dry_run: bool,
    counts: &FxHashMap<String, usize>,
    stats: &ExtractionStats,
) {
    let Some(title) = resolve_title(&request.title_or_url) else {
        debug!(request = %request.title_or_url, "No title in request, skipping");
        stats.inc_unknown();
        return;
    };

    let record = match archive.extract(&title, &request.external_id) {
        Ok(record) => record,
        Err(ExtractError::UnknownTitle(_)) => {
            debug!(title = %title, "Unknown article, skipping");
            stats.inc_unknown();
            return;
        }
        Err(e) => {
            warn!(title = %title, id = %request.external_id, error = %e, "Extraction failed");
            stats.inc_failures();
            return;
        }
    };

    if !dry_run {
        let rendered = match record.render(format) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(title = %title, error = %e, "Failed to render article");
                stats.inc_failures();
                return;
            }
        };
        let shared = counts.get(&title).is_some_and(|&n| n > 1);
        let path = output_path(output_dir, &record, format, shared);
        if let Err(e) = fs::write(&path, &rendered) {
            warn!(path = ?path, error = %e, "Failed to write article");
            stats.inc_failures();
            return;
        }
        stats.add_bytes(rendered.len() as u64);
    }

    stats.inc_extracted();
}
