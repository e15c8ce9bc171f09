//! Wikicorpus: random-access article extraction from Wikipedia multistream dumps
//!
//! A multistream dump is a multi-gigabyte bzip2 file made of independently
//! compressed segments of roughly a hundred pages each. A companion index file
//! lists `offset:page_id:title` for every page. This crate uses the index to
//! decompress only the one segment holding a requested article:
//!
//! 1. **Locate** -- Find the dump/index pair for a language in a dump directory
//! 2. **Index** -- Parse the index into a title-to-segment map, cached on disk
//! 3. **Read** -- Positioned read of the segment's byte range and bzip2 decode
//! 4. **Extract** -- Stream the segment's `<page>` elements and pick the page id
//!
//! # Architecture
//!
//! - **Immutable snapshots** -- The segment index is built once and shared via `Arc`
//! - **Positioned reads** -- One file handle serves concurrent requests without seeking
//! - **Streaming XML parsing** -- Pages are read event by event from the segment
//! - **Atomic cache writes** -- Index snapshots are written to a temp file and renamed
//! - **Parallel batches** -- rayon fans request lists out over the shared archive
//!
//! # Key Modules
//!
//! - [`locator`] -- Dump/index discovery with a newest-date tie-break
//! - [`index`] -- Two-pass index parsing into segment ranges
//! - [`cache`] -- Binary index snapshots keyed by index file name
//! - [`segment`] -- Byte-range reads and single-stream bzip2 decoding
//! - [`parser`] -- Page streaming over a root-less XML fragment
//! - [`extract`] -- Page selection into an [`models::ArticleRecord`]
//! - [`archive`] -- The end-to-end `extract(title, external_id)` operation
//! - [`title`] -- Wikipedia URL to title resolution
//! - [`batch`] -- Parallel extraction of request lists into output files
//! - [`stats`] -- Thread-safe counters for batch runs
//! - [`error`] -- The typed [`error::ExtractError`]
//! - [`config`] -- Constants for file naming, caching and buffers
//!
//! # Example Usage
//!
//! ```bash
//! # Build (or refresh) the index cache for the Dutch dump
//! wikicorpus -v index -d dumps/ -l nl
//!
//! # Fetch one article as XML
//! wikicorpus extract -d dumps/ -l nl --title Amsterdam --id wd:Q727
//!
//! # Fetch a whole request list in parallel
//! wikicorpus batch -d dumps/ -l nl -i requests.tsv -o corpus/
//! ```

pub mod archive;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod locator;
pub mod models;
pub mod parser;
pub mod segment;
pub mod stats;
pub mod title;

pub use archive::WikiArchive;
pub use error::ExtractError;
pub use models::ArticleRecord;
