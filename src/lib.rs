//! btblocklist - a periodically refreshed, gzip-compressed IP blocklist.
//!
//! This crate merges the ranges returned by a RIPE database full-text search
//! with any number of named external IP lists into a single text blocklist,
//! compresses it once per refresh and publishes it atomically for readers.
//!
//! # Features
//!
//! - **RIPE search**: AND-ed multi-term queries, paged results, CIDR and
//!   dashed ranges rendered as P2P blocklist lines
//! - **External lists**: HTTP(S) with ETag / Last-Modified revalidation, or local files
//! - **Deterministic output**: identical sources always yield identical bytes
//! - **Consistent snapshots**: readers see the blob and its timestamps together
//! - **Cooperative shutdown**: an in-flight batch always completes
//!
//! # Quick Start
//!
//! ```ignore
//! use btblocklist::{CacheStore, Updater, UpdaterConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = UpdaterConfig::load("btblocklist.yml")?;
//! let cache = Arc::new(CacheStore::new());
//! let updater = Updater::from_config(&config, Arc::clone(&cache))?;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(updater.run(shutdown.clone()));
//!
//! // Any number of readers, e.g. an HTTP handler
//! if let Some(blob) = cache.read() {
//!     println!("serving {} compressed bytes", blob.len());
//! }
//! ```
//!
//! # Blob Layout
//!
//! Decompressed, the blob is one header line, the RIPE lines, then the lines
//! of each external list ordered by list name. Every section ends with a
//! newline.

mod error;

pub mod cache;
pub mod compiler;
pub mod config;
pub mod export;
pub mod external;
pub mod probe;
pub mod ripe;
pub mod state;
pub mod status;
pub mod updater;

#[cfg(test)]
mod test_server;

// Re-export core types
pub use error::{Error, Result};
pub use probe::{ListProbe, ProbeOutcome, RangeProbe};
pub use state::{BatchCounters, StateStore};

// Re-export the pipeline
pub use cache::{CacheSnapshot, CacheStore};
pub use compiler::{compile, CompiledBlob, RIPE_HEADER};
pub use config::{RipeConfig, UpdaterConfig};
pub use export::{write_blob, Exporter};
pub use external::ExternalFetcher;
pub use ripe::{RipeRange, RipeSearch};
pub use status::{format_status, FileStatus, LogStatus, StatusSink};
pub use updater::{BatchReport, Updater};
