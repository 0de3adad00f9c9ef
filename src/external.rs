//! External list fetcher.
//!
//! Lists are either HTTP(S) URLs or local files (`file://` prefix optional).
//! Change detection, per list name:
//! - HTTP: `If-None-Match` / `If-Modified-Since` validators, `304` means unchanged
//! - files: modification time
//! - both: a digest of the parsed lines, for servers without validators
//!
//! Gzip bodies are detected by their magic bytes and decompressed.

use ahash::AHashMap;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use reqwest::header::{HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use crate::config::is_http;
use crate::error::{Error, Result};
use crate::probe::{digest_lines, ListProbe, ProbeOutcome};

/// Largest decompressed list we accept.
const MAX_DECODED_SIZE: u64 = 256 * 1024 * 1024;

/// What we remember about a list between probes.
#[derive(Debug, Clone, Default)]
struct Validators {
    etag: Option<String>,
    last_modified: Option<String>,
    mtime: Option<SystemTime>,
    digest: Option<[u8; 32]>,
}

/// Raw body plus the validators that came with it.
struct Fetched {
    body: Vec<u8>,
    validators: Validators,
}

/// Fetches external lists over HTTP or from disk.
pub struct ExternalFetcher {
    client: reqwest::Client,
    validators: Mutex<AHashMap<String, Validators>>,
}

impl ExternalFetcher {
    /// Create a fetcher reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            validators: Mutex::new(AHashMap::new()),
        }
    }

    fn previous(&self, name: &str) -> Validators {
        self.validators.lock().get(name).cloned().unwrap_or_default()
    }

    /// `None` means the transport reported "not modified".
    async fn fetch_http(&self, url: &str, previous: &Validators) -> Result<Option<Fetched>> {
        let mut request = self.client.get(url);
        if let Some(ref etag) = previous.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(ref last_modified) = previous.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        let response = response.error_for_status()?;

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let validators = Validators {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
            ..Validators::default()
        };
        let body = response.bytes().await?.to_vec();
        Ok(Some(Fetched { body, validators }))
    }

    /// `None` means the file has not been touched since the last probe.
    async fn fetch_file(&self, path: &Path, previous: &Validators) -> Result<Option<Fetched>> {
        let mtime = tokio::fs::metadata(path).await?.modified().ok();
        if mtime.is_some() && mtime == previous.mtime {
            return Ok(None);
        }
        let body = tokio::fs::read(path).await?;
        Ok(Some(Fetched {
            body,
            validators: Validators {
                mtime,
                ..Validators::default()
            },
        }))
    }
}

#[async_trait]
impl ListProbe for ExternalFetcher {
    async fn probe(&self, name: &str, location: &str) -> Result<ProbeOutcome> {
        let previous = self.previous(name);
        let fetched = if is_http(location) {
            self.fetch_http(location, &previous).await
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            self.fetch_file(Path::new(path), &previous).await
        };
        let fetched = fetched.map_err(|e| Error::probe(name, e))?;

        let Some(Fetched {
            body,
            mut validators,
        }) = fetched
        else {
            log::debug!("[External] '{}' not modified", name);
            return Ok(ProbeOutcome::Unchanged);
        };

        let text = decode_body(&body).map_err(|e| Error::probe(name, e))?;
        let lines = parse_lines(&text);
        let digest = digest_lines(&lines);
        let unchanged = previous.digest == Some(digest);
        validators.digest = Some(digest);
        self.validators.lock().insert(name.to_string(), validators);

        if unchanged {
            log::debug!("[External] '{}' content identical to previous fetch", name);
            return Ok(ProbeOutcome::Unchanged);
        }
        log::info!("[External] '{}': {} line(s) from {}", name, lines.len(), location);
        Ok(ProbeOutcome::Updated(lines))
    }
}

/// Check if data is gzip compressed.
fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Decompress if needed and decode as UTF-8, replacing invalid sequences.
fn decode_body(body: &[u8]) -> Result<String> {
    decode_body_limited(body, MAX_DECODED_SIZE)
}

fn decode_body_limited(body: &[u8], limit: u64) -> Result<String> {
    if is_gzip(body) {
        let mut data = Vec::new();
        GzDecoder::new(body)
            .take(limit + 1)
            .read_to_end(&mut data)?;
        if data.len() as u64 > limit {
            return Err(Error::Protocol(format!(
                "gzip body expands beyond {} bytes",
                limit
            )));
        }
        return Ok(String::from_utf8_lossy(&data).into_owned());
    }
    Ok(String::from_utf8_lossy(body).into_owned())
}

/// Keep meaningful lines in order: trimmed, no blanks, no `#` or `;` comments.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .map(str::to_string)
        .collect()
}
