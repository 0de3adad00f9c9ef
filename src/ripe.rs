//! RIPE database full-text search.
//!
//! The search string is split on whitespace and the terms are AND-ed, so
//! `"bittorrent anti piracy"` becomes `q=(bittorrent AND anti AND piracy)`.
//! Results are paged until `numFound` documents have been read. Every
//! `inetnum`, `inet6num`, `route` and `route6` document becomes one
//! [`RipeRange`], rendered as a P2P blocklist line:
//!
//! ```text
//! NETNAME (AS1234):1.2.3.0-1.2.3.255
//! ```

use async_trait::async_trait;
use ipnet::IpNet;
use parking_lot::Mutex;
use serde::Deserialize;
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::probe::{digest_lines, ProbeOutcome, RangeProbe};

/// Documents requested per page.
const PAGE_SIZE: usize = 100;

/// Route placeholder when a document has no origin.
const NO_ROUTE: &str = "-";

/// One named address range found by the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipeRange {
    pub name: String,
    /// `a.b.c.d - e.f.g.h`, a CIDR or a single address
    pub range: String,
    /// Origin AS, or `-`
    pub route: String,
}

impl RipeRange {
    pub fn new(
        name: impl Into<String>,
        range: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            range: range.into(),
            route: route.into(),
        }
    }

    /// First and last address of the range.
    pub fn bounds(&self) -> Result<(IpAddr, IpAddr)> {
        parse_bounds(&self.range)
    }

    /// Render the blocklist line.
    pub fn to_line(&self) -> Result<String> {
        let (first, last) = self.bounds()?;
        Ok(format!("{} ({}):{}-{}", self.name, self.route, first, last))
    }
}

/// Parse `a - b`, a CIDR or a single address into inclusive bounds.
fn parse_bounds(range: &str) -> Result<(IpAddr, IpAddr)> {
    let range = range.trim();
    let invalid = || Error::InvalidRange(range.to_string());

    if let Some((first, last)) = range.split_once('-') {
        let first: IpAddr = first.trim().parse().map_err(|_| invalid())?;
        let last: IpAddr = last.trim().parse().map_err(|_| invalid())?;
        if first.is_ipv4() != last.is_ipv4() || first > last {
            return Err(invalid());
        }
        return Ok((first, last));
    }
    if range.contains('/') {
        let net: IpNet = range.parse().map_err(|_| invalid())?;
        return Ok((net.network(), net.broadcast()));
    }
    let addr: IpAddr = range.parse().map_err(|_| invalid())?;
    Ok((addr, addr))
}

/// Build the `q` parameter from a space separated search.
pub fn build_query(search: &str) -> String {
    let terms: Vec<&str> = search.split_whitespace().collect();
    format!("({})", terms.join(" AND "))
}

// --- Response payload ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchResponse {
    pub result: ResultSet,
    #[serde(default)]
    pub lsts: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ResultSet {
    #[serde(default)]
    pub name: Option<String>,
    pub num_found: usize,
    pub start: usize,
    #[serde(default)]
    pub docs: Vec<DocEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocEntry {
    pub doc: Doc,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Doc {
    #[serde(default)]
    pub strs: Vec<StrEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrEntry {
    pub str: Attribute,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Doc {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.strs
            .iter()
            .find(|entry| entry.str.name == name)
            .map(|entry| entry.str.value.as_str())
    }

    /// Convert a range-carrying document into a [`RipeRange`].
    fn to_range(&self) -> Option<RipeRange> {
        let object_type = self.attribute("object-type")?;
        let (range, name) = match object_type {
            "inetnum" | "inet6num" => (
                self.attribute(object_type)?,
                self.attribute("netname")
                    .or_else(|| self.attribute("lookup-key"))?,
            ),
            "route" | "route6" => (
                self.attribute(object_type)?,
                self.attribute("descr")
                    .or_else(|| self.attribute("lookup-key"))?,
            ),
            _ => return None,
        };
        let route = self.attribute("origin").unwrap_or(NO_ROUTE);
        Some(RipeRange::new(name.trim(), range.trim(), route.trim()))
    }
}

/// Pull every range out of one response page, in document order.
pub fn extract_ranges(result: &ResultSet) -> Vec<RipeRange> {
    result
        .docs
        .iter()
        .filter_map(|entry| entry.doc.to_range())
        .collect()
}

/// Render ranges as lines, skipping the ones with an unusable range.
pub fn ranges_to_lines(ranges: &[RipeRange]) -> Vec<String> {
    ranges
        .iter()
        .filter_map(|range| match range.to_line() {
            Ok(line) => Some(line),
            Err(e) => {
                log::warn!("[RIPE] skipping '{}': {}", range.name, e);
                None
            }
        })
        .collect()
}

/// RIPE full-text search client.
pub struct RipeSearch {
    client: reqwest::Client,
    base_url: String,
    search: String,
    /// Digest of the lines returned by the last successful probe
    last_digest: Mutex<Option<[u8; 32]>>,
}

impl RipeSearch {
    /// Create a client reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: &str, search: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            search: search.to_string(),
            last_digest: Mutex::new(None),
        }
    }

    /// Run the search and collect every page.
    ///
    /// The total is taken from the first page and every page must echo the
    /// offset it was asked for, so the loop always advances and ends.
    pub async fn search(&self) -> Result<Vec<RipeRange>> {
        let query = build_query(&self.search);
        let mut ranges = Vec::new();
        let mut start = 0;
        let mut num_found = None;

        loop {
            let page = self.fetch_page(&query, start).await?;
            if page.result.start != start {
                return Err(Error::Protocol(format!(
                    "asked for page at {}, got page at {}",
                    start, page.result.start
                )));
            }
            let total = *num_found.get_or_insert(page.result.num_found);
            let received = page.result.docs.len();
            ranges.extend(extract_ranges(&page.result));
            start += received;
            log::debug!("[RIPE] page read: {}/{} document(s)", start, total);
            if received == 0 || start >= total {
                break;
            }
        }
        Ok(ranges)
    }

    async fn fetch_page(&self, query: &str, start: usize) -> Result<SearchResponse> {
        let start = start.to_string();
        let rows = PAGE_SIZE.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("q", query),
                ("wt", "json"),
                ("facet", "false"),
                ("start", start.as_str()),
                ("rows", rows.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Compare `lines` with the previous result and remember them.
    fn detect_change(&self, lines: Vec<String>) -> ProbeOutcome {
        let digest = digest_lines(&lines);
        let mut last = self.last_digest.lock();
        if last.as_ref() == Some(&digest) {
            return ProbeOutcome::Unchanged;
        }
        *last = Some(digest);
        ProbeOutcome::Updated(lines)
    }
}

#[async_trait]
impl RangeProbe for RipeSearch {
    async fn probe(&self) -> Result<ProbeOutcome> {
        let ranges = self
            .search()
            .await
            .map_err(|e| Error::probe("RIPE", e))?;
        let lines = ranges_to_lines(&ranges);
        log::info!(
            "[RIPE] search '{}' returned {} range(s)",
            self.search,
            lines.len()
        );
        Ok(self.detect_change(lines))
    }
}
