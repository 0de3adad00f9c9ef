//! Source probe interfaces.
//!
//! A probe is asked for fresh data once per batch and answers either with a
//! full replacement of its lines or with [`ProbeOutcome::Unchanged`]. Errors
//! are returned to the orchestrator, which treats them as "no change".

use async_trait::async_trait;

use crate::Result;

/// Result of probing one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Nothing new since the previous probe.
    Unchanged,
    /// Full replacement of the source's lines, in source order.
    Updated(Vec<String>),
}

impl ProbeOutcome {
    /// Returns `true` if the probe produced new lines.
    pub fn is_updated(&self) -> bool {
        matches!(self, ProbeOutcome::Updated(_))
    }
}

/// The authoritative range source (RIPE).
#[async_trait]
pub trait RangeProbe: Send + Sync {
    /// Fetch the current range lines.
    async fn probe(&self) -> Result<ProbeOutcome>;
}

/// A named external list provider.
#[async_trait]
pub trait ListProbe: Send + Sync {
    /// Fetch the current lines of the list `name` found at `location`.
    async fn probe(&self, name: &str, location: &str) -> Result<ProbeOutcome>;
}

/// SHA-256 over `lines`, each terminated by `\n`.
///
/// Used by probes that can only detect changes by comparing content.
pub fn digest_lines(lines: &[String]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().into()
}
