//! Latest known lines per source.

use std::collections::BTreeMap;

/// Line counts reported in the status message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounters {
    /// Number of RIPE range lines
    pub ripe_ranges: usize,
    /// Number of configured external lists
    pub external_lists: usize,
    /// Total lines across all external lists
    pub external_lines: usize,
}

/// Per-source line storage.
///
/// The external key set is fixed at construction: every configured list gets
/// an empty slot up front, and updates for unknown names are ignored.
/// Slots are kept in a `BTreeMap` so iteration is ordered by name.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    ripe: Vec<String>,
    external: BTreeMap<String, Vec<String>>,
}

impl StateStore {
    /// Create a store with one empty slot per external list name.
    pub fn new<I, S>(external_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ripe: Vec::new(),
            external: external_names
                .into_iter()
                .map(|name| (name.into(), Vec::new()))
                .collect(),
        }
    }

    /// Replace the RIPE lines wholesale.
    pub fn replace_ripe(&mut self, lines: Vec<String>) {
        self.ripe = lines;
    }

    /// Replace one external list wholesale.
    ///
    /// Returns `false` if `name` is not a configured list.
    pub fn replace_external(&mut self, name: &str, lines: Vec<String>) -> bool {
        match self.external.get_mut(name) {
            Some(slot) => {
                *slot = lines;
                true
            }
            None => false,
        }
    }

    /// RIPE lines in probe order.
    pub fn ripe(&self) -> &[String] {
        &self.ripe
    }

    /// External lists, ordered by name.
    pub fn external(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.external
            .iter()
            .map(|(name, lines)| (name.as_str(), lines.as_slice()))
    }

    /// Configured external list names, ordered.
    pub fn external_names(&self) -> impl Iterator<Item = &str> {
        self.external.keys().map(String::as_str)
    }

    /// Current counters.
    pub fn counters(&self) -> BatchCounters {
        BatchCounters {
            ripe_ranges: self.ripe.len(),
            external_lists: self.external.len(),
            external_lines: self.external.values().map(Vec::len).sum(),
        }
    }
}
