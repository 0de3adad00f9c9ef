//! Merge and compress the state into the published blob.
//!
//! The decompressed blob is plain text:
//!
//! ```text
//! # BTBlocklist RIPE search
//! <ripe line 1>
//! ...
//! <ripe line n>
//! <lines of the first external list, by name>
//! ...
//! ```
//!
//! Every section ends with a newline. The gzip header carries no timestamp
//! or file name, so identical state always yields identical bytes.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::state::{BatchCounters, StateStore};

/// Header line opening the RIPE section.
pub const RIPE_HEADER: &str = "# BTBlocklist RIPE search\n";

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompiledBlob {
    /// Gzip stream of the merged lines.
    pub data: Arc<[u8]>,
    /// Counts observed while merging.
    pub counters: BatchCounters,
}

/// Merge every source of `state` and gzip the result at best compression.
pub fn compile(state: &StateStore) -> Result<CompiledBlob> {
    let started = Instant::now();
    log::info!("[Updater] Merging and compressing all cached results");

    let (data, counters) = compile_into(state, Vec::new())?;
    log::info!(
        "[Updater] {} range(s) from RIPE search and {} line(s) from {} external blocklist(s) compressed to {} in {:?}",
        counters.ripe_ranges,
        counters.external_lines,
        counters.external_lists,
        human_size(data.len()),
        started.elapsed()
    );
    Ok(CompiledBlob {
        data: data.into(),
        counters,
    })
}

/// Streaming core of [`compile`], generic over the sink so write failures
/// can be exercised.
fn compile_into<W: Write>(state: &StateStore, sink: W) -> Result<(W, BatchCounters)> {
    let mut encoder = GzEncoder::new(sink, Compression::best());
    encoder
        .write_all(RIPE_HEADER.as_bytes())
        .map_err(|e| Error::Compile(format!("can't write RIPE search header: {}", e)))?;
    write_section(&mut encoder, state.ripe())
        .map_err(|e| Error::Compile(format!("can't write RIPE results: {}", e)))?;

    let mut counters = BatchCounters {
        ripe_ranges: state.ripe().len(),
        ..BatchCounters::default()
    };
    // StateStore iterates by name, which keeps the output reproducible.
    for (name, lines) in state.external() {
        counters.external_lists += 1;
        counters.external_lines += lines.len();
        write_section(&mut encoder, lines)
            .map_err(|e| Error::Compile(format!("can't write '{}' results: {}", name, e)))?;
    }

    let sink = encoder.finish().map_err(|e| {
        Error::Compile(format!(
            "can't flush remaining bytes from the gzip compressor: {}",
            e
        ))
    })?;
    Ok((sink, counters))
}

/// Write `lines` joined by `\n`, plus the trailing newline.
fn write_section<W: Write>(out: &mut W, lines: &[String]) -> std::io::Result<()> {
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.write_all(b"\n")?;
        }
        out.write_all(line.as_bytes())?;
    }
    out.write_all(b"\n")
}

/// Format a byte count with binary units, e.g. `12.3 KiB`.
pub fn human_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn decompress(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    /// Sink that fails after accepting a fixed number of bytes.
    #[derive(Debug)]
    struct FailingSink {
        remaining: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.remaining == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_layout() {
        let mut state = StateStore::new(["zeta", "alpha"]);
        state.replace_ripe(lines(&["A", "B"]));
        state.replace_external("zeta", lines(&["9.9.9.9"]));
        state.replace_external("alpha", lines(&["1.1.1.1", "2.2.2.2"]));

        let blob = compile(&state).unwrap();
        assert_eq!(
            decompress(&blob.data),
            "# BTBlocklist RIPE search\nA\nB\n1.1.1.1\n2.2.2.2\n9.9.9.9\n"
        );
        assert_eq!(blob.counters.ripe_ranges, 2);
        assert_eq!(blob.counters.external_lists, 2);
        assert_eq!(blob.counters.external_lines, 3);
    }

    #[test]
    fn test_empty_state() {
        let state = StateStore::new(Vec::<String>::new());
        let blob = compile(&state).unwrap();
        assert_eq!(decompress(&blob.data), "# BTBlocklist RIPE search\n\n");
    }

    #[test]
    fn test_deterministic_output() {
        let mut first = StateStore::new(["b", "a"]);
        first.replace_ripe(lines(&["r"]));
        first.replace_external("a", lines(&["1"]));
        first.replace_external("b", lines(&["2"]));

        let mut second = StateStore::new(["a", "b"]);
        second.replace_external("b", lines(&["2"]));
        second.replace_external("a", lines(&["1"]));
        second.replace_ripe(lines(&["r"]));

        assert_eq!(compile(&first).unwrap().data, compile(&second).unwrap().data);
    }

    #[test]
    fn test_counters_match_state() {
        let mut state = StateStore::new(["a"]);
        state.replace_ripe(lines(&["r1", "r2"]));
        state.replace_external("a", lines(&["x", "y", "z"]));
        assert_eq!(compile(&state).unwrap().counters, state.counters());
    }

    #[test]
    fn test_write_failure_aborts() {
        let mut state = StateStore::new(["a"]);
        state.replace_ripe((0..10_000).map(|i| format!("range {}", i)).collect());
        let err = compile_into(&state, FailingSink { remaining: 16 }).unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
