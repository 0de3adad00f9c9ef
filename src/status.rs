//! Status line formatting and sinks.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::state::BatchCounters;

/// Timestamp layout used in the status line, e.g. `2 Jan 2006 15:04:05 UTC`.
pub const TIME_FORMAT: &str = "%-d %b %Y %H:%M:%S %Z";

/// Receiver of the per-batch status summary.
pub trait StatusSink: Send + Sync {
    /// Publish `summary`. Failures are logged by the caller and otherwise ignored.
    fn report_status(&self, summary: &str) -> Result<()>;
}

/// Build the status line.
///
/// ```
/// use btblocklist::{format_status, BatchCounters};
///
/// let counters = BatchCounters { ripe_ranges: 2, external_lists: 1, external_lines: 2 };
/// let line = format_status(&counters, None, None);
/// assert_eq!(
///     line,
///     "RIPE: 2 range(s) | External: 1 list(s) with a total of 2 line(s) | Last modification: never | Last update: never"
/// );
/// ```
pub fn format_status(
    counters: &BatchCounters,
    last_modification: Option<DateTime<Utc>>,
    last_batch: Option<DateTime<Utc>>,
) -> String {
    format!(
        "RIPE: {} range(s) | External: {} list(s) with a total of {} line(s) | Last modification: {} | Last update: {}",
        counters.ripe_ranges,
        counters.external_lists,
        counters.external_lines,
        format_time(last_modification),
        format_time(last_batch),
    )
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(t) => t.format(TIME_FORMAT).to_string(),
        None => "never".to_string(),
    }
}

/// Sink writing the summary to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn report_status(&self, summary: &str) -> Result<()> {
        log::info!("[Status] {}", summary);
        Ok(())
    }
}

/// Sink replacing a file with the latest summary.
#[derive(Debug, Clone)]
pub struct FileStatus {
    path: PathBuf,
}

impl FileStatus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusSink for FileStatus {
    fn report_status(&self, summary: &str) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::Status(format!("{}: {}", self.path.display(), e)))?;
        writeln!(temp, "{}", summary)?;
        temp.persist(&self.path)
            .map_err(|e| Error::Status(format!("{}: {}", self.path.display(), e.error)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_status() {
        let counters = BatchCounters {
            ripe_ranges: 2,
            external_lists: 1,
            external_lines: 2,
        };
        let modified = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        let batch = Utc.with_ymd_and_hms(2006, 1, 2, 16, 4, 5).unwrap();
        assert_eq!(
            format_status(&counters, Some(modified), Some(batch)),
            "RIPE: 2 range(s) | External: 1 list(s) with a total of 2 line(s) | Last modification: 2 Jan 2006 15:04:05 UTC | Last update: 2 Jan 2006 16:04:05 UTC"
        );
    }

    #[test]
    fn test_file_status() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileStatus::new(dir.path().join("status"));
        sink.report_status("first").unwrap();
        sink.report_status("second").unwrap();
        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "second\n");
    }

    #[test]
    fn test_file_status_missing_dir() {
        let sink = FileStatus::new("/nonexistent/dir/status");
        assert!(matches!(sink.report_status("x"), Err(Error::Status(_))));
    }

    #[test]
    fn test_log_status() {
        assert!(LogStatus.report_status("hello").is_ok());
    }
}
