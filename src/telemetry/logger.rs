//! # JSONL Telemetry Logger
//!
//! Appends one JSON object per line to `link_<timestamp>_<seq>.jsonl` files
//! in the log directory. A new file is started after
//! `max_records_per_file` records; only the newest `max_files_to_keep`
//! files are kept.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::LinkRecord;
use crate::config::TelemetryConfig;
use crate::error::{RcLinkError, Result};

const FILE_PREFIX: &str = "link_";
const FILE_SUFFIX: &str = ".jsonl";

/// Rotating JSONL writer.
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    sequence: u32,
}

impl std::fmt::Debug for TelemetryLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryLogger")
            .field("dir", &self.dir)
            .field("current_path", &self.current_path)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl TelemetryLogger {
    /// Creates the log directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Telemetry` if the directory cannot be created.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir).map_err(|e| {
            RcLinkError::Telemetry(format!("Cannot create {}: {}", dir.display(), e))
        })?;
        info!("Telemetry log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// Appends one record, rotating first if the current file is full.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Telemetry` on serialization or write failure.
    pub fn log(&mut self, record: &LinkRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(record)
            .map_err(|e| RcLinkError::Telemetry(format!("Cannot serialize record: {}", e)))?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)
                .map_err(|e| RcLinkError::Telemetry(format!("Cannot write record: {}", e)))?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    /// Pushes buffered records to disk.
    ///
    /// Records are otherwise written when the buffer fills, on rotation and
    /// on drop.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Telemetry` on write failure.
    pub fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .flush()
                .map_err(|e| RcLinkError::Telemetry(format!("Cannot flush log: {}", e))),
            None => Ok(()),
        }
    }

    /// File currently written to.
    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Log files in the directory, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Telemetry` if the directory cannot be read.
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| RcLinkError::Telemetry(format!("Cannot read {}: {}", self.dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush telemetry log: {}", e);
            }
        }

        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_SUFFIX
        );
        self.sequence = (self.sequence + 1) % 10_000;
        let path = self.dir.join(name);

        let file = File::create(&path).map_err(|e| {
            RcLinkError::Telemetry(format!("Cannot create {}: {}", path.display(), e))
        })?;
        debug!("Telemetry log file: {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;
        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let files = self.log_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        for old in &files[..files.len() - self.max_files_to_keep] {
            match fs::remove_file(old) {
                Ok(()) => debug!("Removed old telemetry log {}", old.display()),
                Err(e) => warn!("Failed to remove {}: {}", old.display(), e),
            }
        }
        Ok(())
    }
}

impl Drop for TelemetryLogger {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{ControlFrame, LinkStats};
    use tempfile::TempDir;

    fn config(dir: &Path, per_file: usize, keep: usize) -> TelemetryConfig {
        TelemetryConfig {
            log_dir: dir.to_string_lossy().into_owned(),
            max_records_per_file: per_file,
            max_files_to_keep: keep,
            ..TelemetryConfig::default()
        }
    }

    fn record(uptime_ms: u32) -> LinkRecord {
        let stats = LinkStats {
            tx_attempts: 10,
            acks: 9,
            last_ack_at: Some(uptime_ms.saturating_sub(20)),
        };
        LinkRecord::capture(uptime_ms, &ControlFrame::new(10, -10, 0, 100), Some(51), 50, 47, false, &stats)
    }

    // ==================== Record Tests ====================

    #[test]
    fn test_record_capture() {
        let r = record(1000);
        assert_eq!(r.sticks, [10, -10, 0, 100]);
        assert_eq!(r.last_ack_age_ms, Some(20));
        assert!(r.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_record_json_fields() {
        let json = serde_json::to_string(&record(500)).unwrap();
        assert!(json.contains("\"aux_smoothed\":47"));
        assert!(json.contains("\"link_lost\":false"));
        let parsed: LinkRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.uptime_ms, 500);
    }

    // ==================== Logger Tests ====================

    #[test]
    fn test_writes_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 100, 5)).unwrap();
        for t in 0..3 {
            logger.log(&record(t * 500)).unwrap();
        }
        logger.flush().unwrap();

        let contents = fs::read_to_string(logger.current_path().unwrap()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: LinkRecord = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.uptime_ms, 1000);
    }

    #[test]
    fn test_records_buffered_until_flush() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 100, 5)).unwrap();
        logger.log(&record(0)).unwrap();
        let path = logger.current_path().unwrap().to_path_buf();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        logger.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_drop_flushes_pending_records() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 100, 5)).unwrap();
        logger.log(&record(0)).unwrap();
        logger.log(&record(1)).unwrap();
        let path = logger.current_path().unwrap().to_path_buf();
        drop(logger);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_rotates_after_max_records() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 2, 10)).unwrap();
        for t in 0..5 {
            logger.log(&record(t)).unwrap();
        }
        logger.flush().unwrap();
        let files = logger.log_files().unwrap();
        assert_eq!(files.len(), 3);

        let counts: Vec<usize> = files
            .iter()
            .map(|f| fs::read_to_string(f).unwrap().lines().count())
            .collect();
        assert_eq!(counts, vec![2, 2, 1]);
    }

    #[test]
    fn test_keeps_only_newest_files() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 1, 2)).unwrap();
        for t in 0..5 {
            logger.log(&record(t)).unwrap();
        }
        logger.flush().unwrap();
        let files = logger.log_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files.last().map(PathBuf::as_path), logger.current_path());

        let newest: LinkRecord =
            serde_json::from_str(fs::read_to_string(&files[1]).unwrap().trim()).unwrap();
        assert_eq!(newest.uptime_ms, 4);
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 1, 1)).unwrap();
        logger.log(&record(0)).unwrap();
        logger.log(&record(1)).unwrap();
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(logger.log_files().unwrap().len(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut logger = TelemetryLogger::new(&config(&nested, 10, 1)).unwrap();
        logger.log(&record(0)).unwrap();
        assert!(nested.is_dir());
    }
}
