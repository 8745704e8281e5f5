//! Append-only JSON-lines audit trail of attempted moves

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{MoverError, Result};
use crate::models::MoveLogEntry;

/// File name of the move log inside the config directory
pub const MOVE_LOG_FILE: &str = "moves.jsonl";

/// Somewhere serialized log lines can be appended
pub trait MoveLogSink: Send + Sync {
    fn append(&self, line: &[u8]) -> Result<()>;
}

/// Appends to a file, syncing to disk after every write
#[derive(Debug)]
pub struct FileMoveLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileMoveLog {
    /// Open (creating if needed) the log file for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened move log at {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open `moves.jsonl` inside the given config directory
    pub fn in_dir(config_dir: &Path) -> Result<Self> {
        Self::open(config_dir.join(MOVE_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MoveLogSink for FileMoveLog {
    fn append(&self, line: &[u8]) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| MoverError::Unknown("move log lock poisoned".to_string()))?;
        file.write_all(line)?;
        file.sync_data()?;
        Ok(())
    }
}

/// Keeps log lines in memory
#[derive(Debug, Default)]
pub struct MemoryMoveLog {
    lines: Mutex<Vec<Vec<u8>>>,
}

impl MemoryMoveLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every buffered line back into an entry
    pub fn entries(&self) -> Vec<MoveLogEntry> {
        self.lines
            .lock()
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| serde_json::from_slice(line).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MoveLogSink for MemoryMoveLog {
    fn append(&self, line: &[u8]) -> Result<()> {
        self.lines
            .lock()
            .map_err(|_| MoverError::Unknown("move log lock poisoned".to_string()))?
            .push(line.to_vec());
        Ok(())
    }
}

/// Serializes entries as one JSON object per line
pub struct MoveLogger<'a> {
    sink: &'a dyn MoveLogSink,
}

impl<'a> MoveLogger<'a> {
    pub fn new(sink: &'a dyn MoveLogSink) -> Self {
        Self { sink }
    }

    /// Stamp the entry with the current time and append it
    pub fn log(&self, mut entry: MoveLogEntry) -> Result<()> {
        entry.timestamp = Utc::now();
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.sink.append(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageHeaders, MessageInfo};
    use crate::request::TransferRequest;
    use tempfile::TempDir;

    fn entry(id: &str) -> MoveLogEntry {
        let request = TransferRequest::new(
            "src@example.com".parse().unwrap(),
            "dst@example.com".parse().unwrap(),
        );
        let mut info = MessageInfo::from_headers(id, &MessageHeaders::default());
        info.moved = true;
        MoveLogEntry::new("run-1", &request, &info, None)
    }

    #[test]
    fn test_file_log_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileMoveLog::in_dir(&temp_dir.path().join("nested")).unwrap();
        let logger = MoveLogger::new(&log);

        logger.log(entry("m1")).unwrap();
        logger.log(entry("m2")).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: MoveLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.message_id, "m1");
        assert!(first.moved);
    }

    #[test]
    fn test_file_log_preserves_existing_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MOVE_LOG_FILE);
        std::fs::write(&path, "{\"earlier\":true}\n").unwrap();

        let log = FileMoveLog::open(&path).unwrap();
        MoveLogger::new(&log).log(entry("m3")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("{\"earlier\":true}\n"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_logger_stamps_timestamp() {
        let log = MemoryMoveLog::new();
        let mut stale = entry("m1");
        stale.timestamp = chrono::DateTime::from_timestamp(0, 0).unwrap();

        let before = Utc::now();
        MoveLogger::new(&log).log(stale).unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].timestamp >= before);
    }
}
