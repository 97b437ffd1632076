//! Append-only JSONL invocation journal

use gis_mcp_application::ports::invocation_logger::{InvocationLogger, InvocationRecord};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// One journal line: the record plus when it was written
#[derive(Serialize)]
struct JournalLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    record: &'a InvocationRecord,
}

/// Writes one line per invocation, unbuffered so a crash loses nothing
pub struct JsonlInvocationLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl JsonlInvocationLogger {
    /// Open the journal for appending, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InvocationLogger for JsonlInvocationLogger {
    fn record(&self, record: &InvocationRecord) {
        let line = JournalLine {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            record,
        };
        let Ok(mut bytes) = serde_json::to_vec(&line) else {
            return;
        };
        bytes.push(b'\n');

        // A single write per line keeps concurrent appends from interleaving
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(err) = file.write_all(&bytes) {
            warn!(path = %self.path.display(), error = %err, "Invocation journal write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gis_mcp_domain::ErrorKind;

    fn record(operation: &str, error_kind: Option<ErrorKind>) -> InvocationRecord {
        InvocationRecord {
            operation: operation.to_string(),
            status: if error_kind.is_some() { "error" } else { "success" },
            error_kind,
            elapsed_ms: 3,
        }
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_one_line_per_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("invocations.jsonl");
        let logger = JsonlInvocationLogger::open(&path).unwrap();

        logger.record(&record("buffer", None));
        logger.record(&record("nope", Some(ErrorKind::UnknownOperation)));

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l["timestamp"].is_string()));
        assert_eq!(lines[0]["operation"], "buffer");
        assert!(lines[0].get("error_kind").is_none());
        assert_eq!(lines[1]["error_kind"], "unknown_operation");
        assert_eq!(lines[1]["elapsed_ms"], 3);
    }

    #[test]
    fn test_reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        for _ in 0..2 {
            JsonlInvocationLogger::open(&path)
                .unwrap()
                .record(&record("get_area", None));
        }
        assert_eq!(read_lines(&path).len(), 2);
    }

    #[test]
    fn test_unopenable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        assert!(JsonlInvocationLogger::open(blocker.join("journal.jsonl")).is_err());
    }
}
