use crate::core::persistence::{PersistError, RecordRole, RecordSink, TranscriptRecord};
use chrono::SecondsFormat;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL transcript, one file per provider.
pub struct TranscriptLog {
    file_path: PathBuf,
}

#[derive(Serialize)]
struct LogLine<'a> {
    t: String,
    role: RecordRole,
    msg: &'a str,
}

impl TranscriptLog {
    pub fn new<P: AsRef<Path>>(log_dir: P, provider: &str) -> Self {
        TranscriptLog {
            file_path: log_dir.as_ref().join(format!("{provider}.jsonl")),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn write_line(&self, line: &[u8]) -> Result<(), PersistError> {
        if let Some(dir) = self
            .file_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            fs::create_dir_all(dir)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        // One write per record keeps concurrent appenders from splitting lines.
        file.write_all(line)?;
        file.flush()?;
        Ok(())
    }
}

impl RecordSink for TranscriptLog {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn append_record(&self, record: &TranscriptRecord) -> Result<(), PersistError> {
        let entry = LogLine {
            t: record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            role: record.role,
            msg: &record.text,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.write_line(&line)
    }
}
