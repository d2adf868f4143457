use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One applied operation, recorded as a JSONL line on the daemon side
#[derive(Serialize, Deserialize, Debug)]
pub struct OpLogEntry {
    pub timestamp: String,
    pub op: String,
    pub path: String,
    pub src: Option<String>,
    pub bytes: u64,
    /// False when an upload's streamed digest disagreed with the declared one
    pub ok: bool,
}

impl OpLogEntry {
    pub fn now(op: &str, path: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            op: op.to_string(),
            path: path.to_string(),
            src: None,
            bytes: 0,
            ok: true,
        }
    }

    pub fn with_src(mut self, src: &str) -> Self {
        self.src = Some(src.to_string());
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self
    }
}

pub struct OpLog {
    log_file_path: PathBuf,
}

impl OpLog {
    pub fn new(path: &Path) -> Self {
        OpLog {
            log_file_path: path.to_path_buf(),
        }
    }

    pub fn add_entry(&self, entry: OpLogEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open operation log file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<OpLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open operation log file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: OpLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
