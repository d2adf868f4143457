use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Sink for materialized operations. Implementations must tolerate being
/// called once per applied operation on the serving thread.
pub trait Logger: Send + Sync {
    fn upload(&self, _path: &Path, _bytes: u64) {}
    fn delete(&self, _path: &Path) {}
    fn copy(&self, _src: &Path, _dst: &Path) {}
    fn rename(&self, _src: &Path, _dst: &Path) {}
    fn mkdir(&self, _path: &Path) {}
    fn warn(&self, context: &str, path: &Path, msg: &str) {
        eprintln!("WARN ctx={} path={} msg={}", context, path.display(), msg);
    }
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn upload(&self, path: &Path, bytes: u64) {
        self.line(&format!("UPLOAD path={} bytes={}", path.display(), bytes));
    }
    fn delete(&self, path: &Path) {
        self.line(&format!("DELETE path={}", path.display()));
    }
    fn copy(&self, src: &Path, dst: &Path) {
        self.line(&format!("COPY src={} dst={}", src.display(), dst.display()));
    }
    fn rename(&self, src: &Path, dst: &Path) {
        self.line(&format!("MOVE src={} dst={}", src.display(), dst.display()));
    }
    fn mkdir(&self, path: &Path) {
        self.line(&format!("MKDIR path={}", path.display()));
    }
    fn warn(&self, context: &str, path: &Path, msg: &str) {
        self.line(&format!("WARN ctx={} path={} msg={}", context, path.display(), msg));
        eprintln!("WARN ctx={} path={} msg={}", context, path.display(), msg);
    }
}
