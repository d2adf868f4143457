//! Server-side filesystem materializer
//!
//! Applies decoded operations under a rooted directory. Every path off the
//! wire is joined under the root and containment-checked; an operation
//! whose resolved destination escapes the root is dropped, with upload
//! bodies drained so the stream stays aligned on the next frame header.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::chunker::BodyReader;
use crate::digest::{Digest, DigestWriter};
use crate::logger::Logger;
use crate::oplog::{OpLog, OpLogEntry};

/// What to do with a fully-received upload whose streamed digest disagrees
/// with the declared one. Never fatal and never reported to the client:
/// the protocol has no response channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MismatchPolicy {
    /// Keep the bytes as received and log a warning
    #[default]
    Warn,
    /// Rename the file aside with a `.quarantine` suffix
    Quarantine,
}

/// Normalize a path to be safely under a root directory.
/// Rejects absolute paths, parent components and NUL bytes, then
/// canonicalizes the deepest existing ancestor so symlinks cannot smuggle
/// the result outside the root.
pub fn normalize_under_root(root: &Path, p: &Path) -> Result<PathBuf> {
    use Component::{CurDir, Normal, ParentDir, Prefix, RootDir};

    let path_str = p.to_string_lossy();
    if path_str.contains('\0') {
        bail!("path contains NUL byte");
    }

    let mut safe = PathBuf::new();
    for component in p.components() {
        match component {
            CurDir => {} // Skip "."
            Normal(s) => safe.push(s),
            ParentDir | RootDir | Prefix(_) => {
                bail!("path contains disallowed component: {:?}", component);
            }
        }
    }
    if safe.as_os_str().is_empty() {
        bail!("path resolves to the root itself");
    }

    let joined = root.join(&safe);

    // For existing paths, canonicalize to resolve symlinks.
    // For new files, canonicalize the nearest existing ancestor and
    // reattach the remainder.
    let final_path = if joined.exists() {
        joined
            .canonicalize()
            .map_err(|e| anyhow!("failed to canonicalize {:?}: {}", joined, e))?
    } else {
        let mut existing = joined.clone();
        let mut tail = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => break,
            }
        }
        let mut out = existing
            .canonicalize()
            .map_err(|e| anyhow!("failed to canonicalize ancestor {:?}: {}", existing, e))?;
        for name in tail.iter().rev() {
            out.push(name);
        }
        out
    };

    if !final_path.starts_with(root) {
        bail!("path {:?} escapes root {:?}", p, root);
    }

    Ok(final_path)
}

fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub struct Materializer {
    root: PathBuf,
    policy: MismatchPolicy,
    logger: Box<dyn Logger>,
    oplog: Option<OpLog>,
}

impl Materializer {
    pub fn new(root: &Path, policy: MismatchPolicy, logger: Box<dyn Logger>) -> Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("canonicalize root {}", root.display()))?;
        Ok(Self {
            root,
            policy,
            logger,
            oplog: None,
        })
    }

    pub fn with_oplog(mut self, oplog: OpLog) -> Self {
        self.oplog = Some(oplog);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record(&self, entry: OpLogEntry) {
        if let Some(log) = &self.oplog {
            if let Err(e) = log.add_entry(entry) {
                eprintln!("oplog write failed: {}", e);
            }
        }
    }

    /// Receive an upload body into `path`. A containment violation drains
    /// the declared body and drops the operation; a digest mismatch is
    /// handled per policy; both leave the connection serviceable.
    pub fn upload<R: Read>(
        &self,
        stream: &mut R,
        path: &str,
        size: u64,
        declared: &Digest,
    ) -> Result<()> {
        let mut body = BodyReader::new(stream, size);
        let dst = match normalize_under_root(&self.root, Path::new(path)) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("dropping upload {}: {}", path, e);
                return body.drain();
            }
        };
        ensure_parent_exists(&dst)?;

        // Truncate-or-create, then stream chunks into an append write while
        // hashing bytes as they land
        fs::File::create(&dst).with_context(|| format!("create {}", dst.display()))?;
        let mut f = OpenOptions::new()
            .append(true)
            .open(&dst)
            .with_context(|| format!("open {} for append", dst.display()))?;
        let mut hasher = DigestWriter::new();
        while let Some(piece) = body.next_chunk()? {
            f.write_all(&piece)?;
            hasher.update(&piece);
        }
        f.flush()?;

        let actual = hasher.finish();
        let ok = actual == *declared;
        if !ok {
            self.logger.warn(
                "upload",
                &dst,
                &format!("digest mismatch: declared {} got {}", declared, actual),
            );
            if self.policy == MismatchPolicy::Quarantine {
                let mut q = dst.clone().into_os_string();
                q.push(".quarantine");
                if let Err(e) = fs::rename(&dst, &q) {
                    self.logger
                        .warn("upload", &dst, &format!("quarantine failed: {}", e));
                }
            }
        }
        self.logger.upload(&dst, size);
        self.record(
            OpLogEntry::now("upload", path)
                .with_bytes(size)
                .with_ok(ok),
        );
        Ok(())
    }

    /// Remove a file or directory tree; a missing target is a no-op.
    pub fn delete(&self, path: &str) -> Result<()> {
        let dst = match normalize_under_root(&self.root, Path::new(path)) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("dropping delete {}: {}", path, e);
                return Ok(());
            }
        };
        let result = match fs::symlink_metadata(&dst) {
            Ok(md) if md.is_dir() => fs::remove_dir_all(&dst),
            Ok(_) => fs::remove_file(&dst),
            Err(e) => {
                eprintln!("delete {}: target missing ({})", path, e);
                return Ok(());
            }
        };
        if let Err(e) = result {
            self.logger.warn("delete", &dst, &e.to_string());
            return Ok(());
        }
        self.logger.delete(&dst);
        self.record(OpLogEntry::now("delete", path));
        Ok(())
    }

    /// Duplicate file bytes from `src` to `dst`; both endpoints must pass
    /// the containment check or the whole operation is skipped.
    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let (from, to) = match self.resolve_pair(src, dst, "copy") {
            Some(pair) => pair,
            None => return Ok(()),
        };
        ensure_parent_exists(&to)?;
        match fs::copy(&from, &to) {
            Ok(_) => {
                self.logger.copy(&from, &to);
                self.record(OpLogEntry::now("copy", dst).with_src(src));
            }
            Err(e) => eprintln!("copy {} -> {}: {}", src, dst, e),
        }
        Ok(())
    }

    /// Relocate `src` to `dst`; same dual containment check as copy.
    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let (from, to) = match self.resolve_pair(src, dst, "move") {
            Some(pair) => pair,
            None => return Ok(()),
        };
        ensure_parent_exists(&to)?;
        match fs::rename(&from, &to) {
            Ok(()) => {
                self.logger.rename(&from, &to);
                self.record(OpLogEntry::now("move", dst).with_src(src));
            }
            Err(e) => eprintln!("move {} -> {}: {}", src, dst, e),
        }
        Ok(())
    }

    /// Create a directory and any missing parents; idempotent.
    pub fn make_dir(&self, path: &str) -> Result<()> {
        let dst = match normalize_under_root(&self.root, Path::new(path)) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("dropping mkdir {}: {}", path, e);
                return Ok(());
            }
        };
        if !dst.exists() {
            if let Err(e) = fs::create_dir_all(&dst) {
                self.logger.warn("mkdir", &dst, &e.to_string());
                return Ok(());
            }
        }
        self.logger.mkdir(&dst);
        self.record(OpLogEntry::now("mkdir", path));
        Ok(())
    }

    fn resolve_pair(&self, src: &str, dst: &str, what: &str) -> Option<(PathBuf, PathBuf)> {
        let from = match normalize_under_root(&self.root, Path::new(src)) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("dropping {} {} -> {}: {}", what, src, dst, e);
                return None;
            }
        };
        let to = match normalize_under_root(&self.root, Path::new(dst)) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("dropping {} {} -> {}: {}", what, src, dst, e);
                return None;
            }
        };
        Some((from, to))
    }
}
