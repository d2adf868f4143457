//! Client-side dedup index: content digest -> last-known remote path
//!
//! This is a local belief table, never confirmed by the server (the
//! protocol has no response channel). At most one path is recorded per
//! digest; the most recent upload wins.

use std::collections::HashMap;

use crate::digest::Digest;

#[derive(Default)]
pub struct DedupIndex {
    map: HashMap<Digest, String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remote path believed to hold this content, if any
    pub fn lookup(&self, digest: &Digest) -> Option<&str> {
        self.map.get(digest).map(|s| s.as_str())
    }

    /// Record a successful upload (last-write-wins per digest)
    pub fn record(&mut self, digest: Digest, path: String) {
        self.map.insert(digest, path);
    }

    /// Drop every entry at `path`, or contained under it when `path` was
    /// a directory.
    pub fn forget_path(&mut self, path: &str) {
        let prefix = format!("{}/", path);
        self.map
            .retain(|_, p| p != path && !p.starts_with(&prefix));
    }

    /// Rewrite the single entry recorded at `src` to `dst` (file rename)
    pub fn rename_file(&mut self, src: &str, dst: &str) {
        for p in self.map.values_mut() {
            if p == src {
                *p = dst.to_string();
            }
        }
    }

    /// Rewrite every entry under `src + "/"` to live under `dst`
    /// (directory rename)
    pub fn rename_dir(&mut self, src: &str, dst: &str) {
        let prefix = format!("{}/", src);
        for p in self.map.values_mut() {
            if let Some(rest) = p.strip_prefix(&prefix) {
                *p = format!("{}/{}", dst, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;

    #[test]
    fn record_then_lookup() {
        let mut idx = DedupIndex::new();
        let d = hash_bytes(b"one");
        idx.record(d, "a.txt".into());
        assert_eq!(idx.lookup(&d), Some("a.txt"));
    }

    #[test]
    fn last_write_wins() {
        let mut idx = DedupIndex::new();
        let d = hash_bytes(b"one");
        idx.record(d, "a.txt".into());
        idx.record(d, "b.txt".into());
        assert_eq!(idx.lookup(&d), Some("b.txt"));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn forget_exact_path() {
        let mut idx = DedupIndex::new();
        let d = hash_bytes(b"one");
        idx.record(d, "a.txt".into());
        idx.forget_path("a.txt");
        assert!(idx.lookup(&d).is_none());
    }

    #[test]
    fn forget_directory_subtree() {
        let mut idx = DedupIndex::new();
        idx.record(hash_bytes(b"1"), "dir/a".into());
        idx.record(hash_bytes(b"2"), "dir/sub/b".into());
        idx.record(hash_bytes(b"3"), "director/c".into());
        idx.forget_path("dir");
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.lookup(&hash_bytes(b"3")), Some("director/c"));
    }

    #[test]
    fn rename_directory_rewrites_all_entries() {
        let mut idx = DedupIndex::new();
        idx.record(hash_bytes(b"1"), "dir/a".into());
        idx.record(hash_bytes(b"2"), "dir/sub/b".into());
        idx.record(hash_bytes(b"3"), "other/c".into());
        idx.rename_dir("dir", "dir2");
        assert_eq!(idx.lookup(&hash_bytes(b"1")), Some("dir2/a"));
        assert_eq!(idx.lookup(&hash_bytes(b"2")), Some("dir2/sub/b"));
        assert_eq!(idx.lookup(&hash_bytes(b"3")), Some("other/c"));
    }

    #[test]
    fn rename_file_rewrites_single_entry() {
        let mut idx = DedupIndex::new();
        idx.record(hash_bytes(b"1"), "dir/x.txt".into());
        idx.rename_file("dir/x.txt", "dir2/x.txt");
        assert_eq!(idx.lookup(&hash_bytes(b"1")), Some("dir2/x.txt"));
    }
}
