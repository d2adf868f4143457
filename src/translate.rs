//! Change translator: filesystem events in, protocol operations out
//!
//! Single-threaded state machine owning the dedup index and the pending
//! move-correlation map. One event is fully translated before the next is
//! looked at; the caller sends each returned operation before handing over
//! the next event.

use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::digest::hash_file;
use crate::events::{FsEvent, MoveCookie};
use crate::index::DedupIndex;
use crate::protocol::MAX_PENDING_MOVES;
use crate::walk;
use crate::wire::Operation;

struct PendingMove {
    is_dir: bool,
    src: String,
}

pub struct Translator {
    root: PathBuf,
    index: DedupIndex,
    pending: HashMap<MoveCookie, PendingMove>,
    // FIFO of cookies for eviction; always holds exactly the keys of
    // `pending`
    pending_order: VecDeque<MoveCookie>,
}

impl Translator {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            index: DedupIndex::new(),
            pending: HashMap::new(),
            pending_order: VecDeque::new(),
        }
    }

    pub fn index(&self) -> &DedupIndex {
        &self.index
    }

    /// Translate one event into zero or more operations, in send order.
    pub fn handle_event(&mut self, event: FsEvent) -> Result<Vec<Operation>> {
        match event {
            FsEvent::Created { path } | FsEvent::Modified { path } => self.file_changed(path),
            FsEvent::Deleted { path } => {
                self.index.forget_path(&path);
                Ok(vec![Operation::Delete { path }])
            }
            FsEvent::DirCreated { path } => self.dir_created(path),
            FsEvent::MovedFrom {
                cookie,
                path,
                is_dir,
            } => {
                self.remember_move(cookie, path, is_dir);
                Ok(Vec::new())
            }
            FsEvent::MovedTo { cookie, path } => self.move_completed(cookie, path),
        }
    }

    fn file_changed(&mut self, path: String) -> Result<Vec<Operation>> {
        let abs = self.root.join(&path);
        let md = match std::fs::metadata(&abs) {
            Ok(md) if md.is_file() => md,
            // Vanished or not a regular file by the time we got here
            _ => return Ok(Vec::new()),
        };
        let digest = match hash_file(&abs) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("skipping unreadable file {}: {}", abs.display(), e);
                return Ok(Vec::new());
            }
        };
        let size = md.len();

        // Copy of "nothing" carries no benefit and the empty-file digest is
        // a degenerate constant, so zero-length files always re-upload.
        if size > 0 {
            if let Some(known) = self.index.lookup(&digest) {
                if known != path {
                    return Ok(vec![Operation::Copy {
                        src: known.to_string(),
                        dst: path,
                    }]);
                }
            }
        }
        self.index.record(digest, path.clone());
        Ok(vec![Operation::Upload { path, size, digest }])
    }

    fn dir_created(&mut self, path: String) -> Result<Vec<Operation>> {
        let abs = self.root.join(&path);
        let mut ops = vec![Operation::MakeDir { path }];
        // A directory that arrived with contents (moved in, extracted, ...)
        // never produces per-file events, so re-walk it.
        if !walk::dir_is_empty(&abs) {
            for ev in walk::synthetic_events(&self.root, &abs)? {
                ops.extend(self.handle_event(ev)?);
            }
        }
        Ok(ops)
    }

    fn remember_move(&mut self, cookie: MoveCookie, src: String, is_dir: bool) {
        while self.pending.len() >= MAX_PENDING_MOVES {
            // Unmatched from-without-to entries would otherwise leak for
            // the life of the process
            match self.pending_order.pop_front() {
                Some(old) => {
                    self.pending.remove(&old);
                }
                None => break,
            }
        }
        self.pending.insert(cookie, PendingMove { is_dir, src });
        self.pending_order.push_back(cookie);
    }

    fn move_completed(&mut self, cookie: MoveCookie, dst: String) -> Result<Vec<Operation>> {
        let entry = match self.pending.remove(&cookie) {
            Some(e) => e,
            None => {
                eprintln!("moved-to without matching moved-from (cookie {})", cookie);
                return Ok(Vec::new());
            }
        };
        self.pending_order.retain(|c| *c != cookie);
        // Backends that split a rename pair cannot stat the vanished
        // source, so double-check against the destination.
        let dir_move = entry.is_dir || self.root.join(&dst).is_dir();
        if dir_move {
            self.index.rename_dir(&entry.src, &dst);
        } else {
            self.index.rename_file(&entry.src, &dst);
        }
        Ok(vec![Operation::Move {
            src: entry.src,
            dst,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Translator) {
        let dir = tempfile::tempdir().unwrap();
        let t = Translator::new(dir.path().to_path_buf());
        (dir, t)
    }

    fn write(root: &Path, rel: &str, data: &[u8]) {
        let p = root.join(rel);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(p, data).unwrap();
    }

    #[test]
    fn identical_content_copies_instead_of_reuploading() {
        let (dir, mut t) = setup();
        write(dir.path(), "a.txt", b"hello");
        write(dir.path(), "b.txt", b"hello");

        let first = t
            .handle_event(FsEvent::Created { path: "a.txt".into() })
            .unwrap();
        assert!(matches!(first[0], Operation::Upload { ref path, size: 5, .. } if path == "a.txt"));

        let second = t
            .handle_event(FsEvent::Created { path: "b.txt".into() })
            .unwrap();
        assert_eq!(
            second,
            vec![Operation::Copy {
                src: "a.txt".into(),
                dst: "b.txt".into()
            }]
        );
    }

    #[test]
    fn zero_length_files_always_upload() {
        let (dir, mut t) = setup();
        write(dir.path(), "a.txt", b"");
        write(dir.path(), "b.txt", b"");

        t.handle_event(FsEvent::Created { path: "a.txt".into() })
            .unwrap();
        let ops = t
            .handle_event(FsEvent::Created { path: "b.txt".into() })
            .unwrap();
        assert!(matches!(ops[0], Operation::Upload { size: 0, .. }));
    }

    #[test]
    fn delete_clears_index_entry() {
        let (dir, mut t) = setup();
        write(dir.path(), "a.txt", b"hello");
        t.handle_event(FsEvent::Created { path: "a.txt".into() })
            .unwrap();
        assert_eq!(t.index().len(), 1);

        let ops = t
            .handle_event(FsEvent::Deleted { path: "a.txt".into() })
            .unwrap();
        assert_eq!(ops, vec![Operation::Delete { path: "a.txt".into() }]);
        assert!(t.index().lookup(&hash_bytes(b"hello")).is_none());
    }

    #[test]
    fn empty_dir_gets_mkdir_only() {
        let (dir, mut t) = setup();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let ops = t
            .handle_event(FsEvent::DirCreated { path: "empty".into() })
            .unwrap();
        assert_eq!(ops, vec![Operation::MakeDir { path: "empty".into() }]);
    }

    #[test]
    fn nonempty_dir_rewalks_contents() {
        let (dir, mut t) = setup();
        write(dir.path(), "moved/x.txt", b"x content");
        std::fs::create_dir(dir.path().join("moved/hollow")).unwrap();

        let ops = t
            .handle_event(FsEvent::DirCreated { path: "moved".into() })
            .unwrap();
        assert_eq!(ops[0], Operation::MakeDir { path: "moved".into() });
        assert!(ops
            .iter()
            .any(|o| matches!(o, Operation::Upload { path, .. } if path == "moved/x.txt")));
        assert!(ops
            .iter()
            .any(|o| matches!(o, Operation::MakeDir { path } if path == "moved/hollow")));
    }

    #[test]
    fn file_move_rewrites_index_path() {
        let (dir, mut t) = setup();
        write(dir.path(), "dir/x.txt", b"x content");
        t.handle_event(FsEvent::Created {
            path: "dir/x.txt".into(),
        })
        .unwrap();

        write(dir.path(), "dir2/x.txt", b"x content");
        std::fs::remove_file(dir.path().join("dir/x.txt")).unwrap();
        t.handle_event(FsEvent::MovedFrom {
            cookie: 7,
            path: "dir/x.txt".into(),
            is_dir: false,
        })
        .unwrap();
        let ops = t
            .handle_event(FsEvent::MovedTo {
                cookie: 7,
                path: "dir2/x.txt".into(),
            })
            .unwrap();
        assert_eq!(
            ops,
            vec![Operation::Move {
                src: "dir/x.txt".into(),
                dst: "dir2/x.txt".into()
            }]
        );
        assert_eq!(
            t.index().lookup(&hash_bytes(b"x content")),
            Some("dir2/x.txt")
        );
    }

    #[test]
    fn dir_move_rewrites_every_contained_entry() {
        let (dir, mut t) = setup();
        for (rel, data) in [("d/a", b"aa" as &[u8]), ("d/s/b", b"bb"), ("d/s/c", b"cc")] {
            write(dir.path(), rel, data);
            t.handle_event(FsEvent::Created { path: rel.into() }).unwrap();
        }
        std::fs::rename(dir.path().join("d"), dir.path().join("e")).unwrap();

        t.handle_event(FsEvent::MovedFrom {
            cookie: 1,
            path: "d".into(),
            is_dir: true,
        })
        .unwrap();
        let ops = t
            .handle_event(FsEvent::MovedTo {
                cookie: 1,
                path: "e".into(),
            })
            .unwrap();
        assert_eq!(
            ops,
            vec![Operation::Move {
                src: "d".into(),
                dst: "e".into()
            }]
        );
        assert_eq!(t.index().lookup(&hash_bytes(b"aa")), Some("e/a"));
        assert_eq!(t.index().lookup(&hash_bytes(b"bb")), Some("e/s/b"));
        assert_eq!(t.index().lookup(&hash_bytes(b"cc")), Some("e/s/c"));
    }

    #[test]
    fn unmatched_moved_to_is_ignored() {
        let (_dir, mut t) = setup();
        let ops = t
            .handle_event(FsEvent::MovedTo {
                cookie: 42,
                path: "anywhere".into(),
            })
            .unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn pending_moves_are_bounded() {
        let (_dir, mut t) = setup();
        for i in 0..(MAX_PENDING_MOVES as u64 + 10) {
            t.handle_event(FsEvent::MovedFrom {
                cookie: i,
                path: format!("f{}", i),
                is_dir: false,
            })
            .unwrap();
        }
        assert!(t.pending.len() <= MAX_PENDING_MOVES);
        // The oldest cookies were evicted
        assert!(!t.pending.contains_key(&0));
    }

    #[test]
    fn matched_moves_leave_no_correlation_state() {
        let (_dir, mut t) = setup();
        for i in 0..(MAX_PENDING_MOVES as u64 * 3) {
            t.handle_event(FsEvent::MovedFrom {
                cookie: i,
                path: format!("old{}", i),
                is_dir: false,
            })
            .unwrap();
            t.handle_event(FsEvent::MovedTo {
                cookie: i,
                path: format!("new{}", i),
            })
            .unwrap();
        }
        assert!(t.pending.is_empty());
        assert!(t.pending_order.is_empty());
    }

    #[test]
    fn vanished_file_produces_nothing() {
        let (_dir, mut t) = setup();
        let ops = t
            .handle_event(FsEvent::Created {
                path: "never-existed".into(),
            })
            .unwrap();
        assert!(ops.is_empty());
    }
}
