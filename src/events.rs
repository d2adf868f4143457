//! Abstract filesystem change notifications consumed by the translator
//!
//! Paths are POSIX-style strings relative to the watched source root.
//! Move pairs are correlated by an opaque cookie supplied by the event
//! source, valid only for the lifetime of a matched from/to pair.

pub type MoveCookie = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// A file appeared and is fully written
    Created { path: String },
    /// An existing file's content changed
    Modified { path: String },
    /// A file or directory disappeared
    Deleted { path: String },
    /// A directory appeared
    DirCreated { path: String },
    /// First half of a rename within the watched tree
    MovedFrom {
        cookie: MoveCookie,
        path: String,
        is_dir: bool,
    },
    /// Second half of a rename within the watched tree
    MovedTo { cookie: MoveCookie, path: String },
}

impl FsEvent {
    pub fn path(&self) -> &str {
        match self {
            FsEvent::Created { path }
            | FsEvent::Modified { path }
            | FsEvent::Deleted { path }
            | FsEvent::DirCreated { path }
            | FsEvent::MovedFrom { path, .. }
            | FsEvent::MovedTo { path, .. } => path,
        }
    }
}
