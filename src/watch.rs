//! Live filesystem event source backed by the `notify` watcher
//!
//! Translates OS-level notifications into the abstract `FsEvent` stream
//! the translator consumes: paths relative to the source root, rename
//! pairs correlated by the watcher's tracker id.

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use crate::events::FsEvent;
use crate::walk::rel_posix;

pub struct WatchHandle {
    // Dropping the watcher stops the stream
    _watcher: RecommendedWatcher,
    events: Receiver<FsEvent>,
}

impl WatchHandle {
    /// Block until the next event; `None` once the watcher is gone.
    pub fn recv(&self) -> Option<FsEvent> {
        self.events.recv().ok()
    }
}

/// Start watching `root` recursively. `root` must already be canonical so
/// event paths strip cleanly.
pub fn watch(root: &Path) -> Result<WatchHandle> {
    let (tx, rx) = channel();
    let base = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                for ev in map_event(&base, event) {
                    if tx.send(ev).is_err() {
                        return;
                    }
                }
            }
            Err(e) => eprintln!("watch error: {}", e),
        }
    })
    .context("create filesystem watcher")?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("watch {}", root.display()))?;
    Ok(WatchHandle {
        _watcher: watcher,
        events: rx,
    })
}

fn map_event(root: &Path, event: notify::Event) -> Vec<FsEvent> {
    let tracker = event.tracker().map(|t| t as u64);
    let rel = |p: &PathBuf| rel_posix(root, p);
    let mut out = Vec::new();

    match event.kind {
        EventKind::Create(kind) => {
            for p in &event.paths {
                let Some(path) = rel(p) else { continue };
                let is_dir = match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => p.is_dir(),
                };
                if is_dir {
                    out.push(FsEvent::DirCreated { path });
                } else {
                    out.push(FsEvent::Created { path });
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => {
                if let Some(path) = event.paths.first().and_then(rel) {
                    match tracker {
                        // The source is already gone, so we cannot stat it;
                        // the translator re-checks against the destination.
                        Some(cookie) => out.push(FsEvent::MovedFrom {
                            cookie,
                            path,
                            is_dir: false,
                        }),
                        // Without a tracker the halves of different renames
                        // are indistinguishable; treat them as independent
                        // delete and create events instead of guessing.
                        None => out.push(FsEvent::Deleted { path }),
                    }
                }
            }
            RenameMode::To => {
                if let Some(p) = event.paths.first() {
                    if let Some(path) = rel(p) {
                        match tracker {
                            Some(cookie) => out.push(FsEvent::MovedTo { cookie, path }),
                            None if p.is_dir() => out.push(FsEvent::DirCreated { path }),
                            None => out.push(FsEvent::Created { path }),
                        }
                    }
                }
            }
            RenameMode::Both => {
                if event.paths.len() >= 2 {
                    let src = rel(&event.paths[0]);
                    let dst = rel(&event.paths[1]);
                    if let (Some(src), Some(dst)) = (src, dst) {
                        // Both halves arrive in one event, so any cookie
                        // value pairs them
                        let cookie = tracker.unwrap_or(0);
                        let is_dir = event.paths[1].is_dir();
                        out.push(FsEvent::MovedFrom {
                            cookie,
                            path: src,
                            is_dir,
                        });
                        out.push(FsEvent::MovedTo { cookie, path: dst });
                    }
                }
            }
            _ => {}
        },
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            for p in &event.paths {
                if p.is_file() {
                    if let Some(path) = rel(p) {
                        out.push(FsEvent::Modified { path });
                    }
                }
            }
        }
        EventKind::Remove(_) => {
            for p in &event.paths {
                if let Some(path) = rel(p) {
                    out.push(FsEvent::Deleted { path });
                }
            }
        }
        // Metadata-only changes and access notifications carry nothing the
        // protocol models
        _ => {}
    }
    out
}
