//! Initial tree enumeration feeding the translator synthetic events

use anyhow::Result;
use std::path::Path;
use walkdir::WalkDir;

use crate::events::FsEvent;

/// Render a path relative to `root` as a POSIX-style string
pub fn rel_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Enumerate everything under `start` (itself excluded) as synthetic
/// events: `Created` for each file, `DirCreated` for each empty directory.
/// Non-empty directories are implied by their contents' paths and get no
/// event of their own. Order is directory-before-contents.
pub fn synthetic_events(root: &Path, start: &Path) -> Result<Vec<FsEvent>> {
    let mut events = Vec::new();
    for entry in WalkDir::new(start)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let rel = match rel_posix(root, entry.path()) {
            Some(r) => r,
            None => continue,
        };
        if entry.file_type().is_file() {
            events.push(FsEvent::Created { path: rel });
        } else if entry.file_type().is_dir() && dir_is_empty(entry.path()) {
            events.push(FsEvent::DirCreated { path: rel });
        }
        // Symlinks and special files are not part of the protocol
    }
    Ok(events)
}

/// True when `path` is a readable directory with no entries
pub fn dir_is_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut it) => it.next().is_none(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_and_empty_dirs_enumerated() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub/inner")).unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("sub/inner/b.txt"), b"b").unwrap();
        std::fs::create_dir(root.join("empty")).unwrap();

        let events = synthetic_events(root, root).unwrap();
        assert!(events.contains(&FsEvent::Created { path: "a.txt".into() }));
        assert!(events.contains(&FsEvent::Created {
            path: "sub/inner/b.txt".into()
        }));
        assert!(events.contains(&FsEvent::DirCreated {
            path: "empty".into()
        }));
        // No event for non-empty directories themselves
        assert!(!events.iter().any(|e| e.path() == "sub"));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn subtree_walk_keeps_paths_rooted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("sub/c.txt"), b"c").unwrap();

        let events = synthetic_events(root, &root.join("sub")).unwrap();
        assert_eq!(
            events,
            vec![FsEvent::Created {
                path: "sub/c.txt".into()
            }]
        );
    }

    #[test]
    fn rel_posix_uses_forward_slashes() {
        let root = Path::new("/data");
        assert_eq!(
            rel_posix(root, Path::new("/data/a/b.txt")),
            Some("a/b.txt".to_string())
        );
        assert_eq!(rel_posix(root, Path::new("/data")), None);
        assert_eq!(rel_posix(root, Path::new("/elsewhere/x")), None);
    }
}
