//! Client-side sync loop: walk, watch, translate, send
//!
//! Strictly sequential: each event is translated and its operations fully
//! flushed (header plus chunked body for uploads) before the next event is
//! looked at. A large upload in progress therefore delays translation of
//! later events, which keeps the dedup index consistent with what the
//! server has actually been told.

use anyhow::{Context, Result};
use std::io::Write;
use std::net::TcpStream;
use std::path::Path;

use crate::translate::Translator;
use crate::wire::{self, Operation};
use crate::{chunker, walk, watch};

/// Connect to the server, replay the existing tree, then follow live
/// events until the watcher goes away. Never returns under normal
/// operation.
pub fn run(host: &str, port: u16, source: &Path) -> Result<()> {
    let root = std::fs::canonicalize(source)
        .with_context(|| format!("canonicalize source {}", source.display()))?;
    anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());

    let mut stream = TcpStream::connect((host, port))
        .with_context(|| format!("connect {}:{}", host, port))?;
    stream.set_nodelay(true).ok();
    eprintln!("connected to {}:{}, mirroring {}", host, port, root.display());

    // Watch before walking so changes racing the initial walk are not lost;
    // a duplicate upload is harmless, a missed event is not.
    let watcher = watch::watch(&root)?;
    let mut translator = Translator::new(root.clone());

    for event in walk::synthetic_events(&root, &root)? {
        for op in translator.handle_event(event)? {
            send_operation(&mut stream, &root, &op)?;
        }
    }
    eprintln!(
        "initial walk complete ({} unique contents), watching for changes",
        translator.index().len()
    );

    while let Some(event) = watcher.recv() {
        for op in translator.handle_event(event)? {
            send_operation(&mut stream, &root, &op)?;
        }
    }
    Ok(())
}

/// Write one operation to the stream, streaming the chunked body for
/// uploads. The frame is only started once the file is open, so a file
/// that vanished after translation cannot corrupt the framing.
pub fn send_operation<W: Write>(stream: &mut W, root: &Path, op: &Operation) -> Result<()> {
    if let Operation::Upload { path, size, .. } = op {
        let abs = root.join(path);
        let mut file = match std::fs::File::open(&abs) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("skipping upload {}: {}", abs.display(), e);
                return Ok(());
            }
        };
        stream.write_all(&wire::encode_frame(op))?;
        chunker::write_body(&mut file, stream, *size)
            .with_context(|| format!("stream body of {}", abs.display()))?;
    } else {
        wire::write_frame(stream, op)?;
    }
    stream.flush()?;
    Ok(())
}
