//! Server-side protocol dispatcher
//!
//! One accepted connection, one strictly sequential blocking loop: read a
//! frame header, decode the operation, hand it to the materializer, repeat.
//! The protocol is fire-and-forget; nothing is ever written back.

use anyhow::{Context, Result};
use std::io::{ErrorKind, Read};
use std::net::TcpListener;

use crate::materialize::Materializer;
use crate::wire::{self, Operation};

/// Bind, accept a single connection and serve it until the peer closes.
pub fn serve(bind: &str, materializer: &Materializer) -> Result<()> {
    let listener = TcpListener::bind(bind).with_context(|| format!("bind {}", bind))?;
    eprintln!(
        "tailsyncd listening on {} root={}",
        bind,
        materializer.root().display()
    );
    let (mut stream, peer) = listener.accept().context("accept")?;
    stream.set_nodelay(true).ok();
    eprintln!("conn from {}", peer);
    handle_conn(&mut stream, materializer)?;
    eprintln!("peer closed connection, done");
    Ok(())
}

/// Serve one connection. Returns `Ok` on a clean close (zero-byte read at
/// a frame boundary, or truncation mid-frame); errors are protocol-fatal
/// conditions such as malformed chunk data.
pub fn handle_conn<S: Read>(stream: &mut S, materializer: &Materializer) -> Result<()> {
    loop {
        let op = match wire::read_operation(stream)? {
            Some(op) => op,
            None => return Ok(()),
        };
        let result = dispatch(stream, materializer, op);
        if let Err(e) = result {
            if is_truncation(&e) {
                eprintln!("connection closed mid-frame");
                return Ok(());
            }
            return Err(e);
        }
    }
}

fn dispatch<S: Read>(stream: &mut S, materializer: &Materializer, op: Operation) -> Result<()> {
    match op {
        Operation::Upload { path, size, digest } => {
            materializer.upload(stream, &path, size, &digest)
        }
        Operation::Delete { path } => materializer.delete(&path),
        Operation::Copy { src, dst } => materializer.copy(&src, &dst),
        Operation::Move { src, dst } => materializer.rename(&src, &dst),
        Operation::MakeDir { path } => materializer.make_dir(&path),
    }
}

fn is_truncation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .map_or(false, |io| io.kind() == ErrorKind::UnexpectedEof)
    })
}
