use anyhow::{Context, Result};
use clap::Parser;

use tailsync::cli::DaemonOpts;
use tailsync::logger::{Logger, NoopLogger, TextLogger};
use tailsync::materialize::Materializer;
use tailsync::oplog::OpLog;
use tailsync::server;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();

    if !opts.root.exists() {
        anyhow::bail!("root directory does not exist: {}", opts.root.display());
    }
    if !opts.root.is_dir() {
        anyhow::bail!("root path is not a directory: {}", opts.root.display());
    }
    // A pre-populated root would silently diverge from the client's tree,
    // so refuse to start on one.
    let mut entries = std::fs::read_dir(&opts.root)
        .with_context(|| format!("read root directory {}", opts.root.display()))?;
    if entries.next().is_some() {
        anyhow::bail!("root directory is not empty: {}", opts.root.display());
    }

    let logger: Box<dyn Logger> = match &opts.log {
        Some(path) => Box::new(TextLogger::new(path)?),
        None => Box::new(NoopLogger),
    };
    let mut materializer = Materializer::new(&opts.root, opts.on_mismatch, logger)?;
    if let Some(path) = &opts.oplog {
        materializer = materializer.with_oplog(OpLog::new(path));
    }

    server::serve(&opts.bind, &materializer)
}
