//! Shared CLI fragments for the client and daemon binaries

use clap::Parser;
use std::path::PathBuf;

use crate::materialize::MismatchPolicy;

/// Daemon options for tailsyncd
#[derive(Clone, Debug, Parser)]
#[command(name = "tailsyncd", about = "Receive and materialize a mirrored directory tree")]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long, default_value = "127.0.0.1:10001")]
    pub bind: String,

    /// Root directory to materialize into (must be empty at startup)
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// What to do with an upload whose digest does not match
    #[arg(long, value_enum, default_value = "warn")]
    pub on_mismatch: MismatchPolicy,

    /// Append a JSONL record per applied operation to this file
    #[arg(long)]
    pub oplog: Option<PathBuf>,

    /// Append human-readable operation lines to this file
    #[arg(long)]
    pub log: Option<PathBuf>,
}

/// Client options for tailsync
#[derive(Clone, Debug, Parser)]
#[command(name = "tailsync", about = "Watch a directory and mirror it to a tailsyncd server")]
pub struct ClientOpts {
    /// Directory to watch and mirror
    pub source: PathBuf,

    /// Server host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = 10001)]
    pub port: u16,
}
