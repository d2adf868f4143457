//! tailsync library
//!
//! Incremental directory mirroring over a one-way, content-addressed TCP
//! protocol: a client translates filesystem changes into framed operations
//! with hash-based deduplication; a server materializes them under a
//! containment-checked root.

pub mod chunker;
pub mod cli;
pub mod client;
pub mod digest;
pub mod events;
pub mod index;
pub mod logger;
pub mod materialize;
pub mod oplog;
pub mod protocol;
pub mod server;
pub mod translate;
pub mod walk;
pub mod watch;
pub mod wire;
