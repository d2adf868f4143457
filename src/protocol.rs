//! Shared protocol constants for the tailsync framed transport

// Operation tags (single byte on the wire, stable)
pub mod op {
    pub const UPLOAD: u8 = b'F';
    pub const DELETE: u8 = b'D';
    pub const COPY: u8 = b'C';
    pub const MOVE: u8 = b'M';
    pub const MKDIR: u8 = b'X';
}

/// Content digest width (SHA-256)
pub const DIGEST_SIZE: usize = 32;

/// Width of every length-prefix field for variable-length data
pub const LEN_FIELD_SIZE: usize = 4;

/// Frame header: total payload size (u64) followed by the operation tag
pub const HEADER_SIZE: usize = 8 + 1;

// Maximum path length accepted on either side - prevents memory exhaustion
// from a hostile or corrupted length prefix
pub const MAX_PATH_LEN: usize = 16 * 1024;

/// Uncompressed bytes per upload body chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

// Maximum compressed chunk length accepted by the receiver. zlib at best
// compression never expands a 64KiB chunk anywhere near this.
pub const MAX_CHUNK_LEN: usize = 4 * 1024 * 1024;

/// Pending move-correlation entries kept before the oldest is evicted
pub const MAX_PENDING_MOVES: usize = 1024;
