//! Content digest utilities

use anyhow::{Context, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::protocol::DIGEST_SIZE;

/// 32-byte SHA-256 digest of a file's full byte stream
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; DIGEST_SIZE]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; DIGEST_SIZE] = bytes
            .try_into()
            .context("digest field is not 32 bytes")?;
        Ok(Digest(arr))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// Incremental digest accumulator for bytes arriving in arbitrary pieces
pub struct DigestWriter {
    hasher: Sha256,
}

impl DigestWriter {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish(self) -> Digest {
        Digest(self.hasher.finalize().into())
    }
}

impl Default for DigestWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a file by streaming it; never reads the whole file into memory.
pub fn hash_file(path: &Path) -> Result<Digest> {
    let mut f = std::fs::File::open(path)
        .with_context(|| format!("open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Digest(hasher.finalize().into()))
}

/// Hash an in-memory buffer (test helper and small-payload path)
pub fn hash_bytes(data: &[u8]) -> Digest {
    Digest(Sha256::digest(data).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_and_buffer_digests_agree() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.bin");
        let data: Vec<u8> = (0u32..100_000).map(|i| (i % 251) as u8).collect();
        std::fs::write(&p, &data).unwrap();

        assert_eq!(hash_file(&p).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut w = DigestWriter::new();
        w.update(b"hel");
        w.update(b"lo");
        assert_eq!(w.finish(), hash_bytes(b"hello"));
    }

    #[test]
    fn empty_file_digest_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty");
        std::fs::write(&p, b"").unwrap();
        assert_eq!(hash_file(&p).unwrap(), hash_bytes(b""));
    }

    #[test]
    fn hex_rendering() {
        let d = hash_bytes(b"hello");
        let s = d.to_string();
        assert_eq!(s.len(), 64);
        assert!(s.starts_with("2cf24dba"));
    }
}
