//! Chunked compression transport for upload bodies
//!
//! A body is a sequence of independently zlib-compressed chunks, each
//! prefixed with a 4-byte big-endian *compressed* length. Chunk boundaries
//! carry no meaning: the logical file is the concatenation of decompressed
//! chunk outputs, terminated by the declared uncompressed size from the
//! frame header. A zero-length file has zero chunks.

use anyhow::{bail, Context, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::protocol::{CHUNK_SIZE, MAX_CHUNK_LEN};

/// Stream `size` bytes from `src` into `out` as compressed chunks.
/// Returns the number of compressed bytes written (excluding prefixes).
pub fn write_body<R: Read, W: Write>(src: &mut R, out: &mut W, size: u64) -> Result<u64> {
    let mut remaining = size;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut compressed_total = 0u64;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let mut filled = 0;
        while filled < want {
            let n = src.read(&mut buf[filled..want])?;
            if n == 0 {
                bail!(
                    "source ended {} bytes short of its declared size",
                    remaining - filled as u64
                );
            }
            filled += n;
        }
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
        enc.write_all(&buf[..filled])?;
        let chunk = enc.finish().context("compress chunk")?;
        out.write_all(&(chunk.len() as u32).to_be_bytes())?;
        out.write_all(&chunk)?;
        compressed_total += chunk.len() as u64;
        remaining -= filled as u64;
    }
    Ok(compressed_total)
}

/// Reassembles a chunked body off a stream, yielding decompressed pieces
/// until the declared uncompressed size has been produced.
pub struct BodyReader<'a, R: Read> {
    inner: &'a mut R,
    remaining: u64,
    compressed_read: u64,
}

impl<'a, R: Read> BodyReader<'a, R> {
    pub fn new(inner: &'a mut R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
            compressed_read: 0,
        }
    }

    /// Uncompressed bytes still owed by the stream
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Compressed bytes consumed so far (excluding length prefixes)
    pub fn compressed_read(&self) -> u64 {
        self.compressed_read
    }

    /// Next decompressed piece, or `None` once the body is complete.
    /// Malformed chunk data is unrecoverable mid-stream and surfaces as an
    /// error the caller must treat as fatal to the connection.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        self.inner
            .read_exact(&mut len_bytes)
            .context("read chunk length")?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len == 0 || len > MAX_CHUNK_LEN {
            bail!("invalid compressed chunk length: {}", len);
        }
        // Transport reads may return fewer bytes than asked; read_exact
        // loops until the chunk is fully buffered.
        let mut compressed = vec![0u8; len];
        self.inner
            .read_exact(&mut compressed)
            .context("read chunk body")?;
        self.compressed_read += len as u64;

        // Cap the decompressed read at the bytes still owed plus one, so a
        // chunk inflating past the declared size is rejected without ever
        // being buffered in full.
        let cap = self.remaining.saturating_add(1);
        let mut data = Vec::with_capacity(cap.min(CHUNK_SIZE as u64) as usize);
        ZlibDecoder::new(&compressed[..])
            .take(cap)
            .read_to_end(&mut data)
            .context("decompress chunk")?;
        if data.len() as u64 > self.remaining {
            bail!(
                "chunk decompressed to {} bytes, only {} left in declared size",
                data.len(),
                self.remaining
            );
        }
        self.remaining -= data.len() as u64;
        Ok(Some(data))
    }

    /// Consume and discard the rest of the body, keeping the stream
    /// aligned on the next frame header.
    pub fn drain(&mut self) -> Result<()> {
        while self.next_chunk()?.is_some() {}
        Ok(())
    }
}
