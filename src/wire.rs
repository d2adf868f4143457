//! Framed wire codec for sync operations
//!
//! Frame layout (network byte order):
//! `total_payload_size: u64 | tag: u8 | operation fields`. The total counts
//! every byte after the tag, with upload bodies counted at their
//! uncompressed size; each variable-length field carries its own u32
//! length prefix and is terminated by it, not by the total.

use anyhow::{bail, Context, Result};
use std::io::{ErrorKind, Read, Write};

use crate::digest::Digest;
use crate::protocol::{op, DIGEST_SIZE, HEADER_SIZE, LEN_FIELD_SIZE, MAX_PATH_LEN};

/// One protocol operation. Upload is followed on the wire by a chunked
/// body (see `chunker`); everything else is fully described by its frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Upload {
        path: String,
        size: u64,
        digest: Digest,
    },
    Delete {
        path: String,
    },
    Copy {
        src: String,
        dst: String,
    },
    Move {
        src: String,
        dst: String,
    },
    MakeDir {
        path: String,
    },
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a frame header plus all fixed and variable fields. For uploads
/// the chunked body is streamed separately, after these bytes.
pub fn encode_frame(op_: &Operation) -> Vec<u8> {
    let mut fields = Vec::new();
    let (tag, body_size) = match op_ {
        Operation::Upload { path, size, digest } => {
            write_u32(&mut fields, path.len() as u32);
            fields.extend_from_slice(digest.as_bytes());
            fields.extend_from_slice(path.as_bytes());
            (op::UPLOAD, *size)
        }
        Operation::Delete { path } => {
            write_str(&mut fields, path);
            (op::DELETE, 0)
        }
        Operation::Copy { src, dst } => {
            write_str(&mut fields, src);
            write_str(&mut fields, dst);
            (op::COPY, 0)
        }
        Operation::Move { src, dst } => {
            write_str(&mut fields, src);
            write_str(&mut fields, dst);
            (op::MOVE, 0)
        }
        Operation::MakeDir { path } => {
            write_str(&mut fields, path);
            (op::MKDIR, 0)
        }
    };
    let total = fields.len() as u64 + body_size;
    let mut frame = Vec::with_capacity(8 + 1 + fields.len());
    frame.extend_from_slice(&total.to_be_bytes());
    frame.push(tag);
    frame.extend_from_slice(&fields);
    frame
}

pub fn write_frame<W: Write>(w: &mut W, op_: &Operation) -> Result<()> {
    w.write_all(&encode_frame(op_))?;
    Ok(())
}

// A peer that closes the connection between or inside frames is a normal
// end of stream, never a parse error.
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    match r.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_u32<R: Read>(r: &mut R) -> Result<Option<u32>> {
    let mut b = [0u8; 4];
    if !read_exact_or_eof(r, &mut b)? {
        return Ok(None);
    }
    Ok(Some(u32::from_be_bytes(b)))
}

fn read_path<R: Read>(r: &mut R, len: usize) -> Result<Option<String>> {
    if len > MAX_PATH_LEN {
        bail!("path length {} exceeds limit {}", len, MAX_PATH_LEN);
    }
    let mut b = vec![0u8; len];
    if !read_exact_or_eof(r, &mut b)? {
        return Ok(None);
    }
    Ok(Some(String::from_utf8(b).context("path is not utf-8")?))
}

fn read_len_prefixed_path<R: Read>(r: &mut R) -> Result<Option<String>> {
    let len = match read_u32(r)? {
        Some(l) => l as usize,
        None => return Ok(None),
    };
    read_path(r, len)
}

/// Decode the next operation off the stream. `Ok(None)` means the peer
/// closed the connection; for uploads the body has NOT been consumed yet.
pub fn read_operation<R: Read>(r: &mut R) -> Result<Option<Operation>> {
    let mut hdr = [0u8; HEADER_SIZE];
    if !read_exact_or_eof(r, &mut hdr)? {
        return Ok(None);
    }
    let total = u64::from_be_bytes(hdr[0..8].try_into().context("invalid total size bytes")?);
    let tag = hdr[8];

    match tag {
        op::UPLOAD => {
            let path_len = match read_u32(r)? {
                Some(l) => l as usize,
                None => return Ok(None),
            };
            let mut digest_bytes = [0u8; DIGEST_SIZE];
            if !read_exact_or_eof(r, &mut digest_bytes)? {
                return Ok(None);
            }
            let path = match read_path(r, path_len)? {
                Some(p) => p,
                None => return Ok(None),
            };
            // The advisory total is only load-bearing here: it declares
            // the uncompressed body size.
            let fixed = (LEN_FIELD_SIZE + DIGEST_SIZE + path_len) as u64;
            let size = total
                .checked_sub(fixed)
                .with_context(|| format!("upload total {} smaller than header fields", total))?;
            Ok(Some(Operation::Upload {
                path,
                size,
                digest: Digest::from_bytes(&digest_bytes)?,
            }))
        }
        op::DELETE => Ok(read_len_prefixed_path(r)?.map(|path| Operation::Delete { path })),
        op::MKDIR => Ok(read_len_prefixed_path(r)?.map(|path| Operation::MakeDir { path })),
        op::COPY | op::MOVE => {
            let src = match read_len_prefixed_path(r)? {
                Some(p) => p,
                None => return Ok(None),
            };
            let dst = match read_len_prefixed_path(r)? {
                Some(p) => p,
                None => return Ok(None),
            };
            if tag == op::COPY {
                Ok(Some(Operation::Copy { src, dst }))
            } else {
                Ok(Some(Operation::Move { src, dst }))
            }
        }
        other => bail!("unknown operation tag: 0x{:02x}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;
    use std::io::Cursor;

    fn round_trip(op_: Operation) {
        let frame = encode_frame(&op_);
        let mut cur = Cursor::new(frame);
        let back = read_operation(&mut cur).unwrap().unwrap();
        assert_eq!(op_, back);
    }

    #[test]
    fn round_trip_all_variants() {
        round_trip(Operation::Upload {
            path: "dir/a.txt".into(),
            size: 12345,
            digest: hash_bytes(b"payload"),
        });
        round_trip(Operation::Delete {
            path: "gone.bin".into(),
        });
        round_trip(Operation::Copy {
            src: "a.txt".into(),
            dst: "b.txt".into(),
        });
        round_trip(Operation::Move {
            src: "dir/x".into(),
            dst: "dir2/x".into(),
        });
        round_trip(Operation::MakeDir {
            path: "empty".into(),
        });
    }

    #[test]
    fn round_trip_zero_length_upload() {
        round_trip(Operation::Upload {
            path: "empty.txt".into(),
            size: 0,
            digest: hash_bytes(b""),
        });
    }

    #[test]
    fn round_trip_maximum_length_path() {
        let long = "p".repeat(MAX_PATH_LEN);
        round_trip(Operation::Upload {
            path: long,
            size: 7,
            digest: hash_bytes(b"1234567"),
        });
    }

    #[test]
    fn upload_size_derived_from_total() {
        let op_ = Operation::Upload {
            path: "f".into(),
            size: 99,
            digest: hash_bytes(b"x"),
        };
        let frame = encode_frame(&op_);
        let declared = u64::from_be_bytes(frame[0..8].try_into().unwrap());
        assert_eq!(declared, (4 + 32 + 1 + 99) as u64);
    }

    #[test]
    fn eof_at_header_is_clean_end() {
        let mut cur = Cursor::new(Vec::<u8>::new());
        assert!(read_operation(&mut cur).unwrap().is_none());
    }

    #[test]
    fn eof_mid_frame_is_clean_end() {
        let frame = encode_frame(&Operation::Delete {
            path: "some/file".into(),
        });
        // Cut the frame in the middle of the path bytes
        let mut cur = Cursor::new(frame[..frame.len() - 3].to_vec());
        assert!(read_operation(&mut cur).unwrap().is_none());
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut frame = vec![0u8; 9];
        frame[8] = b'Z';
        let mut cur = Cursor::new(frame);
        assert!(read_operation(&mut cur).is_err());
    }

    #[test]
    fn oversized_path_length_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&0u64.to_be_bytes());
        frame.push(op::DELETE);
        frame.extend_from_slice(&(u32::MAX).to_be_bytes());
        let mut cur = Cursor::new(frame);
        assert!(read_operation(&mut cur).is_err());
    }
}
