//! Backend-independent content hash.
//!
//! Content is split into fixed [`CONTENT_HASH_CHUNK_SIZE`] chunks, each chunk
//! is hashed with SHA-256, and the final hash is SHA-256 over the
//! concatenated chunk digests, rendered as lowercase hex. Any backend that
//! precomputes a hash must use the same scheme so hashes compare across
//! backends.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

/// Chunk size for [`content_hash`]: 4 MiB.
pub const CONTENT_HASH_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Hash everything `reader` yields.
pub fn content_hash(mut reader: impl Read) -> io::Result<String> {
    let mut outer = Sha256::new();
    let mut chunk = vec![0u8; CONTENT_HASH_CHUNK_SIZE];

    loop {
        let filled = fill_chunk(&mut reader, &mut chunk)?;
        if filled == 0 {
            break;
        }
        outer.update(Sha256::digest(&chunk[..filled]));
        if filled < chunk.len() {
            break;
        }
    }

    Ok(hex::encode(outer.finalize()))
}

/// Hash an in-memory byte slice.
pub fn content_hash_bytes(data: &[u8]) -> String {
    let mut outer = Sha256::new();
    for chunk in data.chunks(CONTENT_HASH_CHUNK_SIZE) {
        outer.update(Sha256::digest(chunk));
    }
    hex::encode(outer.finalize())
}

/// Read until `buf` is full or the reader is exhausted.
fn fill_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
