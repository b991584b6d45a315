//! Byte buffers with cursor-based random access.
//!
//! Backends whose native API is "fetch whole object / replace whole object"
//! hand these out from `open_reader`, `open_writer` and `open_read_writer`
//! to get `Read`/`Write`/`Seek` semantics.
//!
//! A buffer is owned by exactly one handle. Dropping an unclosed buffer
//! closes it; a write-back failure at that point can only be logged, so call
//! `close` explicitly when the result matters.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::backend::{FileReadWriter, FileReader, FileWriter};
use crate::error::FsResult;

type OnClose = Box<dyn FnOnce() -> FsResult<()> + Send>;
type WriteBack = Box<dyn FnMut(&[u8]) -> FsResult<()> + Send>;
type Fetch = Box<dyn FnMut() -> FsResult<Vec<u8>> + Send>;

/// Resolve a seek against the current position and data length.
fn seek_position(current: u64, len: u64, pos: SeekFrom) -> io::Result<u64> {
    let (base, offset) = match pos {
        SeekFrom::Start(n) => return Ok(n),
        SeekFrom::Current(offset) => (current, offset),
        SeekFrom::End(offset) => (len, offset),
    };
    base.checked_add_signed(offset).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

/// Copy from `data[offset..]` into `buf`. Returns 0 at or past the end.
fn read_from(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

/// Write `src` at `offset`, growing `data` and zero-filling any gap.
fn write_into(data: &mut Vec<u8>, offset: u64, src: &[u8]) -> io::Result<usize> {
    let start = usize::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
    let end = start
        .checked_add(src.len())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
    if end > data.len() {
        data.resize(end, 0);
    }
    data[start..end].copy_from_slice(src);
    Ok(src.len())
}

fn closed_error() -> io::Error {
    io::Error::other("buffer is closed")
}

// ============================================================================
// ReadonlyBuffer
// ============================================================================

/// Read-only view over a byte sequence.
pub struct ReadonlyBuffer {
    data: Vec<u8>,
    pos: u64,
    on_close: Option<OnClose>,
}

impl ReadonlyBuffer {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            on_close: None,
        }
    }

    /// Run `on_close` exactly once when the buffer is closed or dropped.
    pub fn with_on_close(
        data: impl Into<Vec<u8>>,
        on_close: impl FnOnce() -> FsResult<()> + Send + 'static,
    ) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Read at `offset` without moving the cursor.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        read_from(&self.data, offset, buf)
    }

    pub fn close(&mut self) -> FsResult<()> {
        match self.on_close.take() {
            Some(on_close) => on_close(),
            None => Ok(()),
        }
    }
}

impl Read for ReadonlyBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_from(&self.data, self.pos, buf);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ReadonlyBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = seek_position(self.pos, self.data.len() as u64, pos)?;
        Ok(self.pos)
    }
}

impl FileReader for ReadonlyBuffer {
    fn close(&mut self) -> FsResult<()> {
        ReadonlyBuffer::close(self)
    }
}

impl Drop for ReadonlyBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "close callback failed while dropping buffer");
        }
    }
}

impl std::fmt::Debug for ReadonlyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadonlyBuffer")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .finish()
    }
}

// ============================================================================
// FileBuffer
// ============================================================================

/// Mutable byte buffer. Writes past the end grow it; it never runs out of
/// space.
pub struct FileBuffer {
    data: Vec<u8>,
    pos: u64,
    dirty: bool,
    closed: bool,
    write_back: Option<WriteBack>,
}

impl Default for FileBuffer {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FileBuffer {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            dirty: false,
            closed: false,
            write_back: None,
        }
    }

    /// Hand the full content to `write_back` on close if anything was written.
    pub fn with_write_back(
        data: impl Into<Vec<u8>>,
        write_back: impl FnMut(&[u8]) -> FsResult<()> + Send + 'static,
    ) -> Self {
        let mut buf = Self::new(data);
        buf.write_back = Some(Box::new(write_back));
        buf
    }

    /// Move the cursor to the end, for append writers.
    pub fn at_end(mut self) -> Self {
        self.pos = self.data.len() as u64;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        // Taking the data defuses the write-back in Drop.
        self.closed = true;
        std::mem::take(&mut self.data)
    }

    /// True if written to since creation (or the last write-back).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read at `offset` without moving the cursor.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        read_from(&self.data, offset, buf)
    }

    /// Write at `offset` without moving the cursor.
    pub fn write_at(&mut self, src: &[u8], offset: u64) -> io::Result<usize> {
        if self.closed {
            return Err(closed_error());
        }
        let n = write_into(&mut self.data, offset, src)?;
        self.dirty = true;
        Ok(n)
    }

    /// Shrink or zero-pad to `size`.
    pub fn truncate(&mut self, size: usize) {
        if size != self.data.len() {
            self.data.resize(size, 0);
            self.dirty = true;
        }
    }

    /// Write back (if dirty) and release. Idempotent.
    pub fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.dirty {
            self.dirty = false;
            if let Some(write_back) = self.write_back.as_mut() {
                write_back(&self.data)?;
            }
        }
        Ok(())
    }
}

impl Read for FileBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_from(&self.data, self.pos, buf);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for FileBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.write_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = seek_position(self.pos, self.data.len() as u64, pos)?;
        Ok(self.pos)
    }
}

impl FileReader for FileBuffer {
    fn close(&mut self) -> FsResult<()> {
        FileBuffer::close(self)
    }
}

impl FileWriter for FileBuffer {
    fn close(&mut self) -> FsResult<()> {
        FileBuffer::close(self)
    }
}

impl FileReadWriter for FileBuffer {
    fn close(&mut self) -> FsResult<()> {
        FileBuffer::close(self)
    }
}

impl Drop for FileBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "write-back failed while dropping buffer");
        }
    }
}

impl std::fmt::Debug for FileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBuffer")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .field("dirty", &self.dirty)
            .field("closed", &self.closed)
            .finish()
    }
}

// ============================================================================
// ReadWriteAllBuffer
// ============================================================================

/// Random access over a backend that can only fetch or replace whole content.
///
/// The content is fetched once, on the first read, write or end-relative
/// seek. Everything after that works on the in-memory copy. On close the
/// content is written back through `write_back` only if a write happened.
pub struct ReadWriteAllBuffer {
    fetch: Fetch,
    write_back: WriteBack,
    content: Option<Vec<u8>>,
    pos: u64,
    dirty: bool,
    closed: bool,
}

impl ReadWriteAllBuffer {
    pub fn new(
        fetch: impl FnMut() -> FsResult<Vec<u8>> + Send + 'static,
        write_back: impl FnMut(&[u8]) -> FsResult<()> + Send + 'static,
    ) -> Self {
        Self {
            fetch: Box::new(fetch),
            write_back: Box::new(write_back),
            content: None,
            pos: 0,
            dirty: false,
            closed: false,
        }
    }

    fn content(&mut self) -> FsResult<&mut Vec<u8>> {
        if self.content.is_none() {
            let data = (self.fetch)()?;
            self.content = Some(data);
        }
        Ok(self.content.get_or_insert_with(Vec::new))
    }

    /// True once the content has been fetched.
    pub fn is_loaded(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Drop the cached copy so the next access fetches again.
    ///
    /// Unsaved writes are discarded.
    pub fn invalidate(&mut self) {
        self.content = None;
        self.dirty = false;
    }

    /// Read at `offset` without moving the cursor.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let data = self.content()?;
        Ok(read_from(data, offset, buf))
    }

    /// Write at `offset` without moving the cursor.
    pub fn write_at(&mut self, src: &[u8], offset: u64) -> FsResult<usize> {
        if self.closed {
            return Err(closed_error().into());
        }
        let data = self.content()?;
        let n = write_into(data, offset, src)?;
        self.dirty = true;
        Ok(n)
    }

    /// Write back (if written) and release. Idempotent.
    pub fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.dirty {
            self.dirty = false;
            if let Some(content) = self.content.as_deref() {
                (self.write_back)(content)?;
            }
        }
        Ok(())
    }
}

impl Read for ReadWriteAllBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.pos;
        let data = self.content()?;
        let n = read_from(data, pos, buf);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for ReadWriteAllBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.write_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ReadWriteAllBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = match pos {
            SeekFrom::End(_) => self.content()?.len() as u64,
            _ => 0,
        };
        self.pos = seek_position(self.pos, len, pos)?;
        Ok(self.pos)
    }
}

impl FileReader for ReadWriteAllBuffer {
    fn close(&mut self) -> FsResult<()> {
        ReadWriteAllBuffer::close(self)
    }
}

impl FileReadWriter for ReadWriteAllBuffer {
    fn close(&mut self) -> FsResult<()> {
        ReadWriteAllBuffer::close(self)
    }
}

impl Drop for ReadWriteAllBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "write-back failed while dropping buffer");
        }
    }
}

impl std::fmt::Debug for ReadWriteAllBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriteAllBuffer")
            .field("loaded", &self.content.is_some())
            .field("pos", &self.pos)
            .field("dirty", &self.dirty)
            .field("closed", &self.closed)
            .finish()
    }
}
