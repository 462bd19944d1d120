//! Stream sources and sinks over handles, mappings and memory.

use std::fmt;

use bytes::Bytes;

use crate::error::{FsError, FsErrorKind, FsResult};
use crate::handle::FileHandle;
use crate::mmio::MmioHandle;
use crate::stream::{Fill, ReadSource, WriteSink};

/// Reads a [`FileHandle`] front to back in fixed-size chunks.
pub struct HandleReader {
    handle: Box<dyn FileHandle>,
    buf: Vec<u8>,
    filled: usize,
    offset: u64,
    nonblocking: bool,
}

impl HandleReader {
    /// Fails with `NoMemory` when the chunk buffer cannot be allocated.
    pub fn new(handle: Box<dyn FileHandle>, chunk_size: usize) -> FsResult<Self> {
        let buf = alloc_buffer(chunk_size.max(1))?;
        Ok(Self {
            handle,
            buf,
            filled: 0,
            offset: 0,
            nonblocking: false,
        })
    }

    /// Treat a zero-length read as "nothing yet" instead of end of input,
    /// as long as the handle reports more bytes than were consumed.
    pub fn nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl fmt::Debug for HandleReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleReader")
            .field("handle", &self.handle)
            .field("chunk", &self.buf.len())
            .field("offset", &self.offset)
            .finish()
    }
}

impl ReadSource for HandleReader {
    fn fill(&mut self) -> FsResult<Fill> {
        self.filled = 0;
        let amount = self.handle.read_at(self.offset, &mut self.buf)?;
        if amount == 0 {
            if self.nonblocking && self.handle.len()? > self.offset {
                return Ok(Fill::Pending);
            }
            return Ok(Fill::Eof);
        }
        self.filled = amount;
        self.offset += amount as u64;
        Ok(Fill::Ready)
    }

    fn window(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    fn close(self: Box<Self>) -> FsResult<()> {
        self.handle.flush()
    }
}

/// Walks a file through successive mapped windows without copying.
#[derive(Debug)]
pub struct MmioReader {
    mmio: MmioHandle,
    next: u64,
    window_size: usize,
}

impl MmioReader {
    pub fn new(mmio: MmioHandle, window_size: usize) -> Self {
        Self {
            mmio,
            next: 0,
            window_size: window_size.max(1),
        }
    }
}

impl ReadSource for MmioReader {
    fn fill(&mut self) -> FsResult<Fill> {
        if self.next >= self.mmio.file_size() {
            self.mmio.unmap();
            return Ok(Fill::Eof);
        }
        let len = self.mmio.remap(self.next, self.window_size)?.len();
        self.next += len as u64;
        Ok(Fill::Ready)
    }

    fn window(&self) -> &[u8] {
        self.mmio.window()
    }

    fn close(self: Box<Self>) -> FsResult<()> {
        self.mmio.close()
    }
}

/// Serves one in-memory buffer as a single window.
#[derive(Debug, Clone)]
pub struct BytesReader {
    data: Bytes,
    served: bool,
}

impl BytesReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            served: false,
        }
    }
}

impl ReadSource for BytesReader {
    fn fill(&mut self) -> FsResult<Fill> {
        if self.served || self.data.is_empty() {
            self.served = true;
            return Ok(Fill::Eof);
        }
        self.served = true;
        Ok(Fill::Ready)
    }

    fn window(&self) -> &[u8] {
        if self.served { &self.data[..] } else { &[] }
    }
}

/// Writes windows sequentially through a [`FileHandle`].
#[derive(Debug)]
pub struct HandleWriter {
    handle: Box<dyn FileHandle>,
    offset: u64,
}

impl HandleWriter {
    pub fn new(handle: Box<dyn FileHandle>) -> Self {
        Self { handle, offset: 0 }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

impl WriteSink for HandleWriter {
    fn write_window(&mut self, window: &[u8]) -> FsResult<usize> {
        let mut done = 0;
        while done < window.len() {
            let amount = self
                .handle
                .write_at(self.offset + done as u64, &window[done..])?;
            if amount == 0 {
                break;
            }
            done += amount;
        }
        self.offset += done as u64;
        Ok(done)
    }

    fn sync(&mut self) -> FsResult<()> {
        self.handle.flush()
    }

    fn close(self: Box<Self>) -> FsResult<()> {
        self.handle.flush()
    }
}

/// Allocates a zeroed buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_buffer(len: usize) -> FsResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| FsError::new(FsErrorKind::NoMemory, "stream.buffer"))?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::handle::MemHandle;
    use crate::mode::FailureMode;
    use crate::stream::{ReadStream, StreamStatus, WriteStream};

    #[test]
    fn handle_reader_chunks_the_file() {
        let handle = MemHandle::new(&b"0123456789"[..]);
        let reader = HandleReader::new(Box::new(handle), 4).unwrap();
        let mut stream = ReadStream::new(Box::new(reader), FailureMode::Empty);

        assert_eq!(stream.refill(), 4);
        assert_eq!(stream.buffer(), b"0123");
        assert_eq!(stream.refill(), 4);
        assert_eq!(stream.buffer(), b"4567");
        assert_eq!(stream.refill(), 2);
        assert_eq!(stream.buffer(), b"89");
        assert_eq!(stream.refill(), 0);
        assert_eq!(stream.status(), StreamStatus::Eof);
    }

    #[test]
    fn bytes_reader_serves_once() {
        let mut stream = ReadStream::new(
            Box::new(BytesReader::new(&b"payload"[..])),
            FailureMode::Empty,
        );
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(stream.refill(), 0);
    }

    #[test]
    fn empty_bytes_reader_hits_eof_immediately() {
        let mut stream =
            ReadStream::new(Box::new(BytesReader::new(Bytes::new())), FailureMode::Zeros);
        assert_eq!(stream.refill(), 0);
        assert_eq!(stream.status(), StreamStatus::Eof);
        assert!(stream.buffer().iter().all(|b| *b == 0));
    }

    #[test]
    fn handle_writer_against_read_only_handle_fails_cleanly() {
        let mut stream = WriteStream::new(Box::new(HandleWriter::new(Box::new(MemHandle::new(
            Bytes::new(),
        )))));
        assert_eq!(stream.flush_window(b"data"), 0);
        assert_eq!(
            stream.status(),
            StreamStatus::Failed(FsErrorKind::Unsupported)
        );
    }
}
