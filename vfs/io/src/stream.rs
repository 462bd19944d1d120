//! Buffer-centric streams.
//!
//! A stream exposes a window of bytes that it owns. Readers consume the window
//! and call [`ReadStream::refill`] for the next one; writers hand a window of
//! their own to [`WriteStream::flush_window`]. Once a stream fails or runs out
//! of input it closes its source and keeps answering with a well-defined
//! failure window, so code that checks [`ReadStream::status`] only occasionally
//! still terminates.

use std::fmt;
use std::io::{self, BufRead, Read, Write};

use tracing::{trace, warn};

use crate::error::{FsError, FsErrorKind, FsResult};
use crate::mode::FailureMode;

const ZEROS: [u8; 4096] = [0; 4096];

/// Outcome of asking a source for its next window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// A new window is available through [`ReadSource::window`].
    Ready,
    /// Nothing available right now; only returned by nonblocking sources.
    Pending,
    /// The source is exhausted.
    Eof,
}

/// Producer side of a [`ReadStream`].
pub trait ReadSource: fmt::Debug + Send {
    /// Replaces the current window with the next one.
    fn fill(&mut self) -> FsResult<Fill>;

    /// The window produced by the last successful [`ReadSource::fill`].
    fn window(&self) -> &[u8];

    /// Releases everything the source holds.
    fn close(self: Box<Self>) -> FsResult<()> {
        Ok(())
    }
}

/// Consumer side of a [`WriteStream`].
pub trait WriteSink: fmt::Debug + Send {
    /// Writes as much of `window` as possible and returns how much was taken.
    fn write_window(&mut self, window: &[u8]) -> FsResult<usize>;

    /// Pushes buffered data down to the storage layer.
    fn sync(&mut self) -> FsResult<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> FsResult<()> {
        Ok(())
    }
}

/// Sticky stream status. Once it leaves `Ok` it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Ok,
    Eof,
    Failed(FsErrorKind),
}

impl StreamStatus {
    pub fn is_ok(self) -> bool {
        self == StreamStatus::Ok
    }

    pub fn error(self) -> Option<FsErrorKind> {
        match self {
            StreamStatus::Failed(kind) => Some(kind),
            _ => None,
        }
    }
}

enum ReadState {
    Open(Box<dyn ReadSource>),
    Empty,
    Zeros,
}

impl fmt::Debug for ReadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadState::Open(source) => f.debug_tuple("Open").field(source).finish(),
            ReadState::Empty => f.write_str("Empty"),
            ReadState::Zeros => f.write_str("Zeros"),
        }
    }
}

/// A read-only stream over a [`ReadSource`].
///
/// `cursor` and `end` index into [`ReadStream::window`]; `begin` is always 0.
#[derive(Debug)]
pub struct ReadStream {
    state: ReadState,
    cursor: usize,
    end: usize,
    status: StreamStatus,
    failure_mode: FailureMode,
}

impl ReadStream {
    pub fn new(source: Box<dyn ReadSource>, failure_mode: FailureMode) -> Self {
        Self {
            state: ReadState::Open(source),
            cursor: 0,
            end: 0,
            status: StreamStatus::Ok,
            failure_mode,
        }
    }

    /// A stream that is already exhausted.
    pub fn empty() -> Self {
        Self::failed(FailureMode::Empty, StreamStatus::Eof)
    }

    /// A stream that produces zero bytes forever.
    pub fn zeros() -> Self {
        Self::failed(FailureMode::Zeros, StreamStatus::Eof)
    }

    fn failed(failure_mode: FailureMode, status: StreamStatus) -> Self {
        let mut stream = Self {
            state: ReadState::Empty,
            cursor: 0,
            end: 0,
            status,
            failure_mode,
        };
        stream.enter_failure_state();
        stream
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ReadState::Open(_))
    }

    /// The whole current window, `[begin, end)`.
    pub fn window(&self) -> &[u8] {
        match &self.state {
            ReadState::Open(source) => &source.window()[..self.end],
            ReadState::Empty => &[],
            ReadState::Zeros => &ZEROS[..self.end],
        }
    }

    /// The unread part of the window, `[cursor, end)`.
    pub fn buffer(&self) -> &[u8] {
        &self.window()[self.cursor..]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Marks `amount` bytes of the window as read. Clamped to the window end.
    pub fn consume(&mut self, amount: usize) {
        self.cursor = self.cursor.saturating_add(amount).min(self.end);
    }

    /// Replaces the window with the next one from the source.
    ///
    /// Returns how many new bytes of input became available. A return of 0
    /// means the source is pending, exhausted, or failed; [`Self::status`]
    /// tells which. In a failure state this is a no-op that re-establishes
    /// the failure window.
    pub fn refill(&mut self) -> usize {
        let outcome = match &mut self.state {
            ReadState::Open(source) => source.fill().map(|fill| (fill, source.window().len())),
            ReadState::Empty | ReadState::Zeros => {
                self.enter_failure_state();
                return 0;
            }
        };

        match outcome {
            Ok((Fill::Ready, len)) => {
                self.cursor = 0;
                self.end = len;
                trace!(len, "stream.refill");
                len
            }
            Ok((Fill::Pending, _)) => {
                self.cursor = 0;
                self.end = 0;
                0
            }
            Ok((Fill::Eof, _)) => {
                self.fail(StreamStatus::Eof);
                0
            }
            Err(err) => {
                warn!(error = %err, "stream.refill failed");
                self.fail(StreamStatus::Failed(err.kind()));
                0
            }
        }
    }

    /// Closes the source and switches to the configured failure state.
    fn fail(&mut self, status: StreamStatus) {
        if self.status.is_ok() {
            self.status = status;
        }
        let state = std::mem::replace(&mut self.state, ReadState::Empty);
        if let ReadState::Open(source) = state {
            if let Err(err) = source.close() {
                warn!(error = %err, "stream.close during failure transition");
                if self.status == StreamStatus::Eof {
                    self.status = StreamStatus::Failed(err.kind());
                }
            }
        }
        self.enter_failure_state();
    }

    fn enter_failure_state(&mut self) {
        self.cursor = 0;
        match self.failure_mode {
            FailureMode::Empty => {
                self.state = ReadState::Empty;
                self.end = 0;
            }
            FailureMode::Zeros => {
                self.state = ReadState::Zeros;
                self.end = ZEROS.len();
            }
        }
    }

    /// Releases the source. The stream cannot be used afterwards.
    pub fn close(mut self) -> FsResult<()> {
        let state = std::mem::replace(&mut self.state, ReadState::Empty);
        match state {
            ReadState::Open(source) => source.close(),
            ReadState::Empty | ReadState::Zeros => Ok(()),
        }
    }
}

impl Drop for ReadStream {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut self.state, ReadState::Empty);
        if let ReadState::Open(source) = state {
            if let Err(err) = source.close() {
                warn!(error = %err, "stream.drop close failed");
            }
        }
    }
}

impl BufRead for ReadStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.cursor == self.end {
            if self.is_open() {
                self.refill();
            } else if self.failure_mode == FailureMode::Zeros {
                self.enter_failure_state();
            }
            if self.cursor == self.end {
                match self.status {
                    StreamStatus::Ok => return Err(io::ErrorKind::WouldBlock.into()),
                    StreamStatus::Failed(kind) => {
                        return Err(FsError::new(kind, "stream.fill_buf").into());
                    }
                    StreamStatus::Eof => {}
                }
            }
        }
        Ok(self.buffer())
    }

    fn consume(&mut self, amt: usize) {
        ReadStream::consume(self, amt);
    }
}

impl Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let amount = available.len().min(buf.len());
        buf[..amount].copy_from_slice(&available[..amount]);
        ReadStream::consume(self, amount);
        Ok(amount)
    }
}

/// A write-only stream over a [`WriteSink`].
#[derive(Debug)]
pub struct WriteStream {
    sink: Option<Box<dyn WriteSink>>,
    status: StreamStatus,
    written: u64,
}

impl WriteStream {
    pub fn new(sink: Box<dyn WriteSink>) -> Self {
        Self {
            sink: Some(sink),
            status: StreamStatus::Ok,
            written: 0,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Total bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Writes the caller's window in full.
    ///
    /// Returns the number of bytes written: `window.len()` on success and 0
    /// once the stream has failed. A short write fails the stream.
    pub fn flush_window(&mut self, window: &[u8]) -> usize {
        let Some(sink) = self.sink.as_mut() else {
            return 0;
        };
        match sink.write_window(window) {
            Ok(amount) if amount == window.len() => {
                self.written += amount as u64;
                amount
            }
            Ok(amount) => {
                warn!(amount, expected = window.len(), "stream.flush_window short write");
                self.fail(FsErrorKind::Io);
                0
            }
            Err(err) => {
                warn!(error = %err, "stream.flush_window failed");
                self.fail(err.kind());
                0
            }
        }
    }

    fn fail(&mut self, kind: FsErrorKind) {
        if self.status.is_ok() {
            self.status = StreamStatus::Failed(kind);
        }
        if let Some(sink) = self.sink.take() {
            if let Err(err) = sink.close() {
                warn!(error = %err, "stream.close during failure transition");
            }
        }
    }

    pub fn sync(&mut self) -> FsResult<()> {
        match (self.sink.as_mut(), self.status) {
            (Some(sink), _) => sink.sync(),
            (None, StreamStatus::Failed(kind)) => Err(FsError::new(kind, "stream.sync")),
            (None, _) => Ok(()),
        }
    }

    /// Flushes and releases the sink. Reports the sticky error if the stream
    /// failed earlier.
    pub fn close(mut self) -> FsResult<()> {
        let sink = self.sink.take();
        if let StreamStatus::Failed(kind) = self.status {
            return Err(FsError::new(kind, "stream.close"));
        }
        match sink {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }
}

impl Drop for WriteStream {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(err) = sink.close() {
                warn!(error = %err, "stream.drop close failed");
            }
        }
    }
}

impl Write for WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.flush_window(buf) {
            0 => Err(FsError::new(
                self.status.error().unwrap_or(FsErrorKind::Io),
                "stream.write",
            )
            .into()),
            amount => Ok(amount),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync().map_err(Into::into)
    }
}

/// A stream as handed out by a backend; its direction is fixed when opened.
#[derive(Debug)]
pub enum Stream {
    Reader(ReadStream),
    Writer(WriteStream),
}

impl Stream {
    pub fn into_reader(self) -> FsResult<ReadStream> {
        match self {
            Stream::Reader(reader) => Ok(reader),
            Stream::Writer(_) => Err(FsError::unsupported("stream.into_reader")),
        }
    }

    pub fn into_writer(self) -> FsResult<WriteStream> {
        match self {
            Stream::Writer(writer) => Ok(writer),
            Stream::Reader(_) => Err(FsError::unsupported("stream.into_writer")),
        }
    }

    pub fn status(&self) -> StreamStatus {
        match self {
            Stream::Reader(reader) => reader.status(),
            Stream::Writer(writer) => writer.status(),
        }
    }

    pub fn close(self) -> FsResult<()> {
        match self {
            Stream::Reader(reader) => reader.close(),
            Stream::Writer(writer) => writer.close(),
        }
    }
}

impl From<ReadStream> for Stream {
    fn from(reader: ReadStream) -> Self {
        Stream::Reader(reader)
    }
}

impl From<WriteStream> for Stream {
    fn from(writer: WriteStream) -> Self {
        Stream::Writer(writer)
    }
}
