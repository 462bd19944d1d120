use std::path::Path;

use tracing::debug;

use crate::config::StreamConfig;
use crate::error::{FsError, FsResult};
use crate::handle::{FileHandle, NativeFile};
use crate::mmio::{MmioHandle, MmioMode};
use crate::mode::{FeatureFlags, OpenMode};
use crate::sources::{HandleReader, HandleWriter, MmioReader};
use crate::stream::{ReadStream, Stream, WriteStream};

/// Opens a native file as a stream.
///
/// A `Write` open truncates as its last fallible step, so an open that fails
/// never leaves the file emptied.
pub fn open_native_stream(
    path: &Path,
    mode: OpenMode,
    flags: FeatureFlags,
    config: &StreamConfig,
) -> FsResult<Stream> {
    debug!(path = %path.display(), ?mode, ?flags, "stream.open");
    match mode {
        OpenMode::Read => {
            let file = NativeFile::open(path, mode, flags)?;
            let reader = HandleReader::new(Box::new(file), config.chunk_for(flags))?
                .nonblocking(flags.contains(FeatureFlags::NONBLOCKING));
            Ok(ReadStream::new(Box::new(reader), config.failure_mode_for(flags)).into())
        }
        OpenMode::Write => {
            let file = NativeFile::open_for_truncate(path)?;
            file.set_len(0)?;
            Ok(WriteStream::new(Box::new(HandleWriter::new(Box::new(file)))).into())
        }
        OpenMode::Append => {
            let file = NativeFile::open(path, mode, flags)?;
            Ok(WriteStream::new(Box::new(HandleWriter::new(Box::new(file)))).into())
        }
        OpenMode::ReadWrite => Err(FsError::unsupported("stream.open.read_write")),
    }
}

/// Opens a native file as a stream that walks mapped windows instead of
/// copying into a buffer.
pub fn open_mapped_stream(
    path: &Path,
    flags: FeatureFlags,
    config: &StreamConfig,
) -> FsResult<ReadStream> {
    let mmio = MmioHandle::open(path, MmioMode::Read)?;
    let reader = MmioReader::new(mmio, config.mmap_window);
    Ok(ReadStream::new(
        Box::new(reader),
        config.failure_mode_for(flags),
    ))
}
