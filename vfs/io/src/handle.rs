use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use tracing::trace;

use crate::error::{FsError, FsErrorKind, FsResult, io_result};
use crate::mode::{FeatureFlags, OpenMode};

/// Random-access file handle.
pub trait FileHandle: fmt::Debug + Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize>;

    fn write_at(&self, _offset: u64, _buf: &[u8]) -> FsResult<usize> {
        Err(FsError::unsupported("handle.write_at"))
    }

    fn len(&self) -> FsResult<u64>;

    fn is_empty(&self) -> FsResult<bool> {
        Ok(self.len()? == 0)
    }

    fn set_len(&self, _len: u64) -> FsResult<()> {
        Err(FsError::unsupported("handle.set_len"))
    }

    fn flush(&self) -> FsResult<()> {
        Ok(())
    }

    /// Reads until `buf` is full; running out of file is `InvalidData`.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> FsResult<()> {
        while !buf.is_empty() {
            let amount = self.read_at(offset, buf)?;
            if amount == 0 {
                return Err(FsError::new(
                    FsErrorKind::InvalidData,
                    "handle.read_exact_at",
                ));
            }
            offset += amount as u64;
            buf = &mut buf[amount..];
        }
        Ok(())
    }
}

/// A handle over a native OS file.
#[derive(Debug)]
pub struct NativeFile {
    file: File,
    mode: OpenMode,
}

impl NativeFile {
    pub fn open(path: &Path, mode: OpenMode, flags: FeatureFlags) -> FsResult<Self> {
        trace!(path = %path.display(), ?mode, ?flags, "native.open");
        let file = io_result("native.open", mode.std_options().open(path))?;
        let meta = io_result("native.open.metadata", file.metadata())?;
        if meta.is_dir() {
            return Err(FsError::new(FsErrorKind::IsADirectory, "native.open"));
        }
        Ok(Self { file, mode })
    }

    /// Opens `path` for writing without truncating it yet. The caller
    /// finishes the `Write` open with `set_len(0)` once it is ready.
    pub fn open_for_truncate(path: &Path) -> FsResult<Self> {
        let file = io_result(
            "native.open",
            std::fs::OpenOptions::new().write(true).create(true).open(path),
        )?;
        Ok(Self {
            file,
            mode: OpenMode::Write,
        })
    }

    pub fn from_file(file: File, mode: OpenMode) -> Self {
        Self { file, mode }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl FileHandle for NativeFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        if !self.mode.reads() {
            return Err(FsError::unsupported("native.read_at"));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            io_result("native.read_at", self.file.read_at(buf, offset))
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            io_result("native.read_at", self.file.seek_read(buf, offset))
        }
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> FsResult<usize> {
        match self.mode {
            OpenMode::Read => Err(FsError::unsupported("native.write_at")),
            OpenMode::Append => io_result("native.append", (&self.file).write(buf)),
            OpenMode::Write | OpenMode::ReadWrite => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::FileExt;
                    io_result("native.write_at", self.file.write_at(buf, offset))
                }
                #[cfg(windows)]
                {
                    use std::os::windows::fs::FileExt;
                    io_result("native.write_at", self.file.seek_write(buf, offset))
                }
            }
        }
    }

    fn len(&self) -> FsResult<u64> {
        let meta = io_result("native.len", self.file.metadata())?;
        Ok(meta.len())
    }

    fn set_len(&self, len: u64) -> FsResult<()> {
        if !self.mode.writes() {
            return Err(FsError::unsupported("native.set_len"));
        }
        io_result("native.set_len", self.file.set_len(len))
    }

    fn flush(&self) -> FsResult<()> {
        if !self.mode.writes() {
            return Ok(());
        }
        io_result("native.flush", self.file.sync_data())
    }
}

/// A read-only handle over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemHandle {
    data: Bytes,
}

impl MemHandle {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl FileHandle for MemHandle {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let amount = buf.len().min(self.data.len() - start);
        buf[..amount].copy_from_slice(&self.data[start..start + amount]);
        Ok(amount)
    }

    fn len(&self) -> FsResult<u64> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn native_file_random_access() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");

        let file = NativeFile::open(&path, OpenMode::ReadWrite, FeatureFlags::empty()).unwrap();
        assert_eq!(file.write_at(4, b"tail").unwrap(), 4);
        assert_eq!(file.write_at(0, b"head").unwrap(), 4);
        assert_eq!(file.len().unwrap(), 8);

        let mut buf = [0u8; 4];
        file.read_exact_at(4, &mut buf).unwrap();
        assert_eq!(&buf, b"tail");
        assert_eq!(
            file.read_exact_at(6, &mut buf).unwrap_err().kind(),
            FsErrorKind::InvalidData
        );
    }

    #[test]
    fn read_only_handles_refuse_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ro.txt");
        std::fs::write(&path, b"abc").unwrap();

        let file = NativeFile::open(&path, OpenMode::Read, FeatureFlags::empty()).unwrap();
        assert_eq!(
            file.write_at(0, b"x").unwrap_err().kind(),
            FsErrorKind::Unsupported
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn opening_missing_file_for_read_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = NativeFile::open(
            &temp.path().join("nope"),
            OpenMode::Read,
            FeatureFlags::empty(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::NotFound);
    }

    #[test]
    fn append_mode_ignores_offset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        std::fs::write(&path, b"one").unwrap();

        let file = NativeFile::open(&path, OpenMode::Append, FeatureFlags::empty()).unwrap();
        file.write_at(0, b"two").unwrap();
        drop(file);
        assert_eq!(std::fs::read(&path).unwrap(), b"onetwo");
    }

    #[test]
    fn mem_handle_reads_past_end_as_zero() {
        let handle = MemHandle::new(&b"12345"[..]);
        let mut buf = [0u8; 8];
        assert_eq!(handle.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"45");
        assert_eq!(handle.read_at(9, &mut buf).unwrap(), 0);
        assert_eq!(
            handle.write_at(0, b"x").unwrap_err().kind(),
            FsErrorKind::Unsupported
        );
    }
}
