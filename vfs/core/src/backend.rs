use std::fmt;
use std::io::Read;
use std::ops::ControlFlow;

use layerfs_io::{
    FeatureFlags, FileHandle, FsError, FsErrorKind, FsResult, MmioHandle, MmioMode, OpenMode,
    Stream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileType {
    File,
    Directory,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub file_type: FileType,
    pub size: u64,
}

impl Stat {
    pub fn file(size: u64) -> Self {
        Self {
            file_type: FileType::File,
            size,
        }
    }

    pub fn directory() -> Self {
        Self {
            file_type: FileType::Directory,
            size: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }
}

/// Listing callback: called once per entry, `Break` stops the enumeration.
pub type Visit<'a> = dyn FnMut(&str, FileType) -> ControlFlow<()> + 'a;

/// A source of files addressed by `/`-separated paths.
///
/// Every capability is optional. A backend that does not provide one keeps
/// the default, which fails with `Unsupported`; resolution then moves on to
/// the next candidate.
pub trait Backend: fmt::Debug + Send + Sync {
    fn open_handle(
        &self,
        _path: &str,
        _mode: OpenMode,
        _flags: FeatureFlags,
    ) -> FsResult<Box<dyn FileHandle>> {
        Err(FsError::unsupported("backend.open_handle"))
    }

    fn open_mmio(&self, _path: &str, _mode: MmioMode) -> FsResult<MmioHandle> {
        Err(FsError::unsupported("backend.open_mmio"))
    }

    fn open_stream(&self, _path: &str, _mode: OpenMode, _flags: FeatureFlags) -> FsResult<Stream> {
        Err(FsError::unsupported("backend.open_stream"))
    }

    fn list_dir(&self, _path: &str, _visit: &mut Visit<'_>) -> FsResult<()> {
        Err(FsError::unsupported("backend.list_dir"))
    }

    fn stat(&self, _path: &str) -> FsResult<Stat> {
        Err(FsError::unsupported("backend.stat"))
    }
}

/// Conveniences built only on the [`Backend`] capabilities.
pub trait BackendExt: Backend {
    /// Reads a whole file through a read stream.
    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let mut stream = self
            .open_stream(path, OpenMode::Read, FeatureFlags::SEQUENTIAL)?
            .into_reader()?;
        let mut out = Vec::new();
        stream
            .read_to_end(&mut out)
            .map_err(|err| FsError::io("backend.read_file", err))?;
        stream.close()?;
        Ok(out)
    }

    /// Collects a listing into a vector, in the order the backend yields it.
    fn read_dir(&self, path: &str) -> FsResult<Vec<(String, FileType)>> {
        let mut entries = Vec::new();
        self.list_dir(path, &mut |name, file_type| {
            entries.push((name.to_owned(), file_type));
            ControlFlow::Continue(())
        })?;
        Ok(entries)
    }

    /// `Ok(false)` for `NotFound`; other failures are passed through.
    fn exists(&self, path: &str) -> FsResult<bool> {
        match self.stat(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == FsErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl<B: Backend + ?Sized> BackendExt for B {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Nothing;

    impl Backend for Nothing {}

    #[test]
    fn capabilities_default_to_unsupported() {
        let backend = Nothing;
        let kind = |err: FsError| err.kind();

        assert_eq!(
            backend.stat("/a").map_err(kind),
            Err(FsErrorKind::Unsupported)
        );
        assert_eq!(
            backend
                .open_handle("/a", OpenMode::Read, FeatureFlags::empty())
                .map(|_| ())
                .map_err(kind),
            Err(FsErrorKind::Unsupported)
        );
        assert_eq!(
            backend.read_dir("/").map_err(kind),
            Err(FsErrorKind::Unsupported)
        );
        assert_eq!(backend.exists("/a").map_err(kind), Err(FsErrorKind::Unsupported));
    }
}
