use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use layerfs_io::{
    BytesReader, FeatureFlags, FileHandle, FsError, FsErrorKind, FsResult, MemHandle, OpenMode,
    ReadStream, Stream,
};

use crate::backend::{Backend, FileType, Stat, Visit};
use crate::path;

/// A read-only backend over a fixed set of in-memory files.
///
/// Directories exist implicitly as the parents of inserted files.
#[derive(Debug, Clone, Default)]
pub struct MemBackend {
    files: BTreeMap<String, Bytes>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    ///
    /// A file cannot share its path with a directory, so inserting below an
    /// existing file is `NotADirectory` and inserting over a directory is
    /// `IsADirectory`.
    pub fn insert(&mut self, path: &str, data: impl Into<Bytes>) -> FsResult<()> {
        let key = path::rooted(path)?;
        if key == "/" || self.is_dir(&key) {
            return Err(FsError::new(FsErrorKind::IsADirectory, "mem.insert"));
        }
        let crosses_file = key
            .match_indices('/')
            .skip(1)
            .any(|(end, _)| self.files.contains_key(&key[..end]));
        if crosses_file {
            return Err(FsError::new(FsErrorKind::NotADirectory, "mem.insert"));
        }
        self.files.insert(key, data.into());
        Ok(())
    }

    pub fn with_file(mut self, path: &str, data: impl Into<Bytes>) -> FsResult<Self> {
        self.insert(path, data)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn file(&self, path: &str) -> FsResult<&Bytes> {
        let key = path::rooted(path)?;
        if let Some(data) = self.files.get(&key) {
            if path::has_trailing_separator(path) {
                return Err(FsError::new(FsErrorKind::NotADirectory, "mem.open"));
            }
            return Ok(data);
        }
        if self.is_dir(&key) {
            return Err(FsError::new(FsErrorKind::IsADirectory, "mem.open"));
        }
        Err(FsError::not_found("mem.open"))
    }

    fn is_dir(&self, key: &str) -> bool {
        let prefix = dir_prefix(key);
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(name, _)| name.starts_with(&prefix))
    }
}

fn dir_prefix(key: &str) -> String {
    if key == "/" {
        key.to_owned()
    } else {
        format!("{key}/")
    }
}

impl Backend for MemBackend {
    fn open_handle(
        &self,
        path: &str,
        mode: OpenMode,
        _flags: FeatureFlags,
    ) -> FsResult<Box<dyn FileHandle>> {
        if mode != OpenMode::Read {
            return Err(FsError::unsupported("mem.open_handle.write"));
        }
        Ok(Box::new(MemHandle::new(self.file(path)?.clone())))
    }

    fn open_stream(&self, path: &str, mode: OpenMode, flags: FeatureFlags) -> FsResult<Stream> {
        if mode != OpenMode::Read {
            return Err(FsError::unsupported("mem.open_stream.write"));
        }
        let reader = BytesReader::new(self.file(path)?.clone());
        Ok(ReadStream::new(Box::new(reader), flags.failure_mode()).into())
    }

    fn list_dir(&self, path: &str, visit: &mut Visit<'_>) -> FsResult<()> {
        let key = path::rooted(path)?;
        if self.files.contains_key(&key) {
            return Err(FsError::new(FsErrorKind::NotADirectory, "mem.list_dir"));
        }
        if !self.is_dir(&key) {
            return Err(FsError::not_found("mem.list_dir"));
        }

        let prefix = dir_prefix(&key);
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for name in self.files.range(prefix.clone()..).map(|(name, _)| name) {
            let Some(rest) = name.strip_prefix(prefix.as_str()) else {
                break;
            };
            let (entry, file_type) = match rest.split_once('/') {
                Some((dir, _)) => (dir, FileType::Directory),
                None => (rest, FileType::File),
            };
            if !seen.insert(entry) {
                continue;
            }
            if visit(entry, file_type).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> FsResult<Stat> {
        let key = path::rooted(path)?;
        if let Some(data) = self.files.get(&key) {
            return Ok(Stat::file(data.len() as u64));
        }
        if self.is_dir(&key) {
            return Ok(Stat::directory());
        }
        Err(FsError::not_found("mem.stat"))
    }
}
