use std::fs;
use std::path::PathBuf;

use layerfs_core::{Backend, FileType, Stat, Visit, path};
use layerfs_io::{
    FeatureFlags, FileHandle, FsError, FsErrorKind, FsResult, MmioHandle, MmioMode, NativeFile,
    OpenMode, Stream, open_mapped_stream, open_native_stream,
};
use tracing::{debug, trace};

use crate::config::HostConfig;
use crate::{io_result, read_only_error};

/// Serves files from a host directory.
///
/// Backend paths are `/`-separated and relative to the configured root;
/// paths that climb above the root are rejected before the OS sees them.
#[derive(Debug, Clone)]
pub struct HostBackend {
    root: PathBuf,
    config: HostConfig,
}

impl HostBackend {
    pub fn new(config: HostConfig) -> FsResult<Self> {
        config.validate()?;
        let root = io_result("host.canonicalize", dunce::canonicalize(&config.root))?;
        debug!(root = %root.display(), read_only = config.read_only, "host.new");
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    fn prepare_path(&self, path: &str) -> FsResult<PathBuf> {
        let rooted = path::rooted(path)?;
        let relative = rooted.trim_start_matches('/');
        let mut host = self.root.clone();
        for segment in path::segments(relative) {
            host.push(segment);
        }
        trace!(path, host = %host.display(), "host.prepare_path");
        Ok(host)
    }

    /// Like [`Self::prepare_path`], and a trailing separator must name a
    /// directory.
    fn prepare_file_path(&self, path: &str) -> FsResult<PathBuf> {
        let host = self.prepare_path(path)?;
        if path::has_trailing_separator(path) && !host.is_dir() {
            return Err(match host.exists() {
                true => FsError::new(FsErrorKind::NotADirectory, "host.path.trailing"),
                false => FsError::not_found("host.path.trailing"),
            });
        }
        Ok(host)
    }

    fn check_writable(&self, writes: bool, context: &'static str) -> FsResult<()> {
        if writes && self.config.read_only {
            return Err(read_only_error(context));
        }
        Ok(())
    }
}

impl Backend for HostBackend {
    fn open_handle(
        &self,
        path: &str,
        mode: OpenMode,
        flags: FeatureFlags,
    ) -> FsResult<Box<dyn FileHandle>> {
        self.check_writable(mode.writes(), "host.open_handle.read_only")?;
        let host = self.prepare_file_path(path)?;
        Ok(Box::new(NativeFile::open(&host, mode, flags)?))
    }

    fn open_mmio(&self, path: &str, mode: MmioMode) -> FsResult<MmioHandle> {
        self.check_writable(mode != MmioMode::Read, "host.open_mmio.read_only")?;
        let host = self.prepare_file_path(path)?;
        MmioHandle::open(&host, mode)
    }

    fn open_stream(&self, path: &str, mode: OpenMode, flags: FeatureFlags) -> FsResult<Stream> {
        self.check_writable(mode.writes(), "host.open_stream.read_only")?;
        let host = self.prepare_file_path(path)?;
        if mode == OpenMode::Read && self.config.mmap_streams {
            match open_mapped_stream(&host, flags, &self.config.stream) {
                Ok(stream) => return Ok(stream.into()),
                // Empty files cannot be mapped.
                Err(err) if err.kind() == FsErrorKind::InvalidData => {}
                Err(err) => return Err(err),
            }
        }
        open_native_stream(&host, mode, flags, &self.config.stream)
    }

    /// Entries are reported sorted by name. Names that are not valid UTF-8
    /// are skipped.
    fn list_dir(&self, path: &str, visit: &mut Visit<'_>) -> FsResult<()> {
        let host = self.prepare_path(path)?;
        let mut entries = Vec::new();
        for entry in io_result("host.read_dir", fs::read_dir(&host))? {
            let entry = io_result("host.read_dir.entry", entry)?;
            let Ok(name) = entry.file_name().into_string() else {
                trace!(dir = %host.display(), "host.read_dir.non_utf8");
                continue;
            };
            let file_type = match entry.file_type() {
                Ok(ty) if ty.is_symlink() => fs::metadata(entry.path())
                    .map(|meta| file_type_of(&meta.file_type()))
                    .unwrap_or(FileType::Other),
                Ok(ty) => file_type_of(&ty),
                Err(_) => FileType::Other,
            };
            entries.push((name, file_type));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, file_type) in &entries {
            if visit(name, *file_type).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> FsResult<Stat> {
        let host = self.prepare_file_path(path)?;
        let meta = io_result("host.stat", fs::metadata(&host))?;
        Ok(Stat {
            file_type: file_type_of(&meta.file_type()),
            size: if meta.is_file() { meta.len() } else { 0 },
        })
    }
}

fn file_type_of(ty: &fs::FileType) -> FileType {
    if ty.is_dir() {
        FileType::Directory
    } else if ty.is_file() {
        FileType::File
    } else {
        FileType::Other
    }
}
