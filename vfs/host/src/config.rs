use std::path::PathBuf;

use layerfs_io::{FsError, FsErrorKind, FsResult, StreamConfig};

#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Host directory that becomes the backend root.
    pub root: PathBuf,
    /// Refuse every open that could modify a file.
    pub read_only: bool,
    /// Serve read streams from memory-mapped windows instead of chunked reads.
    pub mmap_streams: bool,
    pub stream: StreamConfig,
}

impl HostConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
            mmap_streams: false,
            stream: StreamConfig::default(),
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_mmap_streams(mut self, mmap_streams: bool) -> Self {
        self.mmap_streams = mmap_streams;
        self
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn validate(&self) -> FsResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(FsError::new(FsErrorKind::InvalidInput, "host.config.root"));
        }
        if !self.root.is_dir() {
            return Err(FsError::new(FsErrorKind::NotADirectory, "host.config.root"));
        }
        Ok(())
    }
}
