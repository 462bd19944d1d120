use crate::mode::{FailureMode, FeatureFlags};

/// Buffer sizing for the stream sources in this crate.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Bytes requested per refill by handle-backed readers.
    pub chunk_size: usize,
    /// Bytes mapped per refill by mmap-backed readers. Rounded by the OS
    /// allocation granularity internally.
    pub mmap_window: usize,
    /// Used when the open flags do not ask for [`FeatureFlags::FAIL_ZEROS`].
    pub failure_mode: FailureMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            mmap_window: 1024 * 1024,
            failure_mode: FailureMode::Empty,
        }
    }
}

impl StreamConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_mmap_window(mut self, mmap_window: usize) -> Self {
        self.mmap_window = mmap_window.max(1);
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// Chunk size adjusted for the access hints of one open call.
    pub fn chunk_for(&self, flags: FeatureFlags) -> usize {
        if flags.contains(FeatureFlags::PREFETCH) {
            self.chunk_size.saturating_mul(4)
        } else {
            self.chunk_size
        }
    }

    pub fn failure_mode_for(&self, flags: FeatureFlags) -> FailureMode {
        if flags.contains(FeatureFlags::FAIL_ZEROS) {
            FailureMode::Zeros
        } else {
            self.failure_mode
        }
    }
}
