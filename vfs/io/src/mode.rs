use bitflags::bitflags;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    /// Create or truncate, then write.
    Write,
    /// Read and write without truncation. Not allowed for streams.
    ReadWrite,
    /// Create if missing, every write lands at the end.
    Append,
}

impl OpenMode {
    pub const fn reads(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    /// Opening in this mode destroys existing content.
    pub const fn truncates(self) -> bool {
        matches!(self, OpenMode::Write)
    }

    pub(crate) fn std_options(self) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        match self {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::ReadWrite => options.read(true).write(true).create(true),
            OpenMode::Append => options.append(true).create(true),
        };
        options
    }
}

bitflags! {
    /// Hints passed along with an open request. Backends may ignore any of them.
    #[derive(Default)]
    pub struct FeatureFlags: u32 {
        /// The file will be read or written front to back.
        const SEQUENTIAL = 1 << 0;
        /// The whole file is likely to be needed soon.
        const PREFETCH = 1 << 1;
        /// The file will not change size while open.
        const NO_RESIZE = 1 << 2;
        /// Reads may return no data without it being an error.
        const NONBLOCKING = 1 << 3;
        /// A failed read stream yields zero bytes forever instead of nothing.
        const FAIL_ZEROS = 1 << 4;
    }
}

impl FeatureFlags {
    pub fn failure_mode(self) -> FailureMode {
        if self.contains(FeatureFlags::FAIL_ZEROS) {
            FailureMode::Zeros
        } else {
            FailureMode::Empty
        }
    }
}

/// What a read stream turns into once it hits an error or the end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// `begin == cursor == end` forever.
    #[default]
    Empty,
    /// An endless window of zero bytes.
    Zeros,
}
