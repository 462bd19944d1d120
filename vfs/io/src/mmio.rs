//! Memory-mapped windows over a file.
//!
//! A [`MmioHandle`] keeps the file open and maps one window of it at a time.
//! Mappings must start on an OS allocation boundary, so the handle maps a
//! little more than asked for and hands out the sub-slice that starts at the
//! requested offset.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::{trace, warn};

use crate::error::{FsError, FsErrorKind, FsResult, io_result};

/// Access requested for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioMode {
    Read,
    ReadWrite,
    /// Mappings cannot grow a file; always rejected.
    Append,
}

/// Granularity that mapping offsets must be a multiple of.
pub fn allocation_granularity() -> usize {
    #[cfg(windows)]
    {
        64 * 1024
    }
    #[cfg(not(windows))]
    {
        region::page::size()
    }
}

/// Where to map and which part of the mapping the caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    /// Aligned file offset the mapping starts at.
    pub map_offset: u64,
    /// Bytes to map starting at `map_offset`.
    pub map_len: usize,
    /// Distance from the start of the mapping to the requested offset.
    pub delta: usize,
    /// Bytes visible to the caller, starting at the requested offset.
    pub len: usize,
}

/// Computes the mapping for the window `[offset, offset + size)` of a file of
/// `file_size` bytes. `size == 0` means "until the end of the file".
pub fn plan_window(
    file_size: u64,
    offset: u64,
    size: usize,
    granularity: usize,
) -> FsResult<WindowPlan> {
    if granularity == 0 || !granularity.is_power_of_two() {
        return Err(FsError::new(FsErrorKind::InvalidInput, "mmio.plan.granularity"));
    }
    if offset >= file_size {
        return Err(FsError::new(FsErrorKind::InvalidInput, "mmio.plan.offset"));
    }

    let available = file_size - offset;
    let wanted = if size == 0 { available } else { size as u64 };
    let len = wanted.min(available);
    let len = usize::try_from(len)
        .map_err(|_| FsError::new(FsErrorKind::InvalidInput, "mmio.plan.size"))?;

    let granularity = granularity as u64;
    let map_offset = offset / granularity * granularity;
    let delta = (offset - map_offset) as usize;
    let map_len = len
        .checked_add(delta)
        .filter(|total| *total <= isize::MAX as usize)
        .ok_or_else(|| FsError::new(FsErrorKind::InvalidInput, "mmio.plan.size"))?;

    Ok(WindowPlan {
        map_offset,
        map_len,
        delta,
        len,
    })
}

#[derive(Debug)]
enum Mapping {
    ReadOnly(Mmap),
    Writable(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(map) => &map[..],
            Mapping::Writable(map) => &map[..],
        }
    }
}

#[derive(Debug)]
struct Window {
    mapping: Mapping,
    offset: u64,
    delta: usize,
    len: usize,
}

/// An open file plus at most one live mapped window of it.
#[derive(Debug)]
pub struct MmioHandle {
    file: File,
    writable: bool,
    size: u64,
    granularity: usize,
    window: Option<Window>,
}

impl MmioHandle {
    /// Opens an existing, non-empty file for mapping.
    pub fn open(path: &Path, mode: MmioMode) -> FsResult<Self> {
        let writable = match mode {
            MmioMode::Read => false,
            MmioMode::ReadWrite => true,
            MmioMode::Append => return Err(FsError::unsupported("mmio.open.append")),
        };
        let file = io_result(
            "mmio.open",
            std::fs::OpenOptions::new()
                .read(true)
                .write(writable)
                .open(path),
        )?;
        Self::from_file(file, writable)
    }

    pub fn from_file(file: File, writable: bool) -> FsResult<Self> {
        let meta = io_result("mmio.open.metadata", file.metadata())?;
        if meta.is_dir() {
            return Err(FsError::new(FsErrorKind::IsADirectory, "mmio.open"));
        }
        if meta.len() == 0 {
            return Err(FsError::new(FsErrorKind::InvalidData, "mmio.open.empty"));
        }
        Ok(Self {
            file,
            writable,
            size: meta.len(),
            granularity: allocation_granularity(),
            window: None,
        })
    }

    /// Total size of the file in bytes.
    pub fn file_size(&self) -> u64 {
        self.size
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// File offset of the current window, if one is mapped.
    pub fn window_offset(&self) -> Option<u64> {
        self.window.as_ref().map(|w| w.offset)
    }

    /// Maps `[offset, offset + size)` (clamped to the file) and returns it.
    /// The previous window is unmapped first.
    pub fn remap(&mut self, offset: u64, size: usize) -> FsResult<&[u8]> {
        let plan = plan_window(self.size, offset, size, self.granularity)?;
        self.unmap();
        trace!(offset, size, map_offset = plan.map_offset, map_len = plan.map_len, "mmio.remap");

        let mut options = MmapOptions::new();
        options.offset(plan.map_offset).len(plan.map_len);
        // Safety: the mapping is private to this handle and never outlives it;
        // the window slices handed out borrow the handle.
        let mapping = if self.writable {
            Mapping::Writable(io_result("mmio.remap", unsafe { options.map_mut(&self.file) })?)
        } else {
            Mapping::ReadOnly(io_result("mmio.remap", unsafe { options.map(&self.file) })?)
        };

        let window = self.window.insert(Window {
            mapping,
            offset,
            delta: plan.delta,
            len: plan.len,
        });
        Ok(&window.mapping.bytes()[window.delta..window.delta + window.len])
    }

    /// The current window, or an empty slice when nothing is mapped.
    pub fn window(&self) -> &[u8] {
        match &self.window {
            Some(w) => &w.mapping.bytes()[w.delta..w.delta + w.len],
            None => &[],
        }
    }

    /// The current window for writing. Fails on read-only handles.
    pub fn window_mut(&mut self) -> FsResult<&mut [u8]> {
        match &mut self.window {
            Some(Window {
                mapping: Mapping::Writable(map),
                delta,
                len,
                ..
            }) => Ok(&mut map[*delta..*delta + *len]),
            Some(_) => Err(FsError::unsupported("mmio.window_mut")),
            None => Ok(Default::default()),
        }
    }

    /// Writes dirty pages of the current window back to the file.
    pub fn flush(&self) -> FsResult<()> {
        match &self.window {
            Some(Window {
                mapping: Mapping::Writable(map),
                ..
            }) => io_result("mmio.flush", map.flush()),
            _ => Ok(()),
        }
    }

    /// Flushes and releases the current window. The file stays open.
    pub fn unmap(&mut self) {
        if let Some(window) = self.window.take() {
            if let Mapping::Writable(map) = &window.mapping {
                if let Err(err) = map.flush() {
                    warn!(error = %err, "mmio.unmap flush failed");
                }
            }
        }
    }

    /// Releases the window and the file.
    pub fn close(mut self) -> FsResult<()> {
        let result = self.flush();
        self.window = None;
        result
    }
}
