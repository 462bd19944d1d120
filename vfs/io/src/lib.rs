//! File I/O primitives shared by every `layerfs` backend.
//!
//! Three ways in to a file:
//!
//! - [`FileHandle`]: random access by offset.
//! - [`MmioHandle`]: a remappable memory-mapped window.
//! - [`ReadStream`] / [`WriteStream`]: buffer-centric streaming where the
//!   stream owns the buffer and the caller works directly in it.

mod config;
mod error;
mod handle;
mod mmio;
mod mode;
mod open;
mod sources;
mod stream;

pub use config::StreamConfig;
pub use error::{FsError, FsErrorKind, FsResult};
pub use handle::{FileHandle, MemHandle, NativeFile};
pub use mmio::{MmioHandle, MmioMode, WindowPlan, allocation_granularity, plan_window};
pub use mode::{FailureMode, FeatureFlags, OpenMode};
pub use open::{open_mapped_stream, open_native_stream};
pub use sources::{BytesReader, HandleReader, HandleWriter, MmioReader};
pub use stream::{Fill, ReadSource, ReadStream, Stream, StreamStatus, WriteSink, WriteStream};
