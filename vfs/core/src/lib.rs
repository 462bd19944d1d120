//! Layered virtual file system.
//!
//! A [`Vfs`] overlays any number of [`Backend`]s under one virtual path
//! tree. Mounts are installed as a whole with [`Vfs::install_mounts`];
//! lookups try the deepest mount point first and, at a mount point, the most
//! recently installed backend first.

pub mod backend;
pub mod mem;
pub mod path;
pub mod string_pool;
mod tree;
mod vfs;

pub use backend::{Backend, BackendExt, FileType, Stat, Visit};
pub use layerfs_io::{FeatureFlags, FsError, FsErrorKind, FsResult, MmioMode, OpenMode, Stream};
pub use mem::MemBackend;
pub use path::{CleanOptions, PathStyle, Trailing};
pub use string_pool::{StrRef, StringPool};
pub use tree::{Candidate, MountEntry};
pub use vfs::{Vfs, VfsConfig};
