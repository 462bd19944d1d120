//! A [`layerfs_core::Backend`] over a directory of the host file system.

mod backend;
mod config;

pub use backend::HostBackend;
pub use config::HostConfig;

use layerfs_io::{FsError, FsResult};

pub(crate) fn io_result<T>(context: &'static str, result: std::io::Result<T>) -> FsResult<T> {
    result.map_err(|err| FsError::io(context, err))
}

pub(crate) fn read_only_error(context: &'static str) -> FsError {
    FsError::unsupported(context)
}
