use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use layerfs_core::{Backend, FileType, Stat, Visit, path};
use layerfs_io::{
    FeatureFlags, FileHandle, FsError, FsErrorKind, FsResult, MmioHandle, MmioMode, OpenMode,
    Stream,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::casefold::eq_ignore_case;

/// Name equality used when an exact lookup misses.
pub type NameEq = dyn Fn(&str, &str) -> bool + Send + Sync;

type Scratch = SmallVec<[u8; 128]>;

/// Retries failed lookups on the wrapped backend with the on-disk spelling
/// of every path segment.
///
/// The verbatim path is always tried first. Only a `NotFound` triggers the
/// fix-up, and it lists each unresolved directory at most once.
pub struct FuzzyBackend {
    inner: Arc<dyn Backend>,
    eq: Box<NameEq>,
}

impl fmt::Debug for FuzzyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuzzyBackend")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl FuzzyBackend {
    pub fn new(
        inner: Arc<dyn Backend>,
        eq: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            eq: Box::new(eq),
        }
    }

    pub fn case_insensitive(inner: Arc<dyn Backend>) -> Self {
        Self::new(inner, eq_ignore_case)
    }

    pub fn inner(&self) -> &Arc<dyn Backend> {
        &self.inner
    }

    /// Rewrites `path` with the spelling the wrapped backend actually uses.
    ///
    /// The result is rooted; a trailing separator on the input is kept.
    pub fn fix_path(&self, path: &str) -> FsResult<String> {
        let rooted = path::rooted(path)?;
        let trailing = path::has_trailing_separator(path);
        let segments: SmallVec<[&str; 16]> = path::segments(&rooted).collect();
        let mut scratch = Scratch::new();

        let known = self.backtrack(&segments, trailing, &mut scratch)?;
        self.forward_fill(&segments, known, trailing, &mut scratch)?;

        if trailing && !scratch.is_empty() {
            scratch.push(b'/');
        }
        let fixed = as_path(&scratch)?.to_owned();
        debug!(path, fixed = %fixed, "fuzzy.fix_path");
        Ok(fixed)
    }

    /// Finds the deepest prefix of `segments` that exists as a directory and
    /// leaves it in `scratch`.
    fn backtrack(
        &self,
        segments: &[&str],
        trailing: bool,
        scratch: &mut Scratch,
    ) -> FsResult<usize> {
        for depth in (0..=segments.len()).rev() {
            fill(scratch, &segments[..depth]);
            match self.inner.stat(as_path(scratch)?) {
                Ok(stat) if stat.is_dir() => return Ok(depth),
                // The whole path exists but the request still missed.
                Ok(_) if depth == segments.len() && !trailing => return Ok(depth),
                Ok(_) => {
                    return Err(FsError::new(
                        FsErrorKind::NotADirectory,
                        "fuzzy.backtrack",
                    ));
                }
                Err(err) if err.kind() == FsErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Err(FsError::not_found("fuzzy.backtrack"))
    }

    fn forward_fill(
        &self,
        segments: &[&str],
        known: usize,
        trailing: bool,
        scratch: &mut Scratch,
    ) -> FsResult<()> {
        for (index, segment) in segments.iter().enumerate().skip(known) {
            let dir_len = scratch.len();
            scratch.push(b'/');
            scratch.extend_from_slice(segment.as_bytes());

            let file_type = match self.inner.stat(as_path(scratch)?) {
                Ok(stat) => stat.file_type,
                Err(err) if err.kind() == FsErrorKind::NotFound => {
                    scratch.truncate(dir_len);
                    let (name, file_type) = self.list_and_match(scratch, segment)?;
                    trace!(segment, adopted = %name, "fuzzy.forward_fill");
                    scratch.push(b'/');
                    scratch.extend_from_slice(name.as_bytes());
                    file_type
                }
                Err(err) => return Err(err),
            };

            let last = index + 1 == segments.len();
            if file_type != FileType::Directory && (!last || trailing) {
                return Err(FsError::new(
                    FsErrorKind::NotADirectory,
                    "fuzzy.forward_fill",
                ));
            }
        }
        Ok(())
    }

    fn list_and_match(&self, dir: &Scratch, segment: &str) -> FsResult<(String, FileType)> {
        let mut found = None;
        self.inner.list_dir(as_path(dir)?, &mut |name, file_type| {
            if (self.eq)(name, segment) {
                found = Some((name.to_owned(), file_type));
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        found.ok_or_else(|| FsError::not_found("fuzzy.list_and_match"))
    }

    /// Runs `op` verbatim, then once more on the fixed path if it missed.
    fn retry<T>(&self, path: &str, mut op: impl FnMut(&str) -> FsResult<T>) -> FsResult<T> {
        let err = match op(path) {
            Err(err) if err.kind() == FsErrorKind::NotFound => err,
            other => return other,
        };
        match self.fix_path(path) {
            Ok(fixed) if !same_path(&fixed, path) => op(&fixed),
            Ok(_) => Err(err),
            Err(fix_err) => {
                trace!(path, error = %fix_err, "fuzzy.unresolved");
                Err(err)
            }
        }
    }
}

/// Whether the rooted `fixed` names `path` exactly as spelled.
fn same_path(fixed: &str, path: &str) -> bool {
    let fixed = match fixed.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => fixed,
    };
    path::rooted(path).is_ok_and(|rooted| rooted == fixed)
}

fn fill(scratch: &mut Scratch, segments: &[&str]) {
    scratch.clear();
    for segment in segments {
        scratch.push(b'/');
        scratch.extend_from_slice(segment.as_bytes());
    }
}

/// The scratch buffer as a path; empty means the root.
fn as_path(scratch: &Scratch) -> FsResult<&str> {
    if scratch.is_empty() {
        return Ok("/");
    }
    std::str::from_utf8(scratch).map_err(|_| FsError::new(FsErrorKind::InvalidData, "fuzzy.path"))
}

impl Backend for FuzzyBackend {
    fn open_handle(
        &self,
        path: &str,
        mode: OpenMode,
        flags: FeatureFlags,
    ) -> FsResult<Box<dyn FileHandle>> {
        self.retry(path, |p| self.inner.open_handle(p, mode, flags))
    }

    fn open_mmio(&self, path: &str, mode: MmioMode) -> FsResult<MmioHandle> {
        self.retry(path, |p| self.inner.open_mmio(p, mode))
    }

    fn open_stream(&self, path: &str, mode: OpenMode, flags: FeatureFlags) -> FsResult<Stream> {
        self.retry(path, |p| self.inner.open_stream(p, mode, flags))
    }

    fn list_dir(&self, path: &str, visit: &mut Visit<'_>) -> FsResult<()> {
        self.retry(path, |p| self.inner.list_dir(p, visit))
    }

    fn stat(&self, path: &str) -> FsResult<Stat> {
        self.retry(path, |p| self.inner.stat(p))
    }
}
