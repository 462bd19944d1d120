use std::cell::Cell;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use layerfs_io::{
    FeatureFlags, FileHandle, FsError, FsErrorKind, FsResult, MmioHandle, MmioMode, OpenMode,
    Stream,
};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::backend::{Backend, FileType, Stat, Visit};
use crate::path;
use crate::tree::{Candidate, MountEntry, MountTree, Segments};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfsConfig {
    /// Longest virtual path accepted, in segments.
    pub max_segments: usize,
    /// How many VFS layers a single call may pass through when a [`Vfs`] is
    /// mounted inside another one.
    pub max_nesting: usize,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            max_segments: 64,
            max_nesting: 16,
        }
    }
}

impl VfsConfig {
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }
}

/// A layered virtual file system.
///
/// Backends are mounted on virtual directories with [`Vfs::install_mounts`].
/// A lookup walks from the deepest matching mount point outwards and, at
/// each mount point, from the most recently installed mount to the oldest.
/// A `Vfs` is itself a [`Backend`] and can be mounted into another `Vfs`.
#[derive(Debug, Default)]
pub struct Vfs {
    tree: RwLock<Arc<MountTree>>,
    config: VfsConfig,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: VfsConfig) -> Self {
        Self {
            tree: RwLock::default(),
            config,
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Replaces every mount with `entries`.
    ///
    /// The new tree is built completely before it is swapped in; if any entry
    /// fails the previous configuration stays in place. When several entries
    /// share a virtual path the last one has the highest priority.
    pub fn install_mounts(&self, entries: &[MountEntry]) -> FsResult<()> {
        let tree = MountTree::build(entries, self.config.max_segments)?;
        debug!(mounts = tree.mount_count(), "vfs.install_mounts");
        *self.tree.write() = Arc::new(tree);
        Ok(())
    }

    /// Drops every mount.
    pub fn clear_mounts(&self) {
        *self.tree.write() = Arc::default();
    }

    pub fn mount_count(&self) -> usize {
        self.tree.read().mount_count()
    }

    /// Calls `visit` with every `(backend, physical path)` pair that could
    /// hold `path`, in priority order, until it returns `Break`.
    pub fn resolve(
        &self,
        path: &str,
        visit: &mut dyn FnMut(&Arc<dyn Backend>, &str) -> ControlFlow<()>,
    ) -> FsResult<()> {
        let tree = self.snapshot();
        let rooted = path::rooted(path)?;
        let segments = Segments::parse(
            &rooted,
            path::has_trailing_separator(path),
            self.config.max_segments,
        )?;
        let _ = tree.resolve(&segments, &mut |candidate: Candidate<'_>| {
            visit(candidate.backend, candidate.physical)
        });
        Ok(())
    }

    fn snapshot(&self) -> Arc<MountTree> {
        self.tree.read().clone()
    }

    /// Runs `attempt` against each candidate until one succeeds.
    ///
    /// When all fail, the first error that is neither `NotFound` nor
    /// `Unsupported` is returned, otherwise `NotFound`.
    fn first_success<T>(
        &self,
        path: &str,
        context: &'static str,
        mut attempt: impl FnMut(&dyn Backend, &str) -> FsResult<T>,
    ) -> FsResult<T> {
        let _depth = NestingGuard::enter(self.config.max_nesting)?;
        let mut found = None;
        let mut hard_error: Option<FsError> = None;
        self.resolve(path, &mut |backend, physical| {
            match attempt(&**backend, physical) {
                Ok(value) => {
                    found = Some(value);
                    ControlFlow::Break(())
                }
                Err(err) => {
                    trace!(physical, error = %err, "vfs.candidate.failed");
                    if !err.kind().is_soft() && hard_error.is_none() {
                        hard_error = Some(err);
                    }
                    ControlFlow::Continue(())
                }
            }
        })?;
        match found {
            Some(value) => Ok(value),
            None => Err(hard_error.unwrap_or_else(|| FsError::not_found(context))),
        }
    }

    fn is_virtual_dir(&self, path: &str) -> FsResult<bool> {
        let tree = self.snapshot();
        let rooted = path::rooted(path)?;
        let segments = Segments::parse(&rooted, false, self.config.max_segments)?;
        Ok(tree.node_at(&segments).is_some())
    }
}

impl Backend for Vfs {
    fn open_handle(
        &self,
        path: &str,
        mode: OpenMode,
        flags: FeatureFlags,
    ) -> FsResult<Box<dyn FileHandle>> {
        self.first_success(path, "vfs.open_handle", |backend, physical| {
            backend.open_handle(physical, mode, flags)
        })
    }

    fn open_mmio(&self, path: &str, mode: MmioMode) -> FsResult<MmioHandle> {
        self.first_success(path, "vfs.open_mmio", |backend, physical| {
            backend.open_mmio(physical, mode)
        })
    }

    fn open_stream(&self, path: &str, mode: OpenMode, flags: FeatureFlags) -> FsResult<Stream> {
        self.first_success(path, "vfs.open_stream", |backend, physical| {
            backend.open_stream(physical, mode, flags)
        })
    }

    fn stat(&self, path: &str) -> FsResult<Stat> {
        match self.first_success(path, "vfs.stat", |backend, physical| backend.stat(physical)) {
            Err(err) if err.kind().is_soft() => {
                if self.is_virtual_dir(path)? {
                    Ok(Stat::directory())
                } else {
                    Err(err)
                }
            }
            result => result,
        }
    }

    /// Lists the union of every candidate's entries. Virtual subdirectories
    /// come first; after that the first backend to report a name wins.
    fn list_dir(&self, path: &str, visit: &mut Visit<'_>) -> FsResult<()> {
        let _depth = NestingGuard::enter(self.config.max_nesting)?;
        let tree = self.snapshot();
        let rooted = path::rooted(path)?;
        let segments = Segments::parse(&rooted, false, self.config.max_segments)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut listed = false;
        if let Some(node) = tree.node_at(&segments) {
            listed = true;
            for name in tree.child_names(node) {
                if seen.insert(name.to_owned()) && visit(name, FileType::Directory).is_break() {
                    return Ok(());
                }
            }
        }

        let mut hard_error: Option<FsError> = None;
        let mut stopped = false;
        let _ = tree.resolve(&segments, &mut |candidate| {
            let result = candidate
                .backend
                .list_dir(candidate.physical, &mut |name, file_type| {
                    if !seen.contains(name) {
                        seen.insert(name.to_owned());
                        if visit(name, file_type).is_break() {
                            stopped = true;
                            return ControlFlow::Break(());
                        }
                    }
                    ControlFlow::Continue(())
                });
            match result {
                Ok(()) => listed = true,
                Err(err) => {
                    trace!(physical = candidate.physical, error = %err, "vfs.list_dir.failed");
                    if !err.kind().is_soft() && hard_error.is_none() {
                        hard_error = Some(err);
                    }
                }
            }
            if stopped {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        if listed || stopped {
            Ok(())
        } else {
            Err(hard_error.unwrap_or_else(|| FsError::not_found("vfs.list_dir")))
        }
    }
}

thread_local! {
    static NESTING: Cell<usize> = const { Cell::new(0) };
}

/// Counts how many `Vfs` calls are active on this thread.
struct NestingGuard;

impl NestingGuard {
    fn enter(limit: usize) -> FsResult<Self> {
        NESTING.with(|depth| {
            if depth.get() >= limit {
                return Err(FsError::new(FsErrorKind::InvalidInput, "vfs.nesting"));
            }
            depth.set(depth.get() + 1);
            Ok(NestingGuard)
        })
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        NESTING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::BackendExt;
    use crate::mem::MemBackend;

    fn mem(files: &[(&str, &str)]) -> Arc<dyn Backend> {
        let mut backend = MemBackend::new();
        for (path, data) in files {
            backend.insert(path, data.as_bytes().to_vec()).unwrap();
        }
        Arc::new(backend)
    }

    #[test]
    fn empty_vfs_has_only_a_root() {
        let vfs = Vfs::new();
        assert_eq!(vfs.stat("/a").unwrap_err().kind(), FsErrorKind::NotFound);
        assert_eq!(
            vfs.read_dir("/a").unwrap_err().kind(),
            FsErrorKind::NotFound
        );
        // The root always exists.
        assert!(vfs.stat("/").unwrap().is_dir());
        assert!(vfs.read_dir("/").unwrap().is_empty());
    }

    #[test]
    fn failed_install_keeps_previous_mounts() {
        let vfs = Vfs::new();
        vfs.install_mounts(&[MountEntry::root("/", mem(&[("/a.txt", "a")]))])
            .unwrap();

        let err = vfs
            .install_mounts(&[
                MountEntry::root("/", mem(&[])),
                MountEntry::root("/../escape", mem(&[])),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);
        assert_eq!(vfs.mount_count(), 1);
        assert_eq!(vfs.read_file("/a.txt").unwrap(), b"a");
    }

    #[test]
    fn hard_errors_beat_not_found() {
        #[derive(Debug)]
        struct Broken;

        impl Backend for Broken {
            fn stat(&self, _path: &str) -> FsResult<Stat> {
                Err(FsError::new(FsErrorKind::Io, "broken.stat"))
            }
        }

        let vfs = Vfs::new();
        vfs.install_mounts(&[
            MountEntry::root("/", Arc::new(Broken)),
            MountEntry::root("/", mem(&[])),
        ])
        .unwrap();
        assert_eq!(vfs.stat("/x").unwrap_err().kind(), FsErrorKind::Io);
    }

    #[test]
    fn structural_nodes_stat_as_directories() {
        let vfs = Vfs::new();
        vfs.install_mounts(&[MountEntry::root("/mods/extra", mem(&[("/f", "1")]))])
            .unwrap();

        assert!(vfs.stat("/mods").unwrap().is_dir());
        assert!(vfs.stat("/").unwrap().is_dir());
        assert_eq!(
            vfs.read_dir("/mods").unwrap(),
            vec![("extra".to_owned(), FileType::Directory)]
        );
        assert_eq!(vfs.stat("/mods/extra/f").unwrap(), Stat::file(1));
    }

    #[test]
    fn deep_paths_are_rejected() {
        let vfs = Vfs::with_config(VfsConfig::default().with_max_segments(3));
        vfs.install_mounts(&[MountEntry::root("/", mem(&[]))]).unwrap();
        assert_eq!(
            vfs.stat("/a/b/c/d").unwrap_err().kind(),
            FsErrorKind::InvalidPath
        );
    }

    #[test]
    fn self_mount_is_bounded() {
        let vfs = Arc::new(Vfs::with_config(VfsConfig::default().with_max_nesting(4)));
        vfs.install_mounts(&[MountEntry::root("/", vfs.clone())])
            .unwrap();

        assert_eq!(
            vfs.stat("/loop").unwrap_err().kind(),
            FsErrorKind::InvalidInput
        );
        // The guard unwinds completely.
        NESTING.with(|depth| assert_eq!(depth.get(), 0));
        vfs.clear_mounts();
    }
}
