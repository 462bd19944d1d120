//! The mount tree: virtual directories, the backends mounted on them, and
//! the walk that turns a virtual path into backend candidates.

use std::ops::ControlFlow;
use std::sync::Arc;

use layerfs_io::{FsError, FsErrorKind, FsResult};
use smallvec::SmallVec;
use tracing::trace;

use crate::backend::Backend;
use crate::path;
use crate::string_pool::{StrRef, StringPool};

/// One row of a mount table.
#[derive(Debug, Clone)]
pub struct MountEntry {
    /// Where the backend appears in the virtual tree.
    pub virtual_path: String,
    pub backend: Arc<dyn Backend>,
    /// Path inside the backend that `virtual_path` maps to.
    pub physical_path: String,
}

impl MountEntry {
    pub fn new(
        virtual_path: impl Into<String>,
        backend: Arc<dyn Backend>,
        physical_path: impl Into<String>,
    ) -> Self {
        Self {
            virtual_path: virtual_path.into(),
            backend,
            physical_path: physical_path.into(),
        }
    }

    /// Mounts the backend's root at `virtual_path`.
    pub fn root(virtual_path: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self::new(virtual_path, backend, "/")
    }
}

#[derive(Debug)]
struct MountPoint {
    backend: Arc<dyn Backend>,
    /// Rooted physical prefix without a trailing separator; empty for the
    /// backend root.
    prefix: String,
}

#[derive(Debug)]
struct Node {
    name: StrRef,
    children: Vec<usize>,
    /// Highest priority first.
    mounts: Vec<MountPoint>,
}

impl Node {
    fn new(name: StrRef) -> Self {
        Self {
            name,
            children: Vec::new(),
            mounts: Vec::new(),
        }
    }
}

/// A resolution candidate: a backend and the physical path to ask it for.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub backend: &'a Arc<dyn Backend>,
    pub physical: &'a str,
}

/// Nodes live in an arena indexed by position; node 0 is the root.
#[derive(Debug)]
pub(crate) struct MountTree {
    pool: StringPool,
    nodes: Vec<Node>,
    mount_count: usize,
}

impl Default for MountTree {
    fn default() -> Self {
        Self {
            pool: StringPool::new(),
            nodes: vec![Node::new(StrRef::EMPTY)],
            mount_count: 0,
        }
    }
}

/// A virtual path split into real segments.
pub(crate) struct Segments<'p> {
    parts: SmallVec<[&'p str; 16]>,
    trailing: bool,
}

impl<'p> Segments<'p> {
    /// Splits an already rooted path, enforcing the segment limit.
    pub(crate) fn parse(rooted: &'p str, trailing: bool, max_segments: usize) -> FsResult<Self> {
        let parts: SmallVec<[&str; 16]> = path::segments(rooted).collect();
        if parts.len() > max_segments {
            return Err(FsError::new(FsErrorKind::InvalidPath, "vfs.path.too_deep"));
        }
        Ok(Self { parts, trailing })
    }
}

impl MountTree {
    /// Builds a complete tree from `entries`. Later entries take priority
    /// over earlier ones at the same node.
    pub(crate) fn build(entries: &[MountEntry], max_segments: usize) -> FsResult<Self> {
        let mut tree = Self::default();
        for entry in entries.iter().rev() {
            tree.insert(entry, max_segments)?;
        }
        Ok(tree)
    }

    pub(crate) fn mount_count(&self) -> usize {
        self.mount_count
    }

    fn insert(&mut self, entry: &MountEntry, max_segments: usize) -> FsResult<()> {
        let virtual_path = path::rooted(&entry.virtual_path)?;
        let segments = Segments::parse(&virtual_path, false, max_segments)?;

        let mut node = 0;
        for segment in &segments.parts {
            node = self.child_or_insert(node, segment)?;
        }

        let physical = path::rooted(&entry.physical_path)?;
        let prefix = if physical == "/" { String::new() } else { physical };
        trace!(virtual_path = %virtual_path, prefix = %prefix, "vfs.mount.insert");
        self.nodes[node].mounts.push(MountPoint {
            backend: entry.backend.clone(),
            prefix,
        });
        self.mount_count += 1;
        Ok(())
    }

    fn child_or_insert(&mut self, parent: usize, segment: &str) -> FsResult<usize> {
        let name = self.pool.intern(segment.as_bytes())?;
        if let Some(child) = self.child_by_ref(parent, name) {
            return Ok(child);
        }
        let index = self.nodes.len();
        self.nodes
            .try_reserve(1)
            .map_err(|_| FsError::new(FsErrorKind::NoMemory, "vfs.mount.node"))?;
        self.nodes.push(Node::new(name));
        self.nodes[parent].children.push(index);
        Ok(index)
    }

    fn child_by_ref(&self, parent: usize, name: StrRef) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[*child].name == name)
    }

    fn child(&self, parent: usize, segment: &str) -> Option<usize> {
        let name = self.pool.find(segment.as_bytes())?;
        self.child_by_ref(parent, name)
    }

    /// The node that `segments` names exactly, if the tree has one.
    pub(crate) fn node_at(&self, segments: &Segments<'_>) -> Option<usize> {
        segments
            .parts
            .iter()
            .try_fold(0, |node, segment| self.child(node, segment))
    }

    /// Names of the virtual subdirectories of `node`.
    pub(crate) fn child_names(&self, node: usize) -> impl Iterator<Item = &str> + '_ {
        self.nodes[node]
            .children
            .iter()
            .filter_map(|child| self.pool.resolve_str(self.nodes[*child].name))
    }

    /// Calls `visit` for every mount that could hold `segments`, deepest
    /// mount point first and, within a node, highest priority first.
    pub(crate) fn resolve(
        &self,
        segments: &Segments<'_>,
        visit: &mut dyn FnMut(Candidate<'_>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        self.walk(0, 0, segments, visit)
    }

    fn walk(
        &self,
        node: usize,
        depth: usize,
        segments: &Segments<'_>,
        visit: &mut dyn FnMut(Candidate<'_>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        if let Some(child) = segments
            .parts
            .get(depth)
            .and_then(|segment| self.child(node, segment))
        {
            self.walk(child, depth + 1, segments, visit)?;
        }

        let rest = &segments.parts[depth..];
        for mount in &self.nodes[node].mounts {
            let physical = physical_path(&mount.prefix, rest, segments.trailing);
            trace!(physical = %physical, "vfs.resolve.candidate");
            visit(Candidate {
                backend: &mount.backend,
                physical: &physical,
            })?;
        }
        ControlFlow::Continue(())
    }
}

fn physical_path(prefix: &str, rest: &[&str], trailing: bool) -> String {
    if rest.is_empty() {
        return match (prefix.is_empty(), trailing) {
            (true, _) => "/".to_owned(),
            (false, true) => format!("{prefix}/"),
            (false, false) => prefix.to_owned(),
        };
    }
    let len = prefix.len() + rest.iter().map(|s| s.len() + 1).sum::<usize>() + 1;
    let mut out = String::with_capacity(len);
    out.push_str(prefix);
    for segment in rest {
        out.push('/');
        out.push_str(segment);
    }
    if trailing {
        out.push('/');
    }
    out
}
