//! The bipartite keyword <-> directory graph.
//!
//! Nodes live in an `IndexMap` keyed by keyword name, so a `NodeId` is
//! the node's insertion index and stays valid forever (nodes are never
//! removed). Entries live in a slot vector addressed by `EntryId`; a
//! removed entry leaves a free slot that later inserts reuse.

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, instrument};

use crate::error::KeywordFsError;
use crate::realfs::RealFs;

/// Handle to a keyword node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Handle to a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

/// A keyword: one directory basename, shared by every directory using it.
#[derive(Debug)]
pub struct KeywordNode {
    name: String,
    entries: BTreeSet<EntryId>,
}

impl KeywordNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directories tagged with this keyword.
    pub fn entries(&self) -> &BTreeSet<EntryId> {
        &self.entries
    }

    /// A node whose directories have all been removed.
    pub fn is_stale(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A physical directory below the reference root.
#[derive(Debug)]
pub struct DirectoryEntry {
    path: PathBuf,
    nodes: Vec<NodeId>,
}

impl DirectoryEntry {
    /// Absolute real path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One node per segment from the root down to this directory, in order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

/// Keyword graph over one reference tree.
#[derive(Debug)]
pub struct KeywordGraph {
    root: PathBuf,
    nodes: IndexMap<String, KeywordNode>,
    entries: Vec<Option<DirectoryEntry>>,
    free: Vec<EntryId>,
    by_path: HashMap<PathBuf, EntryId>,
}

impl KeywordGraph {
    /// Create an empty graph for the given reference root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        KeywordGraph {
            root: root.into(),
            nodes: IndexMap::new(),
            entries: Vec::new(),
            free: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Segment names of `path` relative to the reference root.
    ///
    /// The root itself yields an empty list.
    pub fn relative_segments(&self, path: &Path) -> Result<Vec<String>, KeywordFsError> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|_| self.outside_root(path))?;

        let mut segments = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(self.outside_root(path)),
            }
        }
        Ok(segments)
    }

    fn outside_root(&self, path: &Path) -> KeywordFsError {
        KeywordFsError::OutsideRoot {
            path: path.display().to_string(),
            root: self.root.display().to_string(),
        }
    }

    /// Register a directory, tagging it with every segment of its path.
    ///
    /// Inserting a path that is already registered returns the existing entry.
    pub fn insert(&mut self, path: impl AsRef<Path>) -> Result<EntryId, KeywordFsError> {
        let path = path.as_ref();
        let segments = self.relative_segments(path)?;
        if segments.is_empty() {
            return Err(self.outside_root(path));
        }

        if let Some(&existing) = self.by_path.get(path) {
            debug!(path = %path.display(), "directory already registered");
            return Ok(existing);
        }

        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.entries.push(None);
                EntryId(self.entries.len() - 1)
            }
        };

        let mut nodes = Vec::with_capacity(segments.len());
        for segment in segments {
            let slot = self.nodes.entry(segment);
            let node_id = NodeId(slot.index());
            let name = slot.key().clone();
            slot.or_insert_with(|| KeywordNode {
                name,
                entries: BTreeSet::new(),
            })
            .entries
            .insert(id);
            nodes.push(node_id);
        }

        self.entries[id.0] = Some(DirectoryEntry {
            path: path.to_path_buf(),
            nodes,
        });
        self.by_path.insert(path.to_path_buf(), id);
        Ok(id)
    }

    /// Detach a directory from all of its keywords and drop it.
    ///
    /// Keywords left without directories are kept.
    pub fn remove(&mut self, id: EntryId) -> Option<PathBuf> {
        let entry = self.entries.get_mut(id.0)?.take()?;
        for node_id in &entry.nodes {
            if let Some((_, node)) = self.nodes.get_index_mut(node_id.0) {
                node.entries.remove(&id);
            }
        }
        self.by_path.remove(&entry.path);
        self.free.push(id);
        Some(entry.path)
    }

    /// Exact-name keyword lookup.
    pub fn lookup_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.get_index_of(name).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &KeywordNode {
        &self.nodes[id.0]
    }

    pub fn entry(&self, id: EntryId) -> Option<&DirectoryEntry> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }

    /// Find the entry registered for a real directory.
    pub fn entry_by_path(&self, path: &Path) -> Option<EntryId> {
        self.by_path.get(path).copied()
    }

    /// All keywords in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &KeywordNode)> {
        self.nodes.values().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// All live directory entries.
    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &DirectoryEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (EntryId(i), e)))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn entry_count(&self) -> usize {
        self.by_path.len()
    }

    /// Keyword names tagged on a directory, root-most first.
    pub fn tags(&self, id: EntryId) -> Option<Vec<&str>> {
        let entry = self.entry(id)?;
        Some(entry.nodes.iter().map(|n| self.node(*n).name()).collect())
    }

    /// Walk the reference tree and register every directory found.
    ///
    /// Returns the number of directories newly registered.
    #[instrument(skip(self, fs), fields(root = %self.root.display()))]
    pub fn scan(&mut self, fs: &dyn RealFs) -> Result<usize, KeywordFsError> {
        let before = self.entry_count();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            for child in fs.list(&dir)? {
                if child.is_dir {
                    let path = dir.join(&child.name);
                    self.insert(&path)?;
                    pending.push(path);
                }
            }
        }

        let added = self.entry_count() - before;
        info!(
            directories = self.entry_count(),
            keywords = self.node_count(),
            added,
            "scanned reference tree"
        );
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;

    fn names(graph: &KeywordGraph, id: EntryId) -> Vec<String> {
        graph
            .tags(id)
            .unwrap()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_insert_tags_every_segment() {
        let mut graph = KeywordGraph::new("/ref");
        let id = graph.insert("/ref/A/B/C").unwrap();

        assert_eq!(names(&graph, id), vec!["A", "B", "C"]);
        for name in ["A", "B", "C"] {
            let node = graph.lookup_node(name).unwrap();
            assert!(graph.node(node).entries().contains(&id));
        }
    }

    #[test]
    fn test_same_basename_same_node() {
        let mut graph = KeywordGraph::new("/ref");
        let a = graph.insert("/ref/proj1/urgent").unwrap();
        let b = graph.insert("/ref/proj2/urgent").unwrap();

        let urgent = graph.lookup_node("urgent").unwrap();
        assert_eq!(graph.entry(a).unwrap().nodes()[1], urgent);
        assert_eq!(graph.entry(b).unwrap().nodes()[1], urgent);
        assert_eq!(graph.node(urgent).entries().len(), 2);
    }

    #[test]
    fn test_repeated_segment_not_deduplicated() {
        let mut graph = KeywordGraph::new("/ref");
        let id = graph.insert("/ref/a/x/a").unwrap();

        let nodes = graph.entry(id).unwrap().nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], nodes[2]);
        assert_eq!(graph.node(nodes[0]).entries().len(), 1);
    }

    #[test]
    fn test_root_and_outside_rejected() {
        let mut graph = KeywordGraph::new("/ref");
        assert!(matches!(
            graph.insert("/ref"),
            Err(KeywordFsError::OutsideRoot { .. })
        ));
        assert!(matches!(
            graph.insert("/elsewhere/x"),
            Err(KeywordFsError::OutsideRoot { .. })
        ));
        assert!(matches!(
            graph.insert("/ref/../etc"),
            Err(KeywordFsError::OutsideRoot { .. })
        ));
        assert_eq!(graph.entry_count(), 0);
    }

    #[test]
    fn test_insert_existing_returns_same_entry() {
        let mut graph = KeywordGraph::new("/ref");
        let first = graph.insert("/ref/a/b").unwrap();
        let second = graph.insert("/ref/a/b").unwrap();

        assert_eq!(first, second);
        assert_eq!(graph.entry_count(), 1);
        let b = graph.lookup_node("b").unwrap();
        assert_eq!(graph.node(b).entries().len(), 1);
    }

    #[test]
    fn test_remove_detaches_but_keeps_nodes() {
        let mut graph = KeywordGraph::new("/ref");
        let id = graph.insert("/ref/proj1/urgent").unwrap();
        let parent = graph.insert("/ref/proj1").unwrap();

        assert_eq!(graph.remove(id), Some(PathBuf::from("/ref/proj1/urgent")));

        let urgent = graph.lookup_node("urgent").unwrap();
        assert!(graph.node(urgent).is_stale());
        let proj1 = graph.lookup_node("proj1").unwrap();
        assert_eq!(
            graph.node(proj1).entries().iter().copied().collect::<Vec<_>>(),
            vec![parent]
        );
        assert_eq!(graph.entry_by_path(Path::new("/ref/proj1/urgent")), None);
        assert!(graph.entry(id).is_none());

        // Removing twice is a no-op.
        assert_eq!(graph.remove(id), None);
    }

    #[test]
    fn test_removed_slot_is_reused() {
        let mut graph = KeywordGraph::new("/ref");
        let gone = graph.insert("/ref/a").unwrap();
        graph.remove(gone);
        let fresh = graph.insert("/ref/b").unwrap();

        assert_eq!(gone, fresh);
        assert_eq!(names(&graph, fresh), vec!["b"]);
        let a = graph.lookup_node("a").unwrap();
        assert!(!graph.node(a).entries().contains(&fresh));
    }

    #[test]
    fn test_scan_registers_every_directory() {
        let fs = MemoryFs::new("/ref");
        fs.add_file("/ref/proj1/urgent/notes.txt")
            .add_file("/ref/proj2/urgent/plan.txt")
            .add_file("/ref/readme.md");

        let mut graph = KeywordGraph::new("/ref");
        assert_eq!(graph.scan(&fs).unwrap(), 4);
        assert_eq!(graph.entry_count(), 4);
        assert_eq!(graph.node_count(), 3);

        // A second scan finds nothing new.
        assert_eq!(graph.scan(&fs).unwrap(), 0);
        assert_eq!(graph.entry_count(), 4);
    }
}
