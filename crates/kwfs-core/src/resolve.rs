use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::trace;

use crate::error::KeywordFsError;
use crate::graph::{DirectoryEntry, EntryId, KeywordGraph};
use crate::realfs::RealFs;
use crate::vpath;

/// The result of resolving one virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedView {
    /// Real directory backing the virtual directory's files.
    pub canonical: PathBuf,
    /// Names offered when the virtual directory is listed.
    pub listing: Vec<String>,
    /// Every directory that matched, canonical first. Empty for the root.
    pub matches: Vec<PathBuf>,
}

impl ResolvedView {
    /// Whether `name` appears in the synthetic listing.
    pub fn lists(&self, name: &str) -> bool {
        self.listing.iter().any(|n| n == name)
    }
}

/// Turns virtual paths into resolved views over a keyword graph.
pub struct ResolutionEngine<'a> {
    graph: &'a KeywordGraph,
    fs: &'a dyn RealFs,
    link_marker: &'a str,
}

impl<'a> ResolutionEngine<'a> {
    pub fn new(graph: &'a KeywordGraph, fs: &'a dyn RealFs, link_marker: &'a str) -> Self {
        ResolutionEngine {
            graph,
            fs,
            link_marker,
        }
    }

    /// Resolve a virtual path.
    ///
    /// Fails with `NotFound` when no directory carries all known keywords
    /// of the path, and with `Io` when listing the backing directory fails.
    pub fn resolve(&self, path: &str) -> Result<ResolvedView, KeywordFsError> {
        let segments = vpath::segments(path);
        if segments.is_empty() {
            return self.resolve_root();
        }

        let matched = self.matching_entries(&segments);
        let mut entries: Vec<&DirectoryEntry> = matched
            .iter()
            .filter_map(|id| self.graph.entry(*id))
            .collect();
        if entries.is_empty() {
            return Err(KeywordFsError::NotFound(vpath::normalize(path)));
        }

        // Shortest absolute path wins; equal lengths fall back to path order.
        entries.sort_by(|a, b| {
            a.path()
                .as_os_str()
                .len()
                .cmp(&b.path().as_os_str().len())
                .then_with(|| a.path().cmp(b.path()))
        });
        let canonical = entries[0].path();

        let mut candidates: BTreeSet<&str> = entries
            .iter()
            .flat_map(|e| e.nodes().iter().map(|n| self.graph.node(*n).name()))
            .collect();
        for segment in &segments {
            candidates.remove(segment);
        }
        for segment in self.graph.relative_segments(canonical)? {
            candidates.remove(segment.as_str());
        }

        let mut listing: Vec<String> = candidates.into_iter().map(str::to_string).collect();
        listing.extend(self.real_files(canonical)?);
        listing.push(".".to_string());
        listing.push("..".to_string());
        listing.push(self.link_marker.to_string());

        trace!(
            path = %path,
            canonical = %canonical.display(),
            matches = entries.len(),
            "resolved virtual path"
        );

        Ok(ResolvedView {
            canonical: canonical.to_path_buf(),
            listing,
            matches: entries.iter().map(|e| e.path().to_path_buf()).collect(),
        })
    }

    /// Intersect the entry sets of every known keyword in `segments`.
    ///
    /// Unknown keywords are skipped. If none is known the result is empty.
    pub fn matching_entries(&self, segments: &[&str]) -> BTreeSet<EntryId> {
        let mut acc: Option<BTreeSet<EntryId>> = None;
        for segment in segments {
            let Some(node) = self.graph.lookup_node(segment) else {
                trace!(keyword = %segment, "ignoring unknown keyword");
                continue;
            };
            let entries = self.graph.node(node).entries();
            acc = Some(match acc {
                None => entries.clone(),
                Some(prev) => prev.intersection(entries).copied().collect(),
            });
        }
        acc.unwrap_or_default()
    }

    fn resolve_root(&self) -> Result<ResolvedView, KeywordFsError> {
        let root = self.graph.root();
        let mut listing: Vec<String> = self
            .graph
            .nodes()
            .map(|(_, node)| node.name().to_string())
            .collect();
        listing.extend(self.real_files(root)?);
        listing.push(".".to_string());
        listing.push("..".to_string());

        Ok(ResolvedView {
            canonical: root.to_path_buf(),
            listing,
            matches: Vec::new(),
        })
    }

    /// Names of the non-directory children of a real directory.
    fn real_files(&self, dir: &Path) -> Result<Vec<String>, KeywordFsError> {
        Ok(self
            .fs
            .list(dir)?
            .into_iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.name)
            .collect())
    }
}
