use std::path::{Path, PathBuf};
use std::sync::Arc;

use kwfs_config::{KeywordFsConfig, DEFAULT_LINK_MARKER};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::cache::{CacheStats, ResolutionCache};
use crate::classify::{Classification, PathClassifier};
use crate::error::KeywordFsError;
use crate::graph::KeywordGraph;
use crate::realfs::{LocalFs, RealFs};
use crate::resolve::{ResolutionEngine, ResolvedView};
use crate::vpath;

/// One keyword and the directories currently tagged with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordSummary {
    pub name: String,
    pub directories: Vec<PathBuf>,
}

impl KeywordSummary {
    pub fn is_stale(&self) -> bool {
        self.directories.is_empty()
    }
}

struct State {
    graph: KeywordGraph,
    cache: ResolutionCache,
}

/// The keyword overlay: graph, resolver and cache behind a single lock.
///
/// Every public method takes the lock for its whole duration, so callers
/// may share one instance across threads.
pub struct KeywordFs {
    root: PathBuf,
    link_marker: String,
    fs: Arc<dyn RealFs>,
    state: Mutex<State>,
}

impl KeywordFs {
    /// Build the overlay over `root`, scanning it once.
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn RealFs>) -> Result<Self, KeywordFsError> {
        let root = root.into();
        let mut graph = KeywordGraph::new(root.clone());
        graph.scan(fs.as_ref())?;

        Ok(KeywordFs {
            root,
            link_marker: DEFAULT_LINK_MARKER.to_string(),
            fs,
            state: Mutex::new(State {
                graph,
                cache: ResolutionCache::default(),
            }),
        })
    }

    /// Build the overlay described by a configuration, over the local disk.
    pub fn from_config(config: &KeywordFsConfig) -> Result<Self, KeywordFsError> {
        let config = config.effective();
        config.validate_or_err()?;
        let root = std::fs::canonicalize(config.reference_root()?)?;

        Ok(KeywordFs::new(root, Arc::new(LocalFs))?
            .with_link_marker(config.link_marker())
            .with_cache_enabled(config.cache.enabled))
    }

    pub fn with_link_marker(mut self, marker: impl Into<String>) -> Self {
        self.link_marker = marker.into();
        self.state.get_mut().cache.invalidate_all();
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.state.get_mut().cache = ResolutionCache::new(enabled);
        self
    }

    pub fn reference_root(&self) -> &Path {
        &self.root
    }

    pub fn link_marker(&self) -> &str {
        &self.link_marker
    }

    /// The storage this overlay reads and mutates.
    pub fn real_fs(&self) -> &dyn RealFs {
        self.fs.as_ref()
    }

    /// Scan the reference tree again, picking up directories created
    /// behind the overlay's back. Returns how many were new.
    #[instrument(skip(self))]
    pub fn rescan(&self) -> Result<usize, KeywordFsError> {
        let mut state = self.state.lock();
        let added = state.graph.scan(self.fs.as_ref())?;
        state.cache.invalidate_all();
        Ok(added)
    }

    /// Resolve a virtual path, going through the cache.
    pub fn resolve(&self, path: &str) -> Result<Arc<ResolvedView>, KeywordFsError> {
        let mut state = self.state.lock();
        self.resolve_locked(&mut state, path)
    }

    fn resolve_locked(
        &self,
        state: &mut State,
        path: &str,
    ) -> Result<Arc<ResolvedView>, KeywordFsError> {
        if let Some(view) = state.cache.get(path) {
            return Ok(view);
        }
        let engine = ResolutionEngine::new(&state.graph, self.fs.as_ref(), &self.link_marker);
        let view = Arc::new(engine.resolve(path)?);
        state.cache.put(path, Arc::clone(&view));
        Ok(view)
    }

    fn classifier(&self) -> PathClassifier<'_> {
        PathClassifier::new(self.fs.as_ref(), &self.link_marker)
    }

    fn classify_locked(
        &self,
        state: &mut State,
        parent: &str,
        child: &str,
    ) -> Result<Classification, KeywordFsError> {
        let view = match self.resolve_locked(state, parent) {
            Ok(view) => view,
            Err(KeywordFsError::NotFound(_)) => return Ok(Classification::NotFound),
            Err(e) => return Err(e),
        };
        Ok(self.classifier().classify(&view, child)?)
    }

    /// Classify `child` inside the virtual directory `parent`.
    ///
    /// An unresolvable parent classifies as `NotFound`.
    pub fn classify(&self, parent: &str, child: &str) -> Result<Classification, KeywordFsError> {
        let mut state = self.state.lock();
        self.classify_locked(&mut state, parent, child)
    }

    /// Classify a full virtual path. The root is a virtual directory.
    pub fn classify_path(&self, path: &str) -> Result<Classification, KeywordFsError> {
        match vpath::split(path) {
            None => Ok(Classification::VirtualKeyword),
            Some((parent, name)) => self.classify(&parent, name),
        }
    }

    /// Resolve a directory and classify each of its listed names.
    pub fn read_dir(&self, path: &str) -> Result<Vec<(String, Classification)>, KeywordFsError> {
        let view = self.resolve(path)?;
        Ok(self.classifier().classify_listing(&view)?)
    }

    /// Real path a file named by `path` has, or would have once created:
    /// the final component joined onto the parent's canonical directory.
    pub fn real_child_path(&self, path: &str) -> Result<PathBuf, KeywordFsError> {
        let (parent, name) =
            vpath::split(path).ok_or_else(|| KeywordFsError::IsDirectory("/".to_string()))?;
        let view = self.resolve(&parent)?;
        Ok(view.canonical.join(name))
    }

    /// Create a real directory behind a virtual path and tag it.
    ///
    /// Returns the real path created.
    #[instrument(skip(self))]
    pub fn create_dir(&self, path: &str, mode: u32) -> Result<PathBuf, KeywordFsError> {
        let (parent, name) =
            vpath::split(path).ok_or_else(|| KeywordFsError::AlreadyExists("/".to_string()))?;

        let mut state = self.state.lock();
        let parent_view = self.resolve_locked(&mut state, &parent)?;
        if self.classifier().classify(&parent_view, name)?.exists() {
            return Err(KeywordFsError::AlreadyExists(vpath::normalize(path)));
        }

        let real = parent_view.canonical.join(name);
        self.fs.create_dir(&real, mode)?;
        state.graph.insert(&real)?;
        state.cache.invalidate_all();

        info!(path = %path, real = %real.display(), "created directory");
        Ok(real)
    }

    /// Remove the real directory backing a virtual path and untag it.
    ///
    /// Returns the real path removed.
    #[instrument(skip(self))]
    pub fn remove_dir(&self, path: &str) -> Result<PathBuf, KeywordFsError> {
        let (parent, name) = vpath::split(path).ok_or_else(|| {
            KeywordFsError::PermissionDenied("cannot remove the mount root".to_string())
        })?;
        let not_found = || KeywordFsError::NotFound(vpath::normalize(path));

        let mut state = self.state.lock();
        match self.classify_locked(&mut state, &parent, name)? {
            Classification::RealSubdir(_) | Classification::VirtualKeyword => {}
            _ => return Err(not_found()),
        }

        let view = self.resolve_locked(&mut state, path)?;
        let id = state
            .graph
            .entry_by_path(&view.canonical)
            .ok_or_else(not_found)?;

        self.fs.remove_dir(&view.canonical)?;
        state.graph.remove(id);
        state.cache.invalidate_all();

        info!(path = %path, real = %view.canonical.display(), "removed directory");
        Ok(view.canonical.clone())
    }

    /// Note that a file was created at `path`.
    pub fn on_create_file(&self, path: &str) {
        let parent = vpath::parent(path);
        debug!(path = %path, parent = %parent, "file created");
        self.state.lock().cache.invalidate(&parent);
    }

    /// Note that the file at `path` was removed.
    pub fn on_remove_file(&self, path: &str) {
        let parent = vpath::parent(path);
        debug!(path = %path, parent = %parent, "file removed");
        self.state.lock().cache.invalidate(&parent);
    }

    /// Drop every cached resolution.
    pub fn invalidate_all(&self) {
        self.state.lock().cache.invalidate_all();
    }

    /// Every keyword in registration order.
    pub fn keywords(&self) -> Vec<KeywordSummary> {
        let state = self.state.lock();
        let graph = &state.graph;
        graph
            .nodes()
            .map(|(_, node)| KeywordSummary {
                name: node.name().to_string(),
                directories: node
                    .entries()
                    .iter()
                    .filter_map(|id| graph.entry(*id))
                    .map(|e| e.path().to_path_buf())
                    .collect(),
            })
            .collect()
    }

    /// Keywords a registered real directory is tagged with, root-most first.
    pub fn tags_of(&self, dir: &Path) -> Option<Vec<String>> {
        let state = self.state.lock();
        let id = state.graph.entry_by_path(dir)?;
        state
            .graph
            .tags(id)
            .map(|tags| tags.into_iter().map(str::to_string).collect())
    }

    pub fn directory_count(&self) -> usize {
        self.state.lock().graph.entry_count()
    }

    pub fn keyword_count(&self) -> usize {
        self.state.lock().graph.node_count()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.lock().cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;

    fn overlay() -> (KeywordFs, Arc<MemoryFs>) {
        let fs = Arc::new(MemoryFs::new("/ref"));
        fs.add_file("/ref/proj1/urgent/notes.txt")
            .add_file("/ref/proj2/urgent/plan.txt")
            .add_file("/ref/readme.md");
        let kfs = KeywordFs::new("/ref", fs.clone()).unwrap();
        (kfs, fs)
    }

    #[test]
    fn test_resolve_is_cached() {
        let (kfs, _) = overlay();
        let first = kfs.resolve("/urgent").unwrap();
        let second = kfs.resolve("/urgent/").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = kfs.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_disabled_cache_resolves_fresh() {
        let (kfs, _) = overlay();
        let kfs = kfs.with_cache_enabled(false);
        let first = kfs.resolve("/urgent").unwrap();
        let second = kfs.resolve("/urgent").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
        assert_eq!(kfs.cache_stats().hits, 0);
    }

    #[test]
    fn test_classify_unresolvable_parent() {
        let (kfs, _) = overlay();
        assert_eq!(
            kfs.classify("/proj1/proj2", "x").unwrap(),
            Classification::NotFound
        );
        assert_eq!(kfs.classify_path("/").unwrap(), Classification::VirtualKeyword);
    }

    #[test]
    fn test_custom_link_marker() {
        let (kfs, _) = overlay();
        let kfs = kfs.with_link_marker("_real");

        let view = kfs.resolve("/proj2").unwrap();
        assert!(view.lists("_real"));
        assert!(!view.lists("@@"));
        assert_eq!(
            kfs.classify_path("/proj2/_real").unwrap(),
            Classification::LinkMarker(PathBuf::from("/ref/proj2"))
        );
    }

    #[test]
    fn test_create_dir_tags_and_flushes() {
        let (kfs, fs) = overlay();
        kfs.resolve("/urgent").unwrap();

        let real = kfs.create_dir("/urgent/review", 0o755).unwrap();
        assert_eq!(real, PathBuf::from("/ref/proj1/urgent/review"));
        assert_eq!(fs.is_dir(&real), Some(true));
        assert_eq!(
            kfs.tags_of(&real).unwrap(),
            vec!["proj1", "urgent", "review"]
        );
        assert_eq!(kfs.cache_stats().entries, 0);

        let view = kfs.resolve("/review").unwrap();
        assert_eq!(view.canonical, real);
    }

    #[test]
    fn test_create_dir_rejects_existing_names() {
        let (kfs, _) = overlay();
        for path in ["/", "/urgent/proj2", "/urgent/notes.txt", "/urgent/@@", "/proj1/urgent"] {
            assert!(
                matches!(kfs.create_dir(path, 0o755), Err(KeywordFsError::AlreadyExists(_))),
                "{} should already exist",
                path
            );
        }
    }

    #[test]
    fn test_create_dir_under_missing_parent() {
        let (kfs, _) = overlay();
        assert!(kfs.create_dir("/proj1/proj2/new", 0o755).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_dir_untags() {
        let (kfs, fs) = overlay();
        fs.remove_file("/ref/proj1/urgent/notes.txt").unwrap();

        let real = kfs.remove_dir("/proj1/urgent").unwrap();
        assert_eq!(real, PathBuf::from("/ref/proj1/urgent"));
        assert_eq!(fs.is_dir(&real), None);
        assert_eq!(kfs.tags_of(&real), None);

        let urgent = kfs.resolve("/urgent").unwrap();
        assert_eq!(urgent.matches, vec![PathBuf::from("/ref/proj2/urgent")]);
    }

    #[test]
    fn test_remove_dir_failures_leave_state() {
        let (kfs, _) = overlay();

        assert!(matches!(
            kfs.remove_dir("/"),
            Err(KeywordFsError::PermissionDenied(_))
        ));
        assert!(kfs.remove_dir("/nothing").unwrap_err().is_not_found());
        assert!(kfs.remove_dir("/urgent/notes.txt").unwrap_err().is_not_found());

        // Not empty: the storage error comes back and the tag stays.
        let before = kfs.directory_count();
        assert!(matches!(
            kfs.remove_dir("/proj1/urgent"),
            Err(KeywordFsError::Io(_))
        ));
        assert_eq!(kfs.directory_count(), before);
        assert!(kfs.tags_of(Path::new("/ref/proj1/urgent")).is_some());
    }

    #[test]
    fn test_file_hooks_invalidate_parent_only() {
        let (kfs, fs) = overlay();
        kfs.resolve("/urgent").unwrap();
        kfs.resolve("/proj2").unwrap();

        fs.add_file("/ref/proj1/urgent/todo.txt");
        kfs.on_create_file("/urgent/todo.txt");

        assert!(kfs.resolve("/urgent").unwrap().lists("todo.txt"));
        let stats = kfs.cache_stats();
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.entries, 2);

        fs.remove_file("/ref/proj1/urgent/todo.txt").unwrap();
        kfs.on_remove_file("/urgent/todo.txt");
        assert!(!kfs.resolve("/urgent").unwrap().lists("todo.txt"));
    }

    #[test]
    fn test_real_child_path() {
        let (kfs, _) = overlay();
        assert_eq!(
            kfs.real_child_path("/urgent/new.txt").unwrap(),
            PathBuf::from("/ref/proj1/urgent/new.txt")
        );
        assert_eq!(
            kfs.real_child_path("/readme.md").unwrap(),
            PathBuf::from("/ref/readme.md")
        );
        assert!(matches!(
            kfs.real_child_path("/"),
            Err(KeywordFsError::IsDirectory(_))
        ));
    }

    #[test]
    fn test_keywords_report_stale_nodes() {
        let (kfs, fs) = overlay();
        fs.remove_file("/ref/proj2/urgent/plan.txt").unwrap();
        kfs.remove_dir("/proj2/urgent").unwrap();
        fs.remove_file("/ref/proj1/urgent/notes.txt").unwrap();
        kfs.remove_dir("/proj1/urgent").unwrap();

        let urgent = kfs
            .keywords()
            .into_iter()
            .find(|k| k.name == "urgent")
            .unwrap();
        assert!(urgent.is_stale());
        // Stale keywords still show at the root.
        assert!(kfs.resolve("/").unwrap().lists("urgent"));
        assert!(kfs.resolve("/urgent").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rescan_picks_up_outside_changes() {
        let (kfs, fs) = overlay();
        kfs.resolve("/").unwrap();
        fs.add_dir("/ref/archive/2020");

        assert_eq!(kfs.rescan().unwrap(), 2);
        assert!(kfs.resolve("/").unwrap().lists("archive"));
    }
}
