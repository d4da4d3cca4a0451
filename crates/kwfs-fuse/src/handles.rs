use std::collections::HashMap;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Real files opened through the mount, keyed by FUSE file handle.
///
/// Handle 0 is never issued; directories are opened with it.
pub struct HandleTable {
    next: AtomicU64,
    files: RwLock<HashMap<u64, Arc<File>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            next: AtomicU64::new(1),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Register an open file and return its handle.
    pub fn insert(&self, file: File) -> u64 {
        let fh = self.next.fetch_add(1, Ordering::Relaxed);
        self.files.write().insert(fh, Arc::new(file));
        fh
    }

    pub fn get(&self, fh: u64) -> Option<Arc<File>> {
        self.files.read().get(&fh).cloned()
    }

    /// Drop a handle. The file closes once no request still uses it.
    pub fn remove(&self, fh: u64) -> Option<Arc<File>> {
        self.files.write().remove(&fh)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
