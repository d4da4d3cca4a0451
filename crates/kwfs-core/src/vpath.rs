//! Helpers for virtual path strings.
//!
//! Virtual paths are `/`-separated keyword sequences as the kernel hands
//! them over. They are normalized to a leading slash, no trailing slash,
//! and no empty or `.` segments; that form is also the cache key.

/// Split a virtual path into its keyword segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Normalize a virtual path for consistent lookup.
pub fn normalize(path: &str) -> String {
    let segs = segments(path);
    if segs.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segs.join("/"))
    }
}

/// Whether the path denotes the mount root.
pub fn is_root(path: &str) -> bool {
    segments(path).is_empty()
}

/// Split into (parent, final name). `None` for the root.
pub fn split(path: &str) -> Option<(String, &str)> {
    let mut segs = segments(path);
    let name = segs.pop()?;
    let parent = if segs.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segs.join("/"))
    };
    Some((parent, name))
}

/// Parent of a virtual path; the root is its own parent.
pub fn parent(path: &str) -> String {
    split(path)
        .map(|(parent, _)| parent)
        .unwrap_or_else(|| "/".to_string())
}

/// Join a child name onto a virtual path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}
