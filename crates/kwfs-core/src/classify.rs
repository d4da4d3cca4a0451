use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use serde::Serialize;

use crate::realfs::RealFs;
use crate::resolve::ResolvedView;

/// What a child name inside a resolved virtual directory refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Classification {
    /// A regular file (or any non-directory) in the canonical directory.
    RealFile(PathBuf),
    /// A physical subdirectory of the canonical directory.
    RealSubdir(PathBuf),
    /// A keyword offered by the synthetic listing.
    VirtualKeyword,
    /// The escape link; carries the canonical directory it points at.
    LinkMarker(PathBuf),
    NotFound,
}

impl Classification {
    /// Real path behind the child, if it has one.
    pub fn real_path(&self) -> Option<&PathBuf> {
        match self {
            Classification::RealFile(p)
            | Classification::RealSubdir(p)
            | Classification::LinkMarker(p) => Some(p),
            Classification::VirtualKeyword | Classification::NotFound => None,
        }
    }

    /// Whether the child shows up as a directory.
    pub fn is_dir(&self) -> bool {
        matches!(
            self,
            Classification::RealSubdir(_) | Classification::VirtualKeyword
        )
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Classification::NotFound)
    }
}

/// Decides the kind of a child name in an already resolved parent.
///
/// Precedence: link marker, then physical children of the canonical
/// directory, then the synthetic listing.
pub struct PathClassifier<'a> {
    fs: &'a dyn RealFs,
    link_marker: &'a str,
}

impl<'a> PathClassifier<'a> {
    pub fn new(fs: &'a dyn RealFs, link_marker: &'a str) -> Self {
        PathClassifier { fs, link_marker }
    }

    pub fn classify(&self, parent: &ResolvedView, child: &str) -> io::Result<Classification> {
        if child == self.link_marker {
            return Ok(Classification::LinkMarker(parent.canonical.clone()));
        }

        if let Some(real) = self
            .fs
            .list(&parent.canonical)?
            .into_iter()
            .find(|e| e.name == child)
        {
            let path = parent.canonical.join(&real.name);
            return Ok(if real.is_dir {
                Classification::RealSubdir(path)
            } else {
                Classification::RealFile(path)
            });
        }

        if parent.lists(child) {
            return Ok(Classification::VirtualKeyword);
        }

        Ok(Classification::NotFound)
    }

    /// Classify every name of the view's listing in one pass over the
    /// canonical directory.
    pub fn classify_listing(&self, view: &ResolvedView) -> io::Result<Vec<(String, Classification)>> {
        let real: HashMap<String, bool> = self
            .fs
            .list(&view.canonical)?
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();

        let classified = view
            .listing
            .iter()
            .map(|name| {
                let kind = if name == self.link_marker {
                    Classification::LinkMarker(view.canonical.clone())
                } else {
                    match real.get(name) {
                        Some(true) => Classification::RealSubdir(view.canonical.join(name)),
                        Some(false) => Classification::RealFile(view.canonical.join(name)),
                        None => Classification::VirtualKeyword,
                    }
                };
                (name.clone(), kind)
            })
            .collect();
        Ok(classified)
    }
}
