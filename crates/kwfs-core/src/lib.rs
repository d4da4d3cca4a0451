//! Keyword graph and query resolution for keywordfs.
//!
//! Every directory under the reference root is tagged with the names of all
//! of its path segments. A virtual path such as `/urgent/proj1` selects the
//! directories carrying every one of those tags; the shortest of them backs
//! the virtual directory's files.

mod cache;
mod classify;
mod error;
mod graph;
mod keywordfs;
mod memory;
mod realfs;
mod resolve;
pub mod vpath;

pub use cache::{CacheStats, ResolutionCache};
pub use classify::{Classification, PathClassifier};
pub use error::KeywordFsError;
pub use graph::{DirectoryEntry, EntryId, KeywordGraph, KeywordNode, NodeId};
pub use keywordfs::{KeywordFs, KeywordSummary};
pub use memory::MemoryFs;
pub use realfs::{LocalFs, RealEntry, RealFs};
pub use resolve::{ResolutionEngine, ResolvedView};
