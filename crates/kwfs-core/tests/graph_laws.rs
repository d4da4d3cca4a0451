//! Property tests for the keyword graph and the resolver.

use std::collections::BTreeSet;
use std::path::PathBuf;

use kwfs_core::{EntryId, KeywordGraph, MemoryFs, ResolutionEngine};
use proptest::prelude::*;

const WORDS: &[&str] = &["a", "b", "c", "dd", "eee"];

/// Relative directory paths built from a small vocabulary, so that
/// keywords collide across branches and levels.
fn tree_strategy() -> impl Strategy<Value = Vec<Vec<&'static str>>> {
    prop::collection::vec(
        prop::collection::vec(prop::sample::select(WORDS), 1..4),
        1..12,
    )
}

fn build(dirs: &[Vec<&str>]) -> (KeywordGraph, MemoryFs) {
    let fs = MemoryFs::new("/ref");
    for dir in dirs {
        fs.add_dir(PathBuf::from("/ref").join(dir.join("/")));
    }
    let mut graph = KeywordGraph::new("/ref");
    graph.scan(&fs).unwrap();
    (graph, fs)
}

fn check_symmetry(graph: &KeywordGraph) -> Result<(), TestCaseError> {
    for (entry_id, entry) in graph.entries() {
        for node_id in entry.nodes() {
            prop_assert!(graph.node(*node_id).entries().contains(&entry_id));
        }
    }
    for (node_id, node) in graph.nodes() {
        for entry_id in node.entries() {
            let entry = graph.entry(*entry_id);
            prop_assert!(entry.is_some());
            prop_assert!(entry.unwrap().nodes().contains(&node_id));
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_graph_symmetric_after_scan(dirs in tree_strategy()) {
        let (graph, _) = build(&dirs);
        check_symmetry(&graph)?;
    }

    #[test]
    fn prop_graph_symmetric_after_removals(dirs in tree_strategy(), picks in prop::collection::vec(any::<prop::sample::Index>(), 0..6)) {
        let (mut graph, _) = build(&dirs);
        for pick in picks {
            let ids: Vec<EntryId> = graph.entries().map(|(id, _)| id).collect();
            if ids.is_empty() {
                break;
            }
            graph.remove(ids[pick.index(ids.len())]);
            check_symmetry(&graph)?;
        }
    }

    #[test]
    fn prop_entry_tagged_with_its_segments(dirs in tree_strategy()) {
        let (graph, _) = build(&dirs);
        for (id, entry) in graph.entries() {
            let rel = entry.path().strip_prefix("/ref").unwrap();
            let expected: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let tags: Vec<String> = graph.tags(id).unwrap().into_iter().map(str::to_string).collect();
            prop_assert_eq!(tags, expected);
        }
    }

    #[test]
    fn prop_two_keywords_intersect(
        dirs in tree_strategy(),
        k1 in prop::sample::select(WORDS),
        k2 in prop::sample::select(WORDS),
    ) {
        let (graph, fs) = build(&dirs);
        let engine = ResolutionEngine::new(&graph, &fs, "@@");

        let (Some(n1), Some(n2)) = (graph.lookup_node(k1), graph.lookup_node(k2)) else {
            return Ok(());
        };
        let expected: BTreeSet<EntryId> = graph
            .node(n1)
            .entries()
            .intersection(graph.node(n2).entries())
            .copied()
            .collect();
        prop_assert_eq!(engine.matching_entries(&[k1, k2]), expected.clone());

        // Resolving [k1] and filtering by k2 gives the same directories.
        let narrowed: BTreeSet<PathBuf> = match engine.resolve(&format!("/{}", k1)) {
            Ok(view) => view
                .matches
                .iter()
                .filter(|p| p.strip_prefix("/ref").unwrap().iter().any(|s| s == k2))
                .cloned()
                .collect(),
            Err(_) => BTreeSet::new(),
        };
        let via_pair: BTreeSet<PathBuf> = match engine.resolve(&format!("/{}/{}", k1, k2)) {
            Ok(view) => view.matches.into_iter().collect(),
            Err(e) => {
                prop_assert!(e.is_not_found());
                BTreeSet::new()
            }
        };
        prop_assert_eq!(&narrowed, &via_pair);
        prop_assert_eq!(via_pair.len(), expected.len());
    }

    #[test]
    fn prop_canonical_is_shortest_match(dirs in tree_strategy(), k in prop::sample::select(WORDS)) {
        let (graph, fs) = build(&dirs);
        let engine = ResolutionEngine::new(&graph, &fs, "@@");
        if let Ok(view) = engine.resolve(&format!("/{}", k)) {
            prop_assert_eq!(&view.matches[0], &view.canonical);
            let shortest = view.matches.iter().map(|p| p.as_os_str().len()).min().unwrap();
            prop_assert_eq!(view.canonical.as_os_str().len(), shortest);
            prop_assert!(!view.lists(k));
        }
    }
}
