use kwfs_core::{KeywordFs, KeywordSummary};

use crate::display_relative;

pub fn run(overlay: &KeywordFs, stale_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let keywords = select(overlay.keywords(), stale_only);

    if keywords.is_empty() {
        println!("(none)");
        return Ok(());
    }

    let root = overlay.reference_root();
    for keyword in keywords {
        println!("{} ({})", keyword.name, keyword.directories.len());
        for dir in &keyword.directories {
            println!("  {}", display_relative(dir, root));
        }
    }

    Ok(())
}

fn select(mut keywords: Vec<KeywordSummary>, stale_only: bool) -> Vec<KeywordSummary> {
    if stale_only {
        keywords.retain(KeywordSummary::is_stale);
    }
    keywords.sort_by(|a, b| a.name.cmp(&b.name));
    keywords
}
