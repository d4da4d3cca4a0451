use kwfs_core::{KeywordFs, ResolvedView};

use crate::display_relative;

pub fn run(overlay: &KeywordFs, path: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let view = overlay.resolve(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*view)?);
    } else {
        print!("{}", render(overlay, &view));
    }

    Ok(())
}

fn render(overlay: &KeywordFs, view: &ResolvedView) -> String {
    let root = overlay.reference_root();
    let mut out = format!(
        "canonical: {}\nmatches ({}):\n",
        display_relative(&view.canonical, root),
        view.matches.len()
    );
    for m in &view.matches {
        out.push_str(&format!("  {}\n", display_relative(m, root)));
    }
    out.push_str(&format!("listing ({}):\n", view.listing.len()));
    for name in &view.listing {
        out.push_str(&format!("  {}\n", name));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwfs_core::MemoryFs;
    use std::sync::Arc;

    #[test]
    fn test_render_view() {
        let fs = Arc::new(MemoryFs::new("/ref"));
        fs.add_file("/ref/proj1/urgent/notes.txt")
            .add_file("/ref/proj2/urgent/plan.txt");
        let overlay = KeywordFs::new("/ref", fs).unwrap();

        let view = overlay.resolve("/urgent").unwrap();
        let text = render(&overlay, &view);

        assert!(text.starts_with("canonical: proj1/urgent\n"));
        assert!(text.contains("matches (2):\n  proj1/urgent\n  proj2/urgent\n"));
        assert!(text.contains("  notes.txt\n"));
        assert!(text.contains("  @@\n"));
    }
}
