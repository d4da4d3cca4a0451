use kwfs_core::{Classification, KeywordFs};

pub fn run(overlay: &KeywordFs, path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.as_deref().unwrap_or("/");

    let entries = overlay.read_dir(path)?;

    for (name, kind) in &entries {
        println!("{}", format_entry(name, kind));
    }

    Ok(())
}

/// One line per entry: a type letter, then the name.
///
/// `k` marks a keyword, `d` a real subdirectory, `-` a file and `l` the
/// escape link, which also shows its target.
fn format_entry(name: &str, kind: &Classification) -> String {
    match kind {
        Classification::VirtualKeyword => format!("k  {}", name),
        Classification::RealSubdir(_) => format!("d  {}", name),
        Classification::RealFile(_) => format!("-  {}", name),
        Classification::LinkMarker(target) => format!("l  {} -> {}", name, target.display()),
        Classification::NotFound => format!("?  {}", name),
    }
}
