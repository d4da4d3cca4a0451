use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use kwfs_config::KeywordFsConfig;
use kwfs_core::KeywordFs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "kwfs", version, about = "keywordfs - browse a directory tree by keyword")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reference root to use instead of the configured one
    #[arg(short, long, global = true)]
    root: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the keyword view (blocks until unmounted)
    Mount {
        /// Real directory tree to tag
        reference_root: Option<String>,
        /// Where to mount the keyword view
        mountpoint: Option<String>,
        /// Reject every mutating request
        #[arg(long)]
        read_only: bool,
        /// Let other users access the mount
        #[arg(long)]
        allow_other: bool,
    },
    /// Unmount a keyword view
    Unmount {
        /// Mount point path
        mountpoint: PathBuf,
        /// Lazy unmount even if busy
        #[arg(short, long)]
        force: bool,
    },
    /// Show how a virtual path resolves
    Resolve {
        /// Virtual path, e.g. /urgent/proj1
        path: String,
        /// Print the resolved view as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a virtual directory with the kind of each entry
    Ls {
        /// Virtual path to list (defaults to /)
        path: Option<String>,
    },
    /// List keywords and the directories tagged with them
    Tags {
        /// Only show keywords no directory carries any more
        #[arg(long)]
        stale: bool,
    },
    /// Show effective configuration
    Config,
}

fn find_config() -> Option<PathBuf> {
    // 1. KWFS_CONFIG environment variable
    if let Ok(path) = std::env::var("KWFS_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. keywordfs.yaml in current directory
    let cwd_config = PathBuf::from("keywordfs.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. ~/.config/keywordfs/config.yaml
    if let Some(home) = dirs_next::home_dir() {
        let home_config = home.join(".config/keywordfs/config.yaml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load the config file if there is one; a bare command line is enough
/// when it names the reference root.
fn load_config(explicit: Option<PathBuf>) -> Result<KeywordFsConfig, Box<dyn std::error::Error>> {
    match explicit.or_else(find_config) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            Ok(KeywordFsConfig::from_file(&path)?)
        }
        None => Ok(KeywordFsConfig::default()),
    }
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "kwfs=info",
        1 => "kwfs=debug",
        _ => "kwfs=trace",
    }
}

fn init_tracing(verbose: u8) {
    // RUST_LOG wins unless -v was given.
    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(0)))
    } else {
        EnvFilter::new(default_filter(verbose))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn open_overlay(config: &KeywordFsConfig) -> Result<KeywordFs, Box<dyn std::error::Error>> {
    Ok(KeywordFs::from_config(config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config)?.with_overrides(cli.root, None);

    match cli.command {
        Commands::Mount {
            reference_root,
            mountpoint,
            read_only,
            allow_other,
        } => {
            let mut config = config.with_overrides(reference_root, mountpoint);
            config.mount.read_only |= read_only;
            config.mount.allow_other |= allow_other;
            commands::mount::run(config)?;
        }
        Commands::Unmount { mountpoint, force } => {
            commands::unmount::run(commands::unmount::UnmountArgs { mountpoint, force })?;
        }
        Commands::Resolve { path, json } => {
            let overlay = open_overlay(&config)?;
            commands::resolve::run(&overlay, &path, json)?;
        }
        Commands::Ls { path } => {
            let overlay = open_overlay(&config)?;
            commands::ls::run(&overlay, path)?;
        }
        Commands::Tags { stale } => {
            let overlay = open_overlay(&config)?;
            commands::tags::run(&overlay, stale)?;
        }
        Commands::Config => {
            commands::config::run(&config)?;
        }
    }

    Ok(())
}

/// Shorten `path` relative to `root` for display.
pub(crate) fn display_relative(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
