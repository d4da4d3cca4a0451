//! Unmount command for the keywordfs FUSE filesystem.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Unmount arguments.
pub struct UnmountArgs {
    /// Mount point path to unmount.
    pub mountpoint: PathBuf,
    /// Lazy unmount even if busy.
    pub force: bool,
}

/// Commands to try in order; the first that succeeds wins.
fn candidates(mountpoint: &Path, force: bool) -> Vec<Command> {
    let mut out = Vec::new();

    if cfg!(target_os = "linux") {
        let mut fusermount = Command::new("fusermount");
        fusermount.arg("-u");
        if force {
            fusermount.arg("-z");
        }
        fusermount.arg(mountpoint);
        out.push(fusermount);
    }

    let mut umount = Command::new("umount");
    if force {
        umount.arg(if cfg!(target_os = "linux") { "-l" } else { "-f" });
    }
    umount.arg(mountpoint);
    out.push(umount);

    out
}

/// Run the unmount command.
pub fn run(args: UnmountArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mountpoint = args
        .mountpoint
        .canonicalize()
        .unwrap_or_else(|_| args.mountpoint.clone());

    let mut last_error = String::from("no unmount command available");
    for mut cmd in candidates(&mountpoint, args.force) {
        let program = cmd.get_program().to_string_lossy().into_owned();
        match cmd.output() {
            Ok(out) if out.status.success() => {
                tracing::info!(mountpoint = %mountpoint.display(), program = %program, "unmounted");
                println!("Unmounted {}", mountpoint.display());
                return Ok(());
            }
            Ok(out) => {
                last_error = format!(
                    "{} failed: {}",
                    program,
                    String::from_utf8_lossy(&out.stderr).trim()
                );
            }
            Err(e) => last_error = format!("{} failed: {}", program, e),
        }
        tracing::debug!(program = %program, error = %last_error, "unmount attempt failed");
    }

    Err(last_error.into())
}
