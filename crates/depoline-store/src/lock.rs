//! PID lock preventing two runs against the same state directory

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Held for the lifetime of a run; the file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    match holder {
                        Some(pid) if is_alive(pid) => bail!(
                            "another run (pid {pid}) holds {}; wait for it or remove the lock",
                            path.display()
                        ),
                        Some(pid) => {
                            log::warn!("reclaiming stale lock {} (pid {pid})", path.display());
                            fs::remove_file(path).with_context(|| {
                                format!("failed to remove stale lock {}", path.display())
                            })?;
                        }
                        None => bail!(
                            "lock file {} exists but is unreadable; remove it if no run is active",
                            path.display()
                        ),
                    }
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to create lock {}", path.display()));
                }
            }
        }
        bail!("could not acquire lock {}", path.display())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to release lock {}: {e}", self.path.display());
        }
    }
}

/// Liveness is only knowable on Linux; elsewhere every lock is treated as held.
fn is_alive(pid: u32) -> bool {
    if cfg!(target_os = "linux") {
        pid == std::process::id() || Path::new(&format!("/proc/{pid}")).exists()
    } else {
        true
    }
}
