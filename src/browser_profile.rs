//! Per-scan Chrome profile directories.
//!
//! Every scan gets its own UUID-named profile so concurrent tabs never
//! contend for the same `SingletonLock`, and a crashed worker's leftover
//! directories are reclaimed the next time one starts up.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// RAII handle for one scan's Chrome profile directory.
///
/// Removes the directory on drop unless `into_path()` was called first, so a
/// scan that panics mid-flight never leaves its profile behind in `temp`.
#[derive(Debug)]
pub struct ScanProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl ScanProfile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleanup_on_drop: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hands the directory to another owner, disabling this guard's cleanup.
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScanProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            info!("removing scan profile directory {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("failed to remove scan profile directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Allocates a fresh profile directory for one scan's browser, named
/// `pagescan_chrome_<uuid>`. `BrowserSession::run` calls this once per scan;
/// nothing else should construct a profile path by hand.
pub fn allocate_scan_profile() -> Result<ScanProfile> {
    allocate_scan_profile_with_prefix("pagescan_chrome")
}

/// Same as [`allocate_scan_profile`] but with a caller-chosen directory
/// prefix, for callers that need to distinguish their profiles from the
/// default scan-session ones (tests, alternate launch paths).
pub fn allocate_scan_profile_with_prefix(prefix: &str) -> Result<ScanProfile> {
    let path = std::env::temp_dir().join(format!("{prefix}_{}", Uuid::new_v4()));

    debug!("allocating scan profile directory: {}", path.display());

    // create_dir, not create_dir_all: fails on a UUID collision instead of
    // silently reusing an existing directory.
    std::fs::create_dir(&path).with_context(|| format!("failed to create profile directory: {}", path.display()))?;

    info!("allocated scan profile directory: {}", path.display());
    Ok(ScanProfile::new(path))
}

/// True if `profile_dir`'s `SingletonLock` points at a PID that no longer
/// exists — left behind by a worker process that was killed rather than
/// shut down cleanly, so the directory is safe to reclaim.
#[cfg(unix)]
fn is_profile_lock_stale(profile_dir: &Path) -> bool {
    let lock_path = profile_dir.join("SingletonLock");

    if !lock_path.exists() && !lock_path.is_symlink() {
        return true;
    }

    match std::fs::read_link(&lock_path) {
        // SingletonLock is a symlink with target "{hostname}-{pid}".
        Ok(target) => {
            let target_str = target.to_string_lossy();
            let Some(pid) = target_str.rsplit('-').next().and_then(|s| s.parse::<i32>().ok()) else {
                warn!("could not parse PID from SingletonLock target: {}", target_str);
                return false;
            };
            // kill(pid, 0) checks liveness without sending a signal.
            let running = unsafe { libc::kill(pid, 0) == 0 };
            if running {
                debug!("scan profile lock held by running pid {}", pid);
            }
            !running
        }
        Err(e) => {
            debug!("SingletonLock is not a symlink ({e}); treating as stale if present as a plain file");
            lock_path.is_file()
        }
    }
}

#[cfg(not(unix))]
fn is_profile_lock_stale(_profile_dir: &Path) -> bool {
    // No reliable liveness check outside unix; UUID-named directories mean
    // a false "stale" here only risks deleting an orphan, never a live one.
    true
}

/// Removes every scan profile directory left in `temp` whose browser process
/// is no longer running. Call once at worker startup, not mid-scan.
pub fn cleanup_stale_scan_profiles() -> Result<usize> {
    let temp_dir = std::env::temp_dir();
    let mut cleaned = 0;

    let entries = std::fs::read_dir(&temp_dir).with_context(|| format!("failed to read temp directory: {}", temp_dir.display()))?;

    for entry in entries.flatten() {
        let path = entry.path();

        let is_scan_profile = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with("pagescan_chrome_"));
        if !is_scan_profile || !path.is_dir() || !is_profile_lock_stale(&path) {
            continue;
        }

        if let Some(lock) = find_lock_file(&path) {
            let _ = std::fs::remove_file(&lock);
        }

        info!("cleaning stale scan profile: {}", path.display());
        match std::fs::remove_dir_all(&path) {
            Ok(()) => cleaned += 1,
            Err(e) => warn!("failed to remove stale scan profile {}: {}", path.display(), e),
        }
    }

    if cleaned > 0 {
        info!("cleaned {} stale scan profile directories", cleaned);
    }

    Ok(cleaned)
}

fn find_lock_file(profile_dir: &Path) -> Option<PathBuf> {
    let lock_path = profile_dir.join("SingletonLock");
    (lock_path.exists() || lock_path.is_symlink()).then_some(lock_path)
}
