//! Persistent session profile wrapper.
//!
//! The profile directory is created and populated by the external login
//! flow. The core only inspects it; it never writes to or deletes it.

use std::path::{Path, PathBuf};

use tracing::debug;

/// On-disk status of a session profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    Missing,
    /// Present but below the minimum populated size (bytes observed).
    Undersized(u64),
    /// Present and large enough to plausibly hold a login (bytes observed).
    Populated(u64),
}

/// Read-only view over a persistent browser profile directory.
pub struct SessionStore {
    profile_dir: PathBuf,
    min_bytes: u64,
}

impl SessionStore {
    pub fn new(profile_dir: impl Into<PathBuf>, min_bytes: u64) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            min_bytes,
        }
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Classify the profile by existence and total on-disk size.
    pub fn status(&self) -> ProfileStatus {
        if !self.profile_dir.is_dir() {
            return ProfileStatus::Missing;
        }
        let size = dir_size(&self.profile_dir);
        debug!(path = %self.profile_dir.display(), size_bytes = size, "profile scan");
        if size < self.min_bytes {
            ProfileStatus::Undersized(size)
        } else {
            ProfileStatus::Populated(size)
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    let mut total = 0u64;
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            total += dir_size(&entry_path);
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_dir_is_missing() {
        let store = SessionStore::new("/nonexistent/profile/dir", 1024);
        assert_eq!(store.status(), ProfileStatus::Missing);
    }

    #[test]
    fn small_dir_is_undersized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cookies"), b"tiny").unwrap();
        let store = SessionStore::new(dir.path(), 1024);
        assert!(matches!(store.status(), ProfileStatus::Undersized(4)));
    }

    #[test]
    fn populated_dir_counts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Default");
        std::fs::create_dir(&nested).unwrap();
        let mut f = std::fs::File::create(nested.join("Cookies")).unwrap();
        f.write_all(&vec![0u8; 2048]).unwrap();
        let store = SessionStore::new(dir.path(), 1024);
        assert!(matches!(store.status(), ProfileStatus::Populated(2048)));
    }
}
