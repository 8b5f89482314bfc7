//! Watches username/password files for changes between intervals via SHA-256 hashing.
//!
//! Hash-based detection is deliberate: mtime resolution is too coarse on some
//! filesystems and can miss appends within the same second.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

pub type FileHash = [u8; 32];

/// Tracks the last-seen hash of one file and reloads its contents on change.
#[derive(Debug, Default, Clone)]
pub struct FileWatcher {
    last_hash: Option<FileHash>,
}

impl FileWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_hash(&self) -> Option<FileHash> {
        self.last_hash
    }

    /// Hashes `path` and, if the hash changed, returns the freshly split lines.
    ///
    /// Missing files are tolerated: the previous hash is kept and `None` is returned.
    pub fn refresh(&mut self, path: &Path) -> Option<Vec<String>> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(_) => return None,
        };

        let hash: FileHash = Sha256::digest(&bytes).into();
        if self.last_hash == Some(hash) {
            return None;
        }
        self.last_hash = Some(hash);

        let text = String::from_utf8_lossy(&bytes);
        Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unchanged_file_yields_no_refresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.txt");
        fs::write(&path, "alice\nbob\n").unwrap();

        let mut watcher = FileWatcher::new();
        let first = watcher.refresh(&path);
        assert!(first.is_some());
        let hash_after_first = watcher.last_hash();

        let second = watcher.refresh(&path);
        assert!(second.is_none());
        assert_eq!(watcher.last_hash(), hash_after_first);
    }

    #[test]
    fn mutated_file_yields_new_hash_and_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.txt");
        fs::write(&path, "alice\n").unwrap();

        let mut watcher = FileWatcher::new();
        let first_hash = {
            watcher.refresh(&path);
            watcher.last_hash()
        };

        fs::write(&path, "alice\nbob\ncarol\n").unwrap();
        let updated = watcher.refresh(&path).unwrap();
        assert_eq!(updated, vec!["alice", "bob", "carol"]);
        assert_ne!(watcher.last_hash(), first_hash);
    }

    #[test]
    fn missing_file_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        let mut watcher = FileWatcher::new();
        assert!(watcher.refresh(&path).is_none());
        assert!(watcher.last_hash().is_none());
    }
}
