//! On-disk delta cache, keyed by `<baseSHA>_<targetSHA>` (§3).
//!
//! The cache is flat — one file per pair, directly under its root — and
//! advisory: every entry can be regenerated from the two LOBs it was
//! derived from, so a missing or corrupt entry is never itself an error
//! condition for callers; see [`exchange::generate_delta`](crate::exchange::generate_delta).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A flat, regenerable directory of cached delta files.
#[derive(Debug, Clone)]
pub struct DeltaCache {
    root: PathBuf,
}

impl DeltaCache {
    /// Opens a cache rooted at `root`. Does not create `root`; installing an
    /// entry creates it on demand.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The cache's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical on-disk path for the `(base_sha, target_sha)` entry.
    #[must_use]
    pub fn path(&self, base_sha: &str, target_sha: &str) -> PathBuf {
        self.root.join(format!("{base_sha}_{target_sha}"))
    }

    /// Loads a cached entry, if present. A missing file is `Ok(None)`, not
    /// an error — the cache is advisory.
    pub fn load(&self, base_sha: &str, target_sha: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path(base_sha, target_sha)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Installs `bytes` as the `(base_sha, target_sha)` entry via
    /// temp-file-then-rename. Callers are expected to ignore the error a
    /// failed install returns (§4.E: "ignore errors — a missing cache entry
    /// is non-fatal because it can be regenerated"); it is still reported so
    /// callers that want to log it can.
    pub fn install(&self, base_sha: &str, target_sha: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        temp.write_all(bytes)?;
        temp.persist(self.path(base_sha, target_sha))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_returns_none_when_entry_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeltaCache::new(dir.path().to_path_buf());
        assert!(cache.load("base", "target").unwrap().is_none());
    }

    #[test]
    fn install_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeltaCache::new(dir.path().to_path_buf());
        cache.install("base", "target", b"delta bytes").unwrap();
        assert_eq!(
            cache.load("base", "target").unwrap().unwrap(),
            b"delta bytes"
        );
    }

    #[test]
    fn path_uses_underscore_separated_key() {
        let cache = DeltaCache::new(PathBuf::from("/srv/lobs/.deltacache"));
        assert_eq!(
            cache.path("abc", "def"),
            PathBuf::from("/srv/lobs/.deltacache/abc_def")
        );
    }

    #[test]
    fn install_creates_missing_root_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("cache");
        let cache = DeltaCache::new(root);
        cache.install("a", "b", b"x").unwrap();
        assert_eq!(cache.load("a", "b").unwrap().unwrap(), b"x");
    }
}
