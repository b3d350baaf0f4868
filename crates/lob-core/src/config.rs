//! Resolved session configuration.
//!
//! Parsing the two-tier system/user config file and validating the process's
//! command line are both explicitly out of scope for the core (§1, §6): this
//! module only defines the record a session is built from, plus the one
//! piece of validation the spec assigns to the core itself — repo-path
//! safety (§6's `allow-absolute-paths` rule).

use std::path::{Path, PathBuf};

/// Default chunk size for a LOB: 16 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Default inbound delta size limit: 2 GiB.
pub const DEFAULT_DELTA_SIZE_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

/// Fully resolved, already-validated configuration for one session.
///
/// Everything downstream of [`ResolvedConfig::new`] can assume `base_path`
/// is absolute and `delta_cache_path` exists or can be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Absolute directory that is the root of the store namespace.
    pub base_path: PathBuf,
    /// Whether an absolute `repoPath` is accepted without rewriting.
    pub allow_absolute_paths: bool,
    /// Whether `UploadDelta` is accepted at all.
    pub enable_delta_receive: bool,
    /// Whether `DownloadDeltaPrepare`/`DownloadDeltaStart` are served.
    pub enable_delta_send: bool,
    /// Root directory of the delta cache.
    pub delta_cache_path: PathBuf,
    /// Maximum accepted inbound delta size, in bytes.
    pub delta_size_limit: u64,
    /// Process-wide chunk size; overridable only for tests.
    pub chunk_size: u64,
}

/// Why a repo path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoPathError {
    /// `repoPath` was absolute while `allow_absolute_paths` is `false`.
    #[error("repo path must not be absolute: {0}")]
    Absolute(String),
    /// `repoPath` contained a `..` component.
    #[error("repo path must not contain '..' components: {0}")]
    ParentTraversal(String),
}

impl ResolvedConfig {
    /// Builds a configuration from already-resolved values.
    ///
    /// `base_path` is required to be absolute; callers (the `lobd` binary)
    /// are expected to canonicalize it before calling this constructor.
    pub fn new(base_path: PathBuf, delta_cache_path: Option<PathBuf>) -> Self {
        let delta_cache_path = delta_cache_path.unwrap_or_else(|| base_path.join(".deltacache"));
        Self {
            base_path,
            allow_absolute_paths: false,
            enable_delta_receive: true,
            enable_delta_send: true,
            delta_cache_path,
            delta_size_limit: DEFAULT_DELTA_SIZE_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Validates a session's `repoPath` against §6's rule and returns the
    /// store root it resolves to (`base_path / repoPath`).
    pub fn resolve_store_root(&self, repo_path: &str) -> Result<PathBuf, RepoPathError> {
        let candidate = Path::new(repo_path);

        if candidate.is_absolute() && !self.allow_absolute_paths {
            return Err(RepoPathError::Absolute(repo_path.to_string()));
        }

        if candidate
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(RepoPathError::ParentTraversal(repo_path.to_string()));
        }

        Ok(if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_path.join(candidate)
        })
    }
}
