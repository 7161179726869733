pub mod github;
pub mod local;

use crate::config::{DashboardConfig, SourceKind};
use crate::errors::AppResult;
use std::sync::Arc;

/// Result of a single read. Every failure collapses to `bytes: None` plus a status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub bytes: Option<Vec<u8>>,
    pub revision_hash: Option<String>,
    pub status: Option<String>,
}

impl FetchOutcome {
    pub fn found(bytes: Vec<u8>, revision_hash: Option<String>) -> Self {
        Self {
            bytes: Some(bytes),
            revision_hash,
            status: None,
        }
    }

    pub fn missing(status: impl Into<String>) -> Self {
        Self {
            bytes: None,
            revision_hash: None,
            status: Some(status.into()),
        }
    }

    pub fn is_found(&self) -> bool {
        self.bytes.is_some()
    }
}

pub trait BlobStore: Send + Sync {
    /// Reads `path` at `revision`. Never fails; at most one attempt per call.
    fn fetch(&self, path: &str, revision: &str) -> FetchOutcome;

    /// Replaces the content of `path` on `revision`.
    fn put(&self, path: &str, revision: &str, bytes: &[u8], message: &str) -> AppResult<()>;

    /// File names directly under `dir`, sorted. A missing directory lists as empty.
    fn list(&self, dir: &str, revision: &str) -> AppResult<Vec<String>>;

    /// Human-readable location of `path`, shown as the page's source caption.
    fn describe(&self, path: &str, revision: &str) -> String;

    /// Secrets this store sends over the wire, for status redaction.
    fn secrets(&self) -> Vec<String> {
        Vec::new()
    }
}

pub fn store_from_config(config: &DashboardConfig) -> AppResult<Arc<dyn BlobStore>> {
    match config.source {
        SourceKind::Github => Ok(Arc::new(github::GithubStore::new(config.github.clone())?)),
        SourceKind::Local => Ok(Arc::new(local::LocalStore::new(config.local_root.clone()))),
    }
}
