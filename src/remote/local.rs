use super::{BlobStore, FetchOutcome};
use crate::errors::{AppError, AppResult};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Serves files from a directory on this machine. Revisions are ignored.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(AppError::Config(format!("path must stay under the local root: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalStore {
    fn fetch(&self, path: &str, _revision: &str) -> FetchOutcome {
        let full = match self.resolve(path) {
            Ok(full) => full,
            Err(error) => return FetchOutcome::missing(error.to_string()),
        };
        match fs::read(&full) {
            Ok(bytes) => FetchOutcome::found(bytes, None),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                FetchOutcome::missing(format!("{} not found", full.display()))
            }
            Err(error) => {
                tracing::warn!(path = %full.display(), error = %error, "local read failed");
                FetchOutcome::missing(AppError::from(error).to_string())
            }
        }
    }

    fn put(&self, path: &str, _revision: &str, bytes: &[u8], _message: &str) -> AppResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, bytes)?;
        tracing::info!(path = %full.display(), size = bytes.len(), "wrote local blob");
        Ok(())
    }

    fn list(&self, dir: &str, _revision: &str) -> AppResult<Vec<String>> {
        let full = self.resolve(dir)?;
        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn describe(&self, path: &str, _revision: &str) -> String {
        self.root.join(path).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::LocalStore;
    use crate::remote::BlobStore;

    #[test]
    fn round_trips_bytes_under_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        store
            .put("historical_data/history.db", "main", b"payload", "reset")
            .expect("put");
        let outcome = store.fetch("historical_data/history.db", "main");
        assert_eq!(outcome.bytes.as_deref(), Some(&b"payload"[..]));
        assert!(outcome.status.is_none());
    }

    #[test]
    fn missing_file_is_absent_with_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = LocalStore::new(dir.path()).fetch("nope.db", "main");
        assert!(!outcome.is_found());
        assert!(outcome.status.expect("status").contains("not found"));
    }

    #[test]
    fn lists_files_sorted_and_missing_dir_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        assert!(store.list("historical_data/archives", "main").expect("list").is_empty());

        for name in ["2024-05-02.csv", "2024-05-01.csv"] {
            store
                .put(&format!("historical_data/archives/{}", name), "main", b"ts\n", "seed")
                .expect("put");
        }
        std::fs::create_dir_all(dir.path().join("historical_data/archives/nested")).expect("mkdir");
        assert_eq!(
            store.list("historical_data/archives", "main").expect("list"),
            vec!["2024-05-01.csv".to_string(), "2024-05-02.csv".to_string()]
        );
    }

    #[test]
    fn refuses_paths_outside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        assert!(store.put("../escape.db", "main", b"x", "reset").is_err());
        assert!(!store.fetch("/etc/passwd", "main").is_found());
    }
}
