//! Content persistence providers.
//!
//! Serialized snapshots and bundle artifacts are stored per entity, one blob
//! per version key:
//!
//! - [`FilesystemPersistenceProvider`] writes
//!   `{base_path}/{entity_id}/{version}.snapshot` with atomic writes
//! - [`MemoryPersistenceProvider`] keeps blobs in a process-local map
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowreg_db::FilesystemPersistenceProvider;
//!
//! let provider = FilesystemPersistenceProvider::new("/var/flowreg/flow_storage");
//! provider.validate().await?;
//! provider.save_content(&flow_id, "1", &bytes).await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use flowreg_core::defaults::CONTENT_FILE_EXTENSION;
use flowreg_core::{Error, PersistenceProvider, Result};

/// Reject keys that could escape the entity directory.
fn check_segment(kind: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::InvalidInput(format!(
            "invalid {} for content storage: {:?}",
            kind, value
        )));
    }
    Ok(())
}

/// Filesystem persistence provider.
///
/// Path format: `{base_path}/{entity_id}/{version}.snapshot`
pub struct FilesystemPersistenceProvider {
    base_path: PathBuf,
}

impl FilesystemPersistenceProvider {
    /// Create a provider rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn entity_dir(&self, entity_id: &str) -> Result<PathBuf> {
        check_segment("entity id", entity_id)?;
        Ok(self.base_path.join(entity_id))
    }

    fn content_path(&self, entity_id: &str, version: &str) -> Result<PathBuf> {
        check_segment("version", version)?;
        Ok(self
            .entity_dir(entity_id)?
            .join(format!("{}.{}", version, CONTENT_FILE_EXTENSION)))
    }

    /// Validate that the provider can write, read, and delete content.
    ///
    /// Run once at startup so permission problems and missing mounts fail
    /// fast instead of on the first snapshot.
    pub async fn validate(&self) -> Result<()> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("write-check.tmp");

        fs::create_dir_all(&test_dir).await.map_err(|e| {
            Error::Persistence(format!("create_dir_all({:?}): {}", test_dir, e))
        })?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| Error::Persistence(format!("write({:?}): {}", test_file, e)))?;

        let read_back = fs::read(&test_file)
            .await
            .map_err(|e| Error::Persistence(format!("read({:?}): {}", test_file, e)))?;
        if read_back != data {
            return Err(Error::Persistence("read-back mismatch".to_string()));
        }

        fs::remove_file(&test_file).await.map_err(|e| {
            Error::Persistence(format!("remove_file({:?}): {}", test_file, e))
        })?;
        let _ = fs::remove_dir(&test_dir).await; // Best-effort cleanup

        Ok(())
    }
}

#[async_trait]
impl PersistenceProvider for FilesystemPersistenceProvider {
    fn provider_name(&self) -> &'static str {
        "filesystem"
    }

    async fn save_content(&self, entity_id: &str, version: &str, data: &[u8]) -> Result<()> {
        let full_path = self.content_path(entity_id, version)?;
        debug!(
            provider = "filesystem",
            entity_id,
            version,
            payload_len = data.len(),
            full_path = %full_path.display(),
            "file_storage: write"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "file_storage: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "file_storage: File::create failed");
            e
        })?;
        file.write_all(data).await.map_err(|e| {
            warn!(error = %e, "file_storage: write_all failed");
            e
        })?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "file_storage: rename failed");
            e
        })?;

        // rw-r--r--
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn get_content(&self, entity_id: &str, version: &str) -> Result<Vec<u8>> {
        let full_path = self.content_path(entity_id, version)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "content {} of entity {}",
                version, entity_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_content(&self, entity_id: &str, version: &str) -> Result<()> {
        let full_path = self.content_path(entity_id, version)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(&full_path).await?;
        }
        Ok(())
    }

    async fn delete_all_content(&self, entity_id: &str) -> Result<()> {
        let dir = self.entity_dir(entity_id)?;
        if fs::try_exists(&dir).await? {
            debug!(entity_id, dir = %dir.display(), "file_storage: remove entity dir");
            fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    async fn list_content_versions(&self, entity_id: &str) -> Result<Vec<String>> {
        let dir = self.entity_dir(entity_id)?;
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CONTENT_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                versions.push(stem.to_string());
            }
        }
        versions.sort_by(|a, b| version_order(a, b));
        Ok(versions)
    }
}

/// Numeric keys sort numerically, everything else lexically after them.
fn version_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// In-memory persistence provider.
#[derive(Debug, Default)]
pub struct MemoryPersistenceProvider {
    blobs: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryPersistenceProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Internal("Lock poisoned".into())
}

#[async_trait]
impl PersistenceProvider for MemoryPersistenceProvider {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn save_content(&self, entity_id: &str, version: &str, data: &[u8]) -> Result<()> {
        check_segment("entity id", entity_id)?;
        check_segment("version", version)?;
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        blobs
            .entry(entity_id.to_string())
            .or_default()
            .insert(version.to_string(), data.to_vec());
        Ok(())
    }

    async fn get_content(&self, entity_id: &str, version: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        blobs
            .get(entity_id)
            .and_then(|v| v.get(version))
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("content {} of entity {}", version, entity_id))
            })
    }

    async fn delete_content(&self, entity_id: &str, version: &str) -> Result<()> {
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        if let Some(versions) = blobs.get_mut(entity_id) {
            versions.remove(version);
            if versions.is_empty() {
                blobs.remove(entity_id);
            }
        }
        Ok(())
    }

    async fn delete_all_content(&self, entity_id: &str) -> Result<()> {
        self.blobs.write().map_err(poisoned)?.remove(entity_id);
        Ok(())
    }

    async fn list_content_versions(&self, entity_id: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        let mut versions: Vec<String> = blobs
            .get(entity_id)
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        versions.sort_by(|a, b| version_order(a, b));
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_filesystem_layout() {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path());

        provider.save_content("flow-1", "1", b"payload").await.unwrap();

        let expected = dir.path().join("flow-1").join("1.snapshot");
        assert!(expected.exists());
        assert!(!dir.path().join("flow-1").join("1.tmp").exists());
        assert_eq!(std::fs::read(expected).unwrap(), b"payload");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_filesystem_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path());
        provider.save_content("e", "1", b"x").await.unwrap();

        let mode = std::fs::metadata(dir.path().join("e").join("1.snapshot"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_filesystem_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path());
        provider.save_content("e", "1", b"old").await.unwrap();
        provider.save_content("e", "1", b"new").await.unwrap();
        assert_eq!(provider.get_content("e", "1").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_filesystem_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path());
        let err = provider.get_content("nope", "1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_filesystem_delete_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path());
        provider.delete_content("nope", "1").await.unwrap();
        provider.delete_all_content("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_list_versions_numeric_order() {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path());
        for v in ["10", "2", "1"] {
            provider.save_content("e", v, b"x").await.unwrap();
        }
        assert_eq!(
            provider.list_content_versions("e").await.unwrap(),
            vec!["1", "2", "10"]
        );

        provider.delete_all_content("e").await.unwrap();
        assert!(provider.list_content_versions("e").await.unwrap().is_empty());
        assert!(!dir.path().join("e").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path());
        for (entity, version) in [("..", "1"), ("a/b", "1"), ("e", "../x"), ("", "1")] {
            let err = provider
                .save_content(entity, version, b"x")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{entity}/{version}");
        }
    }

    #[tokio::test]
    async fn test_validate_round_trip() {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemPersistenceProvider::new(dir.path().join("nested"));
        provider.validate().await.unwrap();
        assert!(!dir.path().join("nested").join(".health-check").exists());
    }

    #[tokio::test]
    async fn test_memory_provider() {
        let provider = MemoryPersistenceProvider::new();
        assert_eq!(provider.provider_name(), "memory");

        provider.save_content("b", "1.1.0", b"nar").await.unwrap();
        provider.save_content("b", "1.0.0", b"nar").await.unwrap();
        assert_eq!(
            provider.list_content_versions("b").await.unwrap(),
            vec!["1.0.0", "1.1.0"]
        );

        provider.delete_content("b", "1.0.0").await.unwrap();
        assert!(matches!(
            provider.get_content("b", "1.0.0").await,
            Err(Error::NotFound(_))
        ));
        provider.delete_all_content("b").await.unwrap();
        assert!(provider.list_content_versions("b").await.unwrap().is_empty());
    }
}
