//! Explicit assembly of a registry from configuration.

use std::sync::Arc;

use tracing::info;

use flowreg_core::{flow_snapshot_serializer, PersistenceProvider, Result, RevisionManager};
use flowreg_db::{Database, FilesystemPersistenceProvider, MemoryPersistenceProvider};

use crate::config::{PersistenceBackend, RegistryConfig};
use crate::coordinator::RegistryCoordinator;

/// Build the content provider selected by `config`.
///
/// The filesystem provider is round-trip checked first when
/// `validate_storage` is set.
pub async fn build_persistence_provider(
    config: &RegistryConfig,
) -> Result<Arc<dyn PersistenceProvider>> {
    match config.persistence {
        PersistenceBackend::Filesystem => {
            let provider = FilesystemPersistenceProvider::new(&config.storage_dir);
            if config.validate_storage {
                provider.validate().await?;
                info!(
                    subsystem = "registry",
                    component = "factory",
                    provider = "filesystem",
                    storage_dir = %config.storage_dir.display(),
                    "Storage validation passed"
                );
            }
            Ok(Arc::new(provider))
        }
        PersistenceBackend::Memory => Ok(Arc::new(MemoryPersistenceProvider::new())),
    }
}

/// Assemble a coordinator over the given storage and the configured
/// content provider.
pub async fn build_registry_with(
    config: &RegistryConfig,
    db: Database,
) -> Result<Arc<RegistryCoordinator>> {
    config.validate()?;
    let content = build_persistence_provider(config).await?;
    let serializer = flow_snapshot_serializer()?;

    info!(
        subsystem = "registry",
        component = "factory",
        provider = content.provider_name(),
        data_model_version = serializer.current_version(),
        supported_versions = ?serializer.supported_versions(),
        "Registry assembled"
    );

    Ok(Arc::new(RegistryCoordinator::new(
        db.metadata,
        RevisionManager::new(db.revisions),
        content,
        serializer,
    )))
}

/// Assemble a coordinator with in-memory metadata and revision stores.
pub async fn build_registry(config: &RegistryConfig) -> Result<Arc<RegistryCoordinator>> {
    build_registry_with(config, Database::in_memory()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_registry() {
        let registry = build_registry(&RegistryConfig::in_memory()).await.unwrap();
        assert_eq!(registry.provider_name(), "memory");
        assert_eq!(registry.flow_serializer().current_version(), Some(2));
    }

    #[tokio::test]
    async fn test_filesystem_registry_validates_storage() {
        let dir = TempDir::new().unwrap();
        let config = RegistryConfig {
            persistence: PersistenceBackend::Filesystem,
            storage_dir: dir.path().join("flows"),
            validate_storage: true,
        };
        let registry = build_registry(&config).await.unwrap();
        assert_eq!(registry.provider_name(), "filesystem");
        assert!(dir.path().join("flows").exists());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = RegistryConfig {
            persistence: PersistenceBackend::Filesystem,
            storage_dir: PathBuf::new(),
            validate_storage: false,
        };
        assert!(matches!(
            build_registry(&config).await,
            Err(flowreg_core::Error::Config(_))
        ));
    }
}
