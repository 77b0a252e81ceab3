// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Storage registry: backend key to factory, resolved once at startup.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::config::JournalConfig;
use crate::errors::{JournalError, Result};
use crate::storage::{JournalStorage, MemoryStorage, SqliteStorage};

pub type StorageFactory =
    Arc<dyn Fn(JournalConfig) -> BoxFuture<'static, Result<Arc<dyn JournalStorage>>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StorageRegistry {
    factories: BTreeMap<String, StorageFactory>,
}

impl StorageRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// `sqlite` and `memory`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("sqlite", |config: JournalConfig| async move {
            let storage = SqliteStorage::open(&config.database_path, config.pool_size).await?;
            Ok(Arc::new(storage) as Arc<dyn JournalStorage>)
        });
        registry.register("memory", |_config: JournalConfig| async move {
            Ok(Arc::new(MemoryStorage::new()) as Arc<dyn JournalStorage>)
        });
        registry
    }

    /// Adds or replaces the factory for `key`.
    pub fn register<F, Fut>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(JournalConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn JournalStorage>>> + Send + 'static,
    {
        let factory: StorageFactory = Arc::new(move |config| factory(config).boxed());
        self.factories.insert(key.into(), factory);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the backend named by `config.backend`.
    pub async fn build(&self, config: &JournalConfig) -> Result<Arc<dyn JournalStorage>> {
        let factory = self.factories.get(&config.backend).ok_or_else(|| {
            let known: Vec<_> = self.keys().collect();
            JournalError::Config(format!(
                "unknown storage backend '{}' (known: {})",
                config.backend,
                known.join(", ")
            ))
        })?;
        let storage = factory(config.clone()).await?;
        tracing::info!("Storage backend '{}' ready", storage.backend());
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_backend_is_config_error() {
        let config = JournalConfig {
            backend: "postgres".into(),
            ..JournalConfig::default()
        };
        let err = StorageRegistry::with_defaults().build(&config).await.err().unwrap();
        assert!(matches!(err, JournalError::Config(ref msg) if msg.contains("memory, sqlite")));
    }

    #[tokio::test]
    async fn test_custom_factory_replaces_default() {
        let mut registry = StorageRegistry::with_defaults();
        registry.register("sqlite", |_config: JournalConfig| async move {
            Ok(Arc::new(MemoryStorage::new()) as Arc<dyn JournalStorage>)
        });
        let storage = registry.build(&JournalConfig::default()).await.unwrap();
        assert_eq!(storage.backend(), "memory");
    }

    #[tokio::test]
    async fn test_sqlite_factory_opens_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig {
            database_path: dir.path().join("journal.db"),
            pool_size: 2,
            ..JournalConfig::default()
        };
        let storage = StorageRegistry::with_defaults().build(&config).await.unwrap();
        assert_eq!(storage.backend(), "sqlite");
        assert!(config.database_path.exists());
    }
}
