//! Write access to the cluster resources the synchronizer persists.

use crate::core::domain::error::{SyncError, SyncResult};
use crate::core::domain::model::meta::ObjectMetaExt;
use crate::core::domain::model::resource::{Secret, SecretExt};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The collaborator store that owns secrets.
///
/// Reads used while decomposing come from an injected
/// [`crate::ResourceSnapshot`]; this trait covers the lookups and writes that
/// happen at save time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Looks up a secret by namespace and name.
    async fn secret(&self, namespace: &str, name: &str) -> SyncResult<Option<Secret>>;

    /// Creates or replaces a secret, returning the stored copy.
    async fn save_secret(&self, secret: Secret) -> SyncResult<Secret>;
}

/// A [`ResourceStore`] backed by process memory.
///
/// Cloning the store shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceStore {
    secrets: Arc<RwLock<BTreeMap<String, Secret>>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `secrets`.
    pub fn with_secrets(secrets: impl IntoIterator<Item = Secret>) -> Self {
        let map = secrets
            .into_iter()
            .map(|secret| (secret.id(), secret))
            .collect();
        Self {
            secrets: Arc::new(RwLock::new(map)),
        }
    }

    /// Returns every stored secret, ordered by id.
    pub async fn secrets(&self) -> Vec<Secret> {
        self.secrets.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn secret(&self, namespace: &str, name: &str) -> SyncResult<Option<Secret>> {
        let id = format!("{namespace}/{name}");
        Ok(self.secrets.read().await.get(&id).cloned())
    }

    async fn save_secret(&self, secret: Secret) -> SyncResult<Secret> {
        if secret.metadata.name_str().is_empty() {
            return Err(SyncError::Store("secret name is required".to_string()));
        }
        let mut lock = self.secrets.write().await;
        lock.insert(secret.id(), secret.clone());
        Ok(secret)
    }
}
