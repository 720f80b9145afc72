//! Versioned prompt storage.

use super::ConfigSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// One prompt template version for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: Uuid,
    /// Free-form label such as `v1.0`.
    pub version: String,
    /// Language code such as `es` or `en`.
    pub language: String,
    pub content: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Prompt version management. At most one version per language is active.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Store a new version, inactive unless `activate` is set.
    async fn create_version(
        &self,
        version: &str,
        language: &str,
        content: &str,
        activate: bool,
    ) -> crate::Result<PromptVersion>;

    /// Activate `version`, deactivating every other version of the language.
    /// Returns `None` when the version does not exist; the language is then
    /// left without an active prompt.
    async fn activate_version(&self, version: &str, language: &str) -> crate::Result<Option<PromptVersion>>;

    async fn active_prompt(&self, language: &str) -> crate::Result<Option<PromptVersion>>;

    async fn get_version(&self, version: &str, language: &str) -> crate::Result<Option<PromptVersion>>;

    /// Newest first, optionally filtered by language.
    async fn list_versions(&self, language: Option<&str>) -> crate::Result<Vec<PromptVersion>>;
}

/// In-process prompt store.
#[derive(Default)]
pub struct PromptRegistry {
    versions: RwLock<Vec<PromptVersion>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromptStore for PromptRegistry {
    async fn create_version(
        &self,
        version: &str,
        language: &str,
        content: &str,
        activate: bool,
    ) -> crate::Result<PromptVersion> {
        let now = Utc::now();
        let created = PromptVersion {
            id: Uuid::new_v4(),
            version: version.to_string(),
            language: language.to_string(),
            content: content.to_string(),
            active: false,
            created_at: now,
            updated_at: now,
        };
        self.versions.write().await.push(created.clone());
        if activate {
            if let Some(active) = self.activate_version(version, language).await? {
                return Ok(active);
            }
        }
        info!(version = version, language = language, active = activate, "prompt version created");
        Ok(created)
    }

    async fn activate_version(&self, version: &str, language: &str) -> crate::Result<Option<PromptVersion>> {
        let mut versions = self.versions.write().await;
        let now = Utc::now();
        let mut activated = None;
        // Latest entry wins when a label was stored twice.
        for p in versions.iter_mut().rev().filter(|p| p.language == language) {
            let target = activated.is_none() && p.version == version;
            if p.active != target {
                p.active = target;
                p.updated_at = now;
            }
            if target {
                activated = Some(p.clone());
            }
        }
        match &activated {
            Some(_) => info!(version = version, language = language, "prompt version activated"),
            None => warn!(version = version, language = language, "prompt version not found"),
        }
        Ok(activated)
    }

    async fn active_prompt(&self, language: &str) -> crate::Result<Option<PromptVersion>> {
        Ok(self
            .versions
            .read()
            .await
            .iter()
            .rev()
            .find(|p| p.language == language && p.active)
            .cloned())
    }

    async fn get_version(&self, version: &str, language: &str) -> crate::Result<Option<PromptVersion>> {
        Ok(self
            .versions
            .read()
            .await
            .iter()
            .rev()
            .find(|p| p.language == language && p.version == version)
            .cloned())
    }

    async fn list_versions(&self, language: Option<&str>) -> crate::Result<Vec<PromptVersion>> {
        Ok(self
            .versions
            .read()
            .await
            .iter()
            .rev()
            .filter(|p| language.map_or(true, |l| p.language == l))
            .cloned()
            .collect())
    }
}

/// Keyed by language code; yields the active prompt's content.
#[async_trait]
impl ConfigSource for PromptRegistry {
    async fn fetch(&self, key: &str) -> crate::Result<Option<String>> {
        Ok(self.active_prompt(key).await?.map(|p| p.content))
    }
}
