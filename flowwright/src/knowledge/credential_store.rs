//! Credential store: id and type indices with API fallback.

use std::sync::Arc;

use dashmap::DashMap;

use crate::flow::Credential;
use crate::platform::PlatformClient;

use super::snapshot::CredentialSnapshot;
use super::KnowledgeError;

/// Local credential snapshot keyed by both id and type.
pub struct CredentialStore {
    by_id: DashMap<String, Credential>,
    by_type: DashMap<String, Vec<Credential>>,
    platform: Arc<dyn PlatformClient>,
}

impl CredentialStore {
    pub fn new(platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            by_id: DashMap::new(),
            by_type: DashMap::new(),
            platform,
        }
    }

    pub fn from_snapshot(snapshot: CredentialSnapshot, platform: Arc<dyn PlatformClient>) -> Self {
        let store = Self::new(platform);
        for cred in snapshot.credentials {
            store.insert(cred);
        }
        store
    }

    pub fn insert(&self, cred: Credential) {
        self.by_type
            .entry(cred.kind.clone())
            .or_default()
            .retain(|c| c.id != cred.id);
        self.by_type
            .entry(cred.kind.clone())
            .or_default()
            .push(cred.clone());
        self.by_id.insert(cred.id.clone(), cred);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get_by_id(&self, id: &str) -> Option<Credential> {
        self.by_id.get(id).map(|c| c.value().clone())
    }

    pub fn get_by_type(&self, kind: &str) -> Vec<Credential> {
        self.by_type
            .get(kind)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    fn resolve_local(&self, spec: &str) -> Option<Credential> {
        if let Some(cred) = self.get_by_id(spec) {
            return Some(cred);
        }
        if let Some(cred) = self
            .by_id
            .iter()
            .find(|c| c.value().name == spec)
            .map(|c| c.value().clone())
        {
            return Some(cred);
        }
        self.get_by_type(spec).into_iter().next()
    }

    /// Resolves `spec` (an id, a name, or a credential type) locally, falling
    /// back to one API refresh before giving up.
    pub async fn resolve_or_repair(&self, spec: &str) -> Result<Credential, KnowledgeError> {
        if let Some(cred) = self.resolve_local(spec) {
            return Ok(cred);
        }
        let fetched = self
            .platform
            .list_credentials()
            .await
            .map_err(|e| KnowledgeError::CredentialUnresolved(format!("{}: {}", spec, e)))?;
        for cred in fetched {
            self.insert(cred);
        }
        self.resolve_local(spec)
            .ok_or_else(|| KnowledgeError::CredentialUnresolved(spec.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatform;

    fn cred(id: &str, name: &str, kind: &str) -> Credential {
        Credential {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// **Scenario**: resolve_or_repair matches by id, then name, then type, locally.
    #[tokio::test]
    async fn resolves_by_id_name_and_type() {
        let store = CredentialStore::new(Arc::new(MockPlatform::new()));
        store.insert(cred("cred-1", "My OpenAI Key", "openAIApi"));

        assert_eq!(store.resolve_or_repair("cred-1").await.unwrap().id, "cred-1");
        assert_eq!(
            store.resolve_or_repair("My OpenAI Key").await.unwrap().id,
            "cred-1"
        );
        assert_eq!(
            store.resolve_or_repair("openAIApi").await.unwrap().id,
            "cred-1"
        );
    }

    /// **Scenario**: A miss triggers one API refresh; unknown specs still fail.
    #[tokio::test]
    async fn miss_refreshes_from_api_once() {
        let platform = Arc::new(MockPlatform::new());
        platform.seed_credential("cred-9", "Fresh Key", "openAIApi");
        let store = CredentialStore::new(platform);

        let resolved = store.resolve_or_repair("openAIApi").await.unwrap();
        assert_eq!(resolved.id, "cred-9");
        assert!(store
            .resolve_or_repair("nonexistent-kind")
            .await
            .is_err());
    }

    /// **Scenario**: Re-inserting a credential does not duplicate the type index.
    #[test]
    fn reinsert_does_not_duplicate() {
        let store = CredentialStore::new(Arc::new(MockPlatform::new()));
        store.insert(cred("cred-1", "Key", "openAIApi"));
        store.insert(cred("cred-1", "Key Renamed", "openAIApi"));
        assert_eq!(store.get_by_type("openAIApi").len(), 1);
        assert_eq!(store.get_by_id("cred-1").unwrap().name, "Key Renamed");
    }
}
