use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Credential;

/// Storage seam for the credential.
///
/// The client itself does not know where credentials live (cookies, a session
/// table, memory); hosts inject whichever implementation fits their context.
/// The store only holds the credential for the duration of one logical
/// session.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self) -> Option<Credential>;
    async fn set(&self, credential: Credential);
    async fn clear(&self);
}

/// In-memory store, one credential per instance.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: RwLock::new(Some(credential)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self) -> Option<Credential> {
        self.inner.read().await.clone()
    }

    async fn set(&self, credential: Credential) {
        *self.inner.write().await = Some(credential);
    }

    async fn clear(&self) {
        *self.inner.write().await = None;
    }
}
