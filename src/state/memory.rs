//! In-process state storage backend.
//!
//! Nothing survives the process. Used when embedding the engine and by tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CairnError, Result, StateError};

use super::lock::{LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::{DeploymentId, DeploymentState};

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<DeploymentId, DeploymentState>,
    locks: HashMap<DeploymentId, LockInfo>,
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, deployment: &DeploymentId) -> Result<DeploymentState> {
        let inner = self.inner.lock().await;
        Ok(inner
            .states
            .get(deployment)
            .cloned()
            .unwrap_or_else(|| DeploymentState::new(deployment.clone())))
    }

    async fn save(&self, deployment: &DeploymentId, state: &DeploymentState) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let persisted = inner.states.get(deployment).map_or(0, |s| s.serial);

        if persisted != state.serial {
            return Err(CairnError::State(StateError::Stale {
                deployment: deployment.to_string(),
                expected: state.serial,
                found: persisted,
            }));
        }

        let mut next = state.clone();
        next.serial = persisted + 1;
        let serial = next.serial;
        inner.states.insert(deployment.clone(), next);

        debug!("Saved in-memory state for {deployment} at serial {serial}");
        Ok(serial)
    }

    async fn delete(&self, deployment: &DeploymentId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.states.remove(deployment);
        inner.locks.remove(deployment);
        Ok(())
    }

    async fn exists(&self, deployment: &DeploymentId) -> Result<bool> {
        Ok(self.inner.lock().await.states.contains_key(deployment))
    }

    async fn acquire_lock(&self, deployment: &DeploymentId, holder: &str) -> Result<LockInfo> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.locks.get(deployment)
            && !existing.is_expired()
        {
            return Err(CairnError::State(StateError::LockedByOther {
                holder: existing.holder.clone(),
                since: existing.acquired_at.to_rfc3339(),
            }));
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        inner.locks.insert(deployment.clone(), lock_info.clone());
        Ok(lock_info)
    }

    async fn release_lock(&self, deployment: &DeploymentId, lock_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .locks
            .get(deployment)
            .is_some_and(|existing| existing.lock_id == lock_id)
        {
            inner.locks.remove(deployment);
        }
        Ok(())
    }

    async fn force_unlock(&self, deployment: &DeploymentId) -> Result<()> {
        self.inner.lock().await.locks.remove(deployment);
        Ok(())
    }

    async fn get_lock_info(&self, deployment: &DeploymentId) -> Result<Option<LockInfo>> {
        Ok(self.inner.lock().await.locks.get(deployment).cloned())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serials_advance() {
        let store = MemoryStateStore::new();
        let id = DeploymentId::new("demo", "dev");

        let mut state = store.load(&id).await.expect("load");
        state.serial = store.save(&id, &state).await.expect("save");
        state.serial = store.save(&id, &state).await.expect("save");

        assert_eq!(state.serial, 2);
        assert!(store.exists(&id).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_stale_save_rejected() {
        let store = MemoryStateStore::new();
        let id = DeploymentId::new("demo", "dev");

        let stale = store.load(&id).await.expect("load");
        store.save(&id, &stale).await.expect("first save");

        assert!(matches!(
            store.save(&id, &stale).await,
            Err(CairnError::State(StateError::Stale { .. }))
        ));
    }

    #[tokio::test]
    async fn test_lock_release_requires_owner() {
        let store = MemoryStateStore::new();
        let id = DeploymentId::new("demo", "dev");

        let lock = store.acquire_lock(&id, "a").await.expect("lock");
        store.release_lock(&id, "someone-else").await.expect("release");
        assert!(store.acquire_lock(&id, "b").await.is_err());

        store.release_lock(&id, &lock.lock_id).await.expect("release");
        assert!(store.acquire_lock(&id, "b").await.is_ok());
    }
}
