//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::{DeploymentId, DeploymentState};
use crate::error::Result;

/// Trait for state storage backends.
///
/// Saves use optimistic concurrency: `state.serial` must equal the serial
/// currently persisted for the deployment, otherwise the save is rejected
/// with [`crate::error::StateError::Stale`] and the stored state is left
/// untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the deployment state.
    ///
    /// Returns an empty state with serial 0 if nothing was saved yet.
    async fn load(&self, deployment: &DeploymentId) -> Result<DeploymentState>;

    /// Saves the deployment state atomically.
    ///
    /// Returns the new serial, which the caller must carry into its next save.
    async fn save(&self, deployment: &DeploymentId, state: &DeploymentState) -> Result<u64>;

    /// Deletes the deployment state.
    async fn delete(&self, deployment: &DeploymentId) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self, deployment: &DeploymentId) -> Result<bool>;

    /// Acquires the run lock for a deployment.
    async fn acquire_lock(&self, deployment: &DeploymentId, holder: &str) -> Result<LockInfo>;

    /// Releases the run lock if `lock_id` still owns it.
    async fn release_lock(&self, deployment: &DeploymentId, lock_id: &str) -> Result<()>;

    /// Removes the run lock regardless of its owner.
    async fn force_unlock(&self, deployment: &DeploymentId) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self, deployment: &DeploymentId) -> Result<Option<LockInfo>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self, deployment: &DeploymentId) -> Result<DeploymentState> {
        (**self).load(deployment).await
    }

    async fn save(&self, deployment: &DeploymentId, state: &DeploymentState) -> Result<u64> {
        (**self).save(deployment, state).await
    }

    async fn delete(&self, deployment: &DeploymentId) -> Result<()> {
        (**self).delete(deployment).await
    }

    async fn exists(&self, deployment: &DeploymentId) -> Result<bool> {
        (**self).exists(deployment).await
    }

    async fn acquire_lock(&self, deployment: &DeploymentId, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(deployment, holder).await
    }

    async fn release_lock(&self, deployment: &DeploymentId, lock_id: &str) -> Result<()> {
        (**self).release_lock(deployment, lock_id).await
    }

    async fn force_unlock(&self, deployment: &DeploymentId) -> Result<()> {
        (**self).force_unlock(deployment).await
    }

    async fn get_lock_info(&self, deployment: &DeploymentId) -> Result<Option<LockInfo>> {
        (**self).get_lock_info(deployment).await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
