//! Local file-based state storage backend.
//!
//! Each deployment lives in its own directory:
//! `<base>/<project>/<environment>/state.json`, with `state.lock` next to it
//! while a run holds the deployment.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{CairnError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::{DeploymentId, DeploymentState, STATE_VERSION};

/// State file name.
const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// The fields read before trusting the rest of a state file.
#[derive(Debug, Deserialize)]
struct StateHeader {
    version: String,
    #[serde(default)]
    serial: u64,
}

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Serializes read-check-write cycles of `save` within this process.
    write_guard: Mutex<()>,
}

impl LocalStateStore {
    /// Creates a new local state store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_guard: Mutex::new(()),
        }
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the directory holding one deployment's files.
    #[must_use]
    pub fn deployment_dir(&self, deployment: &DeploymentId) -> PathBuf {
        self.base_dir
            .join(&deployment.project)
            .join(&deployment.environment)
    }

    /// Returns the state file path of a deployment.
    #[must_use]
    pub fn state_path(&self, deployment: &DeploymentId) -> PathBuf {
        self.deployment_dir(deployment).join(STATE_FILE)
    }

    fn lock_path(&self, deployment: &DeploymentId) -> PathBuf {
        self.deployment_dir(deployment).join(LOCK_FILE)
    }

    /// Ensures the deployment directory exists.
    async fn ensure_dir(&self, deployment: &DeploymentId) -> Result<()> {
        let dir = self.deployment_dir(deployment);
        if !dir.exists() {
            debug!("Creating state directory: {}", dir.display());
            fs::create_dir_all(&dir).await.map_err(|e| {
                CairnError::State(StateError::storage(format!(
                    "Failed to create state directory: {e}"
                )))
            })?;
        }
        Ok(())
    }

    /// Reads and version-checks the header of the state file.
    async fn read_header(&self, deployment: &DeploymentId) -> Result<Option<(StateHeader, String)>> {
        let path = self.state_path(deployment);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await.map_err(|e| {
            CairnError::State(StateError::corrupted(format!(
                "Failed to read state file: {e}"
            )))
        })?;

        let header: StateHeader = serde_json::from_str(&content).map_err(|e| {
            CairnError::State(StateError::corrupted(format!(
                "Failed to parse state file: {e}"
            )))
        })?;

        if header.version != STATE_VERSION {
            return Err(CairnError::State(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: header.version,
            }));
        }

        Ok(Some((header, content)))
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self, deployment: &DeploymentId) -> Result<Option<LockInfo>> {
        let lock_path = self.lock_path(deployment);
        if !lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&lock_path).await.map_err(|e| {
            CairnError::State(StateError::corrupted(format!(
                "Failed to read lock file: {e}"
            )))
        })?;

        let lock_info: LockInfo = serde_json::from_str(&content).map_err(|e| {
            CairnError::State(StateError::corrupted(format!(
                "Failed to parse lock file: {e}"
            )))
        })?;

        Ok(Some(lock_info))
    }

    /// Writes the lock file.
    async fn write_lock_file(&self, deployment: &DeploymentId, lock_info: &LockInfo) -> Result<()> {
        self.ensure_dir(deployment).await?;

        let content = serde_json::to_string_pretty(lock_info).map_err(|e| {
            CairnError::State(StateError::serialization(format!(
                "Failed to serialize lock: {e}"
            )))
        })?;

        let lock_failed = |what: &str, e: std::io::Error| {
            CairnError::State(StateError::LockFailed {
                message: format!("Failed to {what} lock file: {e}"),
            })
        };

        let mut file = fs::File::create(self.lock_path(deployment))
            .await
            .map_err(|e| lock_failed("create", e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| lock_failed("write", e))?;
        file.sync_all().await.map_err(|e| lock_failed("sync", e))?;

        Ok(())
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self, deployment: &DeploymentId) -> Result<()> {
        let lock_path = self.lock_path(deployment);
        if lock_path.exists() {
            fs::remove_file(&lock_path).await.map_err(|e| {
                CairnError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }

    /// Writes `content` next to the state file, syncs it, then renames it
    /// over the state file.
    async fn write_atomically(&self, deployment: &DeploymentId, content: &str) -> Result<()> {
        let state_path = self.state_path(deployment);
        let temp_path = state_path.with_extension("json.tmp");

        let storage = |what: &str, e: std::io::Error| {
            CairnError::State(StateError::storage(format!("Failed to {what} state file: {e}")))
        };

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| storage("create temp", e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| storage("write", e))?;
        file.sync_all().await.map_err(|e| storage("sync", e))?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &state_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(storage("rename", e));
        }

        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self, deployment: &DeploymentId) -> Result<DeploymentState> {
        let Some((_, content)) = self.read_header(deployment).await? else {
            debug!("No state recorded for {deployment}");
            return Ok(DeploymentState::new(deployment.clone()));
        };

        info!("Loading state from: {}", self.state_path(deployment).display());

        let state: DeploymentState = serde_json::from_str(&content).map_err(|e| {
            CairnError::State(StateError::corrupted(format!(
                "Failed to parse state file: {e}"
            )))
        })?;

        if &state.deployment != deployment {
            return Err(CairnError::State(StateError::corrupted(format!(
                "State file belongs to '{}', expected '{deployment}'",
                state.deployment
            ))));
        }

        Ok(state)
    }

    async fn save(&self, deployment: &DeploymentId, state: &DeploymentState) -> Result<u64> {
        let _guard = self.write_guard.lock().await;

        let persisted = self
            .read_header(deployment)
            .await?
            .map_or(0, |(header, _)| header.serial);

        if persisted != state.serial {
            return Err(CairnError::State(StateError::Stale {
                deployment: deployment.to_string(),
                expected: state.serial,
                found: persisted,
            }));
        }

        self.ensure_dir(deployment).await?;

        let mut next = state.clone();
        next.serial = persisted + 1;
        next.version = STATE_VERSION.to_string();

        let content = serde_json::to_string_pretty(&next).map_err(|e| {
            CairnError::State(StateError::serialization(format!(
                "Failed to serialize state: {e}"
            )))
        })?;

        self.write_atomically(deployment, &content).await?;

        debug!("Saved state for {deployment} at serial {}", next.serial);
        Ok(next.serial)
    }

    async fn delete(&self, deployment: &DeploymentId) -> Result<()> {
        let _guard = self.write_guard.lock().await;

        let state_path = self.state_path(deployment);
        if state_path.exists() {
            info!("Deleting state file: {}", state_path.display());
            fs::remove_file(&state_path).await.map_err(|e| {
                CairnError::State(StateError::storage(format!(
                    "Failed to delete state file: {e}"
                )))
            })?;
        }

        // Also delete lock file
        self.delete_lock_file(deployment).await?;

        Ok(())
    }

    async fn exists(&self, deployment: &DeploymentId) -> Result<bool> {
        Ok(self.state_path(deployment).exists())
    }

    async fn acquire_lock(&self, deployment: &DeploymentId, holder: &str) -> Result<LockInfo> {
        // Check for existing lock
        if let Some(existing) = self.read_lock_file(deployment).await? {
            if !existing.is_expired() {
                return Err(CairnError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        self.write_lock_file(deployment, &lock_info).await?;

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, deployment: &DeploymentId, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file(deployment).await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file(deployment).await?;
                info!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn force_unlock(&self, deployment: &DeploymentId) -> Result<()> {
        self.delete_lock_file(deployment).await
    }

    async fn get_lock_info(&self, deployment: &DeploymentId) -> Result<Option<LockInfo>> {
        self.read_lock_file(deployment).await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
