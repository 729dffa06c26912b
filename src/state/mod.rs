//! State management module for the Cairn orchestration engine.
//!
//! This module provides persistent state storage for tracking applied
//! resources, their outputs, and the run history of each deployment.

mod store;
mod local;
mod memory;
mod lock;
mod types;

pub use store::StateStore;
#[cfg(test)]
pub use store::MockStateStore;
pub use local::LocalStateStore;
pub use memory::MemoryStateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use types::{
    DeploymentId, DeploymentState, HistoryEntry, MAX_HISTORY, RunOperation, STATE_VERSION,
    StateRecord,
};

use std::path::Path;

use crate::config::{DeployConfig, StateBackend};

/// Opens the state store selected by the configuration.
///
/// Relative local paths are resolved against `base`, usually the directory
/// holding the declaration file.
#[must_use]
pub fn open_store(config: &DeployConfig, base: &Path) -> Box<dyn StateStore> {
    match config.state.backend {
        StateBackend::Local => Box::new(LocalStateStore::with_base_dir(config.state_dir(base))),
        StateBackend::Memory => Box::new(MemoryStateStore::new()),
    }
}
