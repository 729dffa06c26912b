//! Error types for the Cairn orchestration engine.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, graph construction, planning, state management and
//! provider execution.
//!
//! Configuration, graph and plan errors abort a run before any provider is
//! touched. Provider and execution errors are scoped to a single resource and
//! its dependents; they are reported in the run summary instead of being
//! returned from the engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Cairn engine.
#[derive(Debug, Error)]
pub enum CairnError {
    /// The declaration file is missing or invalid.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Dependency graph errors.
    #[error("graph: {0}")]
    Graph(#[from] GraphError),

    /// The declarations cannot be reconciled with the recorded state.
    #[error("plan: {0}")]
    Plan(#[from] PlanError),

    /// Loading, saving or locking the state failed.
    #[error("state: {0}")]
    State(#[from] StateError),

    /// Provider errors surfaced outside of a run.
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    /// Filesystem failure outside the state store.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violation inside the engine.
    #[error("internal: {0}")]
    Internal(String),
}

/// Errors in the declaration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No declaration file at the given path.
    #[error("no declaration file at {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file could not be read or decoded.
    #[error("cannot parse declarations: {message}")]
    ParseError {
        /// What the reader or decoder reported.
        message: String,
        /// File the error came from, when known.
        location: Option<String>,
    },

    /// A declaration is well-formed YAML but not acceptable.
    #[error("invalid declaration: {message}")]
    ValidationError {
        /// What is wrong.
        message: String,
        /// Dotted path of the offending field.
        field: Option<String>,
    },

    /// A property value contains a malformed output reference.
    #[error("Invalid reference '{reference}' in {location}: {reason}")]
    InvalidReference {
        /// The reference text as written.
        reference: String,
        /// Where the reference was found (`resources[0].properties.acl`).
        location: String,
        /// Why the reference was rejected.
        reason: String,
    },
}

/// Errors raised while building the resource dependency graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The declarations reference each other in a loop.
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    Cycle {
        /// Resource names along the cycle; the first name is repeated last.
        cycle: Vec<String>,
    },

    /// A declaration references a resource that is not declared.
    #[error("'{from}' references undeclared resource '{target}'")]
    UnresolvedReference {
        /// Resource (or stack output) holding the reference.
        from: String,
        /// The missing resource name.
        target: String,
    },

    /// Two declarations share a logical name.
    #[error("Duplicate resource name: {name}")]
    DuplicateResource {
        /// The duplicated name.
        name: String,
    },
}

/// Errors that stop a plan from being built.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A recorded resource was redeclared with a different type tag.
    #[error("Resource '{name}' changed type from '{from}' to '{to}'; remove it and declare it again")]
    TypeChanged {
        /// Resource name.
        name: String,
        /// Recorded type tag.
        from: String,
        /// Declared type tag.
        to: String,
    },

    /// No provider is registered for a type tag used by the plan.
    #[error("No provider registered for type '{resource_type}' (resource '{name}')")]
    UnknownResourceType {
        /// Resource name.
        name: String,
        /// The unregistered type tag.
        resource_type: String,
    },

    /// The state or declarations changed after the plan was approved.
    #[error("plan is out of date: {reason}; preview again")]
    Outdated {
        /// What no longer matches.
        reason: String,
    },
}

/// Errors from a state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// The caller's view of the state is older than the stored one.
    #[error(
        "State for '{deployment}' is stale (have serial {expected}, store has {found}); reload and retry"
    )]
    Stale {
        /// Deployment identifier.
        deployment: String,
        /// Serial the caller based its changes on.
        expected: u64,
        /// Serial currently persisted.
        found: u64,
    },

    /// The stored document is not a valid state.
    #[error("state document is corrupt: {message}")]
    Corrupted {
        /// What failed to decode.
        message: String,
    },

    /// The lock could not be taken or released.
    #[error("cannot lock state: {message}")]
    LockFailed {
        /// Why the lock operation failed.
        message: String,
    },

    /// Another run holds an unexpired lock.
    #[error("state is locked by {holder} since {since}; use `cairn state unlock` if that run is gone")]
    LockedByOther {
        /// Holder id of the other run.
        holder: String,
        /// RFC 3339 time the lock was taken.
        since: String,
    },

    /// Backend storage failure.
    #[error("State storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The state could not be encoded for saving.
    #[error("cannot encode state: {message}")]
    SerializationError {
        /// Encoder message.
        message: String,
    },

    /// The stored document was written by an incompatible format version.
    #[error("unsupported state version {found} (this build reads {expected})")]
    VersionMismatch {
        /// Version this build reads.
        expected: String,
        /// Version found in the document.
        found: String,
    },
}

/// Classification of a provider call result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The call succeeded.
    None,
    /// The call failed but may succeed if repeated.
    Retryable,
    /// The call failed permanently.
    Terminal,
}

/// Errors returned by provider operations.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transient failure; the engine retries with backoff.
    #[error("{message} (retryable)")]
    Retryable {
        /// Description of the failure.
        message: String,
    },

    /// Permanent failure for this resource.
    #[error("{message}")]
    Terminal {
        /// Description of the failure.
        message: String,
    },

    /// No provider is registered for the type tag.
    #[error("No provider registered for type '{resource_type}'")]
    UnknownType {
        /// The unregistered type tag.
        resource_type: String,
    },
}

/// Failure of a single resource during a run.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The provider rejected the operation.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Retryable failures continued until the attempt limit.
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last error returned.
        #[source]
        source: ProviderError,
    },

    /// The run was cancelled while waiting to retry.
    #[error("cancelled after {attempts} attempts: {source}")]
    Cancelled {
        /// Number of attempts made.
        attempts: u32,
        /// The last error returned.
        #[source]
        source: ProviderError,
    },

    /// A referenced output was not produced by the dependency.
    #[error("output '{output}' of '{resource}' is not available")]
    MissingOutput {
        /// Resource expected to produce the output.
        resource: String,
        /// Output name.
        output: String,
    },

    /// The provider task stopped without reporting a result.
    #[error("provider task aborted: {message}")]
    TaskAborted {
        /// Description of the abort.
        message: String,
    },
}

/// Result type alias for Cairn operations.
pub type Result<T> = std::result::Result<T, CairnError>;

impl CairnError {
    /// Shorthand for [`CairnError::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if repeating the whole run may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::Stale { .. } | StateError::LockFailed { .. })
                | Self::Provider(ProviderError::Retryable { .. })
        )
    }
}

impl ConfigError {
    /// Validation error pointing at `field`.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a retryable error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    /// Creates a terminal error.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    /// Returns true if the engine should retry the call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Retryable { .. } => ErrorKind::Retryable,
            Self::Terminal { .. } | Self::UnknownType { .. } => ErrorKind::Terminal,
        }
    }
}

impl ErrorKind {
    /// Classifies a provider call result.
    #[must_use]
    pub fn of<T>(result: &std::result::Result<T, ProviderError>) -> Self {
        match result {
            Ok(_) => Self::None,
            Err(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_joins_path() {
        let err = GraphError::Cycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_error_kind_classification() {
        let ok: std::result::Result<(), ProviderError> = Ok(());
        assert_eq!(ErrorKind::of(&ok), ErrorKind::None);

        let retry: std::result::Result<(), ProviderError> = Err(ProviderError::retryable("busy"));
        assert_eq!(ErrorKind::of(&retry), ErrorKind::Retryable);

        let unknown = ProviderError::UnknownType {
            resource_type: String::from("x:y"),
        };
        assert_eq!(unknown.kind(), ErrorKind::Terminal);
    }

    #[test]
    fn test_stale_state_is_retryable_run() {
        let err = CairnError::State(StateError::Stale {
            deployment: String::from("demo/dev"),
            expected: 1,
            found: 2,
        });
        assert!(err.is_retryable());
        assert!(err.to_string().contains("reload and retry"));
    }
}
