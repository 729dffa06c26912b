//! Run locks.
//!
//! Applying or destroying a deployment takes its lock first. A lock carries
//! an expiry, after which another holder may take it over; `state unlock
//! --force` clears one early.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seconds a lock stays valid after it is taken.
pub const LOCK_EXPIRY_SECS: i64 = 900;

/// A held lock, as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Identifier required to release the lock.
    pub lock_id: String,
    /// Process that took the lock (see [`generate_holder_id`]).
    pub holder: String,
    /// Time the lock was taken.
    pub acquired_at: DateTime<Utc>,
    /// Time after which the lock may be taken over.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Takes a fresh lock for `holder` with the default expiry.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        Self::with_ttl(holder, Duration::seconds(LOCK_EXPIRY_SECS))
    }

    /// Takes a fresh lock for `holder` that expires after `ttl`.
    #[must_use]
    pub fn with_ttl(holder: &str, ttl: Duration) -> Self {
        let acquired_at = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_owned(),
            acquired_at,
            expires_at: acquired_at + ttl,
        }
    }

    /// Whether the expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Builds a holder id of the form `<host>-<pid>-<random>`.
#[must_use]
pub fn generate_holder_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_owned());
    let suffix = Uuid::new_v4().simple().to_string();

    format!("{host}-{}-{}", std::process::id(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_lock_is_held() {
        let lock = LockInfo::new("ci-runner");
        assert_eq!(lock.holder, "ci-runner");
        assert!(!lock.is_expired());
        assert_eq!(
            (lock.expires_at - lock.acquired_at).num_seconds(),
            LOCK_EXPIRY_SECS
        );
    }

    #[test]
    fn test_lock_past_ttl_is_expired() {
        let lock = LockInfo::with_ttl("ci-runner", Duration::seconds(-1));
        assert!(lock.is_expired());
    }

    #[test]
    fn test_holder_ids_are_distinct_per_call() {
        let first = generate_holder_id();
        let second = generate_holder_id();

        assert_ne!(first, second);
        assert!(first.contains(&std::process::id().to_string()));
    }
}
