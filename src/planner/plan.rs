//! Change plan types.
//!
//! A plan lists one entry per resource that is declared or recorded. Entries
//! are ordered for execution: creates, updates and no-ops in forward
//! topological order, then deletes in reverse topological order of the
//! recorded dependency graph.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::provider::Operation;
use crate::state::DeploymentId;

/// A complete change plan.
#[derive(Debug, Clone, Serialize)]
pub struct ChangePlan {
    /// Deployment the plan applies to.
    pub deployment: DeploymentId,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// State serial the plan was computed from.
    pub serial: u64,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Entries in execution order.
    pub entries: Vec<ChangeEntry>,
}

/// The planned change for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    /// Logical name.
    pub name: String,
    /// Provider type tag.
    pub resource_type: String,
    /// What will happen to the resource.
    #[serde(flatten)]
    pub action: ChangeAction,
    /// Declared dependencies, or recorded ones for deletes.
    pub dependencies: Vec<String>,
}

/// Types of changes in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChangeAction {
    /// Resource is declared but not recorded.
    Create,
    /// Declared properties differ from the recorded ones.
    Update {
        /// Sorted names of the added, removed or modified properties.
        changed: Vec<String>,
    },
    /// Resource is recorded but no longer declared.
    Delete,
    /// Declared and recorded properties are equal.
    NoOp,
}

impl ChangeAction {
    /// Returns the provider operation, or `None` for no-ops.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::Create => Some(Operation::Create),
            Self::Update { .. } => Some(Operation::Update),
            Self::Delete => Some(Operation::Delete),
            Self::NoOp => None,
        }
    }

    /// Returns true for no-ops.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// Returns true for deletes.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }

    /// Changed property names (updates only).
    #[must_use]
    pub fn changed_fields(&self) -> &[String] {
        match self {
            Self::Update { changed } => changed,
            _ => &[],
        }
    }

    /// One-character marker used in plan listings.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update { .. } => "~",
            Self::Delete => "-",
            Self::NoOp => " ",
        }
    }
}

impl ChangePlan {
    /// Creates a plan from ordered entries.
    #[must_use]
    pub fn new(deployment: DeploymentId, config_hash: String, entries: Vec<ChangeEntry>) -> Self {
        Self {
            deployment,
            config_hash,
            serial: 0,
            created_at: Utc::now(),
            entries,
        }
    }

    /// Records the state serial the plan was computed from.
    #[must_use]
    pub fn with_serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    /// Entries that change something.
    pub fn changes(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter().filter(|e| !e.action.is_noop())
    }

    /// Looks up the entry for a resource.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ChangeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Returns true if applying the plan would call any provider.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.changes().next().is_some()
    }

    /// Number of creates.
    #[must_use]
    pub fn creates(&self) -> usize {
        self.count(|a| matches!(a, ChangeAction::Create))
    }

    /// Number of updates.
    #[must_use]
    pub fn updates(&self) -> usize {
        self.count(|a| matches!(a, ChangeAction::Update { .. }))
    }

    /// Number of deletes.
    #[must_use]
    pub fn deletes(&self) -> usize {
        self.count(ChangeAction::is_delete)
    }

    /// Number of unchanged resources.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.count(ChangeAction::is_noop)
    }

    fn count(&self, predicate: impl Fn(&ChangeAction) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.action)).count()
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update { changed } => write!(f, "update ({})", changed.join(", ")),
            Self::Delete => write!(f, "delete"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, action: ChangeAction) -> ChangeEntry {
        ChangeEntry {
            name: name.to_string(),
            resource_type: String::from("storage:bucket"),
            action,
            dependencies: vec![],
        }
    }

    #[test]
    fn test_counts_and_changes() {
        let plan = ChangePlan::new(
            DeploymentId::new("demo", "dev"),
            String::new(),
            vec![
                entry("a", ChangeAction::NoOp),
                entry("b", ChangeAction::Create),
                entry("c", ChangeAction::Update { changed: vec![String::from("acl")] }),
                entry("d", ChangeAction::Delete),
            ],
        );

        assert_eq!(
            (plan.creates(), plan.updates(), plan.deletes(), plan.unchanged()),
            (1, 1, 1, 1)
        );
        let changed: Vec<&str> = plan.changes().map(|e| e.name.as_str()).collect();
        assert_eq!(changed, vec!["b", "c", "d"]);
        assert!(plan.has_changes());
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(entry(
            "bucket1",
            ChangeAction::Update { changed: vec![String::from("acl")] },
        ))
        .expect("serialize");

        assert_eq!(json["action"], "update");
        assert_eq!(json["changed"][0], "acl");
        assert_eq!(json["name"], "bucket1");
    }
}
