//! Diff engine for comparing declared vs recorded state.
//!
//! Declared properties are compared in canonical declared form, so a
//! resource whose declaration did not change is a no-op even if the outputs
//! it references were refreshed.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::PlanError;
use crate::provider::ProviderRegistry;
use crate::state::DeploymentState;

use super::graph::{ResourceGraph, delete_order};
use super::plan::{ChangeAction, ChangeEntry, ChangePlan};

/// Engine for computing change plans.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    /// Providers available to the run.
    registry: &'a ProviderRegistry,
}

impl<'a> DiffEngine<'a> {
    /// Creates a diff engine checking types against `registry`.
    #[must_use]
    pub const fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Computes the change plan for `graph` against `state`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::TypeChanged`] if a recorded resource is declared
    /// with another type, and [`PlanError::UnknownResourceType`] if a
    /// declared or deleted resource has no registered provider.
    pub fn plan(
        &self,
        graph: &ResourceGraph,
        state: &DeploymentState,
        config_hash: &str,
    ) -> Result<ChangePlan, PlanError> {
        let mut entries = Vec::with_capacity(graph.len() + state.resources.len());

        for declaration in graph.topological_order() {
            self.check_registered(&declaration.name, &declaration.resource_type)?;

            let declared = declaration.declared_properties();
            let action = match state.get_record(&declaration.name) {
                None => ChangeAction::Create,
                Some(record) if record.resource_type != declaration.resource_type => {
                    return Err(PlanError::TypeChanged {
                        name: declaration.name.clone(),
                        from: record.resource_type.clone(),
                        to: declaration.resource_type.clone(),
                    });
                }
                Some(record) => {
                    let changed = changed_fields(&declared, &record.properties);
                    if changed.is_empty() {
                        ChangeAction::NoOp
                    } else {
                        ChangeAction::Update { changed }
                    }
                }
            };

            debug!("{}: {action}", declaration.name);
            entries.push(ChangeEntry {
                name: declaration.name.clone(),
                resource_type: declaration.resource_type.clone(),
                action,
                dependencies: graph
                    .dependencies_of(&declaration.name)
                    .into_iter()
                    .map(String::from)
                    .collect(),
            });
        }

        let removed: BTreeSet<&str> = state
            .resources
            .keys()
            .map(String::as_str)
            .filter(|name| !graph.contains(name))
            .collect();

        for name in delete_order(&state.resources, &removed) {
            let Some(record) = state.get_record(&name) else {
                continue;
            };
            self.check_registered(&record.name, &record.resource_type)?;

            debug!("{name}: delete");
            entries.push(ChangeEntry {
                name,
                resource_type: record.resource_type.clone(),
                action: ChangeAction::Delete,
                dependencies: record.dependencies.clone(),
            });
        }

        Ok(ChangePlan::new(
            state.deployment.clone(),
            config_hash.to_string(),
            entries,
        )
        .with_serial(state.serial))
    }

    fn check_registered(&self, name: &str, resource_type: &str) -> Result<(), PlanError> {
        if self.registry.contains(resource_type) {
            Ok(())
        } else {
            Err(PlanError::UnknownResourceType {
                name: name.to_string(),
                resource_type: resource_type.to_string(),
            })
        }
    }
}

/// Returns the sorted names of properties added, removed or modified.
#[must_use]
pub fn changed_fields(
    declared: &BTreeMap<String, Value>,
    recorded: &BTreeMap<String, Value>,
) -> Vec<String> {
    declared
        .keys()
        .chain(recorded.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|key| declared.get(*key) != recorded.get(*key))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{PropertyValue, ResourceDeclaration};
    use crate::state::{DeploymentId, StateRecord};
    use serde_json::json;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::with_builtins("/nonexistent")
    }

    fn graph(declarations: Vec<ResourceDeclaration>) -> ResourceGraph {
        ResourceGraph::build(declarations, &[]).expect("acyclic")
    }

    fn bucket(name: &str, acl: &str) -> ResourceDeclaration {
        ResourceDeclaration::new(name, "storage:bucket")
            .with_property("acl", PropertyValue::literal(acl))
    }

    fn record_of(decl: &ResourceDeclaration, deps: &[&str]) -> StateRecord {
        let mut record = StateRecord::new(&decl.name, &decl.resource_type);
        record.properties = decl.declared_properties();
        record.dependencies = deps.iter().map(ToString::to_string).collect();
        record
    }

    fn summary(plan: &ChangePlan) -> Vec<(String, ChangeAction)> {
        plan.entries
            .iter()
            .map(|e| (e.name.clone(), e.action.clone()))
            .collect()
    }

    #[test]
    fn test_changed_fields_covers_added_removed_modified() {
        let declared = BTreeMap::from([
            (String::from("acl"), json!("public-read")),
            (String::from("tags"), json!({ "a": "b" })),
        ]);
        let recorded = BTreeMap::from([
            (String::from("acl"), json!("private")),
            (String::from("force_destroy"), json!(true)),
        ]);

        assert_eq!(
            changed_fields(&declared, &recorded),
            vec!["acl", "force_destroy", "tags"]
        );
        assert!(changed_fields(&declared, &declared).is_empty());
    }

    #[test]
    fn test_update_then_create_scenario() {
        let registry = registry();
        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        state.set_record(record_of(&bucket("bucket1", "private"), &[]));

        let bucket2 = ResourceDeclaration::new("bucket2", "storage:bucket")
            .with_property("log_target", PropertyValue::output("bucket1", "id"));
        let plan = DiffEngine::new(&registry)
            .plan(&graph(vec![bucket("bucket1", "public-read"), bucket2]), &state, "h")
            .expect("plan");

        assert_eq!(
            summary(&plan),
            vec![
                (
                    String::from("bucket1"),
                    ChangeAction::Update { changed: vec![String::from("acl")] }
                ),
                (String::from("bucket2"), ChangeAction::Create),
            ]
        );
        assert_eq!(plan.entries[1].dependencies, vec!["bucket1"]);
    }

    #[test]
    fn test_reference_and_escaped_text_are_different_values() {
        let registry = registry();
        let bucket1 = bucket("bucket1", "private");
        let referencing = ResourceDeclaration::new("bucket2", "storage:bucket")
            .with_property("tag", PropertyValue::output("bucket1", "id"));
        let escaped = ResourceDeclaration::new("bucket2", "storage:bucket").with_property(
            "tag",
            PropertyValue::parse(&json!("$${bucket1.id}"), "tag").expect("valid"),
        );
        let tag_changed = ChangeAction::Update {
            changed: vec![String::from("tag")],
        };

        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        state.set_record(record_of(&bucket1, &[]));
        state.set_record(record_of(&referencing, &["bucket1"]));
        let plan = DiffEngine::new(&registry)
            .plan(&graph(vec![bucket1.clone(), escaped.clone()]), &state, "h")
            .expect("plan");
        assert_eq!(plan.entry("bucket2").map(|e| &e.action), Some(&tag_changed));

        state.set_record(record_of(&escaped, &[]));
        let plan = DiffEngine::new(&registry)
            .plan(&graph(vec![bucket1, referencing]), &state, "h")
            .expect("plan");
        assert_eq!(plan.entry("bucket2").map(|e| &e.action), Some(&tag_changed));
    }

    #[test]
    fn test_removed_resource_is_only_change() {
        let registry = registry();
        let bucket1 = bucket("bucket1", "private");
        let bucket2 = ResourceDeclaration::new("bucket2", "storage:bucket")
            .with_property("log_target", PropertyValue::output("bucket1", "id"));

        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        state.set_record(record_of(&bucket1, &[]));
        state.set_record(record_of(&bucket2, &["bucket1"]));

        let plan = DiffEngine::new(&registry)
            .plan(&graph(vec![bucket1]), &state, "h")
            .expect("plan");

        let changes: Vec<(String, ChangeAction)> = plan
            .changes()
            .map(|e| (e.name.clone(), e.action.clone()))
            .collect();
        assert_eq!(changes, vec![(String::from("bucket2"), ChangeAction::Delete)]);
        assert_eq!(plan.entry("bucket1").map(|e| &e.action), Some(&ChangeAction::NoOp));
    }

    #[test]
    fn test_deletes_follow_forward_entries_in_reverse_order() {
        let registry = registry();
        let base = bucket("base", "private");
        let mid = bucket("mid", "private");
        let top = bucket("top", "private");

        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        state.set_record(record_of(&base, &[]));
        state.set_record(record_of(&mid, &["base"]));
        state.set_record(record_of(&top, &["mid"]));

        let plan = DiffEngine::new(&registry)
            .plan(&graph(vec![bucket("fresh", "private")]), &state, "h")
            .expect("plan");

        let names: Vec<&str> = plan.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["fresh", "top", "mid", "base"]);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let registry = registry();
        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        for name in ["old-a", "old-b", "old-c"] {
            state.set_record(record_of(&bucket(name, "private"), &[]));
        }
        let declarations = vec![bucket("x", "private"), bucket("y", "private"), bucket("z", "private")];

        let engine = DiffEngine::new(&registry);
        let first = engine.plan(&graph(declarations.clone()), &state, "h").expect("plan");
        let second = engine.plan(&graph(declarations), &state, "h").expect("plan");

        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn test_type_change_is_fatal() {
        let registry = registry();
        let mut state = DeploymentState::new(DeploymentId::new("demo", "dev"));
        state.set_record(StateRecord::new("thing", "core:value"));

        let err = DiffEngine::new(&registry)
            .plan(&graph(vec![bucket("thing", "private")]), &state, "h")
            .expect_err("type change");
        assert!(matches!(err, PlanError::TypeChanged { .. }));
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let registry = registry();
        let state = DeploymentState::new(DeploymentId::new("demo", "dev"));

        let err = DiffEngine::new(&registry)
            .plan(&graph(vec![ResourceDeclaration::new("q", "cloud:queue")]), &state, "h")
            .expect_err("unknown type");
        assert!(matches!(err, PlanError::UnknownResourceType { .. }));
    }
}
