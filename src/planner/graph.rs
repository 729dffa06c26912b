//! Resource dependency graph.
//!
//! Edges come from output references inside declared properties and from
//! explicit `depends_on` entries. The graph must be acyclic; topological
//! order is deterministic, with ties broken by declaration order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::GraphError;
use crate::resource::{OutputDeclaration, ResourceDeclaration};
use crate::state::StateRecord;

/// Directed acyclic graph of resource declarations.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    declarations: Vec<ResourceDeclaration>,
    index: HashMap<String, usize>,
    /// `dependencies[i]` holds the indices `i` depends on.
    dependencies: Vec<BTreeSet<usize>>,
    /// `dependents[i]` holds the indices depending on `i`.
    dependents: Vec<BTreeSet<usize>>,
    order: Vec<usize>,
}

impl ResourceGraph {
    /// Builds the graph from ordered declarations.
    ///
    /// Stack outputs are checked for unresolved references but add no nodes.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateResource`] for repeated names,
    /// [`GraphError::UnresolvedReference`] when a declaration or output names
    /// an undeclared resource, and [`GraphError::Cycle`] when the references
    /// form a loop.
    pub fn build(
        declarations: Vec<ResourceDeclaration>,
        outputs: &[OutputDeclaration],
    ) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(declarations.len());
        for (i, declaration) in declarations.iter().enumerate() {
            if index.insert(declaration.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateResource {
                    name: declaration.name.clone(),
                });
            }
        }

        let mut dependencies = vec![BTreeSet::new(); declarations.len()];
        let mut dependents = vec![BTreeSet::new(); declarations.len()];

        for (i, declaration) in declarations.iter().enumerate() {
            for target in declaration.dependencies() {
                let Some(&j) = index.get(target) else {
                    return Err(GraphError::UnresolvedReference {
                        from: declaration.name.clone(),
                        target: target.to_string(),
                    });
                };
                dependencies[i].insert(j);
                dependents[j].insert(i);
            }
        }

        for output in outputs {
            for reference in output.references() {
                if !index.contains_key(&reference.resource) {
                    return Err(GraphError::UnresolvedReference {
                        from: format!("outputs.{}", output.name),
                        target: reference.resource.clone(),
                    });
                }
            }
        }

        let (order, leftover) = kahn(&dependencies);
        if !leftover.is_empty() {
            let cycle = find_cycle(&dependencies, &leftover)
                .into_iter()
                .map(|i| declarations[i].name.clone())
                .collect();
            return Err(GraphError::Cycle { cycle });
        }

        Ok(Self {
            declarations,
            index,
            dependencies,
            dependents,
            order,
        })
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns true if the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Returns true if a resource with this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Looks up a declaration by name.
    #[must_use]
    pub fn declaration(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.index.get(name).map(|&i| &self.declarations[i])
    }

    /// Declarations in declaration order.
    #[must_use]
    pub fn declarations(&self) -> &[ResourceDeclaration] {
        &self.declarations
    }

    /// Declarations in topological order: dependencies first.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&ResourceDeclaration> {
        self.order.iter().map(|&i| &self.declarations[i]).collect()
    }

    /// Names of the direct dependencies of `name`.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependencies)
    }

    /// Names of the resources that directly depend on `name`.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependents)
    }

    /// Names of every resource that depends on `name`, directly or not.
    #[must_use]
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let Some(&start) = self.index.get(name) else {
            return BTreeSet::new();
        };

        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            for &j in &self.dependents[i] {
                if seen.insert(j) {
                    stack.push(j);
                }
            }
        }

        seen.into_iter()
            .map(|i| self.declarations[i].name.as_str())
            .collect()
    }

    fn neighbours(&self, name: &str, edges: &[BTreeSet<usize>]) -> Vec<&str> {
        self.index.get(name).map_or_else(Vec::new, |&i| {
            edges[i]
                .iter()
                .map(|&j| self.declarations[j].name.as_str())
                .collect()
        })
    }
}

/// Orders recorded resources for deletion: dependents before dependencies.
///
/// Only dependencies among `names` are considered. Ties are broken by name.
/// A recorded cycle cannot be produced by the engine; if one is found in a
/// hand-edited state file the remaining names are appended in name order.
#[must_use]
pub fn delete_order(records: &BTreeMap<String, StateRecord>, names: &BTreeSet<&str>) -> Vec<String> {
    let nodes: Vec<&str> = names.iter().copied().collect();
    let position: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let dependencies: Vec<BTreeSet<usize>> = nodes
        .iter()
        .map(|name| {
            records
                .get(*name)
                .map(|record| {
                    record
                        .dependencies
                        .iter()
                        .filter_map(|d| position.get(d.as_str()).copied())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let (mut order, leftover) = kahn(&dependencies);
    order.extend(leftover);
    order.reverse();
    order.into_iter().map(|i| nodes[i].to_string()).collect()
}

/// Kahn's algorithm over index-addressed nodes.
///
/// Returns the order and the nodes left over because they sit on or behind
/// a cycle. The ready set is ordered, so the lowest index wins ties.
fn kahn(dependencies: &[BTreeSet<usize>]) -> (Vec<usize>, Vec<usize>) {
    let mut indegree: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
    let mut dependents = vec![Vec::new(); dependencies.len()];
    for (i, deps) in dependencies.iter().enumerate() {
        for &j in deps {
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter_map(|(i, count)| (*count == 0).then_some(i))
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    let leftover = indegree
        .iter()
        .enumerate()
        .filter_map(|(i, count)| (*count > 0).then_some(i))
        .collect();

    (order, leftover)
}

/// Finds one concrete cycle among `candidates`.
///
/// The returned path starts and ends with the same node.
fn find_cycle(dependencies: &[BTreeSet<usize>], candidates: &[usize]) -> Vec<usize> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    let mut marks = vec![Mark::New; dependencies.len()];

    for &start in candidates {
        if marks[start] != Mark::New {
            continue;
        }

        // Iterative DFS; `path` mirrors the active stack.
        let mut path = vec![start];
        let mut stack = vec![dependencies[start].iter()];
        marks[start] = Mark::Active;

        while let Some(edges) = stack.last_mut() {
            match edges.next() {
                Some(&next) => match marks[next] {
                    Mark::Active => {
                        let from = path.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle = path[from..].to_vec();
                        cycle.push(next);
                        return cycle;
                    }
                    Mark::New => {
                        marks[next] = Mark::Active;
                        path.push(next);
                        stack.push(dependencies[next].iter());
                    }
                    Mark::Done => {}
                },
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        marks[done] = Mark::Done;
                    }
                }
            }
        }
    }

    candidates.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::PropertyValue;

    fn bucket(name: &str) -> ResourceDeclaration {
        ResourceDeclaration::new(name, "storage:bucket")
    }

    fn referencing(name: &str, target: &str) -> ResourceDeclaration {
        bucket(name).with_property("source", PropertyValue::output(target, "id"))
    }

    fn names<'a>(decls: &[&'a ResourceDeclaration]) -> Vec<&'a str> {
        decls.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let graph = ResourceGraph::build(
            vec![referencing("app", "db"), bucket("db"), referencing("cdn", "app")],
            &[],
        )
        .expect("acyclic");

        assert_eq!(names(&graph.topological_order()), vec!["db", "app", "cdn"]);
        assert_eq!(graph.dependencies_of("app"), vec!["db"]);
        assert_eq!(graph.dependents_of("db"), vec!["app"]);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let graph = ResourceGraph::build(
            vec![bucket("zeta"), bucket("alpha"), bucket("mid")],
            &[],
        )
        .expect("acyclic");

        assert_eq!(names(&graph.topological_order()), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_every_edge_respects_order() {
        let graph = ResourceGraph::build(
            vec![
                referencing("d", "c"),
                referencing("c", "a"),
                bucket("a"),
                referencing("b", "a").with_depends_on("c"),
                bucket("e"),
            ],
            &[],
        )
        .expect("acyclic");

        let order = names(&graph.topological_order());
        let pos = |n: &str| order.iter().position(|x| *x == n).expect("present");
        for decl in graph.declarations() {
            for dep in decl.dependencies() {
                assert!(pos(dep) < pos(&decl.name), "{dep} must precede {}", decl.name);
            }
        }
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let err = ResourceGraph::build(
            vec![referencing("a", "b"), referencing("b", "c"), referencing("c", "a"), bucket("d")],
            &[],
        )
        .expect_err("cycle");

        let GraphError::Cycle { cycle } = err else {
            panic!("expected a cycle error");
        };
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        assert!(!cycle.contains(&String::from("d")));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = ResourceGraph::build(vec![referencing("a", "a")], &[]).expect_err("cycle");
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> a");
    }

    #[test]
    fn test_unresolved_reference() {
        let err = ResourceGraph::build(vec![referencing("a", "ghost")], &[]).expect_err("dangling");
        assert!(matches!(
            err,
            GraphError::UnresolvedReference { ref from, ref target } if from == "a" && target == "ghost"
        ));

        let err = ResourceGraph::build(vec![bucket("a").with_depends_on("ghost")], &[])
            .expect_err("dangling depends_on");
        assert!(matches!(err, GraphError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_unresolved_stack_output() {
        let output = OutputDeclaration {
            name: String::from("bucket_name"),
            value: PropertyValue::output("missing", "id"),
        };
        let err = ResourceGraph::build(vec![bucket("a")], &[output]).expect_err("dangling output");
        assert!(err.to_string().contains("outputs.bucket_name"));
    }

    #[test]
    fn test_duplicate_names() {
        let err = ResourceGraph::build(vec![bucket("a"), bucket("a")], &[]).expect_err("duplicate");
        assert!(matches!(err, GraphError::DuplicateResource { .. }));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = ResourceGraph::build(
            vec![bucket("a"), referencing("b", "a"), referencing("c", "b"), bucket("d")],
            &[],
        )
        .expect("acyclic");

        let dependents: Vec<&str> = graph.transitive_dependents("a").into_iter().collect();
        assert_eq!(dependents, vec!["b", "c"]);
        assert!(graph.transitive_dependents("d").is_empty());
    }

    #[test]
    fn test_delete_order_reverses_dependencies() {
        let mut records = BTreeMap::new();
        for (name, deps) in [("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"]), ("z", vec![])] {
            let mut record = StateRecord::new(name, "storage:bucket");
            record.dependencies = deps.into_iter().map(String::from).collect();
            records.insert(name.to_string(), record);
        }

        let names: BTreeSet<&str> = ["a", "b", "c", "z"].into_iter().collect();
        let order = delete_order(&records, &names);

        let pos = |n: &str| order.iter().position(|x| x == n).expect("present");
        assert!(pos("c") < pos("b"));
        assert!(pos("b") < pos("a"));
        assert_eq!(order.len(), 4);
    }
}
