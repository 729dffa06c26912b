//! Planning and execution of deployment changes.
//!
//! Declarations are turned into a [`ResourceGraph`], diffed against the
//! recorded state into a [`ChangePlan`], and applied by a [`PlanExecutor`].

mod diff;
mod executor;
mod graph;
mod plan;
mod retry;

pub use diff::{DiffEngine, changed_fields};
pub use executor::{
    DEFAULT_MAX_CONCURRENCY, OutcomeStatus, PlanExecutor, ResourceOutcome, RunSummary, RunTotals,
};
pub use graph::{ResourceGraph, delete_order};
pub use plan::{ChangeAction, ChangeEntry, ChangePlan};
pub use retry::{Attempted, RetryPolicy};
