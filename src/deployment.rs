//! Deployment runs.
//!
//! A [`Deployment`] ties a configuration, a state store and the provider
//! registry together. Every mutating run takes the deployment lock, loads the
//! state, builds the graph, diffs, executes, resolves the stack outputs and
//! saves the final state with a history entry.

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigHasher, DeployConfig};
use crate::error::{PlanError, Result};
use crate::planner::{ChangePlan, DiffEngine, PlanExecutor, ResourceGraph, RetryPolicy, RunSummary};
use crate::provider::ProviderRegistry;
use crate::resource::{OutputDeclaration, declarations_from_config, outputs_from_config};
use crate::state::{
    DeploymentId, DeploymentState, HistoryEntry, LockInfo, RunOperation, StateStore,
    generate_holder_id,
};

/// Identity of a single run, passed through every stage.
#[derive(Debug, Clone)]
pub struct DeploymentContext {
    /// Deployment being changed.
    pub deployment: DeploymentId,
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Lock holder identifier for this process.
    pub holder: String,
}

impl DeploymentContext {
    /// Creates a context for a new run.
    #[must_use]
    pub fn new(deployment: DeploymentId) -> Self {
        Self {
            deployment,
            run_id: Uuid::new_v4(),
            holder: generate_holder_id(),
        }
    }
}

/// A configured deployment.
pub struct Deployment<'a, S: StateStore + ?Sized> {
    /// Configuration.
    config: &'a DeployConfig,
    /// State store.
    store: &'a S,
    /// Providers.
    registry: &'a ProviderRegistry,
    /// Configuration hasher.
    hasher: ConfigHasher,
}

impl<'a, S: StateStore + ?Sized> Deployment<'a, S> {
    /// Creates a new deployment.
    #[must_use]
    pub const fn new(config: &'a DeployConfig, store: &'a S, registry: &'a ProviderRegistry) -> Self {
        Self {
            config,
            store,
            registry,
            hasher: ConfigHasher::new(),
        }
    }

    /// Identifier of the deployment.
    #[must_use]
    pub fn id(&self) -> DeploymentId {
        self.config.deployment_id()
    }

    /// Computes the change plan without touching any provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration, graph or state is invalid.
    pub async fn preview(&self) -> Result<ChangePlan> {
        self.plan_for(RunOperation::Apply).await
    }

    /// Computes the plan a destroy would execute.
    ///
    /// # Errors
    ///
    /// Same as [`Deployment::preview`].
    pub async fn preview_destroy(&self) -> Result<ChangePlan> {
        self.plan_for(RunOperation::Destroy).await
    }

    /// Brings the deployment in line with the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot start (invalid configuration, cycle,
    /// lock held) or the state cannot be persisted. Provider failures are
    /// reported in the summary.
    pub async fn apply(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        self.locked(RunOperation::Apply, None, cancel).await
    }

    /// Applies a previewed plan, refusing with [`PlanError::Outdated`] if the
    /// plan computed under the lock is not the one that was approved.
    ///
    /// # Errors
    ///
    /// Same as [`Deployment::apply`], plus [`PlanError::Outdated`].
    pub async fn apply_plan(&self, approved: &ChangePlan, cancel: &CancellationToken) -> Result<RunSummary> {
        self.locked(RunOperation::Apply, Some(approved), cancel).await
    }

    /// Deletes every recorded resource.
    ///
    /// # Errors
    ///
    /// Same as [`Deployment::apply`].
    pub async fn destroy(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        self.locked(RunOperation::Destroy, None, cancel).await
    }

    /// Executes a plan returned by [`Deployment::preview_destroy`].
    ///
    /// # Errors
    ///
    /// Same as [`Deployment::apply_plan`].
    pub async fn destroy_plan(&self, approved: &ChangePlan, cancel: &CancellationToken) -> Result<RunSummary> {
        self.locked(RunOperation::Destroy, Some(approved), cancel).await
    }

    /// Returns the recorded stack outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded.
    pub async fn outputs(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.store.load(&self.id()).await?.outputs)
    }

    /// Returns the recorded state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded.
    pub async fn state(&self) -> Result<DeploymentState> {
        self.store.load(&self.id()).await
    }

    /// Returns the current lock, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be read.
    pub async fn lock_info(&self) -> Result<Option<LockInfo>> {
        self.store.get_lock_info(&self.id()).await
    }

    /// Removes the deployment lock regardless of its holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be removed.
    pub async fn force_unlock(&self) -> Result<()> {
        warn!("Force-unlocking {}", self.id());
        self.store.force_unlock(&self.id()).await
    }

    async fn plan_for(&self, operation: RunOperation) -> Result<ChangePlan> {
        let state = self.store.load(&self.id()).await?;
        let graph = self.graph(operation)?;
        let plan = DiffEngine::new(self.registry).plan(&graph, &state, &self.hasher.hash_config(self.config))?;

        info!(
            "Plan for {} at serial {}: {} to create, {} to update, {} to delete, {} unchanged",
            plan.deployment,
            plan.serial,
            plan.creates(),
            plan.updates(),
            plan.deletes(),
            plan.unchanged()
        );
        Ok(plan)
    }

    async fn locked(
        &self,
        operation: RunOperation,
        approved: Option<&ChangePlan>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let ctx = DeploymentContext::new(self.id());
        let lock = self.store.acquire_lock(&ctx.deployment, &ctx.holder).await?;
        debug!("Acquired lock {} for run {}", lock.lock_id, ctx.run_id);

        let result = self.run(&ctx, operation, approved, cancel).await;

        if let Err(e) = self.store.release_lock(&ctx.deployment, &lock.lock_id).await {
            warn!("Failed to release lock {}: {e}", lock.lock_id);
        }
        result
    }

    async fn run(
        &self,
        ctx: &DeploymentContext,
        operation: RunOperation,
        approved: Option<&ChangePlan>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        info!("Starting {operation} of {} (run {})", ctx.deployment, ctx.run_id);

        let graph = self.graph(operation)?;
        let mut state = self.store.load(&ctx.deployment).await?;
        let config_hash = self.hasher.hash_config(self.config);
        let plan = DiffEngine::new(self.registry).plan(&graph, &state, &config_hash)?;
        if let Some(approved) = approved {
            ensure_current(approved, &plan)?;
        }

        let mut summary = PlanExecutor::new(self.store, self.registry, &graph)
            .with_retry(RetryPolicy::from(&self.config.engine.retry))
            .with_max_concurrency(self.config.engine.max_concurrency)
            .execute(ctx, &plan, &mut state, cancel)
            .await?;

        let declared_outputs = match operation {
            RunOperation::Apply => outputs_from_config(self.config)?,
            RunOperation::Destroy => Vec::new(),
        };
        state.outputs = resolve_outputs(&declared_outputs, &state);
        summary.outputs = state.outputs.clone();

        if summary.success() {
            state.config_hash = match operation {
                RunOperation::Apply => config_hash.clone(),
                RunOperation::Destroy => String::new(),
            };
        }
        state.add_history(HistoryEntry {
            run_id: ctx.run_id,
            timestamp: Utc::now(),
            operation,
            config_hash,
            changed: summary.changed(),
            failed: summary.totals.failed,
            not_attempted: summary.totals.skipped + summary.totals.cancelled,
            success: summary.success(),
        });

        state.serial = self.store.save(&ctx.deployment, &state).await?;
        info!(
            "Finished {operation} of {} at serial {} ({})",
            ctx.deployment,
            state.serial,
            if summary.success() { "success" } else { "incomplete" }
        );
        Ok(summary)
    }

    /// Builds the graph for `operation`; a destroy declares nothing.
    fn graph(&self, operation: RunOperation) -> Result<ResourceGraph> {
        let (declarations, outputs) = match operation {
            RunOperation::Apply => (
                declarations_from_config(self.config)?,
                outputs_from_config(self.config)?,
            ),
            RunOperation::Destroy => (Vec::new(), Vec::new()),
        };
        Ok(ResourceGraph::build(declarations, &outputs)?)
    }
}

/// Checks that the plan computed under the lock is the approved one.
fn ensure_current(approved: &ChangePlan, current: &ChangePlan) -> std::result::Result<(), PlanError> {
    let reason = if approved.deployment != current.deployment {
        format!("planned for {}, running {}", approved.deployment, current.deployment)
    } else if approved.serial != current.serial {
        format!(
            "state moved from serial {} to {}",
            approved.serial, current.serial
        )
    } else if approved.config_hash != current.config_hash {
        String::from("declarations changed")
    } else if approved.entries != current.entries {
        String::from("planned changes differ")
    } else {
        return Ok(());
    };
    Err(PlanError::Outdated { reason })
}

/// Resolves stack outputs against the recorded resource outputs.
///
/// Outputs whose resources are not recorded (failed or skipped) are left out.
fn resolve_outputs(declared: &[OutputDeclaration], state: &DeploymentState) -> BTreeMap<String, Value> {
    let recorded = state.resource_outputs();
    declared
        .iter()
        .filter_map(|output| match output.value.resolve(&recorded) {
            Ok(value) => Some((output.name.clone(), value)),
            Err(e) => {
                warn!("Output '{}' is unavailable: {e}", output.name);
                None
            }
        })
        .collect()
}
