//! Plan executor.
//!
//! Runs a [`ChangePlan`] in two phases: creates, updates and no-ops first,
//! deletes second. Within a phase a single coordinator schedules entries
//! whose prerequisites are terminal, keeps at most `max_concurrency`
//! provider calls in flight, and persists the state after every success.
//!
//! A failed entry never blocks unrelated entries; everything waiting on it
//! (transitively) is reported as skipped. Cancellation stops scheduling,
//! lets in-flight calls finish and records their results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deployment::DeploymentContext;
use crate::error::{CairnError, ExecutionError, ProviderError, Result};
use crate::provider::{Operation, Provider, ProviderRegistry, ProviderRequest};
use crate::resource::Outputs;
use crate::state::{DeploymentId, DeploymentState, StateRecord, StateStore};

use super::graph::ResourceGraph;
use super::plan::{ChangeAction, ChangeEntry, ChangePlan};
use super::retry::{Attempted, RetryPolicy};

/// Default number of provider calls in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Executor for change plans.
pub struct PlanExecutor<'a, S: StateStore + ?Sized> {
    /// Store receiving a save after every successful operation.
    store: &'a S,
    /// Providers by type tag.
    registry: &'a ProviderRegistry,
    /// Graph the plan was computed from; used to resolve references.
    graph: &'a ResourceGraph,
    /// Retry policy for provider calls.
    retry: RetryPolicy,
    /// Maximum provider calls in flight.
    max_concurrency: usize,
}

/// Terminal status of one resource in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The provider operation succeeded.
    Applied,
    /// Nothing to do.
    Unchanged,
    /// The provider operation failed.
    Failed,
    /// Not attempted because a prerequisite did not succeed.
    Skipped,
    /// Not attempted (or abandoned during backoff) because the run was cancelled.
    Cancelled,
}

/// Result for one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutcome {
    /// Logical name.
    pub name: String,
    /// Provider type tag.
    pub resource_type: String,
    /// Planned change.
    #[serde(flatten)]
    pub action: ChangeAction,
    /// What happened.
    pub status: OutcomeStatus,
    /// Provider calls made.
    pub attempts: u32,
    /// Error or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the first provider call started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the resource reached its terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-status counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    /// Resources created.
    pub created: usize,
    /// Resources updated.
    pub updated: usize,
    /// Resources deleted.
    pub deleted: usize,
    /// Resources left unchanged.
    pub unchanged: usize,
    /// Resources whose operation failed.
    pub failed: usize,
    /// Resources skipped after a failed prerequisite.
    pub skipped: usize,
    /// Resources not applied because the run was cancelled.
    pub cancelled: usize,
}

/// Summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: Uuid,
    /// Deployment the run applied to.
    pub deployment: DeploymentId,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
    /// Counts per status.
    pub totals: RunTotals,
    /// Outcomes in plan order.
    pub outcomes: Vec<ResourceOutcome>,
    /// Stack outputs after the run.
    pub outputs: BTreeMap<String, Value>,
}

/// Entries of one phase and the edges between them.
struct Phase<'p> {
    entries: Vec<&'p ChangeEntry>,
    /// Number of unfinished prerequisites per entry.
    waiting_on: Vec<usize>,
    /// Entries to release when an entry finishes.
    waiters: Vec<Vec<usize>>,
}

/// Mutable bookkeeping of a phase run.
struct PhaseRun {
    outcomes: Vec<Option<ResourceOutcome>>,
    started: Vec<Option<DateTime<Utc>>>,
    inputs: Vec<Option<BTreeMap<String, Value>>>,
    waiting_on: Vec<usize>,
    ready: BTreeSet<usize>,
    fatal: Option<CairnError>,
}

type TaskOutput = (usize, Attempted<Outputs>);

/// What woke the coordinator.
enum Wake {
    Cancelled,
    Joined(Option<std::result::Result<TaskOutput, JoinError>>),
}

impl<'a, S: StateStore + ?Sized> PlanExecutor<'a, S> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(store: &'a S, registry: &'a ProviderRegistry, graph: &'a ResourceGraph) -> Self {
        Self {
            store,
            registry,
            graph,
            retry: RetryPolicy::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum number of provider calls in flight (at least 1).
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Executes a change plan, updating and saving `state` as it goes.
    ///
    /// `state.serial` must match the store; it is advanced on every save.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted. Provider failures
    /// are reported in the summary instead.
    pub async fn execute(
        &self,
        ctx: &DeploymentContext,
        plan: &ChangePlan,
        state: &mut DeploymentState,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        info!(
            "Run {} on {}: {} changes across {} resources",
            ctx.run_id,
            ctx.deployment,
            plan.changes().count(),
            plan.entries.len()
        );

        let forward = Phase::forward(plan);
        let forward_run = self.run_phase(&forward, Vec::new(), state, cancel).await;
        let forward_halted = forward_run.fatal.is_some() || cancel.is_cancelled();
        let (mut outcomes, fatal) = forward_run.finish(&forward);

        if let Some(error) = fatal {
            error!("Run {} aborted: {error}", ctx.run_id);
            return Err(error);
        }

        let deletes = Phase::deletes(plan);
        if forward_halted {
            outcomes.extend(deletes.entries.iter().map(|e| {
                ResourceOutcome::pending(e, OutcomeStatus::Cancelled, Some(String::from("run cancelled")))
            }));
        } else {
            let blocked = Self::blocked_deletes(&deletes, &outcomes, state);
            let delete_run = self.run_phase(&deletes, blocked, state, cancel).await;
            let (delete_outcomes, fatal) = delete_run.finish(&deletes);
            if let Some(error) = fatal {
                error!("Run {} aborted: {error}", ctx.run_id);
                return Err(error);
            }
            outcomes.extend(delete_outcomes);
        }

        let summary = RunSummary::new(ctx, started_at, outcomes);
        info!(
            "Run {} finished: {} created, {} updated, {} deleted, {} unchanged, {} failed, {} skipped, {} cancelled",
            ctx.run_id,
            summary.totals.created,
            summary.totals.updated,
            summary.totals.deleted,
            summary.totals.unchanged,
            summary.totals.failed,
            summary.totals.skipped,
            summary.totals.cancelled
        );
        Ok(summary)
    }

    /// Deletes that must not run because a resource that still depends on
    /// them was not brought up to date.
    fn blocked_deletes(
        deletes: &Phase<'_>,
        forward: &[ResourceOutcome],
        state: &DeploymentState,
    ) -> Vec<(usize, String)> {
        let position: HashMap<&str, usize> = deletes
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.as_str(), i))
            .collect();

        let mut blocked = Vec::new();
        for outcome in forward {
            if matches!(outcome.status, OutcomeStatus::Applied | OutcomeStatus::Unchanged) {
                continue;
            }
            let Some(record) = state.get_record(&outcome.name) else {
                continue;
            };
            for dependency in &record.dependencies {
                if let Some(&i) = position.get(dependency.as_str()) {
                    blocked.push((
                        i,
                        format!("'{}' still depends on it and was not updated", outcome.name),
                    ));
                }
            }
        }
        blocked
    }

    async fn run_phase(
        &self,
        phase: &Phase<'_>,
        blocked: Vec<(usize, String)>,
        state: &mut DeploymentState,
        cancel: &CancellationToken,
    ) -> PhaseRun {
        let mut run = PhaseRun::new(phase);
        for (i, reason) in blocked {
            if run.outcomes[i].is_none() {
                warn!("Skipping {}: {reason}", phase.entries[i].name);
                run.outcomes[i] = Some(ResourceOutcome::pending(
                    phase.entries[i],
                    OutcomeStatus::Skipped,
                    Some(reason),
                ));
                run.ready.remove(&i);
                run.skip_waiters(phase, i);
            }
        }

        let mut in_flight: JoinSet<TaskOutput> = JoinSet::new();
        let mut cancel_seen = false;

        loop {
            while run.fatal.is_none()
                && !cancel.is_cancelled()
                && in_flight.len() < self.max_concurrency
            {
                let Some(i) = run.ready.pop_first() else {
                    break;
                };
                self.start(phase, i, &mut run, state, cancel, &mut in_flight);
            }

            if in_flight.is_empty() {
                break;
            }

            let wake = tokio::select! {
                biased;
                () = cancel.cancelled(), if !cancel_seen => Wake::Cancelled,
                joined = in_flight.join_next() => Wake::Joined(joined),
            };

            match wake {
                Wake::Cancelled => {
                    cancel_seen = true;
                    info!(
                        "Cancellation requested; waiting for {} in-flight operations",
                        in_flight.len()
                    );
                }
                Wake::Joined(None) => break,
                Wake::Joined(Some(Err(join_error))) => {
                    error!("Provider task lost: {join_error}");
                    if run.fatal.is_none() {
                        run.fatal = Some(CairnError::internal(format!(
                            "provider task lost: {join_error}"
                        )));
                    }
                }
                Wake::Joined(Some(Ok((i, attempted)))) => {
                    self.complete(phase, i, attempted, &mut run, state).await;
                }
            }
        }

        if run.fatal.is_none() && !cancel.is_cancelled() {
            run.skip_cycles(phase);
        }
        run
    }

    /// Starts entry `i`, or finishes it immediately if there is nothing to call.
    fn start(
        &self,
        phase: &Phase<'_>,
        i: usize,
        run: &mut PhaseRun,
        state: &DeploymentState,
        cancel: &CancellationToken,
        in_flight: &mut JoinSet<TaskOutput>,
    ) {
        let entry = phase.entries[i];

        let Some(operation) = entry.action.operation() else {
            debug!("{} unchanged", entry.name);
            run.outcomes[i] = Some(ResourceOutcome::pending(entry, OutcomeStatus::Unchanged, None));
            run.release_waiters(phase, i);
            return;
        };

        let (provider, request) = match self.prepare(entry, operation, state) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Cannot {operation} {}: {e}", entry.name);
                let mut outcome = ResourceOutcome::pending(entry, OutcomeStatus::Failed, Some(e.to_string()));
                outcome.finished_at = Some(Utc::now());
                run.outcomes[i] = Some(outcome);
                run.skip_waiters(phase, i);
                return;
            }
        };

        info!("{operation} {} ({})", entry.name, entry.resource_type);
        run.started[i] = Some(Utc::now());
        run.inputs[i] = Some(request.properties.clone());

        in_flight.spawn(run_provider(i, provider, request, self.retry.clone(), cancel.clone()));
    }

    fn prepare(
        &self,
        entry: &ChangeEntry,
        operation: Operation,
        state: &DeploymentState,
    ) -> std::result::Result<(Arc<dyn Provider>, ProviderRequest), ExecutionError> {
        let provider = self
            .registry
            .get(&entry.resource_type)
            .ok_or_else(|| ProviderError::UnknownType {
                resource_type: entry.resource_type.clone(),
            })?;

        let record = state.get_record(&entry.name);

        let properties = if operation == Operation::Delete {
            record.map(|r| r.inputs.clone()).unwrap_or_default()
        } else {
            let declaration = self.graph.declaration(&entry.name).ok_or_else(|| {
                ProviderError::terminal(format!("'{}' is not declared", entry.name))
            })?;
            let outputs: BTreeMap<String, Outputs> = declaration
                .dependencies()
                .into_iter()
                .filter_map(|d| state.get_record(d).map(|r| (d.to_string(), r.outputs.clone())))
                .collect();
            declaration.resolve_properties(&outputs)?
        };

        let prior_outputs = match operation {
            Operation::Create => None,
            Operation::Update | Operation::Delete => record.map(|r| r.outputs.clone()),
        };

        let request = ProviderRequest {
            operation,
            deployment: state.deployment.clone(),
            resource_type: entry.resource_type.clone(),
            name: entry.name.clone(),
            properties,
            prior_outputs,
            changed_fields: entry.action.changed_fields().to_vec(),
        };

        Ok((provider, request))
    }

    async fn complete(
        &self,
        phase: &Phase<'_>,
        i: usize,
        attempted: Attempted<Outputs>,
        run: &mut PhaseRun,
        state: &mut DeploymentState,
    ) {
        let entry = phase.entries[i];
        let mut outcome = ResourceOutcome::pending(entry, OutcomeStatus::Applied, None);
        outcome.attempts = attempted.attempts;
        outcome.started_at = run.started[i];
        outcome.finished_at = Some(Utc::now());

        match attempted.result {
            Ok(outputs) => {
                self.record_success(entry, run.inputs[i].take().unwrap_or_default(), outputs, state);
                match self.store.save(&state.deployment.clone(), state).await {
                    Ok(serial) => {
                        state.serial = serial;
                        debug!("Recorded {} at serial {serial}", entry.name);
                    }
                    Err(e) => {
                        error!("Failed to persist state after {}: {e}", entry.name);
                        if run.fatal.is_none() {
                            run.fatal = Some(e);
                        }
                    }
                }
                info!("{}: {} complete", entry.name, entry.action);
                run.outcomes[i] = Some(outcome);
                run.release_waiters(phase, i);
            }
            Err(ExecutionError::Cancelled { attempts, source }) => {
                warn!("{} abandoned after {attempts} attempts: {source}", entry.name);
                outcome.status = OutcomeStatus::Cancelled;
                outcome.error = Some(source.to_string());
                run.outcomes[i] = Some(outcome);
            }
            Err(e) => {
                error!("{} failed: {e}", entry.name);
                outcome.status = OutcomeStatus::Failed;
                outcome.error = Some(e.to_string());
                run.outcomes[i] = Some(outcome);
                run.skip_waiters(phase, i);
            }
        }
    }

    fn record_success(
        &self,
        entry: &ChangeEntry,
        inputs: BTreeMap<String, Value>,
        outputs: Outputs,
        state: &mut DeploymentState,
    ) {
        if entry.action.is_delete() {
            state.remove_record(&entry.name);
            return;
        }

        let properties = self
            .graph
            .declaration(&entry.name)
            .map(crate::resource::ResourceDeclaration::declared_properties)
            .unwrap_or_default();

        let mut record = state
            .get_record(&entry.name)
            .cloned()
            .unwrap_or_else(|| StateRecord::new(&entry.name, &entry.resource_type));
        record.applied(properties, inputs, outputs, entry.dependencies.clone());
        state.set_record(record);
    }
}

async fn run_provider(
    index: usize,
    provider: Arc<dyn Provider>,
    request: ProviderRequest,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> TaskOutput {
    // Inner task: a panicking provider surfaces as a JoinError for this entry.
    let call = tokio::spawn(async move {
        retry
            .run(&cancel, |_| {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move { provider.apply(&request).await }
            })
            .await
    });

    let attempted = match call.await {
        Ok(attempted) => attempted,
        Err(e) => Attempted {
            result: Err(ExecutionError::TaskAborted {
                message: e.to_string(),
            }),
            attempts: 1,
        },
    };

    (index, attempted)
}

impl<'p> Phase<'p> {
    /// Creates, updates and no-ops; an entry waits for its dependencies.
    fn forward(plan: &'p ChangePlan) -> Self {
        let entries: Vec<&ChangeEntry> = plan.entries.iter().filter(|e| !e.action.is_delete()).collect();
        let mut phase = Self::unlinked(entries);
        let position = phase.positions();

        for (i, entry) in phase.entries.iter().enumerate() {
            for dependency in &entry.dependencies {
                if let Some(&j) = position.get(dependency.as_str()) {
                    phase.waiting_on[i] += 1;
                    phase.waiters[j].push(i);
                }
            }
        }
        phase
    }

    /// Deletes; a resource is deleted only after everything that depended on it.
    fn deletes(plan: &'p ChangePlan) -> Self {
        let entries: Vec<&ChangeEntry> = plan.entries.iter().filter(|e| e.action.is_delete()).collect();
        let mut phase = Self::unlinked(entries);
        let position = phase.positions();

        for (i, entry) in phase.entries.iter().enumerate() {
            for dependency in &entry.dependencies {
                if let Some(&j) = position.get(dependency.as_str()) {
                    phase.waiting_on[j] += 1;
                    phase.waiters[i].push(j);
                }
            }
        }
        phase
    }

    fn unlinked(entries: Vec<&'p ChangeEntry>) -> Self {
        let len = entries.len();
        Self {
            entries,
            waiting_on: vec![0; len],
            waiters: vec![Vec::new(); len],
        }
    }

    fn positions(&self) -> HashMap<String, usize> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect()
    }

    /// Entries each entry waits on.
    fn prerequisites(&self) -> Vec<Vec<usize>> {
        let mut prerequisites = vec![Vec::new(); self.entries.len()];
        for (i, waiters) in self.waiters.iter().enumerate() {
            for &w in waiters {
                prerequisites[w].push(i);
            }
        }
        prerequisites
    }

    /// Follows unfinished prerequisites from `start` until one repeats and
    /// returns that cycle as `a -> b -> a`, in dependency direction.
    fn cycle_from(&self, prerequisites: &[Vec<usize>], stuck: &BTreeSet<usize>, start: usize) -> String {
        let mut path = vec![start];
        let mut seen = HashMap::from([(start, 0usize)]);
        let mut current = start;

        let mut cycle = loop {
            let Some(&next) = prerequisites[current].iter().find(|p| stuck.contains(*p)) else {
                break path;
            };
            if let Some(&at) = seen.get(&next) {
                let mut cycle = path.split_off(at);
                cycle.push(next);
                break cycle;
            }
            seen.insert(next, path.len());
            path.push(next);
            current = next;
        };

        // Delete edges point from a dependency to its dependents
        if let [first, second, ..] = cycle.as_slice()
            && !self.entries[*first].dependencies.contains(&self.entries[*second].name)
        {
            cycle.reverse();
        }
        cycle
            .iter()
            .map(|&i| self.entries[i].name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl PhaseRun {
    fn new(phase: &Phase<'_>) -> Self {
        let len = phase.entries.len();
        let ready = (0..len).filter(|&i| phase.waiting_on[i] == 0).collect();
        Self {
            outcomes: vec![None; len],
            started: vec![None; len],
            inputs: vec![None; len],
            waiting_on: phase.waiting_on.clone(),
            ready,
            fatal: None,
        }
    }

    fn release_waiters(&mut self, phase: &Phase<'_>, i: usize) {
        for &w in &phase.waiters[i] {
            self.waiting_on[w] = self.waiting_on[w].saturating_sub(1);
            if self.waiting_on[w] == 0 && self.outcomes[w].is_none() {
                self.ready.insert(w);
            }
        }
    }

    /// Marks everything waiting on `i`, transitively, as skipped.
    fn skip_waiters(&mut self, phase: &Phase<'_>, i: usize) {
        let cause = &phase.entries[i].name;
        let mut stack = phase.waiters[i].clone();
        while let Some(w) = stack.pop() {
            if self.outcomes[w].is_some() {
                continue;
            }
            warn!("Skipping {}: '{cause}' did not succeed", phase.entries[w].name);
            self.outcomes[w] = Some(ResourceOutcome::pending(
                phase.entries[w],
                OutcomeStatus::Skipped,
                Some(format!("'{cause}' did not succeed")),
            ));
            self.ready.remove(&w);
            stack.extend(phase.waiters[w].iter().copied());
        }
    }

    /// Skips entries that can never become ready. Without cancellation or a
    /// fatal error this only happens behind a dependency cycle in the
    /// recorded state.
    fn skip_cycles(&mut self, phase: &Phase<'_>) {
        let stuck: BTreeSet<usize> = (0..phase.entries.len())
            .filter(|&i| self.outcomes[i].is_none() && self.started[i].is_none())
            .collect();
        if stuck.is_empty() {
            return;
        }

        let prerequisites = phase.prerequisites();
        for &i in &stuck {
            let reason = format!(
                "blocked by recorded dependency cycle: {}",
                phase.cycle_from(&prerequisites, &stuck, i)
            );
            warn!("Skipping {}: {reason}", phase.entries[i].name);
            self.outcomes[i] = Some(ResourceOutcome::pending(
                phase.entries[i],
                OutcomeStatus::Skipped,
                Some(reason),
            ));
        }
    }

    /// Fills in entries that never reached a terminal state.
    fn finish(self, phase: &Phase<'_>) -> (Vec<ResourceOutcome>, Option<CairnError>) {
        let outcomes = self
            .outcomes
            .into_iter()
            .zip(self.started)
            .enumerate()
            .map(|(i, (outcome, started))| {
                outcome.unwrap_or_else(|| {
                    let entry = phase.entries[i];
                    if started.is_some() {
                        let mut lost = ResourceOutcome::pending(
                            entry,
                            OutcomeStatus::Failed,
                            Some(String::from("provider task lost")),
                        );
                        lost.started_at = started;
                        lost
                    } else {
                        ResourceOutcome::pending(
                            entry,
                            OutcomeStatus::Cancelled,
                            Some(String::from("run cancelled")),
                        )
                    }
                })
            })
            .collect();
        (outcomes, self.fatal)
    }
}

impl ResourceOutcome {
    fn pending(entry: &ChangeEntry, status: OutcomeStatus, error: Option<String>) -> Self {
        Self {
            name: entry.name.clone(),
            resource_type: entry.resource_type.clone(),
            action: entry.action.clone(),
            status,
            attempts: 0,
            error,
            started_at: None,
            finished_at: None,
        }
    }
}

impl RunSummary {
    fn new(ctx: &DeploymentContext, started_at: DateTime<Utc>, outcomes: Vec<ResourceOutcome>) -> Self {
        let mut totals = RunTotals::default();
        for outcome in &outcomes {
            match (outcome.status, &outcome.action) {
                (OutcomeStatus::Applied, ChangeAction::Create) => totals.created += 1,
                (OutcomeStatus::Applied, ChangeAction::Update { .. }) => totals.updated += 1,
                (OutcomeStatus::Applied, ChangeAction::Delete) => totals.deleted += 1,
                (OutcomeStatus::Applied | OutcomeStatus::Unchanged, _) => totals.unchanged += 1,
                (OutcomeStatus::Failed, _) => totals.failed += 1,
                (OutcomeStatus::Skipped, _) => totals.skipped += 1,
                (OutcomeStatus::Cancelled, _) => totals.cancelled += 1,
            }
        }

        Self {
            run_id: ctx.run_id,
            deployment: ctx.deployment.clone(),
            started_at,
            finished_at: Utc::now(),
            totals,
            outcomes,
            outputs: BTreeMap::new(),
        }
    }

    /// Returns true if nothing failed, was skipped or was cancelled.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.totals.failed == 0 && self.totals.skipped == 0 && self.totals.cancelled == 0
    }

    /// Process exit code: 0 on success, 1 if anything failed or was cancelled.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }

    /// Looks up the outcome for a resource.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&ResourceOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Names of the resources created, updated or deleted.
    #[must_use]
    pub fn changed(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Applied && !o.action.is_noop())
            .map(|o| o.name.clone())
            .collect()
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{status}")
    }
}
