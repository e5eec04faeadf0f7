//! Per-deployment coordination.
//!
//! A [`Deployment`] owns every piece of mutable state a run needs
//! (generator bookkeeping, executor pools, status tokens, hook registries,
//! completion channels) and tears it all down when the run ends. The run
//! loop feeds program events to the generator and schedules the resulting
//! steps on the executor; deletions run last, batched into antichains.

use std::collections::HashMap;
use std::sync::Arc;

use converge_core::{Snapshot, SnapshotSink, Step, StepOp};
use converge_hooks::HookRegistry;
use converge_status::StatusRegistry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::analyzer::Analyzer;
use crate::error::{Error, Result};
use crate::events::{
    DiagnosticSink, NoopStepEvents, ProgramEvent, ReadResult, RegisterResult, StepEventSink,
    TracingDiagnostics,
};
use crate::executor::StepExecutor;
use crate::generator::StepGenerator;
use crate::options::DeploymentOptions;
use crate::plan::DeploymentPlan;
use crate::provider::ProviderRegistry;

/// Everything one deployment owns.
pub struct Deployment {
    pub(crate) stack: String,
    pub(crate) project: String,
    pub(crate) options: DeploymentOptions,
    pub(crate) prev: Snapshot,
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) analyzers: Vec<Arc<dyn Analyzer>>,
    pub(crate) hooks: Arc<HookRegistry>,
    pub(crate) status: Arc<StatusRegistry>,
    pub(crate) sink: Arc<dyn SnapshotSink>,
    pub(crate) step_events: Arc<dyn StepEventSink>,
    pub(crate) diagnostics: Arc<dyn DiagnosticSink>,
    pub(crate) plan: Option<DeploymentPlan>,
    pub(crate) cancel: CancellationToken,
    pub(crate) completions: DashMap<u64, oneshot::Sender<RegisterResult>>,
    pub(crate) read_completions: DashMap<u64, oneshot::Sender<ReadResult>>,
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("stack", &self.stack)
            .field("project", &self.project)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Deployment {
    /// Starts building a deployment for a stack/project pair.
    #[must_use]
    pub fn builder(stack: impl Into<String>, project: impl Into<String>) -> DeploymentBuilder {
        DeploymentBuilder::new(stack, project)
    }

    /// The cancellation token steps and waiters observe.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The status registry shared with the gRPC side-channel.
    #[must_use]
    pub fn status_registry(&self) -> Arc<StatusRegistry> {
        Arc::clone(&self.status)
    }

    /// Runs the deployment to completion over a program event stream.
    ///
    /// The loop ends when the program drops its event source; deletions are
    /// generated and executed afterwards, batched into antichains.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: generator errors surface immediately,
    /// executor errors after in-flight steps finish.
    #[instrument(name = "deployment_run", skip(self, events), fields(stack = %self.stack, project = %self.project))]
    pub async fn run(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ProgramEvent>,
    ) -> Result<DeploymentSummary> {
        let mut generator = StepGenerator::new(Arc::clone(self));
        let executor = Arc::new(StepExecutor::new(Arc::clone(self)));
        let mut chains = Vec::new();
        let mut summary = DeploymentSummary::default();

        while let Some(event) = events.recv().await {
            if executor.is_aborted() {
                break;
            }
            match event {
                ProgramEvent::RegisterResource(event) => {
                    match generator.generate_steps(event).await {
                        Ok(steps) => {
                            summary.record(&steps);
                            chains.push(executor.spawn_chain(steps));
                        }
                        Err(error) => {
                            executor.record_failure(error);
                            break;
                        }
                    }
                }
                ProgramEvent::ReadResource(event) => {
                    match generator.generate_read_steps(event).await {
                        Ok(steps) => {
                            summary.record(&steps);
                            chains.push(executor.spawn_chain(steps));
                        }
                        Err(error) => {
                            executor.record_failure(error);
                            break;
                        }
                    }
                }
                ProgramEvent::RegisterResourceOutputs(event) => {
                    if let Err(error) = executor.execute_register_resource_outputs(event) {
                        executor.record_failure(error);
                        break;
                    }
                }
            }
        }

        for chain in chains {
            match chain.await {
                Ok(Ok(())) | Ok(Err(Error::Cancelled)) => {}
                Ok(Err(error)) => executor.record_failure(error),
                Err(join_error) => executor.record_failure(Error::Bail {
                    message: format!("step chain panicked: {join_error}"),
                }),
            }
        }

        if !executor.is_aborted() {
            match generator.generate_deletes() {
                Ok(deletes) => {
                    summary.record(&deletes);
                    for batch in generator.schedule_deletes(deletes) {
                        if executor.is_aborted() {
                            break;
                        }
                        if let Err(error) = executor.execute_batch(batch).await {
                            executor.record_failure(error);
                            break;
                        }
                    }
                }
                Err(error) => executor.record_failure(error),
            }
        }

        summary.policy_violations = generator.policy_violations().len();

        // Drop completion channels whose steps never ran (generator errors,
        // cancelled chains) so the program unblocks.
        self.completions.clear();
        self.read_completions.clear();
        debug!(?summary, "deployment finished");

        match executor.take_failure() {
            Some(error) => {
                // A bail is user-directed early termination, not an engine
                // failure; it surfaces through the diagnostics sink at a
                // lower severity.
                if error.is_bail() {
                    self.diagnostics.info(None, &error.to_string());
                } else {
                    self.diagnostics.error(None, &error.to_string());
                }
                Err(error)
            }
            None => Ok(summary),
        }
    }

    /// Refreshes every prior resource's state from its provider, appending
    /// the refreshed states to the sink. Resources the provider no longer
    /// finds are dropped.
    ///
    /// # Errors
    ///
    /// Returns the first provider failure; other refreshes still finish.
    #[instrument(name = "deployment_refresh", skip(self), fields(stack = %self.stack))]
    pub async fn refresh(self: &Arc<Self>) -> Result<DeploymentSummary> {
        let executor = Arc::new(StepExecutor::new(Arc::clone(self)));
        let mut summary = DeploymentSummary::default();

        let steps: Vec<Step> = self
            .prev
            .resources()
            .iter()
            .filter(|r| !r.delete)
            .map(|r| {
                Step::new(StepOp::Refresh, r.urn.clone())
                    .with_old(Arc::clone(r))
                    .with_new(r.as_ref().clone())
            })
            .collect();
        summary.record(&steps);
        executor.execute_batch(steps).await?;

        match executor.take_failure() {
            Some(error) => Err(error),
            None => Ok(summary),
        }
    }
}

/// Operation counts and collected policy violations for one run.
#[derive(Debug, Default, Clone)]
pub struct DeploymentSummary {
    /// Steps generated, per operation.
    pub ops: HashMap<StepOp, usize>,
    /// Mandatory policy violations collected during a preview.
    pub policy_violations: usize,
}

impl DeploymentSummary {
    pub(crate) fn record(&mut self, steps: &[Step]) {
        for step in steps {
            *self.ops.entry(step.op).or_insert(0) += 1;
        }
    }

    /// How many steps of `op` were generated.
    #[must_use]
    pub fn count(&self, op: StepOp) -> usize {
        self.ops.get(&op).copied().unwrap_or(0)
    }
}

/// Builder wiring a deployment's collaborators together.
pub struct DeploymentBuilder {
    stack: String,
    project: String,
    options: DeploymentOptions,
    prev: Snapshot,
    providers: Arc<ProviderRegistry>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    hooks: Arc<HookRegistry>,
    status: Arc<StatusRegistry>,
    sink: Option<Arc<dyn SnapshotSink>>,
    step_events: Arc<dyn StepEventSink>,
    diagnostics: Arc<dyn DiagnosticSink>,
    plan: Option<DeploymentPlan>,
    cancel: CancellationToken,
}

impl DeploymentBuilder {
    /// A builder with default collaborators and an empty prior snapshot.
    #[must_use]
    pub fn new(stack: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            project: project.into(),
            options: DeploymentOptions::default(),
            prev: Snapshot::default(),
            providers: Arc::new(ProviderRegistry::new()),
            analyzers: Vec::new(),
            hooks: Arc::new(HookRegistry::new()),
            status: Arc::new(StatusRegistry::new()),
            sink: None,
            step_events: Arc::new(NoopStepEvents),
            diagnostics: Arc::new(TracingDiagnostics),
            plan: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the deployment options.
    #[must_use]
    pub fn options(mut self, options: DeploymentOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the prior snapshot.
    #[must_use]
    pub fn prev(mut self, prev: Snapshot) -> Self {
        self.prev = prev;
        self
    }

    /// Registers a provider implementation for a package.
    #[must_use]
    pub fn provider(
        self,
        package: impl Into<String>,
        provider: Arc<dyn crate::provider::Provider>,
    ) -> Self {
        self.providers.register(package, provider);
        self
    }

    /// Adds a policy analyzer.
    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    /// Uses an existing hook registry.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Shares a status registry (e.g. one already served over gRPC).
    #[must_use]
    pub fn status(mut self, status: Arc<StatusRegistry>) -> Self {
        self.status = status;
        self
    }

    /// Sets the snapshot sink new states are appended to.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Installs step lifecycle callbacks.
    #[must_use]
    pub fn step_events(mut self, step_events: Arc<dyn StepEventSink>) -> Self {
        self.step_events = step_events;
        self
    }

    /// Installs a diagnostics sink.
    #[must_use]
    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Runs the deployment against a recorded plan.
    #[must_use]
    pub fn plan(mut self, plan: DeploymentPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Finishes the wiring.
    #[must_use]
    pub fn build(self) -> Arc<Deployment> {
        Arc::new(Deployment {
            stack: self.stack,
            project: self.project,
            options: self.options,
            prev: self.prev,
            providers: self.providers,
            analyzers: self.analyzers,
            hooks: self.hooks,
            status: self.status,
            sink: self
                .sink
                .unwrap_or_else(|| Arc::new(converge_core::InMemorySnapshotSink::new())),
            step_events: self.step_events,
            diagnostics: self.diagnostics,
            plan: self.plan,
            cancel: self.cancel,
            completions: DashMap::new(),
            read_completions: DashMap::new(),
        })
    }
}
