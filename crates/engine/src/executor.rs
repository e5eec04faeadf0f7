//! Step execution.
//!
//! The executor runs generated steps under the deployment's parallelism
//! budget while honoring dependency ordering: a step chain for a resource
//! starts only after every registered dependency has completed. Each step
//! reserves a status token, runs lifecycle hooks around the provider call,
//! drives error-hook retries, commits the resulting state, and signals the
//! originating program event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use converge_core::{
    HookPhase, ResourceState, ResourceStatus, Step, StepOp, Urn,
};
use converge_hooks::{ErrorHookArgs, ResourceHookArgs};
use converge_status::{materialize_view_state, view_state_urn};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::deployment::Deployment;
use crate::error::{Error, Result};
use crate::events::{ReadResult, RegisterOutputsEvent, RegisterResult};
use crate::provider::{Provider, ProviderError};

/// Upper bound on provider attempts when error hooks keep requesting
/// retries.
const MAX_OPERATION_ATTEMPTS: usize = 100;

enum HookPosition {
    Before,
    After,
}

/// Worker-pool step executor for one deployment.
pub struct StepExecutor {
    deployment: Arc<Deployment>,
    semaphore: Arc<Semaphore>,

    /// Outstanding chains per URN. A URN may be touched by several chains
    /// (a cascading delete in the root's chain plus the dependent's own
    /// recreate chain); dependents may start only once the count drains to
    /// zero.
    outstanding: Mutex<HashMap<Urn, usize>>,
    signals: DashMap<Urn, Arc<Notify>>,

    /// New states awaiting a RegisterResourceOutputs event.
    pending_news: DashMap<Urn, ResourceState>,

    /// First fatal error; set stops scheduling of further steps.
    failure: Mutex<Option<Error>>,
    aborted: AtomicBool,
}

impl StepExecutor {
    /// An executor for one deployment.
    #[must_use]
    pub fn new(deployment: Arc<Deployment>) -> Self {
        let parallel = deployment.options.parallel.max(1);
        Self {
            deployment,
            semaphore: Arc::new(Semaphore::new(parallel)),
            outstanding: Mutex::new(HashMap::new()),
            signals: DashMap::new(),
            pending_news: DashMap::new(),
            failure: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    /// Records the first fatal error and stops scheduling further steps;
    /// already-running steps are allowed to finish.
    pub fn record_failure(&self, error: Error) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            warn!(%error, "deployment failed; stopping further scheduling");
            *slot = Some(error);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Stops scheduling without recording an error; the caller owns the
    /// error and reports it up its own path.
    fn abort_scheduling(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// The first recorded failure, if any.
    #[must_use]
    pub fn take_failure(&self) -> Option<Error> {
        self.failure.lock().take()
    }

    /// Whether further scheduling has been stopped.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || self.deployment.cancel.is_cancelled()
    }

    /// Schedules a chain of steps for one resource. The chain waits for
    /// every scheduled chain touching one of its dependencies, then runs its
    /// steps in order.
    pub fn spawn_chain(self: &Arc<Self>, steps: Vec<Step>) -> JoinHandle<Result<()>> {
        let mut chain_urns: Vec<Urn> = Vec::new();
        for step in &steps {
            if !chain_urns.contains(&step.urn) {
                chain_urns.push(step.urn.clone());
            }
        }
        {
            let mut outstanding = self.outstanding.lock();
            for urn in &chain_urns {
                *outstanding.entry(urn.clone()).or_insert(0) += 1;
            }
        }
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.wait_for_dependencies(&steps, &chain_urns).await;
            let mut result = Ok(());
            for step in steps {
                if let Err(e) = executor.execute_step(step).await {
                    result = Err(e);
                    break;
                }
            }
            executor.finish_chain(&chain_urns);
            if let Err(e) = &result {
                if !matches!(e, Error::Cancelled) {
                    debug!(error = %e, "step chain failed");
                }
            }
            result
        })
    }

    /// Runs steps one after another on the caller's task.
    pub async fn execute_serial(&self, steps: Vec<Step>) -> Result<()> {
        for step in steps {
            self.execute_step(step).await?;
        }
        Ok(())
    }

    /// Runs one antichain as a batch, waiting for the whole batch before
    /// returning. The first failure is returned; remaining steps of the
    /// batch still finish.
    pub async fn execute_batch(self: &Arc<Self>, steps: Vec<Step>) -> Result<()> {
        let mut handles = Vec::with_capacity(steps.len());
        for step in steps {
            let executor = Arc::clone(self);
            handles.push(tokio::spawn(async move { executor.execute_step(step).await }));
        }
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() && !matches!(e, Error::Cancelled) {
                        first_error = Some(e);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(Error::Bail {
                            message: format!("step task panicked: {join_error}"),
                        });
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Executes one step end to end.
    ///
    /// # Errors
    ///
    /// Returns the step's failure after recording it; scheduling of further
    /// steps stops but running ones finish.
    #[instrument(name = "execute_step", skip(self, step), fields(op = %step.op, urn = %step.urn))]
    pub async fn execute_step(&self, mut step: Step) -> Result<()> {
        if self.is_aborted() {
            self.signal_event(&mut step, false);
            return Err(Error::Cancelled);
        }

        let Ok(_permit) = self.semaphore.acquire().await else {
            return Err(Error::Cancelled);
        };
        debug!("executing");

        let payload = self.deployment.step_events.on_step_pre(&step);

        let token_reserved = if step.op.reserves_status_token() {
            match self.deployment.status.reserve_token(
                step.urn.clone(),
                step.op == StepOp::Refresh,
                !self.deployment.options.dry_run,
            ) {
                Ok(_token) => true,
                Err(e) => {
                    self.abort_scheduling();
                    self.signal_event(&mut step, false);
                    return Err(Error::Status(e));
                }
            }
        } else {
            false
        };

        let mut status = ResourceStatus::Ok;
        let mut failure: Option<Error> = None;

        if let Err(e) = self.run_resource_hooks(&step, &HookPosition::Before).await {
            failure = Some(e);
        }

        if failure.is_none() {
            match self.invoke_with_retries(&mut step).await {
                Ok(s) => status = s,
                Err((s, e)) => {
                    status = s;
                    failure = Some(e);
                }
            }
        }

        if failure.is_none() {
            if let Err(e) = self.run_resource_hooks(&step, &HookPosition::After).await {
                failure = Some(e);
            }
        }

        // On success, ReleaseToken drains and applies queued view sub-steps
        // in publication order before anything else observes completion. On
        // failure the token is still released, but the queued steps are
        // discarded unapplied.
        if token_reserved {
            if failure.is_none() {
                self.drain_views(&step);
            } else {
                self.discard_views(&step);
            }
        }

        if let Some(new) = &step.new {
            if new.additional_secret_outputs.iter().any(|k| k == "id") {
                self.deployment.diagnostics.error(
                    Some(&step.urn),
                    "additionalSecretOutputs: the \"id\" output cannot be marked secret",
                );
            }
        }

        self.commit(&step, status, failure.is_some());

        let error_text = failure.as_ref().map(ToString::to_string);
        if let Err(message) = self.deployment.step_events.on_step_post(
            payload,
            &step,
            status,
            error_text.as_deref(),
        ) {
            let callback_error = Error::EventCallback { message };
            if failure.is_none() {
                failure = Some(callback_error);
            } else {
                self.record_failure(callback_error);
            }
        }

        self.signal_event(&mut step, failure.is_none());

        match failure {
            Some(e) => {
                self.abort_scheduling();
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Pops the pending registration for a RegisterResourceOutputs event,
    /// merges the program-supplied outputs, and fires the outputs callback.
    ///
    /// A callback error cancels the deployment, but the method itself still
    /// reports success on that path.
    ///
    /// # Errors
    ///
    /// Returns an error when no registration is pending for the URN.
    #[instrument(name = "execute_register_resource_outputs", skip(self, event), fields(urn = %event.urn))]
    pub fn execute_register_resource_outputs(&self, event: RegisterOutputsEvent) -> Result<()> {
        let Some((_, mut state)) = self.pending_news.remove(&event.urn) else {
            return Err(Error::NoPendingRegistration {
                urn: event.urn.to_string(),
            });
        };

        for (key, value) in event.outputs {
            state.outputs.insert(key, value);
        }
        self.deployment.sink.replace(&event.urn, state.clone());

        if let Err(message) = self
            .deployment
            .step_events
            .on_outputs(&event.urn, &state.outputs)
        {
            self.record_failure(Error::EventCallback { message });
        }

        let _ = event.done.send(());
        Ok(())
    }

    // Dependency ordering.

    async fn wait_for_dependencies(&self, steps: &[Step], own_urns: &[Urn]) {
        let mut dependencies: Vec<Urn> = Vec::new();
        for step in steps {
            if let Some(new) = &step.new {
                for dep in new.all_dependencies() {
                    if !own_urns.contains(dep) && !dependencies.contains(dep) {
                        dependencies.push(dep.clone());
                    }
                }
            }
        }
        for dep in dependencies {
            self.wait_for(&dep).await;
        }
    }

    fn signal_handle(&self, urn: &Urn) -> Arc<Notify> {
        self.signals
            .entry(urn.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    async fn wait_for(&self, urn: &Urn) {
        let signal = self.signal_handle(urn);
        loop {
            let notified = signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let pending = self.outstanding.lock().get(urn).copied().unwrap_or(0);
            if pending == 0 {
                return;
            }
            notified.await;
        }
    }

    fn finish_chain(&self, urns: &[Urn]) {
        let mut outstanding = self.outstanding.lock();
        for urn in urns {
            if let Some(count) = outstanding.get_mut(urn) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.signal_handle(urn).notify_waiters();
                }
            }
        }
    }

    // Hooks.

    fn hook_phase(op: StepOp, position: &HookPosition) -> Option<HookPhase> {
        match (op, position) {
            (
                StepOp::Create | StepOp::CreateReplacement | StepOp::Import | StepOp::ImportReplacement,
                HookPosition::Before,
            ) => Some(HookPhase::BeforeCreate),
            (
                StepOp::Create | StepOp::CreateReplacement | StepOp::Import | StepOp::ImportReplacement,
                HookPosition::After,
            ) => Some(HookPhase::AfterCreate),
            (StepOp::Update, HookPosition::Before) => Some(HookPhase::BeforeUpdate),
            (StepOp::Update, HookPosition::After) => Some(HookPhase::AfterUpdate),
            (StepOp::Delete | StepOp::DeleteReplaced, HookPosition::Before) => {
                Some(HookPhase::BeforeDelete)
            }
            (StepOp::Delete | StepOp::DeleteReplaced, HookPosition::After) => {
                Some(HookPhase::AfterDelete)
            }
            _ => None,
        }
    }

    fn error_hook_phase(op: StepOp) -> Option<HookPhase> {
        match op {
            StepOp::Create | StepOp::CreateReplacement | StepOp::Import | StepOp::ImportReplacement => {
                Some(HookPhase::OnCreateError)
            }
            StepOp::Update => Some(HookPhase::OnUpdateError),
            StepOp::Delete | StepOp::DeleteReplaced => Some(HookPhase::OnDeleteError),
            _ => None,
        }
    }

    fn hook_state<'a>(step: &'a Step) -> Option<&'a ResourceState> {
        step.new.as_ref().or(step.old.as_deref())
    }

    async fn run_resource_hooks(&self, step: &Step, position: &HookPosition) -> Result<()> {
        let Some(phase) = Self::hook_phase(step.op, position) else {
            return Ok(());
        };
        let Some(state) = Self::hook_state(step) else {
            return Ok(());
        };
        let names = state.hook_names(phase);
        if names.is_empty() {
            return Ok(());
        }
        let hooks = self.deployment.hooks.resource_hooks(names)?;
        for hook in hooks {
            if self.deployment.options.dry_run && !hook.on_dry_run {
                continue;
            }
            let args = ResourceHookArgs {
                cancel: self.deployment.cancel.clone(),
                urn: step.urn.clone(),
                id: state.id.clone(),
                new_inputs: step.new.as_ref().map(|n| n.inputs.clone()),
                old_inputs: step.old.as_ref().map(|o| o.inputs.clone()),
                new_outputs: step.new.as_ref().map(|n| n.outputs.clone()),
                old_outputs: step.old.as_ref().map(|o| o.outputs.clone()),
            };
            (hook.callback)(args).await.map_err(|message| Error::HookFailed {
                hook: hook.name.clone(),
                urn: step.urn.to_string(),
                message,
            })?;
        }
        Ok(())
    }

    // Provider invocation with error-hook retries.

    async fn invoke_with_retries(
        &self,
        step: &mut Step,
    ) -> std::result::Result<ResourceStatus, (ResourceStatus, Error)> {
        let hook_names: Vec<String> = Self::error_hook_phase(step.op)
            .and_then(|phase| Self::hook_state(step).map(|s| s.hook_names(phase).to_vec()))
            .unwrap_or_default();

        let mut errors: Vec<String> = Vec::new();
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let provider_error = match self.invoke_provider(step).await {
                Ok(()) => return Ok(ResourceStatus::Ok),
                Err(e) => e,
            };

            errors.insert(0, provider_error.to_string());
            let status = match &provider_error {
                ProviderError::Partial { .. } => ResourceStatus::PartialFailure,
                ProviderError::Unknown { .. } => ResourceStatus::Unknown,
                _ => ResourceStatus::Ok,
            };
            if let ProviderError::Partial { id, outputs, reasons } = &provider_error {
                if let Some(new) = step.new.as_mut() {
                    if !id.is_empty() {
                        new.id = id.clone();
                    }
                    new.outputs = outputs.clone();
                    new.init_errors = reasons.clone();
                }
            }
            let error = Error::ProviderError {
                urn: step.urn.to_string(),
                message: provider_error.to_string(),
            };

            if attempts >= MAX_OPERATION_ATTEMPTS || hook_names.is_empty() {
                return Err((status, error));
            }

            let hooks = match self.deployment.hooks.error_hooks(&hook_names) {
                Ok(hooks) => hooks,
                Err(e) => return Err((status, Error::Hooks(e))),
            };

            let mut retry = false;
            for hook in hooks {
                let args = ErrorHookArgs {
                    cancel: self.deployment.cancel.clone(),
                    urn: step.urn.clone(),
                    id: Self::hook_state(step).map(|s| s.id.clone()).unwrap_or_default(),
                    inputs: step.new.as_ref().map(|n| n.inputs.clone()),
                    errors: errors.clone(),
                };
                match (hook.callback)(args).await {
                    Ok(wants_retry) => retry = retry || wants_retry,
                    Err(message) => {
                        return Err((
                            status,
                            Error::HookFailed {
                                hook: hook.name.clone(),
                                urn: step.urn.to_string(),
                                message,
                            },
                        ));
                    }
                }
            }
            if !retry {
                return Err((status, error));
            }
            debug!(attempts, "error hook requested retry");
        }
    }

    fn provider_for(&self, state: &ResourceState) -> std::result::Result<Arc<dyn Provider>, ProviderError> {
        let resolved = match &state.provider {
            Some(reference) => self.deployment.providers.resolve(reference),
            None if state.urn.is_provider() => {
                let package = state.urn.provider_package().unwrap_or_default().to_string();
                return Ok(Arc::new(crate::provider::RegistryProvider::new(
                    Arc::clone(&self.deployment.providers),
                    package,
                )));
            }
            None => self
                .deployment
                .providers
                .provider_for_package(state.urn.package()),
        };
        resolved.map_err(|e| ProviderError::fatal(e.to_string()))
    }

    fn timeout_of(state: &ResourceState, pick: impl Fn(&converge_core::CustomTimeouts) -> f64) -> Option<Duration> {
        state
            .custom_timeouts
            .as_ref()
            .map(|t| pick(t))
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    async fn invoke_provider(&self, step: &mut Step) -> std::result::Result<(), ProviderError> {
        let preview = self.deployment.options.dry_run;
        match step.op {
            StepOp::Same
            | StepOp::Replace
            | StepOp::SkippedCreate
            | StepOp::ReadDiscard
            | StepOp::RemovePendingReplace
            | StepOp::View => Ok(()),

            StepOp::Create | StepOp::CreateReplacement => {
                let Some(new) = step.new.as_mut() else {
                    return Ok(());
                };
                if !new.custom {
                    return Ok(());
                }
                let provider = self.provider_for(new)?;
                let timeout = Self::timeout_of(new, |t| t.create);
                let outcome = provider.create(&step.urn, &new.inputs, timeout, preview).await?;
                new.id = outcome.id;
                new.outputs = outcome.outputs;
                new.init_errors.clear();
                Ok(())
            }

            StepOp::Update => {
                let Some(new) = step.new.as_mut() else {
                    return Ok(());
                };
                if !new.custom {
                    return Ok(());
                }
                let Some(old) = step.old.as_deref() else {
                    return Ok(());
                };
                let provider = self.provider_for(new)?;
                let timeout = Self::timeout_of(new, |t| t.update);
                let outcome = provider
                    .update(
                        &step.urn,
                        &old.id,
                        &old.inputs,
                        &old.outputs,
                        &new.inputs,
                        timeout,
                        &[],
                        preview,
                    )
                    .await?;
                new.outputs = outcome.outputs;
                new.init_errors.clear();
                Ok(())
            }

            StepOp::Delete | StepOp::DeleteReplaced => {
                let Some(old) = step.old.as_deref() else {
                    return Ok(());
                };
                if preview
                    || old.external
                    || old.retain_on_delete
                    || !old.custom
                    || old.id.is_empty()
                {
                    return Ok(());
                }
                let provider = self.provider_for(old)?;
                let timeout = Self::timeout_of(old, |t| t.delete);
                provider
                    .delete(&step.urn, &old.id, &old.inputs, &old.outputs, timeout)
                    .await
            }

            StepOp::Read | StepOp::ReadReplacement => {
                let Some(new) = step.new.as_mut() else {
                    return Ok(());
                };
                let provider = self.provider_for(new)?;
                let outcome = provider
                    .read(&step.urn, &new.id, Some(&new.inputs), None)
                    .await?;
                if !outcome.exists() {
                    return Err(ProviderError::fatal(format!(
                        "resource {} does not exist",
                        new.id
                    )));
                }
                new.id = outcome.id;
                if !outcome.inputs.is_empty() {
                    new.inputs = outcome.inputs;
                }
                new.outputs = outcome.outputs;
                Ok(())
            }

            StepOp::Refresh => {
                let Some(old) = step.old.as_deref() else {
                    return Ok(());
                };
                if !old.custom {
                    return Ok(());
                }
                let provider = self.provider_for(old)?;
                let outcome = provider
                    .read(&step.urn, &old.id, Some(&old.inputs), Some(&old.outputs))
                    .await?;
                if outcome.exists() {
                    if let Some(new) = step.new.as_mut() {
                        new.id = outcome.id;
                        if !outcome.inputs.is_empty() {
                            new.inputs = outcome.inputs;
                        }
                        new.outputs = outcome.outputs;
                    }
                } else {
                    // The live resource is gone; drop it from the snapshot.
                    step.new = None;
                }
                Ok(())
            }

            StepOp::Import | StepOp::ImportReplacement => {
                let Some(new) = step.new.as_mut() else {
                    return Ok(());
                };
                let provider = self.provider_for(new)?;
                let outcome = provider
                    .read(&step.urn, &new.import_id, Some(&new.inputs), None)
                    .await?;
                if !outcome.exists() {
                    return Err(ProviderError::fatal(format!(
                        "import failed: resource {} does not exist",
                        new.import_id
                    )));
                }
                new.id = outcome.id;
                if !outcome.inputs.is_empty() {
                    new.inputs = outcome.inputs;
                }
                new.outputs = outcome.outputs;
                Ok(())
            }
        }
    }

    // Views.

    /// Releases the step's token without applying anything; queued view
    /// sub-steps from the failed operation never reach the snapshot or the
    /// step event sink.
    fn discard_views(&self, step: &Step) {
        let (info, dropped) = self.deployment.status.release_token(&step.urn);
        if let Some(info) = info {
            if !dropped.is_empty() {
                self.deployment.diagnostics.warning(
                    Some(&info.urn),
                    &format!(
                        "discarding {} view step(s) published by a failed operation",
                        dropped.len()
                    ),
                );
            }
        }
    }

    fn drain_views(&self, step: &Step) {
        let (info, published) = self.deployment.status.release_token(&step.urn);
        let Some(info) = info else {
            return;
        };
        for view in published {
            let mut view_step = Step::new(StepOp::View, info.urn.clone());
            if let Some(new_view) = &view.step.new {
                match materialize_view_state(&info.urn, new_view, &self.deployment.prev) {
                    Ok(state) => {
                        view_step.urn = state.urn.clone();
                        if info.persisted && !view.step.op.is_deletion() {
                            self.deployment.sink.append(state.clone());
                        }
                        view_step.new = Some(state);
                    }
                    Err(e) => {
                        self.deployment.diagnostics.error(
                            Some(&info.urn),
                            &format!("discarding malformed view step: {e}"),
                        );
                        continue;
                    }
                }
            } else if let Some(old_view) = &view.step.old {
                if let Ok(view_urn) = view_state_urn(&info.urn, old_view) {
                    view_step.urn = view_urn;
                }
            }

            let error = (!view.step.error.is_empty()).then_some(view.step.error.as_str());
            if let Err(message) = self.deployment.step_events.on_step_post(
                view.payload,
                &view_step,
                view.step.status,
                error,
            ) {
                self.record_failure(Error::EventCallback { message });
            }
        }
    }

    // State commitment.

    fn commit(&self, step: &Step, status: ResourceStatus, failed: bool) {
        match step.op {
            StepOp::Same
            | StepOp::Create
            | StepOp::CreateReplacement
            | StepOp::Update
            | StepOp::Read
            | StepOp::ReadReplacement
            | StepOp::Import
            | StepOp::ImportReplacement
            | StepOp::Refresh => {
                if let Some(new) = &step.new {
                    if !failed {
                        if step.op == StepOp::CreateReplacement {
                            // Overwrite the pending-replacement marker a
                            // delete-before-replace left for this URN.
                            self.deployment.sink.replace(&step.urn, new.clone());
                        } else {
                            self.deployment.sink.append(new.clone());
                        }
                        if !matches!(step.op, StepOp::Read | StepOp::ReadReplacement) {
                            self.pending_news.insert(step.urn.clone(), new.clone());
                        }
                    } else if !new.init_errors.is_empty() {
                        // Partial failure: the resource exists but is not
                        // initialized; record it so the next run updates it.
                        self.deployment.sink.append(new.clone());
                    } else if let Some(old) = &step.old {
                        self.deployment.sink.append(old.as_ref().clone());
                    }
                }
            }

            StepOp::Delete | StepOp::DeleteReplaced => {
                let Some(old) = step.old.as_deref() else {
                    return;
                };
                if !failed {
                    if step.pending_replace {
                        let mut state = old.clone();
                        state.pending_replacement = true;
                        state.delete = false;
                        self.deployment.sink.append(state);
                    }
                } else if status == ResourceStatus::Unknown {
                    // State uncertain: preserve the resource as pending
                    // replacement rather than guessing.
                    let mut state = old.clone();
                    state.pending_replacement = true;
                    self.deployment.sink.append(state);
                } else {
                    self.deployment.sink.append(old.clone());
                }
            }

            StepOp::Replace
            | StepOp::RemovePendingReplace
            | StepOp::ReadDiscard
            | StepOp::SkippedCreate
            | StepOp::View => {}
        }
    }

    fn signal_event(&self, step: &mut Step, success: bool) {
        let Some(event) = step.event.take() else {
            return;
        };
        if let Some((_, tx)) = self.deployment.completions.remove(&event.0) {
            let state = if success && step.op != StepOp::SkippedCreate {
                step.new.clone()
            } else {
                None
            };
            let _ = tx.send(RegisterResult {
                urn: step.urn.clone(),
                state,
            });
        } else if let Some((_, tx)) = self.deployment.read_completions.remove(&event.0) {
            if success {
                if let Some(state) = step.new.clone() {
                    let _ = tx.send(ReadResult { state });
                }
            }
        }
    }
}
