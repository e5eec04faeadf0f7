//! Shared test support: a scriptable in-memory provider, a recording step
//! event sink, and a harness that wires a deployment to a test program.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use converge_core::{
    CheckFailure, DiffChanges, DiffResult, Goal, InMemorySnapshotSink, PropertyMap, PropertyPath,
    ProviderReference, ResourceState, ResourceStatus, Snapshot, SnapshotSink, Step, StepOp, Urn,
};
use converge_engine::{
    CheckOutcome, CreateOutcome, Deployment, DeploymentOptions, DeploymentSummary, EventSource,
    Provider, ProviderResult, ReadOutcome, StepEventSink, StepPayload, UpdateOutcome,
};
use converge_hooks::HookRegistry;
use parking_lot::Mutex;
use serde_json::Value;

/// Package every test resource belongs to.
pub const PACKAGE: &str = "t";

/// Resource type used by most tests.
pub const RESOURCE_TYPE: &str = "t:m:R";

pub fn urn(name: &str) -> Urn {
    format!("urn:deploy:dev::web::::{RESOURCE_TYPE}::{name}")
        .parse()
        .unwrap()
}

pub fn pm(value: Value) -> PropertyMap {
    match value {
        Value::Object(map) => map,
        _ => PropertyMap::new(),
    }
}

pub fn default_provider_reference() -> ProviderReference {
    ProviderReference::new(
        Urn::default_provider("dev", "web", PACKAGE).unwrap(),
        "default",
    )
}

/// A prior custom state managed by the test provider.
pub fn custom_state(name: &str, id: &str, inputs: Value, outputs: Value) -> ResourceState {
    let mut state = ResourceState::new(urn(name));
    state.custom = true;
    state.id = id.to_string();
    state.inputs = pm(inputs);
    state.outputs = pm(outputs);
    state.provider = Some(default_provider_reference());
    state
}

/// A goal registering a custom resource of the test type.
pub fn goal(name: &str, inputs: Value) -> Goal {
    Goal {
        ty: RESOURCE_TYPE.to_string(),
        name: name.to_string(),
        custom: true,
        inputs: pm(inputs),
        ..Goal::default()
    }
}

type DiffFn =
    dyn Fn(&Urn, &PropertyMap, &PropertyMap) -> ProviderResult<DiffResult> + Send + Sync;
type CreateFn = dyn Fn(&Urn, &PropertyMap, usize) -> ProviderResult<CreateOutcome> + Send + Sync;

/// Scriptable provider counting its calls.
pub struct MockProvider {
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    diff_fn: Box<DiffFn>,
    create_fn: Box<CreateFn>,
    reads: Mutex<HashMap<String, ReadOutcome>>,
}

impl MockProvider {
    /// A provider that diffs structurally (no replacements) and mints
    /// sequential ids.
    pub fn new() -> Self {
        Self {
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            diff_fn: Box::new(|_, old, new| Ok(structural_diff(old, new))),
            create_fn: Box::new(|_, inputs, n| {
                Ok(CreateOutcome {
                    id: format!("id-{n}"),
                    outputs: inputs.clone(),
                })
            }),
            reads: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_diff(
        mut self,
        f: impl Fn(&Urn, &PropertyMap, &PropertyMap) -> ProviderResult<DiffResult>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.diff_fn = Box::new(f);
        self
    }

    pub fn with_create(
        mut self,
        f: impl Fn(&Urn, &PropertyMap, usize) -> ProviderResult<CreateOutcome> + Send + Sync + 'static,
    ) -> Self {
        self.create_fn = Box::new(f);
        self
    }

    /// Scripts the outcome of reading `id`.
    pub fn with_read(self, id: &str, outcome: ReadOutcome) -> Self {
        self.reads.lock().insert(id.to_string(), outcome);
        self
    }
}

/// Top-level structural diff used as the default mock behavior.
pub fn structural_diff(old: &PropertyMap, new: &PropertyMap) -> DiffResult {
    let mut changed: Vec<String> = Vec::new();
    for (key, value) in old {
        if new.get(key) != Some(value) {
            changed.push(key.clone());
        }
    }
    for key in new.keys() {
        if !old.contains_key(key) && !changed.contains(key) {
            changed.push(key.clone());
        }
    }
    if changed.is_empty() {
        DiffResult::none()
    } else {
        DiffResult {
            changes: DiffChanges::Some,
            changed_keys: changed,
            ..DiffResult::default()
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn check(
        &self,
        _urn: &Urn,
        _olds: Option<&PropertyMap>,
        news: &PropertyMap,
        _allow_unknowns: bool,
        _seed: [u8; 32],
    ) -> ProviderResult<CheckOutcome> {
        Ok(CheckOutcome {
            inputs: news.clone(),
            failures: Vec::<CheckFailure>::new(),
        })
    }

    async fn diff(
        &self,
        urn: &Urn,
        _id: &str,
        old_inputs: &PropertyMap,
        _old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        _allow_unknowns: bool,
        _ignore_changes: &[PropertyPath],
    ) -> ProviderResult<DiffResult> {
        (self.diff_fn)(urn, old_inputs, new_inputs)
    }

    async fn diff_config(
        &self,
        _urn: &Urn,
        old_inputs: &PropertyMap,
        new_inputs: &PropertyMap,
        _allow_unknowns: bool,
        _ignore_changes: &[PropertyPath],
    ) -> ProviderResult<DiffResult> {
        Ok(structural_diff(old_inputs, new_inputs))
    }

    async fn configure(&self, _inputs: &PropertyMap) -> ProviderResult<()> {
        Ok(())
    }

    async fn create(
        &self,
        urn: &Urn,
        inputs: &PropertyMap,
        _timeout: Option<Duration>,
        _preview: bool,
    ) -> ProviderResult<CreateOutcome> {
        let attempt = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.create_fn)(urn, inputs, attempt)
    }

    async fn update(
        &self,
        _urn: &Urn,
        _id: &str,
        _old_inputs: &PropertyMap,
        _old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        _timeout: Option<Duration>,
        _ignore_changes: &[PropertyPath],
        _preview: bool,
    ) -> ProviderResult<UpdateOutcome> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UpdateOutcome {
            outputs: new_inputs.clone(),
        })
    }

    async fn delete(
        &self,
        _urn: &Urn,
        _id: &str,
        _old_inputs: &PropertyMap,
        _old_outputs: &PropertyMap,
        _timeout: Option<Duration>,
    ) -> ProviderResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(
        &self,
        _urn: &Urn,
        id: &str,
        inputs: Option<&PropertyMap>,
        state: Option<&PropertyMap>,
    ) -> ProviderResult<ReadOutcome> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.reads.lock().get(id) {
            return Ok(outcome.clone());
        }
        Ok(ReadOutcome {
            id: id.to_string(),
            inputs: inputs.cloned().unwrap_or_default(),
            outputs: state.cloned().unwrap_or_default(),
        })
    }
}

/// Step completions in execution order: operation, resource name, failure.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    completions: Mutex<Vec<(StepOp, String, bool)>>,
    outputs: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed operations (op, resource name), successes and failures.
    pub fn ops(&self) -> Vec<(StepOp, String)> {
        self.completions
            .lock()
            .iter()
            .map(|(op, name, _)| (*op, name.clone()))
            .collect()
    }

    pub fn output_urns(&self) -> Vec<String> {
        self.outputs.lock().clone()
    }
}

impl StepEventSink for RecordingEvents {
    fn on_step_pre(&self, step: &Step) -> Option<StepPayload> {
        Some(Box::new(step.urn.to_string()))
    }

    fn on_step_post(
        &self,
        payload: Option<StepPayload>,
        step: &Step,
        _status: ResourceStatus,
        error: Option<&str>,
    ) -> Result<(), String> {
        // The payload from pre must round-trip.
        if step.op != StepOp::View {
            let correlated = payload
                .and_then(|p| p.downcast::<String>().ok())
                .is_some_and(|p| *p == step.urn.to_string());
            assert!(correlated, "payload lost for {}", step.urn);
        }
        self.completions.lock().push((
            step.op,
            step.urn.name().to_string(),
            error.is_some(),
        ));
        Ok(())
    }

    fn on_outputs(&self, urn: &Urn, _outputs: &PropertyMap) -> Result<(), String> {
        self.outputs.lock().push(urn.to_string());
        Ok(())
    }
}

/// One-deployment test rig with a serial executor for deterministic step
/// ordering.
pub struct Harness {
    pub provider: Arc<MockProvider>,
    pub sink: Arc<InMemorySnapshotSink>,
    pub events: Arc<RecordingEvents>,
    pub hooks: Arc<HookRegistry>,
    pub prev: Snapshot,
    pub options: DeploymentOptions,
}

impl Harness {
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            sink: Arc::new(InMemorySnapshotSink::new()),
            events: Arc::new(RecordingEvents::new()),
            hooks: Arc::new(HookRegistry::new()),
            prev: Snapshot::default(),
            options: DeploymentOptions {
                parallel: 1,
                ..DeploymentOptions::default()
            },
        }
    }

    pub fn with_prev(mut self, states: Vec<ResourceState>) -> Self {
        self.prev = Snapshot::new(states);
        self
    }

    pub fn with_options(mut self, options: DeploymentOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs a deployment against a test program; returns the result and the
    /// states the sink collected.
    pub async fn run<F, Fut>(
        &self,
        program: F,
    ) -> (converge_engine::Result<DeploymentSummary>, Vec<ResourceState>)
    where
        F: FnOnce(EventSource) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (source, rx) = EventSource::new();
        let deployment = Deployment::builder("dev", "web")
            .options(self.options.clone())
            .prev(self.prev.clone())
            .provider(PACKAGE, Arc::clone(&self.provider) as Arc<dyn Provider>)
            .hooks(Arc::clone(&self.hooks))
            .sink(Arc::clone(&self.sink) as Arc<dyn SnapshotSink>)
            .step_events(Arc::clone(&self.events) as Arc<dyn StepEventSink>)
            .build();

        let program_task = tokio::spawn(program(source));
        let result = deployment.run(rx).await;
        let _ = program_task.await;
        (result, self.sink.states())
    }
}
