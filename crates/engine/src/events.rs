//! Program event stream and engine event sinks.
//!
//! The program side holds an [`EventSource`] and registers resources through
//! it; the engine consumes the resulting [`ProgramEvent`] stream in
//! registration order. Completion flows back through per-event oneshot
//! channels. The engine's own observers, the step lifecycle callbacks and
//! the diagnostic sink, are capability traits the host implements.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use converge_core::{
    EventId, Goal, PropertyMap, ResourceState, ResourceStatus, Step, Urn,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// One event from the running program.
#[derive(Debug)]
pub enum ProgramEvent {
    /// A resource registration.
    RegisterResource(RegisterResourceEvent),
    /// A read of an external resource.
    ReadResource(ReadResourceEvent),
    /// Outputs for a previously registered resource.
    RegisterResourceOutputs(RegisterOutputsEvent),
}

/// Payload of a RegisterResource event.
#[derive(Debug)]
pub struct RegisterResourceEvent {
    /// Correlates the event with the steps it produces.
    pub id: EventId,
    /// The desired state.
    pub goal: Goal,
    /// Signalled once the resource's step completes.
    pub done: oneshot::Sender<RegisterResult>,
}

/// Completion payload of a RegisterResource event.
#[derive(Debug, Clone)]
pub struct RegisterResult {
    /// The resource's URN.
    pub urn: Urn,
    /// The resulting state; `None` for skipped creates.
    pub state: Option<ResourceState>,
}

/// Payload of a ReadResource event.
#[derive(Debug)]
pub struct ReadResourceEvent {
    /// Correlates the event with the steps it produces.
    pub id: EventId,
    /// Provider-side id to read.
    pub resource_id: String,
    /// Resource type.
    pub ty: String,
    /// Resource name.
    pub name: String,
    /// Parent URN, if any.
    pub parent: Option<Urn>,
    /// Provider reference text; empty requests the default provider.
    pub provider: String,
    /// Input properties for the read.
    pub properties: PropertyMap,
    /// Dependencies of the read.
    pub dependencies: Vec<Urn>,
    /// Signalled once the read completes.
    pub done: oneshot::Sender<ReadResult>,
}

/// Completion payload of a ReadResource event.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// The read state.
    pub state: ResourceState,
}

/// Payload of a RegisterResourceOutputs event.
#[derive(Debug)]
pub struct RegisterOutputsEvent {
    /// URN the outputs belong to.
    pub urn: Urn,
    /// The program-supplied outputs.
    pub outputs: PropertyMap,
    /// Signalled once the outputs are recorded.
    pub done: oneshot::Sender<()>,
}

/// Program-side handle producing the event stream.
#[derive(Debug, Clone)]
pub struct EventSource {
    tx: mpsc::UnboundedSender<ProgramEvent>,
    counter: Arc<AtomicU64>,
}

impl EventSource {
    /// Creates a source and the engine-side receiver for its events.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgramEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                counter: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    fn next_id(&self) -> EventId {
        EventId(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a resource; the returned receiver resolves when its step
    /// completes.
    pub fn register_resource(&self, goal: Goal) -> oneshot::Receiver<RegisterResult> {
        let (done, rx) = oneshot::channel();
        let event = RegisterResourceEvent {
            id: self.next_id(),
            goal,
            done,
        };
        let _ = self.tx.send(ProgramEvent::RegisterResource(event));
        rx
    }

    /// Reads an external resource.
    pub fn read_resource(
        &self,
        resource_id: impl Into<String>,
        ty: impl Into<String>,
        name: impl Into<String>,
        parent: Option<Urn>,
        provider: impl Into<String>,
        properties: PropertyMap,
        dependencies: Vec<Urn>,
    ) -> oneshot::Receiver<ReadResult> {
        let (done, rx) = oneshot::channel();
        let event = ReadResourceEvent {
            id: self.next_id(),
            resource_id: resource_id.into(),
            ty: ty.into(),
            name: name.into(),
            parent,
            provider: provider.into(),
            properties,
            dependencies,
            done,
        };
        let _ = self.tx.send(ProgramEvent::ReadResource(event));
        rx
    }

    /// Publishes outputs for a previously registered resource.
    pub fn register_resource_outputs(
        &self,
        urn: Urn,
        outputs: PropertyMap,
    ) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        let event = RegisterOutputsEvent { urn, outputs, done };
        let _ = self.tx.send(ProgramEvent::RegisterResourceOutputs(event));
        rx
    }
}

/// Opaque correlation payload threaded from a pre-callback to its post.
pub type StepPayload = Box<dyn Any + Send>;

/// Step lifecycle callbacks the host installs.
///
/// `on_step_post` and `on_outputs` return `Err` to cancel the deployment.
pub trait StepEventSink: Send + Sync {
    /// Fired before a step executes; the payload is handed back on post.
    fn on_step_pre(&self, step: &Step) -> Option<StepPayload>;

    /// Fired after a step executes, successfully or not.
    fn on_step_post(
        &self,
        payload: Option<StepPayload>,
        step: &Step,
        status: ResourceStatus,
        error: Option<&str>,
    ) -> std::result::Result<(), String>;

    /// Fired when a resource's outputs are recorded.
    fn on_outputs(&self, urn: &Urn, outputs: &PropertyMap) -> std::result::Result<(), String>;
}

/// A sink that ignores step events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStepEvents;

impl StepEventSink for NoopStepEvents {
    fn on_step_pre(&self, _step: &Step) -> Option<StepPayload> {
        None
    }

    fn on_step_post(
        &self,
        _payload: Option<StepPayload>,
        _step: &Step,
        _status: ResourceStatus,
        _error: Option<&str>,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    fn on_outputs(&self, _urn: &Urn, _outputs: &PropertyMap) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Engine diagnostics: warnings and errors attributed to resources.
pub trait DiagnosticSink: Send + Sync {
    /// An informational message.
    fn info(&self, urn: Option<&Urn>, message: &str);
    /// A warning the user should see.
    fn warning(&self, urn: Option<&Urn>, message: &str);
    /// An error the user must see.
    fn error(&self, urn: Option<&Urn>, message: &str);
}

/// Diagnostic sink backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn info(&self, urn: Option<&Urn>, message: &str) {
        match urn {
            Some(urn) => info!(%urn, "{message}"),
            None => info!("{message}"),
        }
    }

    fn warning(&self, urn: Option<&Urn>, message: &str) {
        match urn {
            Some(urn) => warn!(%urn, "{message}"),
            None => warn!("{message}"),
        }
    }

    fn error(&self, urn: Option<&Urn>, message: &str) {
        match urn {
            Some(urn) => error!(%urn, "{message}"),
            None => error!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_submission_order() {
        let (source, mut rx) = EventSource::new();

        let _r1 = source.register_resource(Goal {
            ty: "t:m:A".to_string(),
            name: "a".to_string(),
            custom: true,
            ..Goal::default()
        });
        let _r2 = source.register_resource_outputs(
            "urn:deploy:dev::web::::t:m:A::a".parse().unwrap(),
            PropertyMap::new(),
        );

        match rx.recv().await.unwrap() {
            ProgramEvent::RegisterResource(e) => assert_eq!(e.goal.name, "a"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ProgramEvent::RegisterResourceOutputs(e) => assert_eq!(e.urn.name(), "a"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn event_ids_are_unique_and_increasing() {
        let (source, mut rx) = EventSource::new();
        let _ = source.register_resource(Goal::default());
        let _ = source.register_resource(Goal::default());

        let first = match rx.recv().await.unwrap() {
            ProgramEvent::RegisterResource(e) => e.id,
            other => panic!("unexpected event: {other:?}"),
        };
        let second = match rx.recv().await.unwrap() {
            ProgramEvent::RegisterResource(e) => e.id,
            other => panic!("unexpected event: {other:?}"),
        };
        assert!(second.0 > first.0);
    }
}
