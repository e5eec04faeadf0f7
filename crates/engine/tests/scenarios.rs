//! End-to-end deployment scenarios: one running program, a scripted
//! provider, and assertions on the generated step sequence and the
//! resulting snapshot.

mod support;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use converge_core::property::is_unknown;
use converge_core::{DiffChanges, DiffResult, Goal, HookPhase, PropertyMap, StepOp};
use converge_engine::{
    DeploymentOptions, Error, OutputWaiterStore, ProviderError, ReadOutcome,
};
use converge_hooks::{ErrorHook, ErrorHookFn};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use support::{custom_state, goal, pm, urn, Harness, MockProvider};

fn ops_only(ops: &[(StepOp, String)]) -> Vec<(StepOp, &str)> {
    ops.iter().map(|(op, name)| (*op, name.as_str())).collect()
}

#[tokio::test]
async fn no_op_when_nothing_changed() {
    let provider = MockProvider::new().with_diff(|_, _, _| Ok(DiffResult::none()));
    let harness = Harness::new(provider)
        .with_prev(vec![custom_state("a", "i-1", json!({"k": 1}), json!({"o": 2}))]);

    let (result, states) = harness
        .run(|source| async move {
            let done = source.register_resource(goal("a", json!({"k": 1})));
            done.await.unwrap();
        })
        .await;

    result.unwrap();
    assert_eq!(ops_only(&harness.events.ops()), vec![(StepOp::Same, "a")]);

    // The next snapshot equals the old one.
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].id, "i-1");
    assert_eq!(states[0].inputs, pm(json!({"k": 1})));
    assert_eq!(states[0].outputs, pm(json!({"o": 2})));
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn in_place_update_keeps_the_id() {
    let provider = MockProvider::new();
    let harness = Harness::new(provider)
        .with_prev(vec![custom_state("a", "i-1", json!({"k": 1}), json!({"o": 2}))]);

    let (result, states) = harness
        .run(|source| async move {
            let done = source.register_resource(goal("a", json!({"k": 2})));
            let result = done.await.unwrap();
            assert_eq!(result.state.unwrap().inputs, pm(json!({"k": 2})));
        })
        .await;

    result.unwrap();
    assert_eq!(ops_only(&harness.events.ops()), vec![(StepOp::Update, "a")]);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].id, "i-1");
    assert_eq!(states[0].inputs, pm(json!({"k": 2})));
    // Outputs come from the provider's update.
    assert_eq!(states[0].outputs, pm(json!({"k": 2})));
    assert_eq!(harness.provider.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn create_before_delete_replacement() {
    let provider = MockProvider::new().with_diff(|_, old, new| {
        if old.get("k") == new.get("k") {
            Ok(DiffResult::none())
        } else {
            Ok(DiffResult {
                changes: DiffChanges::Some,
                replace_keys: vec!["k".to_string()],
                changed_keys: vec!["k".to_string()],
                ..DiffResult::default()
            })
        }
    });
    let harness = Harness::new(provider)
        .with_prev(vec![custom_state("a", "i-1", json!({"k": 1}), json!({"o": 2}))]);

    let (result, states) = harness
        .run(|source| async move {
            let done = source.register_resource(goal("a", json!({"k": 2})));
            done.await.unwrap();
        })
        .await;

    result.unwrap();
    // The create lands first; the old copy is deleted at the end of the run.
    assert_eq!(
        ops_only(&harness.events.ops()),
        vec![
            (StepOp::CreateReplacement, "a"),
            (StepOp::Replace, "a"),
            (StepOp::DeleteReplaced, "a"),
        ]
    );
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.provider.delete_calls.load(Ordering::SeqCst), 1);

    assert_eq!(states.len(), 1);
    assert_eq!(states[0].id, "id-1");
    assert_eq!(states[0].inputs, pm(json!({"k": 2})));
}

#[tokio::test]
async fn delete_before_replace_cascades_through_dependents() {
    // r is replaced delete-before-replace; d1 has a property dependency on
    // r, d2 on d1. Probing either with unknown inputs reports a replace.
    let provider = MockProvider::new().with_diff(|urn, old, new| {
        let unknown_keys: Vec<String> = new
            .iter()
            .filter(|(_, v)| is_unknown(v))
            .map(|(k, _)| k.clone())
            .collect();
        if !unknown_keys.is_empty() {
            return Ok(DiffResult {
                changes: DiffChanges::Some,
                replace_keys: unknown_keys.clone(),
                changed_keys: unknown_keys,
                ..DiffResult::default()
            });
        }
        if urn.name() == "r" && old.get("x") != new.get("x") {
            return Ok(DiffResult {
                changes: DiffChanges::Some,
                replace_keys: vec!["x".to_string()],
                changed_keys: vec!["x".to_string()],
                delete_before_replace: true,
                ..DiffResult::default()
            });
        }
        Ok(DiffResult::none())
    });

    let r = custom_state("r", "r-1", json!({"x": 1}), json!({}));
    let mut d1 = custom_state("d1", "d1-1", json!({"p": "v"}), json!({}));
    d1.dependencies = vec![urn("r")];
    d1.property_dependencies = BTreeMap::from([("p".to_string(), vec![urn("r")])]);
    let mut d2 = custom_state("d2", "d2-1", json!({"q": "w"}), json!({}));
    d2.dependencies = vec![urn("d1")];
    d2.property_dependencies = BTreeMap::from([("q".to_string(), vec![urn("d1")])]);

    let harness = Harness::new(provider).with_prev(vec![r, d1, d2]);

    let (result, states) = harness
        .run(|source| async move {
            let r_done = source.register_resource(goal("r", json!({"x": 2})));
            r_done.await.unwrap();
            let mut g1 = goal("d1", json!({"p": "v"}));
            g1.dependencies = vec![urn("r")];
            g1.property_dependencies = BTreeMap::from([("p".to_string(), vec![urn("r")])]);
            let d1_done = source.register_resource(g1);
            d1_done.await.unwrap();
            let mut g2 = goal("d2", json!({"q": "w"}));
            g2.dependencies = vec![urn("d1")];
            g2.property_dependencies = BTreeMap::from([("q".to_string(), vec![urn("d1")])]);
            let d2_done = source.register_resource(g2);
            d2_done.await.unwrap();
        })
        .await;

    result.unwrap();
    assert_eq!(
        ops_only(&harness.events.ops()),
        vec![
            (StepOp::DeleteReplaced, "d2"),
            (StepOp::DeleteReplaced, "d1"),
            (StepOp::DeleteReplaced, "r"),
            (StepOp::Replace, "r"),
            (StepOp::CreateReplacement, "r"),
            (StepOp::Replace, "d1"),
            (StepOp::CreateReplacement, "d1"),
            (StepOp::Replace, "d2"),
            (StepOp::CreateReplacement, "d2"),
        ]
    );

    // All three were recreated with fresh ids.
    let live: Vec<&str> = states
        .iter()
        .filter(|s| !s.pending_replacement)
        .map(|s| s.urn.name())
        .collect();
    assert_eq!(live.len(), 3, "live states: {live:?}");
    assert_eq!(harness.provider.delete_calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn protect_forbids_delete() {
    let provider = MockProvider::new();
    let mut protected = custom_state("x", "i-1", json!({}), json!({}));
    protected.protect = true;
    let harness = Harness::new(provider).with_prev(vec![protected]);

    let (result, _) = harness.run(|source| async move { drop(source) }).await;

    let error = result.unwrap_err();
    assert!(matches!(error, Error::ProtectedDelete { .. }), "{error}");
    assert!(error.to_string().contains("protected"));
    // No steps ran at all.
    assert!(harness.events.ops().is_empty());
    assert_eq!(harness.provider.delete_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn error_hook_retries_are_capped_at_one_hundred() {
    let provider = MockProvider::new()
        .with_create(|_, _, _| Err(ProviderError::fatal("E")));
    let harness = Harness::new(provider);

    let callback: ErrorHookFn = Arc::new(|args| {
        Box::pin(async move {
            // Errors accumulate most recent first.
            assert!(args.errors[0].contains('E'));
            Ok(true)
        })
    });
    harness
        .hooks
        .register_error_hook(ErrorHook {
            name: "always-retry".to_string(),
            callback,
        })
        .unwrap();

    let (result, states) = harness
        .run(|source| async move {
            let mut g = goal("n", json!({"k": 1}));
            g.hooks = BTreeMap::from([(
                HookPhase::OnCreateError,
                vec!["always-retry".to_string()],
            )]);
            let done = source.register_resource(g);
            let outcome = done.await.unwrap();
            assert!(outcome.state.is_none());
        })
        .await;

    assert!(result.is_err());
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 100);
    assert!(states.is_empty());
}

#[tokio::test]
async fn co_deployed_output_wait_detects_cycles() {
    let store = Arc::new(OutputWaiterStore::new([
        "s1".to_string(),
        "s2".to_string(),
    ]));

    let cancel = CancellationToken::new();
    let first_store = Arc::clone(&store);
    let first_cancel = cancel.clone();
    let first = tokio::spawn(async move {
        first_store.wait_for_outputs(first_cancel, "s1", "s2").await
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // The second wait closes the loop and must fail fast.
    let second = store
        .wait_for_outputs(CancellationToken::new(), "s2", "s1")
        .await;
    assert!(matches!(second, Err(Error::OutputWaitCycle { .. })));

    // Neither call blocks indefinitely.
    cancel.cancel();
    assert!(matches!(
        first.await.unwrap(),
        Err(Error::OutputWaitCancelled { .. })
    ));
}

#[tokio::test]
async fn skipped_creates_materialize_once_targeted() {
    let provider = MockProvider::new();
    let mut options = DeploymentOptions {
        parallel: 1,
        ..DeploymentOptions::default()
    };
    options.targets.insert(urn("other"));
    let harness = Harness::new(provider).with_options(options);

    let (result, states) = harness
        .run(|source| async move {
            let done = source.register_resource(goal("a", json!({"k": 1})));
            let outcome = done.await.unwrap();
            assert!(outcome.state.is_none());
        })
        .await;

    result.unwrap();
    assert_eq!(
        ops_only(&harness.events.ops()),
        vec![(StepOp::SkippedCreate, "a")]
    );
    // A skipped create leaves nothing in the snapshot.
    assert!(states.is_empty());

    // Targeting the URN in a later deployment materializes it.
    let mut options = DeploymentOptions {
        parallel: 1,
        ..DeploymentOptions::default()
    };
    options.targets.insert(urn("a"));
    let second = Harness::new(MockProvider::new()).with_options(options);
    let (result, states) = second
        .run(|source| async move {
            let done = source.register_resource(goal("a", json!({"k": 1})));
            assert!(done.await.unwrap().state.is_some());
        })
        .await;
    result.unwrap();
    assert_eq!(
        ops_only(&second.events.ops()),
        vec![(StepOp::Create, "a")]
    );
    assert_eq!(states.len(), 1);
}

#[tokio::test]
async fn import_adopts_an_existing_resource() {
    let provider = MockProvider::new().with_read(
        "ext-1",
        ReadOutcome {
            id: "ext-1".to_string(),
            inputs: pm(json!({"k": 1})),
            outputs: pm(json!({"o": 9})),
        },
    );
    let harness = Harness::new(provider);

    let (result, states) = harness
        .run(|source| async move {
            let mut g = goal("a", json!({"k": 1}));
            g.id = "ext-1".to_string();
            let done = source.register_resource(g);
            done.await.unwrap();
        })
        .await;

    result.unwrap();
    assert_eq!(ops_only(&harness.events.ops()), vec![(StepOp::Import, "a")]);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].id, "ext-1");
    assert_eq!(states[0].import_id, "ext-1");
    assert_eq!(states[0].outputs, pm(json!({"o": 9})));
}

#[tokio::test]
async fn read_records_an_external_state() {
    let provider = MockProvider::new().with_read(
        "ext-9",
        ReadOutcome {
            id: "ext-9".to_string(),
            inputs: pm(json!({"k": 1})),
            outputs: pm(json!({"zone": "b"})),
        },
    );
    let harness = Harness::new(provider);

    let (result, states) = harness
        .run(|source| async move {
            let done = source.read_resource(
                "ext-9",
                support::RESOURCE_TYPE,
                "looked-up",
                None,
                "",
                PropertyMap::new(),
                Vec::new(),
            );
            let outcome = done.await.unwrap();
            assert!(outcome.state.external);
        })
        .await;

    result.unwrap();
    assert_eq!(
        ops_only(&harness.events.ops()),
        vec![(StepOp::Read, "looked-up")]
    );
    assert_eq!(states.len(), 1);
    assert!(states[0].external);
    assert_eq!(states[0].outputs, pm(json!({"zone": "b"})));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let provider = MockProvider::new();
    let harness = Harness::new(provider);

    let (result, _) = harness
        .run(|source| async move {
            let first = source.register_resource(goal("a", json!({})));
            first.await.unwrap();
            let second = source.register_resource(goal("a", json!({})));
            // The generator rejects the duplicate; its completion channel
            // closes without a result.
            assert!(second.await.is_err());
        })
        .await;

    assert!(matches!(result, Err(Error::DuplicateUrn { .. })));
}

#[tokio::test]
async fn outputs_merge_into_the_registered_state() {
    let provider = MockProvider::new();
    let harness = Harness::new(provider);

    let (result, states) = harness
        .run(|source| async move {
            let done = source.register_resource(Goal {
                ty: "t:m:Component".to_string(),
                name: "comp".to_string(),
                custom: false,
                ..Goal::default()
            });
            let outcome = done.await.unwrap();
            let registered = outcome.urn;
            source
                .register_resource_outputs(registered, pm(json!({"endpoint": "https://x"})))
                .await
                .unwrap();
        })
        .await;

    result.unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].outputs, pm(json!({"endpoint": "https://x"})));
    assert_eq!(harness.events.output_urns().len(), 1);
}

#[tokio::test]
async fn dependent_creates_wait_for_their_dependencies() {
    // With parallelism available, b must still create after a.
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    let provider = MockProvider::new().with_create(move |urn, inputs, n| {
        seen.lock().push(urn.name().to_string());
        Ok(converge_engine::CreateOutcome {
            id: format!("id-{n}"),
            outputs: inputs.clone(),
        })
    });
    let harness = Harness::new(provider).with_options(DeploymentOptions {
        parallel: 8,
        ..DeploymentOptions::default()
    });

    let (result, states) = harness
        .run(|source| async move {
            let a = source.register_resource(goal("a", json!({"k": 1})));
            let mut gb = goal("b", json!({"k": 2}));
            gb.dependencies = vec![urn("a")];
            let b = source.register_resource(gb);
            let (a, b) = tokio::join!(a, b);
            a.unwrap();
            b.unwrap();
        })
        .await;

    result.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(*order.lock(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn targeted_resource_requiring_a_skipped_create_bails() {
    let provider = MockProvider::new();
    let mut options = DeploymentOptions {
        parallel: 1,
        ..DeploymentOptions::default()
    };
    options.targets.insert(urn("b"));
    let harness = Harness::new(provider).with_options(options);

    let (result, states) = harness
        .run(|source| async move {
            // a is untargeted and skipped; b is targeted and builds on it.
            let a = source.register_resource(goal("a", json!({})));
            assert!(a.await.unwrap().state.is_none());
            let mut gb = goal("b", json!({}));
            gb.dependencies = vec![urn("a")];
            let b = source.register_resource(gb);
            assert!(b.await.is_err());
        })
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, Error::UntargetedCreate { .. }), "{error}");
    assert!(error.is_bail());
    assert!(states.is_empty());
}

#[tokio::test]
async fn failed_steps_discard_queued_view_steps() {
    use converge_core::{
        InMemorySnapshotSink, ResourceStatus as CoreStatus, SnapshotSink, ViewStep, ViewStepState,
    };
    use converge_engine::{Deployment, EventSource, Provider};
    use converge_status::StatusRegistry;

    let registry = Arc::new(StatusRegistry::new());
    let publishing = Arc::clone(&registry);
    let provider = MockProvider::new().with_create(move |urn, _inputs, _n| {
        // Publish a view sub-step mid-operation, then fail the create.
        let token = publishing.token_for(urn).unwrap();
        publishing
            .publish(
                &token,
                vec![ViewStep {
                    op: StepOp::Create,
                    status: CoreStatus::Ok,
                    error: String::new(),
                    old: None,
                    new: Some(ViewStepState {
                        ty: "t:m:Sub".to_string(),
                        name: "v".to_string(),
                        parent_type: String::new(),
                        inputs: PropertyMap::new(),
                        outputs: PropertyMap::new(),
                    }),
                    keys: Vec::new(),
                    diffs: Vec::new(),
                    has_detailed_diff: false,
                    detailed_diff: BTreeMap::new(),
                }],
            )
            .unwrap();
        Err(ProviderError::fatal("create failed after publishing views"))
    });

    let sink = Arc::new(InMemorySnapshotSink::new());
    let (source, events) = EventSource::new();
    let deployment = Deployment::builder("dev", "web")
        .provider(support::PACKAGE, Arc::new(provider) as Arc<dyn Provider>)
        .status(Arc::clone(&registry))
        .sink(Arc::clone(&sink) as Arc<dyn SnapshotSink>)
        .build();

    let program = tokio::spawn(async move {
        let done = source.register_resource(goal("a", json!({"k": 1})));
        assert!(done.await.unwrap().state.is_none());
    });
    let result = deployment.run(events).await;
    program.await.unwrap();

    assert!(result.is_err());
    // Nothing from the failed operation reaches the snapshot.
    assert!(sink.states().is_empty());
    // The token was still released.
    assert!(registry.token_for(&urn("a")).is_none());
}

#[tokio::test]
async fn refresh_pulls_live_state() {
    use converge_core::{InMemorySnapshotSink, Snapshot, SnapshotSink};
    use converge_engine::{Deployment, Provider};

    let provider = MockProvider::new().with_read(
        "i-1",
        ReadOutcome {
            id: "i-1".to_string(),
            inputs: pm(json!({"k": 1})),
            outputs: pm(json!({"live": true})),
        },
    );
    let sink = Arc::new(InMemorySnapshotSink::new());
    let deployment = Deployment::builder("dev", "web")
        .prev(Snapshot::new(vec![custom_state(
            "a",
            "i-1",
            json!({"k": 1}),
            json!({"stale": true}),
        )]))
        .provider(support::PACKAGE, Arc::new(provider) as Arc<dyn Provider>)
        .sink(Arc::clone(&sink) as Arc<dyn SnapshotSink>)
        .build();

    let summary = deployment.refresh().await.unwrap();
    assert_eq!(summary.count(StepOp::Refresh), 1);

    let states = sink.states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].outputs, pm(json!({"live": true})));
}

#[tokio::test]
async fn importer_creates_stack_provider_and_imports() {
    use converge_core::{InMemorySnapshotSink, SnapshotSink};
    use converge_engine::{Deployment, ImportRequest, Importer, Provider};

    let provider = MockProvider::new().with_read(
        "bx-1",
        ReadOutcome {
            id: "bx-1".to_string(),
            inputs: pm(json!({"k": 7})),
            outputs: pm(json!({"arn": "x"})),
        },
    );
    let sink = Arc::new(InMemorySnapshotSink::new());
    let deployment = Deployment::builder("dev", "web")
        .provider(support::PACKAGE, Arc::new(provider) as Arc<dyn Provider>)
        .sink(Arc::clone(&sink) as Arc<dyn SnapshotSink>)
        .build();

    let summary = Importer::new(deployment)
        .import(vec![ImportRequest {
            ty: support::RESOURCE_TYPE.to_string(),
            name: "b".to_string(),
            id: "bx-1".to_string(),
            parent: None,
            provider: String::new(),
            inputs: PropertyMap::new(),
        }])
        .await
        .unwrap();

    // A root stack and a default provider are created, then the import runs.
    assert_eq!(summary.count(StepOp::Create), 2);
    assert_eq!(summary.count(StepOp::Import), 1);

    let states = sink.states();
    assert_eq!(states.len(), 3);
    let imported = states.iter().find(|s| s.urn.name() == "b").unwrap();
    assert_eq!(imported.import_id, "bx-1");
    assert_eq!(imported.outputs, pm(json!({"arn": "x"})));
    assert!(states.iter().any(|s| s.urn.is_root_stack()));
    assert!(states.iter().any(|s| s.urn.is_provider()));
}

static RETRY_SUCCEEDS_AFTER: AtomicUsize = AtomicUsize::new(0);

#[tokio::test]
async fn error_hook_retry_can_recover() {
    RETRY_SUCCEEDS_AFTER.store(0, Ordering::SeqCst);
    let provider = MockProvider::new().with_create(|_, inputs, n| {
        if n < 3 {
            Err(ProviderError::fatal(format!("transient {n}")))
        } else {
            RETRY_SUCCEEDS_AFTER.store(n, Ordering::SeqCst);
            Ok(converge_engine::CreateOutcome {
                id: format!("id-{n}"),
                outputs: inputs.clone(),
            })
        }
    });
    let harness = Harness::new(provider);
    let callback: ErrorHookFn = Arc::new(|_| Box::pin(async { Ok(true) }));
    harness
        .hooks
        .register_error_hook(ErrorHook {
            name: "retry".to_string(),
            callback,
        })
        .unwrap();

    let (result, states) = harness
        .run(|source| async move {
            let mut g = goal("n", json!({"k": 1}));
            g.hooks = BTreeMap::from([(HookPhase::OnCreateError, vec!["retry".to_string()])]);
            source.register_resource(g).await.unwrap();
        })
        .await;

    result.unwrap();
    assert_eq!(RETRY_SUCCEEDS_AFTER.load(Ordering::SeqCst), 3);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].id, "id-3");
}
