//! End-to-end exercise of the status side-channel over localhost gRPC.

use std::collections::BTreeMap;
use std::sync::Arc;

use converge_core::{ResourceStatus as CoreStatus, StepOp, Urn, ViewStep, ViewStepState};
use converge_status::proto::v1::resource_status_client::ResourceStatusClient;
use converge_status::proto::v1::{PublishViewStepsRequest, ReserveTokenRequest};
use converge_status::{serve, view_step_to_proto, StatusRegistry};

fn owner_urn() -> Urn {
    "urn:deploy:dev::web::deploy:deploy:Stack::aws:s3:Bucket::assets"
        .parse()
        .unwrap()
}

fn sample_view() -> ViewStep {
    ViewStep {
        op: StepOp::View,
        status: CoreStatus::Ok,
        error: String::new(),
        old: None,
        new: Some(ViewStepState {
            ty: "aws:s3:Object".to_string(),
            name: "o".to_string(),
            parent_type: String::new(),
            inputs: converge_core::PropertyMap::new(),
            outputs: converge_core::PropertyMap::new(),
        }),
        keys: Vec::new(),
        diffs: Vec::new(),
        has_detailed_diff: false,
        detailed_diff: BTreeMap::new(),
    }
}

#[tokio::test]
async fn providers_reserve_publish_and_the_engine_drains() {
    let registry = Arc::new(StatusRegistry::new());
    let handle = serve(Arc::clone(&registry)).await.unwrap();

    let mut client = ResourceStatusClient::connect(format!("http://{}", handle.addr()))
        .await
        .unwrap();

    // Provider side: reserve a token and publish a view step under it.
    let token = client
        .reserve_token(ReserveTokenRequest {
            urn: owner_urn().to_string(),
            refresh: false,
            persisted: true,
        })
        .await
        .unwrap()
        .into_inner()
        .token;
    assert!(!token.is_empty());

    client
        .publish_view_steps(PublishViewStepsRequest {
            token: token.clone(),
            steps: vec![view_step_to_proto(&sample_view())],
        })
        .await
        .unwrap();

    // A bogus token is rejected.
    let err = client
        .publish_view_steps(PublishViewStepsRequest {
            token: "bogus".to_string(),
            steps: Vec::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::NotFound);

    // A step with an unknown operation tag is rejected.
    let mut malformed = view_step_to_proto(&sample_view());
    malformed.op = "no-such-op".to_string();
    let err = client
        .publish_view_steps(PublishViewStepsRequest {
            token: token.clone(),
            steps: vec![malformed],
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    // Engine side: drain the buffer on release.
    let (info, steps) = registry.release_token(&owner_urn());
    assert_eq!(info.unwrap().urn, owner_urn());
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].step.op, StepOp::View);
    assert_eq!(steps[0].step.new.as_ref().unwrap().name, "o");

    handle.shutdown().await;
}

#[tokio::test]
async fn double_reservation_is_rejected_over_grpc() {
    let registry = Arc::new(StatusRegistry::new());
    let handle = serve(Arc::clone(&registry)).await.unwrap();

    let mut client = ResourceStatusClient::connect(format!("http://{}", handle.addr()))
        .await
        .unwrap();

    let request = ReserveTokenRequest {
        urn: owner_urn().to_string(),
        refresh: false,
        persisted: true,
    };
    client.reserve_token(request.clone()).await.unwrap();
    let err = client.reserve_token(request).await.unwrap_err();
    assert_eq!(err.code(), tonic::Code::FailedPrecondition);

    handle.shutdown().await;
}
