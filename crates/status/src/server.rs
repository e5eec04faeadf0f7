//! gRPC surface of the resource-status service.
//!
//! The service listens on an ephemeral localhost port; providers learn the
//! address through their configuration and use the token they were handed to
//! publish view sub-steps mid-operation.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use converge_core::{Urn, ViewStep};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::proto::v1::resource_status_server::{ResourceStatus, ResourceStatusServer};
use crate::proto::v1::{
    PublishViewStepsRequest, PublishViewStepsResponse, ReleaseTokenRequest, ReleaseTokenResponse,
    ReserveTokenRequest, ReserveTokenResponse,
};
use crate::registry::StatusRegistry;

/// gRPC service implementation delegating to a [`StatusRegistry`].
#[derive(Debug)]
pub struct StatusService {
    registry: Arc<StatusRegistry>,
}

impl StatusService {
    /// A service over the given registry.
    #[must_use]
    pub fn new(registry: Arc<StatusRegistry>) -> Self {
        Self { registry }
    }
}

fn parse_urn(text: &str) -> std::result::Result<Urn, Status> {
    text.parse()
        .map_err(|e| Status::invalid_argument(format!("bad URN: {e}")))
}

#[tonic::async_trait]
impl ResourceStatus for StatusService {
    #[instrument(name = "status_reserve_token", skip(self, request))]
    async fn reserve_token(
        &self,
        request: Request<ReserveTokenRequest>,
    ) -> std::result::Result<Response<ReserveTokenResponse>, Status> {
        let msg = request.into_inner();
        let urn = parse_urn(&msg.urn)?;
        let token = self
            .registry
            .reserve_token(urn, msg.refresh, msg.persisted)
            .map_err(|e| Status::failed_precondition(e.to_string()))?;
        Ok(Response::new(ReserveTokenResponse { token }))
    }

    #[instrument(name = "status_publish_view_steps", skip(self, request))]
    async fn publish_view_steps(
        &self,
        request: Request<PublishViewStepsRequest>,
    ) -> std::result::Result<Response<PublishViewStepsResponse>, Status> {
        let msg = request.into_inner();
        let steps: Vec<ViewStep> = msg
            .steps
            .into_iter()
            .map(crate::convert::view_step_from_proto)
            .collect::<crate::error::Result<_>>()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        self.registry.publish(&msg.token, steps).map_err(|e| match e {
            crate::error::Error::UnknownToken { .. } => Status::not_found(e.to_string()),
            other => Status::internal(other.to_string()),
        })?;
        Ok(Response::new(PublishViewStepsResponse {}))
    }

    #[instrument(name = "status_release_token", skip(self, request))]
    async fn release_token(
        &self,
        request: Request<ReleaseTokenRequest>,
    ) -> std::result::Result<Response<ReleaseTokenResponse>, Status> {
        let msg = request.into_inner();
        let urn = parse_urn(&msg.urn)?;
        self.registry.release_token_remote(&urn);
        Ok(Response::new(ReleaseTokenResponse {}))
    }
}

/// A running status server bound to an ephemeral localhost port.
#[derive(Debug)]
pub struct StatusServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StatusServerHandle {
    /// The address providers should publish to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signals shutdown and waits for the serving task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "status server task ended abnormally");
        }
    }
}

/// Binds the status service on `127.0.0.1:0` and serves it in a background
/// task.
///
/// # Errors
///
/// Returns an error when the listener cannot be bound.
#[instrument(name = "status_serve", skip(registry))]
pub async fn serve(registry: Arc<StatusRegistry>) -> Result<StatusServerHandle> {
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let incoming = TcpListenerStream::new(listener);
    let (tx, rx) = oneshot::channel::<()>();

    let service = ResourceStatusServer::new(StatusService::new(registry));
    let task = tokio::spawn(async move {
        let result = tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(incoming, async {
                let _ = rx.await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "status server exited with error");
        }
    });

    debug!(%addr, "status server listening");
    Ok(StatusServerHandle {
        addr,
        shutdown: Some(tx),
        task,
    })
}
