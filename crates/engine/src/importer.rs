//! Bulk import.
//!
//! The importer drives the executor with synthetic steps: prior resources
//! carry forward as Same, a root stack is created when absent, default
//! providers are created for every imported package, and the imports
//! themselves run in parallel batches grouped so parents land before
//! children.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use converge_core::{
    PropertyMap, ProviderReference, ResourceState, Step, StepOp, Urn, ROOT_STACK_TYPE,
};
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::deployment::{Deployment, DeploymentSummary};
use crate::error::{Error, Result};
use crate::events::RegisterOutputsEvent;
use crate::executor::StepExecutor;

/// One resource to adopt under engine management.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Resource type, e.g. `aws:s3:Bucket`.
    pub ty: String,
    /// Resource name in the program.
    pub name: String,
    /// Provider-side id to import.
    pub id: String,
    /// Parent URN; the root stack when `None`.
    pub parent: Option<Urn>,
    /// Provider reference text; empty uses the package default.
    pub provider: String,
    /// Seed inputs recorded with the imported state.
    pub inputs: PropertyMap,
}

/// Bulk import driver over one deployment.
pub struct Importer {
    deployment: Arc<Deployment>,
}

impl Importer {
    /// An importer for the deployment.
    #[must_use]
    pub fn new(deployment: Arc<Deployment>) -> Self {
        Self { deployment }
    }

    /// Imports `requests`, carrying every other prior resource forward
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns the first failure; prior resources already carried forward
    /// stay in the sink.
    #[instrument(name = "importer_import", skip(self, requests), fields(count = requests.len()))]
    pub async fn import(&self, requests: Vec<ImportRequest>) -> Result<DeploymentSummary> {
        let deployment = &self.deployment;
        let executor = Arc::new(StepExecutor::new(Arc::clone(deployment)));
        let mut summary = DeploymentSummary::default();

        let root_urn = deployment
            .prev
            .resources()
            .iter()
            .find(|r| r.urn.is_root_stack())
            .map(|r| r.urn.clone())
            .map_or_else(
                || Urn::root_stack(&deployment.stack, &deployment.project),
                Ok,
            )?;

        let mut import_urns = HashSet::new();
        let mut planned: Vec<(ImportRequest, Urn)> = Vec::with_capacity(requests.len());
        for request in requests {
            let parent = request.parent.clone().unwrap_or_else(|| root_urn.clone());
            let urn = Urn::child(&parent, &request.ty, &request.name)?;
            if !import_urns.insert(urn.clone()) {
                return Err(Error::DuplicateUrn {
                    urn: urn.to_string(),
                });
            }
            planned.push((request, urn));
        }

        // Phase 1: carry prior resources forward, serially in snapshot
        // order.
        let carried: Vec<Step> = deployment
            .prev
            .resources()
            .iter()
            .filter(|prior| !prior.delete && !import_urns.contains(&prior.urn))
            .map(|prior| {
                Step::new(StepOp::Same, prior.urn.clone())
                    .with_old(Arc::clone(prior))
                    .with_new(prior.as_ref().clone())
            })
            .collect();
        summary.record(&carried);
        executor.execute_serial(carried).await?;

        // Phase 2: make sure a root stack exists.
        let root_created = deployment.prev.get(&root_urn).is_none();
        if root_created {
            let mut root = ResourceState::new(root_urn.clone());
            root.ty = ROOT_STACK_TYPE.to_string();
            root.created_at = Some(Utc::now());
            root.modified_at = Some(Utc::now());
            let step = Step::new(StepOp::Create, root_urn.clone()).with_new(root);
            summary.record(std::slice::from_ref(&step));
            executor.execute_serial(vec![step]).await?;
        }

        // Phase 3: default providers for every imported package, created as
        // one parallel batch.
        let mut references: HashMap<String, ProviderReference> = HashMap::new();
        let mut provider_steps = Vec::new();
        for (request, urn) in &planned {
            if !request.provider.is_empty() {
                let reference: ProviderReference =
                    request.provider.parse().map_err(|e: converge_core::Error| {
                        Error::BadProviderReference {
                            urn: urn.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                references.insert(urn.package().to_string(), reference);
                continue;
            }
            let package = urn.package().to_string();
            if references.contains_key(&package) {
                continue;
            }
            let default_urn =
                Urn::default_provider(&deployment.stack, &deployment.project, &package)?;
            if let Some(existing) = deployment.prev.get(&default_urn) {
                references.insert(
                    package,
                    ProviderReference::new(default_urn, existing.id.clone()),
                );
                continue;
            }

            let mut state = ResourceState::new(default_urn.clone());
            state.custom = true;
            state.parent = Some(root_urn.clone());
            state.created_at = Some(Utc::now());
            state.modified_at = Some(Utc::now());
            deployment
                .providers
                .record_config(default_urn.clone(), state.inputs.clone());
            references.insert(
                package,
                ProviderReference::new(default_urn.clone(), "default"),
            );
            provider_steps.push(Step::new(StepOp::Create, default_urn).with_new(state));
        }
        if !provider_steps.is_empty() {
            summary.record(&provider_steps);
            executor.execute_batch(provider_steps).await?;
        }

        // Phase 4: the imports themselves, parents before children.
        let mut remaining: Vec<(ImportRequest, Urn)> = planned;
        while !remaining.is_empty() {
            let pending_parents: HashSet<Urn> = remaining
                .iter()
                .map(|(_, urn)| urn.clone())
                .collect();
            let (ready, rest): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|(request, _)| {
                request
                    .parent
                    .as_ref()
                    .is_none_or(|p| !pending_parents.contains(p))
            });
            if ready.is_empty() {
                return Err(Error::Bail {
                    message: "import requests form a parent cycle".to_string(),
                });
            }

            let mut batch = Vec::with_capacity(ready.len());
            for (request, urn) in &ready {
                let mut state = ResourceState::new(urn.clone());
                state.ty = request.ty.clone();
                state.custom = true;
                state.id = request.id.clone();
                state.import_id = request.id.clone();
                state.inputs = request.inputs.clone();
                state.parent = Some(request.parent.clone().unwrap_or_else(|| root_urn.clone()));
                state.provider = references.get(urn.package()).cloned();
                state.created_at = Some(Utc::now());
                state.modified_at = Some(Utc::now());
                batch.push(Step::new(StepOp::Import, urn.clone()).with_new(state));
            }
            summary.record(&batch);
            executor.execute_batch(batch).await?;
            remaining = rest;
        }

        // Phase 5: outputs for a freshly created stack.
        if root_created {
            let (done, _rx) = oneshot::channel();
            executor.execute_register_resource_outputs(RegisterOutputsEvent {
                urn: root_urn,
                outputs: PropertyMap::new(),
                done,
            })?;
        }

        debug!("import finished");
        match executor.take_failure() {
            Some(error) => Err(error),
            None => Ok(summary),
        }
    }
}
