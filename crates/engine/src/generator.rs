//! Step generation.
//!
//! The generator consumes program events in registration order, diffs the
//! desired state against the prior snapshot with provider assistance, and
//! emits the ordered steps that converge the live world. It owns all
//! per-run bookkeeping (seen URNs, operation sets, alias maps, pending
//! deletes) and is driven from a single task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use converge_core::property::{parse_paths, unknown};
use converge_core::{
    Alias, DeleteBeforeReplace, DiffChanges, DiffResult, Goal, PropertyMap, PropertyPath,
    ProviderReference, ResourceState, Step, StepOp, Urn, ROOT_STACK_TYPE,
};
use converge_graph::{delete_antichains, DependencyGraph};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::analyzer::PolicyViolation;
use crate::deployment::Deployment;
use crate::error::{Error, Result};
use crate::events::{ReadResourceEvent, RegisterResourceEvent};
use crate::provider::Provider;

/// Per-run step generator.
///
/// All mutable state lives here and is touched only from the generator task;
/// cross-thread state (hook registry, status tokens, plan) lives on the
/// deployment.
pub struct StepGenerator {
    deployment: Arc<Deployment>,

    /// URNs registered this run.
    urns: HashSet<Urn>,
    /// Classification sets for this run's URNs.
    creates: HashSet<Urn>,
    updates: HashSet<Urn>,
    sames: HashSet<Urn>,
    replaces: HashSet<Urn>,
    reads: HashSet<Urn>,
    deletes: HashSet<Urn>,
    skipped_creates: HashSet<Urn>,

    /// Old URN → the new URN that subsumed it this run.
    aliased: HashMap<Urn, Urn>,
    /// New URN → every alias it declared (inherited ones included).
    aliases: HashMap<Urn, Vec<Urn>>,

    /// Dependent URN → property keys that caused its cascading replacement.
    dependent_replace_keys: HashMap<Urn, Vec<String>>,

    /// Old states condemned by create-before-delete replacements; their
    /// DeleteReplaced steps are scheduled by `generate_deletes`.
    pending_deletes: Vec<Arc<ResourceState>>,

    /// URNs targeted directly or, with `--target-dependents`, through a
    /// targeted dependency.
    targeted: HashSet<Urn>,

    /// Mandatory policy violations collected during previews.
    policy_violations: Vec<(Urn, PolicyViolation)>,
}

impl StepGenerator {
    /// A generator for one deployment.
    #[must_use]
    pub fn new(deployment: Arc<Deployment>) -> Self {
        Self {
            deployment,
            urns: HashSet::new(),
            creates: HashSet::new(),
            updates: HashSet::new(),
            sames: HashSet::new(),
            replaces: HashSet::new(),
            reads: HashSet::new(),
            deletes: HashSet::new(),
            skipped_creates: HashSet::new(),
            aliased: HashMap::new(),
            aliases: HashMap::new(),
            dependent_replace_keys: HashMap::new(),
            pending_deletes: Vec::new(),
            targeted: HashSet::new(),
            policy_violations: Vec::new(),
        }
    }

    /// Mandatory violations collected during a preview.
    #[must_use]
    pub fn policy_violations(&self) -> &[(Urn, PolicyViolation)] {
        &self.policy_violations
    }

    /// Old URNs that were subsumed by an alias this run.
    #[must_use]
    pub fn aliased(&self) -> &HashMap<Urn, Urn> {
        &self.aliased
    }

    /// Generates the ordered steps for one RegisterResource event.
    ///
    /// # Errors
    ///
    /// Surfaces invalid-input, policy, provider, and plan errors without
    /// emitting any step.
    #[instrument(name = "generate_steps", skip(self, event), fields(name = %event.goal.name))]
    pub async fn generate_steps(&mut self, event: RegisterResourceEvent) -> Result<Vec<Step>> {
        let RegisterResourceEvent { id, goal, done } = event;

        let urn = self.resource_urn(&goal)?;
        self.deployment.completions.insert(id.0, done);

        // Alias resolution: explicit declarations plus aliases inherited
        // through the parent.
        let alias_urns = self.expand_aliases(&goal, &urn)?;
        let (old, matched_alias) = self.lookup_old(&urn, &alias_urns);
        self.aliases.insert(urn.clone(), alias_urns.clone());
        if let Some(matched) = matched_alias {
            debug!(%urn, alias = %matched, "resource matched by alias");
            self.aliased.insert(matched, urn.clone());
        }

        // Ignore-changes: copy old values over (or drop keys absent on the
        // old state) before the provider sees the inputs.
        let ignore_paths = parse_paths(&goal.ignore_changes)?;
        let mut inputs = goal.inputs.clone();
        if let Some(old) = &old {
            apply_ignore_changes(&mut inputs, &old.inputs, &ignore_paths);
        }

        // Analyzers: remediate first, then analyze.
        inputs = self.run_analyzers(&urn, inputs).await?;

        let (provider, provider_ref) = self.resolve_provider(&goal, &urn)?;

        let targeted = self.effective_targeted(&goal, &urn);
        let allow_unknowns = self.deployment.options.dry_run;

        // A targeted resource cannot build on a create that the target
        // restriction skipped; that create is required.
        if targeted {
            if let Some(missing) = goal
                .parent
                .iter()
                .chain(goal.dependencies.iter())
                .chain(goal.property_dependencies.values().flatten())
                .find(|dep| self.skipped_creates.contains(*dep))
            {
                return Err(Error::UntargetedCreate {
                    urn: missing.to_string(),
                });
            }
        }

        // Check; untargeted resources get the old inputs verbatim.
        let inputs = if let Some(provider) = &provider {
            if targeted {
                let seed: [u8; 32] = self
                    .deployment
                    .plan
                    .as_ref()
                    .and_then(|p| p.seed_for(&urn))
                    .unwrap_or_else(rand::random);
                debug!(%urn, seed = %hex::encode(&seed[..8]), "checking inputs");
                let outcome = provider
                    .check(&urn, old.as_ref().map(|o| &o.inputs), &inputs, allow_unknowns, seed)
                    .await
                    .map_err(|e| Error::ProviderError {
                        urn: urn.to_string(),
                        message: e.to_string(),
                    })?;
                if let Some(first) = outcome.failures.first() {
                    return Err(Error::CheckFailed {
                        urn: urn.to_string(),
                        first: format!("{}: {}", first.property, first.reason),
                        rest: outcome.failures[1..]
                            .iter()
                            .map(|f| format!("{}: {}", f.property, f.reason))
                            .collect(),
                    });
                }
                outcome.inputs
            } else {
                old.as_ref().map_or(inputs, |o| o.inputs.clone())
            }
        } else {
            inputs
        };

        let mut new = self.make_state(&urn, &goal, inputs, provider_ref, old.as_ref(), alias_urns);
        if urn.is_provider() {
            self.deployment
                .providers
                .record_config(urn.clone(), new.inputs.clone());
        }

        // Case discrimination.
        let recreating = self.deletes.contains(&urn);
        let was_external = old.as_ref().is_some_and(|o| o.external);
        let importing = !goal.id.is_empty()
            && (old.is_none() || was_external || old.as_ref().is_some_and(|o| o.import_id != goal.id));

        let steps = if importing {
            new.id = goal.id.clone();
            new.import_id = goal.id.clone();
            match &old {
                Some(old_state) if !old_state.external => {
                    self.replaces.insert(urn.clone());
                    self.pending_deletes.push(Arc::clone(old_state));
                    vec![
                        Step::new(StepOp::ImportReplacement, urn.clone())
                            .with_old(Arc::clone(old_state))
                            .with_new(new)
                            .with_event(Some(id)),
                        Step::new(StepOp::Replace, urn.clone()).with_old(Arc::clone(old_state)),
                    ]
                }
                _ => {
                    let mut step = Step::new(StepOp::Import, urn.clone()).with_new(new);
                    if let Some(old_state) = &old {
                        step = step.with_old(Arc::clone(old_state));
                    }
                    vec![step.with_event(Some(id))]
                }
            }
        } else if recreating {
            // A cascading delete-before-replace already condemned this URN.
            self.deletes.remove(&urn);
            self.replaces.insert(urn.clone());
            if let Some(keys) = self.dependent_replace_keys.get(&urn) {
                new.init_errors.clear();
                let mut replace = Step::new(StepOp::Replace, urn.clone());
                replace.keys = keys.clone();
                let mut create = Step::new(StepOp::CreateReplacement, urn.clone())
                    .with_new(new)
                    .with_event(Some(id));
                create.keys = replace.keys.clone();
                if let Some(old_state) = &old {
                    replace = replace.with_old(Arc::clone(old_state));
                    create = create.with_old(Arc::clone(old_state));
                }
                vec![replace, create]
            } else {
                let mut replace = Step::new(StepOp::Replace, urn.clone());
                let mut create = Step::new(StepOp::CreateReplacement, urn.clone())
                    .with_new(new)
                    .with_event(Some(id));
                if let Some(old_state) = &old {
                    replace = replace.with_old(Arc::clone(old_state));
                    create = create.with_old(Arc::clone(old_state));
                }
                vec![replace, create]
            }
        } else if was_external {
            // Replacing a read-only copy with an owned resource; the old
            // record is discarded once the create lands.
            let old_state = old.clone().unwrap_or_else(|| Arc::new(ResourceState::new(urn.clone())));
            self.replaces.insert(urn.clone());
            self.pending_deletes.push(Arc::clone(&old_state));
            vec![
                Step::new(StepOp::CreateReplacement, urn.clone())
                    .with_old(Arc::clone(&old_state))
                    .with_new(new)
                    .with_event(Some(id)),
                Step::new(StepOp::Replace, urn.clone()).with_old(old_state),
            ]
        } else if let Some(old_state) = old {
            if targeted {
                let diff = self
                    .diff_resource(&urn, &old_state, &new, &goal, provider.as_deref(), &ignore_paths)
                    .await?;
                if diff.replace() {
                    self.replacement_steps(&urn, &old_state, new, &goal, &diff, id).await?
                } else if diff.has_changes() || !old_state.init_errors.is_empty() {
                    // An update also runs when only init errors remain, so
                    // initialization can continue.
                    self.updates.insert(urn.clone());
                    new.id = old_state.id.clone();
                    let mut step = Step::new(StepOp::Update, urn.clone())
                        .with_old(Arc::clone(&old_state))
                        .with_new(new)
                        .with_event(Some(id));
                    step.diffs = diff.changed_keys.clone();
                    step.detailed_diff = diff.detailed_diff.clone();
                    vec![step]
                } else {
                    self.sames.insert(urn.clone());
                    new.id = old_state.id.clone();
                    new.outputs = old_state.outputs.clone();
                    new.created_at = old_state.created_at;
                    new.modified_at = old_state.modified_at;
                    vec![
                        Step::new(StepOp::Same, urn.clone())
                            .with_old(old_state)
                            .with_new(new)
                            .with_event(Some(id)),
                    ]
                }
            } else {
                // Untargeted resources carry their old state forward.
                self.sames.insert(urn.clone());
                new.id = old_state.id.clone();
                new.inputs = old_state.inputs.clone();
                new.outputs = old_state.outputs.clone();
                vec![
                    Step::new(StepOp::Same, urn.clone())
                        .with_old(old_state)
                        .with_new(new)
                        .with_event(Some(id)),
                ]
            }
        } else if targeted {
            self.creates.insert(urn.clone());
            vec![
                Step::new(StepOp::Create, urn.clone())
                    .with_new(new)
                    .with_event(Some(id)),
            ]
        } else {
            self.skipped_creates.insert(urn.clone());
            vec![
                Step::new(StepOp::SkippedCreate, urn.clone())
                    .with_new(new)
                    .with_event(Some(id)),
            ]
        };

        self.check_plan(&steps)?;
        Ok(steps)
    }

    /// Generates the steps for one ReadResource event.
    ///
    /// # Errors
    ///
    /// Surfaces invalid-input and provider-resolution errors.
    #[instrument(name = "generate_read_steps", skip(self, event), fields(name = %event.name))]
    pub async fn generate_read_steps(&mut self, event: ReadResourceEvent) -> Result<Vec<Step>> {
        let goal = Goal {
            ty: event.ty.clone(),
            name: event.name.clone(),
            custom: true,
            parent: event.parent.clone(),
            provider: event.provider.clone(),
            ..Goal::default()
        };
        let urn = self.resource_urn(&goal)?;
        self.deployment.read_completions.insert(event.id.0, event.done);
        self.reads.insert(urn.clone());

        let (_, provider_ref) = self.resolve_provider(&goal, &urn)?;
        let mut new = ResourceState::new(urn.clone());
        new.ty = event.ty;
        new.custom = true;
        new.external = true;
        new.id = event.resource_id;
        new.inputs = event.properties;
        new.parent = event.parent;
        new.dependencies = event.dependencies;
        new.provider = provider_ref;
        new.created_at = Some(Utc::now());
        new.modified_at = Some(Utc::now());

        let old = self.deployment.prev.get(&urn).cloned();
        let steps = match old {
            Some(old_state) if !old_state.external => {
                // The URN was previously owned; reading over it replaces the
                // owned copy with an external one.
                self.replaces.insert(urn.clone());
                self.pending_deletes.push(Arc::clone(&old_state));
                vec![
                    Step::new(StepOp::ReadReplacement, urn.clone())
                        .with_old(Arc::clone(&old_state))
                        .with_new(new)
                        .with_event(Some(event.id)),
                    Step::new(StepOp::Replace, urn.clone()).with_old(old_state),
                ]
            }
            Some(old_state) => vec![
                Step::new(StepOp::Read, urn.clone())
                    .with_old(old_state)
                    .with_new(new)
                    .with_event(Some(event.id)),
            ],
            None => vec![
                Step::new(StepOp::Read, urn.clone())
                    .with_new(new)
                    .with_event(Some(event.id)),
            ],
        };

        self.check_plan(&steps)?;
        Ok(steps)
    }

    /// Walks the prior snapshot in reverse and emits the deletions this run
    /// still owes: condemned pending-replace copies, resources the program
    /// no longer registers, and leftover pending-replacement markers.
    ///
    /// # Errors
    ///
    /// Returns an error when a protected resource would be deleted.
    #[instrument(name = "generate_deletes", skip(self))]
    pub fn generate_deletes(&mut self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();

        // Deferred deletes from create-before-delete replacements, newest
        // first.
        let condemned: Vec<Arc<ResourceState>> = self.pending_deletes.drain(..).rev().collect();
        for old in condemned {
            self.deletes.insert(old.urn.clone());
            let op = if old.external {
                StepOp::ReadDiscard
            } else {
                StepOp::DeleteReplaced
            };
            steps.push(Step::new(op, old.urn.clone()).with_old(old));
        }

        for r in self.deployment.prev.resources().iter().rev() {
            if r.delete {
                // A condemned copy left over from an earlier run.
                if self.deletes.contains(&r.urn) {
                    continue;
                }
                self.deletes.insert(r.urn.clone());
                let mut step = Step::new(StepOp::DeleteReplaced, r.urn.clone()).with_old(Arc::clone(r));
                step.pending_replace = r.pending_replacement;
                steps.push(step);
                continue;
            }

            let referenced = self.urns.contains(&r.urn)
                || self.reads.contains(&r.urn)
                || self.aliased.contains_key(&r.urn)
                || self.deletes.contains(&r.urn);
            if referenced {
                continue;
            }

            if r.pending_replacement {
                self.deletes.insert(r.urn.clone());
                steps.push(Step::new(StepOp::RemovePendingReplace, r.urn.clone()).with_old(Arc::clone(r)));
            } else if r.protect {
                return Err(Error::ProtectedDelete {
                    urn: r.urn.to_string(),
                });
            } else {
                self.deletes.insert(r.urn.clone());
                steps.push(Step::new(StepOp::Delete, r.urn.clone()).with_old(Arc::clone(r)));
            }
        }

        if self.deployment.options.has_targets() {
            steps = self.restrict_deletes_to_targets(steps);
        }

        self.check_plan(&steps)?;
        Ok(steps)
    }

    /// Decomposes delete steps into antichains, leaves first; within one
    /// antichain no step depends on another.
    #[must_use]
    pub fn schedule_deletes(&self, steps: Vec<Step>) -> Vec<Vec<Step>> {
        let old_states: Vec<&ResourceState> = steps
            .iter()
            .filter_map(|s| s.old.as_deref())
            .collect();
        if old_states.len() != steps.len() {
            // Delete steps always carry an old state; fall back to one
            // serial batch if something unexpected slipped through.
            return steps.into_iter().map(|s| vec![s]).collect();
        }

        let batches = delete_antichains(&old_states);
        let mut slots: Vec<Option<Step>> = steps.into_iter().map(Some).collect();
        batches
            .into_iter()
            .map(|batch| {
                batch
                    .into_iter()
                    .filter_map(|i| slots[i].take())
                    .collect()
            })
            .collect()
    }

    // Registration plumbing.

    fn resource_urn(&mut self, goal: &Goal) -> Result<Urn> {
        let urn = if goal.ty == ROOT_STACK_TYPE {
            if goal.parent.is_some() {
                return Err(Error::RootStackHasParent);
            }
            Urn::new(
                &self.deployment.stack,
                &self.deployment.project,
                "",
                ROOT_STACK_TYPE,
                &goal.name,
            )?
        } else if let Some(parent) = &goal.parent {
            if !self.urns.contains(parent) {
                return Err(Error::UnknownParent {
                    name: goal.name.clone(),
                    parent: parent.to_string(),
                });
            }
            Urn::child(parent, &goal.ty, &goal.name)?
        } else {
            Urn::new(
                &self.deployment.stack,
                &self.deployment.project,
                "",
                &goal.ty,
                &goal.name,
            )?
        };

        if !self.urns.insert(urn.clone()) {
            return Err(Error::DuplicateUrn {
                urn: urn.to_string(),
            });
        }
        Ok(urn)
    }

    fn expand_aliases(&self, goal: &Goal, urn: &Urn) -> Result<Vec<Urn>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut push = |u: Urn, out: &mut Vec<Urn>| {
            if u != *urn && seen.insert(u.clone()) {
                out.push(u);
            }
        };

        for alias in &goal.aliases {
            let resolved = match alias {
                Alias::Urn(u) => u.clone(),
                Alias::Spec {
                    name,
                    ty,
                    stack,
                    project,
                    parent,
                    no_parent,
                } => {
                    let chain = if *no_parent {
                        String::new()
                    } else if let Some(parent) = parent {
                        parent.qualified_type()
                    } else if let Some(parent) = &goal.parent {
                        parent.qualified_type()
                    } else {
                        String::new()
                    };
                    Urn::new(
                        stack.as_deref().unwrap_or(&self.deployment.stack),
                        project.as_deref().unwrap_or(&self.deployment.project),
                        chain,
                        ty.as_deref().unwrap_or(&goal.ty),
                        name.as_deref().unwrap_or(&goal.name),
                    )
                    .map_err(|e| Error::Core(e))?
                }
            };
            push(resolved, &mut out);
        }

        // Inherit aliases through the parent: each old identity of the
        // parent implies an old identity of the child. A child name sharing
        // the parent's name as a prefix follows the rename.
        if let Some(parent) = &goal.parent {
            if let Some(parent_aliases) = self.aliases.get(parent) {
                for pa in parent_aliases {
                    let child_name = goal
                        .name
                        .strip_prefix(parent.name())
                        .map_or_else(|| goal.name.clone(), |rest| format!("{}{rest}", pa.name()));
                    let inherited = Urn::new(
                        pa.stack(),
                        pa.project(),
                        pa.qualified_type(),
                        &goal.ty,
                        child_name,
                    )?;
                    push(inherited, &mut out);
                }
            }
        }

        Ok(out)
    }

    fn lookup_old(
        &self,
        urn: &Urn,
        aliases: &[Urn],
    ) -> (Option<Arc<ResourceState>>, Option<Urn>) {
        if let Some(state) = self.deployment.prev.get(urn) {
            return (Some(Arc::clone(state)), None);
        }
        for alias in aliases {
            if self.aliased.contains_key(alias) {
                continue;
            }
            if let Some(state) = self.deployment.prev.get(alias) {
                return (Some(Arc::clone(state)), Some(alias.clone()));
            }
        }
        (None, None)
    }

    async fn run_analyzers(&mut self, urn: &Urn, mut inputs: PropertyMap) -> Result<PropertyMap> {
        for analyzer in &self.deployment.analyzers {
            inputs = analyzer.remediate(urn, inputs).await;
            for violation in analyzer.analyze(urn, &inputs).await {
                if violation.is_mandatory() {
                    let message = format!("{}: {}", violation.policy, violation.message);
                    if self.deployment.options.dry_run {
                        self.deployment.diagnostics.error(Some(urn), &message);
                        self.policy_violations.push((urn.clone(), violation));
                    } else {
                        return Err(Error::PolicyViolation {
                            urn: urn.to_string(),
                            message,
                        });
                    }
                } else {
                    self.deployment
                        .diagnostics
                        .warning(Some(urn), &format!("{}: {}", violation.policy, violation.message));
                }
            }
        }
        Ok(inputs)
    }

    fn resolve_provider(
        &self,
        goal: &Goal,
        urn: &Urn,
    ) -> Result<(Option<Arc<dyn Provider>>, Option<ProviderReference>)> {
        // Components need no provider.
        if !goal.custom && !urn.is_provider() {
            return Ok((None, None));
        }

        if urn.is_provider() {
            let package = urn.provider_package().unwrap_or_default().to_string();
            let provider: Arc<dyn Provider> = Arc::new(crate::provider::RegistryProvider::new(
                Arc::clone(&self.deployment.providers),
                package,
            ));
            return Ok((Some(provider), None));
        }

        if goal.provider.is_empty() {
            let reference = self.deployment.providers.default_reference(
                &self.deployment.stack,
                &self.deployment.project,
                urn.package(),
            )?;
            let provider = self.deployment.providers.resolve(&reference)?;
            return Ok((Some(provider), Some(reference)));
        }

        let reference: ProviderReference =
            goal.provider
                .parse()
                .map_err(|e: converge_core::Error| Error::BadProviderReference {
                    urn: urn.to_string(),
                    message: e.to_string(),
                })?;
        if reference.is_deny_default() {
            return Err(Error::DefaultProviderDenied {
                urn: urn.to_string(),
                package: urn.package().to_string(),
            });
        }
        let provider = self.deployment.providers.resolve(&reference)?;
        Ok((Some(provider), Some(reference)))
    }

    fn make_state(
        &self,
        urn: &Urn,
        goal: &Goal,
        inputs: PropertyMap,
        provider_ref: Option<ProviderReference>,
        old: Option<&Arc<ResourceState>>,
        aliases: Vec<Urn>,
    ) -> ResourceState {
        let now = Utc::now();
        let mut state = ResourceState::new(urn.clone());
        state.ty = goal.ty.clone();
        state.custom = goal.custom || urn.is_provider();
        state.inputs = inputs;
        state.parent = goal.parent.clone();
        state.dependencies = goal.dependencies.clone();
        state.property_dependencies = goal.property_dependencies.clone();
        state.provider = provider_ref;
        state.protect = goal.protect;
        state.retain_on_delete = goal.retain_on_delete;
        state.deleted_with = goal.deleted_with.clone();
        state.additional_secret_outputs = goal.additional_secret_outputs.clone();
        state.custom_timeouts = goal.custom_timeouts;
        state.aliases = aliases;
        state.hooks = goal.hooks.clone();
        state.created_at = old.and_then(|o| o.created_at).or(Some(now));
        state.modified_at = Some(now);
        state
    }

    // Diffing.

    async fn diff_resource(
        &self,
        urn: &Urn,
        old: &Arc<ResourceState>,
        new: &ResourceState,
        goal: &Goal,
        provider: Option<&dyn Provider>,
        ignore_paths: &[PropertyPath],
    ) -> Result<DiffResult> {
        // `--replace` forces the decision without consulting the provider.
        if self.deployment.options.is_replace_target(urn) {
            return Ok(DiffResult {
                changes: DiffChanges::Some,
                replace_keys: vec!["id".to_string()],
                ..DiffResult::default()
            });
        }

        let Some(provider) = provider else {
            // Components diff structurally.
            let changed = top_level_changes(&old.inputs, &new.inputs);
            return Ok(if changed.is_empty() {
                DiffResult::none()
            } else {
                DiffResult {
                    changes: DiffChanges::Some,
                    changed_keys: changed,
                    ..DiffResult::default()
                }
            });
        };

        let allow_unknowns = self.deployment.options.dry_run;

        // A changed provider reference can itself force a replacement.
        if let (Some(old_ref), Some(new_ref)) = (&old.provider, &new.provider) {
            if old_ref != new_ref && !self.provider_aliased(&old_ref.urn, &new_ref.urn) {
                let old_config = self
                    .deployment
                    .prev
                    .get(&old_ref.urn)
                    .map(|p| p.inputs.clone())
                    .unwrap_or_default();
                let new_config = self
                    .deployment
                    .providers
                    .config_of(&new_ref.urn)
                    .unwrap_or_default();
                let config_diff = provider
                    .diff_config(&new_ref.urn, &old_config, &new_config, allow_unknowns, &[])
                    .await
                    .map_err(|e| Error::ProviderError {
                        urn: urn.to_string(),
                        message: e.to_string(),
                    })?;
                if config_diff.replace() {
                    return Ok(DiffResult {
                        changes: DiffChanges::Some,
                        replace_keys: vec!["provider".to_string()],
                        delete_before_replace: config_diff.delete_before_replace,
                        ..DiffResult::default()
                    });
                }
            }
        }

        let mut diff = provider
            .diff(
                urn,
                &old.id,
                &old.inputs,
                &old.outputs,
                &new.inputs,
                allow_unknowns,
                ignore_paths,
            )
            .await
            .map_err(|e| Error::ProviderError {
                urn: urn.to_string(),
                message: e.to_string(),
            })?;

        if diff.changes == DiffChanges::Unknown {
            // The provider could not tell; fall back to a structural compare
            // of the (ignore-changes-processed) inputs.
            let changed = top_level_changes(&old.inputs, &new.inputs);
            diff.changes = if changed.is_empty() {
                DiffChanges::None
            } else {
                DiffChanges::Some
            };
            diff.changed_keys = changed;
        }

        self.apply_replace_on_changes(&mut diff, goal, old)?;
        Ok(diff)
    }

    fn apply_replace_on_changes(
        &self,
        diff: &mut DiffResult,
        goal: &Goal,
        old: &ResourceState,
    ) -> Result<()> {
        if goal.replace_on_changes.is_empty() {
            return Ok(());
        }
        let declared = parse_paths(&goal.replace_on_changes)?;

        for key in diff.changed_keys.clone() {
            if declared.iter().any(|p| p.root_key() == key) && !diff.replace_keys.contains(&key) {
                diff.replace_keys.push(key);
            }
        }

        let detailed_keys: Vec<String> = diff.detailed_diff.keys().cloned().collect();
        for text in detailed_keys {
            let Ok(parsed) = text.parse::<PropertyPath>() else {
                continue;
            };
            if declared.iter().any(|p| p.is_prefix_of(&parsed)) {
                if let Some(entry) = diff.detailed_diff.get_mut(&text) {
                    entry.kind = entry.kind.as_replace();
                }
                let root = parsed.root_key().to_string();
                if !diff.replace_keys.contains(&root) {
                    diff.replace_keys.push(root);
                }
            }
        }

        // Leftover initialization errors on a replace-on-change property
        // force the replacement as well.
        if !old.init_errors.is_empty() {
            for path in &declared {
                let root = path.root_key().to_string();
                if !diff.replace_keys.contains(&root) {
                    diff.replace_keys.push(root);
                }
            }
            diff.changes = DiffChanges::Some;
        }

        Ok(())
    }

    fn provider_aliased(&self, old_provider: &Urn, new_provider: &Urn) -> bool {
        self.aliased.get(old_provider) == Some(new_provider)
    }

    /// Whether the URN is targeted, directly or (with
    /// `--target-dependents`) through a dependency that already is.
    fn effective_targeted(&mut self, goal: &Goal, urn: &Urn) -> bool {
        let options = &self.deployment.options;
        let mut targeted = options.is_targeted(urn);
        if !targeted && options.target_dependents {
            targeted = goal
                .parent
                .iter()
                .chain(goal.dependencies.iter())
                .chain(goal.property_dependencies.values().flatten())
                .any(|dep| self.targeted.contains(dep));
        }
        if targeted {
            self.targeted.insert(urn.clone());
        }
        targeted
    }

    // Replacement.

    async fn replacement_steps(
        &mut self,
        urn: &Urn,
        old: &Arc<ResourceState>,
        mut new: ResourceState,
        goal: &Goal,
        diff: &DiffResult,
        event: converge_core::EventId,
    ) -> Result<Vec<Step>> {
        if old.protect && goal.protect {
            return Err(Error::ProtectedReplace {
                urn: urn.to_string(),
            });
        }
        if !goal.id.is_empty() {
            // The goal still pins the imported id; replacing would abandon
            // the imported resource.
            if self.deployment.options.dry_run {
                self.deployment.diagnostics.warning(
                    Some(urn),
                    "resource was imported and will be replaced; the imported resource will no longer be managed",
                );
            } else {
                return Err(Error::ImportedResourceReplaced {
                    urn: urn.to_string(),
                });
            }
        }

        let delete_before_replace = match goal.delete_before_replace {
            DeleteBeforeReplace::Force => true,
            DeleteBeforeReplace::Never => false,
            DeleteBeforeReplace::Unset => diff.delete_before_replace,
        };

        self.replaces.insert(urn.clone());
        new.id = String::new();
        new.init_errors.clear();

        if delete_before_replace {
            let dependents = self.calculate_dependent_replacements(old).await?;
            let mut steps = Vec::new();
            for (dependent, keys) in dependents.iter().rev() {
                // Known quirk: the already-deleted check keys by the root
                // URN, not the dependent's.
                if self.deletes.contains(urn) {
                    continue;
                }
                self.deletes.insert(dependent.urn.clone());
                self.dependent_replace_keys
                    .insert(dependent.urn.clone(), keys.clone());
                let mut step =
                    Step::new(StepOp::DeleteReplaced, dependent.urn.clone()).with_old(Arc::clone(dependent));
                step.pending_replace = true;
                step.keys = keys.clone();
                steps.push(step);
            }

            let mut root_delete = Step::new(StepOp::DeleteReplaced, urn.clone()).with_old(Arc::clone(old));
            root_delete.pending_replace = true;
            root_delete.keys = diff.replace_keys.clone();
            steps.push(root_delete);

            let mut replace = Step::new(StepOp::Replace, urn.clone())
                .with_old(Arc::clone(old))
                .with_new(new.clone());
            replace.keys = diff.replace_keys.clone();
            steps.push(replace);

            let mut create = Step::new(StepOp::CreateReplacement, urn.clone())
                .with_old(Arc::clone(old))
                .with_new(new)
                .with_event(Some(event));
            create.keys = diff.replace_keys.clone();
            create.diffs = diff.changed_keys.clone();
            create.detailed_diff = diff.detailed_diff.clone();
            steps.push(create);

            Ok(steps)
        } else {
            self.pending_deletes.push(Arc::clone(old));

            let mut create = Step::new(StepOp::CreateReplacement, urn.clone())
                .with_old(Arc::clone(old))
                .with_new(new.clone())
                .with_event(Some(event));
            create.keys = diff.replace_keys.clone();
            create.diffs = diff.changed_keys.clone();
            create.detailed_diff = diff.detailed_diff.clone();

            let mut replace = Step::new(StepOp::Replace, urn.clone())
                .with_old(Arc::clone(old))
                .with_new(new);
            replace.keys = diff.replace_keys.clone();

            Ok(vec![create, replace])
        }
    }

    /// The transitive set of prior dependents that must themselves be
    /// replaced because a replacement-keyed property of theirs depends on
    /// the root, directly or through another replaced dependent.
    async fn calculate_dependent_replacements(
        &self,
        root: &Arc<ResourceState>,
    ) -> Result<Vec<(Arc<ResourceState>, Vec<String>)>> {
        let resources = self.deployment.prev.resources();
        let graph = DependencyGraph::new(resources);
        let excluded = HashSet::new();
        let dependents = graph.depending_on(&[&root.urn], &excluded, false);

        let mut replace_set: HashSet<Urn> = HashSet::from([root.urn.clone()]);
        let mut out = Vec::new();

        for dependent in dependents {
            let keys: Vec<String> = dependent
                .property_dependencies
                .iter()
                .filter(|(_, deps)| deps.iter().any(|d| replace_set.contains(d)))
                .map(|(k, _)| k.clone())
                .collect();
            if keys.is_empty() {
                continue;
            }

            if dependent.protect {
                return Err(Error::ProtectedReplace {
                    urn: dependent.urn.to_string(),
                });
            }

            // Probe the provider with the dependent's replacement-keyed
            // inputs unknown: does it still require a replacement?
            let mut probe = dependent.inputs.clone();
            for key in &keys {
                probe.insert(key.clone(), unknown());
            }
            let provider = self.provider_for_state(dependent)?;
            let diff = provider
                .diff(
                    &dependent.urn,
                    &dependent.id,
                    &dependent.inputs,
                    &dependent.outputs,
                    &probe,
                    true,
                    &[],
                )
                .await
                .map_err(|e| Error::ProviderError {
                    urn: dependent.urn.to_string(),
                    message: e.to_string(),
                })?;

            if diff.replace() {
                replace_set.insert(dependent.urn.clone());
                out.push((Arc::clone(dependent), keys));
            }
        }

        Ok(out)
    }

    fn provider_for_state(&self, state: &ResourceState) -> Result<Arc<dyn Provider>> {
        match &state.provider {
            Some(reference) => self.deployment.providers.resolve(reference),
            None => self
                .deployment
                .providers
                .provider_for_package(state.urn.package()),
        }
    }

    // Targets.

    fn restrict_deletes_to_targets(&mut self, steps: Vec<Step>) -> Vec<Step> {
        let options = &self.deployment.options;
        let resources = self.deployment.prev.resources();
        let graph = DependencyGraph::new(resources);

        let mut allowed: HashSet<Urn> = options.targets.iter().cloned().collect();
        let excluded = HashSet::new();
        let roots: Vec<&Urn> = options.targets.iter().collect();
        for dependent in graph.depending_on(&roots, &excluded, true) {
            allowed.insert(dependent.urn.clone());
        }
        for urn in self.dependent_replace_keys.keys() {
            allowed.insert(urn.clone());
        }

        let mut kept = Vec::new();
        for step in steps {
            if step.op != StepOp::Delete || allowed.contains(&step.urn) {
                kept.push(step);
                continue;
            }
            // Dropped: the resource stays in the snapshot untouched.
            self.deletes.remove(&step.urn);
            self.deployment.diagnostics.error(
                Some(&step.urn),
                "resource needs to be deleted but is not targeted; it will be left as-is",
            );
            warn!(urn = %step.urn, "delete dropped by target restriction");
            if let Some(old) = step.old {
                let carried = old.as_ref().clone();
                let mut same = Step::new(StepOp::Same, step.urn.clone()).with_old(old);
                same.new = Some(carried);
                kept.push(same);
            }
        }
        kept
    }

    fn check_plan(&self, steps: &[Step]) -> Result<()> {
        if let Some(plan) = &self.deployment.plan {
            for step in steps {
                plan.check_step(&step.urn, step.op)?;
            }
        }
        Ok(())
    }
}

/// Applies ignore-changes: the old value (when present) replaces the new one
/// at each path; keys absent on the old state are dropped from the new
/// inputs.
fn apply_ignore_changes(
    inputs: &mut PropertyMap,
    old_inputs: &PropertyMap,
    paths: &[PropertyPath],
) {
    for path in paths {
        match path.lookup(old_inputs) {
            Some(old_value) => {
                let old_value = old_value.clone();
                path.store(inputs, old_value);
            }
            None => {
                path.take(inputs);
            }
        }
    }
}

/// Top-level keys differing between two maps, in old-then-new key order.
fn top_level_changes(old: &PropertyMap, new: &PropertyMap) -> Vec<String> {
    let mut changed = Vec::new();
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
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> PropertyMap {
        match value {
            serde_json::Value::Object(m) => m,
            _ => PropertyMap::new(),
        }
    }

    #[test]
    fn ignore_changes_copies_old_values_and_drops_missing_keys() {
        let old = map(json!({"kept": 1}));
        let mut new = map(json!({"kept": 2, "gone": 3}));
        let paths = parse_paths(&["kept".to_string(), "gone".to_string()]).unwrap();

        apply_ignore_changes(&mut new, &old, &paths);
        assert_eq!(new.get("kept"), Some(&json!(1)));
        assert!(!new.contains_key("gone"));
    }

    #[test]
    fn top_level_changes_sees_added_removed_and_modified_keys() {
        let old = map(json!({"a": 1, "b": 2}));
        let new = map(json!({"a": 1, "b": 3, "c": 4}));
        assert_eq!(top_level_changes(&old, &new), vec!["b", "c"]);
        assert!(top_level_changes(&old, &old).is_empty());
    }
}
