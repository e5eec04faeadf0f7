//! Resource states, goals, and snapshots.
//!
//! A [`ResourceState`] is the persistent record of one deployed resource; a
//! [`Goal`] is the desired state declared by the program; a [`Snapshot`] is
//! the ordered list of states a deployment starts from, and a
//! [`SnapshotSink`] receives the states the next snapshot is built from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::property::PropertyMap;
use crate::urn::Urn;

/// Provider id marker that forbids falling back to a default provider.
pub const DENY_DEFAULT_PROVIDER_ID: &str = "deny-default";

/// Lifecycle phases a resource hook can be attached to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum HookPhase {
    /// Before the provider Create call.
    BeforeCreate,
    /// After a successful Create.
    AfterCreate,
    /// Before the provider Update call.
    BeforeUpdate,
    /// After a successful Update.
    AfterUpdate,
    /// Before the provider Delete call.
    BeforeDelete,
    /// After a successful Delete.
    AfterDelete,
    /// When a Create fails; may request a retry.
    OnCreateError,
    /// When an Update fails; may request a retry.
    OnUpdateError,
    /// When a Delete fails; may request a retry.
    OnDeleteError,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BeforeCreate => "before-create",
            Self::AfterCreate => "after-create",
            Self::BeforeUpdate => "before-update",
            Self::AfterUpdate => "after-update",
            Self::BeforeDelete => "before-delete",
            Self::AfterDelete => "after-delete",
            Self::OnCreateError => "on-create-error",
            Self::OnUpdateError => "on-update-error",
            Self::OnDeleteError => "on-delete-error",
        };
        write!(f, "{s}")
    }
}

/// Per-resource operation timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CustomTimeouts {
    /// Timeout for Create, in seconds; 0 means provider default.
    #[serde(default)]
    pub create: f64,
    /// Timeout for Update, in seconds; 0 means provider default.
    #[serde(default)]
    pub update: f64,
    /// Timeout for Delete, in seconds; 0 means provider default.
    #[serde(default)]
    pub delete: f64,
}

/// Reference to the provider managing a custom resource: `<urn>::<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderReference {
    /// URN of the provider resource.
    pub urn: Urn,
    /// Provider-assigned id of the provider resource.
    pub id: String,
}

impl ProviderReference {
    /// Builds a reference from its parts.
    #[must_use]
    pub fn new(urn: Urn, id: impl Into<String>) -> Self {
        Self { urn, id: id.into() }
    }

    /// Whether this reference carries the deny-default marker.
    #[must_use]
    pub fn is_deny_default(&self) -> bool {
        self.id == DENY_DEFAULT_PROVIDER_ID
    }
}

impl fmt::Display for ProviderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.urn, self.id)
    }
}

impl FromStr for ProviderReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let err = |message: &str| Error::InvalidProviderReference {
            reference: s.to_string(),
            message: message.to_string(),
        };
        let (urn_text, id) = s.rsplit_once("::").ok_or_else(|| err("missing id"))?;
        if id.is_empty() {
            return Err(err("empty id"));
        }
        let urn: Urn = urn_text.parse().map_err(|e| err(&format!("bad URN: {e}")))?;
        if !urn.is_provider() {
            return Err(err("URN does not name a provider resource"));
        }
        Ok(Self::new(urn, id))
    }
}

impl TryFrom<String> for ProviderReference {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProviderReference> for String {
    fn from(r: ProviderReference) -> Self {
        r.to_string()
    }
}

/// The persistent record for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    /// Canonical identity.
    pub urn: Urn,
    /// Resource type, e.g. `aws:s3:Bucket`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Provider-assigned id; empty until created.
    #[serde(default)]
    pub id: String,
    /// The id the resource was imported under, if any.
    #[serde(default)]
    pub import_id: String,
    /// Provider-managed leaf resource (as opposed to a component group).
    #[serde(default)]
    pub custom: bool,
    /// Read-only resource not owned by this deployment.
    #[serde(default)]
    pub external: bool,
    /// Desired properties sent to the provider.
    #[serde(default)]
    pub inputs: PropertyMap,
    /// Properties the provider reported.
    #[serde(default)]
    pub outputs: PropertyMap,
    /// Parent URN, if any.
    #[serde(default)]
    pub parent: Option<Urn>,
    /// Implicit and explicit dependencies, in registration order.
    #[serde(default)]
    pub dependencies: Vec<Urn>,
    /// Dependencies attributed to individual input properties.
    #[serde(default)]
    pub property_dependencies: BTreeMap<String, Vec<Urn>>,
    /// Reference to the managing provider; `None` for components.
    #[serde(default)]
    pub provider: Option<ProviderReference>,
    /// Forbid deletion and replacement.
    #[serde(default)]
    pub protect: bool,
    /// Skip the provider Delete call on removal.
    #[serde(default)]
    pub retain_on_delete: bool,
    /// Deletion of this URN implies deletion of `self`.
    #[serde(default)]
    pub deleted_with: Option<Urn>,
    /// Marked for eventual deletion pending a successful replacement.
    #[serde(default)]
    pub pending_replacement: bool,
    /// Snapshot-only marker: this old copy is condemned by a replacement.
    #[serde(default)]
    pub delete: bool,
    /// Old URNs this record subsumes.
    #[serde(default)]
    pub aliases: Vec<Urn>,
    /// Hook names per lifecycle phase.
    #[serde(default)]
    pub hooks: BTreeMap<HookPhase, Vec<String>>,
    /// The resource was created but not fully initialized last run.
    #[serde(default)]
    pub init_errors: Vec<String>,
    /// Non-empty when this state is a provider-published view of another
    /// resource.
    #[serde(default)]
    pub view_of: Option<Urn>,
    /// Outputs to additionally mark secret.
    #[serde(default)]
    pub additional_secret_outputs: Vec<String>,
    /// Per-operation timeouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_timeouts: Option<CustomTimeouts>,
    /// When the resource was first created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the resource was last modified.
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ResourceState {
    /// A fresh state for `urn`, with everything else empty.
    #[must_use]
    pub fn new(urn: Urn) -> Self {
        let ty = urn.resource_type().to_string();
        Self {
            urn,
            ty,
            id: String::new(),
            import_id: String::new(),
            custom: false,
            external: false,
            inputs: PropertyMap::new(),
            outputs: PropertyMap::new(),
            parent: None,
            dependencies: Vec::new(),
            property_dependencies: BTreeMap::new(),
            provider: None,
            protect: false,
            retain_on_delete: false,
            deleted_with: None,
            pending_replacement: false,
            delete: false,
            aliases: Vec::new(),
            hooks: BTreeMap::new(),
            init_errors: Vec::new(),
            view_of: None,
            additional_secret_outputs: Vec::new(),
            custom_timeouts: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Whether this state is itself a provider resource.
    #[must_use]
    pub fn is_provider(&self) -> bool {
        self.urn.is_provider()
    }

    /// Every URN this state depends on: parent, dependencies, property
    /// dependencies, and `deleted_with`.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &Urn> {
        self.parent
            .iter()
            .chain(self.dependencies.iter())
            .chain(self.property_dependencies.values().flatten())
            .chain(self.deleted_with.iter())
    }

    /// Hook names configured for `phase`.
    #[must_use]
    pub fn hook_names(&self, phase: HookPhase) -> &[String] {
        self.hooks.get(&phase).map_or(&[], Vec::as_slice)
    }
}

/// How a `deleteBeforeReplace` preference was declared on a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteBeforeReplace {
    /// No preference; the provider decides.
    #[default]
    Unset,
    /// Force delete-before-replace.
    Force,
    /// Forbid delete-before-replace even if the provider requests it.
    Never,
}

/// An alias declaration on a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Alias {
    /// A literal previous URN.
    Urn(Urn),
    /// A partial older identity; unset parts inherit from the goal.
    Spec {
        /// Previous name.
        #[serde(default)]
        name: Option<String>,
        /// Previous type.
        #[serde(default, rename = "type")]
        ty: Option<String>,
        /// Previous stack.
        #[serde(default)]
        stack: Option<String>,
        /// Previous project.
        #[serde(default)]
        project: Option<String>,
        /// Previous parent.
        #[serde(default)]
        parent: Option<Urn>,
        /// The resource previously had no parent.
        #[serde(default)]
        no_parent: bool,
    },
}

/// The desired state for one resource, from a RegisterResource event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Resource type.
    #[serde(rename = "type")]
    pub ty: String,
    /// Resource name.
    pub name: String,
    /// Provider-managed leaf resource.
    pub custom: bool,
    /// Import id; non-empty requests an import.
    #[serde(default)]
    pub id: String,
    /// Parent URN.
    #[serde(default)]
    pub parent: Option<Urn>,
    /// Desired input properties.
    #[serde(default)]
    pub inputs: PropertyMap,
    /// Explicit dependencies.
    #[serde(default)]
    pub dependencies: Vec<Urn>,
    /// Dependencies attributed to individual input properties.
    #[serde(default)]
    pub property_dependencies: BTreeMap<String, Vec<Urn>>,
    /// Provider reference text; empty requests the default provider.
    #[serde(default)]
    pub provider: String,
    /// Forbid deletion and replacement.
    #[serde(default)]
    pub protect: bool,
    /// Skip the provider Delete call on removal.
    #[serde(default)]
    pub retain_on_delete: bool,
    /// Deletion of this URN implies deletion of `self`.
    #[serde(default)]
    pub deleted_with: Option<Urn>,
    /// Replacement-strategy preference.
    #[serde(default)]
    pub delete_before_replace: DeleteBeforeReplace,
    /// Property paths whose change forces a replacement.
    #[serde(default)]
    pub replace_on_changes: Vec<String>,
    /// Property paths to ignore when diffing.
    #[serde(default)]
    pub ignore_changes: Vec<String>,
    /// Outputs to additionally mark secret.
    #[serde(default)]
    pub additional_secret_outputs: Vec<String>,
    /// Per-operation timeouts.
    #[serde(default)]
    pub custom_timeouts: Option<CustomTimeouts>,
    /// Alias declarations.
    #[serde(default)]
    pub aliases: Vec<Alias>,
    /// Hook names per lifecycle phase.
    #[serde(default)]
    pub hooks: BTreeMap<HookPhase, Vec<String>>,
}

/// The ordered list of resource states a deployment starts from.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    resources: Vec<Arc<ResourceState>>,
    by_urn: BTreeMap<Urn, usize>,
}

impl Snapshot {
    /// Builds a snapshot from states in registration order.
    ///
    /// When several states share a URN (an old copy condemned by a pending
    /// replacement next to its live successor), the first non-`delete` state
    /// wins the index slot.
    #[must_use]
    pub fn new(resources: Vec<ResourceState>) -> Self {
        let resources: Vec<Arc<ResourceState>> = resources.into_iter().map(Arc::new).collect();
        let mut by_urn = BTreeMap::new();
        for (i, r) in resources.iter().enumerate() {
            if !r.delete {
                by_urn.entry(r.urn.clone()).or_insert(i);
            }
        }
        Self { resources, by_urn }
    }

    /// The live state for `urn`, if any.
    #[must_use]
    pub fn get(&self, urn: &Urn) -> Option<&Arc<ResourceState>> {
        self.by_urn.get(urn).map(|&i| &self.resources[i])
    }

    /// All states in registration order, condemned copies included.
    #[must_use]
    pub fn resources(&self) -> &[Arc<ResourceState>] {
        &self.resources
    }

    /// Number of states, condemned copies included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the snapshot holds no states.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Single-writer sink receiving the states the next snapshot is built from.
///
/// Persistence is a collaborator concern; the engine only appends completed
/// states in completion order.
pub trait SnapshotSink: Send + Sync {
    /// Appends one completed state.
    fn append(&self, state: ResourceState);

    /// Marks a previously appended state for `urn` as superseded (used when
    /// a later step in the same run rewrites it).
    fn replace(&self, urn: &Urn, state: ResourceState);
}

/// In-memory sink collecting states for inspection and tests.
#[derive(Debug, Default)]
pub struct InMemorySnapshotSink {
    states: parking_lot::Mutex<Vec<ResourceState>>,
}

impl InMemorySnapshotSink {
    /// A fresh, empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The states appended so far, in completion order.
    #[must_use]
    pub fn states(&self) -> Vec<ResourceState> {
        self.states.lock().clone()
    }

    /// Drains the sink into a [`Snapshot`].
    #[must_use]
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot::new(self.states.into_inner())
    }
}

impl SnapshotSink for InMemorySnapshotSink {
    fn append(&self, state: ResourceState) {
        self.states.lock().push(state);
    }

    fn replace(&self, urn: &Urn, state: ResourceState) {
        let mut states = self.states.lock();
        if let Some(slot) = states.iter_mut().rev().find(|s| &s.urn == urn) {
            *slot = state;
        } else {
            states.push(state);
        }
    }
}
