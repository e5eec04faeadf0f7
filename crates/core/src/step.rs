//! Planned operations.
//!
//! A [`Step`] is one planned provider operation. Steps are a tagged variant:
//! the executor and the status server dispatch on [`StepOp`] and the common
//! accessors instead of a type hierarchy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diff::PropertyDiff;
use crate::property::PropertyMap;
use crate::state::ResourceState;
use crate::urn::Urn;

/// Identifier correlating steps with the program event they answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// Outcome status a provider reports for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceStatus {
    /// The operation completed.
    #[default]
    Ok,
    /// The resource exists but initialization did not complete.
    PartialFailure,
    /// The operation's effect on the resource is uncertain.
    Unknown,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::PartialFailure => "partial-failure",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResourceStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "partial-failure" => Ok(Self::PartialFailure),
            "unknown" => Ok(Self::Unknown),
            other => Err(crate::error::Error::InvalidEnumToken {
                kind: "resource status",
                token: other.to_string(),
            }),
        }
    }
}

/// The operation a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOp {
    /// Nothing to do; carry the state forward.
    Same,
    /// Create a new resource.
    Create,
    /// Update the resource in place.
    Update,
    /// Delete an existing resource.
    Delete,
    /// Logical replacement marker tying a create/delete pair together.
    Replace,
    /// Create the replacement copy of a replaced resource.
    CreateReplacement,
    /// Delete the condemned copy of a replaced resource.
    DeleteReplaced,
    /// Drop a leftover pending-replacement marker without touching the
    /// provider.
    RemovePendingReplace,
    /// Read an external resource.
    Read,
    /// Read an external resource, replacing a previously read copy.
    ReadReplacement,
    /// Drop a previously read copy that was not read again.
    ReadDiscard,
    /// Refresh a resource's state from the provider.
    Refresh,
    /// Adopt an existing resource under engine management.
    Import,
    /// Adopt an existing resource, replacing a managed one.
    ImportReplacement,
    /// A create that was skipped because the resource is not targeted.
    SkippedCreate,
    /// A provider-published sub-step scoped to an owning resource.
    View,
}

impl StepOp {
    /// Whether this operation deletes the old copy of a resource.
    #[must_use]
    pub fn is_deletion(self) -> bool {
        matches!(self, Self::Delete | Self::DeleteReplaced)
    }

    /// Whether this operation belongs to a replacement sequence.
    #[must_use]
    pub fn is_replacement(self) -> bool {
        matches!(
            self,
            Self::Replace | Self::CreateReplacement | Self::DeleteReplaced | Self::ImportReplacement
        )
    }

    /// Whether the executor must reserve a status token for this operation.
    #[must_use]
    pub fn reserves_status_token(self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::CreateReplacement
                | Self::Update
                | Self::Delete
                | Self::DeleteReplaced
                | Self::Refresh
                | Self::Read
                | Self::ReadReplacement
                | Self::Import
                | Self::ImportReplacement
        )
    }
}

impl fmt::Display for StepOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Same => "same",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
            Self::CreateReplacement => "create-replacement",
            Self::DeleteReplaced => "delete-replaced",
            Self::RemovePendingReplace => "remove-pending-replace",
            Self::Read => "read",
            Self::ReadReplacement => "read-replacement",
            Self::ReadDiscard => "read-discard",
            Self::Refresh => "refresh",
            Self::Import => "import",
            Self::ImportReplacement => "import-replacement",
            Self::SkippedCreate => "skipped-create",
            Self::View => "view",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StepOp {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "same" => Ok(Self::Same),
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            "create-replacement" => Ok(Self::CreateReplacement),
            "delete-replaced" => Ok(Self::DeleteReplaced),
            "remove-pending-replace" => Ok(Self::RemovePendingReplace),
            "read" => Ok(Self::Read),
            "read-replacement" => Ok(Self::ReadReplacement),
            "read-discard" => Ok(Self::ReadDiscard),
            "refresh" => Ok(Self::Refresh),
            "import" => Ok(Self::Import),
            "import-replacement" => Ok(Self::ImportReplacement),
            "skipped-create" => Ok(Self::SkippedCreate),
            "view" => Ok(Self::View),
            other => Err(crate::error::Error::InvalidEnumToken {
                kind: "step operation",
                token: other.to_string(),
            }),
        }
    }
}

/// One planned operation.
#[derive(Debug, Clone)]
pub struct Step {
    /// Operation tag.
    pub op: StepOp,
    /// The URN the step operates on.
    pub urn: Urn,
    /// Prior state; `None` for creates and reads of unseen resources.
    pub old: Option<Arc<ResourceState>>,
    /// Planned new state; `None` for pure deletions.
    pub new: Option<ResourceState>,
    /// Top-level keys whose change caused a replacement.
    pub keys: Vec<String>,
    /// Top-level keys that changed.
    pub diffs: Vec<String>,
    /// Per-property change detail.
    pub detailed_diff: BTreeMap<String, PropertyDiff>,
    /// For deletions: leave a pending-replacement marker instead of dropping
    /// the state.
    pub pending_replace: bool,
    /// The program event this step answers, if any.
    pub event: Option<EventId>,
}

impl Step {
    /// A step with the given tag and identity and nothing else.
    #[must_use]
    pub fn new(op: StepOp, urn: Urn) -> Self {
        Self {
            op,
            urn,
            old: None,
            new: None,
            keys: Vec::new(),
            diffs: Vec::new(),
            detailed_diff: BTreeMap::new(),
            pending_replace: false,
            event: None,
        }
    }

    /// Attaches the prior state.
    #[must_use]
    pub fn with_old(mut self, old: Arc<ResourceState>) -> Self {
        self.old = Some(old);
        self
    }

    /// Attaches the planned new state.
    #[must_use]
    pub fn with_new(mut self, new: ResourceState) -> Self {
        self.new = Some(new);
        self
    }

    /// Attaches the originating event.
    #[must_use]
    pub fn with_event(mut self, event: Option<EventId>) -> Self {
        self.event = event;
        self
    }

    /// The state this step would carry into the next snapshot, if any.
    #[must_use]
    pub fn result_state(&self) -> Option<&ResourceState> {
        self.new.as_ref()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.op, self.urn)
    }
}

/// A provider-published sub-step, as carried over the status side-channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStep {
    /// Operation the provider performed on the view.
    pub op: StepOp,
    /// Status the provider reports for the view operation.
    #[serde(default)]
    pub status: ResourceStatus,
    /// Error text when the view operation failed.
    #[serde(default)]
    pub error: String,
    /// Prior view record, if any.
    #[serde(default)]
    pub old: Option<ViewStepState>,
    /// New view record, if any.
    #[serde(default)]
    pub new: Option<ViewStepState>,
    /// Top-level keys whose change caused a replacement.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Top-level keys that changed.
    #[serde(default)]
    pub diffs: Vec<String>,
    /// Whether `detailed_diff` was populated by the provider.
    #[serde(default)]
    pub has_detailed_diff: bool,
    /// Per-property change detail.
    #[serde(default)]
    pub detailed_diff: BTreeMap<String, PropertyDiff>,
}

/// Identity and properties of one side of a view step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStepState {
    /// View resource type.
    #[serde(rename = "type")]
    pub ty: String,
    /// View resource name.
    pub name: String,
    /// Parent type chain below the owning resource, if nested.
    #[serde(default)]
    pub parent_type: String,
    /// Input properties.
    #[serde(default)]
    pub inputs: PropertyMap,
    /// Output properties.
    #[serde(default)]
    pub outputs: PropertyMap,
}
