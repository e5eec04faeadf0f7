//! Provider diff results.
//!
//! These are the shapes a provider's `Diff`/`DiffConfig` produce and the
//! step generator consumes when discriminating Same / Update / Replace.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a diff found changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DiffChanges {
    /// No changes between old and new inputs.
    #[default]
    None,
    /// At least one property changed.
    Some,
    /// The provider could not tell; the engine falls back to a value compare.
    Unknown,
}

/// The kind of change recorded for a single property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    /// Property was added.
    Add,
    /// Property was added and forces a replacement.
    AddReplace,
    /// Property was removed.
    Delete,
    /// Property was removed and forces a replacement.
    DeleteReplace,
    /// Property value changed in place.
    Update,
    /// Property value changed and forces a replacement.
    UpdateReplace,
}

impl DiffKind {
    /// Whether this kind forces a replacement.
    #[must_use]
    pub fn is_replace(self) -> bool {
        matches!(self, Self::AddReplace | Self::DeleteReplace | Self::UpdateReplace)
    }

    /// The replacement-forcing variant of this kind.
    #[must_use]
    pub fn as_replace(self) -> Self {
        match self {
            Self::Add | Self::AddReplace => Self::AddReplace,
            Self::Delete | Self::DeleteReplace => Self::DeleteReplace,
            Self::Update | Self::UpdateReplace => Self::UpdateReplace,
        }
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::AddReplace => "add-replace",
            Self::Delete => "delete",
            Self::DeleteReplace => "delete-replace",
            Self::Update => "update",
            Self::UpdateReplace => "update-replace",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DiffKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "add-replace" => Ok(Self::AddReplace),
            "delete" => Ok(Self::Delete),
            "delete-replace" => Ok(Self::DeleteReplace),
            "update" => Ok(Self::Update),
            "update-replace" => Ok(Self::UpdateReplace),
            other => Err(crate::error::Error::InvalidEnumToken {
                kind: "diff kind",
                token: other.to_string(),
            }),
        }
    }
}

/// Detailed change record for one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDiff {
    /// What happened to the property.
    pub kind: DiffKind,
    /// Whether the change was observed on inputs (as opposed to outputs).
    pub input_diff: bool,
}

/// Result of diffing a resource's old state against its desired inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiffResult {
    /// Whether anything changed.
    pub changes: DiffChanges,
    /// Top-level keys whose change forces a replacement.
    pub replace_keys: Vec<String>,
    /// Top-level keys that changed.
    pub changed_keys: Vec<String>,
    /// Keys the provider guarantees stable across the operation.
    pub stable_keys: Vec<String>,
    /// Provider's request to delete the old resource before creating the new.
    pub delete_before_replace: bool,
    /// Per-property change detail, keyed by property path.
    pub detailed_diff: BTreeMap<String, PropertyDiff>,
}

impl DiffResult {
    /// A diff that found no changes.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A diff the provider could not compute.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            changes: DiffChanges::Unknown,
            ..Self::default()
        }
    }

    /// Whether this diff requires replacing the resource.
    #[must_use]
    pub fn replace(&self) -> bool {
        !self.replace_keys.is_empty()
            || self.detailed_diff.values().any(|d| d.kind.is_replace())
    }

    /// Whether this diff changes anything at all.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        matches!(self.changes, DiffChanges::Some)
    }
}

/// A single failed property from a provider `Check` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    /// The property the failure is attributed to; empty for whole-resource
    /// failures.
    pub property: String,
    /// Human-readable reason.
    pub reason: String,
}
