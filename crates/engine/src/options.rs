//! Deployment options.

use std::collections::BTreeSet;
use std::path::PathBuf;

use converge_core::Urn;
use serde::{Deserialize, Serialize};

/// Options controlling one deployment.
///
/// These mirror the engine's environment surface: parallelism, preview mode,
/// target restrictions, forced replacements, and an optional recorded plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptions {
    /// Worker-pool size; 1 executes fully serially.
    pub parallel: usize,
    /// Preview (dry-run) mode: providers are asked not to mutate anything.
    pub dry_run: bool,
    /// When non-empty, restrict operations to these URNs (and the implicitly
    /// targeted root stack and providers).
    #[serde(default)]
    pub targets: BTreeSet<Urn>,
    /// Also target everything depending on a target.
    #[serde(default)]
    pub target_dependents: bool,
    /// Force these URNs to be replaced regardless of diffs.
    #[serde(default)]
    pub replace_targets: BTreeSet<Urn>,
    /// Path of the debug trace log, when tracing to a file is requested.
    #[serde(default)]
    pub trace_log: Option<PathBuf>,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            parallel: 10,
            dry_run: false,
            targets: BTreeSet::new(),
            target_dependents: false,
            replace_targets: BTreeSet::new(),
            trace_log: None,
        }
    }
}

impl DeploymentOptions {
    /// Whether `--target` restrictions are in effect.
    #[must_use]
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Whether `urn` is targeted, directly or implicitly.
    ///
    /// Providers and the root stack are always implicitly targeted.
    #[must_use]
    pub fn is_targeted(&self, urn: &Urn) -> bool {
        if !self.has_targets() {
            return true;
        }
        urn.is_provider() || urn.is_root_stack() || self.targets.contains(urn)
    }

    /// Whether `urn` was named by `--replace`.
    #[must_use]
    pub fn is_replace_target(&self, urn: &Urn) -> bool {
        self.replace_targets.contains(urn)
    }
}
