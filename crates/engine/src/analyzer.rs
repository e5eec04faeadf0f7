//! Policy analyzer capability.
//!
//! Analyzers run against each registration before steps are generated:
//! `remediate` may rewrite inputs, `analyze` reports violations. Mandatory
//! violations mark the resource invalid; previews collect them so the user
//! sees all at once, applies fail on the first.

use async_trait::async_trait;
use converge_core::{PropertyMap, Urn};
use serde::{Deserialize, Serialize};

/// How binding an analyzer diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementLevel {
    /// Surface the diagnostic, do not fail.
    Advisory,
    /// Fail the resource.
    Mandatory,
}

/// One analyzer diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    /// Name of the policy that fired.
    pub policy: String,
    /// How binding the diagnostic is.
    pub enforcement: EnforcementLevel,
    /// Human-readable message.
    pub message: String,
}

impl PolicyViolation {
    /// Whether this violation fails the resource.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.enforcement == EnforcementLevel::Mandatory
    }
}

/// The policy analyzer capability.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// The analyzer's name, for attribution in diagnostics.
    fn name(&self) -> &str;

    /// May rewrite the inputs before analysis; returns the inputs to use.
    async fn remediate(&self, urn: &Urn, inputs: PropertyMap) -> PropertyMap {
        let _ = urn;
        inputs
    }

    /// Reports violations for the given inputs.
    async fn analyze(&self, urn: &Urn, inputs: &PropertyMap) -> Vec<PolicyViolation>;
}
