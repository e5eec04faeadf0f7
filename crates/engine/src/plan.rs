//! Recorded plans and plan conformance.
//!
//! A deployment may run against a pre-recorded plan: per URN, the ordered
//! operations the plan allows, plus the Check randomness seed so defaults
//! reproduce. Generated steps are validated against the plan as they are
//! produced; URNs the plan does not mention may only be Same.

use std::collections::{HashMap, VecDeque};

use converge_core::{StepOp, Urn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// The recorded plan for one resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePlan {
    /// Operations allowed for this URN, consumed in order.
    pub ops: VecDeque<StepOp>,
    /// Seed recorded for the Check call, when one was drawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<[u8; 32]>,
    /// Whether the plan expects a RegisterResourceOutputs for this URN.
    #[serde(default)]
    pub expect_outputs: bool,
}

/// A recorded plan for a whole deployment.
#[derive(Debug, Default)]
pub struct DeploymentPlan {
    resources: Mutex<HashMap<Urn, ResourcePlan>>,
}

impl DeploymentPlan {
    /// An empty plan that allows only Same steps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a plan from per-resource entries.
    #[must_use]
    pub fn from_resources(entries: impl IntoIterator<Item = (Urn, ResourcePlan)>) -> Self {
        Self {
            resources: Mutex::new(entries.into_iter().collect()),
        }
    }

    /// The recorded Check seed for `urn`, if any.
    #[must_use]
    pub fn seed_for(&self, urn: &Urn) -> Option<[u8; 32]> {
        self.resources.lock().get(urn).and_then(|p| p.seed)
    }

    /// Validates one generated step, consuming the URN's operation queue in
    /// order.
    ///
    /// # Errors
    ///
    /// Returns a plan violation when the operation does not match the next
    /// allowed one, or when an unplanned URN produces anything but Same.
    pub fn check_step(&self, urn: &Urn, op: StepOp) -> Result<()> {
        let mut resources = self.resources.lock();
        match resources.get_mut(urn) {
            Some(entry) => match entry.ops.pop_front() {
                Some(allowed) if allowed == op => {
                    debug!(%urn, %op, "step conforms to plan");
                    Ok(())
                }
                Some(allowed) => Err(Error::PlanViolation {
                    urn: urn.to_string(),
                    message: format!("expected {allowed}, got {op}"),
                }),
                None => Err(Error::PlanViolation {
                    urn: urn.to_string(),
                    message: format!("no further operations were planned, got {op}"),
                }),
            },
            None if op == StepOp::Same => Ok(()),
            None => Err(Error::PlanViolation {
                urn: urn.to_string(),
                message: format!("resource was not in the plan, got {op}"),
            }),
        }
    }

    /// Whether the plan expects outputs for `urn`.
    #[must_use]
    pub fn expects_outputs(&self, urn: &Urn) -> bool {
        self.resources
            .lock()
            .get(urn)
            .is_some_and(|p| p.expect_outputs)
    }
}
