//! Cross-stack output coordination.
//!
//! When several stacks deploy together, one stack's program may wait for
//! another's root outputs. The store records each stack's completion,
//! detects wait cycles before blocking, and unblocks waiters on publication,
//! failure, or cancellation.

use std::collections::HashMap;

use converge_core::PropertyMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum StackOutcome {
    Pending,
    Outputs(PropertyMap),
    Failed(String),
}

struct StackCell {
    tx: watch::Sender<StackOutcome>,
    rx: watch::Receiver<StackOutcome>,
}

/// Output coordination across a set of co-deployed stacks.
pub struct OutputWaiterStore {
    stacks: HashMap<String, StackCell>,
    /// waiter → target edges of currently blocked waits.
    wait_edges: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for OutputWaiterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputWaiterStore")
            .field("stacks", &self.stacks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl OutputWaiterStore {
    /// A store for the given set of co-deployed stack names.
    #[must_use]
    pub fn new(stack_names: impl IntoIterator<Item = String>) -> Self {
        let stacks = stack_names
            .into_iter()
            .map(|name| {
                let (tx, rx) = watch::channel(StackOutcome::Pending);
                (name, StackCell { tx, rx })
            })
            .collect();
        Self {
            stacks,
            wait_edges: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `stack` participates in this co-deployment.
    #[must_use]
    pub fn contains(&self, stack: &str) -> bool {
        self.stacks.contains_key(stack)
    }

    /// Publishes a stack's root outputs and signals waiters.
    ///
    /// Idempotent: only the first publication sticks.
    #[instrument(name = "waiter_set_outputs", skip(self, outputs))]
    pub fn set_outputs(&self, stack: &str, outputs: PropertyMap) {
        if let Some(cell) = self.stacks.get(stack) {
            cell.tx.send_if_modified(|current| {
                if matches!(current, StackOutcome::Pending) {
                    *current = StackOutcome::Outputs(outputs.clone());
                    true
                } else {
                    false
                }
            });
            debug!(%stack, "stack outputs published");
        }
    }

    /// Records a stack failure and signals waiters.
    ///
    /// Idempotent: only the first outcome sticks.
    #[instrument(name = "waiter_fail_stack", skip(self))]
    pub fn fail_stack(&self, stack: &str, error: &str) {
        if let Some(cell) = self.stacks.get(stack) {
            cell.tx.send_if_modified(|current| {
                if matches!(current, StackOutcome::Pending) {
                    *current = StackOutcome::Failed(error.to_string());
                    true
                } else {
                    false
                }
            });
            debug!(%stack, "stack failure recorded");
        }
    }

    /// Waits for `target`'s outputs on behalf of `waiter`.
    ///
    /// Returns immediately when outputs or a failure are already recorded.
    /// Otherwise the wait edge is recorded, the wait graph is checked for a
    /// cycle reachable from `target`, and the call blocks until the target
    /// signals or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error on a wait cycle, target failure, or cancellation.
    #[instrument(name = "waiter_wait_for_outputs", skip(self, cancel))]
    pub async fn wait_for_outputs(
        &self,
        cancel: CancellationToken,
        waiter: &str,
        target: &str,
    ) -> Result<PropertyMap> {
        let Some(cell) = self.stacks.get(target) else {
            return Err(Error::StackFailed {
                target: target.to_string(),
                message: "stack is not part of this co-deployment".to_string(),
            });
        };

        let mut rx = cell.rx.clone();

        // Fast path: the outcome is already known.
        match &*rx.borrow() {
            StackOutcome::Outputs(outputs) => return Ok(outputs.clone()),
            StackOutcome::Failed(message) => {
                return Err(Error::StackFailed {
                    target: target.to_string(),
                    message: message.clone(),
                });
            }
            StackOutcome::Pending => {}
        }

        // Record the wait edge, then walk the wait graph forward from the
        // target; reaching the waiter again is a cycle.
        {
            let mut edges = self.wait_edges.lock();
            edges.insert(waiter.to_string(), target.to_string());
            let mut current = target.to_string();
            while let Some(next) = edges.get(&current) {
                if next == waiter {
                    edges.remove(waiter);
                    return Err(Error::OutputWaitCycle {
                        waiter: waiter.to_string(),
                        target: target.to_string(),
                    });
                }
                current = next.clone();
            }
        }

        let result = loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break Err(Error::OutputWaitCancelled {
                            target: target.to_string(),
                        });
                    }
                    let outcome = rx.borrow_and_update().clone();
                    match outcome {
                        StackOutcome::Outputs(outputs) => break Ok(outputs),
                        StackOutcome::Failed(message) => {
                            break Err(Error::StackFailed {
                                target: target.to_string(),
                                message,
                            });
                        }
                        StackOutcome::Pending => {}
                    }
                }
                () = cancel.cancelled() => {
                    break Err(Error::OutputWaitCancelled {
                        target: target.to_string(),
                    });
                }
            }
        };

        self.wait_edges.lock().remove(waiter);
        result
    }
}
