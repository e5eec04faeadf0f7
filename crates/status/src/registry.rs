//! In-process token registry.
//!
//! The gRPC surface and the step executor share this registry: the executor
//! reserves a token before invoking a provider operation, the provider
//! publishes view sub-steps under that token (over gRPC), and the executor
//! drains the buffer when it releases the token.

use std::any::Any;
use std::sync::Arc;

use converge_core::{StepOp, Urn, ViewStep};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Reservation metadata for one token.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// URN of the resource the enclosing operation targets.
    pub urn: Urn,
    /// Whether the enclosing operation is a refresh.
    pub refresh: bool,
    /// Whether published view states are persisted to the snapshot.
    pub persisted: bool,
}

/// One queued view step together with the observer payload recorded at
/// publication time.
pub struct PublishedViewStep {
    /// The published step.
    pub step: ViewStep,
    /// Opaque payload from [`ViewStepObserver::on_publish`], correlated back
    /// on completion.
    pub payload: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for PublishedViewStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedViewStep")
            .field("step", &self.step.op)
            .finish_non_exhaustive()
    }
}

/// Hooks the engine installs to observe publications and gRPC-side releases.
pub trait ViewStepObserver: Send + Sync {
    /// Fired for each published step, in publication order; the returned
    /// payload is buffered with the step.
    fn on_publish(&self, info: &TokenInfo, step: &ViewStep) -> Option<Box<dyn Any + Send>>;

    /// Fired when a token is released through the gRPC surface rather than
    /// by the executor.
    fn on_release(&self, info: &TokenInfo, steps: Vec<PublishedViewStep>);
}

struct TokenEntry {
    info: TokenInfo,
    steps: Mutex<Vec<PublishedViewStep>>,
}

/// Concurrent token table shared by the gRPC service and the executor.
#[derive(Default)]
pub struct StatusRegistry {
    tokens: DashMap<String, Arc<TokenEntry>>,
    by_urn: DashMap<Urn, String>,
    refresh_views: Mutex<Vec<(Urn, ViewStep)>>,
    observer: RwLock<Option<Arc<dyn ViewStepObserver>>>,
}

impl std::fmt::Debug for StatusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusRegistry")
            .field("tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

impl StatusRegistry {
    /// A fresh registry with no reservations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the observer fired on publications and gRPC releases.
    pub fn set_observer(&self, observer: Arc<dyn ViewStepObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Reserves a fresh token for `urn`.
    ///
    /// # Errors
    ///
    /// Returns an error when a token is already active for the URN.
    pub fn reserve_token(&self, urn: Urn, refresh: bool, persisted: bool) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        match self.by_urn.entry(urn.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::AlreadyReserved {
                urn: urn.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(token.clone());
                self.tokens.insert(
                    token.clone(),
                    Arc::new(TokenEntry {
                        info: TokenInfo {
                            urn: urn.clone(),
                            refresh,
                            persisted,
                        },
                        steps: Mutex::new(Vec::new()),
                    }),
                );
                debug!(%urn, refresh, persisted, "reserved status token");
                Ok(token)
            }
        }
    }

    /// The active token for `urn`, if any.
    #[must_use]
    pub fn token_for(&self, urn: &Urn) -> Option<String> {
        self.by_urn.get(urn).map(|t| t.clone())
    }

    /// Queues `steps` under `token`, firing the observer per step.
    ///
    /// Steps are not executed here; they apply in order when the token is
    /// released. Steps whose operation is Refresh are additionally recorded
    /// for later reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or already released token.
    pub fn publish(&self, token: &str, steps: Vec<ViewStep>) -> Result<()> {
        let entry = self
            .tokens
            .get(token)
            .map(|e| Arc::clone(&e))
            .ok_or_else(|| Error::UnknownToken {
                token: token.to_string(),
            })?;

        let observer = self.observer.read().clone();
        let mut buffer = entry.steps.lock();
        for step in steps {
            if step.op == StepOp::Refresh {
                self.refresh_views
                    .lock()
                    .push((entry.info.urn.clone(), step.clone()));
            }
            let payload = observer
                .as_ref()
                .and_then(|o| o.on_publish(&entry.info, &step));
            buffer.push(PublishedViewStep { step, payload });
        }
        debug!(urn = %entry.info.urn, queued = buffer.len(), "published view steps");
        Ok(())
    }

    /// Releases the token for `urn`, returning the buffered steps for the
    /// caller to apply in publication order.
    ///
    /// Releasing a URN with no active token yields an empty buffer.
    #[must_use]
    pub fn release_token(&self, urn: &Urn) -> (Option<TokenInfo>, Vec<PublishedViewStep>) {
        let Some((_, token)) = self.by_urn.remove(urn) else {
            return (None, Vec::new());
        };
        let Some((_, entry)) = self.tokens.remove(&token) else {
            return (None, Vec::new());
        };
        let steps = std::mem::take(&mut *entry.steps.lock());
        debug!(%urn, steps = steps.len(), "released status token");
        (Some(entry.info.clone()), steps)
    }

    /// Releases the token for `urn` on behalf of the gRPC surface, handing
    /// the buffered steps to the installed observer.
    pub fn release_token_remote(&self, urn: &Urn) {
        let (info, steps) = self.release_token(urn);
        if let (Some(info), Some(observer)) = (info, self.observer.read().clone()) {
            observer.on_release(&info, steps);
        }
    }

    /// The refresh-op view steps recorded so far, in publication order.
    #[must_use]
    pub fn refresh_views(&self) -> Vec<(Urn, ViewStep)> {
        self.refresh_views.lock().clone()
    }
}
