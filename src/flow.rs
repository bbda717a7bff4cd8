//! Confirmation state machine for a single send.
//!
//! ```text
//! Empty ──verify──▶ Building ──ok──▶ Built ──confirm──▶ Broadcasting ──▶ Terminal
//!   ▲                  │ err            │ cancel                           │ acknowledge
//!   └──────────────────┴────────────────┴──────────────────────────────────┘
//! ```
//!
//! At most one plan is `Built` or `Broadcasting` per flow; `verify` refuses to
//! start another, including while an abandoned broadcast is still running.
//! Every `verify` and every `abandon` bumps a generation counter, and an engine
//! result that comes back under an older generation is dropped instead of
//! being applied.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::broadcast::{confirm_and_broadcast, BroadcastOutcome};
use crate::builder::{self, UnsignedTransactionPlan};
use crate::engine::WalletEngine;
use crate::error::FlowError;
use crate::metrics::Metrics;
use crate::notice::{Notice, Notices};
use crate::validate::{FeeRateBounds, PaymentRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Building { generation: u64 },
    Built(UnsignedTransactionPlan),
    Broadcasting,
    Terminal(BroadcastOutcome),
}

struct Inner {
    phase: Phase,
    generation: u64,
    /// Set from `confirm` until its sign/broadcast calls return, even if
    /// `abandon` has already reset the visible phase.
    broadcasting: bool,
}

/// Drops the in-flight broadcast marker when `confirm` finishes or is dropped.
struct InFlight<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        inner.broadcasting = false;
        // Only reachable when `confirm` was dropped before it recorded an outcome.
        if inner.phase == Phase::Broadcasting {
            inner.phase = Phase::Empty;
        }
    }
}

pub struct SendFlow<E> {
    engine: Arc<E>,
    notices: Notices,
    bounds: FeeRateBounds,
    metrics: Metrics,
    inner: Mutex<Inner>,
}

impl<E: WalletEngine> SendFlow<E> {
    pub fn new(
        engine: Arc<E>,
        notices: Notices,
        bounds: FeeRateBounds,
        metrics: Metrics,
    ) -> Self {
        Self {
            engine,
            notices,
            bounds,
            metrics,
            inner: Mutex::new(Inner {
                phase: Phase::Empty,
                generation: 0,
                broadcasting: false,
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase.clone()
    }

    /// The plan awaiting confirmation, if any.
    pub fn pending_plan(&self) -> Option<UnsignedTransactionPlan> {
        match &self.lock().phase {
            Phase::Built(plan) => Some(plan.clone()),
            _ => None,
        }
    }

    /// Validate the form and build an unsigned transaction.
    ///
    /// A validation failure posts a notice and leaves the phase as it was. A
    /// build failure posts a notice and returns the flow to `Empty`. Refused
    /// with `PlanPending` while a plan is built or a broadcast is running.
    pub async fn verify(
        &self,
        request: &PaymentRequest,
    ) -> Result<UnsignedTransactionPlan, FlowError> {
        let validated = request.validate(self.bounds).inspect_err(|e| {
            self.notices.post(Notice::error(e.to_string()));
        })?;

        let generation = {
            let mut inner = self.lock();
            if inner.broadcasting || matches!(inner.phase, Phase::Built(_) | Phase::Broadcasting) {
                return Err(FlowError::PlanPending);
            }
            inner.generation += 1;
            inner.phase = Phase::Building { generation: inner.generation };
            inner.generation
        };

        self.metrics.builds.inc();
        let result = builder::build(self.engine.as_ref(), &validated).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "dropping stale build result");
            return Err(FlowError::Superseded);
        }
        match result {
            Ok(plan) => {
                inner.phase = Phase::Built(plan.clone());
                Ok(plan)
            }
            Err(e) => {
                inner.phase = Phase::Empty;
                drop(inner);
                self.metrics.build_failures.inc();
                self.notices.post(Notice::error(e.message()));
                Err(e.into())
            }
        }
    }

    /// Dismiss the confirmation surface. No engine call is made.
    pub fn cancel(&self) -> Result<UnsignedTransactionPlan, FlowError> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.phase, Phase::Empty) {
            Phase::Built(plan) => {
                debug!(sats = plan.sent_amount_sats, "plan cancelled");
                Ok(plan)
            }
            other => {
                inner.phase = other;
                Err(FlowError::NoPlan)
            }
        }
    }

    /// Sign and relay the pending plan. The outcome is returned to the caller
    /// and also kept as `Terminal` until [`SendFlow::acknowledge`].
    pub async fn confirm(&self) -> Result<BroadcastOutcome, FlowError> {
        let (plan, generation) = {
            let mut inner = self.lock();
            match std::mem::replace(&mut inner.phase, Phase::Broadcasting) {
                Phase::Built(plan) => {
                    inner.broadcasting = true;
                    (plan, inner.generation)
                }
                other => {
                    inner.phase = other;
                    return Err(FlowError::NoPlan);
                }
            }
        };
        let in_flight = InFlight { inner: &self.inner };

        let outcome = confirm_and_broadcast(self.engine.as_ref(), &plan, &self.notices).await;
        self.metrics.record_broadcast(&outcome);

        let mut inner = self.lock();
        // Abandoned mid-broadcast: the caller still gets the result, the flow stays Empty.
        if inner.generation == generation {
            inner.phase = Phase::Terminal(outcome.clone());
        }
        drop(inner);
        drop(in_flight);
        Ok(outcome)
    }

    /// Take the terminal outcome and return to `Empty`.
    pub fn acknowledge(&self) -> Option<BroadcastOutcome> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.phase, Phase::Empty) {
            Phase::Terminal(outcome) => Some(outcome),
            other => {
                inner.phase = other;
                None
            }
        }
    }

    /// The user left the send screen. Discards any plan and invalidates
    /// in-flight engine results; it cannot stop calls already running, and a
    /// running broadcast keeps blocking `verify` until it returns.
    pub fn abandon(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if inner.phase != Phase::Empty {
            info!(generation = inner.generation, "send flow abandoned");
        }
        inner.phase = Phase::Empty;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}
