//! One wallet session: the send flow and the balance monitor over a shared engine.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::balance::{BalanceMonitor, BalanceSnapshot};
use crate::broadcast::BroadcastOutcome;
use crate::builder::UnsignedTransactionPlan;
use crate::config::Config;
use crate::engine::WalletEngine;
use crate::error::{FlowError, SyncFault};
use crate::flow::{Phase, SendFlow};
use crate::metrics::Metrics;
use crate::notice::{Notice, Notices};
use crate::validate::PaymentRequest;

pub struct WalletSession<E> {
    engine: Arc<E>,
    notices: Notices,
    metrics: Metrics,
    flow: SendFlow<E>,
    monitor: BalanceMonitor<E>,
    refresh_after_broadcast: bool,
}

impl<E: WalletEngine> WalletSession<E> {
    pub fn new(engine: Arc<E>, cfg: &Config, metrics: Metrics) -> Self {
        let notices = Notices::default();
        let flow = SendFlow::new(
            engine.clone(),
            notices.clone(),
            cfg.send.fee_rate_bounds(),
            metrics.clone(),
        );
        let monitor =
            BalanceMonitor::new(engine.clone(), cfg.refresh.min_visible(), metrics.clone());
        Self {
            engine,
            notices,
            metrics,
            flow,
            monitor,
            refresh_after_broadcast: cfg.refresh.after_broadcast,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.flow.phase()
    }

    pub async fn verify(
        &self,
        request: &PaymentRequest,
    ) -> Result<UnsignedTransactionPlan, FlowError> {
        self.flow.verify(request).await
    }

    pub fn cancel(&self) -> Result<UnsignedTransactionPlan, FlowError> {
        self.flow.cancel()
    }

    /// Confirm the pending plan. A successful broadcast schedules a background
    /// refresh when configured to; its fault, if any, is only logged.
    pub async fn confirm(&self) -> Result<BroadcastOutcome, FlowError> {
        let outcome = self.flow.confirm().await?;
        if outcome.is_success() && self.refresh_after_broadcast {
            let monitor = self.monitor.clone();
            tokio::spawn(async move {
                if let Err(e) = monitor.refresh().await {
                    warn!(error = %e, "post-broadcast refresh failed");
                }
            });
        }
        Ok(outcome)
    }

    pub fn acknowledge(&self) -> Option<BroadcastOutcome> {
        self.flow.acknowledge()
    }

    pub fn abandon(&self) {
        self.flow.abandon()
    }

    pub async fn refresh(&self) -> Result<BalanceSnapshot, SyncFault> {
        self.monitor.refresh().await
    }

    pub fn balance(&self) -> BalanceSnapshot {
        self.monitor.balance()
    }

    pub fn is_refreshing(&self) -> bool {
        self.monitor.is_refreshing()
    }

    pub fn subscribe_balance(&self) -> watch::Receiver<BalanceSnapshot> {
        self.monitor.subscribe_balance()
    }

    pub fn subscribe_refreshing(&self) -> watch::Receiver<bool> {
        self.monitor.subscribe_refreshing()
    }
}
