//! Balance refresh loop.
//!
//! A refresh publishes `is_refreshing = true`, synchronizes the engine, reads
//! and publishes the confirmed balance, holds the busy flag for a minimum
//! visible duration and then clears it. Refreshes are single-flight: a call
//! made while one is running joins it and receives the same result. The
//! refresh runs on its own task, so it completes even if every caller drops
//! its future.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::WalletEngine;
use crate::error::{EngineError, SyncFault};
use crate::metrics::Metrics;

pub const DEFAULT_MIN_VISIBLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub confirmed_sats: u64,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<BalanceSnapshot, SyncFault>>>;

struct MonitorInner<E> {
    engine: Arc<E>,
    balance: watch::Sender<BalanceSnapshot>,
    refreshing: watch::Sender<bool>,
    min_visible: Duration,
    in_flight: Mutex<Option<RefreshFuture>>,
    metrics: Metrics,
}

/// Owns the published balance. Clones share the same state.
pub struct BalanceMonitor<E> {
    inner: Arc<MonitorInner<E>>,
}

impl<E> Clone for BalanceMonitor<E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<E: WalletEngine> BalanceMonitor<E> {
    pub fn new(engine: Arc<E>, min_visible: Duration, metrics: Metrics) -> Self {
        let (balance, _) = watch::channel(BalanceSnapshot::default());
        let (refreshing, _) = watch::channel(false);
        Self {
            inner: Arc::new(MonitorInner {
                engine,
                balance,
                refreshing,
                min_visible,
                in_flight: Mutex::new(None),
                metrics,
            }),
        }
    }

    pub fn balance(&self) -> BalanceSnapshot {
        *self.inner.balance.borrow()
    }

    pub fn is_refreshing(&self) -> bool {
        *self.inner.refreshing.borrow()
    }

    pub fn subscribe_balance(&self) -> watch::Receiver<BalanceSnapshot> {
        self.inner.balance.subscribe()
    }

    pub fn subscribe_refreshing(&self) -> watch::Receiver<bool> {
        self.inner.refreshing.subscribe()
    }

    /// Synchronize and republish the balance, or join the refresh already running.
    ///
    /// No timeout: a hung engine keeps `is_refreshing` set until it returns.
    pub async fn refresh(&self) -> Result<BalanceSnapshot, SyncFault> {
        let pending = {
            let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(running) => {
                    debug!("joining in-flight balance refresh");
                    running.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let task = tokio::spawn(run(inner.clone()));
                    let fut = async move {
                        task.await.unwrap_or_else(|e| {
                            finish(&inner);
                            Err(SyncFault(EngineError::Internal(format!(
                                "refresh task failed: {e}"
                            ))))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        pending.await
    }
}

async fn run<E: WalletEngine>(
    inner: Arc<MonitorInner<E>>,
) -> Result<BalanceSnapshot, SyncFault> {
    inner.refreshing.send_replace(true);
    inner.metrics.refreshing.set(1);
    inner.metrics.refreshes.inc();

    let result = sync_and_read(inner.engine.as_ref()).await;
    match &result {
        Ok(snapshot) => {
            inner.balance.send_replace(*snapshot);
            inner.metrics.set_balance(snapshot.confirmed_sats);
            info!(confirmed_sats = snapshot.confirmed_sats, "balance refreshed");
            tokio::time::sleep(inner.min_visible).await;
        }
        Err(fault) => {
            inner.metrics.sync_faults.inc();
            warn!(error = %fault, "balance refresh failed");
        }
    }

    finish(&inner);
    result
}

// Clear the slot before dropping the flag so a caller that sees `false` starts a fresh sync.
fn finish<E>(inner: &MonitorInner<E>) {
    *inner.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
    inner.refreshing.send_replace(false);
    inner.metrics.refreshing.set(0);
}

async fn sync_and_read<E: WalletEngine>(engine: &E) -> Result<BalanceSnapshot, SyncFault> {
    engine.synchronize().await.map_err(SyncFault)?;
    let confirmed_sats = engine.balance().await.map_err(SyncFault)?;
    Ok(BalanceSnapshot { confirmed_sats })
}
