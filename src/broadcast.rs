//! Sign-then-relay pipeline for a confirmed plan.

use tracing::{info, warn};

use crate::builder::UnsignedTransactionPlan;
use crate::engine::WalletEngine;
use crate::notice::{Notice, Notices, BROADCAST_SUCCESS};

/// Terminal result of a confirmed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Success,
    Failure(String),
}

impl BroadcastOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Text of the notice posted for this outcome.
    pub fn notice(&self) -> Notice {
        match self {
            Self::Success => Notice::info(BROADCAST_SUCCESS),
            Self::Failure(msg) => Notice::error(format!("Error: {msg}")),
        }
    }
}

/// Sign the plan, then relay it. Broadcast is never attempted if signing fails.
///
/// A relay failure does not prove the transaction never reached the network.
/// A notice with the outcome is always posted.
pub async fn confirm_and_broadcast<E: WalletEngine>(
    engine: &E,
    plan: &UnsignedTransactionPlan,
    notices: &Notices,
) -> BroadcastOutcome {
    let outcome = match engine.sign(&plan.unsigned_transaction).await {
        Err(e) => {
            warn!(error = %e, "signing failed; nothing was relayed");
            BroadcastOutcome::Failure(e.message().to_string())
        }
        Ok(signed) => match engine.broadcast(&signed).await {
            Ok(()) => {
                info!(txid = %signed.txid, sats = plan.sent_amount_sats, "transaction broadcast");
                BroadcastOutcome::Success
            }
            Err(e) => {
                warn!(txid = %signed.txid, error = %e, "broadcast failed");
                BroadcastOutcome::Failure(e.message().to_string())
            }
        },
    };
    notices.post(outcome.notice());
    outcome
}
