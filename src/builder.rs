//! Turns a validated request into an unsigned transaction plan.

use tracing::{debug, warn};

use crate::engine::{UnsignedTransaction, WalletEngine};
use crate::error::EngineError;
use crate::validate::ValidatedPaymentRequest;

/// An unsigned transaction plus what the confirmation surface displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransactionPlan {
    pub unsigned_transaction: UnsignedTransaction,
    pub sent_amount_sats: u64,
    pub recipient_address: String,
    pub fee_rate_sat_per_vbyte: u64,
    pub fee_sats: Option<u64>,
}

/// Ask the engine to build a payment. Engine errors pass through unclassified.
pub async fn build<E: WalletEngine>(
    engine: &E,
    request: &ValidatedPaymentRequest,
) -> Result<UnsignedTransactionPlan, EngineError> {
    let address = request.recipient_address();
    let fee_rate = request.fee_rate_sat_per_vbyte();

    let built = engine
        .build_transaction(address, request.amount_sats(), fee_rate)
        .await
        .inspect_err(|e| warn!(error = %e, "engine rejected transaction build"))?;

    debug!(
        requested_sats = request.amount_sats(),
        sent_sats = built.sent_amount_sats,
        fee_rate,
        "built unsigned transaction"
    );

    Ok(UnsignedTransactionPlan {
        unsigned_transaction: built.unsigned,
        sent_amount_sats: built.sent_amount_sats,
        recipient_address: address.to_string(),
        fee_rate_sat_per_vbyte: fee_rate,
        fee_sats: built.fee_sats,
    })
}
