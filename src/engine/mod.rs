//! Boundary to the wallet engine that owns keys, UTXOs and chain access.
//!
//! Every call is a suspension point of arbitrary length. None of them are
//! cancelled once started; see [`crate::flow`] for how stale results are
//! dropped instead.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub mod memory;

pub use memory::MemoryEngine;

/// Engine-produced transaction that has not been signed yet. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction(pub Vec<u8>);

/// Transaction ready for relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub bytes: Vec<u8>,
    pub txid: String,
}

/// What the engine hands back from a build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    pub unsigned: UnsignedTransaction,
    /// May differ from the requested amount under send-max semantics.
    pub sent_amount_sats: u64,
    pub fee_sats: Option<u64>,
}

pub trait WalletEngine: Send + Sync + 'static {
    fn build_transaction(
        &self,
        address: &str,
        amount_sats: u64,
        fee_rate_sat_per_vbyte: u64,
    ) -> impl Future<Output = Result<BuiltTransaction, EngineError>> + Send;

    fn sign(
        &self,
        tx: &UnsignedTransaction,
    ) -> impl Future<Output = Result<SignedTransaction, EngineError>> + Send;

    fn broadcast(
        &self,
        tx: &SignedTransaction,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Bring the engine's view of the chain up to date. Unbounded duration.
    fn synchronize(&self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Confirmed balance in sats as of the last synchronize.
    fn balance(&self) -> impl Future<Output = Result<u64, EngineError>> + Send;
}
