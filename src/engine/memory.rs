//! In-process wallet engine.
//!
//! Keeps a single confirmed balance and a queue of unconfirmed debits and
//! credits that `synchronize` folds in. Used by the `padawan` binary and as the
//! test double in integration tests, so it also counts calls and can be told
//! to fail specific operations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{BuiltTransaction, SignedTransaction, UnsignedTransaction, WalletEngine};
use crate::error::EngineError;

/// Size assumed for a one-input, two-output segwit payment.
pub const PAYMENT_VBYTES: u64 = 141;
pub const DUST_LIMIT_SATS: u64 = 546;
const MIN_ADDRESS_LEN: usize = 14;
const MAX_ADDRESS_LEN: usize = 90;
const SIGNATURE_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Build,
    Sign,
    Broadcast,
    Synchronize,
    Balance,
}

/// Per-operation call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub build: usize,
    pub sign: usize,
    pub broadcast: usize,
    pub synchronize: usize,
    pub balance: usize,
}

#[derive(Serialize, Deserialize)]
struct Draft {
    recipient: String,
    amount_sats: u64,
    fee_sats: u64,
    nonce: u64,
}

#[derive(Default)]
struct Ledger {
    confirmed_sats: u64,
    pending_debits: Vec<(String, u64)>,
    pending_credits: Vec<u64>,
    relayed: Vec<String>,
    next_nonce: u64,
}

impl Ledger {
    fn spendable(&self) -> u64 {
        let debits: u64 = self.pending_debits.iter().map(|(_, d)| d).sum();
        self.confirmed_sats.saturating_sub(debits)
    }
}

#[derive(Default)]
struct Faults {
    build: Option<EngineError>,
    sign: Option<EngineError>,
    broadcast: Option<EngineError>,
    synchronize: Option<EngineError>,
}

pub struct MemoryEngine {
    ledger: Mutex<Ledger>,
    faults: Mutex<Faults>,
    log: Mutex<Vec<Op>>,
    build_delay: Mutex<Duration>,
    sign_delay: Mutex<Duration>,
    sync_delay: Mutex<Duration>,
    signing_key: [u8; 32],
    build_calls: AtomicUsize,
    sign_calls: AtomicUsize,
    broadcast_calls: AtomicUsize,
    sync_calls: AtomicUsize,
    balance_calls: AtomicUsize,
}

impl MemoryEngine {
    pub fn new(starting_balance_sats: u64) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                confirmed_sats: starting_balance_sats,
                ..Ledger::default()
            }),
            faults: Mutex::new(Faults::default()),
            log: Mutex::new(Vec::new()),
            build_delay: Mutex::new(Duration::ZERO),
            sign_delay: Mutex::new(Duration::ZERO),
            sync_delay: Mutex::new(Duration::ZERO),
            signing_key: *blake3::hash(b"padawan memory engine signing key").as_bytes(),
            build_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            broadcast_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent call of `op` fail with `err` until cleared.
    pub fn fail(&self, op: Op, err: EngineError) {
        let mut f = lock(&self.faults);
        match op {
            Op::Build => f.build = Some(err),
            Op::Sign => f.sign = Some(err),
            Op::Broadcast => f.broadcast = Some(err),
            Op::Synchronize => f.synchronize = Some(err),
            Op::Balance => {}
        }
    }

    pub fn clear_failures(&self) {
        *lock(&self.faults) = Faults::default();
    }

    pub fn set_build_delay(&self, delay: Duration) {
        *lock(&self.build_delay) = delay;
    }

    pub fn set_sign_delay(&self, delay: Duration) {
        *lock(&self.sign_delay) = delay;
    }

    pub fn set_sync_delay(&self, delay: Duration) {
        *lock(&self.sync_delay) = delay;
    }

    /// Queue an incoming payment; it counts once the next synchronize runs.
    pub fn receive(&self, sats: u64) {
        lock(&self.ledger).pending_credits.push(sats);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            build: self.build_calls.load(Ordering::SeqCst),
            sign: self.sign_calls.load(Ordering::SeqCst),
            broadcast: self.broadcast_calls.load(Ordering::SeqCst),
            synchronize: self.sync_calls.load(Ordering::SeqCst),
            balance: self.balance_calls.load(Ordering::SeqCst),
        }
    }

    /// Operations in the order they were invoked.
    pub fn call_log(&self) -> Vec<Op> {
        lock(&self.log).clone()
    }

    /// Txids accepted by `broadcast`.
    pub fn relayed(&self) -> Vec<String> {
        lock(&self.ledger).relayed.clone()
    }

    fn record(&self, op: Op) {
        let counter = match op {
            Op::Build => &self.build_calls,
            Op::Sign => &self.sign_calls,
            Op::Broadcast => &self.broadcast_calls,
            Op::Synchronize => &self.sync_calls,
            Op::Balance => &self.balance_calls,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        lock(&self.log).push(op);
    }

    fn injected(&self, op: Op) -> Option<EngineError> {
        let f = lock(&self.faults);
        match op {
            Op::Build => f.build.clone(),
            Op::Sign => f.sign.clone(),
            Op::Broadcast => f.broadcast.clone(),
            Op::Synchronize => f.synchronize.clone(),
            Op::Balance => None,
        }
    }

    fn draft(
        &self,
        address: &str,
        amount_sats: u64,
        fee_rate: u64,
    ) -> Result<BuiltTransaction, EngineError> {
        if !is_well_formed(address) {
            return Err(EngineError::InvalidAddress(format!("Invalid address: {address}")));
        }
        if amount_sats < DUST_LIMIT_SATS {
            return Err(EngineError::Dust(format!(
                "Output below dust limit: {amount_sats} < {DUST_LIMIT_SATS} sats"
            )));
        }
        let fee_sats = fee_rate
            .checked_mul(PAYMENT_VBYTES)
            .ok_or_else(|| EngineError::Internal("fee overflow".into()))?;

        let mut ledger = lock(&self.ledger);
        let needed = amount_sats.saturating_add(fee_sats);
        let available = ledger.spendable();
        if needed > available {
            return Err(EngineError::InsufficientFunds(format!(
                "Insufficient funds: {available} sats available, {needed} sats needed"
            )));
        }
        let nonce = ledger.next_nonce;
        ledger.next_nonce += 1;
        drop(ledger);

        let draft = Draft { recipient: address.to_string(), amount_sats, fee_sats, nonce };
        let bytes = bincode::serialize(&draft).map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(BuiltTransaction {
            unsigned: UnsignedTransaction(bytes),
            sent_amount_sats: amount_sats,
            fee_sats: Some(fee_sats),
        })
    }

    fn decode(bytes: &[u8]) -> Option<Draft> {
        bincode::deserialize(bytes).ok()
    }
}

impl WalletEngine for MemoryEngine {
    async fn build_transaction(
        &self,
        address: &str,
        amount_sats: u64,
        fee_rate_sat_per_vbyte: u64,
    ) -> Result<BuiltTransaction, EngineError> {
        self.record(Op::Build);
        let delay = *lock(&self.build_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.injected(Op::Build) {
            return Err(err);
        }
        self.draft(address, amount_sats, fee_rate_sat_per_vbyte)
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, EngineError> {
        self.record(Op::Sign);
        let delay = *lock(&self.sign_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.injected(Op::Sign) {
            return Err(err);
        }
        if Self::decode(&tx.0).is_none() {
            return Err(EngineError::Signing("cannot sign malformed transaction".into()));
        }
        let sig = blake3::keyed_hash(&self.signing_key, &tx.0);
        let mut bytes = tx.0.clone();
        bytes.extend_from_slice(sig.as_bytes());
        let txid = hex::encode(blake3::hash(&bytes).as_bytes());
        Ok(SignedTransaction { bytes, txid })
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<(), EngineError> {
        self.record(Op::Broadcast);
        if let Some(err) = self.injected(Op::Broadcast) {
            return Err(err);
        }
        if tx.bytes.len() < SIGNATURE_LEN {
            return Err(EngineError::Relay("transaction is not signed".into()));
        }
        let (body, sig) = tx.bytes.split_at(tx.bytes.len() - SIGNATURE_LEN);
        if blake3::keyed_hash(&self.signing_key, body).as_bytes()[..] != sig[..] {
            return Err(EngineError::Relay("bad signature".into()));
        }
        let draft = Self::decode(body)
            .ok_or_else(|| EngineError::Relay("undecodable transaction".into()))?;

        let mut ledger = lock(&self.ledger);
        if ledger.relayed.contains(&tx.txid) {
            return Err(EngineError::Relay("transaction already in mempool".into()));
        }
        ledger.relayed.push(tx.txid.clone());
        ledger.pending_debits.push((tx.txid.clone(), draft.amount_sats + draft.fee_sats));
        Ok(())
    }

    async fn synchronize(&self) -> Result<(), EngineError> {
        self.record(Op::Synchronize);
        let delay = *lock(&self.sync_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.injected(Op::Synchronize) {
            return Err(err);
        }
        let mut ledger = lock(&self.ledger);
        let credits: u64 = ledger.pending_credits.drain(..).sum();
        let debits: u64 = ledger.pending_debits.drain(..).map(|(_, d)| d).sum();
        ledger.confirmed_sats = ledger
            .confirmed_sats
            .saturating_add(credits)
            .saturating_sub(debits);
        Ok(())
    }

    async fn balance(&self) -> Result<u64, EngineError> {
        self.record(Op::Balance);
        Ok(lock(&self.ledger).confirmed_sats)
    }
}

fn is_well_formed(address: &str) -> bool {
    (MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&address.len())
        && address.bytes().all(|b| b.is_ascii_alphanumeric())
}

// Poisoning only happens if a holder panicked; the ledger is still usable.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

    #[tokio::test]
    async fn build_checks_address_dust_and_funds() {
        let engine = MemoryEngine::new(10_000);
        assert!(matches!(
            engine.build_transaction("bad addr!", 1_000, 1).await,
            Err(EngineError::InvalidAddress(_))
        ));
        assert!(matches!(
            engine.build_transaction(ADDR, 100, 1).await,
            Err(EngineError::Dust(_))
        ));
        assert!(matches!(
            engine.build_transaction(ADDR, 9_900, 10).await,
            Err(EngineError::InsufficientFunds(_))
        ));
        let built = engine.build_transaction(ADDR, 5_000, 2).await.unwrap();
        assert_eq!(built.sent_amount_sats, 5_000);
        assert_eq!(built.fee_sats, Some(2 * PAYMENT_VBYTES));
        assert_eq!(engine.calls().build, 4);
    }

    #[tokio::test]
    async fn broadcast_settles_on_sync() {
        let engine = MemoryEngine::new(10_000);
        let built = engine.build_transaction(ADDR, 1_000, 1).await.unwrap();
        let signed = engine.sign(&built.unsigned).await.unwrap();
        engine.broadcast(&signed).await.unwrap();
        assert!(matches!(engine.broadcast(&signed).await, Err(EngineError::Relay(_))));

        assert_eq!(engine.balance().await.unwrap(), 10_000);
        engine.receive(500);
        engine.synchronize().await.unwrap();
        assert_eq!(engine.balance().await.unwrap(), 10_000 + 500 - 1_000 - PAYMENT_VBYTES);
        assert_eq!(engine.relayed(), vec![signed.txid]);
    }

    #[tokio::test]
    async fn unsigned_bytes_are_rejected_by_relay() {
        let engine = MemoryEngine::new(10_000);
        let built = engine.build_transaction(ADDR, 1_000, 1).await.unwrap();
        let forged = SignedTransaction { bytes: built.unsigned.0.clone(), txid: "00".into() };
        assert!(matches!(engine.broadcast(&forged).await, Err(EngineError::Relay(_))));
    }
}
