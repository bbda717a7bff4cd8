//! Error types for the send lifecycle.
//!
//! The core only distinguishes input problems ([`ValidationError`]) from
//! everything the wallet engine reports ([`EngineError`]). Engine messages are
//! carried as opaque diagnostics and are never inspected for control flow.

use thiserror::Error;

/// Rejected user input. `Display` is the notice text shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Amount is missing!")]
    MissingAmount,

    #[error("Address is missing!")]
    MissingAddress,

    #[error("Fee Rate is missing!")]
    MissingFeeRate,

    #[error("Fee rate must be a whole number")]
    InvalidFeeRate,

    #[error("Please input a fee rate between {min} and {max}")]
    FeeRateOutOfRange { min: u64, max: u64 },

    #[error("Amount must be a whole number of sats")]
    InvalidAmount,
}

/// Failure reported by the wallet engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0}")]
    InvalidAddress(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("{0}")]
    Dust(String),

    #[error("{0}")]
    Signing(String),

    #[error("{0}")]
    Relay(String),

    #[error("{0}")]
    Sync(String),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// The engine's diagnostic text, verbatim.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidAddress(m)
            | Self::InsufficientFunds(m)
            | Self::Dust(m)
            | Self::Signing(m)
            | Self::Relay(m)
            | Self::Sync(m)
            | Self::Internal(m) => m,
        }
    }
}

/// Synchronization with the chain failed. Never retried by the refresh loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("balance refresh failed: {0}")]
pub struct SyncFault(#[source] pub EngineError);

/// Errors from driving the confirmation state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("a transaction is already awaiting confirmation")]
    PlanPending,

    #[error("no transaction is awaiting confirmation")]
    NoPlan,

    #[error("build result discarded; a newer request replaced it")]
    Superseded,
}
