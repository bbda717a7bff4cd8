// Library interface for the padawan send lifecycle.
// The `padawan` binary and the integration tests drive it through `WalletSession`.

pub mod amount;
pub mod balance;
pub mod broadcast;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod notice;
pub mod session;
pub mod validate;

pub use balance::{BalanceMonitor, BalanceSnapshot};
pub use broadcast::{confirm_and_broadcast, BroadcastOutcome};
pub use builder::UnsignedTransactionPlan;
pub use engine::{MemoryEngine, WalletEngine};
pub use error::{EngineError, FlowError, SyncFault, ValidationError};
pub use flow::{Phase, SendFlow};
pub use session::WalletSession;
pub use validate::{validate, PaymentRequest, ValidatedPaymentRequest};
