//! Inbound (Driving) ports for the runtime.
//!
//! The host kernel drives the runtime through its transaction event
//! callbacks. A thin shim on the host side translates the kernel's native
//! event into these calls.

use crate::domain::RuntimeError;
use crate::ports::outbound::TransactionData;

/// Commit hook invoked synchronously by the host for every transaction.
pub trait TransactionEventHandler: Send + Sync {
    /// Called before the transaction's durability point. An error must make
    /// the host roll the transaction back.
    fn before_commit(&self, data: &dyn TransactionData) -> Result<(), RuntimeError>;

    /// Called after a successful commit.
    fn after_commit(&self, data: &dyn TransactionData);

    /// Called after the transaction was rolled back.
    fn after_rollback(&self, data: &dyn TransactionData);
}
