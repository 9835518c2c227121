//! Wallet ledger: the monetary source of truth for each owner.
//!
//! A wallet is an event-sourced aggregate whose events are its ledger
//! entries. Every mutation carries an idempotency key; a key that was
//! already recorded returns the original entry and moves no money.

mod aggregate;
mod commands;
mod entry;
mod events;
mod service;

pub use aggregate::{REVERSAL_SUFFIX, Wallet};
pub use commands::{Posting, SettleWithdrawal, Withdraw};
pub use entry::{EntryDirection, EntryState, LedgerEntry, PayoutDetails, WithdrawalOutcome};
pub use events::{
    PostingData, WalletEvent, WalletOpenedData, WithdrawalFailedData, WithdrawalRequestedData,
    WithdrawalSettledData,
};
pub use service::{LedgerReceipt, WalletService};

use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: i64 },

    #[error("Crediting {amount} would overflow balance {balance}")]
    BalanceOverflow { balance: i64, amount: i64 },

    #[error("Idempotency key is required")]
    MissingIdempotencyKey,

    #[error("Payout account is required")]
    MissingPayoutAccount,

    #[error("Insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("No ledger entry with key {key}")]
    EntryNotFound { key: String },

    #[error("Entry {key} is not a withdrawal")]
    NotAWithdrawal { key: String },

    #[error("Withdrawal {key} already settled as {state}")]
    WithdrawalAlreadySettled { key: String, state: EntryState },

    #[error("{actor} may not {action}")]
    Forbidden { actor: String, action: &'static str },
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidAmount { .. }
            | WalletError::BalanceOverflow { .. }
            | WalletError::MissingIdempotencyKey
            | WalletError::MissingPayoutAccount
            | WalletError::NotAWithdrawal { .. } => ErrorKind::Validation,
            WalletError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            WalletError::EntryNotFound { .. } => ErrorKind::NotFound,
            WalletError::WithdrawalAlreadySettled { .. } => ErrorKind::InvalidTransition,
            WalletError::Forbidden { .. } => ErrorKind::Forbidden,
        }
    }
}
