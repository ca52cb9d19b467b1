use thiserror::Error;

use crate::domain::{AccountPathError, Cents, EntryValidationError, SubledgerKind};

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Validation errors: rejected before any write.
    #[error("entry does not balance: debits {debits} != credits {credits}")]
    UnbalancedEntry { debits: Cents, credits: Cents },

    #[error("invalid leg: {0}")]
    InvalidLeg(String),

    #[error("invalid account path: {0}")]
    InvalidPath(#[from] AccountPathError),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account is inactive: {0}")]
    AccountInactive(String),

    #[error("{kind} subledger parent account is missing; was the chart bootstrapped?", kind = .0.as_str())]
    SubledgerParentMissing(SubledgerKind),

    #[error("journal not found: {0}")]
    JournalNotFound(String),

    /// Consistency errors: detected at report time, never auto-corrected.
    #[error("trial balance out of balance: debits {debits} != credits {credits}")]
    TrialBalanceOutOfBalance { debits: Cents, credits: Cents },

    /// Infrastructure errors: retryable by the caller via idempotency key.
    #[error("voucher sequence unavailable: {0}")]
    SequenceUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<EntryValidationError> for LedgerError {
    fn from(err: EntryValidationError) -> Self {
        match err {
            EntryValidationError::Unbalanced { debits, credits } => {
                LedgerError::UnbalancedEntry { debits, credits }
            }
            other => LedgerError::InvalidLeg(other.to_string()),
        }
    }
}

impl LedgerError {
    /// True for failures a caller may safely retry with the same commit id.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::SequenceUnavailable(_) | LedgerError::Storage(_)
        )
    }
}
