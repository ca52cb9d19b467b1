use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AccountPath, Cents, EntityRef, EventMeta, OrgId, Side, SubledgerKind};

/// The account a pending leg posts to. Subledger references are resolved
/// to concrete paths (creating the account if needed) at commit time.
#[derive(Debug, Clone)]
pub enum LegAccount {
    Path(AccountPath),
    Subledger { kind: SubledgerKind, entity: EntityRef },
}

/// A debit or credit leg of an entry under construction.
#[derive(Debug, Clone)]
pub struct PendingLeg {
    pub account: LegAccount,
    pub side: Side,
    pub amount: Cents,
}

/// A named transaction request under construction: memo, organization,
/// and a list of pending legs. Built with `debit`/`credit` and handed to
/// `AccountingService::commit`, which turns it into one journal plus one
/// transaction row per leg.
#[derive(Debug, Clone)]
pub struct Entry {
    pub organization_id: OrgId,
    pub memo: String,
    pub datetime: DateTime<Utc>,
    /// Idempotency key. Defaults to a random v4; callers retrying after a
    /// timeout should derive a deterministic id from the source document.
    pub commit_id: Uuid,
    pub meta: EventMeta,
    pub legs: Vec<PendingLeg>,
}

impl Entry {
    pub fn new(organization_id: OrgId, memo: impl Into<String>, meta: EventMeta) -> Self {
        Self {
            organization_id,
            memo: memo.into(),
            datetime: Utc::now(),
            commit_id: Uuid::new_v4(),
            meta,
            legs: Vec::new(),
        }
    }

    pub fn on(mut self, datetime: DateTime<Utc>) -> Self {
        self.datetime = datetime;
        self
    }

    pub fn with_commit_id(mut self, commit_id: Uuid) -> Self {
        self.commit_id = commit_id;
        self
    }

    pub fn debit(self, path: AccountPath, amount: Cents) -> Self {
        self.leg(LegAccount::Path(path), Side::Debit, amount)
    }

    pub fn credit(self, path: AccountPath, amount: Cents) -> Self {
        self.leg(LegAccount::Path(path), Side::Credit, amount)
    }

    pub fn debit_subledger(self, kind: SubledgerKind, entity: EntityRef, amount: Cents) -> Self {
        self.leg(LegAccount::Subledger { kind, entity }, Side::Debit, amount)
    }

    pub fn credit_subledger(self, kind: SubledgerKind, entity: EntityRef, amount: Cents) -> Self {
        self.leg(LegAccount::Subledger { kind, entity }, Side::Credit, amount)
    }

    fn leg(mut self, account: LegAccount, side: Side, amount: Cents) -> Self {
        self.legs.push(PendingLeg {
            account,
            side,
            amount,
        });
        self
    }

    pub fn total(&self, side: Side) -> Cents {
        self.legs
            .iter()
            .filter(|l| l.side == side)
            .map(|l| l.amount)
            .sum()
    }

    /// Validate the fundamental invariant before any write: at least one
    /// leg per side, every amount strictly positive, and total debits
    /// exactly equal to total credits.
    pub fn validate(&self) -> Result<(), EntryValidationError> {
        for leg in &self.legs {
            if leg.amount <= 0 {
                return Err(EntryValidationError::InvalidLeg {
                    amount: leg.amount,
                });
            }
        }

        let has_debit = self.legs.iter().any(|l| l.side == Side::Debit);
        let has_credit = self.legs.iter().any(|l| l.side == Side::Credit);
        if !has_debit || !has_credit {
            return Err(EntryValidationError::MissingSide {
                has_debit,
                has_credit,
            });
        }

        let debits = self.total(Side::Debit);
        let credits = self.total(Side::Credit);
        if debits != credits {
            return Err(EntryValidationError::Unbalanced { debits, credits });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValidationError {
    Unbalanced { debits: Cents, credits: Cents },
    InvalidLeg { amount: Cents },
    MissingSide { has_debit: bool, has_credit: bool },
}

impl std::fmt::Display for EntryValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryValidationError::Unbalanced { debits, credits } => write!(
                f,
                "entry does not balance: debits {} != credits {}",
                debits, credits
            ),
            EntryValidationError::InvalidLeg { amount } => {
                write!(f, "leg amount must be positive, got {}", amount)
            }
            EntryValidationError::MissingSide {
                has_debit,
                has_credit,
            } => write!(
                f,
                "entry needs at least one debit and one credit leg (debit: {}, credit: {})",
                has_debit, has_credit
            ),
        }
    }
}

impl std::error::Error for EntryValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrgId {
        Uuid::new_v4()
    }

    fn path(s: &str) -> AccountPath {
        AccountPath::parse(s).unwrap()
    }

    #[test]
    fn test_balanced_entry_validates() {
        let entry = Entry::new(org(), "Invoice", EventMeta::ManualJournal)
            .debit(path("Assets:AR"), 110000)
            .credit(path("Revenue:Sales"), 100000)
            .credit(path("Liabilities:Tax Payable"), 10000);

        assert!(entry.validate().is_ok());
        assert_eq!(entry.total(Side::Debit), 110000);
        assert_eq!(entry.total(Side::Credit), 110000);
    }

    #[test]
    fn test_unbalanced_entry_rejected() {
        let entry = Entry::new(org(), "Oops", EventMeta::ManualJournal)
            .debit(path("Assets:Bank"), 50000)
            .credit(path("Revenue:Sales"), 40000);

        assert_eq!(
            entry.validate(),
            Err(EntryValidationError::Unbalanced {
                debits: 50000,
                credits: 40000
            })
        );
    }

    #[test]
    fn test_zero_amount_rejected() {
        let entry = Entry::new(org(), "Zero", EventMeta::ManualJournal)
            .debit(path("Assets:Bank"), 0)
            .credit(path("Revenue:Sales"), 0);

        assert!(matches!(
            entry.validate(),
            Err(EntryValidationError::InvalidLeg { amount: 0 })
        ));
    }

    #[test]
    fn test_single_sided_entry_rejected() {
        let entry =
            Entry::new(org(), "One side", EventMeta::ManualJournal).debit(path("Assets:Bank"), 100);

        assert!(matches!(
            entry.validate(),
            Err(EntryValidationError::MissingSide {
                has_debit: true,
                has_credit: false
            })
        ));
    }
}
