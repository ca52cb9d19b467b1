use super::{AccountPath, AccountType, Cents, NormalSide, Side, TransactionLeg};

/// Total debits and credits posted against one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountActivity {
    pub debits: Cents,
    pub credits: Cents,
}

impl AccountActivity {
    pub fn add(&mut self, side: Side, amount: Cents) {
        match side {
            Side::Debit => self.debits += amount,
            Side::Credit => self.credits += amount,
        }
    }

    /// Raw balance, debit-positive.
    pub fn raw_balance(&self) -> Cents {
        self.debits - self.credits
    }

    /// Balance normalized to the account type's normal side: positive for
    /// a healthy account, negative when the balance sits on the wrong side.
    pub fn net_balance(&self, account_type: AccountType) -> Cents {
        match account_type.normal_side() {
            NormalSide::Debit => self.debits - self.credits,
            NormalSide::Credit => self.credits - self.debits,
        }
    }
}

/// Raw (debit-positive) balance of an account from a list of legs.
/// A leg counts if it posts to the path itself or to any descendant, so
/// a subledger parent rolls up all of its per-entity children.
pub fn compute_balance(path: &AccountPath, legs: &[TransactionLeg]) -> Cents {
    legs.iter()
        .filter(|leg| leg.account_path == *path || leg.account_path.is_descendant_of(path))
        .map(TransactionLeg::signed_amount)
        .sum()
}

/// True when an account's balance sits on the opposite of its normal
/// side, e.g. a revenue account carrying a debit balance. Reports flag
/// these instead of silently normalizing them.
pub fn is_unusual_balance(account_type: AccountType, activity: &AccountActivity) -> bool {
    activity.net_balance(account_type) < 0
}
