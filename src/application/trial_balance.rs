use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{AccountSubtype, AccountType, Cents, OrgId, is_unusual_balance};
use crate::storage::Repository;

use super::LedgerError;

/// One account line in a trial balance. The balance sits in exactly one
/// of the two columns; `unusual` marks a balance on the opposite of the
/// account type's normal side.
#[derive(Debug, Clone, Serialize)]
pub struct TrialBalanceRow {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub subtype: AccountSubtype,
    pub debit: Cents,
    pub credit: Cents,
    pub unusual: bool,
}

/// As-of-date snapshot of every account's balance, verified to have
/// equal debit and credit totals.
#[derive(Debug, Clone, Serialize)]
pub struct TrialBalance {
    pub organization_id: OrgId,
    pub as_of: DateTime<Utc>,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debits: Cents,
    pub total_credits: Cents,
    /// Accounts carrying a balance on the wrong side, e.g. a revenue
    /// account with a debit balance. Surfaced, never auto-corrected.
    pub warnings: Vec<String>,
}

/// Generates trial balances from the ledger. Read-only.
#[derive(Clone)]
pub struct TrialBalanceEngine {
    repo: Repository,
}

impl TrialBalanceEngine {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Aggregate every active account's activity up to `as_of` and
    /// classify each balance by the account type's normal side. Fails
    /// with `TrialBalanceOutOfBalance` if total debits and credits
    /// diverge, which can only happen if a commit bypassed the engine.
    pub async fn generate(
        &self,
        org: OrgId,
        as_of: DateTime<Utc>,
    ) -> Result<TrialBalance, LedgerError> {
        let accounts = self.repo.list_accounts(org, true).await?;
        // One grouped query instead of a per-account aggregation loop.
        let activity = self.repo.account_activity_as_of(org, as_of).await?;

        let mut rows = Vec::new();
        let mut warnings = Vec::new();
        let mut total_debits: Cents = 0;
        let mut total_credits: Cents = 0;

        for account in &accounts {
            let Some(activity) = activity.get(&account.path.to_string()) else {
                continue;
            };
            let raw = activity.raw_balance();
            if raw == 0 {
                continue;
            }

            // The balance lands in the column it actually sits on; a
            // balance on the wrong side is flagged, not normalized.
            let (debit, credit) = if raw > 0 { (raw, 0) } else { (0, -raw) };
            let unusual = is_unusual_balance(account.account_type, activity);
            if unusual {
                warnings.push(format!(
                    "{} {} ({}) carries an unusual {} balance",
                    account.code,
                    account.name,
                    account.account_type,
                    if raw > 0 { "debit" } else { "credit" },
                ));
            }

            total_debits += debit;
            total_credits += credit;
            rows.push(TrialBalanceRow {
                code: account.code.clone(),
                name: account.name.clone(),
                account_type: account.account_type,
                subtype: account.subtype,
                debit,
                credit,
                unusual,
            });
        }

        if total_debits != total_credits {
            return Err(LedgerError::TrialBalanceOutOfBalance {
                debits: total_debits,
                credits: total_credits,
            });
        }

        if warnings.is_empty() {
            debug!(%org, rows = rows.len(), "generated trial balance");
        } else {
            warn!(
                %org,
                rows = rows.len(),
                warnings = warnings.len(),
                "generated trial balance with unusual balances"
            );
        }

        Ok(TrialBalance {
            organization_id: org,
            as_of,
            rows,
            total_debits,
            total_credits,
            warnings,
        })
    }
}
