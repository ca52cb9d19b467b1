use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::{AccountType, Cents, OrgId};
use crate::storage::Repository;

use super::LedgerError;

/// One revenue or expense line in a profit and loss report.
#[derive(Debug, Clone, Serialize)]
pub struct ProfitLossLine {
    pub code: String,
    pub name: String,
    /// Net period activity, normalized to the account type's normal side.
    pub amount: Cents,
    /// Share of total revenue, in percent. 0 when revenue is zero.
    pub percent_of_revenue: f64,
}

/// Period-scoped income statement: revenue and expense activity within a
/// closed date interval, never an as-of snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ProfitLoss {
    pub organization_id: OrgId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub revenues: Vec<ProfitLossLine>,
    pub expenses: Vec<ProfitLossLine>,
    pub total_revenue: Cents,
    pub total_expenses: Cents,
    pub net_income: Cents,
    /// net_income / total_revenue in percent. 0 when revenue is zero.
    pub net_income_margin: f64,
}

/// Period-over-period deltas. Percentages are of the previous period's
/// value; 0 when the previous value is zero.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodComparison {
    pub revenue_delta: Cents,
    pub revenue_pct: f64,
    pub expenses_delta: Cents,
    pub expenses_pct: f64,
    pub net_income_delta: Cents,
    pub net_income_pct: f64,
}

/// Soft findings from a validation pass over a generated report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProfitLossFlag {
    NoRevenueAccounts,
    NoExpenseAccounts,
    /// A line with negative net activity: a classification bug upstream.
    NegativeAmount { account: String },
    /// Business-rule warning: one expense line above half of revenue.
    ExpenseExceedsHalfRevenue { account: String },
}

/// Generates profit and loss reports from the ledger. Read-only.
#[derive(Clone)]
pub struct ProfitLossEngine {
    repo: Repository,
}

impl ProfitLossEngine {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Aggregate revenue and expense activity over `[start, end]`.
    pub async fn generate(
        &self,
        org: OrgId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ProfitLoss, LedgerError> {
        let accounts = self.repo.list_accounts(org, true).await?;
        let activity = self.repo.account_activity_between(org, start, end).await?;

        let mut revenues = Vec::new();
        let mut expenses = Vec::new();
        let mut total_revenue: Cents = 0;
        let mut total_expenses: Cents = 0;

        for account in &accounts {
            if !matches!(
                account.account_type,
                AccountType::Revenue | AccountType::Expense
            ) {
                continue;
            }
            let Some(activity) = activity.get(&account.path.to_string()) else {
                continue;
            };
            let amount = activity.net_balance(account.account_type);
            if amount == 0 {
                continue;
            }

            let line = ProfitLossLine {
                code: account.code.clone(),
                name: account.name.clone(),
                amount,
                percent_of_revenue: 0.0, // filled in below, once revenue is known
            };
            match account.account_type {
                AccountType::Revenue => {
                    total_revenue += amount;
                    revenues.push(line);
                }
                AccountType::Expense => {
                    total_expenses += amount;
                    expenses.push(line);
                }
                _ => unreachable!(),
            }
        }

        for line in revenues.iter_mut().chain(expenses.iter_mut()) {
            line.percent_of_revenue = percentage(line.amount, total_revenue);
        }

        let net_income = total_revenue - total_expenses;
        debug!(%org, revenues = revenues.len(), expenses = expenses.len(), "generated profit and loss");

        Ok(ProfitLoss {
            organization_id: org,
            start,
            end,
            revenues,
            expenses,
            total_revenue,
            total_expenses,
            net_income,
            net_income_margin: percentage(net_income, total_revenue),
        })
    }

    /// Validation pass over a generated report. Findings are warnings for
    /// the caller, never errors: the report itself is still returned.
    pub fn validate(report: &ProfitLoss) -> Vec<ProfitLossFlag> {
        let mut flags = Vec::new();

        if report.revenues.is_empty() {
            flags.push(ProfitLossFlag::NoRevenueAccounts);
        }
        if report.expenses.is_empty() {
            flags.push(ProfitLossFlag::NoExpenseAccounts);
        }
        for line in report.revenues.iter().chain(report.expenses.iter()) {
            if line.amount < 0 {
                flags.push(ProfitLossFlag::NegativeAmount {
                    account: line.name.clone(),
                });
            }
        }
        for line in &report.expenses {
            if report.total_revenue > 0 && line.amount * 2 > report.total_revenue {
                flags.push(ProfitLossFlag::ExpenseExceedsHalfRevenue {
                    account: line.name.clone(),
                });
            }
        }

        flags
    }

    /// Compare two generated reports period over period.
    pub fn compare_periods(current: &ProfitLoss, previous: &ProfitLoss) -> PeriodComparison {
        PeriodComparison {
            revenue_delta: current.total_revenue - previous.total_revenue,
            revenue_pct: percentage(
                current.total_revenue - previous.total_revenue,
                previous.total_revenue,
            ),
            expenses_delta: current.total_expenses - previous.total_expenses,
            expenses_pct: percentage(
                current.total_expenses - previous.total_expenses,
                previous.total_expenses,
            ),
            net_income_delta: current.net_income - previous.net_income,
            net_income_pct: percentage(
                current.net_income - previous.net_income,
                previous.net_income,
            ),
        }
    }
}

/// `part / whole` in percent; 0 when the denominator is zero so reports
/// never divide by zero.
fn percentage(part: Cents, whole: Cents) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn report(revenue: Cents, expense_lines: &[(&str, Cents)]) -> ProfitLoss {
        let expenses: Vec<ProfitLossLine> = expense_lines
            .iter()
            .map(|(name, amount)| ProfitLossLine {
                code: "5000".into(),
                name: (*name).to_string(),
                amount: *amount,
                percent_of_revenue: percentage(*amount, revenue),
            })
            .collect();
        let total_expenses = expenses.iter().map(|l| l.amount).sum();
        let revenues = if revenue == 0 {
            vec![]
        } else {
            vec![ProfitLossLine {
                code: "4100".into(),
                name: "Sales Revenue".into(),
                amount: revenue,
                percent_of_revenue: 100.0,
            }]
        };
        ProfitLoss {
            organization_id: Uuid::new_v4(),
            start: Utc::now(),
            end: Utc::now(),
            revenues,
            expenses,
            total_revenue: revenue,
            total_expenses,
            net_income: revenue - total_expenses,
            net_income_margin: percentage(revenue - total_expenses, revenue),
        }
    }

    #[test]
    fn test_net_income_and_margin() {
        let r = report(1000000, &[("Rent", 750000)]);
        assert_eq!(r.net_income, 250000);
        assert!((r.net_income_margin - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_margin_zero_when_no_revenue() {
        let r = report(0, &[("Rent", 50000)]);
        assert_eq!(r.net_income, -50000);
        assert_eq!(r.net_income_margin, 0.0);
    }

    #[test]
    fn test_validate_flags() {
        let r = report(100000, &[("Rent", 60000), ("Misc", -100)]);
        let flags = ProfitLossEngine::validate(&r);
        assert!(flags.contains(&ProfitLossFlag::NegativeAmount {
            account: "Misc".into()
        }));
        assert!(flags.contains(&ProfitLossFlag::ExpenseExceedsHalfRevenue {
            account: "Rent".into()
        }));
    }

    #[test]
    fn test_validate_empty_sections() {
        let r = report(0, &[]);
        let flags = ProfitLossEngine::validate(&r);
        assert!(flags.contains(&ProfitLossFlag::NoRevenueAccounts));
        assert!(flags.contains(&ProfitLossFlag::NoExpenseAccounts));
    }

    #[test]
    fn test_compare_periods() {
        let current = report(1200000, &[("Rent", 400000)]);
        let previous = report(1000000, &[("Rent", 500000)]);
        let cmp = ProfitLossEngine::compare_periods(&current, &previous);

        assert_eq!(cmp.revenue_delta, 200000);
        assert!((cmp.revenue_pct - 20.0).abs() < f64::EPSILON);
        assert_eq!(cmp.expenses_delta, -100000);
        assert!((cmp.expenses_pct + 20.0).abs() < f64::EPSILON);
        assert_eq!(cmp.net_income_delta, 300000);
    }

    #[test]
    fn test_compare_periods_zero_previous() {
        let current = report(1000000, &[]);
        let previous = report(0, &[]);
        let cmp = ProfitLossEngine::compare_periods(&current, &previous);
        assert_eq!(cmp.revenue_pct, 0.0);
    }
}
