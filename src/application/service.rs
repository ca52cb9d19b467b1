use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    Account, AccountPath, AccountSubtype, Cents, EntityRef, Entry, EventMeta, Journal, JournalId,
    LegAccount, LegWithJournal, OrgId, Side, SubledgerKind, TransactionLeg, next_child_code,
};
use crate::storage::{InsertOutcome, Repository, VoucherSpec};

use super::LedgerError;

/// How many times subledger creation retries when it loses a code
/// allocation race to a concurrent commit.
const SUBLEDGER_CREATE_ATTEMPTS: usize = 3;

/// The accounting façade: every caller (CLI, web handlers, batch jobs)
/// records events, commits entries and queries balances through this
/// service. Reports are generated by the engines in `trial_balance` and
/// `profit_loss`, which share the same repository.
#[derive(Clone)]
pub struct AccountingService {
    repo: Repository,
}

/// Filter for transaction and statement listings.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Result of committing a business event.
#[derive(Debug, Clone)]
pub struct Posting {
    pub journal_id: JournalId,
    pub voucher_number: String,
    pub total_debits: Cents,
    pub total_credits: Cents,
}

/// A per-entity subledger statement: the entity's account, its current
/// balance and its recent legs, newest first.
#[derive(Debug, Clone)]
pub struct Statement {
    pub account: Account,
    pub balance: Cents,
    pub transactions: Vec<LegWithJournal>,
}

/// The canonical business events and their fixed debit/credit mappings.
#[derive(Debug, Clone)]
pub enum BusinessEvent {
    /// Debit the customer's receivable subledger for net + tax, credit
    /// revenue for net and tax payable for tax (omitted when zero).
    CustomerInvoice {
        customer: EntityRef,
        invoice_no: String,
        net: Cents,
        tax: Cents,
    },
    /// Debit bank, credit the customer's receivable subledger.
    CustomerPayment {
        customer: EntityRef,
        amount: Cents,
        payment_ref: Option<String>,
    },
    /// Debit an expense account, credit the supplier's payable subledger.
    SupplierBill {
        supplier: EntityRef,
        bill_no: String,
        amount: Cents,
        expense_path: Option<AccountPath>,
    },
    /// Debit the supplier's payable subledger, credit bank.
    SupplierPayment {
        supplier: EntityRef,
        amount: Cents,
        payment_ref: Option<String>,
    },
    /// Debit salaries expense for gross, credit the employee's payable
    /// subledger for net and tax payable for the withholding.
    EmployeePayroll {
        employee: EntityRef,
        period: String,
        gross: Cents,
        withholding: Cents,
    },
    /// Caller-provided legs, committed verbatim.
    ManualJournal {
        memo: String,
        legs: Vec<(AccountPath, Side, Cents)>,
    },
}

impl AccountingService {
    /// Create a new accounting service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Chart of accounts
    // ========================

    /// Insert the default taxonomy for an organization. Idempotent: a
    /// no-op returning 0 when the organization already has any accounts.
    pub async fn bootstrap_chart(&self, org: OrgId) -> Result<usize, LedgerError> {
        if self.repo.count_accounts(org).await? > 0 {
            debug!(%org, "chart already bootstrapped");
            return Ok(0);
        }

        let mut inserted = 0;
        for account in default_chart(org) {
            // Conflict-tolerant insert keeps concurrent bootstraps safe.
            if self.repo.insert_account_if_absent(&account).await? == InsertOutcome::Inserted {
                inserted += 1;
            }
        }

        info!(%org, accounts = inserted, "bootstrapped default chart of accounts");
        Ok(inserted)
    }

    /// Look up an account by path.
    pub async fn find_account(
        &self,
        org: OrgId,
        path: &AccountPath,
    ) -> Result<Account, LedgerError> {
        self.repo
            .get_account_by_path(org, path)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(path.to_string()))
    }

    /// List the organization's accounts, ordered by code.
    pub async fn list_accounts(
        &self,
        org: OrgId,
        only_active: bool,
    ) -> Result<Vec<Account>, LedgerError> {
        Ok(self.repo.list_accounts(org, only_active).await?)
    }

    /// Deactivate an account. Accounts are never deleted.
    pub async fn deactivate_account(
        &self,
        org: OrgId,
        path: &AccountPath,
    ) -> Result<(), LedgerError> {
        self.find_account(org, path).await?;
        Ok(self.repo.deactivate_account(org, path).await?)
    }

    /// Return the entity's subledger leaf account, creating it under the
    /// fixed parent for its kind on first reference. Safe under duplicate
    /// concurrent creation: the unique index on the path arbitrates, and
    /// losers re-read the winner's row.
    pub async fn resolve_or_create_subledger(
        &self,
        org: OrgId,
        kind: SubledgerKind,
        entity: &EntityRef,
    ) -> Result<Account, LedgerError> {
        let parent_path = subledger_parent_path(kind);
        let parent = self
            .repo
            .get_account_by_path(org, &parent_path)
            .await?
            .ok_or(LedgerError::SubledgerParentMissing(kind))?;

        let child_path = parent_path.child(&entity.name)?;
        if let Some(existing) = self.repo.get_account_by_path(org, &child_path).await? {
            return Ok(existing);
        }

        for _ in 0..SUBLEDGER_CREATE_ATTEMPTS {
            let child_codes = self.repo.list_child_codes(org, &parent.code).await?;
            let code = next_child_code(&parent.code, &child_codes);

            let account = Account::new(
                org,
                code,
                entity.name.clone(),
                parent.subtype,
                Some(parent.code.clone()),
                child_path.clone(),
            )
            .as_subledger(kind);

            match self.repo.insert_account_if_absent(&account).await? {
                InsertOutcome::Inserted => {
                    info!(
                        %org,
                        kind = kind.as_str(),
                        path = %account.path,
                        code = %account.code,
                        "created subledger account"
                    );
                    return Ok(account);
                }
                InsertOutcome::AlreadyExists => {
                    // Either another caller created this entity's account,
                    // or a sibling grabbed the code we computed. Re-read
                    // and, if the path is still absent, retry with a
                    // fresh code.
                    if let Some(existing) =
                        self.repo.get_account_by_path(org, &child_path).await?
                    {
                        return Ok(existing);
                    }
                }
            }
        }

        Err(LedgerError::Storage(anyhow::anyhow!(
            "could not allocate a code for subledger account {}",
            child_path
        )))
    }

    // ========================
    // Sequences
    // ========================

    /// Draw the next value from a named sequence. The underlying increment
    /// is a single atomic statement; on storage failure the operation is
    /// retryable and no value has been consumed observably.
    pub async fn next_sequence(
        &self,
        org: OrgId,
        name: &str,
        prefix: &str,
        padding: usize,
    ) -> Result<String, LedgerError> {
        self.repo
            .next_sequence(org, name, prefix, padding)
            .await
            .map_err(|e| LedgerError::SequenceUnavailable(e.to_string()))
    }

    // ========================
    // Entry commit
    // ========================

    /// Start building an entry for the given organization. Organization
    /// context is always explicit; there is no fallback.
    pub fn begin_entry(&self, org: OrgId, memo: impl Into<String>, meta: EventMeta) -> Entry {
        Entry::new(org, memo, meta)
    }

    /// Validate and commit an entry: resolve subledger legs, draw a
    /// voucher number and write one journal plus one leg row per debit or
    /// credit, all atomically. Nothing is written when validation fails.
    /// Committing the same `commit_id` twice returns the original journal.
    pub async fn commit(&self, entry: Entry) -> Result<Journal, LedgerError> {
        entry.validate()?;

        let org = entry.organization_id;
        let journal = Journal {
            id: Uuid::new_v4(),
            organization_id: org,
            datetime: entry.datetime,
            memo: entry.memo.clone(),
            voucher_number: String::new(), // assigned at commit
            commit_id: entry.commit_id,
            voided: false,
            meta: entry.meta.clone(),
        };

        let mut legs = Vec::with_capacity(entry.legs.len());
        for pending in &entry.legs {
            let path = match &pending.account {
                LegAccount::Path(path) => {
                    let account = self.find_account(org, path).await?;
                    if !account.active {
                        return Err(LedgerError::AccountInactive(path.to_string()));
                    }
                    path.clone()
                }
                LegAccount::Subledger { kind, entity } => {
                    self.resolve_or_create_subledger(org, *kind, entity)
                        .await?
                        .path
                }
            };
            legs.push(TransactionLeg {
                id: Uuid::new_v4(),
                journal_id: journal.id,
                organization_id: org,
                datetime: journal.datetime,
                account_path: path,
                side: pending.side,
                amount: pending.amount,
            });
        }

        let (committed, was_new) = self
            .repo
            .commit_journal(&journal, &legs, VoucherSpec::default())
            .await?;

        if was_new {
            info!(
                %org,
                journal = %committed.id,
                voucher = %committed.voucher_number,
                legs = legs.len(),
                "committed journal"
            );
        } else {
            debug!(
                %org,
                journal = %committed.id,
                commit_id = %committed.commit_id,
                "commit replayed, returning existing journal"
            );
        }

        Ok(committed)
    }

    /// Mark a journal as voided. Voided journals are excluded from every
    /// balance and report query.
    pub async fn void_journal(&self, org: OrgId, id: JournalId) -> Result<(), LedgerError> {
        if !self.repo.void_journal(org, id).await? {
            return Err(LedgerError::JournalNotFound(id.to_string()));
        }
        info!(%org, journal = %id, "voided journal");
        Ok(())
    }

    /// Fetch a journal by id.
    pub async fn get_journal(&self, org: OrgId, id: JournalId) -> Result<Journal, LedgerError> {
        self.repo
            .get_journal(org, id)
            .await?
            .ok_or_else(|| LedgerError::JournalNotFound(id.to_string()))
    }

    // ========================
    // Balance queries
    // ========================

    /// Raw debit-positive balance of an account path. For a subledger
    /// parent this rolls up every per-entity child.
    pub async fn balance(&self, org: OrgId, path: &AccountPath) -> Result<Cents, LedgerError> {
        Ok(self.repo.compute_balance(org, path).await?)
    }

    /// Transactions posted to a path (and descendants), newest first.
    pub async fn transactions(
        &self,
        org: OrgId,
        path: &AccountPath,
        filter: &TransactionFilter,
    ) -> Result<Vec<LegWithJournal>, LedgerError> {
        Ok(self
            .repo
            .list_legs_for_path(
                org,
                path,
                filter.from_date,
                filter.to_date,
                filter.limit,
                filter.offset,
            )
            .await?)
    }

    /// Statement for a subledger entity: its account, current balance and
    /// recent transactions. Fails with `AccountNotFound` when the entity
    /// has never been posted to; statements do not create accounts.
    pub async fn statement(
        &self,
        org: OrgId,
        kind: SubledgerKind,
        entity: &EntityRef,
        filter: &TransactionFilter,
    ) -> Result<Statement, LedgerError> {
        let path = subledger_parent_path(kind).child(&entity.name)?;
        let account = self.find_account(org, &path).await?;
        let balance = self.repo.compute_balance(org, &path).await?;
        let transactions = self.transactions(org, &path, filter).await?;

        Ok(Statement {
            account,
            balance,
            transactions,
        })
    }

    // ========================
    // Business events
    // ========================

    /// Record a canonical business event: build its fixed debit/credit
    /// legs, derive a deterministic commit id from the source document
    /// where one exists, and commit. Returns the posting summary.
    pub async fn record_event(
        &self,
        org: OrgId,
        datetime: DateTime<Utc>,
        event: BusinessEvent,
    ) -> Result<Posting, LedgerError> {
        let commit_id = event.commit_id(org);
        let mut entry = event.into_entry(org)?.on(datetime);
        if let Some(id) = commit_id {
            entry = entry.with_commit_id(id);
        }

        let total_debits = entry.total(Side::Debit);
        let total_credits = entry.total(Side::Credit);
        let journal = self.commit(entry).await?;

        Ok(Posting {
            journal_id: journal.id,
            voucher_number: journal.voucher_number,
            total_debits,
            total_credits,
        })
    }
}

impl BusinessEvent {
    /// Deterministic idempotency key derived from the originating
    /// document, so a retried event after a timeout is a no-op. Events
    /// without a natural document reference get a random id per call.
    pub fn commit_id(&self, org: OrgId) -> Option<Uuid> {
        let doc_ref = match self {
            BusinessEvent::CustomerInvoice {
                customer,
                invoice_no,
                ..
            } => Some(format!("invoice/{}/{}", customer.id, invoice_no)),
            BusinessEvent::CustomerPayment {
                customer,
                payment_ref: Some(r),
                ..
            } => Some(format!("payment-in/{}/{}", customer.id, r)),
            BusinessEvent::SupplierBill {
                supplier, bill_no, ..
            } => Some(format!("bill/{}/{}", supplier.id, bill_no)),
            BusinessEvent::SupplierPayment {
                supplier,
                payment_ref: Some(r),
                ..
            } => Some(format!("payment-out/{}/{}", supplier.id, r)),
            BusinessEvent::EmployeePayroll {
                employee, period, ..
            } => Some(format!("payroll/{}/{}", employee.id, period)),
            _ => None,
        };

        doc_ref.map(|r| Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}/{}", org, r).as_bytes()))
    }

    /// Expand the event into its entry with the documented leg mapping.
    fn into_entry(self, org: OrgId) -> Result<Entry, LedgerError> {
        let entry = match self {
            BusinessEvent::CustomerInvoice {
                customer,
                invoice_no,
                net,
                tax,
            } => {
                let memo = format!("Invoice {} for {}", invoice_no, customer.name);
                let meta = EventMeta::CustomerInvoice {
                    customer_id: customer.id,
                    customer_name: customer.name.clone(),
                    invoice_no,
                };
                let mut entry = Entry::new(org, memo, meta)
                    .debit_subledger(SubledgerKind::Customer, customer, net + tax)
                    .credit(sales_revenue_path(), net);
                if tax > 0 {
                    entry = entry.credit(tax_payable_path(), tax);
                }
                entry
            }
            BusinessEvent::CustomerPayment {
                customer,
                amount,
                payment_ref,
            } => {
                let memo = format!("Payment received from {}", customer.name);
                let meta = EventMeta::CustomerPayment {
                    customer_id: customer.id,
                    customer_name: customer.name.clone(),
                    payment_ref,
                };
                Entry::new(org, memo, meta)
                    .debit(bank_path(), amount)
                    .credit_subledger(SubledgerKind::Customer, customer, amount)
            }
            BusinessEvent::SupplierBill {
                supplier,
                bill_no,
                amount,
                expense_path,
            } => {
                let memo = format!("Bill {} from {}", bill_no, supplier.name);
                let meta = EventMeta::SupplierBill {
                    supplier_id: supplier.id,
                    supplier_name: supplier.name.clone(),
                    bill_no,
                };
                Entry::new(org, memo, meta)
                    .debit(expense_path.unwrap_or_else(other_expenses_path), amount)
                    .credit_subledger(SubledgerKind::Supplier, supplier, amount)
            }
            BusinessEvent::SupplierPayment {
                supplier,
                amount,
                payment_ref,
            } => {
                let memo = format!("Payment sent to {}", supplier.name);
                let meta = EventMeta::SupplierPayment {
                    supplier_id: supplier.id,
                    supplier_name: supplier.name.clone(),
                    payment_ref,
                };
                Entry::new(org, memo, meta)
                    .debit_subledger(SubledgerKind::Supplier, supplier, amount)
                    .credit(bank_path(), amount)
            }
            BusinessEvent::EmployeePayroll {
                employee,
                period,
                gross,
                withholding,
            } => {
                if withholding >= gross {
                    return Err(LedgerError::InvalidLeg(format!(
                        "payroll withholding {} must be less than gross {}",
                        withholding, gross
                    )));
                }
                let memo = format!("Payroll {} for {}", period, employee.name);
                let meta = EventMeta::EmployeePayroll {
                    employee_id: employee.id,
                    employee_name: employee.name.clone(),
                    period,
                };
                let mut entry = Entry::new(org, memo, meta)
                    .debit(salaries_expense_path(), gross)
                    .credit_subledger(SubledgerKind::Employee, employee, gross - withholding);
                if withholding > 0 {
                    entry = entry.credit(tax_payable_path(), withholding);
                }
                entry
            }
            BusinessEvent::ManualJournal { memo, legs } => {
                let mut entry = Entry::new(org, memo, EventMeta::ManualJournal);
                for (path, side, amount) in legs {
                    entry = match side {
                        Side::Debit => entry.debit(path, amount),
                        Side::Credit => entry.credit(path, amount),
                    };
                }
                entry
            }
        };
        Ok(entry)
    }
}

/// Fixed parent account for each subledger kind.
pub fn subledger_parent_path(kind: SubledgerKind) -> AccountPath {
    let path = match kind {
        SubledgerKind::Customer => "Assets:Accounts Receivable",
        SubledgerKind::Supplier => "Liabilities:Accounts Payable",
        SubledgerKind::Employee => "Liabilities:Salaries Payable",
    };
    // Static strings above are valid paths by construction.
    AccountPath::parse(path).expect("static subledger parent path")
}

fn bank_path() -> AccountPath {
    AccountPath::parse("Assets:Bank").expect("static path")
}

fn sales_revenue_path() -> AccountPath {
    AccountPath::parse("Revenue:Sales Revenue").expect("static path")
}

fn tax_payable_path() -> AccountPath {
    AccountPath::parse("Liabilities:Tax Payable").expect("static path")
}

fn salaries_expense_path() -> AccountPath {
    AccountPath::parse("Expenses:Salaries Expense").expect("static path")
}

fn other_expenses_path() -> AccountPath {
    AccountPath::parse("Expenses:Other Expenses").expect("static path")
}

/// The standard taxonomy inserted by `bootstrap_chart`: five root
/// accounts in their fixed code ranges, each with its common children.
/// Accounts Receivable, Accounts Payable and Salaries Payable are the
/// subledger parents for customers, suppliers and employees.
fn default_chart(org: OrgId) -> Vec<Account> {
    use AccountSubtype::*;

    let spec: &[(&str, &str, AccountSubtype, Option<&str>)] = &[
        ("1000", "Assets", CurrentAsset, None),
        ("1100", "Assets:Cash", CurrentAsset, Some("1000")),
        ("1200", "Assets:Bank", CurrentAsset, Some("1000")),
        ("1300", "Assets:Accounts Receivable", CurrentAsset, Some("1000")),
        ("1400", "Assets:Inventory", CurrentAsset, Some("1000")),
        ("2000", "Liabilities", CurrentLiability, None),
        ("2100", "Liabilities:Accounts Payable", CurrentLiability, Some("2000")),
        ("2200", "Liabilities:Tax Payable", CurrentLiability, Some("2000")),
        ("2300", "Liabilities:Salaries Payable", CurrentLiability, Some("2000")),
        ("3000", "Equity", OwnersEquity, None),
        ("3100", "Equity:Owner's Equity", OwnersEquity, Some("3000")),
        ("3200", "Equity:Retained Earnings", RetainedEarnings, Some("3000")),
        ("4000", "Revenue", OperatingRevenue, None),
        ("4100", "Revenue:Sales Revenue", OperatingRevenue, Some("4000")),
        ("4200", "Revenue:Other Income", OtherIncome, Some("4000")),
        ("5000", "Expenses", OperatingExpense, None),
        ("5100", "Expenses:Cost of Goods Sold", CostOfSales, Some("5000")),
        ("5200", "Expenses:Salaries Expense", Payroll, Some("5000")),
        ("5300", "Expenses:Rent Expense", OperatingExpense, Some("5000")),
        ("5400", "Expenses:Other Expenses", OperatingExpense, Some("5000")),
    ];

    spec.iter()
        .map(|(code, path, subtype, parent)| {
            let path = AccountPath::parse(path).expect("static chart path");
            Account::new(
                org,
                (*code).to_string(),
                path.leaf().to_string(),
                *subtype,
                parent.map(|p| p.to_string()),
                path,
            )
        })
        .collect()
}
