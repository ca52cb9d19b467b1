use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountActivity, AccountPath, AccountSubtype, AccountType, Cents, EventMeta, Journal,
    JournalId, LegWithJournal, OrgId, Side, SubledgerKind, TransactionLeg,
};

use super::MIGRATION_001_INITIAL;

/// Parameters for drawing a voucher number from a named sequence.
#[derive(Debug, Clone, Copy)]
pub struct VoucherSpec<'a> {
    pub name: &'a str,
    pub prefix: &'a str,
    pub padding: usize,
}

impl Default for VoucherSpec<'static> {
    fn default() -> Self {
        Self {
            name: "voucher",
            prefix: "JV-",
            padding: 6,
        }
    }
}

/// Whether `insert_account_if_absent` actually wrote a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Repository for persisting and querying the chart of accounts, journals,
/// transaction legs and voucher counters.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL. WAL mode plus a busy
    /// timeout so concurrent committers queue instead of failing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Sequence operations
    // ========================

    /// Draw the next number from a named sequence as a single atomic
    /// upsert. The increment and the read of the post-increment value are
    /// one statement, so concurrent callers can never observe the same
    /// value. Numbers may have gaps but never duplicates.
    pub async fn next_sequence(
        &self,
        org: OrgId,
        name: &str,
        prefix: &str,
        padding: usize,
    ) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO counters (organization_id, name, prefix, padding_size, value)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT (organization_id, name)
            DO UPDATE SET value = counters.value + 1
            RETURNING prefix, padding_size, value
            "#,
        )
        .bind(org.to_string())
        .bind(name)
        .bind(prefix)
        .bind(padding as i64)
        .fetch_one(&self.pool)
        .await
        .context("Failed to increment sequence counter")?;

        Ok(Self::render_sequence(&row))
    }

    fn render_sequence(row: &sqlx::sqlite::SqliteRow) -> String {
        let prefix: String = row.get("prefix");
        let padding: i64 = row.get("padding_size");
        let value: i64 = row.get("value");
        format!("{}{:0width$}", prefix, value, width = padding as usize)
    }

    // ========================
    // Account operations
    // ========================

    /// Insert an account, treating a unique-index conflict on the path as
    /// "already exists" rather than an error. This is what makes subledger
    /// creation idempotent under concurrent commits for the same entity.
    pub async fn insert_account_if_absent(&self, account: &Account) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, organization_id, code, name, account_type, subtype,
                                  parent_code, path, is_subledger, subledger_kind, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.organization_id.to_string())
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.subtype.as_str())
        .bind(&account.parent_code)
        .bind(account.path.to_string())
        .bind(account.is_subledger)
        .bind(account.subledger_kind.map(|k| k.as_str()))
        .bind(account.active)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyExists),
            Err(e) => Err(e).context("Failed to insert account"),
        }
    }

    /// Get an account by its path.
    pub async fn get_account_by_path(
        &self,
        org: OrgId,
        path: &AccountPath,
    ) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, code, name, account_type, subtype,
                   parent_code, path, is_subledger, subledger_kind, active, created_at
            FROM accounts
            WHERE organization_id = ? AND path = ?
            "#,
        )
        .bind(org.to_string())
        .bind(path.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by path")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// List accounts for an organization, ordered by code.
    pub async fn list_accounts(&self, org: OrgId, only_active: bool) -> Result<Vec<Account>> {
        let query = if only_active {
            "SELECT id, organization_id, code, name, account_type, subtype, parent_code, path,
                    is_subledger, subledger_kind, active, created_at
             FROM accounts WHERE organization_id = ? AND active = 1 ORDER BY code"
        } else {
            "SELECT id, organization_id, code, name, account_type, subtype, parent_code, path,
                    is_subledger, subledger_kind, active, created_at
             FROM accounts WHERE organization_id = ? ORDER BY code"
        };

        let rows = sqlx::query(query)
            .bind(org.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// Codes of an account's direct children, for child-code allocation.
    pub async fn list_child_codes(&self, org: OrgId, parent_code: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT code FROM accounts WHERE organization_id = ? AND parent_code = ?",
        )
        .bind(org.to_string())
        .bind(parent_code)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list child codes")?;

        Ok(rows.iter().map(|r| r.get("code")).collect())
    }

    /// Number of accounts in an organization's chart.
    pub async fn count_accounts(&self, org: OrgId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM accounts WHERE organization_id = ?")
            .bind(org.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count accounts")?;
        Ok(row.get("count"))
    }

    /// Deactivate an account (accounts are never deleted).
    pub async fn deactivate_account(&self, org: OrgId, path: &AccountPath) -> Result<()> {
        sqlx::query("UPDATE accounts SET active = 0 WHERE organization_id = ? AND path = ?")
            .bind(org.to_string())
            .bind(path.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to deactivate account")?;
        Ok(())
    }

    // ========================
    // Journal operations
    // ========================

    /// Commit a journal and its legs as one SQLite transaction: the
    /// voucher number is drawn, the journal row written and every leg
    /// inserted atomically, or nothing is written at all.
    ///
    /// Idempotent on `journal.commit_id`: if a journal with the same
    /// commit id already exists (including one racing this call), the
    /// existing journal is returned and nothing new is written. Returns
    /// the committed journal and whether this call wrote it.
    pub async fn commit_journal(
        &self,
        journal: &Journal,
        legs: &[TransactionLeg],
        voucher: VoucherSpec<'_>,
    ) -> Result<(Journal, bool)> {
        if let Some(existing) = self.get_journal_by_commit_id(journal.commit_id).await? {
            return Ok((existing, false));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin commit transaction")?;

        let row = sqlx::query(
            r#"
            INSERT INTO counters (organization_id, name, prefix, padding_size, value)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT (organization_id, name)
            DO UPDATE SET value = counters.value + 1
            RETURNING prefix, padding_size, value
            "#,
        )
        .bind(journal.organization_id.to_string())
        .bind(voucher.name)
        .bind(voucher.prefix)
        .bind(voucher.padding as i64)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to draw voucher number")?;
        let voucher_number = Self::render_sequence(&row);

        let meta_json =
            serde_json::to_string(&journal.meta).context("Failed to serialize journal meta")?;

        let insert = sqlx::query(
            r#"
            INSERT INTO journals (id, organization_id, datetime, memo, voucher_number,
                                  commit_id, voided, meta)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(journal.id.to_string())
        .bind(journal.organization_id.to_string())
        .bind(journal.datetime.to_rfc3339())
        .bind(&journal.memo)
        .bind(&voucher_number)
        .bind(journal.commit_id.to_string())
        .bind(&meta_json)
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert {
            if is_unique_violation(&e) {
                // Lost the race for this commit id: roll back (releasing
                // the counter draw is not needed, gaps are allowed) and
                // return the journal the winner wrote.
                tx.rollback().await.ok();
                let existing = self
                    .get_journal_by_commit_id(journal.commit_id)
                    .await?
                    .context("Journal vanished after commit-id conflict")?;
                return Ok((existing, false));
            }
            return Err(e).context("Failed to insert journal");
        }

        for leg in legs {
            sqlx::query(
                r#"
                INSERT INTO transaction_legs (id, journal_id, organization_id, datetime,
                                              account_path, side, amount_cents)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(leg.id.to_string())
            .bind(leg.journal_id.to_string())
            .bind(leg.organization_id.to_string())
            .bind(leg.datetime.to_rfc3339())
            .bind(leg.account_path.to_string())
            .bind(leg.side.as_str())
            .bind(leg.amount)
            .execute(&mut *tx)
            .await
            .context("Failed to insert transaction leg")?;
        }

        tx.commit().await.context("Failed to commit journal")?;

        let mut committed = journal.clone();
        committed.voucher_number = voucher_number;
        Ok((committed, true))
    }

    /// Get a journal by its id.
    pub async fn get_journal(&self, org: OrgId, id: JournalId) -> Result<Option<Journal>> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, datetime, memo, voucher_number, commit_id, voided, meta
            FROM journals
            WHERE organization_id = ? AND id = ?
            "#,
        )
        .bind(org.to_string())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch journal")?;

        row.as_ref().map(Self::row_to_journal).transpose()
    }

    /// Get a journal by its idempotency key.
    pub async fn get_journal_by_commit_id(&self, commit_id: Uuid) -> Result<Option<Journal>> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, datetime, memo, voucher_number, commit_id, voided, meta
            FROM journals
            WHERE commit_id = ?
            "#,
        )
        .bind(commit_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch journal by commit id")?;

        row.as_ref().map(Self::row_to_journal).transpose()
    }

    /// Mark a journal as voided (logical delete, the only mutation).
    /// Returns false if no such journal exists.
    pub async fn void_journal(&self, org: OrgId, id: JournalId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE journals SET voided = 1 WHERE organization_id = ? AND id = ?",
        )
        .bind(org.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to void journal")?;
        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Balance and aggregation queries
    // ========================

    /// Raw (debit-positive) balance of an account path over all non-voided
    /// legs, rolling up descendants so a subledger parent sums all of its
    /// per-entity children.
    pub async fn compute_balance(&self, org: OrgId, path: &AccountPath) -> Result<Cents> {
        let path_str = path.to_string();
        let pattern = format!("{}:%", like_escape(&path_str));

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN l.side = 'debit' THEN l.amount_cents
                                     ELSE -l.amount_cents END), 0) as balance
            FROM transaction_legs l
            JOIN journals j ON j.id = l.journal_id
            WHERE l.organization_id = ?
              AND j.voided = 0
              AND (l.account_path = ? OR l.account_path LIKE ? ESCAPE '\')
            "#,
        )
        .bind(org.to_string())
        .bind(&path_str)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute balance")?;

        Ok(row.get("balance"))
    }

    /// Legs posted to a path (and its descendants), joined with the owning
    /// journal's memo and voucher number, newest first, with optional date
    /// filters and limit/offset pagination.
    pub async fn list_legs_for_path(
        &self,
        org: OrgId,
        path: &AccountPath,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<LegWithJournal>> {
        let mut query = String::from(
            "SELECT l.id, l.journal_id, l.organization_id, l.datetime, l.account_path,
                    l.side, l.amount_cents, j.memo, j.voucher_number
             FROM transaction_legs l
             JOIN journals j ON j.id = l.journal_id
             WHERE l.organization_id = ? AND j.voided = 0
               AND (l.account_path = ? OR l.account_path LIKE ? ESCAPE '\\')",
        );

        let path_str = path.to_string();
        let pattern = format!("{}:%", like_escape(&path_str));
        let from_str = from_date.map(|dt| dt.to_rfc3339());
        let to_str = to_date.map(|dt| dt.to_rfc3339());

        if from_str.is_some() {
            query.push_str(" AND l.datetime >= ?");
        }
        if to_str.is_some() {
            query.push_str(" AND l.datetime <= ?");
        }
        query.push_str(" ORDER BY l.datetime DESC, l.id DESC");
        match (limit, offset) {
            (Some(lim), Some(off)) => {
                query.push_str(&format!(" LIMIT {} OFFSET {}", lim, off));
            }
            (Some(lim), None) => query.push_str(&format!(" LIMIT {}", lim)),
            // SQLite only accepts OFFSET after a LIMIT; -1 is unbounded.
            (None, Some(off)) => query.push_str(&format!(" LIMIT -1 OFFSET {}", off)),
            (None, None) => {}
        }

        let mut sql_query = sqlx::query(&query)
            .bind(org.to_string())
            .bind(&path_str)
            .bind(&pattern);
        if let Some(ref fd) = from_str {
            sql_query = sql_query.bind(fd);
        }
        if let Some(ref td) = to_str {
            sql_query = sql_query.bind(td);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list legs for path")?;

        rows.iter()
            .map(|row| {
                Ok(LegWithJournal {
                    leg: Self::row_to_leg(row)?,
                    memo: row.get("memo"),
                    voucher_number: row.get("voucher_number"),
                })
            })
            .collect()
    }

    /// Per-account-path debit/credit totals over all non-voided legs with
    /// `datetime <= as_of`, in one grouped query.
    pub async fn account_activity_as_of(
        &self,
        org: OrgId,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<String, AccountActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT l.account_path,
                   COALESCE(SUM(CASE WHEN l.side = 'debit' THEN l.amount_cents ELSE 0 END), 0) as debits,
                   COALESCE(SUM(CASE WHEN l.side = 'credit' THEN l.amount_cents ELSE 0 END), 0) as credits
            FROM transaction_legs l
            JOIN journals j ON j.id = l.journal_id
            WHERE l.organization_id = ? AND j.voided = 0 AND l.datetime <= ?
            GROUP BY l.account_path
            "#,
        )
        .bind(org.to_string())
        .bind(as_of.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate account activity")?;

        Ok(Self::rows_to_activity(&rows))
    }

    /// Per-account-path debit/credit totals over the closed interval
    /// `[from, to]`, excluding voided journals.
    pub async fn account_activity_between(
        &self,
        org: OrgId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<String, AccountActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT l.account_path,
                   COALESCE(SUM(CASE WHEN l.side = 'debit' THEN l.amount_cents ELSE 0 END), 0) as debits,
                   COALESCE(SUM(CASE WHEN l.side = 'credit' THEN l.amount_cents ELSE 0 END), 0) as credits
            FROM transaction_legs l
            JOIN journals j ON j.id = l.journal_id
            WHERE l.organization_id = ? AND j.voided = 0
              AND l.datetime >= ? AND l.datetime <= ?
            GROUP BY l.account_path
            "#,
        )
        .bind(org.to_string())
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate period activity")?;

        Ok(Self::rows_to_activity(&rows))
    }

    fn rows_to_activity(rows: &[sqlx::sqlite::SqliteRow]) -> HashMap<String, AccountActivity> {
        rows.iter()
            .map(|row| {
                let path: String = row.get("account_path");
                let activity = AccountActivity {
                    debits: row.get("debits"),
                    credits: row.get("credits"),
                };
                (path, activity)
            })
            .collect()
    }

    // ========================
    // Row mapping
    // ========================

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let org_str: String = row.get("organization_id");
        let type_str: String = row.get("account_type");
        let subtype_str: String = row.get("subtype");
        let path_str: String = row.get("path");
        let subledger_str: Option<String> = row.get("subledger_kind");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            organization_id: Uuid::parse_str(&org_str).context("Invalid organization ID")?,
            code: row.get("code"),
            name: row.get("name"),
            account_type: AccountType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account type: {}", type_str))?,
            subtype: AccountSubtype::from_str(&subtype_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account subtype: {}", subtype_str))?,
            parent_code: row.get("parent_code"),
            path: AccountPath::parse(&path_str).context("Invalid account path")?,
            is_subledger: row.get::<i32, _>("is_subledger") != 0,
            subledger_kind: subledger_str.as_deref().and_then(SubledgerKind::from_str),
            active: row.get::<i32, _>("active") != 0,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    fn row_to_journal(row: &sqlx::sqlite::SqliteRow) -> Result<Journal> {
        let id_str: String = row.get("id");
        let org_str: String = row.get("organization_id");
        let datetime_str: String = row.get("datetime");
        let commit_id_str: String = row.get("commit_id");
        let meta_json: String = row.get("meta");

        Ok(Journal {
            id: Uuid::parse_str(&id_str).context("Invalid journal ID")?,
            organization_id: Uuid::parse_str(&org_str).context("Invalid organization ID")?,
            datetime: DateTime::parse_from_rfc3339(&datetime_str)
                .context("Invalid journal datetime")?
                .with_timezone(&Utc),
            memo: row.get("memo"),
            voucher_number: row.get("voucher_number"),
            commit_id: Uuid::parse_str(&commit_id_str).context("Invalid commit ID")?,
            voided: row.get::<i32, _>("voided") != 0,
            meta: serde_json::from_str(&meta_json).context("Invalid journal meta")?,
        })
    }

    fn row_to_leg(row: &sqlx::sqlite::SqliteRow) -> Result<TransactionLeg> {
        let id_str: String = row.get("id");
        let journal_str: String = row.get("journal_id");
        let org_str: String = row.get("organization_id");
        let datetime_str: String = row.get("datetime");
        let path_str: String = row.get("account_path");
        let side_str: String = row.get("side");

        Ok(TransactionLeg {
            id: Uuid::parse_str(&id_str).context("Invalid leg ID")?,
            journal_id: Uuid::parse_str(&journal_str).context("Invalid journal ID")?,
            organization_id: Uuid::parse_str(&org_str).context("Invalid organization ID")?,
            datetime: DateTime::parse_from_rfc3339(&datetime_str)
                .context("Invalid leg datetime")?
                .with_timezone(&Utc),
            account_path: AccountPath::parse(&path_str).context("Invalid account path")?,
            side: Side::from_str(&side_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid leg side: {}", side_str))?,
            amount: row.get("amount_cents"),
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Escape LIKE metacharacters in a path so entity names containing '%' or
/// '_' cannot widen a prefix match.
fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
