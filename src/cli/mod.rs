use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{
    AccountingService, BusinessEvent, ProfitLossEngine, TransactionFilter, TrialBalanceEngine,
};
use crate::domain::{AccountPath, EntityRef, Side, SubledgerKind, format_cents, parse_cents};
use crate::io::Exporter;

/// Partita - Double-Entry Ledger Engine
#[derive(Parser)]
#[command(name = "partita")]
#[command(about = "A double-entry bookkeeping ledger with trial balance and P&L reporting")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "partita.db")]
    pub database: String,

    /// Organization id (UUID). Every command is scoped to one organization.
    #[arg(short, long, global = true)]
    pub org: Option<Uuid>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Insert the default chart of accounts for an organization
    Bootstrap,

    /// List the chart of accounts
    Accounts {
        /// Include deactivated accounts
        #[arg(long)]
        all: bool,
    },

    /// Post a manual journal voucher
    Post {
        /// Memo describing the event
        memo: String,

        /// Debit legs as PATH=AMOUNT (repeatable)
        #[arg(long = "debit", value_name = "PATH=AMOUNT")]
        debits: Vec<String>,

        /// Credit legs as PATH=AMOUNT (repeatable)
        #[arg(long = "credit", value_name = "PATH=AMOUNT")]
        credits: Vec<String>,

        /// Date of the event (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Record a customer invoice
    Invoice {
        /// Customer name
        customer: String,

        /// Invoice number
        #[arg(long)]
        number: String,

        /// Net amount (e.g. "1000.00")
        #[arg(long)]
        net: String,

        /// Tax amount
        #[arg(long, default_value = "0")]
        tax: String,

        /// Date of the invoice (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the balance of an account path
    Balance {
        /// Account path, e.g. "Assets:Accounts Receivable"
        path: String,
    },

    /// List transactions posted to an account path
    Transactions {
        /// Account path
        path: String,

        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Maximum number of rows to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a subledger entity statement
    Statement {
        /// Entity kind: customer, supplier or employee
        kind: String,

        /// Entity name
        name: String,

        /// Maximum number of rows to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Generate a trial balance
    TrialBalance {
        /// As-of date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        as_of: Option<String>,

        /// Write CSV instead of a table
        #[arg(long)]
        csv: bool,
    },

    /// Generate a profit and loss report
    ProfitLoss {
        /// Period start (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Period end (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Write CSV instead of a table
        #[arg(long)]
        csv: bool,
    },

    /// Void a journal (logical delete)
    Void {
        /// Journal id
        id: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let Commands::Init = self.command {
            AccountingService::init(&self.database).await?;
            println!("Initialized database at {}", self.database);
            return Ok(());
        }

        let service = AccountingService::connect(&self.database).await?;
        let org = self
            .org
            .context("--org is required: every command is scoped to one organization")?;

        match self.command {
            Commands::Init => unreachable!(),

            Commands::Bootstrap => {
                let inserted = service.bootstrap_chart(org).await?;
                if inserted == 0 {
                    println!("Chart of accounts already bootstrapped");
                } else {
                    println!("Inserted {} accounts", inserted);
                }
            }

            Commands::Accounts { all } => {
                let accounts = service.list_accounts(org, !all).await?;
                for account in accounts {
                    let marker = if account.is_subledger { " *" } else { "" };
                    println!("{:>8}  {}{}", account.code, account.path, marker);
                }
            }

            Commands::Post {
                memo,
                debits,
                credits,
                date,
            } => {
                let datetime = parse_optional_date(date.as_deref())?;
                let mut legs = Vec::new();
                for spec in &debits {
                    legs.push(parse_leg(spec, Side::Debit)?);
                }
                for spec in &credits {
                    legs.push(parse_leg(spec, Side::Credit)?);
                }

                let posting = service
                    .record_event(org, datetime, BusinessEvent::ManualJournal { memo, legs })
                    .await?;
                println!(
                    "Posted {} (journal {}, debits {} credits {})",
                    posting.voucher_number,
                    posting.journal_id,
                    format_cents(posting.total_debits),
                    format_cents(posting.total_credits),
                );
            }

            Commands::Invoice {
                customer,
                number,
                net,
                tax,
                date,
            } => {
                let datetime = parse_optional_date(date.as_deref())?;
                let event = BusinessEvent::CustomerInvoice {
                    customer: EntityRef::new(
                        Uuid::new_v5(&Uuid::NAMESPACE_OID, customer.as_bytes()),
                        customer,
                    ),
                    invoice_no: number,
                    net: parse_cents(&net)?,
                    tax: parse_cents(&tax)?,
                };
                let posting = service.record_event(org, datetime, event).await?;
                println!(
                    "Posted {} for {}",
                    posting.voucher_number,
                    format_cents(posting.total_debits)
                );
            }

            Commands::Balance { path } => {
                let path: AccountPath = path.parse()?;
                let balance = service.balance(org, &path).await?;
                println!("{}: {}", path, format_cents(balance));
            }

            Commands::Transactions {
                path,
                from_date,
                to_date,
                limit,
            } => {
                let path: AccountPath = path.parse()?;
                let filter = TransactionFilter {
                    from_date: from_date.as_deref().map(parse_date).transpose()?,
                    to_date: to_date.as_deref().map(parse_date).transpose()?,
                    limit,
                    offset: None,
                };
                for row in service.transactions(org, &path, &filter).await? {
                    println!(
                        "{}  {:<10}  {:>6}  {:>12}  {}",
                        row.leg.datetime.format("%Y-%m-%d"),
                        row.voucher_number,
                        row.leg.side.as_str(),
                        format_cents(row.leg.amount),
                        row.memo,
                    );
                }
            }

            Commands::Statement { kind, name, limit } => {
                let kind = SubledgerKind::from_str(&kind)
                    .with_context(|| format!("unknown entity kind: {}", kind))?;
                let entity = EntityRef::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()), name);
                let filter = TransactionFilter {
                    limit,
                    ..Default::default()
                };
                let statement = service.statement(org, kind, &entity, &filter).await?;
                println!(
                    "{} ({})  balance: {}",
                    statement.account.path,
                    statement.account.code,
                    format_cents(statement.balance),
                );
                for row in statement.transactions {
                    println!(
                        "{}  {:<10}  {:>6}  {:>12}  {}",
                        row.leg.datetime.format("%Y-%m-%d"),
                        row.voucher_number,
                        row.leg.side.as_str(),
                        format_cents(row.leg.amount),
                        row.memo,
                    );
                }
            }

            Commands::TrialBalance { as_of, csv } => {
                let as_of = parse_optional_date(as_of.as_deref())?;
                let engine = TrialBalanceEngine::new(service.repository().clone());
                let report = engine.generate(org, as_of).await?;

                if csv {
                    Exporter::trial_balance_csv(&report, std::io::stdout())?;
                } else {
                    for row in &report.rows {
                        let marker = if row.unusual { " !" } else { "" };
                        println!(
                            "{:>8}  {:<32}  {:>12}  {:>12}{}",
                            row.code,
                            row.name,
                            format_cents(row.debit),
                            format_cents(row.credit),
                            marker,
                        );
                    }
                    println!(
                        "{:>8}  {:<32}  {:>12}  {:>12}",
                        "",
                        "Total",
                        format_cents(report.total_debits),
                        format_cents(report.total_credits),
                    );
                    for warning in &report.warnings {
                        println!("warning: {}", warning);
                    }
                }
            }

            Commands::ProfitLoss { from, to, csv } => {
                let start = parse_date(&from)?;
                let end = parse_date(&to)?;
                let engine = ProfitLossEngine::new(service.repository().clone());
                let report = engine.generate(org, start, end).await?;

                if csv {
                    Exporter::profit_loss_csv(&report, std::io::stdout())?;
                } else {
                    println!("Revenue");
                    for line in &report.revenues {
                        println!("  {:<32}  {:>12}", line.name, format_cents(line.amount));
                    }
                    println!("Expenses");
                    for line in &report.expenses {
                        println!(
                            "  {:<32}  {:>12}  {:>5.1}%",
                            line.name,
                            format_cents(line.amount),
                            line.percent_of_revenue,
                        );
                    }
                    println!(
                        "Net income: {} ({:.1}%)",
                        format_cents(report.net_income),
                        report.net_income_margin,
                    );
                    for flag in ProfitLossEngine::validate(&report) {
                        println!("warning: {:?}", flag);
                    }
                }
            }

            Commands::Void { id } => {
                let id = Uuid::parse_str(&id).context("Invalid journal id")?;
                service.void_journal(org, id).await?;
                println!("Voided journal {}", id);
            }
        }

        Ok(())
    }
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {} (expected YYYY-MM-DD)", date_str))?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .context("Invalid time components")?
        .and_utc())
}

fn parse_optional_date(date_str: Option<&str>) -> Result<DateTime<Utc>> {
    match date_str {
        Some(s) => parse_date(s),
        None => Ok(Utc::now()),
    }
}

fn parse_leg(spec: &str, side: Side) -> Result<(AccountPath, Side, crate::domain::Cents)> {
    let (path_str, amount_str) = spec
        .split_once('=')
        .with_context(|| format!("Invalid leg: {} (expected PATH=AMOUNT)", spec))?;
    let path: AccountPath = path_str.parse()?;
    let amount = parse_cents(amount_str)?;
    Ok((path, side, amount))
}
