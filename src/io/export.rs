use std::io::Write;

use anyhow::Result;

use crate::application::{ProfitLoss, TrialBalance};
use crate::domain::format_cents;

/// Serializes reports to flat CSV rows. Formatting beyond CSV (PDF,
/// spreadsheets) is the caller's concern.
pub struct Exporter;

impl Exporter {
    /// Write a trial balance as `code,name,type,subtype,debit,credit`
    /// rows followed by a totals row. Returns the number of account rows.
    pub fn trial_balance_csv<W: Write>(report: &TrialBalance, writer: W) -> Result<usize> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["code", "name", "type", "subtype", "debit", "credit"])?;

        for row in &report.rows {
            csv_writer.write_record([
                row.code.as_str(),
                row.name.as_str(),
                row.account_type.as_str(),
                row.subtype.as_str(),
                &format_cents(row.debit),
                &format_cents(row.credit),
            ])?;
        }

        csv_writer.write_record([
            "",
            "Total",
            "",
            "",
            &format_cents(report.total_debits),
            &format_cents(report.total_credits),
        ])?;

        csv_writer.flush()?;
        Ok(report.rows.len())
    }

    /// Write a profit and loss report as
    /// `section,account,amount,percent_of_revenue` rows with section
    /// totals and a closing net-income row. Returns the number of
    /// account rows.
    pub fn profit_loss_csv<W: Write>(report: &ProfitLoss, writer: W) -> Result<usize> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["section", "account", "amount", "percent_of_revenue"])?;

        for line in &report.revenues {
            csv_writer.write_record([
                "revenue",
                line.name.as_str(),
                &format_cents(line.amount),
                &format!("{:.1}", line.percent_of_revenue),
            ])?;
        }
        csv_writer.write_record([
            "revenue",
            "Total Revenue",
            &format_cents(report.total_revenue),
            "",
        ])?;

        for line in &report.expenses {
            csv_writer.write_record([
                "expense",
                line.name.as_str(),
                &format_cents(line.amount),
                &format!("{:.1}", line.percent_of_revenue),
            ])?;
        }
        csv_writer.write_record([
            "expense",
            "Total Expenses",
            &format_cents(report.total_expenses),
            "",
        ])?;

        csv_writer.write_record([
            "",
            "Net Income",
            &format_cents(report.net_income),
            &format!("{:.1}", report.net_income_margin),
        ])?;

        csv_writer.flush()?;
        Ok(report.revenues.len() + report.expenses.len())
    }
}
