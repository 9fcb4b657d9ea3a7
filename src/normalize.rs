//! Typed transactions, monthly summaries and the gambling check.
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, Month, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::dates::parse_day_first;
use crate::extract::ExtractedRow;
use crate::logging::{ORACLE_CALLS, PIPELINE};
use crate::oracle::{complete_json, prompts, Oracle, OracleError};

/// Placeholder the vision path writes for unreadable cells.
pub const NOT_VISIBLE: &str = "Not Visible";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub credit: Decimal,
    pub debit: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTable {
    pub transactions: Vec<NormalizedTransaction>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty() && *v != NOT_VISIBLE)
}

/// Parses an amount after dropping thousands separators. Signs are
/// discarded; anything unparseable is zero.
pub fn parse_amount(value: Option<&str>) -> Decimal {
    let Some(value) = present(value) else {
        return Decimal::ZERO;
    };
    let cleaned: String = value.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    Decimal::from_str(&cleaned)
        .map(|d| d.abs())
        .unwrap_or(Decimal::ZERO)
}

impl TransactionTable {
    /// Types raw rows. Dates are read day-first; a row whose date does not
    /// parse takes the date of the row above it. Rows before the first
    /// parseable date are dropped.
    pub fn from_rows(rows: &[ExtractedRow], reference_year: i32) -> Self {
        let mut transactions = Vec::with_capacity(rows.len());
        let mut last_date: Option<NaiveDate> = None;
        let mut dropped = 0usize;

        for row in rows {
            let parsed = present(row.date.as_deref()).and_then(|d| parse_day_first(d, reference_year));
            let Some(date) = parsed.or(last_date) else {
                dropped += 1;
                continue;
            };
            last_date = Some(date);
            transactions.push(NormalizedTransaction {
                date,
                description: row.description.as_deref().unwrap_or_default().trim().to_string(),
                credit: parse_amount(row.credit.as_deref()),
                debit: parse_amount(row.debit.as_deref()),
            });
        }

        if dropped > 0 {
            warn!(target: PIPELINE, dropped, "dropped rows preceding the first dated row");
        }
        debug!(target: PIPELINE, rows = transactions.len(), "normalised transactions");
        Self { transactions }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPeriod {
    Month { year: i32, month: u32 },
    Total,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlySummaryRow {
    pub period: SummaryPeriod,
    pub income: Decimal,
    pub expenses: Decimal,
    pub savings: Decimal,
    pub savings_ratio: Decimal,
}

impl MonthlySummaryRow {
    fn new(period: SummaryPeriod, income: Decimal, expenses: Decimal) -> Self {
        // Both sides are non-negative, so the difference always fits.
        let savings = income - expenses;
        let savings_ratio = if income > Decimal::ZERO {
            let bound = if savings.is_sign_negative() { Decimal::MIN } else { Decimal::MAX };
            savings
                .checked_div(income)
                .unwrap_or(bound)
                .saturating_mul(Decimal::ONE_HUNDRED)
                .round_dp(2)
        } else {
            Decimal::ZERO
        };
        Self {
            period,
            income,
            expenses,
            savings,
            savings_ratio,
        }
    }

    pub fn is_total(&self) -> bool {
        self.period == SummaryPeriod::Total
    }

    /// English month name, or `All` for the total row.
    pub fn month_name(&self) -> &'static str {
        match self.period {
            SummaryPeriod::Month { month, .. } => u8::try_from(month)
                .ok()
                .and_then(|m| Month::try_from(m).ok())
                .map(|m| m.name())
                .unwrap_or("Unknown"),
            SummaryPeriod::Total => "All",
        }
    }
}

impl Serialize for MonthlySummaryRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_struct("MonthlySummaryRow", 6)?;
        match self.period {
            SummaryPeriod::Month { year, .. } => row.serialize_field("year", &year)?,
            SummaryPeriod::Total => row.serialize_field("year", "Total")?,
        }
        row.serialize_field("month", self.month_name())?;
        row.serialize_field("income", &self.income)?;
        row.serialize_field("expenses", &self.expenses)?;
        row.serialize_field("savings", &self.savings)?;
        row.serialize_field("savings_ratio", &self.savings_ratio)?;
        row.end()
    }
}

/// Adds a non-negative amount, pinning the total at `Decimal::MAX`.
fn add_amount(total: Decimal, amount: Decimal) -> Decimal {
    total.checked_add(amount).unwrap_or_else(|| {
        warn!(target: PIPELINE, %total, %amount, "amount total overflowed, saturating");
        Decimal::MAX
    })
}

/// Income and expenses per calendar month over the `window_months` before
/// `today`, oldest first, followed by a `Total` row.
pub fn monthly_summary(
    table: &TransactionTable,
    today: NaiveDate,
    window_months: u32,
) -> Vec<MonthlySummaryRow> {
    let since = today.checked_sub_months(Months::new(window_months));
    let mut months: BTreeMap<(i32, u32), (Decimal, Decimal)> = BTreeMap::new();

    for tx in &table.transactions {
        if since.is_some_and(|since| tx.date < since) {
            continue;
        }
        let entry = months
            .entry((tx.date.year(), tx.date.month()))
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 = add_amount(entry.0, tx.credit);
        entry.1 = add_amount(entry.1, tx.debit);
    }

    let mut summary: Vec<MonthlySummaryRow> = months
        .into_iter()
        .map(|((year, month), (income, expenses))| {
            MonthlySummaryRow::new(SummaryPeriod::Month { year, month }, income, expenses)
        })
        .collect();

    let (income, expenses) = summary
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(i, e), row| {
            (add_amount(i, row.income), add_amount(e, row.expenses))
        });
    summary.push(MonthlySummaryRow::new(SummaryPeriod::Total, income, expenses));

    info!(
        target: PIPELINE,
        months = summary.len() - 1,
        %income,
        %expenses,
        "built monthly summary"
    );
    summary
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamblingMatch {
    pub index: usize,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamblingFlag {
    #[serde(rename = "gambling", default)]
    pub found: bool,
    #[serde(rename = "area_found", default)]
    pub matches: Vec<GamblingMatch>,
}

/// One `index: description` line per transaction.
pub fn indexed_descriptions(table: &TransactionTable) -> String {
    table
        .transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| format!("{i}: {}", tx.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Asks the oracle which transactions look like gambling. Reported indices
/// are checked against the table and descriptions taken from it.
pub fn check_gambling(
    oracle: &dyn Oracle,
    table: &TransactionTable,
) -> Result<GamblingFlag, OracleError> {
    if table.is_empty() {
        return Ok(GamblingFlag::default());
    }

    let request = prompts::gambling_check(&indexed_descriptions(table));
    let answer: GamblingFlag = complete_json(oracle, &request)?;
    if !answer.found {
        return Ok(GamblingFlag::default());
    }

    let mut matches = Vec::with_capacity(answer.matches.len());
    for m in answer.matches {
        match table.transactions.get(m.index) {
            Some(tx) => matches.push(GamblingMatch {
                index: m.index,
                description: tx.description.clone(),
            }),
            None => warn!(target: ORACLE_CALLS, index = m.index, "gambling match refers to unknown row"),
        }
    }
    info!(target: PIPELINE, matches = matches.len(), "gambling check done");
    Ok(GamblingFlag {
        found: !matches.is_empty(),
        matches,
    })
}
