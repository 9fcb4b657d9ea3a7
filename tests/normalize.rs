use chrono::NaiveDate;
use ledgerlift::extract::ExtractedRow;
use ledgerlift::normalize::{
    check_gambling, monthly_summary, GamblingMatch, SummaryPeriod, TransactionTable,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

mod common;
use common::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn november() -> TransactionTable {
    TransactionTable::from_rows(
        &[
            ExtractedRow::new("01/11/2022", "Salary", "1,000.00", ""),
            ExtractedRow::new("05/11/2022", "Rent", "", "400.00"),
        ],
        2022,
    )
}

#[test]
fn test_month_with_income_and_expenses() {
    let summary = monthly_summary(&november(), date(2022, 12, 1), 6);
    assert_eq!(summary.len(), 2);

    let month = &summary[0];
    assert_eq!(month.period, SummaryPeriod::Month { year: 2022, month: 11 });
    assert_eq!(month.month_name(), "November");
    assert_eq!(month.income, Decimal::from(1000));
    assert_eq!(month.expenses, Decimal::from(400));
    assert_eq!(month.savings, Decimal::from(600));
    assert_eq!(month.savings_ratio, Decimal::from(60));

    let total = &summary[1];
    assert!(total.is_total());
    assert_eq!(total.month_name(), "All");
    assert_eq!(total.savings, Decimal::from(600));
}

#[test]
fn test_undated_rows_take_the_previous_date() {
    let table = TransactionTable::from_rows(
        &[
            ExtractedRow::new("", "Carried forward", "", ""),
            ExtractedRow::new("03-Oct-2022", "POS purchase", "", "12.50"),
            ExtractedRow::new("", "POS purchase fee", "", "0.50"),
            ExtractedRow::new("Not Visible", "Transfer in", "20", ""),
        ],
        2022,
    );
    assert_eq!(table.len(), 3);
    assert!(table
        .transactions
        .iter()
        .all(|tx| tx.date == date(2022, 10, 3)));
    assert_eq!(table.transactions[1].debit, Decimal::new(50, 2));
}

#[test]
fn test_savings_is_income_minus_expenses_everywhere() {
    let table = TransactionTable::from_rows(
        &[
            ExtractedRow::new("02-Sep-2022", "Salary", "900", ""),
            ExtractedRow::new("10-Sep-2022", "Groceries", "", "1,250.75"),
            ExtractedRow::new("01-Oct-2022", "Salary", "900", ""),
            ExtractedRow::new("15-Oct-2022", "Utilities", "", "-120"),
        ],
        2022,
    );
    let summary = monthly_summary(&table, date(2022, 11, 1), 6);
    assert_eq!(summary.len(), 3);
    for row in &summary {
        assert_eq!(row.savings, row.income - row.expenses);
    }
    // Signs are dropped: a negative debit still counts as an expense.
    assert_eq!(summary[1].expenses, Decimal::from(120));
    // Spending more than earned gives a negative ratio.
    assert!(summary[0].savings_ratio < Decimal::ZERO);
}

#[test]
fn test_summary_is_idempotent() {
    let table = november();
    let today = date(2022, 12, 1);
    assert_eq!(monthly_summary(&table, today, 6), monthly_summary(&table, today, 6));
}

#[test]
fn test_window_drops_old_months() {
    let table = TransactionTable::from_rows(
        &[
            ExtractedRow::new("01-May-2022", "Old salary", "500", ""),
            ExtractedRow::new("20-Jun-2022", "Salary", "700", ""),
        ],
        2022,
    );
    let summary = monthly_summary(&table, date(2022, 12, 15), 6);
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].period, SummaryPeriod::Month { year: 2022, month: 6 });
    assert_eq!(summary[1].income, Decimal::from(700));
}

#[test]
fn test_empty_table_still_has_a_total() {
    let summary = monthly_summary(&TransactionTable::default(), date(2022, 12, 1), 6);
    assert_eq!(summary.len(), 1);
    assert!(summary[0].is_total());
    assert_eq!(summary[0].savings_ratio, Decimal::ZERO);
}

#[test]
fn test_summary_json_shape() {
    let summary = monthly_summary(&november(), date(2022, 12, 1), 6);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json[0]["year"], 2022);
    assert_eq!(json[0]["month"], "November");
    assert_eq!(json[1]["year"], "Total");
    assert_eq!(json[1]["month"], "All");
    for key in ["income", "expenses", "savings", "savings_ratio"] {
        assert!(json[1][key].is_number(), "{key}");
    }
}

#[test]
fn test_gambling_matches_come_from_the_table() {
    let table = TransactionTable::from_rows(
        &[
            ExtractedRow::new("01/11/2022", "Salary", "1000", ""),
            ExtractedRow::new("02/11/2022", "Bet365 deposit", "", "50"),
            ExtractedRow::new("03/11/2022", "Coffee", "", "3"),
        ],
        2022,
    );
    let oracle = MockOracle::new().answer(
        CallKind::Gambling,
        r#"```json
{"gambling": true, "area_found": [{"index": 1, "description": "bet365"}, {"index": 9, "description": "ghost"}]}
```"#,
    );

    let flag = check_gambling(&oracle, &table).unwrap();
    assert!(flag.found);
    assert_eq!(
        flag.matches,
        vec![GamblingMatch {
            index: 1,
            description: "Bet365 deposit".to_string(),
        }]
    );

    let request = &oracle.requests(CallKind::Gambling)[0];
    assert!(request.message.contains("1: Bet365 deposit"));
}

#[test]
fn test_no_gambling() {
    let oracle =
        MockOracle::new().answer(CallKind::Gambling, r#"{"gambling": false, "area_found": []}"#);
    let flag = check_gambling(&oracle, &november()).unwrap();
    assert!(!flag.found);
    assert!(flag.matches.is_empty());
}

#[test]
fn test_empty_table_skips_the_oracle() {
    let oracle = MockOracle::new();
    let flag = check_gambling(&oracle, &TransactionTable::default()).unwrap();
    assert!(!flag.found);
    assert_eq!(oracle.calls(CallKind::Gambling), 0);
}

#[test]
fn test_huge_credits_saturate_instead_of_overflowing() {
    let table = TransactionTable::from_rows(
        &[
            ExtractedRow::new("01/11/2022", "Windfall", "79228162514264337593543950335", ""),
            ExtractedRow::new("02/11/2022", "Interest", "1", ""),
        ],
        2022,
    );
    let summary = monthly_summary(&table, date(2022, 12, 1), 6);
    assert_eq!(summary[0].income, Decimal::MAX);
    assert_eq!(summary[1].income, Decimal::MAX);
    assert_eq!(summary[1].savings_ratio, Decimal::from(100));
}

#[test]
fn test_debits_dwarfing_income_keep_a_finite_ratio() {
    let table = TransactionTable::from_rows(
        &[
            ExtractedRow::new("01/11/2022", "Refund", "1", ""),
            ExtractedRow::new("02/11/2022", "House", "", "1000000000000000000000000000"),
        ],
        2022,
    );
    let summary = monthly_summary(&table, date(2022, 12, 1), 6);
    for row in &summary {
        assert_eq!(row.savings, row.income - row.expenses);
        assert!(row.savings_ratio < Decimal::ZERO);
    }
}
