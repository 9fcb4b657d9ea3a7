use ledgerlift::extract::ExtractedRow;
use ledgerlift::headers::ColumnMapping;
use ledgerlift::tables::{extract_tables_from_pdf, select_transaction_rows, DetectedTable};
use pretty_assertions::assert_eq;

use setup::*;

fn ruled_statement(rows: Vec<[String; 4]>) -> Vec<u8> {
    let config = StatementConfig {
        rows,
        ruled: true,
        ..Default::default()
    };
    create_statement_pdf_with_config(&config)
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn test_ruled_table_cells() {
    let tables = extract_tables_from_pdf(&ruled_statement(StatementConfig::default().rows)).unwrap();
    assert_eq!(tables.len(), 1);

    let table = &tables[0];
    assert_eq!(table.page, 1);
    assert_eq!(
        table.rows,
        vec![
            labels(&["Date", "Description", "Credit", "Debit"]),
            labels(&["03-Oct-2022", "Opening Balance", "", ""]),
            labels(&["12-Oct-2022", "Deposit interest", "0.64", ""]),
        ]
    );
}

#[test]
fn test_unruled_page_has_no_tables() {
    let tables = extract_tables_from_pdf(&create_statement_pdf()).unwrap();
    assert!(tables.is_empty());
}

#[test]
fn test_select_rows_after_header() {
    let tables = extract_tables_from_pdf(&ruled_statement(StatementConfig::default().rows)).unwrap();
    let header = labels(&["Date", "Description", "Credit", "Debit"]);
    let rows = select_transaction_rows(&tables, &header, &ColumnMapping::canonical());
    assert_eq!(
        rows,
        vec![
            ExtractedRow::new("03-Oct-2022", "Opening Balance", "", ""),
            ExtractedRow::new("12-Oct-2022", "Deposit interest", "0.64", ""),
        ]
    );
}

#[test]
fn test_selection_stops_at_first_undated_row() {
    let rows = vec![
        cells(["01-Nov-2022", "Salary", "1,000.00", ""]),
        cells(["Total", "", "1,000.00", ""]),
        cells(["05-Nov-2022", "Rent", "", "400.00"]),
    ];
    let tables = extract_tables_from_pdf(&ruled_statement(rows)).unwrap();
    let header = labels(&["Date", "Description", "Credit", "Debit"]);
    let selected = select_transaction_rows(&tables, &header, &ColumnMapping::canonical());
    assert_eq!(selected, vec![ExtractedRow::new("01-Nov-2022", "Salary", "1,000.00", "")]);
}

#[test]
fn test_bank_columns_are_projected_onto_canonical_order() {
    let table = DetectedTable {
        page: 1,
        bbox: ledgerlift::geo::Rect::new(0.0, 0.0, 100.0, 100.0),
        rows: vec![
            labels(&["Value Date", "Money Out", "Money In", "Details"]),
            labels(&["01/11/2022", "", "1,000.00", "Salary"]),
            labels(&["05/11/2022", "400.00", "", "Rent"]),
        ],
    };
    let header = labels(&["Value Date", "Money Out", "Money In", "Details"]);
    let mapping = ColumnMapping::from_aligned(&["Value Date", "Details", "Money In", "Money Out"]);

    let rows = select_transaction_rows(&[table], &header, &mapping);
    assert_eq!(
        rows,
        vec![
            ExtractedRow::new("01/11/2022", "Salary", "1,000.00", ""),
            ExtractedRow::new("05/11/2022", "Rent", "", "400.00"),
        ]
    );
}
