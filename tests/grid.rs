use ledgerlift::extract::{extract_rows, ExtractedRow};
use ledgerlift::grid::{find_stride, infer_grid, GridInference, NoGridReason};
use ledgerlift::headers::{find_headers, Column, ColumnMapping, HEADER_MATCH_THRESHOLD};
use ledgerlift::normalize::TransactionTable;
use ledgerlift::parse::extract_fragments;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

mod common;

use common::*;

fn statement_rows() -> Vec<[&'static str; 4]> {
    vec![
        CANONICAL_HEADER,
        ["03-Oct-2022", "Opening Balance", "", ""],
        ["12-Oct-2022", "Deposit interest", "0.64", ""],
    ]
}

#[test]
fn test_stride_over_two_dated_rows() {
    let fragments = table_fragments(&statement_rows());
    let scan = find_stride(&fragments, 4).unwrap();
    assert_eq!(scan.first_date_index, 4);
    assert_eq!(scan.stride, 4);
    assert_eq!(scan.last_date_index, 8);
    assert_eq!(scan.row_count(), 2);
}

#[test]
fn test_single_dated_row_has_no_grid() {
    let fragments = table_fragments(&statement_rows()[..2]);
    assert_eq!(find_stride(&fragments, 4), Err(NoGridReason::NoSecondDate));
}

#[test]
fn test_grid_rows_extract_and_normalise() {
    let fragments = table_fragments(&statement_rows());
    let headers = find_headers(&fragments, &ColumnMapping::canonical(), HEADER_MATCH_THRESHOLD);
    for column in Column::ALL {
        assert!(headers.is_bound(column), "{column} not bound");
    }

    let GridInference::Grid(grid) = infer_grid(&fragments, &headers) else {
        panic!("expected a grid");
    };
    assert_eq!(grid.rows.len(), 2);

    let rows = extract_rows(&fragments, &grid.rows);
    assert_eq!(
        rows,
        vec![
            ExtractedRow::new("03-Oct-2022", "Opening Balance", "", ""),
            ExtractedRow::new("12-Oct-2022", "Deposit interest", "0.64", ""),
        ]
    );

    let table = TransactionTable::from_rows(&rows, 2022);
    let interest = &table.transactions[1];
    assert_eq!(interest.credit, Decimal::new(64, 2));
    assert_eq!(interest.debit, Decimal::ZERO);
}

#[test]
fn test_no_headers_means_no_grid() {
    let fragments = table_fragments(&statement_rows()[1..]);
    let headers = find_headers(&fragments, &ColumnMapping::canonical(), HEADER_MATCH_THRESHOLD);
    assert!(headers.is_empty());
    assert!(matches!(
        infer_grid(&fragments, &headers),
        GridInference::NoGrid(NoGridReason::NoHeaders)
    ));
}

#[test]
fn test_bank_specific_labels_bind_through_mapping() {
    let rows = vec![
        ["Txn Date", "Narration", "Money In", "Money Out"],
        ["01/11/2022", "Salary", "1,000.00", ""],
        ["05/11/2022", "Rent", "", "400.00"],
    ];
    let fragments = table_fragments(&rows);
    let mapping = ColumnMapping::from_aligned(&["Txn Date", "Narration", "Money In", "Money Out"]);
    let headers = find_headers(&fragments, &mapping, HEADER_MATCH_THRESHOLD);

    let GridInference::Grid(grid) = infer_grid(&fragments, &headers) else {
        panic!("expected a grid");
    };
    let extracted = extract_rows(&fragments, &grid.rows);
    assert_eq!(extracted[0].get(Column::Credit), Some("1,000.00"));
    assert_eq!(extracted[1].get(Column::Debit), Some("400.00"));
    assert_eq!(extracted[1].get(Column::Description), Some("Rent"));
}

#[test]
fn test_grid_from_generated_pdf() {
    let layouts = extract_fragments(&setup::create_statement_pdf()).unwrap();
    let fragments = &layouts[0].fragments;
    let headers = find_headers(fragments, &ColumnMapping::canonical(), HEADER_MATCH_THRESHOLD);
    assert_eq!(headers.last_index(), Some(5));

    let GridInference::Grid(grid) = infer_grid(fragments, &headers) else {
        panic!("expected a grid");
    };
    assert_eq!(grid.scan.first_date_index, 6);
    assert_eq!(grid.scan.stride, 4);

    let rows = extract_rows(fragments, &grid.rows);
    assert_eq!(
        rows,
        vec![
            ExtractedRow::new("03-Oct-2022", "Opening Balance", "", ""),
            ExtractedRow::new("12-Oct-2022", "Deposit interest", "0.64", ""),
        ]
    );
}

#[test]
fn test_unbound_column_between_date_and_description() {
    let xs = [50.0, 130.0, 190.0, 380.0, 460.0];
    let rows = [
        ["Date", "Ref", "Description", "Credit", "Debit"],
        ["03-Oct-2022", "R001", "Opening Balance", "", ""],
        ["12-Oct-2022", "R002", "Deposit interest", "0.64", ""],
    ];
    let mut fragments = Vec::new();
    for (r, row) in rows.iter().enumerate() {
        let top = 100.0 + 20.0 * r as f32;
        for (c, text) in row.iter().enumerate() {
            let bbox = ledgerlift::geo::Rect::new(xs[c], top, xs[c] + 6.0 * text.len() as f32, top + 10.0);
            fragments.push(ledgerlift::parse::TextFragment::new(fragments.len(), *text, bbox));
        }
    }

    let headers = find_headers(&fragments, &ColumnMapping::canonical(), HEADER_MATCH_THRESHOLD);
    assert_eq!(headers.get(Column::Description).map(|h| h.index), Some(2));

    let GridInference::Grid(grid) = infer_grid(&fragments, &headers) else {
        panic!("expected a grid");
    };
    assert_eq!(grid.scan.stride, 5);
    assert_eq!(
        extract_rows(&fragments, &grid.rows),
        vec![
            ExtractedRow::new("03-Oct-2022", "Opening Balance", "", ""),
            ExtractedRow::new("12-Oct-2022", "Deposit interest", "0.64", ""),
        ]
    );
}
