use ledgerlift::parse::{extract_fragments, Orientation};
use pretty_assertions::assert_eq;

use setup::*;

#[test]
fn test_fragments_follow_content_stream_order() {
    let layouts = extract_fragments(&create_statement_pdf()).unwrap();
    assert_eq!(layouts.len(), 1);
    let page = &layouts[0];
    assert_eq!(page.page_number, 1);
    assert_eq!(page.width, 595.0);
    assert_eq!(page.height, 842.0);

    let texts: Vec<&str> = page.fragments.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Sample Bank",
            "Customer copy",
            "Date",
            "Description",
            "Credit",
            "Debit",
            "03-Oct-2022",
            "Opening Balance",
            "",
            "",
            "12-Oct-2022",
            "Deposit interest",
            "0.64",
            "",
        ]
    );
    for (position, fragment) in page.fragments.iter().enumerate() {
        assert_eq!(fragment.index, position);
    }
}

#[test]
fn test_fragment_boxes_are_top_down() {
    let layouts = extract_fragments(&create_statement_pdf()).unwrap();
    let fragments = &layouts[0].fragments;

    let header = &fragments[2];
    assert_eq!(header.font_size, 10.0);
    // Courier glyphs are 600 units wide.
    assert!((header.bbox.x0 - 50.0).abs() < 0.01);
    assert!((header.bbox.width() - 24.0).abs() < 0.01);
    // Baseline 700 on an 842pt page, ascent 0.8 and descent 0.2 of the size.
    assert!((header.bbox.y0 - 134.0).abs() < 0.01);
    assert!((header.bbox.y1 - 144.0).abs() < 0.01);

    let first_row = &fragments[6];
    assert!(first_row.bbox.y0 > header.bbox.y1);
}

#[test]
fn test_empty_strings_keep_a_zero_width_fragment() {
    let layouts = extract_fragments(&create_statement_pdf()).unwrap();
    let empty = &layouts[0].fragments[8];
    assert_eq!(empty.text, "");
    assert_eq!(empty.bbox.width(), 0.0);
    assert!((empty.bbox.x0 - 380.0).abs() < 0.01);
}

#[test]
fn test_rulings_are_collected_from_stroked_lines() {
    let plain = extract_fragments(&create_statement_pdf()).unwrap();
    assert!(plain[0].rulings.is_empty());

    let config = StatementConfig {
        ruled: true,
        ..Default::default()
    };
    let ruled = extract_fragments(&create_statement_pdf_with_config(&config)).unwrap();
    let rulings = &ruled[0].rulings;
    let horizontal = rulings
        .iter()
        .filter(|r| r.orientation == Orientation::Horizontal)
        .count();
    let vertical = rulings
        .iter()
        .filter(|r| r.orientation == Orientation::Vertical)
        .count();
    // Header plus two rows: four horizontal rules, five column edges.
    assert_eq!(horizontal, 4);
    assert_eq!(vertical, 5);
    assert!(rulings
        .iter()
        .filter(|r| r.orientation == Orientation::Horizontal)
        .all(|r| r.y0 == r.y1 && (r.x0 - 45.0).abs() < 0.01));
}

#[test]
fn test_garbage_is_rejected() {
    assert!(extract_fragments(b"not a pdf").is_err());
}
