use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::Rect;
use crate::grid::GridRow;
use crate::headers::Column;
use crate::logging::GRID_INFERENCE;
use crate::parse::TextFragment;
use crate::search_index::FragmentIndex;

/// Raw text of one transaction row. `None` means the column had no cell;
/// an empty string means the cell was there but held no text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRow {
    pub date: Option<String>,
    pub description: Option<String>,
    pub credit: Option<String>,
    pub debit: Option<String>,
}

impl ExtractedRow {
    pub fn new(
        date: impl Into<String>,
        description: impl Into<String>,
        credit: impl Into<String>,
        debit: impl Into<String>,
    ) -> Self {
        Self {
            date: Some(date.into()),
            description: Some(description.into()),
            credit: Some(credit.into()),
            debit: Some(debit.into()),
        }
    }

    pub fn get(&self, column: Column) -> Option<&str> {
        match column {
            Column::Date => self.date.as_deref(),
            Column::Description => self.description.as_deref(),
            Column::Credit => self.credit.as_deref(),
            Column::Debit => self.debit.as_deref(),
        }
    }

    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        let value = Some(value.into());
        match column {
            Column::Date => self.date = value,
            Column::Description => self.description = value,
            Column::Credit => self.credit = value,
            Column::Debit => self.debit = value,
        }
    }

    /// Values in canonical column order, absent columns as empty strings.
    pub fn values(&self) -> [&str; 4] {
        Column::ALL.map(|c| self.get(c).unwrap_or_default())
    }
}

/// Text inside `area`: every overlapping fragment in fragment order, joined
/// with single spaces and trimmed.
pub fn text_in(index: &FragmentIndex<'_>, area: &Rect) -> String {
    index
        .overlapping(area)
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Fills every grid cell with the text of the fragments overlapping it.
pub fn extract_rows(fragments: &[TextFragment], grid: &[GridRow]) -> Vec<ExtractedRow> {
    let index = FragmentIndex::new(fragments);
    let rows: Vec<ExtractedRow> = grid
        .iter()
        .map(|grid_row| {
            let mut row = ExtractedRow::default();
            for cell in &grid_row.cells {
                row.set(cell.column, text_in(&index, &cell.bbox));
            }
            row
        })
        .collect();
    debug!(target: GRID_INFERENCE, rows = rows.len(), "extracted rows from grid");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridCell;
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;

    #[test]
    fn joins_overlapping_fragments_in_order() {
        let fragments = vec![
            TextFragment::new(0, "Deposit", Rect::new(90.0, 100.0, 130.0, 110.0)),
            TextFragment::new(1, "interest ", Rect::new(132.0, 100.0, 180.0, 110.0)),
            TextFragment::new(2, "0.64", Rect::new(300.0, 100.0, 320.0, 110.0)),
        ];
        let grid = vec![GridRow {
            cells: smallvec![
                GridCell {
                    column: Column::Description,
                    bbox: Rect::new(90.0, 100.0, 250.0, 110.0),
                },
                GridCell {
                    column: Column::Debit,
                    bbox: Rect::new(400.0, 100.0, 450.0, 110.0),
                },
            ],
        }];

        let rows = extract_rows(&fragments, &grid);
        assert_eq!(
            rows,
            vec![ExtractedRow {
                date: None,
                description: Some("Deposit interest".to_string()),
                credit: None,
                debit: Some(String::new()),
            }]
        );
        assert_eq!(rows[0].values(), ["", "Deposit interest", "", ""]);
    }
}
