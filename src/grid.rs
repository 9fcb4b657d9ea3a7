//! Grid inference for statements whose transaction table has no usable
//! ruling lines.
//!
//! A transaction row is assumed to occupy a fixed number of consecutive
//! fragments (the stride) and to start with its date. Rows with multi-line
//! descriptions break that assumption and will come out misaligned.
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::dates::looks_like_date;
use crate::geo::Rect;
use crate::headers::{Column, HeaderBinding};
use crate::logging::GRID_INFERENCE;
use crate::parse::TextFragment;

/// Added to a Credit/Debit header's width.
const AMOUNT_WIDTH_ALLOWANCE: f32 = 4.0;
/// Credit/Debit cells start this far left of their header.
const AMOUNT_LEFT_SHIFT: f32 = 2.0;
/// Description cells stop this far short of the next column.
const DESCRIPTION_RIGHT_INSET: f32 = 2.0;
/// Keeps a Date cell from touching the fragment that follows it.
const DATE_RIGHT_EPSILON: f32 = 1e-3;

/// Row structure recovered from the fragment sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrideScan {
    pub first_date_index: usize,
    pub stride: usize,
    pub last_date_index: usize,
}

impl StrideScan {
    pub fn row_count(&self) -> usize {
        (self.last_date_index - self.first_date_index) / self.stride + 1
    }

    /// Fragment index of each row's date.
    pub fn date_indices(&self) -> impl Iterator<Item = usize> {
        (self.first_date_index..=self.last_date_index).step_by(self.stride)
    }
}

/// Why a page could not be grid-processed. Not an error: the caller is
/// expected to fall back to another extraction path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoGridReason {
    NoHeaders,
    NoDate,
    NoSecondDate,
}

impl fmt::Display for NoGridReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            NoGridReason::NoHeaders => "no column headers found",
            NoGridReason::NoDate => "no date after the header row",
            NoGridReason::NoSecondDate => "only one date, row stride undetermined",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub column: Column,
    pub bbox: Rect,
}

/// One transaction row's cells, in on-page column order. Columns whose
/// header is missing have no cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub cells: SmallVec<[GridCell; 4]>,
}

impl GridRow {
    pub fn cell(&self, column: Column) -> Option<&GridCell> {
        self.cells.iter().find(|c| c.column == column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub scan: StrideScan,
    pub rows: Vec<GridRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridInference {
    Grid(Grid),
    NoGrid(NoGridReason),
}

fn is_date_at(fragments: &[TextFragment], index: usize) -> bool {
    fragments
        .get(index)
        .is_some_and(|f| looks_like_date(&f.text))
}

/// Scans from `start` for the first date fragment, then the next one to get
/// the stride, then walks forward in stride steps while the slot still holds
/// a date.
pub fn find_stride(fragments: &[TextFragment], start: usize) -> Result<StrideScan, NoGridReason> {
    let first_date_index = (start..fragments.len())
        .find(|&i| is_date_at(fragments, i))
        .ok_or(NoGridReason::NoDate)?;

    let stride = (first_date_index + 1..fragments.len())
        .find(|&i| is_date_at(fragments, i))
        .map(|i| i - first_date_index)
        .ok_or(NoGridReason::NoSecondDate)?;

    let last_date_index = (first_date_index..fragments.len())
        .step_by(stride)
        .take_while(|&i| is_date_at(fragments, i))
        .last()
        .unwrap_or(first_date_index);

    Ok(StrideScan {
        first_date_index,
        stride,
        last_date_index,
    })
}

/// On-page column order: bound headers by index, with Date leading when its
/// header was not found.
fn column_order(headers: &HeaderBinding) -> Vec<Column> {
    let mut order: Vec<Column> = headers.ordered().into_iter().map(|(c, _)| c).collect();
    if !headers.is_bound(Column::Date) {
        order.insert(0, Column::Date);
    }
    order
}

/// Credit and Debit share one width, taken from whichever header sits
/// further left. Returns `(left, right)` per column.
fn amount_extents(headers: &HeaderBinding) -> [Option<(f32, f32)>; 2] {
    let credit = headers.credit.map(|h| h.bbox);
    let debit = headers.debit.map(|h| h.bbox);
    let width = match (credit, debit) {
        (Some(c), Some(d)) if d.x0 < c.x0 => d.width(),
        (Some(c), _) => c.width(),
        (None, Some(d)) => d.width(),
        (None, None) => return [None, None],
    } + AMOUNT_WIDTH_ALLOWANCE;

    let extent = |bbox: Rect| {
        let left = bbox.x0 - AMOUNT_LEFT_SHIFT;
        (left, left + width)
    };
    [credit.map(extent), debit.map(extent)]
}

/// Builds cell rectangles for every row of `scan`.
///
/// Date and Description take their horizontal extent from the first data
/// row: the column's own fragment gives the left edge and the fragment that
/// follows it the right edge. The column's fragment sits as far from the
/// date fragment as its header sits from the Date header. Each row's vertical extent is its date
/// fragment's.
pub fn define_grid(
    fragments: &[TextFragment],
    scan: &StrideScan,
    headers: &HeaderBinding,
) -> Vec<GridRow> {
    let order = column_order(headers);
    let rank = |column: Column| order.iter().position(|c| *c == column);

    // Offset of a column's fragment from the date fragment within one row.
    // Header indices count columns nobody binds (reference numbers, value
    // dates); ranks among bound headers are only used when Date has no header.
    let offset_from_date = |column: Column| -> Option<isize> {
        match (headers.get(Column::Date), headers.get(column)) {
            (Some(date), Some(hit)) => Some(hit.index as isize - date.index as isize),
            _ => Some(rank(column)? as isize - rank(Column::Date)? as isize),
        }
    };

    let header_extent = |column: Column| headers.get(column).map(|h| (h.bbox.x0, h.bbox.x1));
    let anchored = |column: Column, right_inset: f32| -> Option<(f32, f32)> {
        let anchor = usize::try_from(scan.first_date_index as isize + offset_from_date(column)?).ok()?;
        let fragment = fragments.get(anchor)?;
        let right = fragments
            .get(anchor + 1)
            .map(|next| next.bbox.x0 - right_inset)
            .unwrap_or(fragment.bbox.x1);
        Some((fragment.bbox.x0, right.max(fragment.bbox.x0)))
    };

    let date_extent = anchored(Column::Date, DATE_RIGHT_EPSILON).or_else(|| header_extent(Column::Date));
    let description_extent = if headers.is_bound(Column::Description) {
        anchored(Column::Description, DESCRIPTION_RIGHT_INSET)
            .or_else(|| header_extent(Column::Description))
    } else {
        None
    };
    let [credit_extent, debit_extent] = amount_extents(headers);

    let extent_of = |column: Column| match column {
        Column::Date => date_extent,
        Column::Description => description_extent,
        Column::Credit => credit_extent,
        Column::Debit => debit_extent,
    };

    let rows: Vec<GridRow> = scan
        .date_indices()
        .filter_map(|i| fragments.get(i))
        .map(|date_fragment| {
            let (top, bottom) = (date_fragment.bbox.y0, date_fragment.bbox.y1);
            let cells = order
                .iter()
                .filter_map(|column| {
                    extent_of(*column).map(|(left, right)| GridCell {
                        column: *column,
                        bbox: Rect::new(left, top, right, bottom),
                    })
                })
                .collect();
            GridRow { cells }
        })
        .collect();

    debug!(
        target: GRID_INFERENCE,
        rows = rows.len(),
        columns = ?order,
        "defined grid"
    );
    rows
}

/// Runs stride detection after the header row and builds the grid.
pub fn infer_grid(fragments: &[TextFragment], headers: &HeaderBinding) -> GridInference {
    let Some(last_header) = headers.last_index() else {
        return GridInference::NoGrid(NoGridReason::NoHeaders);
    };

    match find_stride(fragments, last_header + 1) {
        Ok(scan) => {
            info!(
                target: GRID_INFERENCE,
                first = scan.first_date_index,
                stride = scan.stride,
                last = scan.last_date_index,
                rows = scan.row_count(),
                "stride detected"
            );
            let rows = define_grid(fragments, &scan, headers);
            GridInference::Grid(Grid { scan, rows })
        }
        Err(reason) => {
            debug!(target: GRID_INFERENCE, %reason, "no grid");
            GridInference::NoGrid(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(start: usize, y: f32, texts: &[&str]) -> Vec<TextFragment> {
        let xs = [10.0, 90.0, 300.0, 380.0];
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let x0 = xs[i];
                let x1 = if t.is_empty() { x0 } else { x0 + 6.0 * t.len() as f32 };
                TextFragment::new(start + i, *t, Rect::new(x0, y, x1, y + 10.0))
            })
            .collect()
    }

    #[test]
    fn stride_spans_rows_of_equal_width() {
        let mut fragments = row(0, 100.0, &["Date", "Description", "Credit", "Debit"]);
        fragments.extend(row(4, 120.0, &["03-Oct-2022", "Opening Balance", "", ""]));
        fragments.extend(row(8, 140.0, &["12-Oct-2022", "Deposit interest", "0.64", ""]));
        fragments.extend(row(12, 160.0, &["13-Oct-2022", "Transfer", "", "5.00"]));

        let scan = find_stride(&fragments, 4).unwrap();
        assert_eq!(
            scan,
            StrideScan {
                first_date_index: 4,
                stride: 4,
                last_date_index: 12
            }
        );
        assert_eq!(scan.row_count(), 3);
    }

    #[test]
    fn walk_stops_at_first_slot_without_a_date() {
        let mut fragments = row(0, 100.0, &["01/02/2023", "a", "1.00", ""]);
        fragments.extend(row(4, 120.0, &["02/02/2023", "b", "2.00", ""]));
        fragments.extend(row(8, 140.0, &["Closing", "c", "", ""]));
        fragments.extend(row(12, 160.0, &["04/02/2023", "d", "", ""]));
        let scan = find_stride(&fragments, 0).unwrap();
        assert_eq!(scan.last_date_index, 4);
    }

    #[test]
    fn single_date_has_no_stride() {
        let fragments = row(0, 100.0, &["Date", "03-Oct-2022", "x", "y"]);
        assert_eq!(find_stride(&fragments, 1), Err(NoGridReason::NoSecondDate));
        assert_eq!(find_stride(&fragments, 2), Err(NoGridReason::NoDate));
    }

    #[test]
    fn no_headers_means_no_grid() {
        let fragments = row(0, 100.0, &["03-Oct-2022", "a", "", ""]);
        assert_eq!(
            infer_grid(&fragments, &HeaderBinding::default()),
            GridInference::NoGrid(NoGridReason::NoHeaders)
        );
    }

    #[test]
    fn amount_columns_share_the_leftmost_width() {
        let headers = HeaderBinding {
            credit: Some(crate::headers::HeaderHit {
                index: 3,
                bbox: Rect::new(380.0, 100.0, 410.0, 110.0),
            }),
            debit: Some(crate::headers::HeaderHit {
                index: 2,
                bbox: Rect::new(300.0, 100.0, 350.0, 110.0),
            }),
            ..Default::default()
        };
        let [credit, debit] = amount_extents(&headers);
        assert_eq!(debit, Some((298.0, 352.0)));
        assert_eq!(credit, Some((378.0, 432.0)));
    }

    #[test]
    fn missing_amount_header_skips_that_column() {
        let mut fragments = row(0, 100.0, &["Date", "Description", "Credit", "Balance"]);
        fragments.extend(row(4, 120.0, &["03-Oct-2022", "Opening", "", "10.00"]));
        fragments.extend(row(8, 140.0, &["04-Oct-2022", "Interest", "0.64", "10.64"]));
        let headers = crate::headers::find_headers(
            &fragments[..4],
            &crate::headers::ColumnMapping::canonical(),
            80,
        );
        let GridInference::Grid(grid) = infer_grid(&fragments, &headers) else {
            panic!("expected a grid");
        };
        assert_eq!(grid.rows.len(), 2);
        let columns: Vec<Column> = grid.rows[0].cells.iter().map(|c| c.column).collect();
        assert_eq!(columns, vec![Column::Date, Column::Description, Column::Credit]);
        assert!(grid.rows[1].cell(Column::Debit).is_none());
    }
}
