//! Native table detection from ruling lines, and selection of transaction
//! rows from the detected tables.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dates::looks_like_date;
use crate::error::DocumentError;
use crate::extract::ExtractedRow;
use crate::geo::Rect;
use crate::headers::{Column, ColumnMapping};
use crate::logging::{GRID_INFERENCE, PDF_PARSING};
use crate::parse::{extract_fragments, Orientation, PageLayout, Ruling, TextFragment};

/// Rulings whose positions differ by less than this are the same line.
const SNAP_TOLERANCE: f32 = 3.0;
/// Collinear segments separated by less than this are joined.
const JOIN_TOLERANCE: f32 = 3.0;
/// Slack when testing whether a horizontal and a vertical ruling cross.
const INTERSECTION_TOLERANCE: f32 = 3.0;
/// Shorter rulings are ignored (underlines, tick marks).
const MIN_RULING_LENGTH: f32 = 3.0;

/// A ruled table found on a page. `rows` holds cell text row by row; cells
/// with no text are empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTable {
    /// 1-based page number.
    pub page: u32,
    pub bbox: Rect,
    pub rows: Vec<Vec<String>>,
}

/// Parses the PDF and returns every ruled table on every page.
pub fn extract_tables_from_pdf(bytes: &[u8]) -> Result<Vec<DetectedTable>, DocumentError> {
    let layouts = extract_fragments(bytes)?;
    Ok(extract_tables(&layouts))
}

pub fn extract_tables(layouts: &[PageLayout]) -> Vec<DetectedTable> {
    let tables: Vec<DetectedTable> = layouts.iter().flat_map(find_tables_on_page).collect();
    debug!(target: PDF_PARSING, tables = tables.len(), "detected ruled tables");
    tables
}

fn length(r: &Ruling) -> f32 {
    match r.orientation {
        Orientation::Horizontal => r.x1 - r.x0,
        Orientation::Vertical => r.y1 - r.y0,
    }
}

/// Normalises endpoints so `x0 <= x1` and `y0 <= y1`.
fn ordered(r: &Ruling) -> Ruling {
    Ruling {
        orientation: r.orientation,
        x0: r.x0.min(r.x1),
        y0: r.y0.min(r.y1),
        x1: r.x0.max(r.x1),
        y1: r.y0.max(r.y1),
    }
}

/// Groups values lying within `tolerance` of their neighbour and replaces
/// each with its group's mean.
fn cluster(values: &[f32], tolerance: f32) -> Vec<f32> {
    let mut sorted: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut snapped = vec![0.0; values.len()];
    let mut group: Vec<usize> = Vec::new();
    let mut last = f32::NEG_INFINITY;
    let flush = |group: &mut Vec<usize>, snapped: &mut Vec<f32>| {
        if group.is_empty() {
            return;
        }
        let mean = group.iter().map(|&i| values[i]).sum::<f32>() / group.len() as f32;
        for &i in group.iter() {
            snapped[i] = mean;
        }
        group.clear();
    };
    for (i, v) in sorted {
        if v - last > tolerance {
            flush(&mut group, &mut snapped);
        }
        group.push(i);
        last = v;
    }
    flush(&mut group, &mut snapped);
    snapped
}

/// Snaps near-coincident rulings onto one line, then joins collinear
/// segments that touch or nearly touch.
fn merge_rulings(rulings: &[Ruling]) -> Vec<Ruling> {
    let mut merged = Vec::new();
    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
        let mut group: Vec<Ruling> = rulings
            .iter()
            .filter(|r| r.orientation == orientation)
            .map(ordered)
            .collect();

        let positions: Vec<f32> = group
            .iter()
            .map(|r| match orientation {
                Orientation::Horizontal => r.y0,
                Orientation::Vertical => r.x0,
            })
            .collect();
        for (r, p) in group.iter_mut().zip(cluster(&positions, SNAP_TOLERANCE)) {
            match orientation {
                Orientation::Horizontal => {
                    r.y0 = p;
                    r.y1 = p;
                }
                Orientation::Vertical => {
                    r.x0 = p;
                    r.x1 = p;
                }
            }
        }

        // Sort along the line so joinable segments are adjacent.
        let key = |r: &Ruling| match orientation {
            Orientation::Horizontal => (r.y0, r.x0),
            Orientation::Vertical => (r.x0, r.y0),
        };
        group.sort_by(|a, b| {
            let (ka, kb) = (key(a), key(b));
            ka.0.total_cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
        });

        let mut current: Option<Ruling> = None;
        for r in group {
            current = match current {
                Some(mut c) if key(&c).0 == key(&r).0 => match orientation {
                    Orientation::Horizontal if r.x0 <= c.x1 + JOIN_TOLERANCE => {
                        c.x1 = c.x1.max(r.x1);
                        Some(c)
                    }
                    Orientation::Vertical if r.y0 <= c.y1 + JOIN_TOLERANCE => {
                        c.y1 = c.y1.max(r.y1);
                        Some(c)
                    }
                    _ => {
                        merged.push(c);
                        Some(r)
                    }
                },
                Some(c) => {
                    merged.push(c);
                    Some(r)
                }
                None => Some(r),
            };
        }
        merged.extend(current);
    }
    merged.retain(|r| length(r) >= MIN_RULING_LENGTH);
    merged
}

fn crosses(h: &Ruling, v: &Ruling) -> bool {
    v.x0 >= h.x0 - INTERSECTION_TOLERANCE
        && v.x0 <= h.x1 + INTERSECTION_TOLERANCE
        && h.y0 >= v.y0 - INTERSECTION_TOLERANCE
        && h.y0 <= v.y1 + INTERSECTION_TOLERANCE
}

fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    let mut node = i;
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

/// Sorted distinct coordinates, collapsing values closer than the snap
/// tolerance.
fn distinct(mut values: Vec<f32>) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    values.dedup_by(|b, a| (*b - *a).abs() < SNAP_TOLERANCE);
    values
}

fn cell_text(fragments: &[TextFragment], cell: &Rect) -> String {
    fragments
        .iter()
        .filter(|f| {
            let (x, y) = f.bbox.center();
            cell.contains_point(x, y)
        })
        .map(|f| f.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_tables_on_page(layout: &PageLayout) -> Vec<DetectedTable> {
    let rulings = merge_rulings(&layout.rulings);
    if rulings.is_empty() {
        return Vec::new();
    }

    let mut parent: Vec<usize> = (0..rulings.len()).collect();
    for (i, a) in rulings.iter().enumerate() {
        for (j, b) in rulings.iter().enumerate().skip(i + 1) {
            let touching = match (a.orientation, b.orientation) {
                (Orientation::Horizontal, Orientation::Vertical) => crosses(a, b),
                (Orientation::Vertical, Orientation::Horizontal) => crosses(b, a),
                _ => false,
            };
            if touching {
                let (ra, rb) = (find(&mut parent, i), find(&mut parent, j));
                parent[ra] = rb;
            }
        }
    }

    let mut groups: Vec<(usize, Vec<&Ruling>)> = Vec::new();
    for i in 0..rulings.len() {
        let root = find(&mut parent, i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(&rulings[i]),
            None => groups.push((root, vec![&rulings[i]])),
        }
    }

    let mut tables = Vec::new();
    for (_, members) in groups {
        let ys = distinct(
            members
                .iter()
                .filter(|r| r.orientation == Orientation::Horizontal)
                .map(|r| r.y0)
                .collect(),
        );
        let xs = distinct(
            members
                .iter()
                .filter(|r| r.orientation == Orientation::Vertical)
                .map(|r| r.x0)
                .collect(),
        );
        if xs.len() < 2 || ys.len() < 2 {
            continue;
        }

        let bbox = Rect::new(xs[0], ys[0], xs[xs.len() - 1], ys[ys.len() - 1]);
        let rows: Vec<Vec<String>> = ys
            .windows(2)
            .map(|y| {
                xs.windows(2)
                    .map(|x| cell_text(&layout.fragments, &Rect::new(x[0], y[0], x[1], y[1])))
                    .collect::<Vec<_>>()
            })
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();
        if rows.is_empty() {
            continue;
        }
        debug!(
            target: PDF_PARSING,
            page = layout.page_number,
            rows = rows.len(),
            columns = xs.len() - 1,
            "found ruled table"
        );
        tables.push(DetectedTable {
            page: layout.page_number,
            bbox,
            rows,
        });
    }
    tables
}

fn same_header_set(row: &[String], header_columns: &[String]) -> bool {
    let normalise = |cells: &[String]| {
        let mut cells: Vec<String> = cells.iter().map(|c| c.trim().to_lowercase()).collect();
        cells.sort();
        cells
    };
    row.len() >= header_columns.len()
        && normalise(&row[..header_columns.len()]) == normalise(header_columns)
}

/// Picks transaction rows out of detected tables and projects them onto the
/// canonical columns.
///
/// `header_columns` is the statement's own header list in on-page order and
/// `mapping` says which of those labels is which canonical column. Within
/// each table the header row is the first whose leading cells are exactly
/// the header labels (in any order). Rows after it are kept while their date
/// cell holds a date; the first row that does not ends the table. Tables
/// without a recognisable header row keep every dated row.
pub fn select_transaction_rows(
    tables: &[DetectedTable],
    header_columns: &[String],
    mapping: &ColumnMapping,
) -> Vec<ExtractedRow> {
    let position_of = |column: Column| -> Option<usize> {
        if header_columns.is_empty() {
            return Some(column.position());
        }
        let label = mapping.label(column)?.trim().to_lowercase();
        header_columns
            .iter()
            .position(|h| h.trim().to_lowercase() == label)
    };
    let date_position = position_of(Column::Date).unwrap_or(0);
    let min_cells = header_columns.len().max(date_position + 1);

    let mut selected = Vec::new();
    for table in tables {
        let header_index = if header_columns.is_empty() {
            None
        } else {
            table
                .rows
                .iter()
                .position(|row| same_header_set(row, header_columns))
        };
        let data_start = header_index.map_or(0, |i| i + 1);

        let mut kept = 0;
        for row in &table.rows[data_start..] {
            let is_transaction =
                row.len() >= min_cells && looks_like_date(&row[date_position]);
            if !is_transaction {
                if header_index.is_some() {
                    break;
                }
                continue;
            }
            let mut extracted = ExtractedRow::default();
            for column in Column::ALL {
                if let Some(cell) = position_of(column).and_then(|p| row.get(p)) {
                    extracted.set(column, cell.as_str());
                }
            }
            selected.push(extracted);
            kept += 1;
        }
        debug!(
            target: GRID_INFERENCE,
            page = table.page,
            header_row = ?header_index,
            kept,
            "selected table rows"
        );
    }
    selected
}
