use std::fmt;

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::{debug, trace};
use unicode_normalization::UnicodeNormalization;

use crate::geo::Rect;
use crate::logging::GRID_INFERENCE;
use crate::parse::TextFragment;

/// Default fuzzy score a fragment must exceed to be taken as a header.
pub const HEADER_MATCH_THRESHOLD: u8 = 80;

/// The four transaction fields every extraction path produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    Date,
    Description,
    Credit,
    Debit,
}

impl Column {
    pub const ALL: [Column; 4] = [
        Column::Date,
        Column::Description,
        Column::Credit,
        Column::Debit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Date => "Date",
            Column::Description => "Description",
            Column::Credit => "Credit",
            Column::Debit => "Debit",
        }
    }

    pub fn position(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bank's own header label for each canonical column. `None` means the
/// statement has no equivalent column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date: Option<String>,
    pub description: Option<String>,
    pub credit: Option<String>,
    pub debit: Option<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ColumnMapping {
    /// Labels identical to the canonical column names.
    pub fn canonical() -> Self {
        Self {
            date: Some(Column::Date.name().to_string()),
            description: Some(Column::Description.name().to_string()),
            credit: Some(Column::Credit.name().to_string()),
            debit: Some(Column::Debit.name().to_string()),
        }
    }

    /// Builds a mapping from a list aligned positionally with
    /// `[Date, Description, Credit, Debit]`. Blank entries become `None`.
    pub fn from_aligned<S: AsRef<str>>(labels: &[S]) -> Self {
        let label = |i: usize| {
            labels
                .get(i)
                .map(|s| s.as_ref().trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            date: label(0),
            description: label(1),
            credit: label(2),
            debit: label(3),
        }
    }

    pub fn label(&self, column: Column) -> Option<&str> {
        match column {
            Column::Date => self.date.as_deref(),
            Column::Description => self.description.as_deref(),
            Column::Credit => self.credit.as_deref(),
            Column::Debit => self.debit.as_deref(),
        }
    }

    /// Label to search for: the bank's own, or the canonical name.
    pub fn target(&self, column: Column) -> &str {
        self.label(column).unwrap_or(column.name())
    }

    /// The mapped labels in canonical order, skipping unmapped columns.
    pub fn labels(&self) -> Vec<&str> {
        Column::ALL.iter().filter_map(|c| self.label(*c)).collect()
    }
}

/// Where a column's header sits on the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeaderHit {
    pub index: usize,
    pub bbox: Rect,
}

/// Header positions for one page. Any column may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderBinding {
    pub date: Option<HeaderHit>,
    pub description: Option<HeaderHit>,
    pub credit: Option<HeaderHit>,
    pub debit: Option<HeaderHit>,
}

impl HeaderBinding {
    pub fn get(&self, column: Column) -> Option<&HeaderHit> {
        self.slot(column).as_ref()
    }

    fn slot(&self, column: Column) -> &Option<HeaderHit> {
        match column {
            Column::Date => &self.date,
            Column::Description => &self.description,
            Column::Credit => &self.credit,
            Column::Debit => &self.debit,
        }
    }

    fn slot_mut(&mut self, column: Column) -> &mut Option<HeaderHit> {
        match column {
            Column::Date => &mut self.date,
            Column::Description => &mut self.description,
            Column::Credit => &mut self.credit,
            Column::Debit => &mut self.debit,
        }
    }

    pub fn is_bound(&self, column: Column) -> bool {
        self.slot(column).is_some()
    }

    pub fn is_empty(&self) -> bool {
        Column::ALL.iter().all(|c| !self.is_bound(*c))
    }

    /// Bound columns ordered by header fragment index.
    pub fn ordered(&self) -> Vec<(Column, HeaderHit)> {
        let mut bound: Vec<(Column, HeaderHit)> = Column::ALL
            .iter()
            .filter_map(|c| self.get(*c).map(|hit| (*c, *hit)))
            .collect();
        bound.sort_by_key(|(_, hit)| hit.index);
        bound
    }

    /// Index of the last header fragment, if any header was found.
    pub fn last_index(&self) -> Option<usize> {
        Column::ALL
            .iter()
            .filter_map(|c| self.get(*c).map(|hit| hit.index))
            .max()
    }
}

fn normalize(text: &str) -> Vec<char> {
    text.nfkc().flat_map(char::to_lowercase).collect::<String>().trim().chars().collect()
}

/// Fuzzy partial-match score in `0..=100`: the best normalised edit
/// similarity between the shorter string and any equally long window of the
/// longer one. Case-insensitive.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0;
    }

    let needle: String = short.iter().collect();
    let best = long
        .windows(short.len())
        .map(|window| normalized_levenshtein(&needle, &window.iter().collect::<String>()))
        .fold(0.0_f64, f64::max);
    (best * 100.0).round() as u8
}

/// Finds each column's header among `fragments`, in fragment order. A
/// fragment binds to the first still-unbound column whose target label it
/// matches with a score above `threshold`; bound columns are never rebound.
pub fn find_headers(
    fragments: &[TextFragment],
    mapping: &ColumnMapping,
    threshold: u8,
) -> HeaderBinding {
    let mut binding = HeaderBinding::default();

    for fragment in fragments {
        if fragment.text.trim().is_empty() {
            continue;
        }
        let hit = Column::ALL.iter().copied().find(|column| {
            if binding.is_bound(*column) {
                return false;
            }
            let score = partial_ratio(mapping.target(*column), &fragment.text);
            trace!(target: GRID_INFERENCE, %column, score, text = %fragment.text, "header score");
            score > threshold
        });
        if let Some(column) = hit {
            debug!(
                target: GRID_INFERENCE,
                %column,
                index = fragment.index,
                text = %fragment.text,
                "bound header"
            );
            *binding.slot_mut(column) = Some(HeaderHit {
                index: fragment.index,
                bbox: fragment.bbox,
            });
        }
        if Column::ALL.iter().all(|c| binding.is_bound(*c)) {
            break;
        }
    }

    binding
}
