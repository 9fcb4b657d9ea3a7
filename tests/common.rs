#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use image::DynamicImage;
use ledgerlift::error::DocumentError;
use ledgerlift::geo::Rect;
use ledgerlift::parse::TextFragment;
use ledgerlift::render::{PageImage, PageRenderer};
use ledgerlift::{Oracle, OracleError, OracleRequest};

/// Which pipeline step an oracle request belongs to, recognised from its
/// prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Classify,
    DiscoverColumns,
    SwapColumns,
    VisionTable,
    Refine,
    Gambling,
}

impl CallKind {
    pub fn of(request: &OracleRequest) -> CallKind {
        let message = request.message.as_str();
        if message.contains("MAPPING GUIDE") {
            CallKind::Classify
        } else if message.contains("column names in the transactions table") {
            CallKind::DiscoverColumns
        } else if message.starts_with("LIST 1:") {
            CallKind::SwapColumns
        } else if message.starts_with("TRANSACTION DETAILS:") {
            CallKind::Refine
        } else if message.starts_with("TRANSACTIONS:") {
            CallKind::Gambling
        } else {
            CallKind::VisionTable
        }
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Answer(String),
    /// Fails with an API error carrying this status.
    Fail(u16),
}

/// Oracle double answering from per-step scripts. The last scripted answer
/// of a step repeats once its queue runs dry.
#[derive(Default)]
pub struct MockOracle {
    scripts: Mutex<HashMap<CallKind, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(CallKind, OracleRequest)>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, kind: CallKind, answer: impl Into<String>) -> Self {
        self.script(kind, Scripted::Answer(answer.into()))
    }

    pub fn fail(self, kind: CallKind, status: u16) -> Self {
        self.script(kind, Scripted::Fail(status))
    }

    pub fn script(self, kind: CallKind, step: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(step);
        self
    }

    pub fn calls(&self, kind: CallKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn requests(&self, kind: CallKind) -> Vec<OracleRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

impl Oracle for MockOracle {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let kind = CallKind::of(request);
        self.calls.lock().unwrap().push((kind, request.clone()));

        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&kind)
            .unwrap_or_else(|| panic!("no script for {kind:?}"));
        let step = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_else(|| panic!("empty script for {kind:?}"))
        };
        match step {
            Scripted::Answer(answer) => Ok(answer),
            Scripted::Fail(status) => Err(OracleError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
        }
    }
}

/// Renders blank pages so no native library is needed.
pub struct StubRenderer {
    pub pages: usize,
}

impl StubRenderer {
    pub fn new(pages: usize) -> Self {
        Self { pages }
    }
}

impl PageRenderer for StubRenderer {
    fn render(&self, _pdf: &[u8], limit: Option<usize>) -> Result<Vec<PageImage>, DocumentError> {
        let count = limit.map_or(self.pages, |l| l.min(self.pages));
        if count == 0 {
            return Err(DocumentError::NoPages);
        }
        Ok((0..count)
            .map(|i| PageImage::new(i, DynamicImage::new_rgb8(8, 8)))
            .collect())
    }
}

/// Lays fragments out as a table: one row per entry, fixed column x
/// positions, rows 20pt apart, six points per character.
pub fn table_fragments(rows: &[[&str; 4]]) -> Vec<TextFragment> {
    let xs = [50.0, 130.0, 380.0, 460.0];
    let mut fragments = Vec::new();
    for (r, row) in rows.iter().enumerate() {
        let top = 100.0 + 20.0 * r as f32;
        for (c, text) in row.iter().enumerate() {
            let x0 = xs[c];
            let bbox = Rect::new(x0, top, x0 + 6.0 * text.len() as f32, top + 10.0);
            fragments.push(TextFragment::new(fragments.len(), *text, bbox));
        }
    }
    fragments
}

pub const CANONICAL_HEADER: [&str; 4] = ["Date", "Description", "Credit", "Debit"];

pub fn canonical_columns_answer() -> String {
    r#"{"columns": ["Date", "Description", "Credit", "Debit"]}"#.to_string()
}
