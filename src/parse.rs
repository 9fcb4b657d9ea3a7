use std::collections::BTreeMap;
use std::fmt;

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::DocumentError;
use crate::geo::Rect;
use crate::logging::{PDF_OPERATIONS, PDF_PARSING};

/// Fraction of the font size above the baseline covered by a span box.
const ASCENT: f32 = 0.8;
/// Fraction of the font size below the baseline covered by a span box.
const DESCENT: f32 = -0.2;
/// TJ adjustments beyond this many thousandths of an em read as a word gap.
const WORD_GAP_ADJUSTMENT: f32 = 250.0;
/// Filled rectangles thinner than this are rulings rather than shading.
const RULING_THICKNESS: f32 = 2.0;
const AXIS_TOLERANCE: f32 = 1.0;
const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// A single span of text on a page. `index` is page-local and follows the
/// order in which the content stream shows text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub index: usize,
    pub text: String,
    pub bbox: Rect,
    pub font_size: f32,
    pub font_name: Option<String>,
}

impl TextFragment {
    pub fn new(index: usize, text: impl Into<String>, bbox: Rect) -> Self {
        Self {
            index,
            text: text.into(),
            bbox,
            font_size: 0.0,
            font_name: None,
        }
    }
}

impl fmt::Display for TextFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} \"{}\" ({:.1}, {:.1}, {:.1}, {:.1}) {}pt{}",
            self.index,
            self.text,
            self.bbox.x0,
            self.bbox.y0,
            self.bbox.x1,
            self.bbox.y1,
            self.font_size,
            self.font_name
                .as_ref()
                .map(|n| format!(" {}", n))
                .unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A stroked or filled line segment, in the same top-down page space as
/// fragments. Horizontal rulings have `y0 == y1`, vertical ones `x0 == x1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ruling {
    pub orientation: Orientation,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Everything the pipeline needs from one page's content stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLayout {
    /// 1-based page number.
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    pub fragments: Vec<TextFragment>,
    pub rulings: Vec<Ruling>,
}

pub fn load_pdf(bytes: &[u8]) -> Result<Document, DocumentError> {
    let doc = Document::load_mem(bytes)?;
    if doc.get_pages().is_empty() {
        return Err(DocumentError::NoPages);
    }
    Ok(doc)
}

/// Parses `bytes` and returns the text layout of every page, in page order.
pub fn extract_fragments(bytes: &[u8]) -> Result<Vec<PageLayout>, DocumentError> {
    let doc = load_pdf(bytes)?;
    get_page_layouts(&doc)
}

pub fn get_page_layouts(doc: &Document) -> Result<Vec<PageLayout>, DocumentError> {
    doc.get_pages()
        .into_iter()
        .map(|(page_number, page_id)| {
            get_page_layout(doc, page_number, page_id).map_err(|source| DocumentError::Page {
                page: page_number,
                source,
            })
        })
        .collect()
}

struct FontInfo<'a> {
    name: Option<String>,
    encoding: Option<Encoding<'a>>,
    first_char: u32,
    widths: Vec<f32>,
    missing_width: f32,
    two_byte: bool,
}

impl<'a> FontInfo<'a> {
    fn from_dict(doc: &'a Document, dict: &'a Dictionary) -> Self {
        let name = dict
            .get(b"BaseFont")
            .and_then(Object::as_name)
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .ok();
        let subtype = dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n.to_vec())
            .unwrap_or_default();
        let two_byte = subtype == b"Type0";

        let first_char = dict
            .get(b"FirstChar")
            .and_then(Object::as_i64)
            .map(|v| v.max(0) as u32)
            .unwrap_or(0);
        let widths = dict
            .get(b"Widths")
            .and_then(|obj| match obj {
                Object::Reference(id) => doc.get_object(*id).and_then(Object::as_array),
                other => other.as_array(),
            })
            .map(|arr| arr.iter().map(|o| o.as_float().unwrap_or(0.0)).collect())
            .unwrap_or_default();

        let monospaced = name.as_deref().is_some_and(|n| n.contains("Courier"));
        let missing_width = match (two_byte, monospaced) {
            (true, _) => 1000.0,
            (false, true) => 600.0,
            (false, false) => 500.0,
        };

        let encoding = match dict.get_font_encoding(doc) {
            Ok(encoding) => Some(encoding),
            Err(e) => {
                debug!(target: PDF_PARSING, font = ?name, "no usable encoding: {e}");
                None
            }
        };

        Self {
            name,
            encoding,
            first_char,
            widths,
            missing_width,
            two_byte,
        }
    }

    fn glyph_width(&self, code: u32) -> f32 {
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.missing_width)
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match &self.encoding {
            Some(encoding) => Document::decode_text(encoding, bytes)
                .unwrap_or_else(|_| bytes.iter().map(|b| *b as char).collect()),
            None => bytes.iter().map(|b| *b as char).collect(),
        }
    }
}

#[derive(Clone, Debug)]
struct TextState {
    text_matrix: [f32; 6],      // Tm
    text_line_matrix: [f32; 6], // Tlm
    font_key: Option<Vec<u8>>,
    font_size: f32,
    character_spacing: f32,  // Tc
    word_spacing: f32,       // Tw
    horizontal_scaling: f32, // Tz as a fraction
    leading: f32,            // TL
    rise: f32,               // Ts
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            text_matrix: IDENTITY,
            text_line_matrix: IDENTITY,
            font_key: None,
            font_size: 0.0,
            character_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
struct GraphicsState {
    ctm: [f32; 6],
    text_state: TextState,
}

/// A span being assembled from one text-showing operator.
#[derive(Default)]
struct TextRun {
    text: String,
    bounds: Option<(f32, f32, f32, f32)>,
}

impl TextRun {
    fn include(&mut self, (x, y): (f32, f32)) {
        self.bounds = Some(match self.bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
}

struct PageWalker<'a> {
    gs_stack: Vec<GraphicsState>,
    fonts: BTreeMap<Vec<u8>, FontInfo<'a>>,
    media_box: [f32; 4],
    fragments: Vec<TextFragment>,
    rulings: Vec<Ruling>,
    path: Vec<((f32, f32), (f32, f32))>,
    subpath_start: Option<(f32, f32)>,
    current_point: Option<(f32, f32)>,
    thin_rects: Vec<(f32, f32, f32, f32)>,
}

fn get_page_layout(
    doc: &Document,
    page_number: u32,
    page_id: ObjectId,
) -> Result<PageLayout, lopdf::Error> {
    let content = doc.get_and_decode_page_content(page_id)?;
    let media_box = page_media_box(doc, page_id);

    let fonts = doc
        .get_page_fonts(page_id)?
        .into_iter()
        .map(|(key, dict)| (key, FontInfo::from_dict(doc, dict)))
        .collect();

    let mut walker = PageWalker {
        gs_stack: vec![GraphicsState {
            ctm: IDENTITY,
            text_state: TextState::default(),
        }],
        fonts,
        media_box,
        fragments: Vec::new(),
        rulings: Vec::new(),
        path: Vec::new(),
        subpath_start: None,
        current_point: None,
        thin_rects: Vec::new(),
    };

    for op in &content.operations {
        walker.handle_operator(op);
    }

    debug!(
        target: PDF_PARSING,
        page = page_number,
        fragments = walker.fragments.len(),
        rulings = walker.rulings.len(),
        "extracted page layout"
    );

    Ok(PageLayout {
        page_number,
        width: media_box[2] - media_box[0],
        height: media_box[3] - media_box[1],
        fragments: walker.fragments,
        rulings: walker.rulings,
    })
}

/// MediaBox may be inherited from any ancestor in the page tree.
fn page_media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut current = doc.get_dictionary(page_id).ok();
    for _ in 0..16 {
        let Some(dict) = current else { break };
        if let Ok(arr) = dict.get(b"MediaBox").and_then(|o| match o {
            Object::Reference(id) => doc.get_object(*id).and_then(Object::as_array),
            other => other.as_array(),
        }) {
            let mut media_box = [0.0; 4];
            for (slot, obj) in media_box.iter_mut().zip(arr.iter()) {
                *slot = obj.as_float().unwrap_or(0.0);
            }
            return media_box;
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    warn!(target: PDF_PARSING, ?page_id, "no MediaBox found, assuming US Letter");
    [0.0, 0.0, 612.0, 792.0]
}

fn operand_as_float(obj: &Object) -> f32 {
    obj.as_float().unwrap_or(0.0)
}

fn floats(op: &Operation) -> Vec<f32> {
    op.operands.iter().map(operand_as_float).collect()
}

fn matrix_from_operands(op: &Operation) -> [f32; 6] {
    floats(op).try_into().unwrap_or(IDENTITY)
}

impl<'a> PageWalker<'a> {
    fn gs(&mut self) -> &mut GraphicsState {
        // The stack is never popped below its root entry.
        let last = self.gs_stack.len() - 1;
        &mut self.gs_stack[last]
    }

    fn handle_operator(&mut self, op: &Operation) {
        trace!(target: PDF_OPERATIONS, operator = %op.operator, operands = ?op.operands);
        match op.operator.as_ref() {
            "q" => {
                let top = self.gs().clone();
                self.gs_stack.push(top);
            }
            "Q" => {
                if self.gs_stack.len() > 1 {
                    self.gs_stack.pop();
                }
            }
            "cm" => {
                let m = matrix_from_operands(op);
                let gs = self.gs();
                gs.ctm = multiply_matrices(&m, &gs.ctm);
            }
            "BT" => {
                let ts = &mut self.gs().text_state;
                ts.text_matrix = IDENTITY;
                ts.text_line_matrix = IDENTITY;
            }
            "ET" => {}
            "Tf" => {
                if let (Some(Object::Name(key)), Some(size)) = (op.operands.first(), op.operands.get(1)) {
                    let ts = &mut self.gs().text_state;
                    ts.font_key = Some(key.clone());
                    ts.font_size = operand_as_float(size);
                }
            }
            "Tc" => {
                if let Some(v) = op.operands.first() {
                    self.gs().text_state.character_spacing = operand_as_float(v);
                }
            }
            "Tw" => {
                if let Some(v) = op.operands.first() {
                    self.gs().text_state.word_spacing = operand_as_float(v);
                }
            }
            "Tz" => {
                if let Some(v) = op.operands.first() {
                    self.gs().text_state.horizontal_scaling = operand_as_float(v) / 100.0;
                }
            }
            "TL" => {
                if let Some(v) = op.operands.first() {
                    self.gs().text_state.leading = operand_as_float(v);
                }
            }
            "Ts" => {
                if let Some(v) = op.operands.first() {
                    self.gs().text_state.rise = operand_as_float(v);
                }
            }
            "Tm" => {
                let m = matrix_from_operands(op);
                let ts = &mut self.gs().text_state;
                ts.text_matrix = m;
                ts.text_line_matrix = m;
            }
            "Td" | "TD" => {
                let args = floats(op);
                if let [tx, ty, ..] = args[..] {
                    let ts = &mut self.gs().text_state;
                    if op.operator == "TD" {
                        ts.leading = -ty;
                    }
                    ts.next_line(tx, ty);
                }
            }
            "T*" => {
                let ts = &mut self.gs().text_state;
                let leading = ts.leading;
                ts.next_line(0.0, -leading);
            }
            "Tj" | "TJ" => self.show_text(&op.operands),
            "'" => {
                let ts = &mut self.gs().text_state;
                let leading = ts.leading;
                ts.next_line(0.0, -leading);
                self.show_text(&op.operands);
            }
            "\"" => {
                let args = floats(op);
                if args.len() >= 2 {
                    let ts = &mut self.gs().text_state;
                    ts.word_spacing = args[0];
                    ts.character_spacing = args[1];
                    let leading = ts.leading;
                    ts.next_line(0.0, -leading);
                }
                if let Some(text) = op.operands.get(2) {
                    self.show_text(std::slice::from_ref(text));
                }
            }
            "m" => {
                if let [x, y, ..] = floats(op)[..] {
                    let p = self.to_user(x, y);
                    self.subpath_start = Some(p);
                    self.current_point = Some(p);
                }
            }
            "l" => {
                if let [x, y, ..] = floats(op)[..] {
                    let p = self.to_user(x, y);
                    if let Some(from) = self.current_point {
                        self.path.push((from, p));
                    }
                    self.current_point = Some(p);
                }
            }
            "h" => {
                if let (Some(from), Some(to)) = (self.current_point, self.subpath_start) {
                    self.path.push((from, to));
                    self.current_point = Some(to);
                }
            }
            "re" => {
                if let [x, y, w, h, ..] = floats(op)[..] {
                    self.add_rect(x, y, w, h);
                }
            }
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => self.paint_path(),
            "n" => self.clear_path(),
            _ => {}
        }
    }

    fn to_user(&mut self, x: f32, y: f32) -> (f32, f32) {
        let ctm = self.gs().ctm;
        apply(&ctm, x, y)
    }

    fn add_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let a = self.to_user(x, y);
        let b = self.to_user(x + w, y);
        let c = self.to_user(x + w, y + h);
        let d = self.to_user(x, y + h);
        let (x0, x1) = (a.0.min(c.0), a.0.max(c.0));
        let (y0, y1) = (a.1.min(c.1), a.1.max(c.1));
        if x1 - x0 <= RULING_THICKNESS || y1 - y0 <= RULING_THICKNESS {
            self.thin_rects.push((x0, y0, x1, y1));
        } else {
            self.path.extend([(a, b), (b, c), (c, d), (d, a)]);
        }
        self.subpath_start = Some(a);
        self.current_point = Some(a);
    }

    fn paint_path(&mut self) {
        for ((x0, y0), (x1, y1)) in std::mem::take(&mut self.path) {
            if let Some(ruling) = self.ruling_from_segment(x0, y0, x1, y1) {
                self.rulings.push(ruling);
            }
        }
        for (x0, y0, x1, y1) in std::mem::take(&mut self.thin_rects) {
            let ruling = if x1 - x0 >= y1 - y0 {
                let y = (y0 + y1) / 2.0;
                self.ruling_from_segment(x0, y, x1, y)
            } else {
                let x = (x0 + x1) / 2.0;
                self.ruling_from_segment(x, y0, x, y1)
            };
            if let Some(ruling) = ruling {
                self.rulings.push(ruling);
            }
        }
        self.clear_path();
    }

    fn clear_path(&mut self) {
        self.path.clear();
        self.thin_rects.clear();
        self.subpath_start = None;
        self.current_point = None;
    }

    /// Converts a user-space segment to a top-down ruling, ignoring diagonals.
    fn ruling_from_segment(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Option<Ruling> {
        let (ax, ay) = self.to_page(x0, y0);
        let (bx, by) = self.to_page(x1, y1);
        if (ay - by).abs() <= AXIS_TOLERANCE && (ax - bx).abs() > AXIS_TOLERANCE {
            let y = (ay + by) / 2.0;
            Some(Ruling {
                orientation: Orientation::Horizontal,
                x0: ax.min(bx),
                y0: y,
                x1: ax.max(bx),
                y1: y,
            })
        } else if (ax - bx).abs() <= AXIS_TOLERANCE && (ay - by).abs() > AXIS_TOLERANCE {
            let x = (ax + bx) / 2.0;
            Some(Ruling {
                orientation: Orientation::Vertical,
                x0: x,
                y0: ay.min(by),
                x1: x,
                y1: ay.max(by),
            })
        } else {
            None
        }
    }

    /// User space (y up, origin at MediaBox corner) to page space (y down).
    fn to_page(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.media_box[0], self.media_box[3] - y)
    }

    fn show_text(&mut self, operands: &[Object]) {
        let gs = self.gs().clone();
        let Some(font) = gs
            .text_state
            .font_key
            .as_ref()
            .and_then(|k| self.fonts.get(k))
        else {
            warn!(target: PDF_PARSING, "text shown without a selected font, skipping");
            return;
        };
        let (run, text_matrix) = layout_run(font, &gs, operands);
        let font_name = font.name.clone();
        self.gs().text_state.text_matrix = text_matrix;

        let Some((x0, y0, x1, y1)) = run.bounds else {
            return;
        };
        let (left, top) = self.to_page(x0, y1);
        let (right, bottom) = self.to_page(x1, y0);
        let fragment = TextFragment {
            index: self.fragments.len(),
            text: run.text,
            bbox: Rect::new(left, top, right, bottom),
            font_size: gs.text_state.font_size,
            font_name,
        };
        trace!(target: PDF_PARSING, %fragment, "span");
        self.fragments.push(fragment);
    }
}

/// Lays out one text-showing operator, returning the span in user space and
/// the text matrix after it.
fn layout_run(font: &FontInfo, gs: &GraphicsState, operands: &[Object]) -> (TextRun, [f32; 6]) {
    let ts = &gs.text_state;
    let size = ts.font_size;
    let mut run = TextRun::default();
    let mut text_matrix = ts.text_matrix;

    let advance_by = |run: &mut TextRun, tm: &mut [f32; 6], tx: f32| {
        let combined = multiply_matrices(tm, &gs.ctm);
        for (x, y) in [
            (0.0, ts.rise + DESCENT * size),
            (0.0, ts.rise + ASCENT * size),
            (tx, ts.rise + DESCENT * size),
            (tx, ts.rise + ASCENT * size),
        ] {
            run.include(apply(&combined, x, y));
        }
        *tm = multiply_matrices(&translate_matrix(tx, 0.0), tm);
    };

    let show = |run: &mut TextRun, tm: &mut [f32; 6], bytes: &[u8]| {
        let tx = text_advance(font, bytes, ts);
        run.text.push_str(&font.decode(bytes));
        advance_by(run, tm, tx);
    };

    for operand in operands {
        match operand {
            Object::String(bytes, _) => show(&mut run, &mut text_matrix, bytes.as_slice()),
            Object::Array(items) => {
                for item in items {
                    match item {
                        Object::String(bytes, _) => show(&mut run, &mut text_matrix, bytes.as_slice()),
                        Object::Integer(_) | Object::Real(_) => {
                            let adjustment = operand_as_float(item);
                            if adjustment < -WORD_GAP_ADJUSTMENT && !run.text.ends_with(' ') {
                                run.text.push(' ');
                            }
                            let tx = -adjustment / 1000.0 * size * ts.horizontal_scaling;
                            text_matrix =
                                multiply_matrices(&translate_matrix(tx, 0.0), &text_matrix);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    // Empty strings still get a box at the current position.
    if run.bounds.is_none() {
        advance_by(&mut run, &mut text_matrix, 0.0);
    }
    (run, text_matrix)
}

impl TextState {
    fn next_line(&mut self, tx: f32, ty: f32) {
        self.text_matrix = multiply_matrices(&translate_matrix(tx, ty), &self.text_line_matrix);
        self.text_line_matrix = self.text_matrix;
    }
}

/// Horizontal displacement, in text space, of showing `bytes`.
fn text_advance(font: &FontInfo, bytes: &[u8], ts: &TextState) -> f32 {
    let size = ts.font_size;
    let glyphs: Vec<(f32, bool)> = if font.two_byte {
        bytes
            .chunks(2)
            .map(|_| (font.missing_width, false))
            .collect()
    } else {
        bytes
            .iter()
            .map(|b| (font.glyph_width(*b as u32), *b == b' '))
            .collect()
    };

    glyphs
        .into_iter()
        .map(|(width, is_space)| {
            let spacing = ts.character_spacing + if is_space { ts.word_spacing } else { 0.0 };
            (width / 1000.0 * size + spacing) * ts.horizontal_scaling
        })
        .sum()
}

fn apply(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

pub fn multiply_matrices(a: &[f32; 6], b: &[f32; 6]) -> [f32; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

pub fn translate_matrix(x: f32, y: f32) -> [f32; 6] {
    [1.0, 0.0, 0.0, 1.0, x, y]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_composes_with_scaling() {
        let scale = [2.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let m = multiply_matrices(&translate_matrix(10.0, 5.0), &scale);
        assert_eq!(apply(&m, 0.0, 0.0), (20.0, 10.0));
        assert_eq!(apply(&m, 1.0, 1.0), (22.0, 12.0));
    }
}
