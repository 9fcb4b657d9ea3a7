use rstar::AABB;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page space: `x0` left, `y0` top, `x1` right,
/// `y1` bottom. The y axis grows downwards from the top of the page.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn envelope(&self) -> AABB<[f32; 2]> {
        AABB::from_corners([self.x0, self.y0], [self.x1, self.y1])
    }
}

impl From<(f32, f32, f32, f32)> for Rect {
    fn from((x0, y0, x1, y1): (f32, f32, f32, f32)) -> Self {
        Rect { x0, y0, x1, y1 }
    }
}

/// Two rectangles overlap unless one lies strictly to the left of, right of,
/// above or below the other. Shared edges count as overlap.
pub fn overlaps(a: &Rect, b: &Rect) -> bool {
    let is_left = a.x1 < b.x0;
    let is_right = a.x0 > b.x1;
    let is_above = a.y1 < b.y0;
    let is_below = a.y0 > b.y1;

    !(is_left || is_right || is_above || is_below)
}
