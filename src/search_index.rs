use rstar::{RTree, RTreeObject, AABB};

use crate::geo::{overlaps, Rect};
use crate::parse::TextFragment;

/// R-tree entry pointing back at a fragment by position.
#[derive(Clone, Debug)]
pub struct SpatialFragment {
    position: usize,
    bbox: Rect,
}

impl RTreeObject for SpatialFragment {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bbox.envelope()
    }
}

/// Spatial index over one page's fragments.
#[derive(Debug)]
pub struct FragmentIndex<'a> {
    fragments: &'a [TextFragment],
    rtree: RTree<SpatialFragment>,
}

impl<'a> FragmentIndex<'a> {
    pub fn new(fragments: &'a [TextFragment]) -> Self {
        let entries = fragments
            .iter()
            .enumerate()
            .map(|(position, f)| SpatialFragment {
                position,
                bbox: f.bbox,
            })
            .collect();
        Self {
            fragments,
            rtree: RTree::bulk_load(entries),
        }
    }

    pub fn fragments(&self) -> &'a [TextFragment] {
        self.fragments
    }

    /// Fragments overlapping `area`, in fragment order.
    pub fn overlapping(&self, area: &Rect) -> Vec<&'a TextFragment> {
        let mut positions: Vec<usize> = self
            .rtree
            .locate_in_envelope_intersecting(&area.envelope())
            .filter(|entry| overlaps(&entry.bbox, area))
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();
        positions.into_iter().map(|p| &self.fragments[p]).collect()
    }
}
