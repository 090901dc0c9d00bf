use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::BBox;

/// A polygon's bounding box, tagged with the polygon's position in its input
/// slice.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    pub index: usize,
    pub bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope(&self.bbox)
    }
}

fn envelope(bbox: &BBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min.x, bbox.min.y], [bbox.max.x, bbox.max.y])
}

/// R-tree over polygon bounding boxes, used to find candidate overlaps
/// before running exact boolean operations.
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    pub fn from_bboxes(bboxes: &[BBox]) -> Self {
        let entries = bboxes
            .iter()
            .enumerate()
            .map(|(index, bbox)| SpatialEntry { index, bbox: *bbox })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Entries whose box touches or overlaps `bbox`.
    pub fn query_overlapping(&self, bbox: &BBox) -> Vec<&SpatialEntry> {
        self.tree
            .locate_in_envelope_intersecting(&envelope(bbox))
            .collect()
    }
}

/// Group boxes into connected components of the "boxes overlap" relation.
/// Each cluster lists input indices in ascending order; clusters are ordered
/// by their smallest index.
pub fn clusters(bboxes: &[BBox], margin: f64) -> Vec<Vec<usize>> {
    let grown: Vec<BBox> = bboxes.iter().map(|b| b.expanded(margin)).collect();
    let index = SpatialIndex::from_bboxes(&grown);
    let mut sets = DisjointSets::new(bboxes.len());
    for (i, bbox) in grown.iter().enumerate() {
        for entry in index.query_overlapping(bbox) {
            if entry.index > i {
                sets.union(i, entry.index);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut slot = vec![usize::MAX; bboxes.len()];
    for i in 0..bboxes.len() {
        let root = sets.find(i);
        if slot[root] == usize::MAX {
            slot[root] = groups.len();
            groups.push(Vec::new());
        }
        groups[slot[root]].push(i);
    }
    groups
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn bb(x0: f64, y0: f64, x1: f64, y1: f64) -> BBox {
        BBox::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    #[test]
    fn test_spatial_query() {
        let index = SpatialIndex::from_bboxes(&[bb(0.0, 0.0, 10.0, 10.0), bb(20.0, 20.0, 30.0, 30.0)]);
        let hits = index.query_overlapping(&bb(24.0, 24.0, 26.0, 26.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 1);
        assert_eq!(index.query_overlapping(&bb(-5.0, -5.0, 15.0, 15.0)).len(), 1);
        assert_eq!(index.query_overlapping(&bb(10.0, 10.0, 20.0, 20.0)).len(), 2);
    }

    #[test]
    fn test_clusters_chain_through_overlaps() {
        let boxes = [
            bb(0.0, 0.0, 10.0, 10.0),
            bb(100.0, 0.0, 110.0, 10.0),
            bb(8.0, 8.0, 20.0, 20.0),
            bb(19.0, 0.0, 30.0, 9.0),
        ];
        // 0-2 overlap, 2-3 overlap, 1 stands alone.
        assert_eq!(clusters(&boxes, 0.0), vec![vec![0, 2, 3], vec![1]]);
    }

    #[test]
    fn test_cluster_margin_joins_near_boxes() {
        let boxes = [bb(0.0, 0.0, 1.0, 1.0), bb(1.5, 0.0, 2.5, 1.0)];
        assert_eq!(clusters(&boxes, 0.0).len(), 2);
        assert_eq!(clusters(&boxes, 0.5).len(), 1);
        assert!(clusters(&[], 0.0).is_empty());
    }
}
