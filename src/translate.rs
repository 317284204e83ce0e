//! Segmentation translation
//!
//! The source and target formats share a wire codec but not a tree
//! shape: source trees may split one, two or three sides per node, while
//! the target side of this conversion only ever emits full four-child
//! midpoint splits. Rather than rewriting tree nodes structurally, the
//! translator treats the decoded paint as geometry: painted regions are
//! clipped against a recursive quad subdivision of the triangle, and each
//! cell becomes a leaf once a single state covers it.
//!
//! Cells that still straddle regions at the depth ceiling are merged to
//! the majority state; coverage ties go to the numerically lower state,
//! unpainted included. Both rules are deterministic, so translating the
//! same input twice yields identical codes.

use crate::extruder::ExtruderMap;
use crate::paint::PaintAssignment;
use crate::segmentation::{Corners, Point, SegNode, UNIT_TRIANGLE, area2, quad_corners};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

/// Hard ceiling on emitted subdivision depth
///
/// Eight levels split a triangle into 65536 cells, finer than the
/// painting gizmos of either slicer produce in practice.
pub const MAX_SUBDIVISION_DEPTH: usize = 8;

/// Coverage slack for treating a cell as fully covered by one state
const COVER_EPS: f64 = 1e-9;

/// Relative coverage difference below which two states tie
const TIE_EPS: f64 = 1e-6;

/// Tuning knobs for the translator
#[derive(Debug, Clone, Copy)]
pub struct TranslateOptions {
    /// Subdivision depth ceiling, clamped to [`MAX_SUBDIVISION_DEPTH`]
    pub max_depth: usize,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_SUBDIVISION_DEPTH,
        }
    }
}

/// Failure while translating one triangle's assignment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// A painted region references an extruder with no mapping entry
    #[error("no mapping entry for extruder {0}")]
    Unmapped(u8),
}

/// Translate one triangle's decoded assignment into a target tree
///
/// Returns `Ok(None)` when the triangle ends up unpainted (the source
/// attribute is removed and nothing replaces it). Extruder indices are
/// remapped before any geometry work, so an unmapped index fails even
/// when its region would be merged away later.
pub fn translate(
    assignment: &PaintAssignment,
    map: &ExtruderMap,
    options: &TranslateOptions,
) -> Result<Option<SegNode>, TranslateError> {
    let mut pieces: Vec<(u8, Vec<Point>)> = Vec::with_capacity(assignment.regions.len());
    for region in &assignment.regions {
        let target = map
            .resolve(region.extruder)
            .ok_or(TranslateError::Unmapped(region.extruder))?;
        pieces.push((target, region.corners.to_vec()));
    }

    if pieces.is_empty() {
        return Ok(None);
    }

    let max_depth = options.max_depth.min(MAX_SUBDIVISION_DEPTH);
    let root = build_node(&UNIT_TRIANGLE, &pieces, 0, max_depth);

    // Degenerate paint (zero-area regions) can resolve to "unpainted";
    // that is a removal, not an explicit zero code.
    if root.is_leaf_with(0) {
        return Ok(None);
    }
    Ok(Some(root))
}

/// Build the target node for one cell
///
/// `pieces` are painted polygons already clipped to the cell, so the
/// coverage of a state is just the summed area of its polygons.
fn build_node(cell: &Corners, pieces: &[(u8, Vec<Point>)], depth: usize, max_depth: usize) -> SegNode {
    let cell_area = area2(cell);

    let mut coverage: BTreeMap<u8, f64> = BTreeMap::new();
    let mut painted_total = 0.0;
    for (state, polygon) in pieces {
        let a = polygon_area2(polygon);
        painted_total += a;
        *coverage.entry(*state).or_insert(0.0) += a;
    }
    coverage.insert(0, (cell_area - painted_total).max(0.0));

    // Ascending order makes the lower state win exact threshold ties.
    for (state, a) in &coverage {
        if *a >= cell_area * (1.0 - COVER_EPS) {
            return SegNode::Leaf(*state);
        }
    }

    if depth >= max_depth {
        let winner = majority_state(&coverage, cell_area);
        trace!(depth, winner, "depth ceiling reached, merged cell to majority state");
        return SegNode::Leaf(winner);
    }

    let children: Vec<SegNode> = quad_corners(cell)
        .iter()
        .map(|child_cell| {
            let child_pieces = clip_pieces(pieces, child_cell);
            build_node(child_cell, &child_pieces, depth + 1, max_depth)
        })
        .collect();

    if let SegNode::Leaf(first) = children[0] {
        if children.iter().all(|c| c.is_leaf_with(first)) {
            return SegNode::Leaf(first);
        }
    }

    SegNode::Split {
        special_side: 0,
        children,
    }
}

/// Pick the state covering most of the cell
///
/// States whose coverage is within `TIE_EPS` of the best (relative to
/// the cell area) count as tied, and the lowest state among them wins;
/// iterating in ascending state order gets that for free.
fn majority_state(coverage: &BTreeMap<u8, f64>, cell_area: f64) -> u8 {
    let tie = cell_area * TIE_EPS;
    let mut winner = 0u8;
    let mut best = f64::MIN;
    for (state, a) in coverage {
        if *a > best + tie {
            winner = *state;
            best = *a;
        }
    }
    winner
}

fn clip_pieces(pieces: &[(u8, Vec<Point>)], cell: &Corners) -> Vec<(u8, Vec<Point>)> {
    let mut out = Vec::with_capacity(pieces.len());
    for (state, polygon) in pieces {
        let clipped = clip_polygon(polygon, cell);
        if clipped.len() >= 3 && polygon_area2(&clipped) > 1e-15 {
            out.push((*state, clipped));
        }
    }
    out
}

/// Sutherland-Hodgman clip of a convex polygon against a triangle cell
///
/// All inputs are counter-clockwise; "inside" an edge means on or left
/// of it.
fn clip_polygon(subject: &[Point], cell: &Corners) -> Vec<Point> {
    const EDGE_EPS: f64 = 1e-12;

    let mut current = subject.to_vec();
    for i in 0..3 {
        if current.is_empty() {
            break;
        }
        let a = cell[i];
        let b = cell[(i + 1) % 3];
        let side = |p: &Point| (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);

        let mut next = Vec::with_capacity(current.len() + 1);
        for j in 0..current.len() {
            let p = current[j];
            let q = current[(j + 1) % current.len()];
            let dp = side(&p);
            let dq = side(&q);

            if dp >= -EDGE_EPS {
                next.push(p);
            }
            if (dp > EDGE_EPS && dq < -EDGE_EPS) || (dp < -EDGE_EPS && dq > EDGE_EPS) {
                let t = dp / (dp - dq);
                next.push([p[0] + t * (q[0] - p[0]), p[1] + t * (q[1] - p[1])]);
            }
        }
        current = next;
    }
    current
}

/// Shoelace sum: twice the signed area of a polygon
fn polygon_area2(points: &[Point]) -> f64 {
    let mut sum = 0.0;
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        sum += p[0] * q[1] - q[0] * p[1];
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::{FacetPaintDecoder, PaintDecoder};
    use crate::segmentation::encode_code;

    fn decode(raw: &str) -> PaintAssignment {
        FacetPaintDecoder.decode(raw).unwrap()
    }

    fn translate_default(raw: &str) -> Option<SegNode> {
        translate(&decode(raw), &ExtruderMap::unbounded(), &TranslateOptions::default()).unwrap()
    }

    #[test]
    fn test_empty_assignment_is_removal() {
        assert_eq!(translate_default("0"), None);
    }

    #[test]
    fn test_whole_triangle_single_extruder() {
        assert_eq!(translate_default("4"), Some(SegNode::Leaf(1)));
        assert_eq!(translate_default("1C"), Some(SegNode::Leaf(4)));
    }

    #[test]
    fn test_uniform_split_collapses() {
        // One-side split with both halves on extruder 1 is just extruder 1.
        assert_eq!(translate_default("441"), Some(SegNode::Leaf(1)));
    }

    #[test]
    fn test_remap_changes_leaf_state() {
        let map = ExtruderMap::from_pairs([(2, 1)]);
        let tree = translate(&decode("8"), &map, &TranslateOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(tree, SegNode::Leaf(1));
    }

    #[test]
    fn test_merging_map_collapses_regions() {
        // Halves painted 1 and 2, both mapped to 1: the whole triangle
        // is covered by one target state before any subdivision.
        let map = ExtruderMap::from_pairs([(1, 1), (2, 1)]);
        let tree = translate(&decode("841"), &map, &TranslateOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(tree, SegNode::Leaf(1));
    }

    #[test]
    fn test_unmapped_extruder_fails() {
        let map = ExtruderMap::identity(1);
        let err = translate(&decode("8"), &map, &TranslateOptions::default()).unwrap_err();
        assert_eq!(err, TranslateError::Unmapped(2));
    }

    #[test]
    fn test_half_split_quantized_at_depth_one() {
        // A one-side split has no exact quad representation: the two
        // top cells straddle the paint boundary exactly 50/50 and merge
        // to the lower state at the ceiling.
        let options = TranslateOptions { max_depth: 1 };
        let tree = translate(&decode("841"), &ExtruderMap::unbounded(), &options)
            .unwrap()
            .unwrap();
        assert_eq!(
            tree,
            SegNode::Split {
                special_side: 0,
                children: vec![
                    SegNode::Leaf(1),
                    SegNode::Leaf(2),
                    SegNode::Leaf(1),
                    SegNode::Leaf(1),
                ],
            }
        );
        assert_eq!(encode_code(&tree).unwrap(), "44843");
    }

    #[test]
    fn test_tie_break_includes_unpainted() {
        // Only the left half painted: contested cells fall back to
        // unpainted because 0 is the lower state.
        let options = TranslateOptions { max_depth: 1 };
        let tree = translate(&decode("041"), &ExtruderMap::unbounded(), &options)
            .unwrap()
            .unwrap();
        assert_eq!(
            tree,
            SegNode::Split {
                special_side: 0,
                children: vec![
                    SegNode::Leaf(1),
                    SegNode::Leaf(0),
                    SegNode::Leaf(0),
                    SegNode::Leaf(0),
                ],
            }
        );
    }

    #[test]
    fn test_translation_is_deterministic() {
        let assignment = decode("841");
        let map = ExtruderMap::unbounded();
        let options = TranslateOptions::default();
        let first = translate(&assignment, &map, &options).unwrap().unwrap();
        let second = translate(&assignment, &map, &options).unwrap().unwrap();
        assert_eq!(encode_code(&first).unwrap(), encode_code(&second).unwrap());
    }

    #[test]
    fn test_depth_ceiling_respected() {
        fn max_depth_of(node: &SegNode) -> usize {
            match node {
                SegNode::Leaf(_) => 0,
                SegNode::Split { children, .. } => {
                    1 + children.iter().map(max_depth_of).max().unwrap_or(0)
                }
            }
        }
        let tree = translate_default("841").unwrap();
        assert!(max_depth_of(&tree) <= MAX_SUBDIVISION_DEPTH);
        // The boundary runs diagonally, so some subdivision must happen.
        assert!(max_depth_of(&tree) >= 1);
    }

    #[test]
    fn test_three_way_split_preserved_exactly() {
        // A full quad split in the source maps onto the target's own
        // cell boundaries, so no depth ceiling or merge is involved.
        let source = SegNode::Split {
            special_side: 0,
            children: vec![
                SegNode::Leaf(1),
                SegNode::Leaf(2),
                SegNode::Leaf(0),
                SegNode::Leaf(3),
            ],
        };
        let raw = encode_code(&source).unwrap();
        assert_eq!(translate_default(&raw), Some(source));
    }

    #[test]
    fn test_clip_identity_when_contained() {
        let inner = vec![[0.1, 0.1], [0.3, 0.1], [0.1, 0.3]];
        let clipped = clip_polygon(&inner, &UNIT_TRIANGLE);
        assert_eq!(clipped.len(), 3);
        assert!((polygon_area2(&clipped) - polygon_area2(&inner)).abs() < 1e-12);
    }

    #[test]
    fn test_clip_outside_is_empty() {
        let outside = vec![[2.0, 2.0], [3.0, 2.0], [2.0, 3.0]];
        let clipped = clip_polygon(&outside, &UNIT_TRIANGLE);
        assert!(clipped.len() < 3 || polygon_area2(&clipped) < 1e-12);
    }

    #[test]
    fn test_clip_partial_overlap_area() {
        // The unit square clipped to the unit triangle leaves exactly
        // the triangle itself.
        let square = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let clipped = clip_polygon(&square, &UNIT_TRIANGLE);
        assert!((polygon_area2(&clipped) - 1.0).abs() < 1e-12);
    }
}
