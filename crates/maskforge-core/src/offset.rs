//! Union and inward offset ("inset") of polygon sets.
//!
//! Polygons are converted to closed `cavalier_contours` polylines and merged
//! into pieces: one outer contour plus the holes it encloses, all kept
//! counter-clockwise. Offsetting shrinks outers by the distance and grows
//! holes by it. Results are fractured along vertical cuts until no piece has
//! a hole, so every emitted polygon is a single simple contour.

use cavalier_contours::polyline::{
    BooleanOp, PlineOffsetOptions, PlineOrientation, PlineSource, PlineSourceMut, Polyline,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::error::{require_finite, LayoutError, Result};
use crate::geometry::{BBox, Point, Polygon};
use crate::layer::GdsLayer;
use crate::layout::Layout;
use crate::spatial;

/// Vertices closer than this are merged.
const MERGE_TOL: f64 = 1e-6;
/// Contours smaller than this area are dropped.
const MIN_AREA: f64 = 1e-9;
/// Largest angle swept by one chord when flattening arcs.
const MAX_ARC_STEP_DEG: f64 = 5.0;
const MAX_FRACTURE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsetOptions {
    /// Positive shrinks, negative grows, zero only unions.
    pub distance: f64,
    /// Union the inputs before offsetting instead of offsetting each one.
    pub join_first: bool,
    /// Layer of the emitted polygons.
    pub layer: GdsLayer,
}

impl Default for InsetOptions {
    fn default() -> Self {
        Self {
            distance: 0.0,
            join_first: true,
            layer: GdsLayer::default(),
        }
    }
}

impl InsetOptions {
    pub fn new(distance: f64, layer: GdsLayer) -> Self {
        Self {
            distance,
            layer,
            ..Default::default()
        }
    }

    pub fn join_first(mut self, join_first: bool) -> Self {
        self.join_first = join_first;
        self
    }
}

/// Outer contour with the holes it encloses. All contours counter-clockwise.
#[derive(Debug, Clone)]
struct Piece {
    outer: Polyline<f64>,
    holes: Vec<Polyline<f64>>,
}

impl Piece {
    fn solid(outer: Polyline<f64>) -> Self {
        Self {
            outer,
            holes: Vec::new(),
        }
    }
}

// ── Polyline helpers ─────────────────────────────────────────────────

fn counter_clockwise(mut pline: Polyline<f64>) -> Polyline<f64> {
    if pline.orientation() == PlineOrientation::Clockwise {
        pline.invert_direction_mut();
    }
    pline
}

fn area(pline: &Polyline<f64>) -> f64 {
    pline.area().abs()
}

fn to_pline(polygon: &Polygon) -> Option<Polyline<f64>> {
    let mut polygon = polygon.clone();
    polygon.dedup(MERGE_TOL);
    if polygon.vertex_count() < 3 || polygon.area() < MIN_AREA {
        return None;
    }
    let mut pline = Polyline::new();
    for v in &polygon.vertices {
        pline.add(v.x, v.y, 0.0);
    }
    pline.set_is_closed(true);
    Some(counter_clockwise(pline))
}

fn rectangle_pline(bbox: &BBox) -> Polyline<f64> {
    let mut pline = Polyline::new();
    pline.add(bbox.min.x, bbox.min.y, 0.0);
    pline.add(bbox.max.x, bbox.min.y, 0.0);
    pline.add(bbox.max.x, bbox.max.y, 0.0);
    pline.add(bbox.min.x, bbox.max.y, 0.0);
    pline.set_is_closed(true);
    pline
}

fn pline_bbox(pline: &Polyline<f64>) -> Option<BBox> {
    let points: Vec<Point> = pline
        .vertex_data
        .iter()
        .map(|v| Point::new(v.x, v.y))
        .collect();
    BBox::from_points(&points)
}

fn first_point(pline: &Polyline<f64>) -> Option<Point> {
    pline.vertex_data.first().map(|v| Point::new(v.x, v.y))
}

/// Replace every arc segment by chords spanning at most 5 degrees.
fn flatten_arcs(pline: &Polyline<f64>) -> Polyline<f64> {
    let n = pline.vertex_data.len();
    let mut out = Polyline::new();
    for i in 0..n {
        let v1 = pline.vertex_data[i];
        out.add(v1.x, v1.y, 0.0);
        if v1.bulge.abs() < 1e-12 || (i + 1 == n && !pline.is_closed) {
            continue;
        }
        let v2 = pline.vertex_data[(i + 1) % n];
        let start = Point::new(v1.x, v1.y);
        let chord = Point::new(v2.x, v2.y) - start;
        let len = chord.length();
        let dir = match chord.normalized() {
            Some(d) => d,
            None => continue,
        };
        let b = v1.bulge;
        let center = start + chord * 0.5 + dir.perp() * (len / 2.0 * (1.0 - b * b) / (2.0 * b));
        let radius = start.distance_to(&center);
        let a0 = (start.y - center.y).atan2(start.x - center.x);
        let sweep = 4.0 * b.atan();
        let steps = (sweep.abs().to_degrees() / MAX_ARC_STEP_DEG).ceil().max(1.0) as usize;
        for j in 1..steps {
            let a = a0 + sweep * j as f64 / steps as f64;
            out.add(center.x + radius * a.cos(), center.y + radius * a.sin(), 0.0);
        }
    }
    out.set_is_closed(pline.is_closed);
    out
}

fn offset_pline(pline: &Polyline<f64>, distance: f64) -> Vec<Polyline<f64>> {
    let options = PlineOffsetOptions {
        handle_self_intersects: true,
        ..Default::default()
    };
    pline
        .parallel_offset_opt(distance, &options)
        .into_iter()
        .map(|p| counter_clockwise(flatten_arcs(&p)))
        .filter(|p| area(p) >= MIN_AREA)
        .collect()
}

/// Boolean operation split into (solid, hole) contours, all counter-clockwise.
fn boolean_op(
    a: &Polyline<f64>,
    b: &Polyline<f64>,
    op: BooleanOp,
) -> (Vec<Polyline<f64>>, Vec<Polyline<f64>>) {
    let result = a.boolean(b, op);
    let keep = |plines: Vec<Polyline<f64>>| -> Vec<Polyline<f64>> {
        plines
            .into_iter()
            .map(counter_clockwise)
            .filter(|p| area(p) >= MIN_AREA)
            .collect()
    };
    (
        keep(result.pos_plines.into_iter().map(|p| p.pline).collect()),
        keep(result.neg_plines.into_iter().map(|p| p.pline).collect()),
    )
}

/// True if `inner` lies entirely inside `outer`.
fn encloses(outer: &Polyline<f64>, inner: &Polyline<f64>) -> bool {
    let (pos, neg) = boolean_op(outer, inner, BooleanOp::Or);
    let tol = MIN_AREA.max(area(outer) * 1e-9);
    pos.len() == 1 && neg.is_empty() && (area(&pos[0]) - area(outer)).abs() <= tol
}

// ── Union ────────────────────────────────────────────────────────────

/// Merge two pieces if their solid areas touch.
fn merge(a: &Piece, b: &Piece) -> Option<Piece> {
    let (pos, neg) = boolean_op(&a.outer, &b.outer, BooleanOp::Or);
    if pos.len() != 1 {
        return None;
    }
    // One piece sitting in the other's hole is an island, not an overlap.
    if a.holes.iter().any(|h| encloses(h, &b.outer)) || b.holes.iter().any(|h| encloses(h, &a.outer)) {
        return None;
    }
    let mut holes = neg;
    for h in &a.holes {
        holes.extend(boolean_op(h, &b.outer, BooleanOp::Not).0);
        for bh in &b.holes {
            holes.extend(boolean_op(h, bh, BooleanOp::And).0);
        }
    }
    for h in &b.holes {
        holes.extend(boolean_op(h, &a.outer, BooleanOp::Not).0);
    }
    let outer = pos.into_iter().next()?;
    Some(Piece { outer, holes })
}

fn union_cluster(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut merged: Vec<Piece> = Vec::new();
    for piece in pieces {
        let mut acc = piece;
        let mut rest = Vec::with_capacity(merged.len() + 1);
        for other in merged {
            match merge(&acc, &other) {
                Some(m) => acc = m,
                None => rest.push(other),
            }
        }
        rest.push(acc);
        merged = rest;
    }
    merged
}

/// Union pieces. Boxes that cannot overlap are never compared; each cluster
/// of overlapping boxes is merged on its own thread.
fn union_pieces(pieces: Vec<Piece>) -> Vec<Piece> {
    let boxes: Vec<BBox> = pieces
        .iter()
        .map(|p| pline_bbox(&p.outer).unwrap_or(BBox::new(Point::ORIGIN, Point::ORIGIN)))
        .collect();
    let groups = spatial::clusters(&boxes, MERGE_TOL);
    let mut slots: Vec<Option<Piece>> = pieces.into_iter().map(Some).collect();
    let clustered: Vec<Vec<Piece>> = groups
        .iter()
        .map(|g| g.iter().filter_map(|&i| slots[i].take()).collect())
        .collect();
    clustered
        .into_par_iter()
        .map(union_cluster)
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

fn union_plines(plines: Vec<Polyline<f64>>) -> Vec<Piece> {
    union_pieces(plines.into_iter().map(Piece::solid).collect())
}

/// Remove `cutters` (and the piece's own holes) from the piece's outer.
fn subtract(piece: &Piece, cutters: &[Polyline<f64>]) -> Vec<Piece> {
    let mut all: Vec<Polyline<f64>> = piece.holes.clone();
    all.extend(cutters.iter().cloned());
    if all.is_empty() {
        return vec![piece.clone()];
    }

    let mut outers = vec![piece.outer.clone()];
    let mut holes = Vec::new();
    let mut islands = Vec::new();
    for cut in union_plines(all) {
        let mut next = Vec::with_capacity(outers.len());
        for outer in outers {
            let (pos, neg) = boolean_op(&outer, &cut.outer, BooleanOp::Not);
            if neg.is_empty() {
                next.extend(pos);
            } else {
                holes.push(cut.outer.clone());
                next.push(outer);
            }
        }
        outers = next;
        for enclosed in &cut.holes {
            islands.extend(boolean_op(enclosed, &piece.outer, BooleanOp::And).0);
        }
    }

    let mut pieces: Vec<Piece> = outers.into_iter().map(Piece::solid).collect();
    for hole in holes {
        let owner = first_point(&hole).and_then(|p| {
            pieces
                .iter()
                .position(|piece| pline_polygon(&piece.outer).contains_point(&p))
        });
        match owner {
            Some(i) => pieces[i].holes.push(hole),
            None => log::warn!("Dropped a hole that lies outside every contour"),
        }
    }
    pieces.extend(islands.into_iter().map(Piece::solid));
    pieces
}

// ── Offset ───────────────────────────────────────────────────────────

fn offset_piece(piece: &Piece, distance: f64) -> Vec<Piece> {
    let cuts: Vec<Polyline<f64>> = piece
        .holes
        .iter()
        .flat_map(|h| offset_pline(h, -distance))
        .collect();
    offset_pline(&piece.outer, distance)
        .into_iter()
        .flat_map(|outer| subtract(&Piece::solid(outer), &cuts))
        .collect()
}

// ── Fracture ─────────────────────────────────────────────────────────

/// Split a piece with holes into hole-free pieces by cutting vertically
/// through the middle of its first hole.
fn fracture(piece: Piece, depth: usize) -> Result<Vec<Polyline<f64>>> {
    let first_hole = match piece.holes.first() {
        Some(h) => h,
        None => return Ok(vec![piece.outer]),
    };
    if depth > MAX_FRACTURE_DEPTH {
        return Err(LayoutError::invalid_geometry(format!(
            "could not fracture a contour with {} holes",
            piece.holes.len()
        )));
    }
    let (outer_box, hole_box) = match (pline_bbox(&piece.outer), pline_bbox(first_hole)) {
        (Some(o), Some(h)) => (o.expanded(1.0), h),
        _ => return Ok(Vec::new()),
    };
    let cut_x = hole_box.center().x;
    let halves = [
        BBox::new(outer_box.min, Point::new(cut_x, outer_box.max.y)),
        BBox::new(Point::new(cut_x, outer_box.min.y), outer_box.max),
    ];

    let mut out = Vec::new();
    for half in &halves {
        let (parts, _) = boolean_op(&piece.outer, &rectangle_pline(half), BooleanOp::And);
        for part in parts {
            for sub in subtract(&Piece::solid(part), &piece.holes) {
                out.extend(fracture(sub, depth + 1)?);
            }
        }
    }
    Ok(out)
}

fn pline_polygon(pline: &Polyline<f64>) -> Polygon {
    let vertices = pline
        .vertex_data
        .iter()
        .map(|v| Point::new(v.x, v.y))
        .collect();
    Polygon::new(GdsLayer::default(), vertices)
}

/// Split a contour that revisits a vertex (two regions touching at a
/// corner) into one loop per lobe.
fn split_pinches(vertices: &[Point]) -> Vec<Vec<Point>> {
    let mut loops = Vec::new();
    let mut stack: Vec<Point> = Vec::with_capacity(vertices.len());
    for &v in vertices {
        if let Some(k) = stack.iter().position(|p| p.approx_eq(&v, MERGE_TOL)) {
            let lobe = stack.split_off(k);
            if lobe.len() >= 3 {
                loops.push(lobe);
            }
        }
        stack.push(v);
    }
    if stack.len() >= 3 {
        loops.push(stack);
    }
    loops
}

fn emit(pieces: Vec<Piece>, layer: GdsLayer) -> Result<Vec<Polygon>> {
    let mut out = Vec::new();
    for piece in pieces {
        for pline in fracture(piece, 0)? {
            let mut contour = pline_polygon(&flatten_arcs(&pline));
            contour.dedup(MERGE_TOL);
            for lobe in split_pinches(&contour.vertices) {
                let polygon = Polygon::new(layer, lobe);
                if polygon.area() < MIN_AREA {
                    continue;
                }
                if !polygon.is_simple() {
                    return Err(LayoutError::invalid_geometry(format!(
                        "inset produced a self-intersecting contour with {} vertices on layer {}",
                        polygon.vertex_count(),
                        layer
                    )));
                }
                out.push(polygon);
            }
        }
    }
    Ok(out)
}

/// Union `polygons` and offset the union inward by `options.distance`
/// (or offset each polygon first, when `join_first` is false).
///
/// Polygons with fewer than three distinct vertices or no area are skipped.
/// Shrinking everything away yields an empty list.
pub fn inset_polygons(polygons: &[Polygon], options: &InsetOptions) -> Result<Vec<Polygon>> {
    let distance = require_finite("inset.distance", options.distance)?;
    let mut plines = Vec::with_capacity(polygons.len());
    for (i, polygon) in polygons.iter().enumerate() {
        match to_pline(polygon) {
            Some(p) => plines.push(p),
            None => log::warn!(
                "Skipping degenerate polygon #{} ({} vertices) on layer {}",
                i,
                polygon.vertex_count(),
                polygon.layer
            ),
        }
    }

    let pieces = if distance == 0.0 {
        union_plines(plines)
    } else if options.join_first {
        let offset: Vec<Piece> = union_plines(plines)
            .par_iter()
            .flat_map_iter(|piece| offset_piece(piece, distance))
            .collect();
        // Grown pieces may now overlap.
        if distance < 0.0 {
            union_pieces(offset)
        } else {
            offset
        }
    } else {
        let offset: Vec<Piece> = plines
            .par_iter()
            .flat_map_iter(|p| offset_piece(&Piece::solid(p.clone()), distance))
            .collect();
        union_pieces(offset)
    };

    let out = emit(pieces, options.layer)?;
    log::debug!(
        "Inset of {} polygons by {} produced {} polygons",
        polygons.len(),
        distance,
        out.len()
    );
    Ok(out)
}

impl Layout {
    /// Inset of every polygon (all layers) under `sources`, in world
    /// coordinates. Does not modify the layout.
    pub fn inset(&self, sources: &[DeviceId], options: &InsetOptions) -> Result<Vec<Polygon>> {
        let mut polygons = Vec::new();
        for &id in sources {
            polygons.extend(self.flatten(id)?);
        }
        inset_polygons(&polygons, options)
    }
}
