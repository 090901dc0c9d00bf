use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::layer::GdsLayer;
use crate::transform::Transform;

/// Coordinates closer than this (in micrometres) are treated as equal.
pub const EPSILON: f64 = 1e-9;

/// A 2D point in layout coordinates (micrometres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `degrees` (counter-clockwise from +x).
    pub fn from_angle(degrees: f64) -> Self {
        let (sin, cos) = crate::transform::sin_cos_degrees(degrees);
        Self { x: cos, y: sin }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dot(&self, other: &Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z component of the 3D cross product.
    pub fn cross(&self, other: &Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Left-hand perpendicular (rotated +90 degrees).
    pub fn perp(&self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    pub fn normalized(&self) -> Option<Self> {
        let len = self.length();
        if len > EPSILON {
            Some(Self {
                x: self.x / len,
                y: self.y / len,
            })
        } else {
            None
        }
    }

    pub fn approx_eq(&self, other: &Point, tol: f64) -> bool {
        (self.x - other.x).abs() <= tol && (self.y - other.y).abs() <= tol
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Point::new(p[0], p[1])
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BBox::new(*first, *first);
        for p in iter {
            bbox.min.x = bbox.min.x.min(p.x);
            bbox.min.y = bbox.min.y.min(p.y);
            bbox.max.x = bbox.max.x.max(p.x);
            bbox.max.y = bbox.max.y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// Corners in counter-clockwise order starting at `min`.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ]
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Grow the box by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: self.min.translate(-margin, -margin),
            max: self.max.translate(margin, margin),
        }
    }
}

/// A closed polygon on one mask layer. The first vertex is not repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub layer: GdsLayer,
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(layer: GdsLayer, vertices: Vec<Point>) -> Self {
        Self { layer, vertices }
    }

    /// Axis-aligned rectangle from two opposite corners, counter-clockwise.
    pub fn rectangle(layer: GdsLayer, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let (x_lo, x_hi) = (x1.min(x2), x1.max(x2));
        let (y_lo, y_hi) = (y1.min(y2), y1.max(y2));
        Self::new(
            layer,
            vec![
                Point::new(x_lo, y_lo),
                Point::new(x_hi, y_lo),
                Point::new(x_hi, y_hi),
                Point::new(x_lo, y_hi),
            ],
        )
    }

    /// Rectangle of the given size centered on `center`.
    pub fn centered_rectangle(layer: GdsLayer, center: Point, width: f64, height: f64) -> Self {
        Self::rectangle(
            layer,
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.vertices)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Shoelace area; positive for counter-clockwise winding.
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            acc += a.cross(&b);
        }
        acc / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn transformed(&self, transform: &Transform) -> Polygon {
        Polygon {
            layer: self.layer,
            vertices: self.vertices.iter().map(|p| transform.apply(p)).collect(),
        }
    }

    /// Even-odd point containment. Points on the boundary may go either way.
    pub fn contains_point(&self, p: &Point) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Drop consecutive vertices closer than `tol`, including a repeated
    /// closing vertex.
    pub fn dedup(&mut self, tol: f64) {
        self.vertices.dedup_by(|b, a| a.approx_eq(b, tol));
        while self.vertices.len() > 1 {
            let first = self.vertices[0];
            match self.vertices.last() {
                Some(last) if last.approx_eq(&first, tol) => {
                    self.vertices.pop();
                }
                _ => break,
            }
        }
    }

    /// True if the contour is closed, has at least three vertices, encloses a
    /// nonzero area, and no two non-adjacent edges touch or cross.
    pub fn is_simple(&self) -> bool {
        let n = self.vertices.len();
        if n < 3 || self.area() <= EPSILON * EPSILON {
            return false;
        }
        if self.vertices.iter().any(|p| !p.is_finite()) {
            return false;
        }
        let scale = self
            .bbox()
            .map(|b| b.width().max(b.height()))
            .unwrap_or(1.0)
            .max(1.0);
        let tol = scale * 1e-12;
        for i in 0..n {
            let a1 = self.vertices[i];
            let a2 = self.vertices[(i + 1) % n];
            for j in (i + 2)..n {
                // The last edge is adjacent to the first.
                if i == 0 && j == n - 1 {
                    continue;
                }
                let b1 = self.vertices[j];
                let b2 = self.vertices[(j + 1) % n];
                if segments_touch(a1, a2, b1, b2, tol) {
                    return false;
                }
            }
        }
        true
    }

    /// Replace the vertex at each index with a circular arc of the given
    /// radius tangent to both adjacent edges. Zero radii leave vertices alone.
    /// `segments` is the number of chords per arc.
    pub fn fillet(&self, radii: &[f64], segments: usize) -> Polygon {
        let n = self.vertices.len();
        let mut out = Vec::with_capacity(n + radii.len() * segments);
        for i in 0..n {
            let v = self.vertices[i];
            let radius = radii.get(i).copied().unwrap_or(0.0);
            if radius <= 0.0 || segments == 0 {
                out.push(v);
                continue;
            }
            let prev = self.vertices[(i + n - 1) % n];
            let next = self.vertices[(i + 1) % n];
            match fillet_arc(prev, v, next, radius, segments) {
                Some(arc) => out.extend(arc),
                None => out.push(v),
            }
        }
        Polygon::new(self.layer, out)
    }
}

fn orient(a: Point, b: Point, c: Point) -> f64 {
    (b - a).cross(&(c - a))
}

fn on_segment(a: Point, b: Point, p: Point, tol: f64) -> bool {
    p.x >= a.x.min(b.x) - tol
        && p.x <= a.x.max(b.x) + tol
        && p.y >= a.y.min(b.y) - tol
        && p.y <= a.y.max(b.y) + tol
}

fn segments_touch(a1: Point, a2: Point, b1: Point, b2: Point, tol: f64) -> bool {
    let d1 = orient(b1, b2, a1);
    let d2 = orient(b1, b2, a2);
    let d3 = orient(a1, a2, b1);
    let d4 = orient(a1, a2, b2);
    let area_tol = tol * ((a2 - a1).length() + (b2 - b1).length());
    if ((d1 > area_tol && d2 < -area_tol) || (d1 < -area_tol && d2 > area_tol))
        && ((d3 > area_tol && d4 < -area_tol) || (d3 < -area_tol && d4 > area_tol))
    {
        return true;
    }
    (d1.abs() <= area_tol && on_segment(b1, b2, a1, tol))
        || (d2.abs() <= area_tol && on_segment(b1, b2, a2, tol))
        || (d3.abs() <= area_tol && on_segment(a1, a2, b1, tol))
        || (d4.abs() <= area_tol && on_segment(a1, a2, b2, tol))
}

/// Arc points replacing corner `v` between neighbours `prev` and `next`.
fn fillet_arc(prev: Point, v: Point, next: Point, radius: f64, segments: usize) -> Option<Vec<Point>> {
    let u1 = (prev - v).normalized()?;
    let u2 = (next - v).normalized()?;
    let cos_phi = u1.dot(&u2).clamp(-1.0, 1.0);
    let phi = cos_phi.acos();
    if phi < 1e-6 || (std::f64::consts::PI - phi) < 1e-6 {
        return None;
    }
    let tangent_dist = radius / (phi / 2.0).tan();
    let max_dist = prev.distance_to(&v).min(next.distance_to(&v));
    if tangent_dist > max_dist + EPSILON {
        return None;
    }
    let bisector = (u1 + u2).normalized()?;
    let center = v + bisector * (radius / (phi / 2.0).sin());
    let t1 = v + u1 * tangent_dist;
    let t2 = v + u2 * tangent_dist;
    let a1 = (t1.y - center.y).atan2(t1.x - center.x);
    let a2 = (t2.y - center.y).atan2(t2.x - center.x);
    let mut sweep = a2 - a1;
    while sweep > std::f64::consts::PI {
        sweep -= 2.0 * std::f64::consts::PI;
    }
    while sweep < -std::f64::consts::PI {
        sweep += 2.0 * std::f64::consts::PI;
    }
    let points = (0..=segments)
        .map(|k| {
            let a = a1 + sweep * k as f64 / segments as f64;
            Point::new(center.x + radius * a.cos(), center.y + radius * a.sin())
        })
        .collect();
    Some(points)
}

/// A center-line with a width at every point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub points: Vec<Point>,
    pub widths: Vec<f64>,
}

impl Path {
    pub fn new(points: Vec<Point>, widths: Vec<f64>) -> Self {
        Self { points, widths }
    }

    pub fn uniform(points: Vec<Point>, width: f64) -> Self {
        let widths = vec![width; points.len()];
        Self { points, widths }
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    /// Outline of the path with mitred joins: the left edge forward, then
    /// the right edge backward. Returns `None` for fewer than two distinct points.
    pub fn outline(&self, layer: GdsLayer) -> Option<Polygon> {
        let mut pts: Vec<(Point, f64)> = Vec::with_capacity(self.points.len());
        for (p, w) in self.points.iter().zip(&self.widths) {
            match pts.last() {
                Some((last, _)) if last.approx_eq(p, EPSILON) => {}
                _ => pts.push((*p, *w)),
            }
        }
        if pts.len() < 2 {
            return None;
        }
        let n = pts.len();
        let mut left = Vec::with_capacity(n);
        let mut right = Vec::with_capacity(n);
        for i in 0..n {
            let (p, w) = pts[i];
            let half = w / 2.0;
            let incoming = if i > 0 { (p - pts[i - 1].0).normalized() } else { None };
            let outgoing = if i + 1 < n { (pts[i + 1].0 - p).normalized() } else { None };
            let offset = match (incoming, outgoing) {
                (Some(d1), Some(d2)) => {
                    let n1 = d1.perp();
                    let n2 = d2.perp();
                    let denom = 1.0 + n1.dot(&n2);
                    if denom < 1e-6 {
                        n1 * half
                    } else {
                        (n1 + n2) * (half / denom)
                    }
                }
                (Some(d), None) | (None, Some(d)) => d.perp() * half,
                (None, None) => return None,
            };
            left.push(p + offset);
            right.push(p - offset);
        }
        right.reverse();
        left.extend(right);
        Some(Polygon::new(layer, left))
    }
}
