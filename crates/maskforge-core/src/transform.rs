use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, Point};

/// Sine and cosine of an angle in degrees, exact for multiples of 90.
pub fn sin_cos_degrees(degrees: f64) -> (f64, f64) {
    let d = normalize_degrees(degrees);
    if d == 0.0 {
        (0.0, 1.0)
    } else if d == 90.0 {
        (1.0, 0.0)
    } else if d == 180.0 {
        (0.0, -1.0)
    } else if d == 270.0 {
        (-1.0, 0.0)
    } else {
        d.to_radians().sin_cos()
    }
}

/// Wrap an angle into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

/// Signed difference `a - b` wrapped into (-180, 180].
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let d = normalize_degrees(a - b);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// A rigid transformation: optional reflection across the x axis, then a
/// counter-clockwise rotation, then a translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation offset.
    pub offset: Point,
    /// Rotation in degrees, counter-clockwise.
    pub rotation: f64,
    /// Mirror about X axis, applied before the rotation.
    pub mirror_x: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            offset: Point::ORIGIN,
            rotation: 0.0,
            mirror_x: false,
        }
    }

    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            offset: Point::new(x, y),
            ..Self::identity()
        }
    }

    pub fn rotation(degrees: f64) -> Self {
        Self {
            rotation: normalize_degrees(degrees),
            ..Self::identity()
        }
    }

    /// Rotation by `degrees` about `center`.
    pub fn rotation_about(degrees: f64, center: Point) -> Self {
        Self::translate(center.x, center.y)
            .compose(&Self::rotation(degrees))
            .compose(&Self::translate(-center.x, -center.y))
    }

    /// Reflection across the line through `p1` and `p2`.
    pub fn reflection(p1: Point, p2: Point) -> Self {
        let d = p2 - p1;
        let angle = d.y.atan2(d.x).to_degrees();
        let mirror = Self {
            offset: Point::ORIGIN,
            rotation: normalize_degrees(2.0 * angle),
            mirror_x: true,
        };
        Self::translate(p1.x, p1.y)
            .compose(&mirror)
            .compose(&Self::translate(-p1.x, -p1.y))
    }

    /// Apply only the linear part (mirror and rotation), for direction vectors.
    pub fn apply_vector(&self, v: &Point) -> Point {
        let y = if self.mirror_x { -v.y } else { v.y };
        let (sin_r, cos_r) = sin_cos_degrees(self.rotation);
        Point::new(v.x * cos_r - y * sin_r, v.x * sin_r + y * cos_r)
    }

    pub fn apply(&self, point: &Point) -> Point {
        let r = self.apply_vector(point);
        Point::new(r.x + self.offset.x, r.y + self.offset.y)
    }

    /// Transform a direction given as an angle in degrees.
    pub fn apply_angle(&self, degrees: f64) -> f64 {
        let a = if self.mirror_x { -degrees } else { degrees };
        normalize_degrees(a + self.rotation)
    }

    /// `self ∘ inner`: the transform that applies `inner` first, then `self`.
    pub fn compose(&self, inner: &Transform) -> Transform {
        let inner_rotation = if self.mirror_x {
            -inner.rotation
        } else {
            inner.rotation
        };
        Transform {
            offset: self.apply(&inner.offset),
            rotation: normalize_degrees(self.rotation + inner_rotation),
            mirror_x: self.mirror_x ^ inner.mirror_x,
        }
    }

    pub fn inverse(&self) -> Transform {
        let linear = Transform {
            offset: Point::ORIGIN,
            rotation: if self.mirror_x {
                self.rotation
            } else {
                normalize_degrees(-self.rotation)
            },
            mirror_x: self.mirror_x,
        };
        let back = linear.apply_vector(&self.offset);
        Transform {
            offset: Point::new(-back.x, -back.y),
            ..linear
        }
    }

    /// Bounding box of the transformed corners of `bbox`.
    pub fn apply_bbox(&self, bbox: &BBox) -> BBox {
        let corners = bbox.corners().map(|c| self.apply(&c));
        corners[1..]
            .iter()
            .fold(BBox::new(corners[0], corners[0]), |acc, c| {
                acc.union(&BBox::new(*c, *c))
            })
    }

    pub fn is_identity(&self) -> bool {
        self.offset == Point::ORIGIN && self.rotation == 0.0 && !self.mirror_x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        a.approx_eq(&b, 1e-9)
    }

    #[test]
    fn test_transform_translate() {
        let t = Transform::translate(10.0, 20.0);
        let p = Point::new(5.0, 5.0);
        let result = t.apply(&p);
        assert!((result.x - 15.0).abs() < 1e-10);
        assert!((result.y - 25.0).abs() < 1e-10);
    }

    #[test]
    fn test_quarter_turn_is_exact() {
        let t = Transform::rotation(90.0);
        assert_eq!(t.apply(&Point::new(1.0, 0.0)), Point::new(0.0, 1.0));
        assert_eq!(t.apply_angle(270.0), 0.0);
    }

    #[test]
    fn test_compose_and_inverse() {
        let a = Transform {
            offset: Point::new(3.0, -2.0),
            rotation: 30.0,
            mirror_x: true,
        };
        let b = Transform {
            offset: Point::new(-1.0, 4.0),
            rotation: 75.0,
            mirror_x: false,
        };
        let p = Point::new(2.5, 1.5);
        assert!(close(a.compose(&b).apply(&p), a.apply(&b.apply(&p))));
        assert!(close(a.inverse().apply(&a.apply(&p)), p));
        assert!(close(b.compose(&a).inverse().apply(&b.apply(&a.apply(&p))), p));
    }

    #[test]
    fn test_rotation_about_center_fixes_center() {
        let c = Point::new(5.0, 5.0);
        let t = Transform::rotation_about(37.0, c);
        assert!(close(t.apply(&c), c));
    }

    #[test]
    fn test_reflection_across_diagonal() {
        let t = Transform::reflection(Point::ORIGIN, Point::new(1.0, 1.0));
        assert!(close(t.apply(&Point::new(2.0, 0.0)), Point::new(0.0, 2.0)));
        // A port facing +x faces +y after the reflection.
        assert!((t.apply_angle(0.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_difference_wraps() {
        assert_eq!(angle_difference(10.0, 350.0), 20.0);
        assert_eq!(angle_difference(350.0, 10.0), -20.0);
    }
}
