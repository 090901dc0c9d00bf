//! Smooth, optionally tapered wires between two ports.
//!
//! A route is sampled in the frame of its first port: the origin sits on
//! `port1`'s midpoint and +x points along `port1`'s outward normal. The
//! center-line runs to `port2`'s midpoint, and the outline is built by
//! offsetting each sample by half the local width along the normal of the
//! center-line tangent.

use std::f64::consts::PI;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::error::{LayoutError, Result};
use crate::geometry::{Path, Point, Polygon, EPSILON};
use crate::layer::GdsLayer;
use crate::layout::Layout;
use crate::port::{Port, PortRef};
use crate::transform::Transform;

/// Center-line shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathShape {
    /// Linear interpolation between the midpoints.
    Straight,
    /// Lateral offset eased by a half-period cosine, so the path leaves and
    /// arrives along the first port's axis.
    #[default]
    Sine,
}

/// Width profile along the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidthShape {
    #[default]
    Straight,
    Sine,
}

impl PathShape {
    /// Local center-line point and tangent at `t` in [0, 1] for a route
    /// ending at `(sx, sy)`.
    fn sample(self, t: f64, sx: f64, sy: f64) -> (Point, Point) {
        match self {
            PathShape::Straight => (Point::new(sx * t, sy * t), Point::new(sx, sy)),
            PathShape::Sine => (
                Point::new(sx * t, sy * (1.0 - (PI * t).cos()) / 2.0),
                Point::new(sx, sy * PI / 2.0 * (PI * t).sin()),
            ),
        }
    }
}

impl WidthShape {
    pub fn width_at(self, t: f64, start: f64, end: f64) -> f64 {
        match self {
            WidthShape::Straight => start + (end - start) * t,
            WidthShape::Sine => start + (end - start) * (1.0 - (PI * t).cos()) / 2.0,
        }
    }
}

/// How to draw a route, independent of which ports it joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteShape {
    pub path: PathShape,
    pub width: WidthShape,
    /// Defaults to the first port's width.
    pub width_start: Option<f64>,
    /// Defaults to the second port's width.
    pub width_end: Option<f64>,
    /// Number of center-line samples, at least 2.
    pub resolution: usize,
}

impl Default for RouteShape {
    fn default() -> Self {
        Self {
            path: PathShape::Sine,
            width: WidthShape::Straight,
            width_start: None,
            width_end: None,
            resolution: 99,
        }
    }
}

/// A route between two port handles, drawn on one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub port1: PortRef,
    pub port2: PortRef,
    pub shape: RouteShape,
    pub layer: GdsLayer,
}

impl RouteSpec {
    pub fn new(port1: PortRef, port2: PortRef) -> Self {
        Self {
            port1,
            port2,
            shape: RouteShape::default(),
            layer: GdsLayer::default(),
        }
    }

    pub fn path(mut self, path: PathShape) -> Self {
        self.shape.path = path;
        self
    }

    pub fn width(mut self, width: WidthShape) -> Self {
        self.shape.width = width;
        self
    }

    pub fn widths(mut self, start: Option<f64>, end: Option<f64>) -> Self {
        self.shape.width_start = start;
        self.shape.width_end = end;
        self
    }

    pub fn resolution(mut self, resolution: usize) -> Self {
        self.shape.resolution = resolution;
        self
    }

    pub fn layer(mut self, layer: GdsLayer) -> Self {
        self.layer = layer;
        self
    }
}

/// A sampled route in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePath {
    /// Center-line samples with the width at each.
    pub centerline: Path,
    /// Closed outline: left edge forward, right edge backward.
    pub outline: Polygon,
}

impl RoutePath {
    pub fn length(&self) -> f64 {
        self.centerline.length()
    }
}

/// Sample the route from `port1` to `port2`.
pub fn sample_route(port1: &Port, port2: &Port, shape: &RouteShape, layer: GdsLayer) -> Result<RoutePath> {
    let n = shape.resolution;
    if n < 2 {
        return Err(LayoutError::invalid_parameter(
            "route.resolution",
            format!("need at least 2 samples, got {}", n),
        ));
    }
    let w0 = shape.width_start.unwrap_or(port1.width);
    let w1 = shape.width_end.unwrap_or(port2.width);
    if !w0.is_finite() || !w1.is_finite() {
        return Err(LayoutError::invalid_parameter(
            "route.width",
            format!("widths must be finite, got {} and {}", w0, w1),
        ));
    }
    if port1.midpoint.distance_to(&port2.midpoint) <= EPSILON {
        return Err(LayoutError::degenerate_route(format!(
            "ports '{}' and '{}' coincide at ({}, {})",
            port1.name, port2.name, port1.midpoint.x, port1.midpoint.y
        )));
    }

    let frame = Transform {
        offset: port1.midpoint,
        rotation: port1.orientation,
        mirror_x: false,
    };
    let end = frame.inverse().apply(&port2.midpoint);

    let mut centers = Vec::with_capacity(n);
    let mut widths = Vec::with_capacity(n);
    let mut left = Vec::with_capacity(2 * n);
    let mut right = Vec::with_capacity(n);
    for k in 0..n {
        let t = k as f64 / (n - 1) as f64;
        let (center, tangent) = shape.path.sample(t, end.x, end.y);
        let w = shape.width.width_at(t, w0, w1);
        if w.is_nan() || w <= 0.0 {
            return Err(LayoutError::degenerate_route(format!(
                "width {} at sample {} of {} between '{}' and '{}'",
                w, k, n, port1.name, port2.name
            )));
        }
        let normal = tangent.normalized().unwrap_or(Point::new(1.0, 0.0)).perp();
        let half = normal * (w / 2.0);
        left.push(frame.apply(&(center + half)));
        right.push(frame.apply(&(center - half)));
        centers.push(frame.apply(&center));
        widths.push(w);
    }
    right.reverse();
    left.extend(right);

    let outline = Polygon::new(layer, left);
    if !outline.is_simple() {
        return Err(LayoutError::invalid_geometry(format!(
            "route from '{}' to '{}' folds over itself; increase the port separation or reduce the widths",
            port1.name, port2.name
        )));
    }
    Ok(RoutePath {
        centerline: Path::new(centers, widths),
        outline,
    })
}

impl Layout {
    /// Sample a route between two ports without changing the layout.
    pub fn route_path(&self, spec: &RouteSpec) -> Result<RoutePath> {
        let p1 = self.port(&spec.port1)?;
        let p2 = self.port(&spec.port2)?;
        sample_route(&p1, &p2, &spec.shape, spec.layer)
    }

    fn insert_route(&mut self, path: RoutePath) -> Result<DeviceId> {
        let id = self.new_device("route");
        let length = path.length();
        self.add_polygon(id, path.outline)?;
        self.set_info(id, "length", length)?;
        Ok(id)
    }

    /// Build a detached route device in world coordinates. It has no ports.
    pub fn route(&mut self, spec: &RouteSpec) -> Result<DeviceId> {
        let path = self.route_path(spec)?;
        self.insert_route(path)
    }

    /// Build a route and place it in `parent` without moving it.
    pub fn add_route(&mut self, parent: DeviceId, spec: &RouteSpec) -> Result<DeviceId> {
        let id = self.route(spec)?;
        let to_parent = self.world_transform(parent)?.inverse();
        self.add_device(parent, id, to_parent)
    }

    /// Sample many routes in parallel, then create their devices in input
    /// order. Nothing is inserted if any route fails.
    pub fn route_many(&mut self, specs: &[RouteSpec]) -> Result<Vec<DeviceId>> {
        let this: &Layout = self;
        let paths: Vec<RoutePath> = specs
            .par_iter()
            .map(|spec| this.route_path(spec))
            .collect::<Result<_>>()?;
        paths.into_iter().map(|path| self.insert_route(path)).collect()
    }

    /// [`Layout::route_many`], then place every route in `parent`.
    pub fn add_routes(&mut self, parent: DeviceId, specs: &[RouteSpec]) -> Result<Vec<DeviceId>> {
        let to_parent = self.world_transform(parent)?.inverse();
        let ids = self.route_many(specs)?;
        for &id in &ids {
            self.add_device(parent, id, to_parent)?;
        }
        log::debug!("Placed {} routes", ids.len());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const L0: GdsLayer = GdsLayer::new(0, 0);

    fn facing_pair() -> (Port, Port) {
        (
            Port::new("a", Point::new(0.0, 0.0), 2.0, 0.0),
            Port::new("b", Point::new(10.0, 0.0), 6.0, 180.0),
        )
    }

    #[test]
    fn test_straight_width_is_linear() {
        let (a, b) = facing_pair();
        let shape = RouteShape {
            path: PathShape::Straight,
            width: WidthShape::Straight,
            resolution: 11,
            ..Default::default()
        };
        let route = sample_route(&a, &b, &shape, L0).unwrap();
        for (k, w) in route.centerline.widths.iter().enumerate() {
            let t = k as f64 / 10.0;
            assert!((w - (2.0 + t * 4.0)).abs() < 1e-12);
        }
        assert!((route.length() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_sine_width_is_monotonic_and_eased() {
        let a = Port::new("a", Point::new(0.0, 0.0), 5.0, 90.0);
        let b = Port::new("b", Point::new(30.0, 200.0), 1.0, 270.0);
        let shape = RouteShape {
            path: PathShape::Sine,
            width: WidthShape::Sine,
            width_end: Some(20.0),
            ..Default::default()
        };
        let route = sample_route(&a, &b, &shape, L0).unwrap();
        let widths = &route.centerline.widths;
        assert_eq!(widths.len(), 99);
        assert!(widths.windows(2).all(|w| w[1] >= w[0]));
        assert!((widths[0] - 5.0).abs() < 1e-12);
        assert!((widths[49] - 12.5).abs() < 1e-9);
        assert!((widths[98] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_sine_path_meets_both_port_edges() {
        let a = Port::new("a", Point::new(0.0, 0.0), 4.0, 90.0);
        let b = Port::new("b", Point::new(20.0, 50.0), 8.0, 270.0);
        let shape = RouteShape {
            width: WidthShape::Sine,
            ..Default::default()
        };
        let route = sample_route(&a, &b, &shape, L0).unwrap();
        let v = &route.outline.vertices;
        let n = v.len();
        // First left and last right vertex span port a's edge.
        let (al, ar) = a.endpoints();
        assert!(v[0].approx_eq(&ar, 1e-9) || v[0].approx_eq(&al, 1e-9));
        assert!(v[n - 1].approx_eq(&ar, 1e-9) || v[n - 1].approx_eq(&al, 1e-9));
        // The far end is flush with port b's edge.
        let (bl, br) = b.endpoints();
        let end_left = v[n / 2 - 1];
        let end_right = v[n / 2];
        assert!(end_left.approx_eq(&br, 1e-9), "{:?} vs {:?}", end_left, br);
        assert!(end_right.approx_eq(&bl, 1e-9), "{:?} vs {:?}", end_right, bl);
    }

    #[test]
    fn test_two_samples_make_a_trapezoid() {
        let (a, b) = facing_pair();
        let shape = RouteShape {
            path: PathShape::Straight,
            resolution: 2,
            ..Default::default()
        };
        let route = sample_route(&a, &b, &shape, L0).unwrap();
        assert_eq!(
            route.outline.vertices,
            vec![
                Point::new(0.0, 1.0),
                Point::new(10.0, 3.0),
                Point::new(10.0, -3.0),
                Point::new(0.0, -1.0),
            ]
        );
    }

    #[test]
    fn test_coincident_ports_are_degenerate() {
        let a = Port::new("a", Point::new(3.0, 3.0), 2.0, 0.0);
        let b = Port::new("b", Point::new(3.0, 3.0), 2.0, 0.0);
        let err = sample_route(&a, &b, &RouteShape::default(), L0).unwrap_err();
        assert!(matches!(err, LayoutError::DegenerateRoute { .. }));
    }

    #[test]
    fn test_non_positive_width_is_degenerate() {
        let (a, b) = facing_pair();
        let shape = RouteShape {
            width_end: Some(-1.0),
            ..Default::default()
        };
        let err = sample_route(&a, &b, &shape, L0).unwrap_err();
        assert!(matches!(err, LayoutError::DegenerateRoute { .. }));

        let shape = RouteShape {
            resolution: 1,
            ..Default::default()
        };
        assert!(matches!(
            sample_route(&a, &b, &shape, L0),
            Err(LayoutError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_route_device_in_layout() {
        let mut layout = Layout::new("t");
        let left = layout.new_device("left");
        let right = layout.new_device("right");
        let p1 = layout
            .add_port(left, Port::new("E", Point::new(0.0, 0.0), 2.0, 0.0))
            .unwrap();
        let p2 = layout
            .add_port(right, Port::new("W", Point::new(40.0, 10.0), 2.0, 180.0))
            .unwrap();
        let top = layout.new_device("top");
        layout.move_by(top, Point::new(-5.0, 0.0)).unwrap();

        let spec = RouteSpec::new(p1, p2).layer(GdsLayer::new(2, 0));
        let id = layout.add_route(top, &spec).unwrap();
        let device = layout.device(id).unwrap();
        assert!(device.ports().is_empty());
        assert!(device.info["length"].as_f64().unwrap() > 40.0);
        let flat = layout.flatten(top).unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].layer, GdsLayer::new(2, 0));
        let bb = flat[0].bbox().unwrap();
        assert!((bb.min.x - 0.0).abs() < 1e-9 && (bb.max.x - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_routes_keeps_order() {
        let mut layout = Layout::new("t");
        let top = layout.new_device("top");
        let mut specs = Vec::new();
        for i in 0..4 {
            let a = layout.new_device("a");
            let b = layout.new_device("b");
            let x = i as f64 * 20.0;
            let pa = layout
                .add_port(a, Port::new("S", Point::new(x, 0.0), 1.0, 270.0))
                .unwrap();
            let pb = layout
                .add_port(b, Port::new("N", Point::new(x * 2.0, -50.0), 4.0, 90.0))
                .unwrap();
            specs.push(RouteSpec::new(pa, pb));
        }
        let ids = layout.add_routes(top, &specs).unwrap();
        assert_eq!(ids.len(), 4);
        for (i, id) in ids.iter().enumerate() {
            let start = layout.route_path(&specs[i]).unwrap().centerline.points[0];
            assert!(start.approx_eq(&Point::new(i as f64 * 20.0, 0.0), 1e-9));
            let device = layout.device(*id).unwrap();
            assert_eq!(device.parent(), Some(top));
            assert!(device.info["length"].as_f64().unwrap() >= 50.0 - 1e-9);
        }
    }
}
