use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::geometry::Point;
use crate::transform::{normalize_degrees, Transform};

/// A named, directed connection anchor.
///
/// `orientation` is the outward normal in degrees; two ports are joined by
/// making them face each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub midpoint: Point,
    pub orientation: f64,
    pub width: f64,
}

impl Port {
    pub fn new(name: &str, midpoint: Point, width: f64, orientation: f64) -> Self {
        Self {
            name: name.to_string(),
            midpoint,
            orientation: normalize_degrees(orientation),
            width,
        }
    }

    /// Unit outward normal.
    pub fn normal(&self) -> Point {
        Point::from_angle(self.orientation)
    }

    pub fn transformed(&self, transform: &Transform) -> Port {
        Port {
            name: self.name.clone(),
            midpoint: transform.apply(&self.midpoint),
            orientation: transform.apply_angle(self.orientation),
            width: self.width,
        }
    }

    /// The two ends of the port edge, left end first when looking outward.
    pub fn endpoints(&self) -> (Point, Point) {
        let half = self.normal().perp() * (self.width / 2.0);
        (self.midpoint + half, self.midpoint - half)
    }
}

/// Handle to a port: the device that declares or exposes it and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub device: DeviceId,
    pub name: String,
}

impl PortRef {
    pub fn new(device: DeviceId, name: impl Into<String>) -> Self {
        Self {
            device,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_normal_and_endpoints() {
        let port = Port::new("N", Point::new(0.0, 5.0), 4.0, 90.0);
        assert_eq!(port.normal(), Point::new(0.0, 1.0));
        let (left, right) = port.endpoints();
        assert_eq!(left, Point::new(-2.0, 5.0));
        assert_eq!(right, Point::new(2.0, 5.0));
    }

    #[test]
    fn test_port_orientation_follows_mirror() {
        let port = Port::new("1", Point::new(1.0, 1.0), 1.0, 45.0);
        let t = Transform {
            mirror_x: true,
            ..Transform::identity()
        };
        let moved = port.transformed(&t);
        assert_eq!(moved.midpoint, Point::new(1.0, -1.0));
        assert!((moved.orientation - 315.0).abs() < 1e-12);
        assert_eq!(Port::new("W", Point::ORIGIN, 1.0, -90.0).orientation, 270.0);
    }
}
