use serde::{Deserialize, Serialize};

use maskforge_core::error::require_positive;
use maskforge_core::{DeviceId, GdsLayer, Layout, Point, Polygon, Port, Result};

/// A rectangle with one port centered on each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassConfig {
    pub size: [f64; 2],
    pub layer: GdsLayer,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            size: [4.0, 2.0],
            layer: GdsLayer::default(),
        }
    }
}

impl CompassConfig {
    pub fn new(size: [f64; 2], layer: GdsLayer) -> Self {
        Self { size, layer }
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("compass.size[0]", self.size[0])?;
        require_positive("compass.size[1]", self.size[1])?;
        Ok(())
    }
}

/// Rectangle centered on the origin with ports `N`, `S`, `E` and `W`, each
/// spanning its whole side.
pub fn compass(layout: &mut Layout, config: &CompassConfig) -> Result<DeviceId> {
    config.validate()?;
    let [w, h] = config.size;
    let id = layout.new_device("compass");
    layout.add_polygon(
        id,
        Polygon::centered_rectangle(config.layer, Point::ORIGIN, w, h),
    )?;
    layout.add_port(id, Port::new("N", Point::new(0.0, h / 2.0), w, 90.0))?;
    layout.add_port(id, Port::new("S", Point::new(0.0, -h / 2.0), w, 270.0))?;
    layout.add_port(id, Port::new("E", Point::new(w / 2.0, 0.0), h, 0.0))?;
    layout.add_port(id, Port::new("W", Point::new(-w / 2.0, 0.0), h, 180.0))?;
    Ok(id)
}

/// Number of ports on each side of a [`compass_multi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SidePorts {
    pub north: usize,
    pub south: usize,
    pub east: usize,
    pub west: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassMultiConfig {
    pub size: [f64; 2],
    pub center: [f64; 2],
    pub ports: SidePorts,
    pub layer: GdsLayer,
}

impl Default for CompassMultiConfig {
    fn default() -> Self {
        Self {
            size: [4.0, 2.0],
            center: [0.0, 0.0],
            ports: SidePorts {
                north: 2,
                south: 2,
                ..Default::default()
            },
            layer: GdsLayer::default(),
        }
    }
}

impl CompassMultiConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("compass_multi.size[0]", self.size[0])?;
        require_positive("compass_multi.size[1]", self.size[1])?;
        Ok(())
    }
}

/// `count` evenly spaced positions splitting a side of half-length `half`
/// into equal segments, one port per segment center.
fn side_positions(half: f64, count: usize) -> Vec<f64> {
    let n = count as f64;
    let m = half - half / n;
    if count == 1 {
        return vec![0.0];
    }
    (0..count)
        .map(|i| -m + 2.0 * m * i as f64 / (n - 1.0))
        .collect()
}

/// Rectangle with several equal-width ports per side, named `N1..Nn`,
/// `S1..`, `E1..`, `W1..` in increasing x (north/south) or y (east/west).
pub fn compass_multi(layout: &mut Layout, config: &CompassMultiConfig) -> Result<DeviceId> {
    config.validate()?;
    let [w, h] = config.size;
    let center = Point::from(config.center);
    let (dx, dy) = (w / 2.0, h / 2.0);
    let id = layout.new_device("compass_multi");
    layout.add_polygon(id, Polygon::centered_rectangle(config.layer, center, w, h))?;

    let sides = [
        ("N", config.ports.north, 90.0),
        ("S", config.ports.south, 270.0),
        ("E", config.ports.east, 0.0),
        ("W", config.ports.west, 180.0),
    ];
    for (prefix, count, orientation) in sides {
        if count == 0 {
            continue;
        }
        let horizontal = prefix == "N" || prefix == "S";
        let half = if horizontal { dx } else { dy };
        let width = 2.0 * half / count as f64;
        for (i, pos) in side_positions(half, count).into_iter().enumerate() {
            let offset = match prefix {
                "N" => Point::new(pos, dy),
                "S" => Point::new(pos, -dy),
                "E" => Point::new(dx, pos),
                _ => Point::new(-dx, pos),
            };
            let name = format!("{}{}", prefix, i + 1);
            layout.add_port(id, Port::new(&name, center + offset, width, orientation))?;
        }
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskforge_core::{LayoutError, PortRef};

    #[test]
    fn test_compass_ports_sit_on_sides() {
        let mut layout = Layout::new("t");
        let id = compass(&mut layout, &CompassConfig::new([250.0, 100.0], GdsLayer::new(0, 0))).unwrap();
        let n = layout.port(&PortRef::new(id, "N")).unwrap();
        assert_eq!(n.midpoint, Point::new(0.0, 50.0));
        assert_eq!(n.width, 250.0);
        let w = layout.port(&PortRef::new(id, "W")).unwrap();
        assert_eq!(w.midpoint, Point::new(-125.0, 0.0));
        assert_eq!(w.orientation, 180.0);
        assert!(matches!(
            compass(&mut layout, &CompassConfig::new([0.0, 1.0], GdsLayer::default())),
            Err(LayoutError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_compass_multi_splits_sides_evenly() {
        let mut layout = Layout::new("t");
        let config = CompassMultiConfig {
            size: [400.0, 150.0],
            center: [0.0, -200.0],
            ports: SidePorts {
                north: 5,
                south: 1,
                ..Default::default()
            },
            layer: GdsLayer::new(0, 0),
        };
        let id = compass_multi(&mut layout, &config).unwrap();
        let xs: Vec<f64> = (1..=5)
            .map(|i| layout.port(&PortRef::new(id, format!("N{}", i))).unwrap().midpoint.x)
            .collect();
        let expected = [-160.0, -80.0, 0.0, 80.0, 160.0];
        for (x, e) in xs.iter().zip(expected) {
            assert!((x - e).abs() < 1e-9);
        }
        let n1 = layout.port(&PortRef::new(id, "N1")).unwrap();
        assert!((n1.width - 80.0).abs() < 1e-12);
        assert!((n1.midpoint.y + 125.0).abs() < 1e-12);
        let s1 = layout.port(&PortRef::new(id, "S1")).unwrap();
        assert_eq!(s1.midpoint, Point::new(0.0, -275.0));
        assert_eq!(s1.width, 400.0);
        assert!(layout.port(&PortRef::new(id, "E1")).is_err());
    }
}
