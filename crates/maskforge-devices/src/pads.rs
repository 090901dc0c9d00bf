//! Contact pad shapes: the flagpole (a pad with an offset lead) and the tee
//! (a pad with a centered lead).

use serde::{Deserialize, Serialize};

use maskforge_core::error::require_positive;
use maskforge_core::{DeviceId, GdsLayer, Layout, LayoutError, Point, Polygon, Port, Result};

/// Chords per filleted corner.
const FILLET_SEGMENTS: usize = 16;

/// How the inside corner between a pad and its lead is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taper {
    None,
    #[default]
    Fillet,
    Straight,
}

/// Which way the flag hangs off the pole, named after the letter it resembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagShape {
    #[default]
    P,
    Q,
    B,
    D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagpoleConfig {
    pub flag_size: [f64; 2],
    pub pole_size: [f64; 2],
    pub shape: FlagShape,
    pub taper: Taper,
    pub layer: GdsLayer,
}

impl Default for FlagpoleConfig {
    fn default() -> Self {
        Self {
            flag_size: [4.0, 2.0],
            pole_size: [2.0, 1.0],
            shape: FlagShape::P,
            taper: Taper::Straight,
            layer: GdsLayer::default(),
        }
    }
}

impl FlagpoleConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("flagpole.flag_size[0]", self.flag_size[0])?;
        require_positive("flagpole.flag_size[1]", self.flag_size[1])?;
        require_positive("flagpole.pole_size[0]", self.pole_size[0])?;
        require_positive("flagpole.pole_size[1]", self.pole_size[1])?;
        if self.pole_size[0] > self.flag_size[0] {
            return Err(LayoutError::InvalidParameter {
                name: "flagpole.pole_size[0]".into(),
                reason: format!(
                    "pole width {} exceeds flag width {}",
                    self.pole_size[0], self.flag_size[0]
                ),
            });
        }
        Ok(())
    }
}

/// Finish the inside corners at `corners` with the given taper.
fn taper_corners(polygon: Polygon, corners: &[usize], amount: f64, taper: Taper) -> Polygon {
    let mut radii = vec![0.0; polygon.vertex_count()];
    for &i in corners {
        radii[i] = amount;
    }
    let mut out = match taper {
        Taper::None => return polygon,
        Taper::Fillet => polygon.fillet(&radii, FILLET_SEGMENTS),
        Taper::Straight => polygon.fillet(&radii, 1),
    };
    out.dedup(1e-9);
    out
}

/// A rectangular flag on top of a narrower pole that runs down from one of
/// its edges. Port `1` is the end of the pole, port `2` the far edge of the
/// flag; the two face opposite ways.
pub fn flagpole(layout: &mut Layout, config: &FlagpoleConfig) -> Result<DeviceId> {
    config.validate()?;
    let [mut f0, mut f1] = config.flag_size;
    let [mut p0, mut p1] = config.pole_size;
    let orientation = match config.shape {
        FlagShape::P => -90.0,
        FlagShape::Q => {
            f0 = -f0;
            p0 = -p0;
            -90.0
        }
        FlagShape::B => {
            f1 = -f1;
            p1 = -p1;
            90.0
        }
        FlagShape::D => {
            f0 = -f0;
            p0 = -p0;
            f1 = -f1;
            p1 = -p1;
            90.0
        }
    };

    let outline = Polygon::new(
        config.layer,
        vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, f1),
            Point::new(f0, f1),
            Point::new(f0, 0.0),
            Point::new(p0, 0.0),
            Point::new(p0, -p1),
            Point::new(0.0, -p1),
        ],
    );
    let amount = (f0 - p0).abs().min(p1.abs());
    let outline = taper_corners(outline, &[4], amount, config.taper);

    let id = layout.new_device("flagpole");
    layout.add_polygon(id, outline)?;
    layout.add_port(id, Port::new("1", Point::new(p0 / 2.0, -p1), p0.abs(), orientation))?;
    layout.add_port(
        id,
        Port::new("2", Point::new(f0 / 2.0, f1), f0.abs(), orientation - 180.0),
    )?;
    Ok(id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeeConfig {
    pub top_size: [f64; 2],
    pub leg_size: [f64; 2],
    pub taper: Taper,
    pub layer: GdsLayer,
}

impl Default for TeeConfig {
    fn default() -> Self {
        Self {
            top_size: [4.0, 2.0],
            leg_size: [1.0, 2.0],
            taper: Taper::None,
            layer: GdsLayer::default(),
        }
    }
}

impl TeeConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("tee.top_size[0]", self.top_size[0])?;
        require_positive("tee.top_size[1]", self.top_size[1])?;
        require_positive("tee.leg_size[0]", self.leg_size[0])?;
        require_positive("tee.leg_size[1]", self.leg_size[1])?;
        if self.leg_size[0] > self.top_size[0] {
            return Err(LayoutError::InvalidParameter {
                name: "tee.leg_size[0]".into(),
                reason: format!(
                    "leg width {} exceeds top width {}",
                    self.leg_size[0], self.top_size[0]
                ),
            });
        }
        Ok(())
    }
}

/// A pad (`top_size`) resting on a centered leg (`leg_size`) that hangs
/// below y = 0. Ports `N`, `S` (leg end), `E` and `W`.
pub fn tee(layout: &mut Layout, config: &TeeConfig) -> Result<DeviceId> {
    config.validate()?;
    let [f0, f1] = config.leg_size;
    let [p0, p1] = config.top_size;
    let xs = [f0, f0, p0, p0, -p0, -p0, -f0, -f0];
    let ys = [-f1, 0.0, 0.0, p1, p1, 0.0, 0.0, -f1];
    let outline = Polygon::new(
        config.layer,
        xs.iter()
            .zip(ys)
            .map(|(x, y)| Point::new(x / 2.0, y))
            .collect(),
    );
    let amount = ((f0 - p0).abs() / 2.0).min(f1.abs());
    let outline = taper_corners(outline, &[1, 6], amount, config.taper);

    let id = layout.new_device("tee");
    layout.add_polygon(id, outline)?;
    layout.add_port(id, Port::new("N", Point::new(0.0, p1), p0, 90.0))?;
    layout.add_port(id, Port::new("S", Point::new(0.0, -f1), f0, 270.0))?;
    layout.add_port(id, Port::new("E", Point::new(p0 / 2.0, p1 / 2.0), p1, 0.0))?;
    layout.add_port(id, Port::new("W", Point::new(-p0 / 2.0, p1 / 2.0), p1, 180.0))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskforge_core::PortRef;

    const L0: GdsLayer = GdsLayer::new(0, 0);

    #[test]
    fn test_flagpole_ports_face_apart() {
        let mut layout = Layout::new("t");
        let config = FlagpoleConfig {
            flag_size: [400.0, 150.0],
            pole_size: [20.0, 20.0],
            shape: FlagShape::P,
            taper: Taper::Fillet,
            layer: L0,
        };
        let id = flagpole(&mut layout, &config).unwrap();
        let p1 = layout.port(&PortRef::new(id, "1")).unwrap();
        let p2 = layout.port(&PortRef::new(id, "2")).unwrap();
        assert_eq!(p1.midpoint, Point::new(10.0, -20.0));
        assert_eq!(p1.orientation, 270.0);
        assert_eq!(p1.width, 20.0);
        assert_eq!(p2.midpoint, Point::new(200.0, 150.0));
        assert_eq!(p2.orientation, 90.0);

        let bb = layout.bbox(id).unwrap().unwrap();
        assert!((bb.width() - 400.0).abs() < 1e-9);
        assert!((bb.height() - 170.0).abs() < 1e-9);
        let polygon = &layout.device(id).unwrap().polygons[0];
        assert!(polygon.is_simple());
        // The fillet adds material in the corner under the flag.
        assert!(polygon.area() > 400.0 * 150.0 + 20.0 * 20.0);
    }

    #[test]
    fn test_flagpole_q_hangs_left() {
        let mut layout = Layout::new("t");
        let config = FlagpoleConfig {
            flag_size: [400.0, 300.0],
            pole_size: [20.0, 20.0],
            shape: FlagShape::Q,
            taper: Taper::Fillet,
            layer: L0,
        };
        let id = flagpole(&mut layout, &config).unwrap();
        let bb = layout.bbox(id).unwrap().unwrap();
        assert!((bb.min.x + 400.0).abs() < 1e-9);
        assert!((bb.max.x - 0.0).abs() < 1e-9);
        let p1 = layout.port(&PortRef::new(id, "1")).unwrap();
        assert_eq!(p1.midpoint, Point::new(-10.0, -20.0));
    }

    #[test]
    fn test_tee_geometry() {
        let mut layout = Layout::new("t");
        let config = TeeConfig {
            top_size: [250.0, 250.0],
            leg_size: [50.0, 50.0],
            taper: Taper::Fillet,
            layer: L0,
        };
        let id = tee(&mut layout, &config).unwrap();
        assert!((layout.width(id).unwrap() - 250.0).abs() < 1e-9);
        let s = layout.port(&PortRef::new(id, "S")).unwrap();
        assert_eq!(s.midpoint, Point::new(0.0, -50.0));
        assert_eq!(s.width, 50.0);
        assert!(layout.device(id).unwrap().polygons[0].is_simple());

        let bad = TeeConfig {
            leg_size: [300.0, 50.0],
            ..config
        };
        assert!(tee(&mut layout, &bad).is_err());
    }
}
