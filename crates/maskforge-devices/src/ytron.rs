use serde::{Deserialize, Serialize};

use maskforge_core::error::require_positive;
use maskforge_core::{DeviceId, GdsLayer, Layout, LayoutError, Point, Polygon, Port, Result};

/// A yTron: two arms joined at a rounded intersection above a wide source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YtronConfig {
    /// Radius of curvature of the intersection between the arms.
    pub rho: f64,
    /// Half-angle between the arms, in degrees.
    pub theta: f64,
    pub arm_length: f64,
    pub source_length: f64,
    pub width_right: f64,
    pub width_left: f64,
    /// Angular step along the intersection arc, in degrees.
    pub theta_resolution: f64,
    pub layer: GdsLayer,
}

impl Default for YtronConfig {
    fn default() -> Self {
        Self {
            rho: 1.0,
            theta: 2.5,
            arm_length: 50.0,
            source_length: 500.0,
            width_right: 200.0,
            width_left: 200.0,
            theta_resolution: 10.0,
            layer: GdsLayer::default(),
        }
    }
}

impl YtronConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("ytron.rho", self.rho)?;
        require_positive("ytron.arm_length", self.arm_length)?;
        require_positive("ytron.source_length", self.source_length)?;
        require_positive("ytron.width_right", self.width_right)?;
        require_positive("ytron.width_left", self.width_left)?;
        require_positive("ytron.theta_resolution", self.theta_resolution)?;
        if !(self.theta > 0.0 && self.theta < 90.0) {
            return Err(LayoutError::InvalidParameter {
                name: "ytron.theta".into(),
                reason: format!("expected an angle in (0, 90) degrees, got {}", self.theta),
            });
        }
        Ok(())
    }
}

/// yTron outline with ports `left` and `right` at the arm ends (facing up)
/// and `source` at the bottom (facing down).
pub fn ytron_round(layout: &mut Layout, config: &YtronConfig) -> Result<DeviceId> {
    config.validate()?;
    let rho = config.rho;
    let theta = config.theta.to_radians();
    let (wl, wr) = (config.width_left, config.width_right);

    let start = -(std::f64::consts::PI - theta);
    let span = std::f64::consts::PI - 2.0 * theta;
    let steps = (span / config.theta_resolution.to_radians()) as usize + 1;
    let mut points: Vec<Point> = (0..=steps)
        .map(|k| {
            let a = start + span * k as f64 / steps as f64;
            Point::new(rho * a.cos(), rho * a.sin() + rho)
        })
        .collect();

    let xc = rho * theta.cos();
    let yc = rho * (1.0 - theta.sin());
    let arm_x = config.arm_length * theta.sin();
    let arm_y = config.arm_length * theta.cos();
    let bottom = yc - config.source_length;
    points.extend([
        Point::new(xc + arm_x, yc + arm_y),
        Point::new(xc + arm_x + wr, yc + arm_y),
        Point::new(xc + wr, yc),
        Point::new(xc + wr, bottom),
        Point::new(0.0, bottom),
        Point::new(-(xc + wl), bottom),
        Point::new(-(xc + wl), yc),
        Point::new(-(xc + arm_x + wl), yc + arm_y),
        Point::new(-(xc + arm_x), yc + arm_y),
    ]);

    let id = layout.new_device("ytron");
    layout.add_polygon(id, Polygon::new(config.layer, points))?;
    layout.add_port(
        id,
        Port::new("left", Point::new(-(xc + arm_x + wl / 2.0), yc + arm_y), wl, 90.0),
    )?;
    layout.add_port(
        id,
        Port::new("right", Point::new(xc + arm_x + wr / 2.0, yc + arm_y), wr, 90.0),
    )?;
    layout.add_port(
        id,
        Port::new("source", Point::new((wr - wl) / 2.0, bottom), wl + wr + 2.0 * xc, 270.0),
    )?;
    layout.set_info(id, "rho", rho)?;
    layout.set_info(id, "theta", config.theta)?;
    Ok(id)
}
