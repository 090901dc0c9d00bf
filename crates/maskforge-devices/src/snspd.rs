use serde::{Deserialize, Serialize};

use maskforge_core::error::require_positive;
use maskforge_core::route::sample_route;
use maskforge_core::{
    DeviceId, GdsLayer, Layout, LayoutError, Path, PathShape, Point, Port, Result, RouteShape,
    WidthShape,
};

/// Length of each terminal taper, in connector widths.
const TAPER_LENGTH_FACTOR: f64 = 3.0;
const TAPER_RESOLUTION: usize = 50;

/// A meandered nanowire detector with tapered leads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnspdConfig {
    pub wire_width: f64,
    /// Center-to-center distance between meander rows.
    pub wire_pitch: f64,
    /// Outer extent of the meander, x then y.
    pub size: [f64; 2],
    /// Width the leads taper out to.
    pub connector_width: f64,
    pub terminals_same_side: bool,
    pub layer: GdsLayer,
}

impl Default for SnspdConfig {
    fn default() -> Self {
        Self {
            wire_width: 0.2,
            wire_pitch: 0.6,
            size: [6.0, 10.0],
            connector_width: 1.0,
            terminals_same_side: false,
            layer: GdsLayer::default(),
        }
    }
}

impl SnspdConfig {
    pub fn validate(&self) -> Result<()> {
        let ww = require_positive("snspd.wire_width", self.wire_width)?;
        let pitch = require_positive("snspd.wire_pitch", self.wire_pitch)?;
        require_positive("snspd.connector_width", self.connector_width)?;
        let sx = require_positive("snspd.size[0]", self.size[0])?;
        require_positive("snspd.size[1]", self.size[1])?;
        if pitch <= ww {
            return Err(invalid(
                "snspd.wire_pitch",
                format!("pitch {} must exceed the wire width {}", pitch, ww),
            ));
        }
        if sx <= 2.0 * ww {
            return Err(invalid(
                "snspd.size[0]",
                format!("{} leaves no room for two turns of width {}", sx, ww),
            ));
        }
        let rows = self.rows();
        if rows < 2 {
            return Err(invalid(
                "snspd.size[1]",
                format!("{} fits fewer than two rows at pitch {}", self.size[1], pitch),
            ));
        }
        if self.terminals_same_side && (rows - 1) as f64 * pitch < self.connector_width {
            return Err(invalid(
                "snspd.connector_width",
                "leads on the same side would overlap",
            ));
        }
        Ok(())
    }

    /// Number of meander rows: as many as fit in the height, adjusted so the
    /// terminals end up on the requested sides.
    pub fn rows(&self) -> usize {
        let fit = ((self.size[1] - self.wire_width) / self.wire_pitch).floor().max(0.0) as usize + 1;
        let odd = fit % 2 == 1;
        match (self.terminals_same_side, odd) {
            (true, true) | (false, false) => fit.saturating_sub(1),
            _ => fit,
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> LayoutError {
    LayoutError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Meander center-line, rows stacked upward from `y0` and centered on the
/// origin. Row 0 starts at the west edge.
fn meander_centerline(config: &SnspdConfig, rows: usize) -> Vec<Point> {
    let ww = config.wire_width;
    let half_x = config.size[0] / 2.0;
    let turn_x = half_x - ww / 2.0;
    let y0 = -((rows - 1) as f64) * config.wire_pitch / 2.0;
    let row_y = |k: usize| y0 + k as f64 * config.wire_pitch;

    let mut points = vec![Point::new(-half_x, row_y(0))];
    for k in 0..rows {
        let eastward = k % 2 == 0;
        if k + 1 == rows {
            let end_x = if eastward { half_x } else { -half_x };
            points.push(Point::new(end_x, row_y(k)));
        } else {
            let x = if eastward { turn_x } else { -turn_x };
            points.push(Point::new(x, row_y(k)));
            points.push(Point::new(x, row_y(k + 1)));
        }
    }
    points
}

/// Meandered nanowire with sine-width tapers out to `connector_width` at
/// both terminals. Port `1` leaves the first row westward; port `2` leaves
/// the last row eastward (westward when `terminals_same_side`).
pub fn snspd_expanded(layout: &mut Layout, config: &SnspdConfig) -> Result<DeviceId> {
    config.validate()?;
    let ww = config.wire_width;
    let rows = config.rows();
    let centerline = meander_centerline(config, rows);
    let wire = Path::uniform(centerline.clone(), ww);
    let outline = wire.outline(config.layer).ok_or_else(|| LayoutError::InvalidGeometry {
        reason: "snspd meander has no extent".into(),
    })?;

    let first = centerline[0];
    let last = centerline[centerline.len() - 1];
    let terminals = [
        Port::new("1", first, ww, 180.0),
        Port::new("2", last, ww, if last.x > 0.0 { 0.0 } else { 180.0 }),
    ];

    let id = layout.new_device("snspd_expanded");
    layout.add_polygon(id, outline)?;
    let taper_shape = RouteShape {
        path: PathShape::Straight,
        width: WidthShape::Sine,
        width_start: Some(ww),
        width_end: Some(config.connector_width),
        resolution: TAPER_RESOLUTION,
    };
    let taper_length = TAPER_LENGTH_FACTOR * config.connector_width;
    for terminal in &terminals {
        let end = terminal.midpoint + terminal.normal() * taper_length;
        let lead = Port::new(&terminal.name, end, config.connector_width, terminal.orientation + 180.0);
        let taper = sample_route(terminal, &lead, &taper_shape, config.layer)?;
        layout.add_polygon(id, taper.outline)?;
        layout.add_port(
            id,
            Port::new(&terminal.name, end, config.connector_width, terminal.orientation),
        )?;
    }

    let squares = wire.length() / ww;
    layout.set_info(id, "rows", rows)?;
    layout.set_info(id, "num_squares", squares)?;
    log::debug!("snspd meander: {} rows, {:.0} squares", rows, squares);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskforge_core::PortRef;

    fn integrator_snspd() -> SnspdConfig {
        SnspdConfig {
            wire_width: 0.5,
            wire_pitch: 1.5,
            size: [20.0, 20.0],
            connector_width: 5.0,
            terminals_same_side: false,
            layer: GdsLayer::new(0, 0),
        }
    }

    #[test]
    fn test_row_parity_follows_terminals() {
        let config = integrator_snspd();
        assert_eq!(config.rows(), 13);
        let same = SnspdConfig {
            terminals_same_side: true,
            ..config.clone()
        };
        assert_eq!(same.rows() % 2, 0);
        assert!(same.rows() >= 2);
    }

    #[test]
    fn test_meander_ports_and_extent() {
        let mut layout = Layout::new("t");
        let id = snspd_expanded(&mut layout, &integrator_snspd()).unwrap();
        let p1 = layout.port(&PortRef::new(id, "1")).unwrap();
        let p2 = layout.port(&PortRef::new(id, "2")).unwrap();
        assert_eq!(p1.orientation, 180.0);
        assert_eq!(p2.orientation, 0.0);
        assert_eq!(p1.width, 5.0);
        assert!((p1.midpoint.x + 10.0 + 15.0).abs() < 1e-9);
        assert!((p2.midpoint.x - 25.0).abs() < 1e-9);
        assert!((p1.midpoint.y + 9.0).abs() < 1e-9);
        assert!((p2.midpoint.y - 9.0).abs() < 1e-9);

        let device = layout.device(id).unwrap();
        assert_eq!(device.polygon_count(), 3);
        assert!(device.polygons.iter().all(|p| p.is_simple()));
        assert!(device.info["num_squares"].as_f64().unwrap() > 13.0 * 19.0 / 0.5);
    }

    #[test]
    fn test_pitch_must_exceed_width() {
        let mut layout = Layout::new("t");
        let config = SnspdConfig {
            wire_pitch: 0.5,
            ..integrator_snspd()
        };
        assert!(matches!(
            snspd_expanded(&mut layout, &config),
            Err(LayoutError::InvalidParameter { .. })
        ));
    }
}
