//! The SNSPD-yTron integrator: a row of meandered detectors fanned out to
//! contact pads on one side and into a shared connector on the other, which
//! feeds one arm of a yTron. Every conducting feature is also covered by an
//! inset copy on the pad metal layer.

use serde::{Deserialize, Serialize};

use maskforge_core::error::{require_finite, require_positive};
use maskforge_core::{
    ArrayHandle, DeviceId, GdsLayer, InsetOptions, Justify, Layer, LayerStack, Layout,
    LayoutError, PathShape, Point, PortRef, Result, RouteSpec, WidthShape,
};

use crate::compass::{compass, compass_multi, CompassConfig, CompassMultiConfig, SidePorts};
use crate::pads::{flagpole, tee, FlagShape, FlagpoleConfig, Taper, TeeConfig};
use crate::snspd::{snspd_expanded, SnspdConfig};
use crate::ytron::{ytron_round, YtronConfig};

/// Layer holding the device outlines.
pub const OUTLINE: &str = "outline";
/// Layer holding the inset pad metal and the label.
pub const PAD_METAL: &str = "pad_metal";

/// Layers the integrator draws on.
pub fn default_layers() -> LayerStack {
    LayerStack::new()
        .with_layer(Layer::new(OUTLINE, 0, 0).with_description("Nanowire and pad outlines"))
        .with_layer(Layer::new(PAD_METAL, 1, 0).with_description("Inset contact metal"))
}

/// Parameters of one integrator. Defaults reproduce the reference layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub nanowire_width: f64,
    /// Wire width over meander pitch.
    pub fill_factor: f64,
    pub contact_pad_width: f64,
    pub snspd_size: [f64; 2],
    pub pad_flag_size: [f64; 2],
    pub pad_pole_size: [f64; 2],
    pub pad_spacing: f64,
    pub connector_size: [f64; 2],
    pub inset_distance: f64,
    pub num_devices: usize,
    pub label: String,
    pub label_size: f64,
    pub label_center: [f64; 2],
    pub rho: f64,
    pub theta: f64,
    pub arm_length: f64,
    pub source_length: f64,
    pub width_right: f64,
    pub width_left: f64,
    pub theta_resolution: f64,
    pub route_resolution: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            nanowire_width: 0.5,
            fill_factor: 1.0 / 3.0,
            contact_pad_width: 5.0,
            snspd_size: [20.0, 20.0],
            pad_flag_size: [250.0, 250.0],
            pad_pole_size: [50.0, 50.0],
            pad_spacing: 50.0,
            connector_size: [400.0, 150.0],
            inset_distance: 1.0,
            num_devices: 5,
            label: "A1".to_string(),
            label_size: 200.0,
            label_center: [-500.0, -500.0],
            rho: 1.0,
            theta: 5.0,
            arm_length: 50.0,
            source_length: 50.0,
            width_right: 20.0,
            width_left: 20.0,
            theta_resolution: 10.0,
            route_resolution: 99,
        }
    }
}

impl IntegratorConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("integrator.nanowire_width", self.nanowire_width)?;
        require_positive("integrator.contact_pad_width", self.contact_pad_width)?;
        require_positive("integrator.pad_spacing", self.pad_spacing)?;
        require_positive("integrator.label_size", self.label_size)?;
        require_finite("integrator.inset_distance", self.inset_distance)?;
        require_finite("integrator.label_center[0]", self.label_center[0])?;
        require_finite("integrator.label_center[1]", self.label_center[1])?;
        for (name, size) in [
            ("snspd_size", self.snspd_size),
            ("pad_flag_size", self.pad_flag_size),
            ("pad_pole_size", self.pad_pole_size),
            ("connector_size", self.connector_size),
        ] {
            require_positive(&format!("integrator.{}[0]", name), size[0])?;
            require_positive(&format!("integrator.{}[1]", name), size[1])?;
        }
        if !(self.fill_factor > 0.0 && self.fill_factor < 1.0) {
            return Err(LayoutError::InvalidParameter {
                name: "integrator.fill_factor".into(),
                reason: format!("expected a value in (0, 1), got {}", self.fill_factor),
            });
        }
        if self.num_devices == 0 {
            return Err(LayoutError::InvalidParameter {
                name: "integrator.num_devices".into(),
                reason: "at least one detector is required".into(),
            });
        }
        Ok(())
    }

    fn snspd(&self, layer: GdsLayer) -> SnspdConfig {
        SnspdConfig {
            wire_width: self.nanowire_width,
            wire_pitch: self.nanowire_width / self.fill_factor,
            size: self.snspd_size,
            connector_width: self.contact_pad_width,
            terminals_same_side: false,
            layer,
        }
    }

    fn ytron(&self, layer: GdsLayer) -> YtronConfig {
        YtronConfig {
            rho: self.rho,
            theta: self.theta,
            arm_length: self.arm_length,
            source_length: self.source_length,
            width_right: self.width_right,
            width_left: self.width_left,
            theta_resolution: self.theta_resolution,
            layer,
        }
    }
}

/// Handles to the parts of a built integrator.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub device: DeviceId,
    pub snspds: ArrayHandle,
    pub pads: ArrayHandle,
    pub connector: DeviceId,
    pub ytron: DeviceId,
    pub ground: DeviceId,
    /// Detector to connector routes, in detector order.
    pub connector_routes: Vec<DeviceId>,
    /// Pad to detector routes, in detector order.
    pub pad_routes: Vec<DeviceId>,
}

fn sine_route(from: PortRef, to: PortRef, resolution: usize, layer: GdsLayer) -> RouteSpec {
    RouteSpec::new(from, to)
        .path(PathShape::Sine)
        .width(WidthShape::Sine)
        .resolution(resolution)
        .layer(layer)
}

/// Build one integrator as a detached device centered near the origin.
pub fn snspd_integrator(
    layout: &mut Layout,
    config: &IntegratorConfig,
    layers: &LayerStack,
) -> Result<Integrator> {
    config.validate()?;
    let outline = layers.require(OUTLINE)?;
    let pad_metal = layers.require(PAD_METAL)?;
    let n = config.num_devices;
    let res = config.route_resolution;
    let device = layout.new_device("snspd_integrator");

    // Shared connector with one north port per detector.
    let connector = compass_multi(
        layout,
        &CompassMultiConfig {
            size: config.connector_size,
            center: [0.0, -200.0],
            ports: SidePorts {
                north: n,
                south: 1,
                ..Default::default()
            },
            layer: outline,
        },
    )?;
    layout.add_device(device, connector, Default::default())?;

    let pole = [config.width_left, config.width_left];
    let feed = flagpole(
        layout,
        &FlagpoleConfig {
            flag_size: config.connector_size,
            pole_size: pole,
            shape: FlagShape::P,
            taper: Taper::Fillet,
            layer: outline,
        },
    )?;
    layout.add_device(device, feed, Default::default())?;
    layout.connect(&PortRef::new(feed, "2"), &PortRef::new(connector, "S1"))?;

    let ytron = ytron_round(layout, &config.ytron(outline))?;
    layout.add_device(device, ytron, Default::default())?;
    layout.connect(&PortRef::new(ytron, "right"), &PortRef::new(feed, "1"))?;

    let bias = flagpole(
        layout,
        &FlagpoleConfig {
            flag_size: [config.connector_size[0], 2.0 * config.connector_size[1]],
            pole_size: pole,
            shape: FlagShape::Q,
            taper: Taper::Fillet,
            layer: outline,
        },
    )?;
    layout.add_device(device, bias, Default::default())?;
    layout.connect(&PortRef::new(bias, "1"), &PortRef::new(ytron, "left"))?;
    let lift = 200.0;
    layout.move_by(bias, Point::new(-lift * config.theta.to_radians().sin(), lift))?;

    let ground = compass(layout, &CompassConfig::new(config.pad_flag_size, outline))?;
    layout.add_device(device, ground, Default::default())?;
    let source = layout.port(&PortRef::new(ytron, "source"))?;
    let ground_center = layout.center(ground)?;
    layout
        .move_to(ground, ground_center, source.midpoint)?
        .move_by(ground, Point::new(0.0, -500.0))?;

    // Contact pads above the detectors.
    let pad = tee(
        layout,
        &TeeConfig {
            top_size: config.pad_flag_size,
            leg_size: config.pad_pole_size,
            taper: Taper::Fillet,
            layer: outline,
        },
    )?;
    let pad_pitch = layout.width(pad)? + config.pad_spacing;
    let pads = layout.add_array(
        device,
        pad,
        Point::new(-pad_pitch * n as f64 / 2.0, 1000.0),
        Point::new(pad_pitch, 0.0),
        n,
    )?;
    layout.remove_device(pad)?;

    let snspd = snspd_expanded(layout, &config.snspd(outline))?;
    layout.rotate(snspd, 90.0, None)?;
    let snspd_pitch = layout.width(snspd)? + 20.0;
    let snspds = layout.add_array(
        device,
        snspd,
        Point::new(-100.0, 300.0),
        Point::new(snspd_pitch, 0.0),
        n,
    )?;
    layout.remove_device(snspd)?;

    let connector_specs: Vec<RouteSpec> = snspds
        .iter()
        .enumerate()
        .map(|(i, s)| {
            sine_route(
                PortRef::new(s, "1"),
                PortRef::new(connector, format!("N{}", i + 1)),
                res,
                outline,
            )
            .widths(None, Some(4.0 * config.contact_pad_width))
        })
        .collect();
    let connector_routes = layout.add_routes(device, &connector_specs)?;

    let pad_specs: Vec<RouteSpec> = pads
        .iter()
        .zip(snspds.iter())
        .map(|(p, s)| sine_route(PortRef::new(p, "S"), PortRef::new(s, "2"), res, outline))
        .collect();
    let pad_routes = layout.add_routes(device, &pad_specs)?;

    let ground_route = layout.add_route(
        device,
        &sine_route(
            PortRef::new(ytron, "source"),
            PortRef::new(ground, "N"),
            res,
            outline,
        ),
    )?;
    let bias_route = layout.add_route(
        device,
        &RouteSpec::new(PortRef::new(ytron, "left"), PortRef::new(bias, "1"))
            .path(PathShape::Straight)
            .width(WidthShape::Sine)
            .resolution(res)
            .layer(outline),
    )?;

    // Pad metal over each electrically connected group.
    let inset = InsetOptions::new(config.inset_distance, pad_metal);
    let mut pad_group = vec![pads.device];
    pad_group.extend(&pad_routes);
    let mut connector_group = vec![feed, connector];
    connector_group.extend(&connector_routes);
    let groups = [
        vec![ground_route, ground],
        pad_group,
        connector_group,
        vec![bias, bias_route],
    ];
    for group in &groups {
        let metal = layout.inset(group, &inset)?;
        layout.add_polygons(device, metal)?;
    }

    let label = layout.text(&config.label, config.label_size, Justify::Right, pad_metal)?;
    layout.add_device(device, label, Default::default())?;
    let label_center = layout.center(label)?;
    layout.move_to(label, label_center, Point::from(config.label_center))?;

    log::info!(
        "Built integrator '{}' with {} detectors (rho = {})",
        config.label,
        n,
        config.rho
    );
    Ok(Integrator {
        device,
        snspds,
        pads,
        connector,
        ytron,
        ground,
        connector_routes,
        pad_routes,
    })
}

/// A row of integrators that differ only in yTron `rho`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    pub base: IntegratorConfig,
    pub rho: Vec<f64>,
    /// Clearance between neighbouring integrators.
    pub gap: f64,
    pub label_prefix: String,
    pub annotation_layer: GdsLayer,
    pub layers: LayerStack,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            base: IntegratorConfig::default(),
            rho: vec![0.5, 1.0, 2.0, 4.0, 8.0],
            gap: 300.0,
            label_prefix: "A".to_string(),
            annotation_layer: GdsLayer::new(255, 0),
            layers: default_layers(),
        }
    }
}

impl RowConfig {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        require_finite("row.gap", self.gap)?;
        if self.rho.is_empty() {
            return Err(LayoutError::InvalidParameter {
                name: "row.rho".into(),
                reason: "the sweep needs at least one value".into(),
            });
        }
        for &rho in &self.rho {
            require_positive("row.rho", rho)?;
        }
        Ok(())
    }
}

/// Integrators placed left to right, the n-th shifted by
/// `n * (its width + gap)`, each annotated with its `rho`.
pub fn build_rho_row(layout: &mut Layout, config: &RowConfig) -> Result<DeviceId> {
    config.validate()?;
    let row = layout.new_device(&format!("row_{}", config.label_prefix.to_lowercase()));
    for (n, &rho) in config.rho.iter().enumerate() {
        let member = IntegratorConfig {
            rho,
            label: format!("{}{}", config.label_prefix, n + 1),
            ..config.base.clone()
        };
        let integrator = snspd_integrator(layout, &member, &config.layers)?.device;
        let width = layout.width(integrator)?;
        layout.add_device(row, integrator, Default::default())?;
        layout.move_by(integrator, Point::new((width + config.gap) * n as f64, 0.0))?;
        let center = layout.center(integrator)?;
        layout.label(
            row,
            &format!("Varying yTron rho\n rho = {}", rho),
            center,
            config.annotation_layer,
        )?;
    }
    log::info!("Built row of {} integrators", config.rho.len());
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskforge_core::offset::inset_polygons;
    use maskforge_core::Polygon;

    fn route_outline(layout: &Layout, id: DeviceId) -> Polygon {
        let polygons = layout.flatten(id).unwrap();
        assert_eq!(polygons.len(), 1);
        polygons.into_iter().next().unwrap()
    }

    /// Widths along a route outline: vertex k pairs with vertex 2n-1-k.
    fn sampled_widths(outline: &Polygon) -> Vec<f64> {
        let v = &outline.vertices;
        let n = v.len() / 2;
        (0..n).map(|k| v[k].distance_to(&v[2 * n - 1 - k])).collect()
    }

    #[test]
    fn test_connector_routes_fan_in() {
        let mut layout = Layout::new("t");
        let config = IntegratorConfig::default();
        let built = snspd_integrator(&mut layout, &config, &default_layers()).unwrap();
        assert_eq!(built.snspds.len(), 5);
        assert_eq!(built.connector_routes.len(), 5);

        let mut outlines = Vec::new();
        for (i, &route) in built.connector_routes.iter().enumerate() {
            let outline = route_outline(&layout, route);
            assert_eq!(outline.vertex_count(), 2 * 99);
            let widths = sampled_widths(&outline);
            assert!((widths[0] - 5.0).abs() < 1e-9, "route {} starts at {}", i, widths[0]);
            assert!((widths[98] - 20.0).abs() < 1e-9);
            assert!(widths.windows(2).all(|w| w[1] >= w[0] - 1e-12));

            let target = layout
                .port(&PortRef::new(built.connector, format!("N{}", i + 1)))
                .unwrap();
            let end = (outline.vertices[98] + outline.vertices[99]) * 0.5;
            assert!(end.approx_eq(&target.midpoint, 1e-9));
            outlines.push(outline);
        }

        let starts: Vec<Point> = outlines.iter().map(|o| o.vertices[0]).collect();
        for i in 0..starts.len() {
            for j in i + 1..starts.len() {
                assert!(!starts[i].approx_eq(&starts[j], 1e-6));
            }
        }
        let sum: f64 = outlines.iter().map(|o| o.area()).sum();
        let union = inset_polygons(&outlines, &InsetOptions::new(0.0, GdsLayer::new(0, 0))).unwrap();
        assert_eq!(union.len(), 5);
        let union_area: f64 = union.iter().map(|p| p.area()).sum();
        assert!((union_area - sum).abs() < 1e-6 * sum);
    }

    #[test]
    fn test_pad_metal_and_label() {
        let mut layout = Layout::new("t");
        let built =
            snspd_integrator(&mut layout, &IntegratorConfig::default(), &default_layers()).unwrap();
        let polygons = layout.flatten(built.device).unwrap();
        let metal: Vec<&Polygon> = polygons
            .iter()
            .filter(|p| p.layer == GdsLayer::new(1, 0))
            .collect();
        assert!(!metal.is_empty());
        assert!(metal.iter().all(|p| p.is_simple()));

        let ground = layout.port(&PortRef::new(built.ground, "N")).unwrap();
        let source = layout.port(&PortRef::new(built.ytron, "source")).unwrap();
        assert!((ground.midpoint.x - source.midpoint.x).abs() < 1e-9);
        assert!((source.midpoint.y - ground.midpoint.y - 375.0).abs() < 1e-9);
        // Templates are not left behind as stray roots.
        assert_eq!(layout.root_devices().count(), 1);
    }

    #[test]
    fn test_row_annotations() {
        let mut layout = Layout::new("t");
        let config = RowConfig {
            rho: vec![0.5, 1.0],
            ..Default::default()
        };
        let row = build_rho_row(&mut layout, &config).unwrap();
        let notes = layout.flatten_annotations(row).unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].text, "Varying yTron rho\n rho = 0.5");
        assert_eq!(notes[1].text, "Varying yTron rho\n rho = 1");
        assert_eq!(notes[1].layer, GdsLayer::new(255, 0));
        assert!(notes[1].position.x > notes[0].position.x);
        assert_eq!(layout.device(row).unwrap().child_count(), 2);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RowConfig =
            serde_json::from_str(r#"{"rho": [2.0], "base": {"num_devices": 3}}"#).unwrap();
        assert_eq!(config.rho, vec![2.0]);
        assert_eq!(config.base.num_devices, 3);
        assert_eq!(config.base.pad_flag_size, [250.0, 250.0]);
        assert_eq!(config.layers.require(PAD_METAL).unwrap(), GdsLayer::new(1, 0));
    }

    #[test]
    fn test_rejects_bad_fill_factor() {
        let mut layout = Layout::new("t");
        let config = IntegratorConfig {
            fill_factor: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            snspd_integrator(&mut layout, &config, &default_layers()),
            Err(LayoutError::InvalidParameter { .. })
        ));
        let missing = LayerStack::new().with_layer(Layer::new(OUTLINE, 0, 0));
        assert!(snspd_integrator(&mut layout, &IntegratorConfig::default(), &missing).is_err());
    }
}
