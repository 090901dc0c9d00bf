use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::device::{Annotation, Device, DeviceId, ExposedPort};
use crate::error::{require_finite, require_positive, LayoutError, Result};
use crate::geometry::{BBox, Point, Polygon};
use crate::layer::GdsLayer;
use crate::port::{Port, PortRef};
use crate::transform::Transform;

/// Alias chains longer than this are treated as broken.
const MAX_ALIAS_DEPTH: usize = 64;

/// The arena that owns every device of a layout build.
///
/// Devices refer to each other by [`DeviceId`]; a device has at most one
/// parent, and reusing a device in a second place requires
/// [`Layout::copy_device`]. All positions passed to or returned from
/// placement and port queries are in the world frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    /// Library name.
    pub name: String,
    /// All devices indexed by ID.
    devices: HashMap<DeviceId, Device>,
}

impl Layout {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            devices: HashMap::new(),
        }
    }

    // ── Device management ────────────────────────────────────────────

    /// Create an empty, detached device.
    pub fn new_device(&mut self, name: &str) -> DeviceId {
        let device = Device::new(name);
        let id = device.id;
        self.devices.insert(id, device);
        id
    }

    pub fn device(&self, id: DeviceId) -> Result<&Device> {
        self.devices.get(&id).ok_or(LayoutError::DeviceNotFound(id))
    }

    pub(crate) fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device> {
        self.devices
            .get_mut(&id)
            .ok_or(LayoutError::DeviceNotFound(id))
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Devices without a parent.
    pub fn root_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values().filter(|d| d.parent.is_none())
    }

    /// Drop a detached device and its whole subtree from the arena.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<()> {
        let device = self.device(id)?;
        if let Some(parent) = device.parent {
            return Err(LayoutError::Ownership {
                device: device.name.clone(),
                reason: format!(
                    "still placed in '{}'; detach it before removing",
                    self.device(parent)?.name
                ),
            });
        }
        for node in self.subtree_ids(id)? {
            self.devices.remove(&node);
        }
        Ok(())
    }

    /// Ids of `id` and all its descendants, depth-first in placement order.
    pub fn subtree_ids(&self, id: DeviceId) -> Result<Vec<DeviceId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let device = self.device(next)?;
            out.push(next);
            stack.extend(device.children.iter().rev());
        }
        Ok(out)
    }

    /// True if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: DeviceId, id: DeviceId) -> bool {
        let mut current = self.devices.get(&id).and_then(|d| d.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.devices.get(&parent).and_then(|d| d.parent);
        }
        false
    }

    // ── Content ──────────────────────────────────────────────────────

    /// Add a polygon given in the device's own frame.
    pub fn add_polygon(&mut self, id: DeviceId, polygon: Polygon) -> Result<()> {
        self.device_mut(id)?.polygons.push(polygon);
        Ok(())
    }

    /// Add polygons given in the world frame (e.g. routes or inset output),
    /// converting them into the device's frame so they stay in place.
    pub fn add_polygons(
        &mut self,
        id: DeviceId,
        polygons: impl IntoIterator<Item = Polygon>,
    ) -> Result<usize> {
        let to_local = self.world_transform(id)?.inverse();
        let device = self.device_mut(id)?;
        let before = device.polygons.len();
        device
            .polygons
            .extend(polygons.into_iter().map(|p| p.transformed(&to_local)));
        Ok(device.polygons.len() - before)
    }

    /// Record a metadata value on a device, replacing any previous value.
    pub fn set_info(
        &mut self,
        id: DeviceId,
        key: &str,
        value: impl Into<serde_json::Value>,
    ) -> Result<()> {
        self.device_mut(id)?.info.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Declare a port in the device's own frame.
    pub fn add_port(&mut self, id: DeviceId, port: Port) -> Result<PortRef> {
        require_positive(&format!("port '{}' width", port.name), port.width)?;
        if !port.midpoint.is_finite() || !port.orientation.is_finite() {
            return Err(LayoutError::invalid_parameter(
                &format!("port '{}'", port.name),
                "midpoint and orientation must be finite",
            ));
        }
        let name = port.name.clone();
        self.device_mut(id)?.insert_port(port)?;
        Ok(PortRef::new(id, name))
    }

    /// Re-export a descendant's port on `id` under `alias`. The alias follows
    /// the descendant when it moves.
    pub fn expose_port(&mut self, id: DeviceId, target: &PortRef, alias: &str) -> Result<PortRef> {
        if !self.is_ancestor(id, target.device) {
            return Err(LayoutError::Ownership {
                device: self.device(target.device)?.name.clone(),
                reason: format!(
                    "is not a descendant of '{}', so its port cannot be exposed there",
                    self.device(id)?.name
                ),
            });
        }
        self.port(target)?;
        self.device_mut(id)?.insert_exposed(ExposedPort {
            name: alias.to_string(),
            target: target.clone(),
        })?;
        Ok(PortRef::new(id, alias))
    }

    /// Attach a text annotation at a world position.
    pub fn label(&mut self, id: DeviceId, text: &str, position: Point, layer: GdsLayer) -> Result<()> {
        let local = self.world_transform(id)?.inverse().apply(&position);
        self.device_mut(id)?.annotations.push(Annotation {
            text: text.to_string(),
            position: local,
            layer,
        });
        Ok(())
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    /// Place the detached device `child` inside `parent`, with `at` composed
    /// onto the child's own placement. Returns the child id as its handle.
    pub fn add_device(&mut self, parent: DeviceId, child: DeviceId, at: Transform) -> Result<DeviceId> {
        let parent_name = self.device(parent)?.name.clone();
        let child_device = self.device(child)?;
        if child == parent {
            return Err(LayoutError::Ownership {
                device: child_device.name.clone(),
                reason: "a device cannot contain itself".to_string(),
            });
        }
        if let Some(owner) = child_device.parent {
            return Err(LayoutError::Ownership {
                device: child_device.name.clone(),
                reason: format!(
                    "already placed in '{}'; copy it before placing it in '{}'",
                    self.device(owner)?.name,
                    parent_name
                ),
            });
        }
        if self.is_ancestor(child, parent) {
            return Err(LayoutError::Ownership {
                device: child_device.name.clone(),
                reason: format!("is an ancestor of '{}'", parent_name),
            });
        }

        let node = self.device_mut(child)?;
        node.transform = at.compose(&node.transform);
        node.parent = Some(parent);
        self.device_mut(parent)?.children.push(child);
        log::debug!("Placed device {} in {}", child, parent_name);
        Ok(child)
    }

    /// Remove `child` from its parent, keeping its world placement.
    pub fn detach(&mut self, child: DeviceId) -> Result<()> {
        let world = self.world_transform(child)?;
        let Some(parent) = self.device(child)?.parent else {
            return Ok(());
        };
        self.device_mut(parent)?.children.retain(|c| *c != child);
        let node = self.device_mut(child)?;
        node.parent = None;
        node.transform = world;
        Ok(())
    }

    /// Deep structural copy of a device: every node in the subtree gets a
    /// fresh id. The copy is detached and keeps the source device's local placement.
    pub fn copy_device(&mut self, id: DeviceId) -> Result<DeviceId> {
        let nodes = self.clone_subtree(id)?;
        Ok(self.insert_subtree(nodes))
    }

    /// Clone a subtree with remapped ids without touching the arena.
    /// The root comes first.
    pub(crate) fn clone_subtree(&self, id: DeviceId) -> Result<Vec<Device>> {
        let ids = self.subtree_ids(id)?;
        let remap: HashMap<DeviceId, DeviceId> =
            ids.iter().map(|old| (*old, uuid::Uuid::new_v4())).collect();
        ids.iter()
            .map(|old| {
                let mut node = self.device(*old)?.clone();
                node.id = remap[old];
                node.parent = if *old == id {
                    None
                } else {
                    node.parent.and_then(|p| remap.get(&p).copied())
                };
                for child in &mut node.children {
                    *child = remap[&*child];
                }
                for exposed in &mut node.exposed {
                    if let Some(new_target) = remap.get(&exposed.target.device) {
                        exposed.target.device = *new_target;
                    }
                }
                Ok(node)
            })
            .collect()
    }

    pub(crate) fn insert_subtree(&mut self, nodes: Vec<Device>) -> DeviceId {
        let root = nodes.first().map(|n| n.id).unwrap_or_default();
        for node in nodes {
            self.devices.insert(node.id, node);
        }
        root
    }

    // ── Placement ────────────────────────────────────────────────────

    /// Placement of the device's frame in world coordinates.
    pub fn world_transform(&self, id: DeviceId) -> Result<Transform> {
        let mut device = self.device(id)?;
        let mut world = device.transform;
        while let Some(parent) = device.parent {
            device = self.device(parent)?;
            world = device.transform.compose(&world);
        }
        Ok(world)
    }

    fn parent_world_transform(&self, id: DeviceId) -> Result<Transform> {
        match self.device(id)?.parent {
            Some(parent) => self.world_transform(parent),
            None => Ok(Transform::identity()),
        }
    }

    /// Apply a world-frame rigid transform to a device and everything it owns.
    pub fn transform_device(&mut self, id: DeviceId, world: &Transform) -> Result<&mut Self> {
        let parent = self.parent_world_transform(id)?;
        let local = parent.inverse().compose(world).compose(&parent);
        let node = self.device_mut(id)?;
        node.transform = local.compose(&node.transform);
        Ok(self)
    }

    pub fn move_by(&mut self, id: DeviceId, vector: Point) -> Result<&mut Self> {
        require_finite("move.x", vector.x)?;
        require_finite("move.y", vector.y)?;
        self.transform_device(id, &Transform::translate(vector.x, vector.y))
    }

    /// Translate so that `origin` lands on `destination`.
    pub fn move_to(&mut self, id: DeviceId, origin: Point, destination: Point) -> Result<&mut Self> {
        self.move_by(id, destination - origin)
    }

    /// Rotate counter-clockwise about `center` (world origin when `None`).
    pub fn rotate(&mut self, id: DeviceId, degrees: f64, center: Option<Point>) -> Result<&mut Self> {
        require_finite("rotate.angle", degrees)?;
        let center = center.unwrap_or(Point::ORIGIN);
        self.transform_device(id, &Transform::rotation_about(degrees, center))
    }

    /// Rotate about the device's own bounding-box center.
    pub fn rotate_about_center(&mut self, id: DeviceId, degrees: f64) -> Result<&mut Self> {
        let center = self.center(id)?;
        self.rotate(id, degrees, Some(center))
    }

    /// Reflect across the line through `p1` and `p2`.
    pub fn mirror(&mut self, id: DeviceId, p1: Point, p2: Point) -> Result<&mut Self> {
        if p1.approx_eq(&p2, crate::geometry::EPSILON) {
            return Err(LayoutError::invalid_parameter(
                "mirror",
                "the two points defining the mirror line coincide",
            ));
        }
        self.transform_device(id, &Transform::reflection(p1, p2))
    }

    /// World-frame port, resolving exposed aliases.
    pub fn port(&self, port: &PortRef) -> Result<Port> {
        self.resolve_port(port).map(|(_, p)| p)
    }

    /// Resolve a port handle to the device that actually declares it and the
    /// world-frame port (named as requested).
    fn resolve_port(&self, port: &PortRef) -> Result<(DeviceId, Port)> {
        let mut current = port.clone();
        for _ in 0..MAX_ALIAS_DEPTH {
            let device = self.device(current.device)?;
            if let Some(p) = device.local_port(&current.name) {
                let mut world = p.transformed(&self.world_transform(current.device)?);
                world.name = port.name.clone();
                return Ok((current.device, world));
            }
            match device.exposed.iter().find(|e| e.name == current.name) {
                Some(alias) => current = alias.target.clone(),
                None => break,
            }
        }
        Err(LayoutError::PortNotFound {
            device: self.device(port.device)?.name.clone(),
            port: port.name.clone(),
        })
    }

    /// All declared and exposed ports of a device, world frame.
    pub fn ports(&self, id: DeviceId) -> Result<Vec<Port>> {
        self.device(id)?
            .port_names()
            .into_iter()
            .map(|name| self.port(&PortRef::new(id, name)))
            .collect()
    }

    /// Move the device named in `port` rigidly so that the port sits on
    /// `destination` and faces it.
    pub fn connect(&mut self, port: &PortRef, destination: &PortRef) -> Result<&mut Self> {
        let p = self.port(port)?;
        let (dest_owner, d) = self.resolve_port(destination)?;
        if dest_owner == port.device || self.is_ancestor(port.device, dest_owner) {
            return Err(LayoutError::Ownership {
                device: self.device(port.device)?.name.clone(),
                reason: format!(
                    "cannot be connected to port '{}', which moves with it",
                    destination.name
                ),
            });
        }
        let angle = d.orientation + 180.0 - p.orientation;
        let delta = d.midpoint - p.midpoint;
        let snap = Transform::translate(delta.x, delta.y)
            .compose(&Transform::rotation_about(angle, p.midpoint));
        log::debug!(
            "Connecting {}.{} to {}.{}",
            self.device(port.device)?.name,
            port.name,
            self.device(destination.device)?.name,
            destination.name
        );
        self.transform_device(port.device, &snap)
    }

    // ── Derived queries ──────────────────────────────────────────────

    /// Visit every device of the subtree with its world transform,
    /// depth-first in placement order.
    fn visit(
        &self,
        id: DeviceId,
        parent_world: &Transform,
        f: &mut impl FnMut(&Device, &Transform),
    ) -> Result<()> {
        let device = self.device(id)?;
        let world = parent_world.compose(&device.transform);
        f(device, &world);
        for child in &device.children {
            self.visit(*child, &world, f)?;
        }
        Ok(())
    }

    /// Every polygon of the subtree, in world coordinates.
    pub fn flatten(&self, id: DeviceId) -> Result<Vec<Polygon>> {
        let mut out = Vec::new();
        self.visit(id, &self.parent_world_transform(id)?, &mut |device, world| {
            out.extend(device.polygons.iter().map(|p| p.transformed(world)));
        })?;
        Ok(out)
    }

    /// Every annotation of the subtree, in world coordinates.
    pub fn flatten_annotations(&self, id: DeviceId) -> Result<Vec<Annotation>> {
        let mut out = Vec::new();
        self.visit(id, &self.parent_world_transform(id)?, &mut |device, world| {
            out.extend(device.annotations.iter().map(|a| Annotation {
                text: a.text.clone(),
                position: world.apply(&a.position),
                layer: a.layer,
            }));
        })?;
        Ok(out)
    }

    /// World-frame bounding box of everything the device owns; `None` when
    /// the subtree holds no polygons.
    pub fn bbox(&self, id: DeviceId) -> Result<Option<BBox>> {
        let mut bbox: Option<BBox> = None;
        self.visit(id, &self.parent_world_transform(id)?, &mut |device, world| {
            for polygon in &device.polygons {
                for v in &polygon.vertices {
                    let p = world.apply(v);
                    let b = BBox::new(p, p);
                    bbox = Some(bbox.map_or(b, |acc| acc.union(&b)));
                }
            }
        })?;
        Ok(bbox)
    }

    pub fn width(&self, id: DeviceId) -> Result<f64> {
        Ok(self.bbox(id)?.map_or(0.0, |b| b.width()))
    }

    pub fn height(&self, id: DeviceId) -> Result<f64> {
        Ok(self.bbox(id)?.map_or(0.0, |b| b.height()))
    }

    pub fn center(&self, id: DeviceId) -> Result<Point> {
        match self.bbox(id)? {
            Some(b) => Ok(b.center()),
            None => Err(LayoutError::invalid_geometry(format!(
                "device '{}' has no geometry",
                self.device(id)?.name
            ))),
        }
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const L0: GdsLayer = GdsLayer::new(0, 0);

    /// A 10 x 4 pad with its lower-left corner at (2, 1) and ports on the
    /// east and north edges.
    fn pad(layout: &mut Layout) -> DeviceId {
        let id = layout.new_device("pad");
        layout
            .add_polygon(id, Polygon::rectangle(L0, 2.0, 1.0, 12.0, 5.0))
            .unwrap();
        layout
            .add_port(id, Port::new("E", Point::new(12.0, 3.0), 4.0, 0.0))
            .unwrap();
        layout
            .add_port(id, Port::new("N", Point::new(7.0, 5.0), 10.0, 90.0))
            .unwrap();
        id
    }

    fn bbox_close(a: &BBox, b: &BBox) -> bool {
        a.min.approx_eq(&b.min, 1e-9) && a.max.approx_eq(&b.max, 1e-9)
    }

    #[test]
    fn test_layout_create() {
        let layout = Layout::new("test_project");
        assert_eq!(layout.name, "test_project");
        assert_eq!(layout.device_count(), 0);
    }

    #[test]
    fn test_bbox_commutes_with_rigid_transforms() {
        let transforms = [
            Transform::translate(-7.5, 30.0),
            Transform::rotation_about(90.0, Point::new(1.0, 2.0)),
            Transform::rotation(270.0),
            Transform::reflection(Point::ORIGIN, Point::new(0.0, 1.0)),
            Transform::translate(3.0, 3.0).compose(&Transform::rotation(180.0)),
        ];
        for t in transforms {
            let mut layout = Layout::new("t");
            let id = pad(&mut layout);
            let before = layout.bbox(id).unwrap().unwrap();
            layout.transform_device(id, &t).unwrap();
            let after = layout.bbox(id).unwrap().unwrap();
            assert!(bbox_close(&after, &t.apply_bbox(&before)), "{:?}", t);
        }
    }

    #[test]
    fn test_nested_move_moves_children_and_ports() {
        let mut layout = Layout::new("t");
        let top = layout.new_device("top");
        let child = pad(&mut layout);
        layout
            .add_device(top, child, Transform::translate(100.0, 0.0))
            .unwrap();
        layout.move_by(top, Point::new(0.0, 50.0)).unwrap();
        let e = layout.port(&PortRef::new(child, "E")).unwrap();
        assert!(e.midpoint.approx_eq(&Point::new(112.0, 53.0), 1e-9));
        layout.rotate(top, 90.0, None).unwrap();
        let e = layout.port(&PortRef::new(child, "E")).unwrap();
        assert!(e.midpoint.approx_eq(&Point::new(-53.0, 112.0), 1e-9));
        assert!((e.orientation - 90.0).abs() < 1e-9);
        assert_eq!(layout.flatten(top).unwrap().len(), 1);
    }

    #[test]
    fn test_connect_snaps_port_onto_destination() {
        let initial = [
            Transform::identity(),
            Transform::rotation_about(33.0, Point::new(4.0, -2.0)),
            Transform::reflection(Point::ORIGIN, Point::new(1.0, 0.3)),
        ];
        for t in initial {
            let mut layout = Layout::new("t");
            let fixed = pad(&mut layout);
            layout.rotate(fixed, 120.0, Some(Point::new(-3.0, 8.0))).unwrap();
            let moving = pad(&mut layout);
            layout.transform_device(moving, &t).unwrap();

            let a = PortRef::new(moving, "E");
            let b = PortRef::new(fixed, "N");
            layout.connect(&a, &b).unwrap();
            let pa = layout.port(&a).unwrap();
            let pb = layout.port(&b).unwrap();
            assert!(pa.midpoint.approx_eq(&pb.midpoint, 1e-9));
            let diff = crate::transform::angle_difference(pa.orientation, pb.orientation + 180.0);
            assert!(diff.abs() < 1e-9);
            // Connecting never edits polygons, only placement.
            assert_eq!(
                layout.device(moving).unwrap().polygons[0],
                Polygon::rectangle(L0, 2.0, 1.0, 12.0, 5.0)
            );
        }
    }

    #[test]
    fn test_connect_missing_port() {
        let mut layout = Layout::new("t");
        let a = pad(&mut layout);
        let b = pad(&mut layout);
        let err = layout
            .connect(&PortRef::new(a, "S"), &PortRef::new(b, "N"))
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::PortNotFound {
                device: "pad".into(),
                port: "S".into()
            }
        );
    }

    #[test]
    fn test_connect_to_own_descendant_is_rejected() {
        let mut layout = Layout::new("t");
        let top = pad(&mut layout);
        let inner = pad(&mut layout);
        layout.add_device(top, inner, Transform::identity()).unwrap();
        let err = layout
            .connect(&PortRef::new(top, "E"), &PortRef::new(inner, "N"))
            .unwrap_err();
        assert!(matches!(err, LayoutError::Ownership { .. }));
    }

    #[test]
    fn test_add_device_ownership_rules() {
        let mut layout = Layout::new("t");
        let a = layout.new_device("a");
        let b = layout.new_device("b");
        let child = pad(&mut layout);
        layout.add_device(a, child, Transform::identity()).unwrap();
        let err = layout.add_device(b, child, Transform::identity()).unwrap_err();
        assert!(matches!(err, LayoutError::Ownership { .. }));
        assert!(layout.add_device(a, a, Transform::identity()).is_err());
        layout.add_device(b, a, Transform::identity()).unwrap();
        // b now contains a; a cannot take b.
        let b2 = layout.new_device("c");
        layout.add_device(a, b2, Transform::identity()).unwrap();
        assert!(layout.is_ancestor(b, b2));
        assert!(layout.add_device(b2, b, Transform::identity()).is_err());
    }

    #[test]
    fn test_copy_is_independent() {
        let mut layout = Layout::new("t");
        let template = layout.new_device("template");
        let inner = pad(&mut layout);
        layout.add_device(template, inner, Transform::identity()).unwrap();
        let copy = layout.copy_device(template).unwrap();
        assert_ne!(copy, template);
        assert_eq!(layout.device_count(), 4);

        let original_bbox = layout.bbox(template).unwrap().unwrap();
        layout.move_by(copy, Point::new(40.0, 0.0)).unwrap();
        assert_eq!(layout.bbox(template).unwrap().unwrap(), original_bbox);
        let copied_child = layout.device(copy).unwrap().children()[0];
        assert_ne!(copied_child, inner);
        assert_eq!(layout.device(copied_child).unwrap().parent(), Some(copy));
    }

    #[test]
    fn test_exposed_port_follows_child() {
        let mut layout = Layout::new("t");
        let top = layout.new_device("top");
        let child = pad(&mut layout);
        layout.add_device(top, child, Transform::identity()).unwrap();
        let alias = layout
            .expose_port(top, &PortRef::new(child, "E"), "out")
            .unwrap();
        layout.move_by(child, Point::new(0.0, 10.0)).unwrap();
        let p = layout.port(&alias).unwrap();
        assert_eq!(p.name, "out");
        assert!(p.midpoint.approx_eq(&Point::new(12.0, 13.0), 1e-12));
        assert_eq!(layout.ports(top).unwrap().len(), 1);

        let stranger = pad(&mut layout);
        assert!(layout
            .expose_port(top, &PortRef::new(stranger, "E"), "x")
            .is_err());
    }

    #[test]
    fn test_detach_keeps_world_position() {
        let mut layout = Layout::new("t");
        let top = layout.new_device("top");
        let child = pad(&mut layout);
        layout
            .add_device(top, child, Transform::rotation(90.0))
            .unwrap();
        layout.move_by(top, Point::new(5.0, 5.0)).unwrap();
        let before = layout.bbox(child).unwrap();
        layout.detach(child).unwrap();
        assert_eq!(layout.device(child).unwrap().parent(), None);
        assert_eq!(layout.bbox(child).unwrap(), before);
        assert!(layout.device(top).unwrap().children().is_empty());
    }

    #[test]
    fn test_mirror_reverses_port_direction() {
        let mut layout = Layout::new("t");
        let id = pad(&mut layout);
        layout
            .mirror(id, Point::new(0.0, 0.0), Point::new(0.0, 1.0))
            .unwrap();
        let e = layout.port(&PortRef::new(id, "E")).unwrap();
        assert!(e.midpoint.approx_eq(&Point::new(-12.0, 3.0), 1e-12));
        assert!((e.orientation - 180.0).abs() < 1e-9);
        assert!(layout.mirror(id, Point::ORIGIN, Point::ORIGIN).is_err());
    }

    #[test]
    fn test_world_polygons_keep_position() {
        let mut layout = Layout::new("t");
        let top = layout.new_device("top");
        layout.rotate(top, 90.0, None).unwrap();
        let square = Polygon::rectangle(L0, 0.0, 0.0, 1.0, 1.0);
        layout.add_polygons(top, vec![square.clone()]).unwrap();
        let flat = layout.flatten(top).unwrap();
        let bb = flat[0].bbox().unwrap();
        assert!(bbox_close(&bb, &square.bbox().unwrap()));
    }

    #[test]
    fn test_remove_device_requires_detached() {
        let mut layout = Layout::new("t");
        let top = layout.new_device("top");
        let child = pad(&mut layout);
        layout.add_device(top, child, Transform::identity()).unwrap();
        assert!(layout.remove_device(child).is_err());
        layout.remove_device(top).unwrap();
        assert_eq!(layout.device_count(), 0);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut layout = Layout::new("lib");
        let top = layout.new_device("top");
        let child = pad(&mut layout);
        layout.add_device(top, child, Transform::translate(1.0, 2.0)).unwrap();
        layout.label(top, "A1", Point::new(3.0, 4.0), GdsLayer::new(255, 0)).unwrap();
        let json = layout.to_json().unwrap();
        let back = Layout::from_json(&json).unwrap();
        assert_eq!(back.device_count(), 2);
        assert_eq!(back.bbox(top).unwrap(), layout.bbox(top).unwrap());
        assert_eq!(back.flatten_annotations(top).unwrap()[0].text, "A1");
    }

    #[test]
    fn test_empty_device_has_no_center() {
        let mut layout = Layout::new("t");
        let id = layout.new_device("empty");
        assert_eq!(layout.width(id).unwrap(), 0.0);
        assert!(matches!(
            layout.center(id),
            Err(LayoutError::InvalidGeometry { .. })
        ));
    }
}
