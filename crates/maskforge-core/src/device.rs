use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LayoutError, Result};
use crate::geometry::{BBox, Point, Polygon};
use crate::layer::GdsLayer;
use crate::port::{Port, PortRef};
use crate::transform::Transform;

/// Unique device identifier (arena key).
pub type DeviceId = Uuid;

/// A text marker attached to a device. Carries no geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    pub position: Point,
    pub layer: GdsLayer,
}

/// A port of a descendant re-exported under a new name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposedPort {
    pub name: String,
    pub target: PortRef,
}

/// A node of the device tree.
///
/// Polygons, ports and annotations are stored in the device's own frame;
/// `transform` places that frame in the parent (or in the world, for a
/// detached device). Nodes are owned by a [`crate::Layout`] and refer to
/// each other by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub polygons: Vec<Polygon>,
    pub annotations: Vec<Annotation>,
    /// Free-form metadata (e.g. a route's path length).
    #[serde(default)]
    pub info: BTreeMap<String, serde_json::Value>,
    pub(crate) children: Vec<DeviceId>,
    pub(crate) ports: Vec<Port>,
    pub(crate) exposed: Vec<ExposedPort>,
    pub(crate) transform: Transform,
    pub(crate) parent: Option<DeviceId>,
}

impl Device {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            polygons: Vec::new(),
            annotations: Vec::new(),
            info: BTreeMap::new(),
            children: Vec::new(),
            ports: Vec::new(),
            exposed: Vec::new(),
            transform: Transform::identity(),
            parent: None,
        }
    }

    pub fn children(&self) -> &[DeviceId] {
        &self.children
    }

    pub fn parent(&self) -> Option<DeviceId> {
        self.parent
    }

    /// Placement relative to the parent frame.
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Directly declared ports, in the device's own frame.
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn exposed_ports(&self) -> &[ExposedPort] {
        &self.exposed
    }

    pub fn local_port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn has_port_name(&self, name: &str) -> bool {
        self.local_port(name).is_some() || self.exposed.iter().any(|e| e.name == name)
    }

    /// Names of declared and exposed ports, in declaration order.
    pub fn port_names(&self) -> Vec<&str> {
        self.ports
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.exposed.iter().map(|e| e.name.as_str()))
            .collect()
    }

    pub(crate) fn insert_port(&mut self, port: Port) -> Result<()> {
        if self.has_port_name(&port.name) {
            return Err(LayoutError::InvalidParameter {
                name: format!("{}.ports", self.name),
                reason: format!("port '{}' is already declared", port.name),
            });
        }
        self.ports.push(port);
        Ok(())
    }

    pub(crate) fn insert_exposed(&mut self, exposed: ExposedPort) -> Result<()> {
        if self.has_port_name(&exposed.name) {
            return Err(LayoutError::InvalidParameter {
                name: format!("{}.ports", self.name),
                reason: format!("port '{}' is already declared", exposed.name),
            });
        }
        self.exposed.push(exposed);
        Ok(())
    }

    /// Bounding box of this device's own polygons in its own frame
    /// (children not included).
    pub fn local_bbox(&self) -> Option<BBox> {
        self.polygons
            .iter()
            .filter_map(|p| p.bbox())
            .reduce(|a, b| a.union(&b))
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}
