use std::ops::Index;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceId};
use crate::error::{require_finite, LayoutError, Result};
use crate::geometry::Point;
use crate::layout::Layout;
use crate::transform::Transform;

/// The result of tiling a template: the array device and its elements in
/// placement order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayHandle {
    pub device: DeviceId,
    pub elements: Vec<DeviceId>,
}

impl ArrayHandle {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<DeviceId> {
        self.elements.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.elements.iter().copied()
    }
}

impl Index<usize> for ArrayHandle {
    type Output = DeviceId;

    fn index(&self, index: usize) -> &DeviceId {
        &self.elements[index]
    }
}

impl Layout {
    /// Tile `count` independent deep copies of `template`, copy `i`
    /// translated by `start + i * spacing` from the template's placement.
    /// The template itself is left untouched.
    pub fn make_array(
        &mut self,
        template: DeviceId,
        start: Point,
        spacing: Point,
        count: usize,
    ) -> Result<ArrayHandle> {
        if count == 0 {
            return Err(LayoutError::invalid_parameter(
                "array.count",
                "an array needs at least one element",
            ));
        }
        require_finite("array.start.x", start.x)?;
        require_finite("array.start.y", start.y)?;
        require_finite("array.spacing.x", spacing.x)?;
        require_finite("array.spacing.y", spacing.y)?;

        let name = format!("{}_array", self.device(template)?.name);
        let this: &Layout = self;
        let copies: Vec<Vec<Device>> = (0..count)
            .into_par_iter()
            .map(|i| {
                let mut nodes = this.clone_subtree(template)?;
                let offset = start + spacing * i as f64;
                let root = &mut nodes[0];
                root.transform = Transform::translate(offset.x, offset.y).compose(&root.transform);
                Ok(nodes)
            })
            .collect::<Result<_>>()?;

        let array = self.new_device(&name);
        let mut elements = Vec::with_capacity(count);
        for nodes in copies {
            let element = self.insert_subtree(nodes);
            self.add_device(array, element, Transform::identity())?;
            elements.push(element);
        }
        log::debug!("Built {} with {} elements", name, count);
        Ok(ArrayHandle {
            device: array,
            elements,
        })
    }

    /// Build an array and place it in `parent`.
    pub fn add_array(
        &mut self,
        parent: DeviceId,
        template: DeviceId,
        start: Point,
        spacing: Point,
        count: usize,
    ) -> Result<ArrayHandle> {
        let handle = self.make_array(template, start, spacing, count)?;
        let to_parent = self.world_transform(parent)?.inverse();
        self.add_device(parent, handle.device, to_parent)?;
        Ok(handle)
    }
}
