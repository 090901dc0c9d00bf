use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};

/// A GDS (layer, datatype) pair identifying a physical mask layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GdsLayer {
    pub layer: u16,
    pub datatype: u16,
}

impl GdsLayer {
    pub const fn new(layer: u16, datatype: u16) -> Self {
        Self { layer, datatype }
    }
}

impl std::fmt::Display for GdsLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.layer, self.datatype)
    }
}

/// A named mask layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub gds: GdsLayer,
    #[serde(default)]
    pub description: String,
}

impl Layer {
    pub fn new(name: &str, layer: u16, datatype: u16) -> Self {
        Self {
            name: name.to_string(),
            gds: GdsLayer::new(layer, datatype),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }
}

/// The set of named layers a process uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a layer, replacing any existing layer with the same name.
    pub fn add_layer(&mut self, layer: Layer) {
        match self.layers.iter_mut().find(|l| l.name == layer.name) {
            Some(existing) => *existing = layer,
            None => self.layers.push(layer),
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.add_layer(layer);
        self
    }

    pub fn get_layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Look up a layer that a generator cannot work without.
    pub fn require(&self, name: &str) -> Result<GdsLayer> {
        self.get_layer(name)
            .map(|l| l.gds)
            .ok_or_else(|| LayoutError::InvalidParameter {
                name: format!("layers.{}", name),
                reason: "layer is not defined in the layer stack".to_string(),
            })
    }

    pub fn all_layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_lookup() {
        let stack = LayerStack::new()
            .with_layer(Layer::new("outline", 0, 0))
            .with_layer(Layer::new("pad_metal", 1, 0).with_description("gold"));
        assert_eq!(stack.layer_count(), 2);
        assert_eq!(stack.require("pad_metal").unwrap(), GdsLayer::new(1, 0));
        assert_eq!(stack.get_layer("outline").unwrap().gds, GdsLayer::new(0, 0));
        assert!(stack.require("via").is_err());
    }

    #[test]
    fn test_add_layer_replaces_same_name() {
        let mut stack = LayerStack::new();
        stack.add_layer(Layer::new("outline", 0, 0));
        stack.add_layer(Layer::new("outline", 5, 2));
        assert_eq!(stack.layer_count(), 1);
        assert_eq!(stack.require("outline").unwrap().to_string(), "5/2");
    }
}
