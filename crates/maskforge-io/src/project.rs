//! Saved layout projects: a directory holding `project.json` (metadata and
//! layer table) next to `layout.json` (the full device arena).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use maskforge_core::{DeviceId, LayerStack, Layout};

const META_FILE: &str = "project.json";
const LAYOUT_FILE: &str = "layout.json";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Top device {0} is not in the saved layout")]
    MissingTop(DeviceId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    pub version: String,
    pub description: String,
    pub top_device: Option<DeviceId>,
    pub layers: LayerStack,
    pub settings: ProjectSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub dbu_per_um: f64,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self { dbu_per_um: 1000.0 }
    }
}

impl ProjectMeta {
    pub fn new(name: &str, layers: LayerStack) -> Self {
        Self {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: String::new(),
            top_device: None,
            layers,
            settings: ProjectSettings::default(),
        }
    }

    pub fn with_top(mut self, top: DeviceId) -> Self {
        self.top_device = Some(top);
        self
    }
}

/// Write the project into `dir`, creating it if needed.
pub fn save_project(dir: impl AsRef<Path>, meta: &ProjectMeta, layout: &Layout) -> Result<(), ProjectError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    fs::write(dir.join(META_FILE), serde_json::to_string_pretty(meta)?)?;
    fs::write(dir.join(LAYOUT_FILE), layout.to_json()?)?;
    log::info!("Saved project '{}' to {}", meta.name, dir.display());
    Ok(())
}

pub fn load_project(dir: impl AsRef<Path>) -> Result<(ProjectMeta, Layout), ProjectError> {
    let dir = dir.as_ref();
    let meta: ProjectMeta = serde_json::from_str(&fs::read_to_string(dir.join(META_FILE))?)?;
    let layout = Layout::from_json(&fs::read_to_string(dir.join(LAYOUT_FILE))?)?;
    if let Some(top) = meta.top_device {
        if !layout.contains(top) {
            return Err(ProjectError::MissingTop(top));
        }
    }
    Ok((meta, layout))
}
