//! # maskforge I/O
//!
//! GDS-II stream output for flattened layouts, and JSON project
//! directories that keep the full device arena for later editing.

pub mod gds;
pub mod project;

pub use gds::{write_gds, GdsError, GdsWriter};
pub use project::{load_project, save_project, ProjectError, ProjectMeta};
