//! # maskforge Core
//!
//! Layout kernel for parametric photomask generation: a device hierarchy held
//! in an arena, named ports with rigid-transform connection, array tiling,
//! smooth tapered routing between ports, and union/inset of polygon sets.
//!
//! Every polygon the kernel emits is a simple closed contour tagged with a
//! GDS (layer, datatype) pair, in micrometre user units.

pub mod array;
pub mod device;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod layout;
pub mod offset;
pub mod port;
pub mod route;
pub mod spatial;
pub mod text;
pub mod transform;

pub use array::ArrayHandle;
pub use device::{Annotation, Device, DeviceId};
pub use error::{LayoutError, Result};
pub use geometry::{BBox, Path, Point, Polygon};
pub use layer::{GdsLayer, Layer, LayerStack};
pub use layout::Layout;
pub use offset::InsetOptions;
pub use port::{Port, PortRef};
pub use route::{PathShape, RoutePath, RouteShape, RouteSpec, WidthShape};
pub use text::Justify;
pub use transform::Transform;
