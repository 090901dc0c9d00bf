//! # maskforge Devices
//!
//! Parametric generators for the shapes an SNSPD readout mask is built from:
//! compass connectors, flagpole and tee pads, meandered detectors and yTrons.
//! Each generator takes a serde configuration with a `validate()` check and
//! creates a detached device in a [`maskforge_core::Layout`].
//!
//! [`integrator`] composes them into the SNSPD-yTron integrator and its
//! `rho` sweep.

pub mod compass;
pub mod integrator;
pub mod pads;
pub mod snspd;
pub mod ytron;

pub use compass::{compass, compass_multi, CompassConfig, CompassMultiConfig, SidePorts};
pub use integrator::{
    build_rho_row, default_layers, snspd_integrator, Integrator, IntegratorConfig, RowConfig,
};
pub use pads::{flagpole, tee, FlagShape, FlagpoleConfig, Taper, TeeConfig};
pub use snspd::{snspd_expanded, SnspdConfig};
pub use ytron::{ytron_round, YtronConfig};
