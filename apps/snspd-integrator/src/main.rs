//! Builds the row of SNSPD-yTron integrators and writes it as GDS-II.
//!
//! The configuration is a JSON `RowConfig`; missing fields take the
//! built-in defaults. Set `RUST_LOG=debug` for per-step detail.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use maskforge_core::{DeviceId, Layout, Transform};
use maskforge_devices::{build_rho_row, RowConfig};
use maskforge_io::{save_project, write_gds, ProjectMeta};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Generate the SNSPD-yTron integrator photomask as a GDS-II file"
)]
struct Args {
    /// JSON row configuration. Built-in defaults when omitted.
    config: Option<PathBuf>,
    /// Output GDS file, overwritten if it exists.
    #[arg(default_value = "SNSPD Integrator.gds")]
    output: PathBuf,
    /// Also save the layout arena as a JSON project in this directory.
    #[arg(short, long)]
    project: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<RowConfig, String> {
    let Some(path) = path else {
        log::info!("No configuration given, using defaults");
        return Ok(RowConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {}", path.display(), e))?;
    serde_json::from_str(&json).map_err(|e| format!("parsing {}: {}", path.display(), e))
}

/// Names of top-level devices other than `top`; they are not written.
fn stray_roots(layout: &Layout, top: DeviceId) -> Vec<&str> {
    layout
        .root_devices()
        .filter(|d| d.id != top)
        .map(|d| d.name.as_str())
        .collect()
}

fn run(args: Args) -> Result<(), String> {
    let config = load_config(args.config.as_deref())?;

    let mut layout = Layout::new("SNSPD Integrator");
    let row = build_rho_row(&mut layout, &config).map_err(|e| e.to_string())?;
    let stray = stray_roots(&layout, row);
    if !stray.is_empty() {
        log::warn!("Unplaced devices left out of the GDS: {}", stray.join(", "));
    }
    write_gds(&layout, row, &args.output).map_err(|e| e.to_string())?;

    if let Some(dir) = &args.project {
        let meta = ProjectMeta::new(&layout.name, config.layers.clone()).with_top(row);
        save_project(dir, &meta, &layout).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_arguments() {
        let args = Args::try_parse_from(["snspd-integrator"]).unwrap();
        assert!(args.config.is_none());
        assert_eq!(args.output, PathBuf::from("SNSPD Integrator.gds"));
        assert!(args.project.is_none());
    }

    #[test]
    fn test_explicit_arguments() {
        let args = Args::try_parse_from([
            "snspd-integrator",
            "row.json",
            "out.gds",
            "--project",
            "row.mfproj",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("row.json")));
        assert_eq!(args.output, PathBuf::from("out.gds"));
        assert_eq!(args.project, Some(PathBuf::from("row.mfproj")));
        assert!(Args::try_parse_from(["snspd-integrator", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_stray_roots_exclude_top() {
        let mut layout = Layout::new("t");
        let top = layout.new_device("row");
        let child = layout.new_device("child");
        layout.add_device(top, child, Transform::identity()).unwrap();
        assert!(stray_roots(&layout, top).is_empty());
        layout.new_device("template");
        assert_eq!(stray_roots(&layout, top), vec!["template"]);
    }

    #[test]
    fn test_missing_config_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/row.json"))).unwrap_err();
        assert!(err.starts_with("reading /nonexistent/row.json"));
        assert_eq!(load_config(None).unwrap(), RowConfig::default());
    }
}
