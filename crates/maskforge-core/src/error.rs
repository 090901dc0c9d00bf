use thiserror::Error;

use crate::device::DeviceId;

/// Errors raised by layout composition, routing and polygon operations.
///
/// Every variant carries enough context (device name, port name, parameter
/// name) to locate the offending configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Device '{device}' cannot be placed: {reason}")]
    Ownership { device: String, reason: String },

    #[error("Port '{port}' not found on device '{device}'")]
    PortNotFound { device: String, port: String },

    #[error("Degenerate route: {reason}")]
    DegenerateRoute { reason: String },

    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Device {0} does not exist in this layout")]
    DeviceNotFound(DeviceId),
}

pub type Result<T> = std::result::Result<T, LayoutError>;

impl LayoutError {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        LayoutError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_geometry(reason: impl Into<String>) -> Self {
        LayoutError::InvalidGeometry {
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate_route(reason: impl Into<String>) -> Self {
        LayoutError::DegenerateRoute {
            reason: reason.into(),
        }
    }
}

/// Check that a dimension is finite and strictly positive.
pub fn require_positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(LayoutError::invalid_parameter(
            name,
            format!("expected a positive finite value, got {}", value),
        ))
    }
}

/// Check that a coordinate or offset is finite.
pub fn require_finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LayoutError::invalid_parameter(
            name,
            format!("expected a finite value, got {}", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_positive() {
        assert_eq!(require_positive("width", 2.5), Ok(2.5));
        assert!(matches!(
            require_positive("width", 0.0),
            Err(LayoutError::InvalidParameter { .. })
        ));
        assert!(require_positive("width", f64::NAN).is_err());
    }

    #[test]
    fn test_error_message_names_port() {
        let err = LayoutError::PortNotFound {
            device: "compass".into(),
            port: "N3".into(),
        };
        assert_eq!(err.to_string(), "Port 'N3' not found on device 'compass'");
    }
}
