//! Error types for curve editing and configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::tempo::PointId;

/// Rejected edit at the curve-mutation boundary.
///
/// The conversion engine itself never fails; everything that could make it
/// produce NaN is stopped here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    #[error("the anchor point at bar 0 cannot be deleted or moved")]
    AnchorImmutable,

    #[error("no tempo point with id {0}")]
    UnknownPoint(PointId),

    #[error("invalid position {0} (must be finite and after bar 0)")]
    InvalidPosition(f64),

    #[error("invalid tempo {0}")]
    InvalidTempo(f64),

    #[error("a tempo curve needs a point at bar 0")]
    MissingAnchor,

    #[error("only one point may sit at bar 0")]
    DuplicateAnchor,

    #[error("invalid tempo range {min}..{max}")]
    InvalidRange { min: f64, max: f64 },
}

/// Failure to load or save a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Curve(#[from] CurveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_error_display() {
        assert_eq!(
            CurveError::UnknownPoint(PointId(4)).to_string(),
            "no tempo point with id pt-4"
        );
        assert_eq!(
            CurveError::AnchorImmutable.to_string(),
            "the anchor point at bar 0 cannot be deleted or moved"
        );
        assert_eq!(
            CurveError::InvalidRange {
                min: 200.0,
                max: 60.0
            }
            .to_string(),
            "invalid tempo range 200..60"
        );
    }

    #[test]
    fn config_error_wraps_curve_error() {
        let err: ConfigError = CurveError::MissingAnchor.into();
        assert_eq!(err.to_string(), "a tempo curve needs a point at bar 0");
    }
}
