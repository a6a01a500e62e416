use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the particle engine.
///
/// Configuration mistakes surface here. Structural problems found while
/// stepping (an oversized particle, a stale handler index) are logged and
/// repaired on the next grid rebuild instead of being returned.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical or geometric issue (degenerate normal, non-finite work value).
    #[error("numerical error: {0}")]
    MathError(String),

    /// A radius outside the range the grid optimiser was built for.
    #[error("radius {radius} outside the optimiser range [{min}, {max})")]
    RadiusOutOfRange { radius: f64, min: f64, max: f64 },

    /// A particle or wall refers to a species that was never added.
    #[error("unknown species index {0}")]
    UnknownSpecies(usize),

    /// Position or index outside the simulation domain or a handler.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// Configuration text could not be parsed.
    #[error("configuration parse error: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Configuration could not be written.
    #[error("configuration write error: {0}")]
    Serialize(#[from] ron::Error),

    /// Propagated I/O errors (configuration files).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_informative() {
        let e = Error::InvalidParam("collision time must be > 0".to_string());
        let msg = format!("{e}");
        assert!(msg.contains("invalid parameter"));
        assert!(msg.contains("collision time"));
    }

    #[test]
    fn radius_out_of_range_reports_bounds() {
        let e = Error::RadiusOutOfRange {
            radius: 2.0,
            min: 0.5,
            max: 1.0,
        };
        let msg = e.to_string();
        assert!(msg.contains("2"));
        assert!(msg.contains("[0.5, 1)"));
    }

    #[test]
    fn ron_errors_convert() {
        let parsed: std::result::Result<u32, _> = ron::from_str("not a number");
        let err: Error = match parsed {
            Ok(_) => panic!("expected a parse failure"),
            Err(e) => e.into(),
        };
        assert!(matches!(err, Error::Config(_)));
    }
}
