//! Simulation settings, loadable from RON.
//!
//! Every field has a default, so a configuration file only needs to name the
//! values it changes:
//!
//! ```text
//! (
//!     dimension: Two,
//!     time_step: 1e-4,
//!     domain_min: (0.0, 0.0, 0.0),
//!     domain_max: (1.0, 1.0, 0.0),
//!     hgrid: (method: BottomUp, max_levels: 4),
//! )
//! ```

use crate::core::hgrid::{Dimension, HGridDistribution, HGridMethod, MAX_LEVELS};
use crate::core::vector::Vec3;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which broad phase produces candidate pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BroadPhaseKind {
    #[default]
    HGrid,
    /// Brute-force O(n^2) reference.
    AllPairs,
}

/// Hierarchical grid settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HGridConfig {
    pub method: HGridMethod,
    pub distribution: HGridDistribution,
    /// Upper bound on the number of levels (1..=32).
    pub max_levels: usize,
    /// Cells are at least this many particle diameters wide (>= 1).
    pub cell_over_size_ratio: f64,
    /// Re-bin every particle every step.
    pub update_each_time_step: bool,
    /// With lazy updates: re-bin once the largest accumulated displacement
    /// reaches this fraction of a cell.
    pub update_fraction: f64,
    /// Cell sizes used by [`HGridDistribution::User`].
    pub user_cell_sizes: Vec<f64>,
    /// Histogram resolution of the optimiser.
    pub optimiser_bins: usize,
    /// Cost of visiting a cell relative to a contact check, for the optimiser.
    pub optimiser_overhead_ratio: f64,
}

impl Default for HGridConfig {
    fn default() -> Self {
        Self {
            method: HGridMethod::TopDown,
            distribution: HGridDistribution::Exponential,
            max_levels: 3,
            cell_over_size_ratio: 1.0,
            update_each_time_step: true,
            update_fraction: 0.5,
            user_cell_sizes: Vec::new(),
            optimiser_bins: 100,
            optimiser_overhead_ratio: 1.0,
        }
    }
}

impl HGridConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_levels == 0 || self.max_levels > MAX_LEVELS {
            return Err(Error::InvalidParam(format!(
                "hgrid.max_levels must be in 1..={MAX_LEVELS}, got {}",
                self.max_levels
            )));
        }
        if !self.cell_over_size_ratio.is_finite() || self.cell_over_size_ratio < 1.0 {
            return Err(Error::InvalidParam(
                "hgrid.cell_over_size_ratio must be finite and >= 1".into(),
            ));
        }
        if !self.update_fraction.is_finite() || self.update_fraction <= 0.0 {
            return Err(Error::InvalidParam(
                "hgrid.update_fraction must be finite and > 0".into(),
            ));
        }
        if self.distribution == HGridDistribution::User {
            if self.user_cell_sizes.is_empty() {
                return Err(Error::InvalidParam(
                    "hgrid.user_cell_sizes must not be empty for the User distribution".into(),
                ));
            }
            if self.user_cell_sizes.iter().any(|s| !s.is_finite() || *s <= 0.0)
                || self.user_cell_sizes.windows(2).any(|w| w[0] >= w[1])
            {
                return Err(Error::InvalidParam(
                    "hgrid.user_cell_sizes must be positive and strictly increasing".into(),
                ));
            }
        }
        if self.optimiser_bins == 0 {
            return Err(Error::InvalidParam("hgrid.optimiser_bins must be > 0".into()));
        }
        if !self.optimiser_overhead_ratio.is_finite() || self.optimiser_overhead_ratio < 0.0 {
            return Err(Error::InvalidParam(
                "hgrid.optimiser_overhead_ratio must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub name: String,
    pub dimension: Dimension,
    pub time_step: f64,
    /// Lower corner of the domain, used for the grid optimiser's volume.
    pub domain_min: Vec3,
    /// Upper corner of the domain.
    pub domain_max: Vec3,
    pub gravity: Vec3,
    pub broad_phase: BroadPhaseKind,
    pub hgrid: HGridConfig,
    /// Steps between progress log lines; 0 disables them.
    pub log_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "dpm".to_string(),
            dimension: Dimension::Three,
            time_step: 1e-4,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            gravity: [0.0; 3],
            broad_phase: BroadPhaseKind::HGrid,
            hgrid: HGridConfig::default(),
            log_interval: 1000,
        }
    }
}

impl SimulationConfig {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(Error::InvalidParam("time_step must be finite and > 0".into()));
        }
        let axes = self.dimension.count();
        for k in 0..axes {
            let (lo, hi) = (self.domain_min[k], self.domain_max[k]);
            if !lo.is_finite() || !hi.is_finite() || hi <= lo {
                return Err(Error::InvalidParam(format!(
                    "domain extent on axis {k} must be finite and positive, got [{lo}, {hi}]"
                )));
            }
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(Error::InvalidParam("gravity must be finite".into()));
        }
        self.hgrid.validate()
    }

    /// Length (2D: area, 3D: volume) of the domain.
    pub fn domain_volume(&self) -> f64 {
        (0..self.dimension.count())
            .map(|k| self.domain_max[k] - self.domain_min[k])
            .product()
    }

    /// Parse and validate a RON document.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn to_ron_string(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        SimulationConfig::default().validate()
    }

    #[test]
    fn partial_document_fills_defaults() -> Result<()> {
        let c = SimulationConfig::from_ron_str(
            "(dimension: Two, domain_max: (2.0, 3.0, 0.0), hgrid: (method: BottomUp))",
        )?;
        assert_eq!(c.dimension, Dimension::Two);
        assert_eq!(c.hgrid.method, HGridMethod::BottomUp);
        assert_eq!(c.hgrid.max_levels, 3);
        assert!((c.domain_volume() - 6.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn round_trips_through_ron() -> Result<()> {
        let mut c = SimulationConfig::default();
        c.hgrid.distribution = HGridDistribution::User;
        c.hgrid.user_cell_sizes = vec![0.1, 0.4];
        c.gravity = [0.0, -9.81, 0.0];
        let text = c.to_ron_string()?;
        let back = SimulationConfig::from_ron_str(&text)?;
        assert_eq!(back, c);
        Ok(())
    }

    #[test]
    fn invalid_values_rejected() {
        let mut c = SimulationConfig::default();
        c.time_step = 0.0;
        assert!(c.validate().is_err());

        let mut c = SimulationConfig::default();
        c.hgrid.cell_over_size_ratio = 0.5;
        assert!(c.validate().is_err());

        let mut c = SimulationConfig::default();
        c.hgrid.max_levels = 33;
        assert!(c.validate().is_err());

        let mut c = SimulationConfig::default();
        c.hgrid.distribution = HGridDistribution::User;
        c.hgrid.user_cell_sizes = vec![0.4, 0.1];
        assert!(c.validate().is_err());
    }

    #[test]
    fn malformed_text_is_a_config_error() {
        let err = SimulationConfig::from_ron_str("(time_step: )").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
