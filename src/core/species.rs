//! Material parameters for the default linear spring-dashpot contact law.

use crate::core::handler::HandlerObject;
use crate::core::hgrid::Dimension;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Linear visco-elastic-frictional material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    #[serde(skip)]
    id: u64,
    #[serde(skip)]
    index: usize,
    /// Mass per unit volume (per unit area in 2D).
    pub density: f64,
    /// Normal spring stiffness k.
    pub stiffness: f64,
    /// Normal viscous dissipation γ.
    pub dissipation: f64,
    /// Tangential spring stiffness.
    pub sliding_stiffness: f64,
    /// Tangential viscous dissipation.
    pub sliding_dissipation: f64,
    /// Coulomb friction coefficient μ.
    pub sliding_friction: f64,
}

impl Species {
    /// A frictionless species with unit stiffness and no dissipation.
    pub fn new(density: f64) -> Result<Self> {
        if !density.is_finite() || density <= 0.0 {
            return Err(Error::InvalidParam("density must be finite and > 0".into()));
        }
        Ok(Self {
            id: 0,
            index: 0,
            density,
            stiffness: 1.0,
            dissipation: 0.0,
            sliding_stiffness: 0.0,
            sliding_dissipation: 0.0,
            sliding_friction: 0.0,
        })
    }

    pub fn set_stiffness(&mut self, stiffness: f64) -> Result<()> {
        if !stiffness.is_finite() || stiffness <= 0.0 {
            return Err(Error::InvalidParam("stiffness must be finite and > 0".into()));
        }
        self.stiffness = stiffness;
        Ok(())
    }

    pub fn set_dissipation(&mut self, dissipation: f64) -> Result<()> {
        if !dissipation.is_finite() || dissipation < 0.0 {
            return Err(Error::InvalidParam(
                "dissipation must be finite and >= 0".into(),
            ));
        }
        self.dissipation = dissipation;
        Ok(())
    }

    /// Enable tangential friction. Sliding stiffness defaults to 2/7 of the
    /// normal stiffness when `sliding_stiffness` is `None`.
    pub fn set_sliding(
        &mut self,
        friction: f64,
        sliding_stiffness: Option<f64>,
        sliding_dissipation: f64,
    ) -> Result<()> {
        if !friction.is_finite() || friction < 0.0 {
            return Err(Error::InvalidParam(
                "sliding friction must be finite and >= 0".into(),
            ));
        }
        if !sliding_dissipation.is_finite() || sliding_dissipation < 0.0 {
            return Err(Error::InvalidParam(
                "sliding dissipation must be finite and >= 0".into(),
            ));
        }
        let kt = sliding_stiffness.unwrap_or(2.0 / 7.0 * self.stiffness);
        if !kt.is_finite() || kt < 0.0 {
            return Err(Error::InvalidParam(
                "sliding stiffness must be finite and >= 0".into(),
            ));
        }
        self.sliding_friction = friction;
        self.sliding_stiffness = kt;
        self.sliding_dissipation = sliding_dissipation;
        Ok(())
    }

    /// Set stiffness and dissipation so that a head-on collision of two
    /// particles of mass `mass` lasts `collision_time` and ends with the
    /// given `restitution` coefficient.
    ///
    /// Errors:
    /// - `Error::InvalidParam` unless `collision_time > 0`, `0 < restitution <= 1`
    ///   and `mass > 0`.
    pub fn set_collision_time_and_restitution(
        &mut self,
        collision_time: f64,
        restitution: f64,
        mass: f64,
    ) -> Result<()> {
        if !collision_time.is_finite() || collision_time <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "collision time must be finite and > 0, got {collision_time}"
            )));
        }
        if !restitution.is_finite() || restitution <= 0.0 || restitution > 1.0 {
            return Err(Error::InvalidParam(format!(
                "restitution coefficient must be in (0, 1], got {restitution}"
            )));
        }
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "mass must be finite and > 0, got {mass}"
            )));
        }
        let log_e = restitution.ln();
        self.dissipation = -mass / collision_time * log_e;
        self.stiffness = 0.5 * mass * (PI * PI + log_e * log_e) / (collision_time * collision_time);
        Ok(())
    }

    /// Collision time of two particles of mass `mass` under this species.
    pub fn collision_time(&self, mass: f64) -> Result<f64> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        let reduced = 0.5 * mass;
        let omega_sq = self.stiffness / reduced
            - (self.dissipation / (2.0 * reduced)) * (self.dissipation / (2.0 * reduced));
        if omega_sq <= 0.0 {
            return Err(Error::MathError("overdamped contact has no collision time".into()));
        }
        Ok(PI / omega_sq.sqrt())
    }

    /// Restitution coefficient of two particles of mass `mass` under this species.
    pub fn restitution(&self, mass: f64) -> Result<f64> {
        let tc = self.collision_time(mass)?;
        Ok((-self.dissipation / mass * tc).exp())
    }

    /// Mass of a particle of this species with radius `radius`.
    pub fn mass_of(&self, radius: f64, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Two => self.density * PI * radius * radius,
            Dimension::Three => self.density * 4.0 / 3.0 * PI * radius * radius * radius,
        }
    }

    /// Contact parameters for a pair made of `self` and `other`.
    ///
    /// Mixed pairs use the arithmetic mean of each parameter.
    pub fn mix(&self, other: &Species) -> ContactParameters {
        let mean = |a: f64, b: f64| 0.5 * (a + b);
        ContactParameters {
            stiffness: mean(self.stiffness, other.stiffness),
            dissipation: mean(self.dissipation, other.dissipation),
            sliding_stiffness: mean(self.sliding_stiffness, other.sliding_stiffness),
            sliding_dissipation: mean(self.sliding_dissipation, other.sliding_dissipation),
            sliding_friction: mean(self.sliding_friction, other.sliding_friction),
        }
    }

    /// Contact parameters of two particles of this same species.
    pub fn parameters(&self) -> ContactParameters {
        self.mix(self)
    }
}

impl HandlerObject for Species {
    fn id(&self) -> u64 {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn index(&self) -> usize {
        self.index
    }
    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

/// Parameters seen by a contact law for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactParameters {
    pub stiffness: f64,
    pub dissipation: f64,
    pub sliding_stiffness: f64,
    pub sliding_dissipation: f64,
    pub sliding_friction: f64,
}
