use crate::core::handler::{EntityHandler, HandlerObject};
use crate::core::hgrid::{HGridLink, HGridObject};
use crate::core::vector::{self, Vec3};
use crate::error::{Error, Result};

/// A spherical (or, in 2D, disc) particle.
///
/// Fields:
/// - `position`, `velocity`, `force`: state and accumulated force this step
/// - `radius`: contact radius (> 0)
/// - `mass`: set from the species density when added to a simulation
/// - `species`: index into the species handler
/// - `fixed`: fixed particles never move and ignore forces
/// - `periodic_origin`/`periodic_shift`: set on ghost copies only
/// - `maser_boundary`: set on ghosts whose images passed through a maser
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    id: u64,
    index: usize,
    /// Position (x, y, z); z stays 0 in 2D.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Force accumulated during the current step.
    pub force: Vec3,
    /// Contact radius (> 0).
    pub radius: f64,
    /// Mass; 0 until assigned from the species.
    pub mass: f64,
    /// Species index.
    pub species: usize,
    /// Whether the particle is held in place.
    pub fixed: bool,
    /// Handler index of the real particle this ghost mirrors.
    pub periodic_origin: Option<usize>,
    /// Total translation from the origin to this ghost.
    pub periodic_shift: Vec3,
    /// Index of the maser boundary that wrapped this ghost, if any.
    pub maser_boundary: Option<usize>,
    pub(crate) hgrid: HGridLink,
}

impl Particle {
    /// Create a new particle after validating invariants.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `radius` is non-positive or any component is NaN/inf.
    pub fn new(position: Vec3, velocity: Vec3, radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidParam("radius must be finite and > 0".into()));
        }
        if !vector::is_finite(position) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        if !vector::is_finite(velocity) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        Ok(Self {
            id: 0,
            index: 0,
            position,
            velocity,
            force: vector::ZERO,
            radius,
            mass: 0.0,
            species: 0,
            fixed: false,
            periodic_origin: None,
            periodic_shift: vector::ZERO,
            maser_boundary: None,
            hgrid: HGridLink::default(),
        })
    }

    /// Builder-style species assignment.
    pub fn with_species(mut self, species: usize) -> Self {
        self.species = species;
        self
    }

    /// Builder-style fixing in place.
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// Permanent id assigned by the owning handler.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current slot in the owning handler.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this is a periodic copy rather than a real particle.
    #[inline]
    pub fn is_ghost(&self) -> bool {
        self.periodic_origin.is_some()
    }

    /// Radius used for neighbour search.
    #[inline]
    pub fn interaction_radius(&self) -> f64 {
        self.radius
    }

    /// 1/m, or 0 for fixed or massless particles.
    #[inline]
    pub fn inv_mass(&self) -> f64 {
        if self.fixed || self.mass <= 0.0 {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Returns the particle's kinetic energy: 1/2 m |v|^2.
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * vector::norm_sq(self.velocity)
    }

    /// Linear momentum m v.
    #[inline]
    pub fn momentum(&self) -> Vec3 {
        vector::scale(self.velocity, self.mass)
    }

    /// Set position (validated as finite).
    pub fn set_position(&mut self, position: Vec3) -> Result<()> {
        if !vector::is_finite(position) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        self.position = position;
        Ok(())
    }

    /// Set velocity (validated as finite).
    pub fn set_velocity(&mut self, velocity: Vec3) -> Result<()> {
        if !vector::is_finite(velocity) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        self.velocity = velocity;
        Ok(())
    }

    /// Grid bookkeeping (level, cell, bucket neighbours).
    pub fn hgrid_link(&self) -> &HGridLink {
        &self.hgrid
    }

    /// Copy of this particle displaced by `shift`, marked as a ghost of
    /// `origin`. Grid links are not copied.
    pub(crate) fn ghost_copy(&self, origin: usize, shift: Vec3) -> Self {
        let mut ghost = self.clone();
        ghost.position = vector::add(self.position, shift);
        ghost.periodic_origin = Some(origin);
        ghost.periodic_shift = vector::add(self.periodic_shift, shift);
        ghost.force = vector::ZERO;
        ghost.hgrid = HGridLink::default();
        ghost
    }
}

impl HandlerObject for Particle {
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
    fn size_key(&self) -> Option<f64> {
        Some(self.interaction_radius())
    }
}

impl HGridObject for Particle {
    fn position(&self) -> Vec3 {
        self.position
    }
    fn interaction_radius(&self) -> f64 {
        self.radius
    }
    fn hgrid(&self) -> &HGridLink {
        &self.hgrid
    }
    fn hgrid_mut(&mut self) -> &mut HGridLink {
        &mut self.hgrid
    }
}

/// Handler owning all particles, real and ghost.
pub type ParticleHandler = EntityHandler<Particle>;
