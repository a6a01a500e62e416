//! Periodic and maser boundaries.
//!
//! A boundary is a pair of parallel planes `normal · x = left` and
//! `normal · x = right`. Particles near either plane get a ghost copy on the
//! other side every step, and a real particle that leaves through one plane
//! re-enters through the other.
//!
//! A maser boundary is periodic only for particles of its private "maser"
//! species. When such a particle leaves through the right plane, a copy with
//! the ordinary species is left behind to continue into the main domain,
//! which turns the periodic section into a steady particle source.

use crate::core::handler::{EntityHandler, HandlerObject};
use crate::core::particle::Particle;
use crate::core::species::Species;
use crate::core::vector::{self, Vec3};
use crate::error::{Error, Result};
use log::{debug, info};
use std::collections::BTreeMap;

/// Two parallel planes identified with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicBoundary {
    normal: Vec3,
    distance_left: f64,
    distance_right: f64,
    shift: Vec3,
}

impl PeriodicBoundary {
    /// Planes `normal · x = distance_left` and `normal · x = distance_right`.
    ///
    /// Errors:
    /// - `Error::InvalidParam` for a zero normal or `distance_left >= distance_right`.
    pub fn new(normal: Vec3, distance_left: f64, distance_right: f64) -> Result<Self> {
        let normal = vector::normalized(normal)
            .ok_or_else(|| Error::InvalidParam("boundary normal must be non-zero".into()))?;
        if !distance_left.is_finite()
            || !distance_right.is_finite()
            || distance_left >= distance_right
        {
            return Err(Error::InvalidParam(format!(
                "boundary planes must satisfy left < right, got {distance_left} and {distance_right}"
            )));
        }
        Ok(Self {
            normal,
            distance_left,
            distance_right,
            shift: vector::scale(normal, distance_right - distance_left),
        })
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn distance_left(&self) -> f64 {
        self.distance_left
    }

    pub fn distance_right(&self) -> f64 {
        self.distance_right
    }

    /// Translation from the left plane to the right plane.
    pub fn shift(&self) -> Vec3 {
        self.shift
    }

    /// Distance to the nearer plane; negative once `x` is outside.
    pub fn distance(&self, x: Vec3) -> f64 {
        let along = vector::dot(self.normal, x);
        (along - self.distance_left).min(self.distance_right - along)
    }

    pub fn is_closer_to_left(&self, x: Vec3) -> bool {
        let along = vector::dot(self.normal, x);
        along - self.distance_left < self.distance_right - along
    }

    /// Translation that carries `x` across to the opposite plane.
    pub fn shift_for(&self, x: Vec3) -> Vec3 {
        if self.is_closer_to_left(x) {
            self.shift
        } else {
            vector::scale(self.shift, -1.0)
        }
    }

    pub fn shift_position(&self, x: Vec3) -> Vec3 {
        vector::add(x, self.shift_for(x))
    }

    /// Whether `p` is close enough to a plane to need a ghost, given the
    /// largest interaction radius in the system.
    pub fn needs_ghost(&self, p: &Particle, largest_radius: f64) -> bool {
        self.distance(p.position) < p.interaction_radius() + largest_radius
    }
}

/// Periodic section feeding copies of its particles into the main domain.
#[derive(Debug, Clone, PartialEq)]
pub struct MaserBoundary {
    periodic: PeriodicBoundary,
    normal_to_maser: BTreeMap<usize, usize>,
    maser_to_normal: BTreeMap<usize, usize>,
    active: bool,
}

impl MaserBoundary {
    pub fn new(normal: Vec3, distance_left: f64, distance_right: f64) -> Result<Self> {
        Ok(Self {
            periodic: PeriodicBoundary::new(normal, distance_left, distance_right)?,
            normal_to_maser: BTreeMap::new(),
            maser_to_normal: BTreeMap::new(),
            active: false,
        })
    }

    pub fn periodic(&self) -> &PeriodicBoundary {
        &self.periodic
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_maser_species(&self, species: usize) -> bool {
        self.maser_to_normal.contains_key(&species)
    }

    pub fn maser_species_of(&self, species: usize) -> Option<usize> {
        self.normal_to_maser.get(&species).copied()
    }

    pub fn normal_species_of(&self, species: usize) -> Option<usize> {
        self.maser_to_normal.get(&species).copied()
    }

    /// Turn `p` into a maser particle, creating the mirrored species on first use.
    pub fn add_particle_to_maser(
        &mut self,
        p: &mut Particle,
        species: &mut EntityHandler<Species>,
    ) -> Result<()> {
        if self.is_maser_species(p.species) {
            return Ok(());
        }
        let maser = match self.maser_species_of(p.species) {
            Some(m) => m,
            None => {
                let original = species
                    .get(p.species)
                    .ok_or(Error::UnknownSpecies(p.species))?
                    .clone();
                species.add(original);
                let m = species.len() - 1;
                self.normal_to_maser.insert(p.species, m);
                self.maser_to_normal.insert(m, p.species);
                debug!("maser: species {} mirrored as {}", p.species, m);
                m
            }
        };
        p.species = maser;
        Ok(())
    }

    /// Give a maser particle its ordinary species back.
    pub fn remove_particle_from_maser(&self, p: &mut Particle) {
        if let Some(normal) = self.normal_species_of(p.species) {
            p.species = normal;
        }
    }

    /// Convert every real particle between the planes into a maser particle.
    pub fn activate(
        &mut self,
        particles: &mut [Particle],
        species: &mut EntityHandler<Species>,
    ) -> Result<()> {
        let mut converted = 0usize;
        for p in particles.iter_mut().filter(|p| !p.is_ghost()) {
            if self.periodic.distance(p.position) >= 0.0 {
                self.add_particle_to_maser(p, species)?;
                converted += 1;
            }
        }
        self.active = true;
        info!("maser: activated with {converted} particles");
        Ok(())
    }

    /// Release every maser particle back to its ordinary species.
    pub fn close(&mut self, particles: &mut [Particle]) {
        for p in particles.iter_mut() {
            self.remove_particle_from_maser(p);
        }
        self.active = false;
        info!("maser: closed");
    }
}

/// What a boundary did to a real particle after it moved.
#[derive(Debug, Clone, PartialEq)]
pub enum Crossing {
    /// The particle is still inside.
    None,
    /// The particle was shifted to the opposite plane.
    Shifted,
    /// The particle was shifted, and this copy should be added where it left.
    ShiftedWithOutflow(Box<Particle>),
}

/// A boundary stored in the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    id: u64,
    index: usize,
    kind: BoundaryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryKind {
    Periodic(PeriodicBoundary),
    Maser(MaserBoundary),
}

impl Boundary {
    pub fn periodic(normal: Vec3, distance_left: f64, distance_right: f64) -> Result<Self> {
        Ok(Self::from_kind(BoundaryKind::Periodic(PeriodicBoundary::new(
            normal,
            distance_left,
            distance_right,
        )?)))
    }

    pub fn maser(normal: Vec3, distance_left: f64, distance_right: f64) -> Result<Self> {
        Ok(Self::from_kind(BoundaryKind::Maser(MaserBoundary::new(
            normal,
            distance_left,
            distance_right,
        )?)))
    }

    fn from_kind(kind: BoundaryKind) -> Self {
        Self {
            id: 0,
            index: 0,
            kind,
        }
    }

    pub fn kind(&self) -> &BoundaryKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut BoundaryKind {
        &mut self.kind
    }

    /// The plane pair underlying either kind.
    pub fn planes(&self) -> &PeriodicBoundary {
        match &self.kind {
            BoundaryKind::Periodic(b) => b,
            BoundaryKind::Maser(m) => m.periodic(),
        }
    }

    pub fn as_maser_mut(&mut self) -> Option<&mut MaserBoundary> {
        match &mut self.kind {
            BoundaryKind::Maser(m) => Some(m),
            BoundaryKind::Periodic(_) => None,
        }
    }

    /// Whether `p` takes part in this boundary at all.
    pub fn is_eligible(&self, p: &Particle) -> bool {
        match &self.kind {
            BoundaryKind::Periodic(_) => true,
            BoundaryKind::Maser(m) => m.is_maser_species(p.species),
        }
    }

    /// Ghost of `p` (stored at `index`) if it lies close enough to a plane.
    ///
    /// The ghost's origin is always the real particle, also when `p` is
    /// itself a ghost created by an earlier boundary. Ghosts made by a maser
    /// remember it, and images of those images inherit the mark.
    pub fn create_ghost(&self, p: &Particle, index: usize, largest_radius: f64) -> Option<Particle> {
        if !self.is_eligible(p) || !self.planes().needs_ghost(p, largest_radius) {
            return None;
        }
        let origin = p.periodic_origin.unwrap_or(index);
        let mut ghost = p.ghost_copy(origin, self.planes().shift_for(p.position));
        if matches!(self.kind, BoundaryKind::Maser(_)) {
            ghost.maser_boundary = Some(self.index);
        }
        Some(ghost)
    }

    /// Move a real particle that has left the domain back in through the
    /// opposite plane.
    pub fn check_after_move(&self, p: &mut Particle) -> Crossing {
        if p.is_ghost() || !self.is_eligible(p) {
            return Crossing::None;
        }
        let planes = self.planes();
        if planes.distance(p.position) >= 0.0 {
            return Crossing::None;
        }
        match &self.kind {
            BoundaryKind::Periodic(b) => {
                p.position = b.shift_position(p.position);
                Crossing::Shifted
            }
            BoundaryKind::Maser(m) => {
                let left_through_right = !planes.is_closer_to_left(p.position);
                if left_through_right {
                    let mut outflow = p.clone();
                    m.remove_particle_from_maser(&mut outflow);
                    outflow.hgrid = Default::default();
                    p.position = planes.shift_position(p.position);
                    Crossing::ShiftedWithOutflow(Box::new(outflow))
                } else {
                    p.position = planes.shift_position(p.position);
                    Crossing::Shifted
                }
            }
        }
    }
}

impl HandlerObject for Boundary {
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
