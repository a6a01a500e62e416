use crate::config::SimulationConfig;
use crate::core::boundary::{Boundary, BoundaryKind, Crossing};
use crate::core::broad_phase::{make_broad_phase, BroadPhase};
use crate::core::force::{ContactLaw, LinearSpringDashpot};
use crate::core::handler::EntityHandler;
use crate::core::hgrid::Dimension;
use crate::core::interaction::InteractionHandler;
use crate::core::particle::{Particle, ParticleHandler};
use crate::core::species::{ContactParameters, Species};
use crate::core::vector::{self, Vec3, DIM};
use crate::core::wall::InfiniteWall;
use crate::error::{Error, Result};
use log::{debug, error, info, trace};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use std::collections::HashSet;
use std::fmt;

/// Small numeric tolerance for time comparisons.
const EPS_TIME: f64 = 1e-12;

/// Counters describing the last completed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStatistics {
    /// Pairs reported by the broad phase.
    pub candidate_pairs: usize,
    /// Pairs the contact law found touching.
    pub particle_contacts: usize,
    /// Particle-wall contacts.
    pub wall_contacts: usize,
    /// Ghost particles alive after the boundary pass.
    pub ghosts: usize,
    /// Real particles moved across a periodic seam.
    pub crossings: usize,
}

/// Identifies one periodic image of an unordered pair of real particles.
type ImageKey = (usize, usize, [u64; DIM]);

fn image_key(real: usize, origin: usize, shift: Vec3) -> ImageKey {
    // + 0.0 folds -0.0 into 0.0 so mirrored shifts hash alike
    let bits = |s: Vec3| s.map(|c| (c + 0.0).to_bits());
    if real < origin {
        (real, origin, bits(shift))
    } else {
        (origin, real, bits(vector::scale(shift, -1.0)))
    }
}

/// Time-driven discrete particle simulation.
///
/// Owns every entity handler plus the broad phase and the contact law, and
/// advances them with a velocity-Verlet step:
/// 1. half kick and drift of real particles, ghosts follow their origins
/// 2. grid rebuild or update
/// 3. candidate pairs, then contact and wall forces
/// 4. periodic wrapping and ghost regeneration
/// 5. second half kick
pub struct Simulation {
    config: SimulationConfig,
    time_now: f64,
    step_count: u64,
    pub particles: ParticleHandler,
    pub species: EntityHandler<Species>,
    pub walls: EntityHandler<InfiniteWall>,
    pub boundaries: EntityHandler<Boundary>,
    interactions: InteractionHandler,
    broad_phase: Box<dyn BroadPhase>,
    contact_law: Box<dyn ContactLaw>,
    pairs: Vec<(usize, usize)>,
    processed_images: HashSet<ImageKey>,
    prepared: bool,
    statistics: StepStatistics,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("name", &self.config.name)
            .field("time", &self.time_now)
            .field("step", &self.step_count)
            .field("particles", &self.particles.len())
            .field("walls", &self.walls.len())
            .field("boundaries", &self.boundaries.len())
            .field("broad_phase", &self.broad_phase.name())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create an empty simulation.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if the configuration does not validate.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let broad_phase = make_broad_phase(&config);
        Ok(Self {
            config,
            time_now: 0.0,
            step_count: 0,
            particles: ParticleHandler::new("particles"),
            species: EntityHandler::new("species"),
            walls: EntityHandler::new("walls"),
            boundaries: EntityHandler::new("boundaries"),
            interactions: InteractionHandler::new(),
            broad_phase,
            contact_law: Box::new(LinearSpringDashpot),
            pairs: Vec::new(),
            processed_images: HashSet::new(),
            prepared: false,
            statistics: StepStatistics::default(),
        })
    }

    /// Create a simulation holding `num_particles` non-overlapping particles
    /// of `species`, with radii uniform in `radius_range` and velocity
    /// components uniform in [-1, 1].
    ///
    /// Particles are placed with simple rejection sampling inside the domain.
    pub fn with_random_particles(
        config: SimulationConfig,
        species: Species,
        num_particles: usize,
        radius_range: (f64, f64),
        seed: Option<u64>,
    ) -> Result<Self> {
        if num_particles == 0 {
            return Err(Error::InvalidParam("num_particles must be > 0".into()));
        }
        let (r_lo, r_hi) = radius_range;
        if !r_lo.is_finite() || !r_hi.is_finite() || r_lo <= 0.0 || r_hi < r_lo {
            return Err(Error::InvalidParam(
                "radius range must satisfy 0 < min <= max".into(),
            ));
        }
        let axes = config.dimension.count();
        for k in 0..axes {
            if config.domain_max[k] - config.domain_min[k] < 2.0 * r_hi {
                return Err(Error::InvalidParam(
                    "domain must be at least 2 * max radius in every dimension".into(),
                ));
            }
        }

        let mut sim = Self::new(config)?;
        let species_index = sim.add_species(species);
        let mut rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };

        let max_attempts = 1_000_000usize;
        for n in 0..num_particles {
            let radius = if r_hi > r_lo {
                rng.random_range(r_lo..=r_hi)
            } else {
                r_lo
            };
            let mut attempts = 0usize;
            let position = loop {
                if attempts >= max_attempts {
                    return Err(Error::InvalidParam(format!(
                        "failed to place particle {} without overlap; try fewer particles or smaller radii",
                        n
                    )));
                }
                attempts += 1;
                let mut x = [0.0_f64; DIM];
                for (k, x_k) in x.iter_mut().enumerate().take(axes) {
                    let lo = sim.config.domain_min[k] + radius;
                    let hi = sim.config.domain_max[k] - radius;
                    *x_k = rng.random_range(lo..=hi);
                }
                if !overlaps_existing(&sim.particles, &x, radius) {
                    break x;
                }
            };

            let mut v = [0.0_f64; DIM];
            v.iter_mut()
                .take(axes)
                .for_each(|c| *c = rng.random_range(-1.0..=1.0));

            sim.add_particle(Particle::new(position, v, radius)?.with_species(species_index))?;
        }
        Ok(sim)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Returns current simulation time.
    pub fn time(&self) -> f64 {
        self.time_now
    }

    /// Completed steps.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn time_step(&self) -> f64 {
        self.config.time_step
    }

    /// Number of real particles (ghosts excluded).
    pub fn num_particles(&self) -> usize {
        self.particles.iter().filter(|p| !p.is_ghost()).count()
    }

    pub fn num_ghosts(&self) -> usize {
        self.particles.iter().filter(|p| p.is_ghost()).count()
    }

    /// Positions of the real particles, in handler order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.real_particles().map(|p| p.position).collect()
    }

    /// Velocities of the real particles, in handler order.
    pub fn velocities(&self) -> Vec<Vec3> {
        self.real_particles().map(|p| p.velocity).collect()
    }

    pub fn real_particles(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter().filter(|p| !p.is_ghost())
    }

    /// Total kinetic energy of the real particles.
    pub fn kinetic_energy(&self) -> f64 {
        self.real_particles().map(|p| p.kinetic_energy()).sum()
    }

    /// Total momentum of the real, non-fixed particles.
    pub fn momentum(&self) -> Vec3 {
        self.real_particles()
            .filter(|p| !p.fixed)
            .fold(vector::ZERO, |acc, p| vector::add(acc, p.momentum()))
    }

    pub fn interactions(&self) -> &InteractionHandler {
        &self.interactions
    }

    pub fn broad_phase(&self) -> &dyn BroadPhase {
        self.broad_phase.as_ref()
    }

    /// Candidate pairs produced during the last force computation.
    pub fn last_candidate_pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn statistics(&self) -> StepStatistics {
        self.statistics
    }

    /// Replace the contact force model.
    pub fn set_contact_law(&mut self, law: Box<dyn ContactLaw>) {
        self.contact_law = law;
    }

    /// Replace the hierarchical grid settings; the grid is rebuilt before
    /// the next force computation.
    pub fn set_hgrid_config(&mut self, hgrid: crate::config::HGridConfig) -> Result<()> {
        hgrid.validate()?;
        self.config.hgrid = hgrid;
        self.broad_phase = make_broad_phase(&self.config);
        self.prepared = false;
        Ok(())
    }

    /// Force a grid rebuild at the next step.
    pub fn request_grid_rebuild(&mut self) {
        self.broad_phase.request_rebuild();
    }

    /// Register a species and return its index.
    pub fn add_species(&mut self, species: Species) -> usize {
        self.species.add(species);
        self.species.len() - 1
    }

    /// Add a real particle and return its id.
    ///
    /// A particle without mass gets one from its species density.
    ///
    /// Errors:
    /// - `Error::UnknownSpecies` if the species index was never added.
    /// - `Error::InvalidParam` for ghost particles, or non-planar particles in 2D.
    pub fn add_particle(&mut self, mut particle: Particle) -> Result<u64> {
        if particle.is_ghost() {
            return Err(Error::InvalidParam(
                "ghost particles are created by boundaries only".into(),
            ));
        }
        let species = self
            .species
            .get(particle.species)
            .ok_or(Error::UnknownSpecies(particle.species))?;
        if self.config.dimension == Dimension::Two
            && (particle.position[2] != 0.0 || particle.velocity[2] != 0.0)
        {
            return Err(Error::InvalidParam(
                "2D particles must have zero z position and velocity".into(),
            ));
        }
        if particle.mass <= 0.0 {
            particle.mass = species.mass_of(particle.radius, self.config.dimension);
        }
        particle.hgrid = Default::default();
        let index = self.particles.len();
        let id = self.particles.add(particle);
        if self.prepared {
            self.broad_phase.insert(&mut self.particles, index);
        }
        trace!("added particle {id} at index {index}");
        Ok(id)
    }

    /// Remove the real particle at `index`.
    ///
    /// All ghosts are purged first and recreated afterwards, so indices of
    /// other real particles may change. Returns `None` (and logs) for an
    /// invalid index or a ghost.
    pub fn remove_particle(&mut self, index: usize) -> Option<Particle> {
        let Some(target) = self.particles.get(index) else {
            error!("remove_particle: no particle at index {index}");
            return None;
        };
        if target.is_ghost() {
            error!("remove_particle: index {index} is a ghost");
            return None;
        }
        let id = target.id();
        self.purge_ghosts();
        let index = self.particles.get_by_id(id)?.index();
        let removed = self.remove_at(index);
        if self.prepared {
            self.create_ghost_particles();
        }
        removed
    }

    /// Add a wall and return its id.
    pub fn add_wall(&mut self, wall: InfiniteWall) -> Result<u64> {
        if self.species.get(wall.species).is_none() {
            return Err(Error::UnknownSpecies(wall.species));
        }
        Ok(self.walls.add(wall))
    }

    /// Add a periodic or maser boundary and return its id.
    pub fn add_boundary(&mut self, boundary: Boundary) -> u64 {
        let id = self.boundaries.add(boundary);
        self.prepared = false;
        id
    }

    /// Turn every real particle inside the maser at `boundary` into a maser particle.
    pub fn activate_maser(&mut self, boundary: usize) -> Result<()> {
        self.purge_ghosts();
        let maser = self
            .boundaries
            .get_mut(boundary)
            .ok_or_else(|| Error::OutOfBounds(format!("no boundary at index {boundary}")))?
            .as_maser_mut()
            .ok_or_else(|| Error::InvalidParam(format!("boundary {boundary} is not a maser")))?;
        maser.activate(self.particles.as_mut_slice(), &mut self.species)?;
        if self.prepared {
            self.create_ghost_particles();
        }
        Ok(())
    }

    /// Release the maser at `boundary`; its particles regain their species.
    pub fn close_maser(&mut self, boundary: usize) -> Result<()> {
        self.purge_ghosts();
        let maser = self
            .boundaries
            .get_mut(boundary)
            .ok_or_else(|| Error::OutOfBounds(format!("no boundary at index {boundary}")))?
            .as_maser_mut()
            .ok_or_else(|| Error::InvalidParam(format!("boundary {boundary} is not a maser")))?;
        maser.close(self.particles.as_mut_slice());
        if self.prepared {
            self.create_ghost_particles();
        }
        Ok(())
    }

    /// Work done once before the first step: ghosts, a fresh grid and the
    /// initial forces.
    pub fn prepare(&mut self) -> Result<()> {
        self.purge_ghosts();
        self.create_ghost_particles();
        self.broad_phase.request_rebuild();
        self.broad_phase.prepare(&mut self.particles);
        self.prepared = true;
        self.compute_all_forces();
        info!(
            "{}: prepared {} particles ({} ghosts), {} walls, {} boundaries, broad phase {}",
            self.config.name,
            self.num_particles(),
            self.num_ghosts(),
            self.walls.len(),
            self.boundaries.len(),
            self.broad_phase.name()
        );
        Ok(())
    }

    /// Advance by one time step.
    pub fn step(&mut self) -> Result<()> {
        if !self.prepared {
            self.prepare()?;
        }
        let dt = self.config.time_step;
        self.integrate_before_force(dt)?;
        self.sync_ghosts();
        self.broad_phase.prepare(&mut self.particles);
        self.compute_all_forces();
        self.check_boundaries();
        self.integrate_after_force(dt);
        self.interactions.remove_old(self.step_count);

        self.time_now += dt;
        self.step_count += 1;
        let interval = self.config.log_interval;
        if interval > 0 && self.step_count % interval == 0 {
            info!(
                "{}: t={:.6e} step={} particles={} ghosts={} contacts={} ke={:.6e}",
                self.config.name,
                self.time_now,
                self.step_count,
                self.num_particles(),
                self.statistics.ghosts,
                self.statistics.particle_contacts,
                self.kinetic_energy()
            );
        }
        Ok(())
    }

    /// Take `steps` steps.
    pub fn run(&mut self, steps: u64) -> Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Step until the simulation time reaches `target_time` (must be ≥ current time).
    ///
    /// The last step is taken only if it ends no more than half a step past
    /// the target.
    pub fn advance_to(&mut self, target_time: f64) -> Result<()> {
        if !target_time.is_finite() {
            return Err(Error::InvalidParam("target_time must be finite".into()));
        }
        if target_time < self.time_now - EPS_TIME {
            return Err(Error::InvalidParam(
                "target_time cannot be earlier than current time".into(),
            ));
        }
        let dt = self.config.time_step;
        while self.time_now + 0.5 * dt <= target_time + EPS_TIME {
            self.step()?;
        }
        Ok(())
    }

    // ============ Internal helpers ============

    fn integrate_before_force(&mut self, dt: f64) -> Result<()> {
        for i in 0..self.particles.len() {
            let distance = {
                let p = &mut self.particles[i];
                if p.is_ghost() || p.fixed {
                    continue;
                }
                let kick = 0.5 * dt * p.inv_mass();
                vector::add_scaled(&mut p.velocity, p.force, kick);
                let dx = vector::scale(p.velocity, dt);
                p.position = vector::add(p.position, dx);
                if !vector::is_finite(p.position) {
                    return Err(Error::MathError(format!(
                        "particle {} has a non-finite position at t={}",
                        p.id(),
                        self.time_now
                    )));
                }
                vector::norm(dx)
            };
            self.broad_phase.record_displacement(&self.particles[i], distance);
        }
        Ok(())
    }

    fn integrate_after_force(&mut self, dt: f64) {
        for p in self.particles.iter_mut() {
            if p.is_ghost() || p.fixed {
                continue;
            }
            let kick = 0.5 * dt * p.inv_mass();
            vector::add_scaled(&mut p.velocity, p.force, kick);
        }
    }

    /// Move every ghost to its origin's position plus its shift.
    fn sync_ghosts(&mut self) {
        for i in 0..self.particles.len() {
            let Some(origin) = self.particles[i].periodic_origin else {
                continue;
            };
            let (position, velocity) = {
                let o = &self.particles[origin];
                (o.position, o.velocity)
            };
            let g = &mut self.particles[i];
            g.position = vector::add(position, g.periodic_shift);
            g.velocity = velocity;
        }
    }

    fn gravity(&self) -> Vec3 {
        let mut g = self.config.gravity;
        if self.config.dimension == Dimension::Two {
            g[2] = 0.0;
        }
        g
    }

    fn compute_all_forces(&mut self) {
        let gravity = self.gravity();
        for p in self.particles.iter_mut() {
            p.force = if p.is_ghost() {
                vector::ZERO
            } else {
                vector::scale(gravity, p.mass)
            };
        }

        let mut pairs = std::mem::take(&mut self.pairs);
        pairs.clear();
        self.broad_phase.candidate_pairs(&self.particles, &mut pairs);
        self.processed_images.clear();
        let mut contacts = 0usize;
        for &(a, b) in &pairs {
            if self.compute_internal_force(a, b) {
                contacts += 1;
            }
        }
        self.statistics.candidate_pairs = pairs.len();
        self.statistics.particle_contacts = contacts;
        self.pairs = pairs;

        self.statistics.wall_contacts = self.compute_wall_forces();
    }

    /// Evaluate one candidate pair. Returns whether the pair was in contact.
    ///
    /// Ghost pairs are resolved to their real origins: the force lands on
    /// the real particles and each periodic image of a pair is evaluated
    /// only once, whichever of its mirrored ghost pairs is met first.
    fn compute_internal_force(&mut self, a: usize, b: usize) -> bool {
        let (pa, pb) = (&self.particles[a], &self.particles[b]);
        if pa.fixed && pb.fixed {
            return false;
        }
        let real_a = pa.periodic_origin.unwrap_or(a);
        let real_b = pb.periodic_origin.unwrap_or(b);
        match (pa.is_ghost(), pb.is_ghost()) {
            (true, true) => return false,
            (false, false) => {}
            (ghost_a, _) => {
                if real_a == real_b {
                    return false;
                }
                let (real, ghost) = if ghost_a { (b, a) } else { (a, b) };
                if self.is_outside_maser_of(real, ghost) {
                    return false;
                }
                let origin = self.particles[ghost].periodic_origin.unwrap_or(ghost);
                let key = image_key(real, origin, self.particles[ghost].periodic_shift);
                if !self.processed_images.insert(key) {
                    return false;
                }
            }
        }

        // the lower real index always goes first so the stored tangential
        // spring keeps one orientation
        let (first, second, real_first, real_second) = if real_a <= real_b {
            (a, b, real_a, real_b)
        } else {
            (b, a, real_b, real_a)
        };
        let (p1, p2) = (&self.particles[first], &self.particles[second]);
        let Some(params) = self.pair_parameters(p1.species, p2.species) else {
            return false;
        };
        let history = self.interactions.get(real_first, real_second);
        let Some(contact) =
            self.contact_law
                .particle_contact(p1, p2, &params, history, self.config.time_step)
        else {
            return false;
        };

        let entry = self
            .interactions
            .get_or_insert(real_first, real_second, self.step_count);
        entry.time_stamp = self.step_count;
        entry.overlap = contact.overlap;
        entry.tangential_spring = contact.tangential_spring;

        let f1 = &mut self.particles[real_first].force;
        *f1 = vector::add(*f1, contact.force);
        let f2 = &mut self.particles[real_second].force;
        *f2 = vector::sub(*f2, contact.force);
        true
    }

    /// A ghost wrapped by a maser only touches particles of that maser; the
    /// copies it emits sit exactly on top of it.
    fn is_outside_maser_of(&self, real: usize, ghost: usize) -> bool {
        let Some(b) = self.particles[ghost].maser_boundary else {
            return false;
        };
        let species = self.particles[real].species;
        self.boundaries.get(b).is_some_and(|boundary| match boundary.kind() {
            BoundaryKind::Maser(m) => !m.is_maser_species(species),
            BoundaryKind::Periodic(_) => false,
        })
    }

    fn compute_wall_forces(&mut self) -> usize {
        let mut contacts = 0usize;
        for i in 0..self.particles.len() {
            let p = &self.particles[i];
            if p.is_ghost() || p.fixed {
                continue;
            }
            let mut total = vector::ZERO;
            for wall in self.walls.iter() {
                let Some(params) = self.pair_parameters(p.species, wall.species) else {
                    continue;
                };
                if let Some(f) = self.contact_law.wall_contact(p, wall, &params) {
                    total = vector::add(total, f);
                    contacts += 1;
                }
            }
            let p = &mut self.particles[i];
            p.force = vector::add(p.force, total);
        }
        contacts
    }

    fn pair_parameters(&self, a: usize, b: usize) -> Option<ContactParameters> {
        match (self.species.get(a), self.species.get(b)) {
            (Some(sa), Some(sb)) => Some(sa.mix(sb)),
            _ => {
                error!("missing species for pair ({a}, {b})");
                None
            }
        }
    }

    /// Wrap real particles that left through a boundary, then rebuild ghosts.
    fn check_boundaries(&mut self) {
        self.purge_ghosts();
        let mut crossings = 0usize;
        for b in 0..self.boundaries.len() {
            let n = self.particles.len();
            for i in 0..n {
                match self.boundaries[b].check_after_move(&mut self.particles[i]) {
                    Crossing::None => {}
                    Crossing::Shifted => {
                        self.broad_phase.moved(&mut self.particles, i);
                        crossings += 1;
                    }
                    Crossing::ShiftedWithOutflow(outflow) => {
                        self.broad_phase.moved(&mut self.particles, i);
                        let index = self.particles.len();
                        self.particles.add(*outflow);
                        self.broad_phase.insert(&mut self.particles, index);
                        crossings += 1;
                    }
                }
            }
        }
        if crossings > 0 {
            debug!("{} particles crossed a boundary at step {}", crossings, self.step_count);
        }
        self.statistics.crossings = crossings;
        self.create_ghost_particles();
    }

    /// Append ghosts for every particle near a boundary, boundary by
    /// boundary, so corner images arise from ghosts of earlier boundaries.
    fn create_ghost_particles(&mut self) {
        let largest = self
            .particles
            .largest()
            .map_or(0.0, |p| p.interaction_radius());
        for b in 0..self.boundaries.len() {
            let n = self.particles.len();
            for i in 0..n {
                let Some(ghost) = self.boundaries[b].create_ghost(&self.particles[i], i, largest)
                else {
                    continue;
                };
                let index = self.particles.len();
                self.particles.add(ghost);
                self.broad_phase.insert(&mut self.particles, index);
            }
        }
        self.statistics.ghosts = self.num_ghosts();
    }

    /// Remove every ghost. Walking downwards means any particle swapped into
    /// a freed slot has already been checked and is real.
    fn purge_ghosts(&mut self) {
        for i in (0..self.particles.len()).rev() {
            if self.particles[i].is_ghost() {
                self.remove_at(i);
            }
        }
    }

    /// Unlink from the grid, swap-remove from the handler, then move the
    /// grid links and contact history of the particle that filled the slot.
    ///
    /// Ghosts must already be gone when a real particle is removed, since
    /// ghost origins are not rewritten here.
    fn remove_at(&mut self, index: usize) -> Option<Particle> {
        self.broad_phase.remove(&mut self.particles, index);
        let removal = self.particles.remove(index)?;
        if !removal.removed.is_ghost() {
            self.interactions.remove_for(index);
        }
        if let Some(from) = removal.moved_from {
            self.broad_phase.relocate(&mut self.particles, from, index);
            self.interactions.relocate(from, index);
        }
        Some(removal.removed)
    }
}

/// Whether a sphere at `x` with radius `radius` overlaps any existing particle.
fn overlaps_existing(particles: &ParticleHandler, x: &Vec3, radius: f64) -> bool {
    particles.iter().any(|p| {
        let reach = p.radius + radius;
        vector::norm_sq(vector::sub(p.position, *x)) < reach * reach
    })
}
