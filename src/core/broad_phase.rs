//! Candidate pair generation.
//!
//! A [`BroadPhase`] turns the particle population into a list of pairs that
//! might touch. [`HGridBroadPhase`] does this with the hierarchical grid and
//! owns its rebuild policy; [`AllPairs`] is the quadratic reference used for
//! validation and tiny systems.

use crate::config::{BroadPhaseKind, HGridConfig, SimulationConfig};
use crate::core::hgrid::{Dimension, HGrid, HGridCell, HGridDistribution, HGridMethod, HGridObject};
use crate::core::optimiser::GridOptimiser;
use crate::core::particle::{Particle, ParticleHandler};
use crate::core::vector::Vec3;
use crate::error::Result;
use log::{debug, info, warn};

/// Strategy producing candidate contact pairs each step.
pub trait BroadPhase: Send {
    fn name(&self) -> &'static str;

    /// Bring internal structures up to date with the current positions.
    fn prepare(&mut self, particles: &mut ParticleHandler);

    /// Append every pair that may be in contact. Each unordered pair appears
    /// at most once.
    fn candidate_pairs(&mut self, particles: &ParticleHandler, pairs: &mut Vec<(usize, usize)>);

    /// A particle was appended at `index`.
    fn insert(&mut self, _particles: &mut ParticleHandler, _index: usize) {}

    /// The particle at `index` is about to leave the handler.
    fn remove(&mut self, _particles: &mut ParticleHandler, _index: usize) {}

    /// The particle formerly at `from` now lives at `to`.
    fn relocate(&mut self, _particles: &mut ParticleHandler, _from: usize, _to: usize) {}

    /// The particle at `index` jumped (periodic shift) and must be re-binned now.
    fn moved(&mut self, _particles: &mut ParticleHandler, _index: usize) {}

    /// The particle moved by `distance` during integration.
    fn record_displacement(&mut self, _particle: &Particle, _distance: f64) {}

    /// Force a full rebuild at the next [`BroadPhase::prepare`].
    fn request_rebuild(&mut self) {}

    /// The hierarchical grid, for strategies that have one.
    fn grid(&self) -> Option<&HGrid> {
        None
    }
}

/// Build the broad phase selected in `config`.
pub fn make_broad_phase(config: &SimulationConfig) -> Box<dyn BroadPhase> {
    match config.broad_phase {
        BroadPhaseKind::HGrid => Box::new(HGridBroadPhase::new(
            config.hgrid.clone(),
            config.dimension,
            config.domain_volume(),
        )),
        BroadPhaseKind::AllPairs => Box::new(AllPairs),
    }
}

/// Brute-force broad phase: every pair is a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPairs;

impl BroadPhase for AllPairs {
    fn name(&self) -> &'static str {
        "all-pairs"
    }

    fn prepare(&mut self, _particles: &mut ParticleHandler) {}

    fn candidate_pairs(&mut self, particles: &ParticleHandler, pairs: &mut Vec<(usize, usize)>) {
        let n = particles.len();
        for i in 0..n {
            for j in (i + 1)..n {
                pairs.push((i, j));
            }
        }
    }
}

/// Bucket count the grid aims for with `n` particles.
pub fn target_number_of_buckets(n: usize) -> usize {
    n.max(10)
}

/// Broad phase backed by a [`HGrid`].
#[derive(Debug, Clone)]
pub struct HGridBroadPhase {
    config: HGridConfig,
    dimension: Dimension,
    volume: f64,
    grid: Option<HGrid>,
    rebuild_requested: bool,
    current_max_relative_displacement: f64,
    total_max_relative_displacement: f64,
    rebuilds: usize,
    updates: usize,
}

impl HGridBroadPhase {
    /// `volume` is the domain volume (area in 2D), used by the optimised
    /// cell-size distribution.
    pub fn new(config: HGridConfig, dimension: Dimension, volume: f64) -> Self {
        Self {
            config,
            dimension,
            volume,
            grid: None,
            rebuild_requested: true,
            current_max_relative_displacement: 0.0,
            total_max_relative_displacement: 0.0,
            rebuilds: 0,
            updates: 0,
        }
    }

    pub fn config(&self) -> &HGridConfig {
        &self.config
    }

    /// Replace the grid settings; the grid is rebuilt at the next step.
    pub fn set_config(&mut self, config: HGridConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.rebuild_requested = true;
        Ok(())
    }

    /// Number of full rebuilds so far.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Number of full re-binning passes (without rebuild) so far.
    pub fn update_count(&self) -> usize {
        self.updates
    }

    /// Accumulated displacement, in cells, since the last full update.
    pub fn total_relative_displacement(&self) -> f64 {
        self.total_max_relative_displacement
    }

    /// Whether the next [`BroadPhase::prepare`] will rebuild the grid.
    pub fn needs_rebuilding(&self, particles: &ParticleHandler) -> bool {
        let Some(grid) = &self.grid else {
            return true;
        };
        if self.rebuild_requested || grid.needs_rebuilding() {
            return true;
        }
        if !particles.is_empty() && grid.occupied_levels_mask() == 0 {
            return true;
        }
        let target = target_number_of_buckets(particles.len());
        let buckets = grid.number_of_buckets();
        if buckets > 10 * target || buckets * 10 < target {
            return true;
        }
        match (particles.largest(), grid.cell_sizes().last()) {
            (Some(largest), Some(&top)) => {
                2.0 * largest.interaction_radius() * self.config.cell_over_size_ratio >= top
            }
            (_, None) => true,
            (None, _) => false,
        }
    }

    /// Cell sizes for the current population under the configured distribution.
    pub fn compute_cell_sizes(&self, particles: &ParticleHandler) -> Vec<f64> {
        let ratio = self.config.cell_over_size_ratio;
        let (Some(smallest), Some(largest)) = (particles.smallest(), particles.largest()) else {
            return vec![1.0];
        };
        let min = 2.0 * smallest.interaction_radius() * ratio;
        let max = (2.0 * largest.interaction_radius() * ratio).next_up();
        let levels = self.config.max_levels.max(1);

        match self.config.distribution {
            HGridDistribution::Linear => spread(min, max, levels, |min, max, t| min + (max - min) * t),
            HGridDistribution::Exponential => {
                spread(min, max, levels, |min, max, t| min * (max / min).powf(t))
            }
            HGridDistribution::User => {
                let mut sizes = self.config.user_cell_sizes.clone();
                if sizes.last().is_none_or(|&top| top < max) {
                    warn!(
                        "HGrid: user cell sizes {:?} cannot hold the largest particle, appending {}",
                        sizes, max
                    );
                    sizes.push(max);
                }
                sizes
            }
            HGridDistribution::Optimised => {
                let radii: Vec<f64> = particles.iter().map(|p| p.interaction_radius()).collect();
                let optimised = GridOptimiser::new(
                    self.dimension,
                    &radii,
                    self.config.optimiser_bins,
                    self.volume,
                    ratio,
                    self.config.optimiser_overhead_ratio,
                )
                .and_then(|opt| opt.optimal_cell_sizes(levels, self.config.method));
                match optimised {
                    Ok(sizes) => sizes,
                    Err(e) => {
                        warn!("HGrid: optimiser failed ({e}), using exponential cell sizes");
                        spread(min, max, levels, |min, max, t| min * (max / min).powf(t))
                    }
                }
            }
        }
    }

    /// Discard the grid and build a fresh one holding every particle.
    pub fn rebuild(&mut self, particles: &mut ParticleHandler) {
        let sizes = self.compute_cell_sizes(particles);
        let mut grid = HGrid::new(
            self.dimension,
            target_number_of_buckets(particles.len()),
            self.config.cell_over_size_ratio,
            sizes,
        );
        for p in particles.iter_mut() {
            *p.hgrid_mut() = Default::default();
        }
        let objects = particles.as_mut_slice();
        for i in 0..objects.len() {
            grid.insert(objects, i);
        }
        info!("rebuilt {grid} for {} particles", particles.len());
        self.grid = Some(grid);
        self.rebuild_requested = false;
        self.current_max_relative_displacement = 0.0;
        self.total_max_relative_displacement = 0.0;
        self.rebuilds += 1;
    }

    fn update_all(&mut self, particles: &mut ParticleHandler) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        let objects = particles.as_mut_slice();
        for i in 0..objects.len() {
            grid.update(objects, i);
        }
        self.updates += 1;
    }

    fn search_slack(&self) -> f64 {
        if self.config.update_each_time_step {
            0.0
        } else {
            self.config.update_fraction
        }
    }
}

/// `levels` sizes between `min` (exclusive) and `max` (inclusive), or the
/// single size `max` when there is nothing to spread.
fn spread(min: f64, max: f64, levels: usize, f: impl Fn(f64, f64, f64) -> f64) -> Vec<f64> {
    if levels <= 1 || min.next_up() >= max {
        return vec![max];
    }
    let mut sizes: Vec<f64> = (0..levels)
        .map(|l| f(min, max, (l + 1) as f64 / levels as f64))
        .collect();
    sizes[levels - 1] = max;
    sizes
}

impl BroadPhase for HGridBroadPhase {
    fn name(&self) -> &'static str {
        "hgrid"
    }

    fn prepare(&mut self, particles: &mut ParticleHandler) {
        if self.needs_rebuilding(particles) {
            self.rebuild(particles);
            return;
        }
        if self.config.update_each_time_step {
            self.update_all(particles);
            return;
        }
        self.total_max_relative_displacement += self.current_max_relative_displacement;
        self.current_max_relative_displacement = 0.0;
        if self.total_max_relative_displacement >= self.config.update_fraction {
            debug!(
                "HGrid: displacement {} cells reached, re-binning",
                self.total_max_relative_displacement
            );
            self.update_all(particles);
            self.total_max_relative_displacement = 0.0;
        }
    }

    fn candidate_pairs(&mut self, particles: &ParticleHandler, pairs: &mut Vec<(usize, usize)>) {
        let method = self.config.method;
        let slack = self.search_slack();
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        grid.clear_bucket_is_checked();
        let objects = particles.as_slice();
        for i in 0..objects.len() {
            find_one_sided_contacts(grid, objects, i, method, slack, pairs);
        }
    }

    fn insert(&mut self, particles: &mut ParticleHandler, index: usize) {
        if let Some(grid) = self.grid.as_mut() {
            grid.insert(particles.as_mut_slice(), index);
        }
    }

    fn remove(&mut self, particles: &mut ParticleHandler, index: usize) {
        if let Some(grid) = self.grid.as_mut() {
            grid.remove(particles.as_mut_slice(), index);
        }
    }

    fn relocate(&mut self, particles: &mut ParticleHandler, from: usize, to: usize) {
        if let Some(grid) = self.grid.as_mut() {
            grid.relocate(particles.as_mut_slice(), from, to);
        }
    }

    fn moved(&mut self, particles: &mut ParticleHandler, index: usize) {
        if let Some(grid) = self.grid.as_mut() {
            grid.update(particles.as_mut_slice(), index);
        }
    }

    fn record_displacement(&mut self, particle: &Particle, distance: f64) {
        let (Some(grid), Some(level)) = (&self.grid, particle.hgrid_link().level) else {
            return;
        };
        let relative = distance * grid.inv_cell_size(level);
        if relative > self.current_max_relative_displacement {
            self.current_max_relative_displacement = relative;
        }
    }

    fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    fn grid(&self) -> Option<&HGrid> {
        self.grid.as_ref()
    }
}

/// Report the pairs of `objects[index]` that this object is responsible for.
///
/// At its own level the object pairs with its cell (once per bucket) and
/// with the forward half of the neighbouring cells. Across levels it scans
/// every cell overlapping its bounding box, enlarged by half a cell, on the
/// levels selected by `method`.
///
/// A non-zero `slack` means stored cells may lag the positions by up to that
/// many cells. The half stencil is then not enough, so the own level is
/// scanned like any other and a pair is kept only by its lower index.
pub fn find_one_sided_contacts<P: HGridObject>(
    grid: &mut HGrid,
    objects: &[P],
    index: usize,
    method: HGridMethod,
    slack: f64,
    pairs: &mut Vec<(usize, usize)>,
) {
    let link = *objects[index].hgrid();
    let (Some(level), Some(cell)) = (link.level, link.cell) else {
        return;
    };
    let (start, end) = match method {
        HGridMethod::BottomUp => (level, grid.number_of_levels()),
        HGridMethod::TopDown => (0, level + 1),
    };
    let mut occupied = grid.occupied_levels_mask().checked_shr(start as u32).unwrap_or(0);

    for l in start..end {
        if occupied == 0 {
            break;
        }
        let is_occupied = occupied & 1 == 1;
        occupied >>= 1;
        if !is_occupied {
            continue;
        }
        if l == level && slack > 0.0 {
            search_own_level(grid, objects, index, slack, pairs);
        } else if l == level {
            let bucket = grid.bucket_of(&cell);
            if !grid.is_bucket_checked(bucket) {
                find_contacts_within_target_cell(grid, objects, bucket, pairs);
                grid.set_bucket_checked(bucket);
            }
            for offset in grid.dimension().half_stencil() {
                find_contacts_with_target_cell(grid, objects, &cell.offset(*offset), index, pairs);
            }
        } else {
            search_level(grid, objects, index, l, slack, pairs);
        }
    }
}

/// Visit every cell of `level` that an object at `position` with `radius`
/// can touch, widened by `slack` cells.
fn for_each_cell_in_reach(
    grid: &HGrid,
    position: Vec3,
    radius: f64,
    level: usize,
    slack: f64,
    mut visit: impl FnMut(HGridCell),
) {
    let inv = grid.inv_cell_size(level);
    let range = |k: usize| {
        (
            ((position[k] - radius) * inv - 0.5 - slack).floor() as i32,
            ((position[k] + radius) * inv + 0.5 + slack).floor() as i32,
        )
    };
    let (xs, xe) = range(0);
    let (ys, ye) = range(1);
    let (zs, ze) = match grid.dimension() {
        Dimension::Two => (0, 0),
        Dimension::Three => range(2),
    };
    for x in xs..=xe {
        for y in ys..=ye {
            for z in zs..=ze {
                visit(HGridCell { x, y, z, level });
            }
        }
    }
}

fn search_level<P: HGridObject>(
    grid: &HGrid,
    objects: &[P],
    index: usize,
    level: usize,
    slack: f64,
    pairs: &mut Vec<(usize, usize)>,
) {
    let (position, radius) = (objects[index].position(), objects[index].interaction_radius());
    for_each_cell_in_reach(grid, position, radius, level, slack, |target| {
        find_contacts_with_target_cell(grid, objects, &target, index, pairs);
    });
}

fn search_own_level<P: HGridObject>(
    grid: &HGrid,
    objects: &[P],
    index: usize,
    slack: f64,
    pairs: &mut Vec<(usize, usize)>,
) {
    let Some(level) = objects[index].hgrid().level else {
        return;
    };
    let (position, radius) = (objects[index].position(), objects[index].interaction_radius());
    for_each_cell_in_reach(grid, position, radius, level, slack, |target| {
        let bucket = grid.bucket_of(&target);
        for j in grid.bucket_iter(objects, bucket) {
            if j > index && objects[j].hgrid().cell.as_ref() == Some(&target) {
                pairs.push((index, j));
            }
        }
    });
}

/// Pair up every two objects of `bucket` that share a cell.
///
/// A bucket can hold several colliding cells; all of them are handled here,
/// so the bucket only needs to be scanned once per step.
pub fn find_contacts_within_target_cell<P: HGridObject>(
    grid: &HGrid,
    objects: &[P],
    bucket: usize,
    pairs: &mut Vec<(usize, usize)>,
) {
    let mut a = grid.first_in_bucket(bucket);
    while let Some(i) = a {
        let cell = objects[i].hgrid().cell;
        let mut b = objects[i].hgrid().next;
        while let Some(j) = b {
            if objects[j].hgrid().cell == cell {
                pairs.push((i, j));
            }
            b = objects[j].hgrid().next;
        }
        a = objects[i].hgrid().next;
    }
}

/// Pair `objects[index]` with every object linked into `target`.
pub fn find_contacts_with_target_cell<P: HGridObject>(
    grid: &HGrid,
    objects: &[P],
    target: &HGridCell,
    index: usize,
    pairs: &mut Vec<(usize, usize)>,
) {
    if objects[index].hgrid().cell.as_ref() == Some(target) {
        return;
    }
    let bucket = grid.bucket_of(target);
    for j in grid.bucket_iter(objects, bucket) {
        if objects[j].hgrid().cell.as_ref() == Some(target) {
            pairs.push((index, j));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(specs: &[(Vec3, f64)]) -> Result<ParticleHandler> {
        let mut h = ParticleHandler::new("particles");
        for &(x, r) in specs {
            h.add(Particle::new(x, [0.0; 3], r)?);
        }
        Ok(h)
    }

    fn sorted_pairs(pairs: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let mut out: Vec<_> = pairs.iter().map(|&(a, b)| (a.min(b), a.max(b))).collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn exponential_sizes_bracket_population() -> Result<()> {
        let h = handler(&[([0.0; 3], 0.1), ([1.0; 3], 0.8)])?;
        let bp = HGridBroadPhase::new(HGridConfig::default(), Dimension::Three, 1.0);
        let sizes = bp.compute_cell_sizes(&h);
        assert_eq!(sizes.len(), 3);
        assert!(sizes[0] > 0.2);
        assert!(sizes[2] > 1.6);
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }

    #[test]
    fn linear_sizes_are_evenly_spaced() -> Result<()> {
        let h = handler(&[([0.0; 3], 0.5), ([1.0; 3], 2.0)])?;
        let config = HGridConfig {
            distribution: HGridDistribution::Linear,
            ..HGridConfig::default()
        };
        let bp = HGridBroadPhase::new(config, Dimension::Three, 1.0);
        let sizes = bp.compute_cell_sizes(&h);
        assert!((sizes[0] - 2.0).abs() < 1e-12);
        assert!((sizes[1] - 3.0).abs() < 1e-12);
        assert!(sizes[2] > 4.0);
        Ok(())
    }

    #[test]
    fn monodisperse_population_uses_one_level() -> Result<()> {
        let h = handler(&[([0.0; 3], 0.5), ([1.0; 3], 0.5)])?;
        let bp = HGridBroadPhase::new(HGridConfig::default(), Dimension::Three, 1.0);
        let sizes = bp.compute_cell_sizes(&h);
        assert_eq!(sizes.len(), 1);
        assert!(sizes[0] > 1.0);
        Ok(())
    }

    #[test]
    fn user_sizes_get_top_level_appended() -> Result<()> {
        let h = handler(&[([0.0; 3], 0.1), ([1.0; 3], 1.0)])?;
        let config = HGridConfig {
            distribution: HGridDistribution::User,
            user_cell_sizes: vec![0.5, 1.0],
            ..HGridConfig::default()
        };
        let bp = HGridBroadPhase::new(config, Dimension::Three, 1.0);
        let sizes = bp.compute_cell_sizes(&h);
        assert_eq!(sizes.len(), 3);
        assert!(sizes[2] > 2.0);
        Ok(())
    }

    #[test]
    fn rebuild_triggers() -> Result<()> {
        let mut h = handler(&[([0.5; 3], 0.1), ([0.7; 3], 0.1)])?;
        let mut bp = HGridBroadPhase::new(HGridConfig::default(), Dimension::Three, 1.0);
        assert!(bp.needs_rebuilding(&h));
        bp.prepare(&mut h);
        assert_eq!(bp.rebuild_count(), 1);
        assert!(!bp.needs_rebuilding(&h));

        // a particle larger than the top cell
        h[0].radius = 5.0;
        h.refresh_extremes();
        assert!(bp.needs_rebuilding(&h));
        bp.prepare(&mut h);
        assert_eq!(bp.rebuild_count(), 2);
        assert!(!bp.needs_rebuilding(&h));

        bp.request_rebuild();
        assert!(bp.needs_rebuilding(&h));
        Ok(())
    }

    #[test]
    fn new_settings_force_a_rebuild() -> Result<()> {
        let mut h = handler(&[([0.5; 3], 0.1), ([0.7; 3], 0.3)])?;
        let mut bp = HGridBroadPhase::new(HGridConfig::default(), Dimension::Three, 1.0);
        bp.prepare(&mut h);
        let levels = bp.grid().map(|g| g.number_of_levels());

        let mut config = HGridConfig::default();
        config.max_levels = 1;
        bp.set_config(config)?;
        assert!(bp.needs_rebuilding(&h));
        bp.prepare(&mut h);
        assert_eq!(bp.rebuild_count(), 2);
        assert_eq!(bp.grid().map(|g| g.number_of_levels()), Some(1));
        assert_ne!(levels, Some(1));

        let mut bad = HGridConfig::default();
        bad.max_levels = 0;
        assert!(bp.set_config(bad).is_err());
        assert_eq!(bp.config().max_levels, 1);
        Ok(())
    }

    #[test]
    fn bucket_drift_triggers_rebuild() -> Result<()> {
        let mut h = handler(&[([0.5; 3], 0.01)])?;
        let mut bp = HGridBroadPhase::new(HGridConfig::default(), Dimension::Three, 1.0);
        bp.prepare(&mut h);
        for i in 0..100 {
            let x = 0.01 * i as f64;
            h.add(Particle::new([x, 0.0, 0.0], [0.0; 3], 0.01)?);
        }
        assert!(bp.needs_rebuilding(&h));
        Ok(())
    }

    #[test]
    fn neighbouring_pairs_found_once() -> Result<()> {
        let mut h = handler(&[
            ([0.1, 0.1, 0.1], 0.05),
            ([0.15, 0.1, 0.1], 0.05),
            ([0.12, 0.14, 0.1], 0.05),
        ])?;
        let mut bp = HGridBroadPhase::new(HGridConfig::default(), Dimension::Three, 1.0);
        bp.prepare(&mut h);
        let mut pairs = Vec::new();
        bp.candidate_pairs(&h, &mut pairs);
        assert_eq!(sorted_pairs(&pairs), vec![(0, 1), (0, 2), (1, 2)]);
        Ok(())
    }

    #[test]
    fn lazy_updates_wait_for_displacement() -> Result<()> {
        let mut h = handler(&[([0.5; 3], 0.1), ([0.2; 3], 0.1)])?;
        let config = HGridConfig {
            update_each_time_step: false,
            update_fraction: 0.25,
            cell_over_size_ratio: 2.0,
            ..HGridConfig::default()
        };
        let mut bp = HGridBroadPhase::new(config, Dimension::Three, 1.0);
        bp.prepare(&mut h);
        let cell = bp.grid().map(|g| g.cell_size(0)).unwrap_or(0.0);
        bp.record_displacement(&h[0], 0.1 * cell);
        bp.prepare(&mut h);
        assert_eq!(bp.update_count(), 0);
        bp.record_displacement(&h[0], 0.2 * cell);
        bp.prepare(&mut h);
        assert_eq!(bp.update_count(), 1);
        assert_eq!(bp.total_relative_displacement(), 0.0);
        Ok(())
    }

    #[test]
    fn lazy_updates_find_pairs_in_stale_cells() -> Result<()> {
        let mut h = handler(&[([0.85, 0.5, 0.5], 0.45), ([1.85, 0.5, 0.5], 0.45)])?;
        let config = HGridConfig {
            update_each_time_step: false,
            ..HGridConfig::default()
        };
        let mut bp = HGridBroadPhase::new(config, Dimension::Three, 1.0);
        bp.prepare(&mut h);
        let cells: Vec<i32> = h
            .iter()
            .filter_map(|p| p.hgrid_link().cell.map(|c| c.x))
            .collect();
        assert_eq!(cells, vec![0, 2]);

        // both stay within half a cell of where they were binned
        h[0].position[0] += 0.4;
        h[1].position[0] -= 0.2;
        bp.record_displacement(&h[0], 0.4);
        bp.record_displacement(&h[1], 0.2);
        bp.prepare(&mut h);
        assert_eq!(bp.update_count(), 0);
        assert_eq!(bp.rebuild_count(), 1);

        let mut pairs = Vec::new();
        bp.candidate_pairs(&h, &mut pairs);
        assert_eq!(sorted_pairs(&pairs), vec![(0, 1)]);
        Ok(())
    }

    #[test]
    fn all_pairs_lists_everything() -> Result<()> {
        let h = handler(&[([0.0; 3], 0.1), ([5.0; 3], 0.1), ([9.0; 3], 0.1)])?;
        let mut pairs = Vec::new();
        AllPairs.candidate_pairs(&h, &mut pairs);
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
        Ok(())
    }
}
