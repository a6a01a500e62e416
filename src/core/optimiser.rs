//! Choice of HGrid cell sizes from the particle size distribution.
//!
//! The radii are binned into a histogram. A candidate set of level
//! boundaries `R_0 = r_min < R_1 < ... < R_L = r_max` puts radii in
//! `[R_{i-1}, R_i)` on level `i`, with cell size `2 * ratio * R_i`. The
//! expected broad-phase cost of such a grid is modelled as
//!
//! ```text
//! W = sum_i sum_{j searched from i} E_ij * (rho_j + overhead)
//! ```
//!
//! where `E_ij` is the number of level-`j` cells visited by all level-`i`
//! particles and `rho_j` the mean number of level-`j` particles per level-`j`
//! cell. Boundaries are moved along the negative gradient of `W` with a
//! golden-section line search until the improvement falls below a tolerance.

use crate::core::hgrid::{Dimension, HGridMethod};
use crate::error::{Error, Result};
use log::{debug, warn};

const GOLDEN: f64 = 0.618_033_988_749_894_8;

/// Minimise `f` on `[lo, hi]` by golden-section search.
pub fn golden_section_search<F: FnMut(f64) -> f64>(mut f: F, lo: f64, hi: f64) -> f64 {
    let (mut a, mut b) = (lo.min(hi), lo.max(hi));
    let tolerance = 1e-12 * (b - a).abs().max(f64::MIN_POSITIVE);
    let mut c = b - GOLDEN * (b - a);
    let mut d = a + GOLDEN * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    for _ in 0..200 {
        if (b - a).abs() <= tolerance {
            break;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - GOLDEN * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + GOLDEN * (b - a);
            fd = f(d);
        }
    }
    0.5 * (a + b)
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Result of [`GridOptimiser::optimise`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisationReport {
    /// Final level boundaries in radius, first `r_min`, last `r_max`.
    pub boundaries: Vec<f64>,
    /// Work after initialisation and after every accepted change.
    pub work_history: Vec<f64>,
    /// Gradient steps taken.
    pub iterations: usize,
}

impl OptimisationReport {
    pub fn final_work(&self) -> f64 {
        self.work_history.last().copied().unwrap_or(f64::INFINITY)
    }
}

/// Histogram-based cost model and optimiser for the HGrid cell sizes.
#[derive(Debug, Clone)]
pub struct GridOptimiser {
    dimension: Dimension,
    r_min: f64,
    r_max: f64,
    bin_width: f64,
    /// Particles per unit radius in each bin.
    bin_density: Vec<f64>,
    number_of_particles: usize,
    volume: f64,
    cell_over_size_ratio: f64,
    overhead_ratio: f64,
    tolerance: f64,
    max_iterations: usize,
}

impl GridOptimiser {
    /// Build the size histogram.
    ///
    /// - `radii`: interaction radii of all particles (non-empty, finite, > 0)
    /// - `number_of_bins`: histogram resolution (> 0)
    /// - `volume`: domain volume (area in 2D), > 0
    /// - `overhead_ratio`: cost of visiting a cell relative to one contact check
    pub fn new(
        dimension: Dimension,
        radii: &[f64],
        number_of_bins: usize,
        volume: f64,
        cell_over_size_ratio: f64,
        overhead_ratio: f64,
    ) -> Result<Self> {
        if radii.is_empty() {
            return Err(Error::InvalidParam("optimiser needs at least one radius".into()));
        }
        if radii.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(Error::InvalidParam("radii must be finite and > 0".into()));
        }
        if number_of_bins == 0 {
            return Err(Error::InvalidParam("number of bins must be > 0".into()));
        }
        if !volume.is_finite() || volume <= 0.0 {
            return Err(Error::InvalidParam("domain volume must be finite and > 0".into()));
        }
        if !cell_over_size_ratio.is_finite() || cell_over_size_ratio <= 0.0 {
            return Err(Error::InvalidParam("cell over-size ratio must be > 0".into()));
        }
        if !overhead_ratio.is_finite() || overhead_ratio < 0.0 {
            return Err(Error::InvalidParam("overhead ratio must be >= 0".into()));
        }

        let r_min = radii.iter().copied().fold(f64::INFINITY, f64::min);
        let r_max = radii.iter().copied().fold(0.0_f64, f64::max).next_up();
        // a (nearly) monodisperse sample gets a single bin
        let bins = if r_max - r_min <= 1e-12 * r_max {
            1
        } else {
            number_of_bins
        };
        let bin_width = (r_max - r_min) / bins as f64;
        let mut counts = vec![0usize; bins];
        for &r in radii {
            let k = (((r - r_min) / bin_width) as usize).min(bins - 1);
            counts[k] += 1;
        }
        let bin_density = counts.iter().map(|&c| c as f64 / bin_width).collect();

        Ok(Self {
            dimension,
            r_min,
            r_max,
            bin_width,
            bin_density,
            number_of_particles: radii.len(),
            volume,
            cell_over_size_ratio,
            overhead_ratio,
            tolerance: 1e-7,
            max_iterations: 1000,
        })
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn r_min(&self) -> f64 {
        self.r_min
    }

    /// Exclusive upper end of the radius range.
    pub fn r_max(&self) -> f64 {
        self.r_max
    }

    pub fn number_of_bins(&self) -> usize {
        self.bin_density.len()
    }

    pub fn number_of_particles(&self) -> usize {
        self.number_of_particles
    }

    /// Histogram bin holding `radius`.
    ///
    /// Errors:
    /// - `Error::RadiusOutOfRange` outside `[r_min, r_max)`.
    pub fn radius_to_bin(&self, radius: f64) -> Result<usize> {
        if !(radius >= self.r_min && radius < self.r_max) {
            return Err(Error::RadiusOutOfRange {
                radius,
                min: self.r_min,
                max: self.r_max,
            });
        }
        Ok(self.bin_of(radius))
    }

    fn bin_of(&self, radius: f64) -> usize {
        let k = ((radius - self.r_min) / self.bin_width).max(0.0) as usize;
        k.min(self.bin_density.len() - 1)
    }

    fn bin_edge(&self, k: usize) -> f64 {
        if k == self.bin_density.len() {
            self.r_max
        } else {
            self.r_min + k as f64 * self.bin_width
        }
    }

    /// `∫_a^b n(r) r^m dr` over the histogram density `n`.
    pub fn moment(&self, a: f64, b: f64, m: usize) -> f64 {
        let a = a.max(self.r_min);
        let b = b.min(self.r_max);
        if b <= a {
            return 0.0;
        }
        let p = (m + 1) as i32;
        let mut sum = 0.0;
        for k in self.bin_of(a)..=self.bin_of(b) {
            let lo = a.max(self.bin_edge(k));
            let hi = b.min(self.bin_edge(k + 1));
            if hi > lo {
                sum += self.bin_density[k] * (hi.powi(p) - lo.powi(p)) / p as f64;
            }
        }
        sum
    }

    fn density_at(&self, radius: f64) -> f64 {
        self.bin_density[self.bin_of(radius)]
    }

    fn same_level_cells(&self) -> f64 {
        (3f64.powi(self.dimension.count() as i32) + 1.0) / 2.0
    }

    /// `Σ_m C(d,m) 2^(d-m) (2/h)^m moments[m]`: cells a level visits on a
    /// foreign level of cell size `h`.
    fn cross_level_cells(&self, moments: &[f64], h: f64) -> f64 {
        let d = self.dimension.count();
        (0..=d)
            .map(|m| {
                binomial(d, m) * 2f64.powi((d - m) as i32) * (2.0 / h).powi(m as i32) * moments[m]
            })
            .sum()
    }

    /// Derivative of [`Self::cross_level_cells`] with respect to `h`.
    fn cross_level_cells_dh(&self, moments: &[f64], h: f64) -> f64 {
        let d = self.dimension.count();
        (1..=d)
            .map(|m| {
                -(m as f64)
                    * binomial(d, m)
                    * 2f64.powi((d - m) as i32)
                    * 2f64.powi(m as i32)
                    * h.powi(-(m as i32) - 1)
                    * moments[m]
            })
            .sum()
    }

    fn searched(method: HGridMethod, from: usize, to: usize) -> bool {
        match method {
            HGridMethod::BottomUp => to >= from,
            HGridMethod::TopDown => to <= from,
        }
    }

    fn level_moments(&self, boundaries: &[f64]) -> Vec<Vec<f64>> {
        let d = self.dimension.count();
        boundaries
            .windows(2)
            .map(|w| (0..=d).map(|m| self.moment(w[0], w[1], m)).collect())
            .collect()
    }

    fn cell_size_of(&self, upper: f64) -> f64 {
        2.0 * self.cell_over_size_ratio * upper
    }

    /// Modelled cost of the grid with the given level `boundaries`.
    pub fn calculate_work(&self, boundaries: &[f64], method: HGridMethod) -> f64 {
        let levels = boundaries.len().saturating_sub(1);
        let d = self.dimension.count() as i32;
        let moments = self.level_moments(boundaries);
        let h: Vec<f64> = boundaries[1..].iter().map(|&b| self.cell_size_of(b)).collect();
        let rho: Vec<f64> = (0..levels)
            .map(|j| moments[j][0] * h[j].powi(d) / self.volume)
            .collect();

        let mut work = 0.0;
        for i in 0..levels {
            for j in 0..levels {
                if !Self::searched(method, i, j) {
                    continue;
                }
                let cells = if i == j {
                    self.same_level_cells() * moments[i][0]
                } else {
                    self.cross_level_cells(&moments[i], h[j])
                };
                work += cells * (rho[j] + self.overhead_ratio);
            }
        }
        work
    }

    /// Gradient of [`Self::calculate_work`] with respect to every boundary.
    /// The two end points are fixed and get 0.
    pub fn calculate_diff_work(&self, boundaries: &[f64], method: HGridMethod) -> Vec<f64> {
        let n = boundaries.len();
        let mut grad = vec![0.0; n];
        if n < 3 {
            return grad;
        }
        let levels = n - 1;
        let d = self.dimension.count();
        let di = d as i32;
        let dh_db = 2.0 * self.cell_over_size_ratio;
        let moments = self.level_moments(boundaries);
        let h: Vec<f64> = boundaries[1..].iter().map(|&b| self.cell_size_of(b)).collect();
        let rho: Vec<f64> = (0..levels)
            .map(|j| moments[j][0] * h[j].powi(di) / self.volume)
            .collect();

        for k in 1..levels {
            // boundary k closes level k-1 and opens level k
            let b = boundaries[k];
            let f = self.density_at(b);
            let powers: Vec<f64> = (0..=d).map(|m| f * b.powi(m as i32)).collect();
            let mut d_moments = vec![vec![0.0; d + 1]; levels];
            d_moments[k - 1] = powers.clone();
            d_moments[k] = powers.iter().map(|p| -p).collect();

            let mut d_h = vec![0.0; levels];
            d_h[k - 1] = dh_db;

            let mut d_rho = vec![0.0; levels];
            d_rho[k - 1] = (d_moments[k - 1][0] * h[k - 1].powi(di)
                + moments[k - 1][0] * d as f64 * h[k - 1].powi(di - 1) * dh_db)
                / self.volume;
            d_rho[k] = d_moments[k][0] * h[k].powi(di) / self.volume;

            let mut g = 0.0;
            for i in 0..levels {
                for j in 0..levels {
                    if !Self::searched(method, i, j) {
                        continue;
                    }
                    let (cells, d_cells) = if i == j {
                        let s = self.same_level_cells();
                        (s * moments[i][0], s * d_moments[i][0])
                    } else {
                        (
                            self.cross_level_cells(&moments[i], h[j]),
                            self.cross_level_cells(&d_moments[i], h[j])
                                + self.cross_level_cells_dh(&moments[i], h[j]) * d_h[j],
                        )
                    };
                    g += d_cells * (rho[j] + self.overhead_ratio) + cells * d_rho[j];
                }
            }
            grad[k] = g;
        }
        grad
    }

    /// Equally spaced starting boundaries for `levels` levels.
    pub fn initial_boundaries(&self, levels: usize) -> Vec<f64> {
        let levels = levels.max(1);
        let mut b: Vec<f64> = (0..=levels)
            .map(|i| self.r_min + (self.r_max - self.r_min) * i as f64 / levels as f64)
            .collect();
        b[levels] = self.r_max;
        b
    }

    /// Cell sizes of the grid described by `boundaries`.
    ///
    /// The top size is nudged up by one ulp so the largest particle fits
    /// strictly inside it.
    pub fn cell_sizes(&self, boundaries: &[f64]) -> Vec<f64> {
        let mut sizes: Vec<f64> = boundaries[1..].iter().map(|&b| self.cell_size_of(b)).collect();
        if let Some(top) = sizes.last_mut() {
            *top = top.next_up();
        }
        sizes
    }

    /// Optimise and return only the cell sizes.
    pub fn optimal_cell_sizes(&self, max_levels: usize, method: HGridMethod) -> Result<Vec<f64>> {
        let report = self.optimise(max_levels, method)?;
        Ok(self.cell_sizes(&report.boundaries))
    }

    /// Run the gradient descent starting from `max_levels` equal levels.
    ///
    /// Levels that collapse to zero width are merged away, so the result
    /// can hold fewer levels than requested.
    pub fn optimise(&self, max_levels: usize, method: HGridMethod) -> Result<OptimisationReport> {
        if max_levels == 0 {
            return Err(Error::InvalidParam("number of levels must be > 0".into()));
        }
        let single_bin = self.bin_density.len() == 1;
        let mut boundaries = self.initial_boundaries(if single_bin { 1 } else { max_levels });
        let mut work = self.calculate_work(&boundaries, method);
        if !work.is_finite() {
            return Err(Error::MathError(format!("initial work is {work}")));
        }
        let mut history = vec![work];
        let mut iterations = 0;

        while iterations < self.max_iterations {
            self.try_merge(&mut boundaries, &mut work, &mut history, method);
            if boundaries.len() < 3 {
                break;
            }

            let grad = self.calculate_diff_work(&boundaries, method);
            if grad.iter().all(|&g| g == 0.0) {
                break;
            }
            let Some(max_step) = Self::max_step(&boundaries, &grad) else {
                break;
            };

            let mut low = max_step;
            let mut accepted = None;
            for _ in 0..40 {
                let mut line = |s: f64| self.calculate_work(&Self::apply_step(&boundaries, &grad, s), method);
                let mut step = golden_section_search(&mut line, low, 0.0);
                if line(low) < line(step) {
                    step = low;
                }
                let trial = Self::apply_step(&boundaries, &grad, step);
                let trial_work = self.calculate_work(&trial, method);
                if trial_work < work {
                    accepted = Some((trial, trial_work));
                    break;
                }
                low *= 0.5;
            }
            let Some((trial, trial_work)) = accepted else {
                break;
            };

            iterations += 1;
            let improvement = work - trial_work;
            debug!("optimiser: iteration {iterations}, work {trial_work}, improvement {improvement}");
            boundaries = trial;
            work = trial_work;
            history.push(work);
            if improvement < self.tolerance {
                break;
            }
        }
        self.try_merge(&mut boundaries, &mut work, &mut history, method);
        if iterations >= self.max_iterations {
            warn!(
                "optimiser: stopped after {} iterations without converging (work {})",
                iterations, work
            );
        }

        Ok(OptimisationReport {
            boundaries,
            work_history: history,
            iterations,
        })
    }

    /// Most negative step along the gradient that keeps boundaries ordered.
    fn max_step(boundaries: &[f64], grad: &[f64]) -> Option<f64> {
        let mut max_step = f64::NEG_INFINITY;
        for k in 0..boundaries.len() - 1 {
            let gap = boundaries[k + 1] - boundaries[k];
            let slope = grad[k + 1] - grad[k];
            if slope > 0.0 {
                max_step = max_step.max(-gap / slope);
            }
        }
        (max_step.is_finite() && max_step < 0.0).then_some(max_step)
    }

    fn apply_step(boundaries: &[f64], grad: &[f64], step: f64) -> Vec<f64> {
        let last = boundaries.len() - 1;
        let mut out = boundaries.to_vec();
        for k in 1..last {
            out[k] = (boundaries[k] + step * grad[k]).clamp(out[k - 1], boundaries[last]);
        }
        out
    }

    /// Drop zero-width levels unless that raises the work.
    fn try_merge(
        &self,
        boundaries: &mut Vec<f64>,
        work: &mut f64,
        history: &mut Vec<f64>,
        method: HGridMethod,
    ) {
        let merged = self.merge_collapsed(boundaries);
        if merged.len() == boundaries.len() {
            return;
        }
        let merged_work = self.calculate_work(&merged, method);
        if merged_work <= *work {
            debug!(
                "optimiser: merged to {} levels, work {} -> {merged_work}",
                merged.len() - 1,
                *work
            );
            *boundaries = merged;
            *work = merged_work;
            history.push(merged_work);
        }
    }

    fn merge_collapsed(&self, boundaries: &[f64]) -> Vec<f64> {
        let eps = 1e-12 * (self.r_max - self.r_min);
        let last = boundaries[boundaries.len() - 1];
        let mut out = vec![boundaries[0]];
        for &b in &boundaries[1..boundaries.len() - 1] {
            if out.last().is_some_and(|&prev| b - prev > eps) {
                out.push(b);
            }
        }
        while out.len() > 1 && out.last().is_some_and(|&prev| last - prev <= eps) {
            out.pop();
        }
        out.push(last);
        out
    }
}
