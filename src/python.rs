use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::SimulationConfig;
use crate::core::vector::{Vec3, DIM};
use crate::core::{Boundary, InfiniteWall, Particle, Simulation, Species};

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Accept 2 or 3 components; a missing z is 0.
fn to_vec3(values: &[f64], what: &str) -> PyResult<Vec3> {
    if values.len() != 2 && values.len() != DIM {
        return Err(py_err(format!(
            "{what} must have 2 or {DIM} components, got {}",
            values.len()
        )));
    }
    let mut out = [0.0; DIM];
    out[..values.len()].copy_from_slice(values);
    Ok(out)
}

fn to_array(rows: &[Vec3]) -> Array2<f64> {
    let mut arr = Array2::<f64>::zeros((rows.len(), DIM));
    for (i, row) in rows.iter().enumerate() {
        for k in 0..DIM {
            arr[[i, k]] = row[k];
        }
    }
    arr
}

/// Python-facing wrapper around [`Simulation`].
///
/// - __new__(config_ron=None): optional RON configuration text
/// - add_species / add_particle / add_wall / add_periodic_boundary
/// - advance_to(time)
/// - get_positions() / get_velocities() -> np.ndarray, shape (N, 3)
#[pyclass]
pub struct DemSim {
    sim: Simulation,
}

#[pymethods]
impl DemSim {
    /// Create an empty simulation, optionally from a RON configuration string.
    ///
    /// Errors: raises ValueError on a malformed or invalid configuration.
    #[new]
    #[pyo3(signature = (config_ron=None))]
    fn new(config_ron: Option<String>) -> PyResult<Self> {
        let config = match config_ron.as_deref() {
            Some(text) => SimulationConfig::from_ron_str(text).map_err(py_err)?,
            None => SimulationConfig::default(),
        };
        Ok(Self {
            sim: Simulation::new(config).map_err(py_err)?,
        })
    }

    /// Register a species whose head-on collisions between particles of
    /// mass `mass` last `collision_time` with restitution `restitution`.
    /// Returns the species index.
    fn add_species(
        &mut self,
        density: f64,
        collision_time: f64,
        restitution: f64,
        mass: f64,
    ) -> PyResult<usize> {
        let mut species = Species::new(density).map_err(py_err)?;
        species
            .set_collision_time_and_restitution(collision_time, restitution, mass)
            .map_err(py_err)?;
        Ok(self.sim.add_species(species))
    }

    /// Add a particle and return its id.
    #[pyo3(signature = (position, velocity, radius, species=0))]
    fn add_particle(
        &mut self,
        position: Vec<f64>,
        velocity: Vec<f64>,
        radius: f64,
        species: usize,
    ) -> PyResult<u64> {
        let p = Particle::new(
            to_vec3(&position, "position")?,
            to_vec3(&velocity, "velocity")?,
            radius,
        )
        .map_err(py_err)?
        .with_species(species);
        self.sim.add_particle(p).map_err(py_err)
    }

    /// Add an infinite wall through `point`; `normal` points out of the domain.
    #[pyo3(signature = (normal, point, species=0))]
    fn add_wall(&mut self, normal: Vec<f64>, point: Vec<f64>, species: usize) -> PyResult<u64> {
        let wall = InfiniteWall::new(to_vec3(&normal, "normal")?, to_vec3(&point, "point")?)
            .map_err(py_err)?
            .with_species(species);
        self.sim.add_wall(wall).map_err(py_err)
    }

    /// Add a periodic boundary between the planes n·x = left and n·x = right.
    fn add_periodic_boundary(&mut self, normal: Vec<f64>, left: f64, right: f64) -> PyResult<u64> {
        let boundary =
            Boundary::periodic(to_vec3(&normal, "normal")?, left, right).map_err(py_err)?;
        Ok(self.sim.add_boundary(boundary))
    }

    /// Advance the simulation to the specified absolute time (releases the GIL during computation).
    fn advance_to(&mut self, py: Python<'_>, target_time: f64) -> PyResult<()> {
        py.detach(|| self.sim.advance_to(target_time))
            .map_err(py_err)
    }

    /// Return positions of the real particles, shape (N, 3), dtype=float64.
    fn get_positions<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        Ok(to_array(&self.sim.positions()).into_pyarray(py).unbind())
    }

    /// Return velocities of the real particles, shape (N, 3), dtype=float64.
    fn get_velocities<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        Ok(to_array(&self.sim.velocities()).into_pyarray(py).unbind())
    }

    fn kinetic_energy(&self) -> f64 {
        self.sim.kinetic_energy()
    }

    fn time(&self) -> f64 {
        self.sim.time()
    }

    fn num_particles(&self) -> usize {
        self.sim.num_particles()
    }
}

/// The dpmsim Python module entry point.
#[pymodule]
fn dpmsim(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<DemSim>()?;
    Ok(())
}
