//! Soft-sphere discrete particle simulation with a hierarchical grid broad phase.
//!
//! The engine advances spherical particles with a velocity-Verlet time loop.
//! Contacts are found with a multi-level hash grid whose cell sizes can be
//! tuned per particle-size distribution by [`core::GridOptimiser`]. Periodic
//! and maser boundaries work through ghost copies.
//!
//! Enable the `python` feature to build the `dpmsim` extension module.

pub mod config;
pub mod core;
pub mod error;

#[cfg(feature = "python")]
mod python;

pub use crate::config::SimulationConfig;
pub use crate::core::Simulation;
pub use crate::error::{Error, Result};
