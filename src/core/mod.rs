#![allow(missing_docs)]

//! Core data structures of the particle engine.
//!
//! Entities live in [`handler::EntityHandler`]s and refer to each other by
//! index. The hierarchical grid ([`hgrid`]) threads its bucket lists through
//! those indices, so every removal goes through [`sim::Simulation`], which
//! keeps the grid, the contact history and the handlers in step.

pub mod boundary;
pub mod broad_phase;
pub mod force;
pub mod handler;
pub mod hgrid;
pub mod interaction;
pub mod optimiser;
pub mod particle;
pub mod sim;
pub mod species;
pub mod vector;
pub mod wall;

pub use boundary::{Boundary, Crossing, MaserBoundary, PeriodicBoundary};
pub use broad_phase::{AllPairs, BroadPhase, HGridBroadPhase};
pub use force::{ContactForce, ContactLaw, LinearSpringDashpot};
pub use handler::{EntityHandler, HandlerObject};
pub use hgrid::{Dimension, HGrid, HGridDistribution, HGridMethod};
pub use interaction::{Interaction, InteractionHandler};
pub use optimiser::GridOptimiser;
pub use particle::{Particle, ParticleHandler};
pub use sim::{Simulation, StepStatistics};
pub use species::Species;
pub use vector::Vec3;
pub use wall::InfiniteWall;
