use crate::core::handler::HandlerObject;
use crate::core::vector::{self, Vec3};
use crate::error::{Error, Result};

/// Infinite flat wall `normal · x = position`.
///
/// The normal points out of the domain: the wall occupies the half space
/// `normal · x > position`, and particles live on the other side.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteWall {
    id: u64,
    index: usize,
    normal: Vec3,
    position: f64,
    /// Species index used to mix contact parameters.
    pub species: usize,
}

impl InfiniteWall {
    /// Wall through `point` with outward `normal` (normalised here).
    ///
    /// Errors:
    /// - `Error::InvalidParam` for a zero or non-finite normal or point.
    pub fn new(normal: Vec3, point: Vec3) -> Result<Self> {
        if !vector::is_finite(point) {
            return Err(Error::InvalidParam("wall point must be finite".into()));
        }
        let normal = vector::normalized(normal)
            .ok_or_else(|| Error::InvalidParam("wall normal must be non-zero and finite".into()))?;
        Ok(Self {
            id: 0,
            index: 0,
            normal,
            position: vector::dot(normal, point),
            species: 0,
        })
    }

    pub fn with_species(mut self, species: usize) -> Self {
        self.species = species;
        self
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// Signed distance from `x` to the wall, positive on the particle side.
    pub fn distance(&self, x: Vec3) -> f64 {
        self.position - vector::dot(self.normal, x)
    }
}

impl HandlerObject for InfiniteWall {
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
