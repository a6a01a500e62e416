//! Contact force laws.
//!
//! The engine hands every candidate pair to a [`ContactLaw`] exactly once per
//! step. The law decides whether the pair actually touches.

use crate::core::interaction::Interaction;
use crate::core::particle::Particle;
use crate::core::species::ContactParameters;
use crate::core::vector::{self, Vec3};
use crate::core::wall::InfiniteWall;

/// Outcome of a particle-particle contact evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactForce {
    /// Force acting on the first particle; the second receives its negative.
    pub force: Vec3,
    /// Overlap δ > 0.
    pub overlap: f64,
    /// Updated tangential spring to store in the contact history.
    pub tangential_spring: Vec3,
}

/// Pairwise force model.
pub trait ContactLaw: Send {
    /// Force between `a` and `b`, or `None` when they do not touch.
    ///
    /// `history` is the stored contact for this pair, if any.
    fn particle_contact(
        &self,
        a: &Particle,
        b: &Particle,
        params: &ContactParameters,
        history: Option<&Interaction>,
        dt: f64,
    ) -> Option<ContactForce>;

    /// Force of `wall` on `p`, or `None` without contact.
    fn wall_contact(
        &self,
        p: &Particle,
        wall: &InfiniteWall,
        params: &ContactParameters,
    ) -> Option<Vec3>;
}

/// Linear spring-dashpot normal force with an optional Coulomb-limited
/// tangential spring.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearSpringDashpot;

impl ContactLaw for LinearSpringDashpot {
    fn particle_contact(
        &self,
        a: &Particle,
        b: &Particle,
        params: &ContactParameters,
        history: Option<&Interaction>,
        dt: f64,
    ) -> Option<ContactForce> {
        let branch = vector::sub(a.position, b.position);
        let distance = vector::norm(branch);
        let overlap = a.radius + b.radius - distance;
        if overlap <= 0.0 || distance <= f64::EPSILON {
            return None;
        }
        let normal = vector::scale(branch, 1.0 / distance);
        let relative_velocity = vector::sub(a.velocity, b.velocity);
        let normal_speed = vector::dot(relative_velocity, normal);
        let normal_force = params.stiffness * overlap - params.dissipation * normal_speed;
        let mut force = vector::scale(normal, normal_force);

        let mut spring = history.map_or(vector::ZERO, |h| h.tangential_spring);
        if params.sliding_stiffness > 0.0 || params.sliding_dissipation > 0.0 {
            let tangential_velocity =
                vector::sub(relative_velocity, vector::scale(normal, normal_speed));
            // keep the spring in the current tangent plane
            spring = vector::sub(spring, vector::scale(normal, vector::dot(spring, normal)));
            vector::add_scaled(&mut spring, tangential_velocity, dt);
            let mut tangential = vector::add(
                vector::scale(spring, -params.sliding_stiffness),
                vector::scale(tangential_velocity, -params.sliding_dissipation),
            );
            let limit = params.sliding_friction * normal_force.abs();
            let magnitude = vector::norm(tangential);
            if magnitude > limit && magnitude > 0.0 {
                tangential = vector::scale(tangential, limit / magnitude);
                if params.sliding_stiffness > 0.0 {
                    spring = vector::scale(
                        vector::add(
                            tangential,
                            vector::scale(tangential_velocity, params.sliding_dissipation),
                        ),
                        -1.0 / params.sliding_stiffness,
                    );
                }
            }
            force = vector::add(force, tangential);
        } else {
            spring = vector::ZERO;
        }

        Some(ContactForce {
            force,
            overlap,
            tangential_spring: spring,
        })
    }

    fn wall_contact(
        &self,
        p: &Particle,
        wall: &InfiniteWall,
        params: &ContactParameters,
    ) -> Option<Vec3> {
        let distance = wall.distance(p.position);
        let overlap = p.radius - distance;
        if overlap <= 0.0 {
            return None;
        }
        // force pushes back into the domain, against the outward normal
        let inward = vector::scale(wall.normal(), -1.0);
        let normal_speed = vector::dot(p.velocity, inward);
        let magnitude = params.stiffness * overlap - params.dissipation * normal_speed;
        Some(vector::scale(inward, magnitude))
    }
}
