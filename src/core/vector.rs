//! Fixed-size vector helpers shared by particles, walls and boundaries.
//!
//! Positions are always stored with three components. 2D runs keep the z
//! component at zero; the grid ignores it through [`crate::core::Dimension`].

/// Number of stored spatial components.
pub const DIM: usize = 3;

/// Plain three-component vector.
pub type Vec3 = [f64; DIM];

pub const ZERO: Vec3 = [0.0; DIM];

#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn norm_sq(a: Vec3) -> f64 {
    dot(a, a)
}

#[inline]
pub fn norm(a: Vec3) -> f64 {
    norm_sq(a).sqrt()
}

/// `a += s * b`, the update used by the integrator.
#[inline]
pub fn add_scaled(a: &mut Vec3, b: Vec3, s: f64) {
    for k in 0..DIM {
        a[k] += s * b[k];
    }
}

#[inline]
pub fn is_finite(a: Vec3) -> bool {
    a.iter().all(|x| x.is_finite())
}

/// Returns the unit vector along `a`, or `None` for a (near) zero vector.
pub fn normalized(a: Vec3) -> Option<Vec3> {
    let n = norm(a);
    if !n.is_finite() || n <= f64::EPSILON {
        return None;
    }
    Some(scale(a, 1.0 / n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_helpers() {
        let a = [1.0, 2.0, 3.0];
        let b = [-1.0, 0.5, 2.0];
        assert_eq!(add(a, b), [0.0, 2.5, 5.0]);
        assert_eq!(sub(a, b), [2.0, 1.5, 1.0]);
        assert_eq!(scale(a, 2.0), [2.0, 4.0, 6.0]);
        assert!((dot(a, b) - 6.0).abs() < 1e-15);
        let mut c = a;
        add_scaled(&mut c, b, 2.0);
        assert_eq!(c, [-1.0, 3.0, 7.0]);
    }

    #[test]
    fn normalized_rejects_zero() {
        assert!(normalized(ZERO).is_none());
        let n = normalized([3.0, 0.0, 4.0]).unwrap();
        assert!((norm(n) - 1.0).abs() < 1e-15);
        assert!((n[0] - 0.6).abs() < 1e-15);
    }
}
