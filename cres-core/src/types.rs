//! Core geometric types for contact computations.
//!
//! All geometry is carried in 3-vector form regardless of the spatial
//! dimension of the problem: 2-D segments keep z ≡ 0, so a single code
//! path serves both the plane and the full 3-D case.

use nalgebra::Vector3;

/// A point in physical space.
pub type Point3 = Vector3<f64>;

/// A vector in physical space (tangent, normal, traction direction, ...).
pub type Vec3 = Vector3<f64>;

/// Maximum number of nodes a contact segment can carry (8-node quad).
pub const MAX_SEGMENT_NODES: usize = 8;

/// Maximum number of parametric directions on a segment patch.
pub const MAX_PARAMETRIC_DIM: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_point_keeps_zero_z() {
        let p = Point3::new(1.5, -2.0, 0.0);
        assert_eq!(p.z, 0.0);
        let q = p + Vec3::new(0.5, 0.5, 0.0);
        assert_eq!(q.z, 0.0);
    }
}
