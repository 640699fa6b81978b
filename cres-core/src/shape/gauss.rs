//! Gauss quadrature rules for contact segment integration.
//!
//! Provides Gauss-Legendre rules on the reference line, tensor-product
//! rules on the reference quadrilateral, and a symmetric rule on the unit
//! triangle, expressed in the same parametric coordinates the shape
//! functions use.

use crate::shape::SegmentTopology;

/// 1D Gauss-Legendre quadrature points and weights.
///
/// Returns (point, weight) pairs for integration on [-1, 1].
///
/// # Panics
///
/// Panics if `n` is not in 1..=3.
pub fn gauss_1d(n: usize) -> Vec<(f64, f64)> {
    match n {
        1 => vec![(0.0, 2.0)],
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        _ => panic!("gauss_1d: n must be 1, 2, or 3, got {}", n),
    }
}

/// A quadrature rule over one contact segment.
///
/// Points are parametric (r, s) pairs; `s` is unused for 1-D topologies.
/// The same rule value must be passed to table seeding and to assembly:
/// the persistent Gauss-point records are identified by their position in
/// this rule.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    points: Vec<[f64; 2]>,
    weights: Vec<f64>,
}

impl QuadratureRule {
    /// Create a rule from explicit points and weights.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ or the rule is empty.
    pub fn new(points: Vec<[f64; 2]>, weights: Vec<f64>) -> Self {
        assert_eq!(points.len(), weights.len(), "points/weights length mismatch");
        assert!(!points.is_empty(), "empty quadrature rule");
        Self { points, weights }
    }

    /// The default rule for a segment topology: 2-point line, 2x2 quad,
    /// 3-point triangle, 3x3 serendipity quad.
    pub fn for_topology(topology: SegmentTopology) -> Self {
        match topology {
            SegmentTopology::Line2 => {
                let rule = gauss_1d(2);
                Self::new(
                    rule.iter().map(|&(r, _)| [r, 0.0]).collect(),
                    rule.iter().map(|&(_, w)| w).collect(),
                )
            }
            SegmentTopology::Quad4 => Self::tensor_quad(2),
            SegmentTopology::Quad8 => Self::tensor_quad(3),
            SegmentTopology::Tri6 => {
                // Edge-midpoint rule, degree 2, on the unit triangle.
                let w = 1.0 / 6.0;
                Self::new(
                    vec![[0.5, 0.0], [0.5, 0.5], [0.0, 0.5]],
                    vec![w, w, w],
                )
            }
        }
    }

    /// Tensor product of the n-point 1D rule on [-1, 1]².
    pub fn tensor_quad(n: usize) -> Self {
        let rule_1d = gauss_1d(n);
        let mut points = Vec::with_capacity(n * n);
        let mut weights = Vec::with_capacity(n * n);
        for &(r, wr) in &rule_1d {
            for &(s, ws) in &rule_1d {
                points.push([r, s]);
                weights.push(wr * ws);
            }
        }
        Self::new(points, weights)
    }

    /// Number of integration points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Parametric coordinates of the integration points.
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Integration weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Iterate (point, weight) pairs.
    pub fn iter(&self) -> impl Iterator<Item = ([f64; 2], f64)> + '_ {
        self.points
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gauss_1d_weights_sum() {
        for n in 1..=3 {
            let rule = gauss_1d(n);
            let sum: f64 = rule.iter().map(|&(_, w)| w).sum();
            assert_relative_eq!(sum, 2.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_gauss_1d_integrates_cubics() {
        // 2-point rule is exact through degree 3.
        let rule = gauss_1d(2);
        let integral: f64 = rule.iter().map(|&(x, w)| x.powi(3) * w).sum();
        assert_relative_eq!(integral, 0.0, epsilon = 1e-14);
        let integral: f64 = rule.iter().map(|&(x, w)| x.powi(2) * w).sum();
        assert_relative_eq!(integral, 2.0 / 3.0, epsilon = 1e-14);
    }

    #[test]
    fn test_default_rule_weight_sums() {
        // Reference measures: line 2, quads 4, unit triangle 1/2.
        let cases = [
            (SegmentTopology::Line2, 2.0),
            (SegmentTopology::Quad4, 4.0),
            (SegmentTopology::Quad8, 4.0),
            (SegmentTopology::Tri6, 0.5),
        ];
        for (topo, expected) in cases {
            let rule = QuadratureRule::for_topology(topo);
            let sum: f64 = rule.weights().iter().sum();
            assert_relative_eq!(sum, expected, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_default_rule_point_counts() {
        assert_eq!(QuadratureRule::for_topology(SegmentTopology::Line2).len(), 2);
        assert_eq!(QuadratureRule::for_topology(SegmentTopology::Quad4).len(), 4);
        assert_eq!(QuadratureRule::for_topology(SegmentTopology::Tri6).len(), 3);
        assert_eq!(QuadratureRule::for_topology(SegmentTopology::Quad8).len(), 9);
    }

    #[test]
    fn test_triangle_rule_integrates_linears() {
        // ∫ r dA over the unit triangle = 1/6.
        let rule = QuadratureRule::for_topology(SegmentTopology::Tri6);
        let integral: f64 = rule.iter().map(|([r, _], w)| r * w).sum();
        assert_relative_eq!(integral, 1.0 / 6.0, epsilon = 1e-14);
    }

    #[test]
    #[should_panic(expected = "gauss_1d: n must be")]
    fn test_gauss_1d_invalid_n() {
        gauss_1d(4);
    }
}
