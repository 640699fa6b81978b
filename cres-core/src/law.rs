//! Penalty contact constitutive model: unilateral normal law and
//! Coulomb-friction stick/slip return mapping.
//!
//! Tangential quantities live in the master patch's parametric tangent
//! basis, which need not be orthonormal; norms are therefore measured in
//! the covariant metric (the tangent-vector Gram matrix), never the plain
//! Euclidean one.
//!
//! The update is invoked once per active Gauss point per assembly call
//! and makes no distinction between a trial and a converged commit;
//! drivers call it once per accepted nonlinear iterate, or snapshot and
//! restore the record externally.

use crate::state::GaussPoint;
use crate::types::Vec3;

/// Slip-function tolerance: stick while ‖t_T‖ + μ·t_N ≤ this.
pub const STICK_TOL: f64 = 1e-10;

/// Trial-norm floor below which the slip direction is taken as zero.
const DIRECTION_TOL: f64 = 1e-10;

/// Covariant metric of a master patch's parametric tangent basis.
#[derive(Debug, Clone, Copy)]
pub struct CovariantMetric {
    npd: usize,
    m: [[f64; 2]; 2],
    inv: [[f64; 2]; 2],
}

impl CovariantMetric {
    /// Build the Gram matrix of the current tangent vectors and its
    /// inverse. Returns `None` when the metric is singular (degenerate
    /// patch geometry).
    pub fn new(tangents: &[Vec3; 2], npd: usize) -> Option<Self> {
        debug_assert!(npd == 1 || npd == 2);
        let mut m = [[0.0; 2]; 2];
        for a in 0..npd {
            for b in 0..npd {
                m[a][b] = tangents[a].dot(&tangents[b]);
            }
        }

        let mut inv = [[0.0; 2]; 2];
        if npd == 1 {
            if m[0][0].abs() < f64::EPSILON {
                return None;
            }
            inv[0][0] = 1.0 / m[0][0];
        } else {
            let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
            if det.abs() < f64::EPSILON {
                return None;
            }
            let inv_det = 1.0 / det;
            inv[0][0] = inv_det * m[1][1];
            inv[0][1] = -inv_det * m[0][1];
            inv[1][0] = -inv_det * m[1][0];
            inv[1][1] = inv_det * m[0][0];
        }

        Some(Self { npd, m, inv })
    }

    pub fn parametric_dim(&self) -> usize {
        self.npd
    }

    /// Metric components m[a][b] = τ_a · τ_b.
    pub fn components(&self) -> &[[f64; 2]; 2] {
        &self.m
    }

    /// Inverse metric components.
    pub fn inverse(&self) -> &[[f64; 2]; 2] {
        &self.inv
    }

    /// Covariant norm ‖t‖ = sqrt(Σ t_a m_ab t_b).
    pub fn norm(&self, t: [f64; 2]) -> f64 {
        let mut sq = 0.0;
        for a in 0..self.npd {
            for b in 0..self.npd {
                sq += t[a] * self.m[a][b] * t[b];
            }
        }
        sq.max(0.0).sqrt()
    }
}

/// Outcome of one constitutive update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TractionUpdate {
    /// Committed normal traction (≤ 0, or exactly 0 on release).
    pub t_n: f64,
    /// Committed tangential traction components.
    pub t_t: [f64; 2],
    /// Stick (true) or slip (false). Meaningless on release.
    pub stick: bool,
    /// False when the penalty spring went tensile and the point released.
    pub active: bool,
}

/// Evaluate the penalty normal law and the Coulomb return map for one
/// Gauss-point record, given the covariant metric of its master patch.
///
/// Does not mutate the record; the assembler commits the result.
pub fn update_traction(
    rec: &GaussPoint,
    metric: &CovariantMetric,
    eps_n: f64,
    eps_t: f64,
    mu: f64,
) -> TractionUpdate {
    // Normal: incremental penalty with unilateral release.
    let t_n = rec.t_n - eps_n * rec.gap;
    if t_n > 0.0 {
        return TractionUpdate {
            t_n: 0.0,
            t_t: [0.0; 2],
            stick: false,
            active: false,
        };
    }

    // Friction trial: penalize the parametric slip increment.
    let npd = metric.parametric_dim();
    let mut t_t = [0.0; 2];
    for a in 0..npd {
        t_t[a] = rec.t_t[a] - eps_t * (rec.xi[a] - rec.xi_prev[a]);
    }

    let norm = metric.norm(t_t);

    // Slip function: μ·t_n ≤ 0, so stick while the trial stays inside
    // the friction cone.
    if norm + mu * t_n <= STICK_TOL {
        return TractionUpdate {
            t_n,
            t_t,
            stick: true,
            active: true,
        };
    }

    // Return map to the cone boundary along the trial direction.
    let mut mapped = [0.0; 2];
    if norm > DIRECTION_TOL {
        for a in 0..npd {
            mapped[a] = -mu * t_n * t_t[a] / norm;
        }
    }
    TractionUpdate {
        t_n,
        t_t: mapped,
        stick: false,
        active: true,
    }
}
