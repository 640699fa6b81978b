//! Error types and per-pair diagnostics for contact operations.

use thiserror::Error;

use crate::mesh::SegmentRef;

/// Result type alias using the crate Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures. Anything recoverable per contact pair is a [`Diagnostic`]
/// instead and never aborts a whole search or assembly call.
#[derive(Error, Debug)]
pub enum Error {
    /// Mesh or connectivity errors.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Assembly input errors (size mismatches, bad options).
    #[error("assembly error: {0}")]
    Assembly(String),

    /// The caller-supplied triplet buffer capacity was exceeded.
    #[error("triplet buffer full: needed {needed}, capacity {capacity}")]
    TripletCapacity { needed: usize, capacity: usize },
}

/// Non-fatal, per-point/per-pair conditions collected during a search or
/// assembly call and returned next to the (possibly partial) results.
///
/// `point` is the index of the Gauss-point record in the table; it is
/// `None` when the condition was detected on segment geometry before any
/// point was paired with it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The local projection iteration hit its cap without converging.
    #[error("local projection did not converge after {iterations} iterations (point {point}, master {master})")]
    NonConvergence {
        point: usize,
        master: SegmentRef,
        iterations: usize,
    },

    /// The projection converged outside the valid parametric domain.
    #[error("projection converged outside the parametric domain at {xi:?} (point {point}, master {master})")]
    OutOfDomain {
        point: usize,
        master: SegmentRef,
        xi: [f64; 2],
    },

    /// Zero-length tangent or normal: the candidate pair was skipped.
    #[error("degenerate segment geometry on master {master} (point {point:?})")]
    DegenerateGeometry {
        point: Option<usize>,
        master: SegmentRef,
    },
}
