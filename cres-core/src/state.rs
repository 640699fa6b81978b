//! Persistent per-Gauss-point contact state.
//!
//! One record exists per (slave segment, local integration index),
//! allocated once when the contact pair is seeded and overwritten in
//! place by every search and assembly call. The only fields that survive
//! a call untouched are the "previous step" values, and those are
//! advanced exclusively by the external time-stepping driver through
//! [`GaussPointTable::advance_step`] - never by the engine itself.

use crate::mesh::SegmentRef;
use crate::types::Point3;

/// Sentinel for "no candidate seen yet": any real signed gap beats it.
pub const GAP_SENTINEL: f64 = f64::NEG_INFINITY;

/// Persistent state of one slave-surface integration point.
///
/// `gap` is the signed normal distance to the matched master patch,
/// positive when penetrating. `xi` holds the master-patch parametric
/// coordinates of the projection; only the first `parametric_dim`
/// entries are meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussPoint {
    /// Physical coordinates, set at seeding from the slave segment.
    pub coords: Point3,
    /// Owning slave segment.
    pub slave: SegmentRef,
    /// Signed gap (positive = penetration), [`GAP_SENTINEL`] when unmatched.
    pub gap: f64,
    /// Master-patch parametric coordinates of the projection.
    pub xi: [f64; 2],
    /// Whether the point currently participates in contact.
    pub active: bool,
    /// Matched master segment, if any.
    pub master: Option<SegmentRef>,
    /// Friction state from the last constitutive update.
    pub stick: bool,
    /// Committed tangential traction components (covariant).
    pub t_t: [f64; 2],
    /// Parametric coordinates at the last accepted increment.
    pub xi_prev: [f64; 2],
    /// Committed normal traction (≤ 0 while active).
    pub t_n: f64,
}

impl GaussPoint {
    /// Fresh record for a just-seeded point.
    pub(crate) fn seeded(coords: Point3, slave: SegmentRef) -> Self {
        Self {
            coords,
            slave,
            gap: GAP_SENTINEL,
            xi: [0.0; 2],
            active: false,
            master: None,
            stick: false,
            t_t: [0.0; 2],
            xi_prev: [0.0; 2],
            t_n: 0.0,
        }
    }

    /// Drop any previous match before a new search pass.
    pub(crate) fn reset_match(&mut self) {
        self.gap = GAP_SENTINEL;
        self.active = false;
        self.master = None;
    }
}

/// The table of all persistent Gauss-point records for one contact pair.
///
/// Records are segment-major: segment `s` owns records
/// `s * points_per_segment .. (s + 1) * points_per_segment`, in the order
/// of the quadrature rule the table was seeded with.
#[derive(Debug, Clone)]
pub struct GaussPointTable {
    points: Vec<GaussPoint>,
    points_per_segment: usize,
}

impl GaussPointTable {
    pub(crate) fn new(points: Vec<GaussPoint>, points_per_segment: usize) -> Self {
        debug_assert!(points_per_segment > 0);
        debug_assert_eq!(points.len() % points_per_segment, 0);
        Self {
            points,
            points_per_segment,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Integration points per segment (the seeding rule's length).
    pub fn points_per_segment(&self) -> usize {
        self.points_per_segment
    }

    pub fn n_segments(&self) -> usize {
        self.points.len() / self.points_per_segment
    }

    pub fn records(&self) -> &[GaussPoint] {
        &self.points
    }

    /// Mutable access for drivers that snapshot/restore state around
    /// trial iterates.
    pub fn records_mut(&mut self) -> &mut [GaussPoint] {
        &mut self.points
    }

    /// The records owned by one slave segment.
    pub fn segment_records(&self, segment_idx: usize) -> &[GaussPoint] {
        let start = segment_idx * self.points_per_segment;
        &self.points[start..start + self.points_per_segment]
    }

    /// Advance "previous step" fields after an accepted increment.
    ///
    /// Called by the external driver between increments; the engine never
    /// calls this itself.
    pub fn advance_step(&mut self) {
        for p in &mut self.points {
            p.xi_prev = p.xi;
        }
    }
}
