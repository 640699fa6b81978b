//! Sparse output containers for contact assembly.
//!
//! Stiffness contributions are collected as (row, col, value) triplets in
//! COO form and can be converted to CSR for the host solver; duplicate
//! entries are summed during conversion. The residual is a dense vector
//! with scatter-add accumulation.

use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;

use crate::error::{Error, Result};

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Triplet (COO) buffer for tangent-stiffness contributions.
///
/// With `capacity = None` the buffer grows as needed. With
/// `capacity = Some(n)`, pushing past `n` entries is a hard
/// [`Error::TripletCapacity`]; output is never silently truncated.
#[derive(Debug, Clone)]
pub struct ContactTriplets {
    n_dofs: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    capacity: Option<usize>,
}

impl ContactTriplets {
    /// Create a buffer for a square system of `n_dofs` equations.
    pub fn new(n_dofs: usize, capacity: Option<usize>) -> Self {
        let reserve = capacity.unwrap_or(0);
        Self {
            n_dofs,
            rows: Vec::with_capacity(reserve),
            cols: Vec::with_capacity(reserve),
            values: Vec::with_capacity(reserve),
            capacity,
        }
    }

    /// Append one entry. Duplicates are summed during CSR conversion.
    pub fn push(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        debug_assert!(row < self.n_dofs, "row index out of bounds");
        debug_assert!(col < self.n_dofs, "column index out of bounds");

        if let Some(cap) = self.capacity {
            if self.values.len() >= cap {
                return Err(Error::TripletCapacity {
                    needed: self.values.len() + 1,
                    capacity: cap,
                });
            }
        }
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
        Ok(())
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Convert to CSR, summing duplicate entries.
    pub fn to_csr(self) -> CsrMatrix {
        let coo = CooMatrix::try_from_triplets(
            self.n_dofs,
            self.n_dofs,
            self.rows,
            self.cols,
            self.values,
        )
        .expect("triplet indices validated on push");
        CsrMatrix::from(&coo)
    }
}

/// Dense residual vector with scatter-add accumulation.
#[derive(Debug, Clone)]
pub struct ResidualVector {
    values: Vec<f64>,
}

impl ResidualVector {
    /// Zero vector of `size` equations.
    pub fn zeros(size: usize) -> Self {
        Self {
            values: vec![0.0; size],
        }
    }

    /// Add a value at a global degree of freedom.
    pub fn add(&mut self, dof: usize, value: f64) {
        self.values[dof] += value;
    }

    /// Merge another partial residual of the same size.
    pub fn merge(&mut self, other: &ResidualVector) {
        debug_assert_eq!(self.values.len(), other.values.len());
        for (a, b) in self.values.iter_mut().zip(other.values.iter()) {
            *a += *b;
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triplets_to_csr_sums_duplicates() {
        let mut t = ContactTriplets::new(2, None);
        t.push(0, 0, 1.0).unwrap();
        t.push(0, 0, 2.0).unwrap();
        t.push(1, 0, 0.5).unwrap();
        let csr = t.to_csr();
        let dense = nalgebra::DMatrix::from(&csr);
        assert!((dense[(0, 0)] - 3.0).abs() < 1e-14);
        assert!((dense[(1, 0)] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn test_capacity_overflow_is_hard_error() {
        let mut t = ContactTriplets::new(4, Some(2));
        t.push(0, 0, 1.0).unwrap();
        t.push(1, 1, 1.0).unwrap();
        let err = t.push(2, 2, 1.0).unwrap_err();
        match err {
            Error::TripletCapacity { needed, capacity } => {
                assert_eq!(needed, 3);
                assert_eq!(capacity, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was silently dropped before the failure.
        assert_eq!(t.nnz(), 2);
    }

    #[test]
    fn test_unbounded_buffer_grows() {
        let mut t = ContactTriplets::new(8, None);
        for i in 0..100 {
            t.push(i % 8, (i + 1) % 8, 1.0).unwrap();
        }
        assert_eq!(t.nnz(), 100);
    }

    #[test]
    fn test_residual_merge() {
        let mut a = ResidualVector::zeros(3);
        a.add(0, 1.0);
        let mut b = ResidualVector::zeros(3);
        b.add(0, 2.0);
        b.add(2, -1.0);
        a.merge(&b);
        assert_eq!(a.as_slice(), &[3.0, 0.0, -1.0]);
    }
}
