//! Broad-phase spatial index: bounding box, Gauss-point seeding, and the
//! uniform bucket grid.
//!
//! The grid partitions slave Gauss points into Nx×Ny×Nz buckets over the
//! bounding box of the candidate surfaces. Master segments later query a
//! padded cell range; the padding (half the longest inter-node edge)
//! compensates for a point's own bucket not necessarily overlapping a
//! nearby segment's range. Bucket membership is stored as an arena - a
//! flat index array with per-bucket offsets - rather than raw
//! head/next chains, so iteration is bounds-checked by construction.

use crate::error::Result;
use crate::mesh::{ContactMesh, SegmentRef};
use crate::shape::{self, gauss::QuadratureRule};
use crate::state::{GaussPoint, GaussPointTable};
use crate::types::Point3;

/// Upper bound on buckets per axis; keeps degenerate cell sizes from
/// exploding the bucket count.
const MAX_BUCKETS_PER_AXIS: usize = 64;

/// Axis-aligned bounding box over segment geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    /// Min/max corner over all segment-node coordinates of a surface.
    pub fn from_surface(mesh: &ContactMesh, segments: &[SegmentRef]) -> Result<Self> {
        let mut min = Point3::from_element(f64::MAX);
        let mut max = Point3::from_element(-f64::MAX);
        let nsn = mesh.topology().n_nodes();
        for &seg in segments {
            let coords = mesh.segment_coords(seg)?;
            for x in &coords[..nsn] {
                for k in 0..3 {
                    min[k] = min[k].min(x[k]);
                    max[k] = max[k].max(x[k]);
                }
            }
        }
        Ok(Self { min, max })
    }

    /// Grow the box by `pad` on every side.
    pub fn padded(&self, pad: f64) -> Self {
        Self {
            min: self.min - Point3::from_element(pad),
            max: self.max + Point3::from_element(pad),
        }
    }
}

/// Seed the persistent Gauss-point table for a slave surface and return
/// it with the longest inter-node distance over all its segments.
///
/// Each record's physical coordinates come from the segment's node
/// coordinates interpolated at the rule's points; everything else starts
/// unmatched (sentinel gap, inactive, zero tractions). The same `rule`
/// must later be passed to assembly.
pub fn seed_table(
    mesh: &ContactMesh,
    segments: &[SegmentRef],
    rule: &QuadratureRule,
) -> Result<(GaussPointTable, f64)> {
    let topology = mesh.topology();
    let nsn = topology.n_nodes();
    let mut points = Vec::with_capacity(segments.len() * rule.len());
    let mut longest_edge: f64 = 0.0;

    for &seg in segments {
        let coords = mesh.segment_coords(seg)?;

        for &[r, s] in rule.points() {
            let eval = shape::evaluate(topology, r, s);
            let mut xg = Point3::zeros();
            for j in 0..nsn {
                xg += eval.h[j] * coords[j];
            }
            points.push(GaussPoint::seeded(xg, seg));
        }

        // Longest distance over all node pairs, not only ring edges.
        for i in 0..nsn {
            for j in (i + 1)..nsn {
                longest_edge = longest_edge.max((coords[i] - coords[j]).norm());
            }
        }
    }

    Ok((GaussPointTable::new(points, rule.len()), longest_edge))
}

/// Uniform bucket grid over a bounding box, with arena membership lists.
#[derive(Debug, Clone)]
pub struct BucketGrid {
    bbox: BoundingBox,
    dims: [usize; 3],
    /// Per-bucket start offsets into `entries`; length = n_buckets + 1.
    offsets: Vec<usize>,
    /// Gauss-point indices, grouped by bucket.
    entries: Vec<usize>,
}

impl BucketGrid {
    /// Create a grid whose cell edge is roughly `cell_size` (typically
    /// the longest segment edge). Axes with zero extent collapse to one
    /// bucket.
    pub fn new(bbox: BoundingBox, cell_size: f64) -> Self {
        let mut dims = [1usize; 3];
        for k in 0..3 {
            let extent = bbox.max[k] - bbox.min[k];
            if extent > 0.0 && cell_size > 0.0 {
                dims[k] = ((extent / cell_size).ceil() as usize)
                    .clamp(1, MAX_BUCKETS_PER_AXIS);
            }
        }
        Self::with_dims(bbox, dims)
    }

    /// Create a grid with explicit bucket counts per axis.
    pub fn with_dims(bbox: BoundingBox, dims: [usize; 3]) -> Self {
        let dims = [dims[0].max(1), dims[1].max(1), dims[2].max(1)];
        let n_buckets = dims[0] * dims[1] * dims[2];
        Self {
            bbox,
            dims,
            offsets: vec![0; n_buckets + 1],
            entries: Vec::new(),
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn n_buckets(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Rebuild bucket membership from the table's point coordinates.
    /// Call whenever segment geometry has changed materially.
    pub fn assign(&mut self, table: &GaussPointTable) {
        let n_buckets = self.n_buckets();
        let mut counts = vec![0usize; n_buckets];
        let flat: Vec<usize> = table
            .records()
            .iter()
            .map(|p| self.flat_index(self.cell_of(p.coords)))
            .collect();
        for &b in &flat {
            counts[b] += 1;
        }

        self.offsets = vec![0; n_buckets + 1];
        for b in 0..n_buckets {
            self.offsets[b + 1] = self.offsets[b] + counts[b];
        }

        self.entries = vec![0; table.len()];
        let mut cursor = self.offsets.clone();
        for (idx, &b) in flat.iter().enumerate() {
            self.entries[cursor[b]] = idx;
            cursor[b] += 1;
        }
    }

    /// Point indices in one bucket.
    pub fn bucket(&self, cell: [usize; 3]) -> &[usize] {
        let b = self.flat_index(cell);
        &self.entries[self.offsets[b]..self.offsets[b + 1]]
    }

    /// Clamped cell coordinates of a point.
    pub fn cell_of(&self, p: Point3) -> [usize; 3] {
        let mut cell = [0usize; 3];
        for k in 0..3 {
            cell[k] = self.axis_cell(k, p[k]);
        }
        cell
    }

    /// Clamped cell range covered by an axis-aligned box.
    pub fn cell_range(&self, lo: Point3, hi: Point3) -> ([usize; 3], [usize; 3]) {
        let mut min_cell = [0usize; 3];
        let mut max_cell = [0usize; 3];
        for k in 0..3 {
            min_cell[k] = self.axis_cell(k, lo[k]);
            max_cell[k] = self.axis_cell(k, hi[k]);
        }
        (min_cell, max_cell)
    }

    fn axis_cell(&self, axis: usize, x: f64) -> usize {
        let extent = self.bbox.max[axis] - self.bbox.min[axis];
        if extent <= 0.0 {
            return 0;
        }
        let t = (x - self.bbox.min[axis]) / extent;
        let i = (self.dims[axis] as f64 * t).floor() as isize;
        i.clamp(0, self.dims[axis] as isize - 1) as usize
    }

    fn flat_index(&self, cell: [usize; 3]) -> usize {
        cell[2] * self.dims[0] * self.dims[1] + cell[1] * self.dims[0] + cell[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::SegmentTopology;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn unit_quad_mesh() -> ContactMesh {
        ContactMesh::new(
            SegmentTopology::Quad4,
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
            vec![vec![0, 1, 2, 3]],
        )
        .unwrap()
    }

    fn whole_surface() -> Vec<SegmentRef> {
        vec![SegmentRef {
            element: 0,
            segment: 0,
        }]
    }

    #[test]
    fn test_bounding_box_over_surface() {
        let mesh = unit_quad_mesh();
        let bbox = BoundingBox::from_surface(&mesh, &whole_surface()).unwrap();
        assert_eq!(bbox.min, Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(bbox.max, Vector3::new(1.0, 1.0, 0.0));
        let padded = bbox.padded(0.5);
        assert_eq!(padded.min, Vector3::new(-0.5, -0.5, -0.5));
    }

    #[test]
    fn test_seeding_counts_and_state() {
        let mesh = unit_quad_mesh();
        let rule = QuadratureRule::for_topology(SegmentTopology::Quad4);
        let (table, longest) = seed_table(&mesh, &whole_surface(), &rule).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.points_per_segment(), 4);
        // Longest node pair on a unit quad is the diagonal.
        assert_relative_eq!(longest, 2.0_f64.sqrt(), epsilon = 1e-14);
        for p in table.records() {
            assert!(!p.active);
            assert_eq!(p.gap, crate::state::GAP_SENTINEL);
            // Points interpolate strictly inside the patch.
            assert!(p.coords.x > 0.0 && p.coords.x < 1.0);
            assert!(p.coords.y > 0.0 && p.coords.y < 1.0);
            assert_eq!(p.coords.z, 0.0);
        }
    }

    #[test]
    fn test_grid_assignment_partitions_all_points() {
        let mesh = unit_quad_mesh();
        let rule = QuadratureRule::for_topology(SegmentTopology::Quad4);
        let (table, _) = seed_table(&mesh, &whole_surface(), &rule).unwrap();
        let bbox = BoundingBox::from_surface(&mesh, &whole_surface()).unwrap();
        let mut grid = BucketGrid::with_dims(bbox, [2, 2, 1]);
        grid.assign(&table);

        let mut seen = 0;
        for i in 0..2 {
            for j in 0..2 {
                seen += grid.bucket([i, j, 0]).len();
            }
        }
        assert_eq!(seen, table.len());
        // 2x2 Gauss points on a 2x2 grid land one per bucket.
        assert_eq!(grid.bucket([0, 0, 0]).len(), 1);
    }

    #[test]
    fn test_cell_range_is_clamped() {
        let bbox = BoundingBox {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(1.0, 1.0, 1.0),
        };
        let grid = BucketGrid::with_dims(bbox, [4, 4, 4]);
        let (lo, hi) = grid.cell_range(
            Point3::new(-10.0, 0.4, 0.9),
            Point3::new(10.0, 0.6, 2.0),
        );
        assert_eq!(lo, [0, 1, 3]);
        assert_eq!(hi, [3, 2, 3]);
    }

    #[test]
    fn test_zero_extent_axis_collapses() {
        let mesh = unit_quad_mesh();
        let bbox = BoundingBox::from_surface(&mesh, &whole_surface()).unwrap();
        let grid = BucketGrid::new(bbox, 0.5);
        // z extent is zero: one bucket along z.
        assert_eq!(grid.dims()[2], 1);
        assert!(grid.dims()[0] >= 2);
    }
}
