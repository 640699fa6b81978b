//! Contact mesh view: nodes, connectivity, and segment resolution.
//!
//! The host solver owns the mesh; this type is a validated, read-only
//! snapshot of the pieces the contact engine needs. Segment nodes are
//! resolved through two levels of indirection: a segment lists local
//! positions within its element (ISN), and the element lists global node
//! ids (IEN). All indices are 0-based.

use std::fmt;

use crate::error::{Error, Result};
use crate::shape::SegmentTopology;
use crate::types::{Point3, MAX_SEGMENT_NODES};

/// Identifies one contact segment as (element, local segment) indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentRef {
    pub element: usize,
    pub segment: usize,
}

impl fmt::Display for SegmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {} segment {}", self.element, self.segment)
    }
}

/// Read-only mesh data for one contact interface.
#[derive(Debug, Clone)]
pub struct ContactMesh {
    topology: SegmentTopology,
    nodes: Vec<Point3>,
    /// Element connectivity: global node ids per element (IEN).
    elements: Vec<Vec<usize>>,
    /// Local segment map: element-local node positions per segment (ISN).
    segment_map: Vec<Vec<usize>>,
}

impl ContactMesh {
    /// Create a mesh view, validating connectivity up front so segment
    /// resolution in the hot loops cannot go out of bounds.
    pub fn new(
        topology: SegmentTopology,
        nodes: Vec<Point3>,
        elements: Vec<Vec<usize>>,
        segment_map: Vec<Vec<usize>>,
    ) -> Result<Self> {
        let nsn = topology.n_nodes();
        for (e, nodes_of_elem) in elements.iter().enumerate() {
            for &node in nodes_of_elem {
                if node >= nodes.len() {
                    return Err(Error::Mesh(format!(
                        "element {} references node {} but mesh has {} nodes",
                        e,
                        node,
                        nodes.len()
                    )));
                }
            }
        }
        for (s, positions) in segment_map.iter().enumerate() {
            if positions.len() != nsn {
                return Err(Error::Mesh(format!(
                    "segment map row {} has {} entries, topology {:?} needs {}",
                    s,
                    positions.len(),
                    topology,
                    nsn
                )));
            }
        }
        Ok(Self {
            topology,
            nodes,
            elements,
            segment_map,
        })
    }

    pub fn topology(&self) -> SegmentTopology {
        self.topology
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn nodes(&self) -> &[Point3] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> Option<&Point3> {
        self.nodes.get(idx)
    }

    /// Number of equations: nodes × spatial dimension.
    pub fn n_equations(&self) -> usize {
        self.nodes.len() * self.topology.space_dim()
    }

    /// Resolve a segment's global node ids, ISN through IEN.
    ///
    /// The returned array is zero-padded past the topology's node count.
    pub fn segment_nodes(&self, seg: SegmentRef) -> Result<[usize; MAX_SEGMENT_NODES]> {
        let element = self.elements.get(seg.element).ok_or_else(|| {
            Error::Mesh(format!("no element {} in mesh", seg.element))
        })?;
        let positions = self.segment_map.get(seg.segment).ok_or_else(|| {
            Error::Mesh(format!("no segment map row {} in mesh", seg.segment))
        })?;

        let mut out = [0usize; MAX_SEGMENT_NODES];
        for (j, &pos) in positions.iter().enumerate() {
            out[j] = *element.get(pos).ok_or_else(|| {
                Error::Mesh(format!(
                    "segment {} position {} exceeds element {} connectivity ({} nodes)",
                    seg.segment,
                    pos,
                    seg.element,
                    element.len()
                ))
            })?;
        }
        Ok(out)
    }

    /// Gather a segment's node coordinates.
    pub fn segment_coords(&self, seg: SegmentRef) -> Result<[Point3; MAX_SEGMENT_NODES]> {
        let ids = self.segment_nodes(seg)?;
        let mut out = [Point3::zeros(); MAX_SEGMENT_NODES];
        for j in 0..self.topology.n_nodes() {
            out[j] = self.nodes[ids[j]];
        }
        Ok(out)
    }
}
