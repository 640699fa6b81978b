//! Python bindings for the CRES contact engine.
//!
//! The bindings follow a minimal wrapper pattern - all logic stays in
//! cres-core. This boundary speaks the host solver's flat numeric-array
//! convention: element/segment ids and connectivity are 1-based here and
//! converted to the core's 0-based indexing on entry; stiffness triplet
//! row/column indices are returned 1-based again.

use numpy::{PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use cres_core::assembly::{assemble_contact, ContactMode, ContactOptions};
use cres_core::grid::{seed_table, BoundingBox, BucketGrid};
use cres_core::mesh::{ContactMesh, SegmentRef};
use cres_core::search::search_contacts as search_contacts_core;
use cres_core::shape::{self, gauss::QuadratureRule, SegmentTopology};
use cres_core::state::GaussPointTable;
use cres_core::types::Point3;

fn parse_topology(name: &str) -> PyResult<SegmentTopology> {
    match name {
        "line2" => Ok(SegmentTopology::Line2),
        "quad4" => Ok(SegmentTopology::Quad4),
        "tri6" => Ok(SegmentTopology::Tri6),
        "quad8" => Ok(SegmentTopology::Quad8),
        _ => Err(PyValueError::new_err(format!(
            "Unknown segment topology: {}. Valid: line2, quad4, tri6, quad8",
            name
        ))),
    }
}

fn core_err(e: cres_core::Error) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

/// Convert a 1-based id array to a 0-based index vector.
fn to_zero_based(ids: &PyReadonlyArray1<i64>, what: &str) -> PyResult<Vec<usize>> {
    ids.as_array()
        .iter()
        .map(|&v| {
            if v < 1 {
                Err(PyValueError::new_err(format!(
                    "{} ids are 1-based, got {}",
                    what, v
                )))
            } else {
                Ok((v - 1) as usize)
            }
        })
        .collect()
}

/// Pair 1-based element/segment id arrays into segment references.
fn surface_from_ids(
    elements: &PyReadonlyArray1<i64>,
    segments: &PyReadonlyArray1<i64>,
) -> PyResult<Vec<SegmentRef>> {
    let elements = to_zero_based(elements, "element")?;
    let segments = to_zero_based(segments, "segment")?;
    if elements.len() != segments.len() {
        return Err(PyValueError::new_err(
            "element and segment id arrays must have equal length",
        ));
    }
    Ok(elements
        .into_iter()
        .zip(segments)
        .map(|(element, segment)| SegmentRef { element, segment })
        .collect())
}

/// Contact interface mesh for Python.
#[pyclass(name = "ContactMesh")]
pub struct PyContactMesh {
    inner: ContactMesh,
}

#[pymethods]
impl PyContactMesh {
    /// Create a mesh from numpy arrays.
    ///
    /// Args:
    ///     topology: Segment topology ("line2", "quad4", "tri6", "quad8")
    ///     nodes: Nx3 (or Nx2 for line2) array of node coordinates
    ///     elements: MxK array of element connectivity, 1-based node ids
    ///     segment_map: SxNSN array mapping each local segment to 1-based
    ///         node positions within an element
    #[new]
    fn new(
        topology: &str,
        nodes: PyReadonlyArray2<f64>,
        elements: PyReadonlyArray2<i64>,
        segment_map: PyReadonlyArray2<i64>,
    ) -> PyResult<Self> {
        let topology = parse_topology(topology)?;

        let shape = nodes.shape();
        if shape.len() != 2 || (shape[1] != 2 && shape[1] != 3) {
            return Err(PyValueError::new_err("nodes must be an Nx2 or Nx3 array"));
        }
        let nodes_array = nodes.as_array();
        let node_points: Vec<Point3> = (0..shape[0])
            .map(|i| {
                Point3::new(
                    nodes_array[[i, 0]],
                    nodes_array[[i, 1]],
                    if shape[1] == 3 { nodes_array[[i, 2]] } else { 0.0 },
                )
            })
            .collect();

        let elem_array = elements.as_array();
        let mut elem_vec = Vec::with_capacity(elem_array.nrows());
        for row in elem_array.rows() {
            let mut conn = Vec::with_capacity(row.len());
            for &v in row {
                if v < 1 {
                    return Err(PyValueError::new_err(format!(
                        "element connectivity is 1-based, got {}",
                        v
                    )));
                }
                conn.push((v - 1) as usize);
            }
            elem_vec.push(conn);
        }

        let map_array = segment_map.as_array();
        let mut map_vec = Vec::with_capacity(map_array.nrows());
        for row in map_array.rows() {
            let mut positions = Vec::with_capacity(row.len());
            for &v in row {
                if v < 1 {
                    return Err(PyValueError::new_err(format!(
                        "segment map positions are 1-based, got {}",
                        v
                    )));
                }
                positions.push((v - 1) as usize);
            }
            map_vec.push(positions);
        }

        let inner =
            ContactMesh::new(topology, node_points, elem_vec, map_vec).map_err(core_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn n_nodes(&self) -> usize {
        self.inner.n_nodes()
    }

    #[getter]
    fn n_elements(&self) -> usize {
        self.inner.n_elements()
    }

    #[getter]
    fn n_equations(&self) -> usize {
        self.inner.n_equations()
    }

    fn __repr__(&self) -> String {
        format!(
            "ContactMesh({:?}, {} nodes, {} elements)",
            self.inner.topology(),
            self.inner.n_nodes(),
            self.inner.n_elements()
        )
    }
}

/// Persistent Gauss-point table handle.
///
/// Owns the table together with the quadrature rule it was seeded with
/// and the longest-edge padding radius, so search and assembly calls
/// cannot drift apart.
#[pyclass(name = "GaussPointTable")]
pub struct PyGaussPointTable {
    inner: GaussPointTable,
    rule: QuadratureRule,
    longest_edge: f64,
}

#[pymethods]
impl PyGaussPointTable {
    fn __len__(&self) -> usize {
        self.inner.len()
    }

    #[getter]
    fn points_per_segment(&self) -> usize {
        self.inner.points_per_segment()
    }

    #[getter]
    fn longest_edge(&self) -> f64 {
        self.longest_edge
    }

    /// Advance "previous step" fields after an accepted increment.
    fn advance_step(&mut self) {
        self.inner.advance_step();
    }

    /// Signed gaps, one per point (positive = penetration).
    fn gaps<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        PyArray1::from_iter_bound(py, self.inner.records().iter().map(|p| p.gap))
    }

    /// Active flags, one per point.
    fn active<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<bool>> {
        PyArray1::from_iter_bound(py, self.inner.records().iter().map(|p| p.active))
    }

    /// Committed normal tractions, one per point.
    fn normal_tractions<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        PyArray1::from_iter_bound(py, self.inner.records().iter().map(|p| p.t_n))
    }

    /// Matched master element ids, 1-based; 0 = unmatched.
    fn master_elements<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<i64>> {
        PyArray1::from_iter_bound(
            py,
            self.inner
                .records()
                .iter()
                .map(|p| p.master.map_or(0, |m| m.element as i64 + 1)),
        )
    }
}

/// Evaluate segment shape functions and parametric derivatives.
///
/// Returns (H, dH) with H of length nsn and dH of shape (nsn, npd).
#[pyfunction]
#[pyo3(signature = (topology, r, s=0.0))]
fn evaluate_shape_functions<'py>(
    py: Python<'py>,
    topology: &str,
    r: f64,
    s: f64,
) -> PyResult<(Bound<'py, PyArray1<f64>>, Bound<'py, PyArray2<f64>>)> {
    let topology = parse_topology(topology)?;
    let eval = shape::evaluate(topology, r, s);
    let nsn = topology.n_nodes();
    let npd = topology.parametric_dim();

    let h = PyArray1::from_iter_bound(py, eval.h[..nsn].iter().copied());
    let dh: Vec<Vec<f64>> = (0..nsn).map(|j| eval.dh[j][..npd].to_vec()).collect();
    let dh = PyArray2::from_vec2_bound(py, &dh)
        .map_err(|e| PyRuntimeError::new_err(format!("failed to create array: {}", e)))?;
    Ok((h, dh))
}

/// Seed the Gauss-point table for a slave surface.
///
/// `elements`/`segments` are parallel 1-based id arrays naming the slave
/// segments. Returns a table handle carrying the longest-edge padding
/// radius and the default quadrature rule for the topology.
#[pyfunction]
fn seed_gauss_points(
    mesh: &PyContactMesh,
    elements: PyReadonlyArray1<i64>,
    segments: PyReadonlyArray1<i64>,
) -> PyResult<PyGaussPointTable> {
    let surface = surface_from_ids(&elements, &segments)?;
    let rule = QuadratureRule::for_topology(mesh.inner.topology());
    let (table, longest_edge) =
        seed_table(&mesh.inner, &surface, &rule).map_err(core_err)?;
    Ok(PyGaussPointTable {
        inner: table,
        rule,
        longest_edge,
    })
}

/// Bounding box over a surface's segment nodes: (min, max) corners.
#[pyfunction]
fn compute_bounding_box<'py>(
    py: Python<'py>,
    mesh: &PyContactMesh,
    elements: PyReadonlyArray1<i64>,
    segments: PyReadonlyArray1<i64>,
) -> PyResult<(Bound<'py, PyArray1<f64>>, Bound<'py, PyArray1<f64>>)> {
    let surface = surface_from_ids(&elements, &segments)?;
    let bbox = BoundingBox::from_surface(&mesh.inner, &surface).map_err(core_err)?;
    Ok((
        PyArray1::from_iter_bound(py, bbox.min.iter().copied()),
        PyArray1::from_iter_bound(py, bbox.max.iter().copied()),
    ))
}

/// Run the contact search against a master surface, updating the table
/// in place. Returns diagnostic messages (empty when the pass was clean).
#[pyfunction]
fn search_contacts(
    mut table: PyRefMut<'_, PyGaussPointTable>,
    mesh: &PyContactMesh,
    master_elements: PyReadonlyArray1<i64>,
    master_segments: PyReadonlyArray1<i64>,
) -> PyResult<Vec<String>> {
    let masters = surface_from_ids(&master_elements, &master_segments)?;
    let bbox = BoundingBox::from_surface(&mesh.inner, &masters).map_err(core_err)?;
    let longest_edge = table.longest_edge;
    let mut grid = BucketGrid::new(bbox, longest_edge.max(f64::MIN_POSITIVE));
    grid.assign(&table.inner);

    let report =
        search_contacts_core(&mut table.inner, &grid, &mesh.inner, &masters, longest_edge)
            .map_err(core_err)?;
    Ok(report
        .diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect())
}

/// Assemble the contact residual and tangent stiffness.
///
/// Returns (residual, rows, cols, vals, diagnostics); rows/cols are
/// 1-based. Traction and stick fields of the table are updated in place.
#[pyfunction]
#[pyo3(signature = (
    table,
    mesh,
    displacements,
    eps_n,
    eps_t=0.0,
    friction_mu=0.0,
    symmetric=false,
    assemble_stiffness=true,
    axisymmetric=false,
    triplet_capacity=None,
))]
#[allow(clippy::too_many_arguments)]
fn assemble_contact_forces<'py>(
    py: Python<'py>,
    mut table: PyRefMut<'_, PyGaussPointTable>,
    mesh: &PyContactMesh,
    displacements: PyReadonlyArray1<f64>,
    eps_n: f64,
    eps_t: f64,
    friction_mu: f64,
    symmetric: bool,
    assemble_stiffness: bool,
    axisymmetric: bool,
    triplet_capacity: Option<usize>,
) -> PyResult<(
    Bound<'py, PyArray1<f64>>,
    Bound<'py, PyArray1<i64>>,
    Bound<'py, PyArray1<i64>>,
    Bound<'py, PyArray1<f64>>,
    Vec<String>,
)> {
    let u: Vec<f64> = displacements.as_array().iter().copied().collect();
    let options = ContactOptions {
        eps_n,
        eps_t,
        friction_mu,
        mode: if symmetric {
            ContactMode::Symmetric
        } else {
            ContactMode::OneSided
        },
        assemble_stiffness,
        axisymmetric,
        triplet_capacity,
    };

    let table = &mut *table;
    let output = assemble_contact(&mut table.inner, &mesh.inner, &u, &table.rule, &options)
        .map_err(core_err)?;

    let residual = PyArray1::from_vec_bound(py, output.residual);
    let rows = PyArray1::from_iter_bound(
        py,
        output.triplets.rows().iter().map(|&r| r as i64 + 1),
    );
    let cols = PyArray1::from_iter_bound(
        py,
        output.triplets.cols().iter().map(|&c| c as i64 + 1),
    );
    let vals = PyArray1::from_vec_bound(py, output.triplets.values().to_vec());
    let diagnostics = output.diagnostics.iter().map(|d| d.to_string()).collect();
    Ok((residual, rows, cols, vals, diagnostics))
}

/// Get library version.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Python module definition.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyContactMesh>()?;
    m.add_class::<PyGaussPointTable>()?;
    m.add_function(wrap_pyfunction!(evaluate_shape_functions, m)?)?;
    m.add_function(wrap_pyfunction!(seed_gauss_points, m)?)?;
    m.add_function(wrap_pyfunction!(compute_bounding_box, m)?)?;
    m.add_function(wrap_pyfunction!(search_contacts, m)?)?;
    m.add_function(wrap_pyfunction!(assemble_contact_forces, m)?)?;
    m.add_function(wrap_pyfunction!(version, m)?)?;
    Ok(())
}
