//! Contact residual and tangent-stiffness assembly.
//!
//! Walks the persistent Gauss-point table segment by segment, invokes the
//! constitutive update per active point, integrates the virtual-work
//! terms with the segment quadrature rule, and accumulates the global
//! residual and the stiffness triplets.
//!
//! Segments are processed in parallel with Rayon. Each task owns exactly
//! its segment's table records and writes into private buffers; the
//! buffers are merged in segment order afterwards, so the output is
//! deterministic regardless of scheduling.

use std::f64::consts::PI;

use rayon::prelude::*;
use tracing::warn;

use crate::error::{Diagnostic, Error, Result};
use crate::law::{self, CovariantMetric};
use crate::mesh::ContactMesh;
use crate::shape::{self, gauss::QuadratureRule, ShapeEval};
use crate::sparse::{ContactTriplets, ResidualVector};
use crate::state::{GaussPoint, GaussPointTable};
use crate::types::{Point3, Vec3, MAX_SEGMENT_NODES};

/// Stiffness entries below this magnitude are not emitted.
const TRIPLET_DROP_TOL: f64 = 1e-50;

/// Zero-length threshold for tangents and normals.
const DEGENERACY_TOL: f64 = 1e-12;

/// Which virtual-work terms the assembly integrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactMode {
    /// Slave points project onto master patches; only slave-side residual
    /// rows and slave-rooted stiffness blocks are produced.
    OneSided,
    /// Both surfaces are integrated: the mirrored master-side residual
    /// and the master stiffness blocks are included.
    Symmetric,
}

/// Assembly configuration.
#[derive(Debug, Clone)]
pub struct ContactOptions {
    /// Normal penalty stiffness (typically ~100x Young's modulus).
    pub eps_n: f64,
    /// Tangential penalty stiffness.
    pub eps_t: f64,
    /// Coulomb friction coefficient.
    pub friction_mu: f64,
    /// Surface integration mode.
    pub mode: ContactMode,
    /// Whether to produce stiffness triplets at all.
    pub assemble_stiffness: bool,
    /// Scale the reference Jacobian by 2πx for axisymmetric problems.
    pub axisymmetric: bool,
    /// Triplet buffer policy: `None` grows, `Some(n)` fails hard past n.
    pub triplet_capacity: Option<usize>,
}

impl Default for ContactOptions {
    fn default() -> Self {
        Self {
            eps_n: 1.0e6,
            eps_t: 1.0e4,
            friction_mu: 0.0,
            mode: ContactMode::OneSided,
            assemble_stiffness: true,
            axisymmetric: false,
            triplet_capacity: None,
        }
    }
}

/// Assembled contact contributions.
#[derive(Debug)]
pub struct ContactOutput {
    /// Dense global residual, one entry per equation.
    pub residual: Vec<f64>,
    /// Tangent-stiffness contributions in triplet form.
    pub triplets: ContactTriplets,
    /// Recoverable per-point conditions encountered during assembly.
    pub diagnostics: Vec<Diagnostic>,
}

/// Private per-segment accumulation buffers, merged after the parallel
/// loop.
#[derive(Default)]
struct SegmentContribution {
    residual: Vec<(usize, f64)>,
    triplets: Vec<(usize, usize, f64)>,
    diagnostics: Vec<Diagnostic>,
}

/// Assemble the contact residual and, when requested, the tangent
/// stiffness for every active Gauss point in the table.
///
/// `displacements` is node-major (`node * nsd + dof`, `nsd` entries per
/// node) with `mesh.n_equations()` entries. `rule` must be the rule the
/// table was seeded with. As a side effect the traction and stick fields
/// of the table are overwritten with the committed constitutive state.
pub fn assemble_contact(
    table: &mut GaussPointTable,
    mesh: &ContactMesh,
    displacements: &[f64],
    rule: &QuadratureRule,
    options: &ContactOptions,
) -> Result<ContactOutput> {
    let neq = mesh.n_equations();
    if displacements.len() != neq {
        return Err(Error::Assembly(format!(
            "displacement vector has {} entries, mesh has {} equations",
            displacements.len(),
            neq
        )));
    }
    if !table.is_empty() && rule.len() != table.points_per_segment() {
        return Err(Error::Assembly(format!(
            "quadrature rule has {} points, table was seeded with {} per segment",
            rule.len(),
            table.points_per_segment()
        )));
    }

    // Slave-side shape evaluations are identical for every segment.
    let topology = mesh.topology();
    let slave_evals: Vec<ShapeEval> = rule
        .points()
        .iter()
        .map(|&[r, s]| shape::evaluate(topology, r, s))
        .collect();
    let ngp = rule.len();

    let contributions: Vec<Result<SegmentContribution>> = table
        .records_mut()
        .par_chunks_mut(ngp)
        .enumerate()
        .map(|(si, records)| {
            assemble_segment(
                si * ngp,
                records,
                mesh,
                displacements,
                &slave_evals,
                rule.weights(),
                options,
            )
        })
        .collect();

    let mut residual = ResidualVector::zeros(neq);
    let mut triplets = ContactTriplets::new(neq, options.triplet_capacity);
    let mut diagnostics = Vec::new();
    for contribution in contributions {
        let contribution = contribution?;
        for (dof, value) in contribution.residual {
            residual.add(dof, value);
        }
        for (row, col, value) in contribution.triplets {
            triplets.push(row, col, value)?;
        }
        diagnostics.extend(contribution.diagnostics);
    }

    Ok(ContactOutput {
        residual: residual.into_vec(),
        triplets,
        diagnostics,
    })
}

/// Assemble one slave segment's Gauss points into private buffers.
fn assemble_segment(
    base_index: usize,
    records: &mut [GaussPoint],
    mesh: &ContactMesh,
    displacements: &[f64],
    slave_evals: &[ShapeEval],
    weights: &[f64],
    options: &ContactOptions,
) -> Result<SegmentContribution> {
    let topology = mesh.topology();
    let nsn = topology.n_nodes();
    let nsd = topology.space_dim();
    let npd = topology.parametric_dim();

    let mut out = SegmentContribution::default();
    let slave_seg = records[0].slave;
    let slave_ids = mesh.segment_nodes(slave_seg)?;
    let (xs, us) = gather_nodes(mesh, displacements, &slave_ids, nsn, nsd);

    for (g, rec) in records.iter_mut().enumerate() {
        if !rec.active {
            continue;
        }
        let master_seg = match rec.master {
            Some(m) => m,
            None => continue,
        };
        let point = base_index + g;

        let master_ids = mesh.segment_nodes(master_seg)?;
        let (xm, um) = gather_nodes(mesh, displacements, &master_ids, nsn, nsd);

        let hs = &slave_evals[g];
        let hm = shape::evaluate(topology, rec.xi[0], rec.xi[1]);

        // Current slave point position and reference slave tangents.
        let mut xg = Point3::zeros();
        let mut ts_ref = [Vec3::zeros(); 2];
        for j in 0..nsn {
            xg += hs.h[j] * (xs[j] + us[j]);
            for a in 0..npd {
                ts_ref[a] += hs.dh[j][a] * xs[j];
            }
        }

        // Current master tangents at the stored projection.
        let mut tm = [Vec3::zeros(); 2];
        for j in 0..nsn {
            for a in 0..npd {
                tm[a] += hm.dh[j][a] * (xm[j] + um[j]);
            }
        }

        let n_cur = patch_normal(&tm, nsd);
        let n_len = n_cur.norm();
        let n_ref = patch_normal(&ts_ref, nsd);
        let mut jac = n_ref.norm();
        if n_len < DEGENERACY_TOL || jac < DEGENERACY_TOL {
            emit(&mut out, Diagnostic::DegenerateGeometry {
                point: Some(point),
                master: master_seg,
            });
            continue;
        }
        if options.axisymmetric {
            jac *= 2.0 * PI * xg.x;
        }
        let normal = n_cur / n_len;

        let metric = match CovariantMetric::new(&tm, npd) {
            Some(m) => m,
            None => {
                emit(&mut out, Diagnostic::DegenerateGeometry {
                    point: Some(point),
                    master: master_seg,
                });
                continue;
            }
        };

        let update = law::update_traction(
            rec,
            &metric,
            options.eps_n,
            options.eps_t,
            options.friction_mu,
        );
        rec.t_n = update.t_n;
        rec.t_t = update.t_t;
        rec.stick = update.stick;
        if !update.active {
            rec.active = false;
            continue;
        }

        let t_n = update.t_n;
        let w = weights[g];
        let scale = w * jac;

        // Residual: the negative master normal acts as the slave normal.
        for j in 0..nsn {
            for k in 0..nsd {
                let value = -(t_n * hs.h[j] * (-normal[k])) * scale;
                out.residual.push((slave_ids[j] * nsd + k, value));
                if options.mode == ContactMode::Symmetric {
                    let mirrored = -(t_n * hm.h[j] * normal[k]) * scale;
                    out.residual.push((master_ids[j] * nsd + k, mirrored));
                }
            }
        }

        if options.assemble_stiffness {
            accumulate_stiffness(
                &mut out,
                nsn,
                nsd,
                npd,
                &slave_ids,
                &master_ids,
                hs,
                &hm,
                &tm,
                normal,
                &metric,
                t_n,
                update.stick,
                scale,
                options,
            );
        }
    }

    Ok(out)
}

/// Rank-one stiffness blocks for one Gauss point.
#[allow(clippy::too_many_arguments)]
fn accumulate_stiffness(
    out: &mut SegmentContribution,
    nsn: usize,
    nsd: usize,
    npd: usize,
    slave_ids: &[usize; MAX_SEGMENT_NODES],
    master_ids: &[usize; MAX_SEGMENT_NODES],
    hs: &ShapeEval,
    hm: &ShapeEval,
    tm: &[Vec3; 2],
    normal: Vec3,
    metric: &CovariantMetric,
    t_n: f64,
    stick: bool,
    scale: f64,
    options: &ContactOptions,
) {
    let ndof = nsn * nsd;
    let inv = metric.inverse();

    // Coupling vectors, one entry per local degree of freedom.
    let mut c_ns = [0.0; MAX_SEGMENT_NODES * 3];
    let mut c_nm = [0.0; MAX_SEGMENT_NODES * 3];
    let mut c_ts = [[0.0; MAX_SEGMENT_NODES * 3]; 2];
    let mut c_tm = [[0.0; MAX_SEGMENT_NODES * 3]; 2];
    let mut c_nd = [[0.0; MAX_SEGMENT_NODES * 3]; 2];
    for j in 0..nsn {
        for k in 0..nsd {
            let dof = j * nsd + k;
            c_ns[dof] = hs.h[j] * normal[k];
            c_nm[dof] = hm.h[j] * normal[k];
            for a in 0..npd {
                c_ts[a][dof] = hs.h[j] * tm[a][k];
                c_tm[a][dof] = hm.h[j] * tm[a][k];
                c_nd[a][dof] = hm.dh[j][a] * normal[k];
            }
        }
    }

    let dof_of = |ids: &[usize; MAX_SEGMENT_NODES], local: usize| {
        ids[local / nsd] * nsd + local % nsd
    };

    for k in 0..ndof {
        let row_s = dof_of(slave_ids, k);
        let row_m = dof_of(master_ids, k);
        for j in 0..ndof {
            let col_s = dof_of(slave_ids, j);
            let col_m = dof_of(master_ids, j);

            // Normal penalty, slave-slave and slave-master.
            push_entry(out, row_s, col_s, options.eps_n * c_ns[k] * c_ns[j] * scale);
            push_entry(out, row_s, col_m, -options.eps_n * c_ns[k] * c_nm[j] * scale);

            // Geometric cross term through the inverse metric.
            let mut geo = 0.0;
            for a in 0..npd {
                for b in 0..npd {
                    geo += inv[a][b] * c_ts[a][k] * c_nd[b][j];
                }
            }
            push_entry(out, row_s, col_m, t_n * geo * scale);

            if options.mode == ContactMode::Symmetric {
                push_entry(out, row_m, col_m, options.eps_n * c_nm[k] * c_nm[j] * scale);
                push_entry(out, row_m, col_s, -options.eps_n * c_nm[k] * c_ns[j] * scale);
            }

            if stick {
                let mut t_ss = 0.0;
                let mut t_sm = 0.0;
                for a in 0..npd {
                    for b in 0..npd {
                        t_ss += inv[a][b] * c_ts[a][k] * c_ts[b][j];
                        t_sm += inv[a][b] * c_ts[a][k] * c_tm[b][j];
                    }
                }
                push_entry(out, row_s, col_s, options.eps_t * t_ss * scale);
                push_entry(out, row_s, col_m, -options.eps_t * t_sm * scale);
            }
        }
    }
}

fn push_entry(out: &mut SegmentContribution, row: usize, col: usize, value: f64) {
    if value.abs() > TRIPLET_DROP_TOL {
        out.triplets.push((row, col, value));
    }
}

/// Gather node coordinates and displacement vectors for a segment.
fn gather_nodes(
    mesh: &ContactMesh,
    displacements: &[f64],
    ids: &[usize; MAX_SEGMENT_NODES],
    nsn: usize,
    nsd: usize,
) -> ([Point3; MAX_SEGMENT_NODES], [Vec3; MAX_SEGMENT_NODES]) {
    let mut xs = [Point3::zeros(); MAX_SEGMENT_NODES];
    let mut us = [Vec3::zeros(); MAX_SEGMENT_NODES];
    for j in 0..nsn {
        xs[j] = mesh.nodes()[ids[j]];
        for k in 0..nsd {
            us[j][k] = displacements[ids[j] * nsd + k];
        }
    }
    (xs, us)
}

/// 90°-rotated tangent in 2-D, tangent cross product in 3-D.
fn patch_normal(tangents: &[Vec3; 2], nsd: usize) -> Vec3 {
    if nsd == 2 {
        Vec3::new(tangents[0].y, -tangents[0].x, 0.0)
    } else {
        tangents[0].cross(&tangents[1])
    }
}

fn emit(out: &mut SegmentContribution, diagnostic: Diagnostic) {
    warn!(%diagnostic, "contact assembly diagnostic");
    out.diagnostics.push(diagnostic);
}
