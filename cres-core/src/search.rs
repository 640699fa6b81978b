//! Contact search: broad-phase candidate retrieval, inside/outside
//! classification, and local projection refinement.
//!
//! For every (slave Gauss point, master segment) pair the grid proposes,
//! the point is first classified against the master patch - an edge
//! projection in 2-D, a sub-triangle sign test in 3-D - and, when inside,
//! the closest-point projection is refined by a Newton/least-squares
//! iteration on the patch's parametric coordinates. The deepest
//! qualifying candidate wins and is committed into the persistent
//! Gauss-point record.
//!
//! Sign convention (one convention for both space dimensions): the signed
//! gap is `-(xg - xp)·n̂`, positive when the point has penetrated behind
//! the outward master normal. Edge-exact probes classify as inside.

use tracing::{debug, warn};

use crate::error::{Diagnostic, Result};
use crate::grid::BucketGrid;
use crate::mesh::{ContactMesh, SegmentRef};
use crate::shape::{self, SegmentTopology};
use crate::state::GaussPointTable;
use crate::types::{Point3, Vec3, MAX_SEGMENT_NODES};

/// Effective range of the contact search: candidates whose signed gap
/// exceeds this physical distance are discarded as spurious far matches.
pub const CONTACT_RANGE: f64 = 20.0;

/// Convergence tolerance on the parametric increment norm.
pub const PROJECTION_TOL: f64 = 1e-5;

/// Hard cap on local projection iterations.
pub const MAX_PROJECTION_ITERS: usize = 1000;

/// Below this, tangent/normal lengths count as degenerate geometry.
const DEGENERACY_TOL: f64 = 1e-12;

/// Slack allowed on the parametric domain check after convergence.
const DOMAIN_TOL: f64 = 1e-8;

/// Summary of one search pass.
#[derive(Debug, Default)]
pub struct SearchReport {
    /// Narrow-phase pairs examined.
    pub pairs_tested: usize,
    /// Candidates committed into the table.
    pub commits: usize,
    /// Recoverable per-pair conditions encountered.
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of one closest-point projection onto a master patch.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    /// Converged (or last-iterate) parametric coordinates.
    pub xi: [f64; 2],
    /// Signed gap at the projection.
    pub gap: f64,
    /// Iterations spent.
    pub iterations: usize,
    /// Whether the increment norm fell below [`PROJECTION_TOL`].
    pub converged: bool,
}

/// Update the persistent Gauss-point table against a set of master
/// segments. Mutates the table in place; any previous match is dropped
/// before the pass, so a point that matches no candidate ends inactive.
pub fn search_contacts(
    table: &mut GaussPointTable,
    grid: &BucketGrid,
    mesh: &ContactMesh,
    masters: &[SegmentRef],
    longest_edge: f64,
) -> Result<SearchReport> {
    for p in table.records_mut() {
        p.reset_match();
    }

    let mut report = SearchReport::default();
    let pad = 0.5 * longest_edge;
    let topology = mesh.topology();

    for &seg in masters {
        let coords = mesh.segment_coords(seg)?;
        if topology == SegmentTopology::Line2 {
            search_against_edge(table, grid, topology, seg, &coords, pad, &mut report);
        } else {
            search_against_patch(table, grid, topology, seg, &coords, pad, &mut report);
        }
    }

    debug!(
        pairs = report.pairs_tested,
        commits = report.commits,
        diagnostics = report.diagnostics.len(),
        "contact search pass finished"
    );
    Ok(report)
}

/// 2-D narrow phase: classify against the segment's single edge.
fn search_against_edge(
    table: &mut GaussPointTable,
    grid: &BucketGrid,
    topology: SegmentTopology,
    seg: SegmentRef,
    coords: &[Point3; MAX_SEGMENT_NODES],
    pad: f64,
    report: &mut SearchReport,
) {
    let a = coords[0];
    let b = coords[1];
    let t1 = b - a;
    let t1_norm = t1.norm();
    if t1_norm < DEGENERACY_TOL {
        emit(report, Diagnostic::DegenerateGeometry { point: None, master: seg });
        return;
    }
    let normal = Vec3::new(t1.y, -t1.x, 0.0) / t1_norm;

    let (lo, hi) = pair_box(&[a, b], pad);
    for idx in candidate_points(grid, lo, hi) {
        if table.records()[idx].slave == seg {
            continue;
        }
        report.pairs_tested += 1;

        let xg = table.records()[idx].coords;
        let proj = (xg - a).dot(&t1) / t1_norm;
        if proj < 0.0 || proj > t1_norm {
            continue;
        }
        let xp = a + proj * t1 / t1_norm;
        let gap = -(xg - xp).dot(&normal);
        refine_and_commit(table, idx, topology, seg, coords, xg, xp, gap, report);
    }
}

/// 3-D narrow phase: classify against the patch's sub-triangles.
fn search_against_patch(
    table: &mut GaussPointTable,
    grid: &BucketGrid,
    topology: SegmentTopology,
    seg: SegmentRef,
    coords: &[Point3; MAX_SEGMENT_NODES],
    pad: f64,
    report: &mut SearchReport,
) {
    let nsn = topology.n_nodes();
    let triangles: Vec<[Point3; 3]> = match topology {
        SegmentTopology::Tri6 => vec![[coords[0], coords[1], coords[2]]],
        _ => {
            // Quad patches subdivide into four triangles sharing the
            // patch centroid, walking the corner ring with wrap-around.
            let centroid = coords[..nsn].iter().sum::<Point3>() / nsn as f64;
            (0..4)
                .map(|it| [coords[it], coords[(it + 1) % 4], centroid])
                .collect()
        }
    };

    for tri in &triangles {
        let [a, b, c] = *tri;
        let t1 = b - a;
        let t2 = c - b;
        let t3 = a - c;
        let n = t1.cross(&t2);
        let n_len = n.norm();
        if n_len < DEGENERACY_TOL {
            emit(report, Diagnostic::DegenerateGeometry { point: None, master: seg });
            continue;
        }
        let normal = n / n_len;
        // Sign quantities scale like length²; zero detection follows.
        let zero_tol = n_len * 1e-12;

        let (lo, hi) = pair_box(tri, pad);
        for idx in candidate_points(grid, lo, hi) {
            if table.records()[idx].slave == seg {
                continue;
            }
            report.pairs_tested += 1;

            let xg = table.records()[idx].coords;
            let r1 = xg - a;
            let q1 = r1.cross(&t1).dot(&normal);
            let q2 = (xg - b).cross(&t2).dot(&normal);
            let q3 = (xg - c).cross(&t3).dot(&normal);

            // Inside iff no two quantities have strictly opposite signs;
            // edge-exact zeros count as inside.
            let has_pos = q1 > zero_tol || q2 > zero_tol || q3 > zero_tol;
            let has_neg = q1 < -zero_tol || q2 < -zero_tol || q3 < -zero_tol;
            if has_pos && has_neg {
                continue;
            }

            let dist = r1.dot(&normal);
            let xp = xg - dist * normal;
            let gap = -dist;
            refine_and_commit(table, idx, topology, seg, coords, xg, xp, gap, report);
        }
    }
}

/// Padded axis-aligned box over a set of points.
fn pair_box(points: &[Point3], pad: f64) -> (Point3, Point3) {
    let mut lo = points[0];
    let mut hi = points[0];
    for p in &points[1..] {
        for k in 0..3 {
            lo[k] = lo[k].min(p[k]);
            hi[k] = hi[k].max(p[k]);
        }
    }
    (lo - Point3::from_element(pad), hi + Point3::from_element(pad))
}

/// Gauss-point indices in the buckets covered by a box.
fn candidate_points(grid: &BucketGrid, lo: Point3, hi: Point3) -> Vec<usize> {
    let (min_cell, max_cell) = grid.cell_range(lo, hi);
    let mut out = Vec::new();
    for i2 in min_cell[2]..=max_cell[2] {
        for i1 in min_cell[1]..=max_cell[1] {
            for i0 in min_cell[0]..=max_cell[0] {
                out.extend_from_slice(grid.bucket([i0, i1, i2]));
            }
        }
    }
    out
}

/// Refine the planar projection on the actual (possibly curved) patch
/// and commit the candidate if it is still the best qualifying match.
#[allow(clippy::too_many_arguments)]
fn refine_and_commit(
    table: &mut GaussPointTable,
    idx: usize,
    topology: SegmentTopology,
    seg: SegmentRef,
    coords: &[Point3; MAX_SEGMENT_NODES],
    xg: Point3,
    xp: Point3,
    planar_gap: f64,
    report: &mut SearchReport,
) {
    {
        let rec = &table.records()[idx];
        if !(planar_gap > rec.gap && planar_gap < CONTACT_RANGE) {
            return;
        }
    }

    let seed = match seed_parametric(topology, coords, xp) {
        Some(seed) => seed,
        None => {
            emit(report, Diagnostic::DegenerateGeometry { point: Some(idx), master: seg });
            return;
        }
    };

    let projection = match project_point(topology, coords, xg, seed) {
        Some(p) => p,
        None => {
            emit(report, Diagnostic::DegenerateGeometry { point: Some(idx), master: seg });
            return;
        }
    };

    if !projection.converged {
        emit(
            report,
            Diagnostic::NonConvergence {
                point: idx,
                master: seg,
                iterations: projection.iterations,
            },
        );
    }
    if !topology.contains_parametric(projection.xi, DOMAIN_TOL) {
        emit(
            report,
            Diagnostic::OutOfDomain {
                point: idx,
                master: seg,
                xi: projection.xi,
            },
        );
    }

    let rec = &mut table.records_mut()[idx];
    if projection.gap > rec.gap && projection.gap < CONTACT_RANGE {
        rec.gap = projection.gap;
        rec.active = projection.gap >= -CONTACT_RANGE;
        rec.master = Some(seg);
        rec.xi = projection.xi;
        report.commits += 1;
    }
}

/// Closed-form initial parametric guess: project onto representative
/// patch edges.
fn seed_parametric(
    topology: SegmentTopology,
    coords: &[Point3; MAX_SEGMENT_NODES],
    xp: Point3,
) -> Option<[f64; 2]> {
    let edge = |from: usize, to: usize| -> Option<f64> {
        let e = coords[to] - coords[from];
        let len2 = e.norm_squared();
        if len2 < DEGENERACY_TOL {
            return None;
        }
        Some((xp - coords[from]).dot(&e) / len2)
    };

    match topology {
        SegmentTopology::Line2 => Some([2.0 * edge(0, 1)? - 1.0, 0.0]),
        SegmentTopology::Quad4 | SegmentTopology::Quad8 => {
            Some([2.0 * edge(0, 1)? - 1.0, 2.0 * edge(0, 3)? - 1.0])
        }
        SegmentTopology::Tri6 => Some([edge(0, 1)?, edge(0, 2)?]),
    }
}

/// Newton/least-squares closest-point projection onto a parametric patch.
///
/// Solves for the parametric coordinates that zero the point-to-surface
/// residual projected onto each tangent, using the tangent Gram matrix.
/// Returns `None` on degenerate geometry (zero tangent or normal, or a
/// singular Gram matrix).
pub fn project_point(
    topology: SegmentTopology,
    coords: &[Point3; MAX_SEGMENT_NODES],
    xg: Point3,
    seed: [f64; 2],
) -> Option<Projection> {
    let nsn = topology.n_nodes();
    let npd = topology.parametric_dim();
    let [mut r, mut s] = seed;
    let mut gap = 0.0;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < MAX_PROJECTION_ITERS {
        let eval = shape::evaluate(topology, r, s);
        let mut xp = Point3::zeros();
        let mut t_r = Vec3::zeros();
        let mut t_s = Vec3::zeros();
        for j in 0..nsn {
            xp += eval.h[j] * coords[j];
            t_r += eval.dh[j][0] * coords[j];
            if npd == 2 {
                t_s += eval.dh[j][1] * coords[j];
            }
        }

        let n = if npd == 1 {
            Vec3::new(t_r.y, -t_r.x, 0.0)
        } else {
            t_r.cross(&t_s)
        };
        let n_len = n.norm();
        if n_len < DEGENERACY_TOL {
            return None;
        }

        let d = xg - xp;
        gap = -d.dot(&n) / n_len;

        let b1 = t_r.dot(&d);
        let a11 = t_r.dot(&t_r);
        let delta = if npd == 1 {
            if a11 < DEGENERACY_TOL {
                return None;
            }
            let dr = b1 / a11;
            r += dr;
            dr.abs()
        } else {
            let b2 = t_s.dot(&d);
            let a22 = t_s.dot(&t_s);
            let a12 = t_r.dot(&t_s);
            let det = a11 * a22 - a12 * a12;
            if det.abs() < DEGENERACY_TOL {
                return None;
            }
            let dr = (a22 * b1 - a12 * b2) / det;
            let ds = (-a12 * b1 + a11 * b2) / det;
            r += dr;
            s += ds;
            (dr * dr + ds * ds).sqrt()
        };

        iterations += 1;
        if delta <= PROJECTION_TOL {
            converged = true;
            break;
        }
    }

    Some(Projection {
        xi: [r, s],
        gap,
        iterations,
        converged,
    })
}

fn emit(report: &mut SearchReport, diagnostic: Diagnostic) {
    warn!(%diagnostic, "contact search diagnostic");
    report.diagnostics.push(diagnostic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{seed_table, BoundingBox};
    use crate::shape::gauss::QuadratureRule;
    use crate::state::GAP_SENTINEL;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Two stacked unit-square quads: element 0 at z = `slave_z`, element
    /// 1 at z = 0, each with one segment spanning all four nodes.
    fn stacked_quads(slave_z: f64) -> ContactMesh {
        ContactMesh::new(
            SegmentTopology::Quad4,
            vec![
                Vector3::new(0.0, 0.0, slave_z),
                Vector3::new(1.0, 0.0, slave_z),
                Vector3::new(1.0, 1.0, slave_z),
                Vector3::new(0.0, 1.0, slave_z),
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
            vec![vec![0, 1, 2, 3]],
        )
        .unwrap()
    }

    fn slave() -> Vec<SegmentRef> {
        vec![SegmentRef { element: 0, segment: 0 }]
    }

    fn master() -> Vec<SegmentRef> {
        vec![SegmentRef { element: 1, segment: 0 }]
    }

    fn centroid_rule() -> QuadratureRule {
        QuadratureRule::new(vec![[0.0, 0.0]], vec![4.0])
    }

    fn run_search(
        mesh: &ContactMesh,
        rule: &QuadratureRule,
    ) -> (GaussPointTable, SearchReport) {
        let (mut table, longest) = seed_table(mesh, &slave(), rule).unwrap();
        let bbox = BoundingBox::from_surface(mesh, &master()).unwrap();
        let mut grid = BucketGrid::new(bbox, longest.max(1.0e-12));
        grid.assign(&table);
        let report =
            search_contacts(&mut table, &grid, mesh, &master(), longest).unwrap();
        (table, report)
    }

    #[test]
    fn test_coincident_centroid_probe_is_inside_with_zero_gap() {
        let mesh = stacked_quads(0.0);
        let (table, report) = run_search(&mesh, &centroid_rule());
        let rec = &table.records()[0];
        assert!(rec.active);
        assert_eq!(rec.master, Some(SegmentRef { element: 1, segment: 0 }));
        assert_relative_eq!(rec.gap, 0.0, epsilon = 1e-10);
        assert_relative_eq!(rec.xi[0], 0.0, epsilon = 1e-4);
        assert_relative_eq!(rec.xi[1], 0.0, epsilon = 1e-4);
        assert!(report.commits >= 1);
    }

    #[test]
    fn test_probe_outside_padded_boxes_stays_inactive() {
        // Slave patch far outside every padded master box: no candidate
        // is accepted and the point stays unmatched.
        let mesh = ContactMesh::new(
            SegmentTopology::Quad4,
            vec![
                Vector3::new(100.0, 100.0, 50.0),
                Vector3::new(101.0, 100.0, 50.0),
                Vector3::new(101.0, 101.0, 50.0),
                Vector3::new(100.0, 101.0, 50.0),
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
            vec![vec![0, 1, 2, 3]],
        )
        .unwrap();
        let (table, report) = run_search(&mesh, &centroid_rule());
        let rec = &table.records()[0];
        assert!(!rec.active);
        assert_eq!(rec.master, None);
        assert_eq!(rec.gap, GAP_SENTINEL);
        assert_eq!(report.commits, 0);
    }

    #[test]
    fn test_penetrating_probe_commits_positive_gap() {
        // Slave plane below the master surface: penetration behind the
        // outward (+z) normal, so the committed gap is positive.
        let mesh = stacked_quads(-0.01);
        let (table, _) = run_search(&mesh, &centroid_rule());
        let rec = &table.records()[0];
        assert!(rec.active);
        assert_relative_eq!(rec.gap, 0.01, epsilon = 1e-10);
    }

    #[test]
    fn test_open_gap_commits_negative_gap_within_range() {
        let mesh = stacked_quads(0.5);
        let (table, _) = run_search(&mesh, &centroid_rule());
        let rec = &table.records()[0];
        assert_relative_eq!(rec.gap, -0.5, epsilon = 1e-10);
        // Within the search range the point is tracked as active; the
        // constitutive law releases it on assembly.
        assert!(rec.active);
    }

    #[test]
    fn test_gap_beyond_search_range_never_activates() {
        let mesh = stacked_quads(25.0);
        let (table, _) = run_search(&mesh, &centroid_rule());
        let rec = &table.records()[0];
        assert!(!rec.active);
    }

    #[test]
    fn test_self_exclusion() {
        let mesh = stacked_quads(0.0);
        let rule = centroid_rule();
        let (mut table, longest) = seed_table(&mesh, &slave(), &rule).unwrap();
        let bbox = BoundingBox::from_surface(&mesh, &slave()).unwrap();
        let mut grid = BucketGrid::new(bbox, longest);
        grid.assign(&table);
        // Search against the slave's own segment only.
        let report =
            search_contacts(&mut table, &grid, &mesh, &slave(), longest).unwrap();
        assert_eq!(report.pairs_tested, 0);
        assert!(!table.records()[0].active);
    }

    #[test]
    fn test_projection_above_node_converges_to_nodal_coordinate() {
        let mesh = stacked_quads(0.0);
        let coords = mesh
            .segment_coords(SegmentRef { element: 1, segment: 0 })
            .unwrap();
        let topology = SegmentTopology::Quad4;
        // Point hovering over node 1 at (1, 0).
        let xg = Vector3::new(1.0, 0.0, 0.3);
        for &node in &[0usize, 1, 2, 3] {
            let expected = topology.node_coords()[node];
            let xg_node = Vector3::new(coords[node].x, coords[node].y, 0.3);
            let proj = project_point(topology, &coords, xg_node, [0.0, 0.0]).unwrap();
            assert!(proj.converged);
            assert!(proj.iterations <= 5);
            assert_relative_eq!(proj.xi[0], expected[0], epsilon = 1e-4);
            assert_relative_eq!(proj.xi[1], expected[1], epsilon = 1e-4);
        }
        let proj = project_point(topology, &coords, xg, [0.0, 0.0]).unwrap();
        assert_relative_eq!(proj.gap, -0.3, epsilon = 1e-10);
    }

    #[test]
    fn test_projection_degenerate_patch_is_none() {
        // All nodes collapsed to a point: zero tangents.
        let coords = [Point3::zeros(); MAX_SEGMENT_NODES];
        assert!(project_point(
            SegmentTopology::Quad4,
            &coords,
            Vector3::new(0.0, 0.0, 1.0),
            [0.0, 0.0]
        )
        .is_none());
    }

    #[test]
    fn test_line2_search_in_plane() {
        // Slave line above a master line in the plane. The master is
        // ordered so its rotated tangent normal (t.y, -t.x) points up at
        // the slave; the slave then sits on the open-gap side.
        let mesh = ContactMesh::new(
            SegmentTopology::Line2,
            vec![
                Vector3::new(0.0, 0.3, 0.0),
                Vector3::new(1.0, 0.3, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 0.0, 0.0),
            ],
            vec![vec![0, 1], vec![2, 3]],
            vec![vec![0, 1]],
        )
        .unwrap();
        let rule = QuadratureRule::for_topology(SegmentTopology::Line2);
        let (mut table, longest) = seed_table(&mesh, &slave(), &rule).unwrap();
        let bbox = BoundingBox::from_surface(&mesh, &master()).unwrap();
        let mut grid = BucketGrid::new(bbox, longest);
        grid.assign(&table);
        let report =
            search_contacts(&mut table, &grid, &mesh, &master(), longest).unwrap();
        assert_eq!(report.commits, 2);
        for rec in table.records() {
            assert_relative_eq!(rec.gap, -0.3, epsilon = 1e-10);
            assert!(rec.xi[0].abs() < 1.0);
        }
    }

    #[test]
    fn test_tri6_patch_search() {
        // Curved-capable 6-node triangle laid out flat; slave probe sits
        // above its interior.
        let mesh = ContactMesh::new(
            SegmentTopology::Tri6,
            vec![
                // Slave triangle at z = -0.02 (penetrating behind +z).
                Vector3::new(0.0, 0.0, -0.02),
                Vector3::new(1.0, 0.0, -0.02),
                Vector3::new(0.0, 1.0, -0.02),
                Vector3::new(0.5, 0.0, -0.02),
                Vector3::new(0.5, 0.5, -0.02),
                Vector3::new(0.0, 0.5, -0.02),
                // Master triangle at z = 0.
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::new(0.5, 0.5, 0.0),
                Vector3::new(0.0, 0.5, 0.0),
            ],
            vec![vec![0, 1, 2, 3, 4, 5], vec![6, 7, 8, 9, 10, 11]],
            vec![vec![0, 1, 2, 3, 4, 5]],
        )
        .unwrap();
        let rule = QuadratureRule::for_topology(SegmentTopology::Tri6);
        let (mut table, longest) = seed_table(&mesh, &slave(), &rule).unwrap();
        let bbox = BoundingBox::from_surface(&mesh, &master()).unwrap();
        let mut grid = BucketGrid::new(bbox, longest);
        grid.assign(&table);
        let report =
            search_contacts(&mut table, &grid, &mesh, &master(), longest).unwrap();
        assert_eq!(report.commits, 3);
        for rec in table.records() {
            assert!(rec.active);
            assert_relative_eq!(rec.gap, 0.02, epsilon = 1e-9);
            assert!(SegmentTopology::Tri6.contains_parametric(rec.xi, 1e-6));
        }
    }
}
