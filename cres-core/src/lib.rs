//! CRES Core - Contact RESidual and Stiffness
//!
//! Penalty-regularized contact mechanics for finite element interfaces:
//! - Shape functions for line, quad, and triangle contact segments
//! - Broad-phase bucket grid plus narrow-phase projection contact search
//! - Penalty normal law with Coulomb-friction stick/slip return mapping
//! - Residual and tangent-stiffness assembly into triplet form
//!
//! # Architecture
//!
//! The engine is driven by an external nonlinear solver, once per
//! iteration or increment:
//!
//! 1. [`grid::seed_table`] allocates the persistent [`GaussPointTable`]
//!    for the slave surface and measures the search padding radius.
//! 2. [`grid::BucketGrid`] partitions the points for broad-phase lookup.
//! 3. [`search::search_contacts`] matches points to master patches and
//!    commits gaps and projection coordinates into the table.
//! 4. [`assembly::assemble_contact`] evaluates the constitutive law per
//!    active point and integrates the residual and stiffness triplets.
//!
//! Between accepted increments the driver calls
//! [`GaussPointTable::advance_step`]; the engine itself never advances
//! history.

pub mod assembly;
pub mod error;
pub mod grid;
pub mod law;
pub mod mesh;
pub mod search;
pub mod shape;
pub mod sparse;
pub mod state;
pub mod types;

pub use assembly::{assemble_contact, ContactMode, ContactOptions, ContactOutput};
pub use error::{Diagnostic, Error, Result};
pub use grid::{seed_table, BoundingBox, BucketGrid};
pub use law::{CovariantMetric, TractionUpdate};
pub use mesh::{ContactMesh, SegmentRef};
pub use search::{search_contacts, Projection, SearchReport, CONTACT_RANGE};
pub use shape::{evaluate, gauss::QuadratureRule, SegmentTopology, ShapeEval};
pub use sparse::{ContactTriplets, CsrMatrix, ResidualVector};
pub use state::{GaussPoint, GaussPointTable};
pub use types::{Point3, Vec3};
