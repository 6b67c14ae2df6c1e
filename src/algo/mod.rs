//! Deformation algorithms.
//!
//! A deformation request runs through three stages:
//!
//! - **Assembly** ([`energy`]): build the unconstrained quadratic energy
//!   matrix from the rest shape
//! - **Constraints** ([`constraints`]): resolve the pinned vertices and
//!   overwrite their rows
//! - **Solve** ([`solver`]): dense LU factorization and write-back
//!
//! [`Deformer`] drives the stages and caches what depends only on the rest
//! shape. Two energies are available: the similarity-invariant energy and
//! an as-rigid-as-possible model in [`arap`].

pub mod arap;
pub mod constraints;
pub mod deform;
pub mod energy;
pub mod solver;

pub use arap::{closest_rotation, ArapSystem};
pub use constraints::{incorporate, incorporate_columns, resolve_pins, Pin};
pub use deform::{
    DeformOptions, DeformOutcome, DeformStats, Deformer, EnergyModel, DEFAULT_MAX_VERTICES,
};
pub use energy::{assemble_similarity, mesh_energy, triangle_energy};
pub use solver::{solve_dense, DenseLu, SolveStatus};
