//! # Simdeform
//!
//! Interactive 2D mesh deformation for image warping.
//!
//! A triangle mesh is laid over an image. The user pins a few vertices and
//! drags them around; every other vertex is placed by minimizing an energy
//! that lets each triangle rotate, translate and scale uniformly without
//! cost but penalizes any other distortion.
//!
//! ## Features
//!
//! - **Image meshes**: regular grids or explicit triangle lists with pin
//!   selection and picking
//! - **Similarity-invariant energy**: closed-form per-triangle blocks in a
//!   dense global system
//! - **ARAP**: as-rigid-as-possible local/global iteration as an alternative
//!   energy
//! - **Mesh-agnostic solvers**: any container implementing
//!   [`DeformableMesh`](mesh::DeformableMesh) can be deformed
//!
//! ## Quick Start
//!
//! ```
//! use simdeform::prelude::*;
//! use nalgebra::Point2;
//!
//! // A 4x4 grid over a 2x2 image centered on the origin
//! let mut mesh: ImageMesh = build_grid(&GridOptions::new(2.0, 2.0, 4, 4)).unwrap();
//! let mut deformer = Deformer::new(&mesh, DeformOptions::default()).unwrap();
//!
//! // Hold the lower-right corner, drag the upper-right one
//! mesh.pin(VertexId::new(4)).unwrap();
//! mesh.pin(VertexId::new(24)).unwrap();
//! mesh.drag(VertexId::new(24), Point2::new(0.5, 1.5)).unwrap();
//!
//! assert!(deformer.deform(&mut mesh).unwrap().is_solved());
//! assert_eq!(mesh.vertex_position(VertexId::new(24)), Point2::new(0.5, 1.5));
//! ```
//!
//! ## Picking
//!
//! ```
//! use simdeform::prelude::*;
//! use nalgebra::Point2;
//!
//! let mesh: ImageMesh = build_grid(&GridOptions::new(2.0, 2.0, 2, 2)).unwrap();
//!
//! // Within the pick radius of the center vertex
//! let hit = mesh.nearest_vertex(Point2::new(0.1, -0.1), None);
//! assert_eq!(hit, Some(VertexId::new(4)));
//!
//! // The anchor vertex is never picked
//! assert_eq!(mesh.nearest_vertex(Point2::new(-1.0, -1.0), None), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use simdeform::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::{DeformOptions, DeformOutcome, Deformer, EnergyModel, SolveStatus};
    pub use crate::error::{DeformError, Result};
    pub use crate::mesh::{
        build_from_triangles, build_grid, DeformableMesh, GridOptions, ImageMesh, MeshIndex,
        TriangleId, VertexId, ANCHOR_VERTEX,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
