//! Core mesh data structures.
//!
//! This module provides the 2D triangle mesh that is overlaid on an image and
//! deformed by the solvers in [`crate::algo`].
//!
//! # Overview
//!
//! The primary type is [`ImageMesh`], which stores for every vertex an
//! immutable rest position and a mutable current position, a fixed triangle
//! list, and the ordered set of vertices currently pinned by the user.
//!
//! The solvers do not depend on [`ImageMesh`] directly: they read and write
//! meshes through the [`DeformableMesh`] trait, so any mesh container that
//! can expose rest/current positions and connectivity can be deformed.
//!
//! # Anchor vertex
//!
//! Vertex [`ANCHOR_VERTEX`] is reserved. It is never user-selectable and is
//! only used to remove the rotational ambiguity of the similarity energy when
//! exactly one vertex is pinned.
//!
//! # Construction
//!
//! ```
//! use simdeform::mesh::{build_from_triangles, ImageMesh};
//! use nalgebra::Point2;
//!
//! let vertices = vec![
//!     Point2::new(0.0, 0.0),
//!     Point2::new(1.0, 0.0),
//!     Point2::new(0.5, 1.0),
//! ];
//! let triangles = vec![[0, 1, 2]];
//!
//! let mesh: ImageMesh = build_from_triangles(&vertices, &triangles).unwrap();
//! assert_eq!(mesh.num_vertices(), 3);
//! ```

mod builder;
mod image_mesh;
mod index;

use nalgebra::Point2;

pub use builder::{build_from_triangles, build_grid, GridOptions};
pub use image_mesh::ImageMesh;
pub use index::{MeshIndex, TriangleId, VertexId};

/// Index of the reserved anchor vertex.
pub const ANCHOR_VERTEX: usize = 0;

/// Read/write access to a deformable 2D triangle mesh.
///
/// This is the seam between the solvers and whatever owns the mesh data.
/// All indices are plain `usize` vertex/triangle indices in `[0, n)`.
///
/// Implementations must keep rest positions and connectivity fixed for the
/// lifetime of the mesh; only current positions and the pinned set change.
pub trait DeformableMesh {
    /// Number of vertices.
    fn num_vertices(&self) -> usize;

    /// Number of triangles.
    fn num_triangles(&self) -> usize;

    /// Vertex indices `(p, q, r)` of triangle `t`.
    fn triangle(&self, t: usize) -> [usize; 3];

    /// Rest (undeformed) position of vertex `v`.
    fn rest_position(&self, v: usize) -> Point2<f64>;

    /// Current position of vertex `v`.
    fn position(&self, v: usize) -> Point2<f64>;

    /// Overwrite the current position of vertex `v`.
    fn set_position(&mut self, v: usize, p: Point2<f64>);

    /// Currently pinned vertices, in the order they were pinned.
    fn pinned(&self) -> &[usize];
}

/// The lowest vertex index that no triangle uses, if any.
///
/// Such a vertex has no energy term, so the deformation system would be
/// singular whenever it is not pinned.
pub(crate) fn first_unreferenced_vertex(
    num_vertices: usize,
    triangles: impl IntoIterator<Item = [usize; 3]>,
) -> Option<usize> {
    let mut used = vec![false; num_vertices];
    for tri in triangles {
        for v in tri {
            used[v] = true;
        }
    }
    used.iter().position(|&u| !u)
}

/// Twice the signed area of the triangle `(p0, p1, p2)`.
///
/// Positive for counter-clockwise triangles. With `p0 = (a, b)`,
/// `p1 = (c, d)` and `p2 = (e, f)` this is `ad - af - bc + be + cf - de`.
#[inline]
pub fn signed_double_area(p0: &Point2<f64>, p1: &Point2<f64>, p2: &Point2<f64>) -> f64 {
    (p1 - p0).perp(&(p2 - p0))
}
