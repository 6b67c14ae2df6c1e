//! Error types for simdeform.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

use crate::algo::SolveStatus;

/// Result type alias using [`DeformError`].
pub type Result<T> = std::result::Result<T, DeformError>;

/// Errors that can occur while building meshes or deforming them.
#[derive(Error, Debug)]
pub enum DeformError {
    /// The mesh has no vertices or no triangles.
    #[error("mesh has no {0}")]
    EmptyMesh(&'static str),

    /// A triangle references an invalid vertex index.
    #[error("triangle {triangle} references invalid vertex index {vertex}")]
    InvalidTriangleIndex {
        /// The triangle index.
        triangle: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A triangle has zero signed rest area or repeated corners.
    #[error("triangle {triangle} is degenerate (rest area {area})")]
    DegenerateTriangle {
        /// The triangle index.
        triangle: usize,
        /// Twice the signed rest area of the triangle.
        area: f64,
    },

    /// A vertex index outside `[0, num_vertices)` was used.
    #[error("vertex index {index} out of range (mesh has {vertex_count} vertices)")]
    InvalidVertexIndex {
        /// The invalid index.
        index: usize,
        /// The number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A vertex is not a corner of any triangle.
    #[error("vertex {0} is not used by any triangle")]
    UnreferencedVertex(usize),

    /// The reserved anchor vertex cannot be selected by the user.
    #[error("vertex {0} is the reserved anchor and cannot be pinned")]
    AnchorNotSelectable(usize),

    /// An operation requires a pinned vertex but the vertex is not pinned.
    #[error("vertex {0} is not pinned")]
    NotPinned(usize),

    /// The mesh exceeds the configured vertex budget.
    #[error("mesh has {vertices} vertices, more than the supported maximum of {max}")]
    TooManyVertices {
        /// Number of vertices in the mesh.
        vertices: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A mesh of different size was passed to a deformer built for another topology.
    #[error(
        "deformer was built for {expected_vertices} vertices / {expected_triangles} triangles, \
         got {vertices} / {triangles}"
    )]
    TopologyMismatch {
        /// Vertex count the deformer was built for.
        expected_vertices: usize,
        /// Triangle count the deformer was built for.
        expected_triangles: usize,
        /// Vertex count of the mesh passed in.
        vertices: usize,
        /// Triangle count of the mesh passed in.
        triangles: usize,
    },

    /// The linear system could not be solved.
    #[error("linear solve failed: {0}")]
    SolveFailed(SolveStatus),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl DeformError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        DeformError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = DeformError::DegenerateTriangle {
            triangle: 3,
            area: 0.0,
        };
        assert_eq!(e.to_string(), "triangle 3 is degenerate (rest area 0)");

        let e = DeformError::invalid_param("max_vertices", 0, "must be positive");
        assert_eq!(
            e.to_string(),
            "invalid parameter: max_vertices = 0 (must be positive)"
        );
    }
}
