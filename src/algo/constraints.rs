//! Hard positional constraints for the deformation solvers.
//!
//! Constraint handling happens in two steps:
//!
//! 1. [`resolve_pins`] turns the mesh's pinned set into a flat list of
//!    `(vertex, target)` pairs. When exactly one vertex is pinned, the
//!    anchor vertex is added, displaced by the same offset from its rest
//!    position as the pinned vertex. Two pinned points fix every similarity
//!    mode, so a single drag becomes a pure translation of the mesh.
//! 2. [`incorporate`] overwrites the rows of the assembled matrix that belong
//!    to pinned unknowns with identity rows and builds the matching
//!    right-hand side.

use nalgebra::{DMatrix, DVector, Point2};

use crate::mesh::{DeformableMesh, ANCHOR_VERTEX};

/// A vertex held at a fixed target position during a solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pin {
    /// Vertex index.
    pub vertex: usize,
    /// Position the vertex must take.
    pub target: Point2<f64>,
}

/// Resolve the mesh's pinned set into the list of pins a solve must honour.
///
/// With a single pinned vertex `i`, the anchor is pinned first at
/// `rest(anchor) + (current(i) - rest(i))`. If the only pinned vertex is the
/// anchor itself, nothing is added.
///
/// An empty pinned set yields an empty list.
///
/// # Panics
///
/// Panics if a pinned index is out of range. The mesh model validates pins
/// when they are added, so this indicates a bug in the mesh implementation.
pub fn resolve_pins<M: DeformableMesh + ?Sized>(mesh: &M) -> Vec<Pin> {
    let n = mesh.num_vertices();
    let pinned = mesh.pinned();
    for &i in pinned {
        assert!(i < n, "pinned vertex {} out of range (mesh has {} vertices)", i, n);
    }

    let mut pins = Vec::with_capacity(pinned.len() + 1);

    if let [only] = *pinned {
        if only != ANCHOR_VERTEX {
            let offset = mesh.position(only) - mesh.rest_position(only);
            pins.push(Pin {
                vertex: ANCHOR_VERTEX,
                target: mesh.rest_position(ANCHOR_VERTEX) + offset,
            });
        }
    }

    pins.extend(pinned.iter().map(|&i| Pin {
        vertex: i,
        target: mesh.position(i),
    }));

    pins
}

/// Replace a matrix row with the corresponding identity row.
fn pin_row(matrix: &mut DMatrix<f64>, row: usize) {
    matrix.row_mut(row).fill(0.0);
    matrix[(row, row)] = 1.0;
}

/// Apply pins to an assembled `2N × 2N` system.
///
/// For every pin on vertex `i`, rows `i` and `i + n` of `matrix` become
/// identity rows and the returned right-hand side carries the target
/// coordinates there. Every other entry of the right-hand side is zero.
///
/// Must be called after the unconstrained matrix is fully assembled.
///
/// # Panics
///
/// Panics if `matrix` is not `2n × 2n` or a pin is out of range.
pub fn incorporate(matrix: &mut DMatrix<f64>, pins: &[Pin], n: usize) -> DVector<f64> {
    assert_eq!(matrix.shape(), (2 * n, 2 * n), "system matrix must be 2N x 2N");

    let mut rhs = DVector::zeros(2 * n);
    for pin in pins {
        let i = pin.vertex;
        assert!(i < n, "pinned vertex {} out of range (mesh has {} vertices)", i, n);

        pin_row(matrix, i);
        pin_row(matrix, i + n);
        rhs[i] = pin.target.x;
        rhs[i + n] = pin.target.y;
    }
    rhs
}

/// Apply pins to an assembled `N × N` system with one column per coordinate.
///
/// Used by solvers that treat x and y as independent right-hand sides over
/// the same matrix. Pinned rows become identity rows and `rhs` rows of pinned
/// vertices are overwritten with the targets.
///
/// # Panics
///
/// Panics if the shapes disagree or a pin is out of range.
pub fn incorporate_columns(matrix: &mut DMatrix<f64>, rhs: &mut DMatrix<f64>, pins: &[Pin]) {
    let n = matrix.nrows();
    assert_eq!(matrix.shape(), (n, n), "system matrix must be square");
    assert_eq!(rhs.shape(), (n, 2), "right-hand side must be N x 2");

    for pin in pins {
        assert!(
            pin.vertex < n,
            "pinned vertex {} out of range (mesh has {} vertices)",
            pin.vertex,
            n
        );
        pin_row(matrix, pin.vertex);
    }
    apply_targets(rhs, pins);
}

/// Overwrite the rows of pinned vertices in an `N × 2` right-hand side with
/// their targets.
///
/// Used when a matrix pinned by [`incorporate_columns`] is reused with a new
/// right-hand side.
pub fn apply_targets(rhs: &mut DMatrix<f64>, pins: &[Pin]) {
    for pin in pins {
        rhs[(pin.vertex, 0)] = pin.target.x;
        rhs[(pin.vertex, 1)] = pin.target.y;
    }
}
