//! Dense direct solve of the constrained deformation systems.
//!
//! The systems are small (at most a few thousand unknowns) and dense, so they
//! are solved with nalgebra's LU decomposition with partial pivoting. The
//! factorization takes ownership of the matrix: a constrained system is
//! consumed by the solve and must be rebuilt for the next one.

use std::fmt;

use nalgebra::{DMatrix, DVector, Dyn, Point2, LU};

use super::constraints::Pin;
use crate::mesh::DeformableMesh;

/// Pivot magnitude, relative to the largest pivot, below which a system is
/// treated as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Why a solve produced no usable solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveStatus {
    /// The factorization hit an exactly zero pivot.
    Singular,
    /// The smallest pivot is negligible compared to the largest one.
    IllConditioned {
        /// Ratio of the smallest to the largest pivot magnitude.
        pivot_ratio: f64,
    },
    /// The solution contains NaN or infinite values.
    NonFinite,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Singular => write!(f, "system matrix is singular"),
            SolveStatus::IllConditioned { pivot_ratio } => {
                write!(f, "system matrix is ill-conditioned (pivot ratio {:e})", pivot_ratio)
            }
            SolveStatus::NonFinite => write!(f, "solution is not finite"),
        }
    }
}

/// An LU factorization of a square system matrix.
///
/// Built once, it can solve several right-hand sides.
pub struct DenseLu {
    lu: LU<f64, Dyn, Dyn>,
    dim: usize,
}

impl DenseLu {
    /// Factorize `matrix`, consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`SolveStatus::Singular`] or [`SolveStatus::IllConditioned`]
    /// if the pivots show the matrix cannot be inverted reliably.
    pub fn factorize(matrix: DMatrix<f64>) -> std::result::Result<Self, SolveStatus> {
        assert!(matrix.is_square(), "system matrix must be square");
        let dim = matrix.nrows();

        let lu = matrix.lu();
        if !lu.is_invertible() {
            return Err(SolveStatus::Singular);
        }

        let u = lu.u();
        let pivots = u.diagonal();
        let max = pivots.amax();
        let min = pivots.iter().fold(f64::INFINITY, |m, p| m.min(p.abs()));
        if max == 0.0 || !max.is_finite() {
            return Err(SolveStatus::Singular);
        }
        let pivot_ratio = min / max;
        if pivot_ratio < PIVOT_TOLERANCE {
            return Err(SolveStatus::IllConditioned { pivot_ratio });
        }

        Ok(Self { lu, dim })
    }

    /// Size of the factorized system.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Solve for a single right-hand side.
    ///
    /// # Panics
    ///
    /// Panics if `rhs` does not have [`dim`](Self::dim) entries.
    pub fn solve_vector(
        &self,
        rhs: &DVector<f64>,
    ) -> std::result::Result<DVector<f64>, SolveStatus> {
        assert_eq!(rhs.len(), self.dim, "right-hand side length must match the system");
        let x = self.lu.solve(rhs).ok_or(SolveStatus::Singular)?;
        if x.iter().all(|v| v.is_finite()) {
            Ok(x)
        } else {
            Err(SolveStatus::NonFinite)
        }
    }

    /// Solve for every column of `rhs` at once.
    ///
    /// # Panics
    ///
    /// Panics if `rhs` does not have [`dim`](Self::dim) rows.
    pub fn solve_columns(
        &self,
        rhs: &DMatrix<f64>,
    ) -> std::result::Result<DMatrix<f64>, SolveStatus> {
        assert_eq!(rhs.nrows(), self.dim, "right-hand side length must match the system");
        let x = self.lu.solve(rhs).ok_or(SolveStatus::Singular)?;
        if x.iter().all(|v| v.is_finite()) {
            Ok(x)
        } else {
            Err(SolveStatus::NonFinite)
        }
    }
}

/// Solve `matrix * x = rhs`, consuming the matrix.
pub fn solve_dense(
    matrix: DMatrix<f64>,
    rhs: &DVector<f64>,
) -> std::result::Result<DVector<f64>, SolveStatus> {
    DenseLu::factorize(matrix)?.solve_vector(rhs)
}

/// Write a stacked `(x_0..x_{n-1}, y_0..y_{n-1})` solution back into a mesh.
///
/// Pinned vertices are then snapped to their exact targets so that hard
/// constraints hold bit-for-bit regardless of rounding in the solve.
pub fn write_back<M: DeformableMesh + ?Sized>(
    mesh: &mut M,
    solution: &DVector<f64>,
    pins: &[Pin],
) {
    let n = mesh.num_vertices();
    assert_eq!(solution.len(), 2 * n, "solution must have 2N entries");

    for i in 0..n {
        mesh.set_position(i, Point2::new(solution[i], solution[i + n]));
    }
    for pin in pins {
        mesh.set_position(pin.vertex, pin.target);
    }
}

/// Write an `N × 2` solution (one column per coordinate) back into a mesh.
pub fn write_back_columns<M: DeformableMesh + ?Sized>(
    mesh: &mut M,
    solution: &DMatrix<f64>,
    pins: &[Pin],
) {
    let n = mesh.num_vertices();
    assert_eq!(solution.shape(), (n, 2), "solution must be N x 2");

    for i in 0..n {
        mesh.set_position(i, Point2::new(solution[(i, 0)], solution[(i, 1)]));
    }
    for pin in pins {
        mesh.set_position(pin.vertex, pin.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_simple() {
        // [ 4  1 ] [ x ]   [ 1 ]
        // [ 1  3 ] [ y ] = [ 2 ]
        // Solution: x = 1/11, y = 7/11
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);

        let x = solve_dense(a, &b).unwrap();

        assert_relative_eq!(x[0], 1.0 / 11.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 7.0 / 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_needs_pivoting() {
        // Zero in the leading position.
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 3.0, 0.0, 1.0]);
        let expected = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let b = &a * &expected;

        let x = solve_dense(a, &b).unwrap();
        assert_relative_eq!(x, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_reported() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);

        match solve_dense(a, &b) {
            Err(SolveStatus::Singular) | Err(SolveStatus::IllConditioned { .. }) => (),
            other => panic!("Expected a singular status, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_matrix_reported_singular() {
        let a = DMatrix::zeros(3, 3);
        let b = DVector::zeros(3);
        assert_eq!(solve_dense(a, &b).unwrap_err(), SolveStatus::Singular);
    }

    #[test]
    fn test_ill_conditioned_reported() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1e-15]);
        match DenseLu::factorize(a) {
            Err(SolveStatus::IllConditioned { pivot_ratio }) => assert!(pivot_ratio < 1e-12),
            other => panic!("Expected IllConditioned, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_solve_columns_matches_vectors() {
        let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]);
        let rhs = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 2.0, 1.0, 3.0, -1.0]);

        let lu = DenseLu::factorize(a).unwrap();
        assert_eq!(lu.dim(), 3);
        let both = lu.solve_columns(&rhs).unwrap();
        let first = lu.solve_vector(&rhs.column(0).into_owned()).unwrap();

        assert_relative_eq!(both.column(0).into_owned(), first, epsilon = 1e-14);
    }

    #[test]
    #[should_panic(expected = "must match the system")]
    fn test_mismatched_rhs_panics() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]);
        let lu = DenseLu::factorize(a).unwrap();
        let _ = lu.solve_vector(&DVector::zeros(3));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SolveStatus::Singular.to_string(), "system matrix is singular");
        assert_eq!(SolveStatus::NonFinite.to_string(), "solution is not finite");
    }
}
