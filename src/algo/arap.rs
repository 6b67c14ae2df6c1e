//! As-Rigid-As-Possible (ARAP) deformation.
//!
//! ARAP penalizes the deviation of each triangle's deformation gradient
//! `B = V P⁻¹` from a rotation:
//!
//! ```text
//! E = Σ_t ‖B_t - R_t‖²
//! ```
//!
//! Unlike the similarity energy it also resists uniform scaling. The
//! algorithm alternates between:
//! 1. **Global step**: for fixed rotations, solve the `N × N` system
//!    `(Σ P⁻¹ P⁻¹ᵀ) X = Σ P⁻¹ Rᵀ` for both coordinates at once
//! 2. **Local step**: replace each `R_t` by the rotation closest to `B_t`
//!
//! Rotations start at the identity, so a single iteration moves the mesh
//! toward the pinned positions without rotating triangles. The system matrix
//! only depends on the rest shape and the pin set, so it is factorized once
//! per deformation and reused across iterations.
//!
//! # References
//!
//! - Liu, L., Zhang, L., Xu, Y., Gotsman, C., & Gortler, S. J. (2008).
//!   "A Local/Global Approach to Mesh Parameterization." SGP 2008.
//! - Igarashi, T., Moscovich, T., & Hughes, J. F. (2005).
//!   "As-Rigid-As-Possible Shape Manipulation." SIGGRAPH 2005.

use nalgebra::{DMatrix, Matrix2, Matrix2x3, Matrix3x2};
use rayon::prelude::*;

use super::constraints::{apply_targets, incorporate_columns, Pin};
use super::energy::{rest_inverse, RestTriangle};
use super::solver::{DenseLu, SolveStatus};
use crate::error::{DeformError, Result};
use crate::mesh::signed_double_area;

/// Precomputed rest-state data for ARAP solves on one mesh topology.
#[derive(Debug, Clone)]
pub struct ArapSystem {
    triangles: Vec<[usize; 3]>,
    inverses: Vec<Matrix3x2<f64>>,
    laplacian: DMatrix<f64>,
}

impl ArapSystem {
    /// Precompute `P⁻¹` for every triangle and the unconstrained `N × N` matrix.
    ///
    /// # Errors
    ///
    /// Returns [`DeformError::DegenerateTriangle`] if a triangle has zero rest
    /// area.
    pub fn new(n: usize, triangles: &[RestTriangle]) -> Result<Self> {
        let mut inverses = Vec::with_capacity(triangles.len());
        let mut laplacian = DMatrix::zeros(n, n);

        for (ti, (tri, rest)) in triangles.iter().enumerate() {
            let inv = rest_inverse(rest).ok_or_else(|| DeformError::DegenerateTriangle {
                triangle: ti,
                area: signed_double_area(&rest[0], &rest[1], &rest[2]),
            })?;

            let local = inv * inv.transpose();
            for (li, &gi) in tri.iter().enumerate() {
                for (lj, &gj) in tri.iter().enumerate() {
                    laplacian[(gi, gj)] += local[(li, lj)];
                }
            }
            inverses.push(inv);
        }

        Ok(Self {
            triangles: triangles.iter().map(|(tri, _)| *tri).collect(),
            inverses,
            laplacian,
        })
    }

    /// Number of vertices of the system.
    pub fn num_vertices(&self) -> usize {
        self.laplacian.nrows()
    }

    /// The unconstrained `N × N` matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.laplacian
    }

    /// Run `iterations` global/local rounds with the given pins.
    ///
    /// Returns the `N × 2` matrix of new positions (x in column 0, y in
    /// column 1).
    ///
    /// # Errors
    ///
    /// Returns the solver status if the pinned system cannot be solved.
    pub fn solve(
        &self,
        pins: &[Pin],
        iterations: usize,
        parallel: bool,
    ) -> std::result::Result<DMatrix<f64>, SolveStatus> {
        let identity = vec![Matrix2::identity(); self.triangles.len()];
        let mut rhs = self.rotation_rhs(&identity);

        let mut matrix = self.laplacian.clone();
        incorporate_columns(&mut matrix, &mut rhs, pins);
        let lu = DenseLu::factorize(matrix)?;

        let mut solution = lu.solve_columns(&rhs)?;
        for _ in 1..iterations {
            let rotations = self.local_rotations(&solution, parallel);
            let mut rhs = self.rotation_rhs(&rotations);
            apply_targets(&mut rhs, pins);
            solution = lu.solve_columns(&rhs)?;
        }

        Ok(solution)
    }

    /// ARAP energy of a configuration, using the best-fit rotation per triangle.
    pub fn energy(&self, positions: &DMatrix<f64>) -> f64 {
        self.triangles
            .iter()
            .zip(&self.inverses)
            .map(|(tri, inv)| {
                let b = gradient(positions, tri, inv);
                (b - closest_rotation(&b)).norm_squared()
            })
            .sum()
    }

    /// Local step: best-fit rotation of each triangle's deformation gradient.
    fn local_rotations(&self, positions: &DMatrix<f64>, parallel: bool) -> Vec<Matrix2<f64>> {
        let fit = |(tri, inv): (&[usize; 3], &Matrix3x2<f64>)| {
            closest_rotation(&gradient(positions, tri, inv))
        };

        if parallel {
            self.triangles
                .par_iter()
                .zip(self.inverses.par_iter())
                .map(fit)
                .collect()
        } else {
            self.triangles.iter().zip(&self.inverses).map(fit).collect()
        }
    }

    /// Right-hand side `Σ P⁻¹ Rᵀ` scattered to the triangle's vertices.
    fn rotation_rhs(&self, rotations: &[Matrix2<f64>]) -> DMatrix<f64> {
        let mut rhs = DMatrix::zeros(self.num_vertices(), 2);
        for ((tri, inv), rot) in self.triangles.iter().zip(&self.inverses).zip(rotations) {
            let local = inv * rot.transpose();
            for (k, &v) in tri.iter().enumerate() {
                rhs[(v, 0)] += local[(k, 0)];
                rhs[(v, 1)] += local[(k, 1)];
            }
        }
        rhs
    }
}

/// Deformation gradient of a triangle in an `N × 2` position matrix.
fn gradient(positions: &DMatrix<f64>, tri: &[usize; 3], inv: &Matrix3x2<f64>) -> Matrix2<f64> {
    let [p, q, r] = *tri;
    #[rustfmt::skip]
    let v = Matrix2x3::new(
        positions[(p, 0)], positions[(q, 0)], positions[(r, 0)],
        positions[(p, 1)], positions[(q, 1)], positions[(r, 1)],
    );
    v * inv
}

/// Find the closest rotation matrix to a given matrix using SVD.
///
/// Reflections are turned into proper rotations by flipping the direction
/// of the smallest singular vector.
pub fn closest_rotation(m: &Matrix2<f64>) -> Matrix2<f64> {
    // R = U * V^T where M = U * S * V^T
    let svd = m.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Matrix2::identity(),
    };

    let r = u * v_t;
    if r.determinant() >= 0.0 {
        return r;
    }

    let mut u_fixed = u;
    u_fixed[(0, 1)] = -u_fixed[(0, 1)];
    u_fixed[(1, 1)] = -u_fixed[(1, 1)];
    u_fixed * v_t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Rotation2};

    fn create_grid(n: usize) -> (usize, Vec<RestTriangle>) {
        let mut rest = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                rest.push(Point2::new(i as f64, j as f64));
            }
        }

        let mut triangles = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v10 = v00 + 1;
                let v01 = v00 + (n + 1);
                let v11 = v01 + 1;
                for t in [[v00, v10, v11], [v00, v11, v01]] {
                    triangles.push((t, t.map(|v| rest[v])));
                }
            }
        }
        (rest.len(), triangles)
    }

    fn rest_matrix(n: usize) -> DMatrix<f64> {
        let mut m = DMatrix::zeros((n + 1) * (n + 1), 2);
        for j in 0..=n {
            for i in 0..=n {
                m[(j * (n + 1) + i, 0)] = i as f64;
                m[(j * (n + 1) + i, 1)] = j as f64;
            }
        }
        m
    }

    #[test]
    fn test_closest_rotation() {
        // Identity should give identity
        let m = Matrix2::identity();
        let r = closest_rotation(&m);
        assert_relative_eq!(r, Matrix2::identity(), epsilon = 1e-10);

        // Scaled rotation should give just rotation
        let angle: f64 = 0.5;
        let rot = Matrix2::new(angle.cos(), -angle.sin(), angle.sin(), angle.cos());
        let scaled = 2.0 * rot;
        let r = closest_rotation(&scaled);
        assert_relative_eq!(r, rot, epsilon = 1e-10);
    }

    #[test]
    fn test_closest_rotation_of_reflection() {
        let reflection = Matrix2::new(-1.0, 0.0, 0.0, 1.0);
        let r = closest_rotation(&reflection);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(r * r.transpose(), Matrix2::identity(), epsilon = 1e-10);
    }

    #[test]
    fn test_laplacian_rows_sum_to_zero() {
        let (n, triangles) = create_grid(2);
        let system = ArapSystem::new(n, &triangles).unwrap();

        let m = system.matrix();
        assert_relative_eq!(m, &m.transpose(), epsilon = 1e-12);
        for i in 0..n {
            assert_relative_eq!(m.row(i).sum(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rest_pins_reproduce_rest_shape() {
        let (n, triangles) = create_grid(3);
        let system = ArapSystem::new(n, &triangles).unwrap();
        let rest = rest_matrix(3);

        let pins = [
            Pin { vertex: 0, target: Point2::new(0.0, 0.0) },
            Pin { vertex: 15, target: Point2::new(3.0, 3.0) },
        ];
        let solution = system.solve(&pins, 3, false).unwrap();

        assert_relative_eq!(solution, rest, epsilon = 1e-9);
        assert_relative_eq!(system.energy(&solution), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_translation_moves_mesh_rigidly() {
        let (n, triangles) = create_grid(2);
        let system = ArapSystem::new(n, &triangles).unwrap();

        let pins = [
            Pin { vertex: 0, target: Point2::new(0.5, -1.0) },
            Pin { vertex: 5, target: Point2::new(2.5, 0.0) },
        ];
        let solution = system.solve(&pins, 1, false).unwrap();

        let mut expected = rest_matrix(2);
        expected.column_mut(0).add_scalar_mut(0.5);
        expected.column_mut(1).add_scalar_mut(-1.0);
        assert_relative_eq!(solution, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_iterations_reduce_energy() {
        let (n, triangles) = create_grid(2);
        let system = ArapSystem::new(n, &triangles).unwrap();

        // Rotate the two opposite corners a quarter turn about the center.
        let rot = Rotation2::new(std::f64::consts::FRAC_PI_2);
        let center = Point2::new(1.0, 1.0);
        let turn = |p: Point2<f64>| center + rot * (p - center);
        let pins = [
            Pin { vertex: 0, target: turn(Point2::new(0.0, 0.0)) },
            Pin { vertex: 8, target: turn(Point2::new(2.0, 2.0)) },
        ];

        let one = system.solve(&pins, 1, false).unwrap();
        let many = system.solve(&pins, 10, false).unwrap();

        let e_one = system.energy(&one);
        let e_many = system.energy(&many);
        assert!(e_one > 1e-6, "identity rotations cannot fit a quarter turn");
        assert!(e_many <= e_one + 1e-12);
    }

    #[test]
    fn test_parallel_local_step_matches_sequential() {
        let (n, triangles) = create_grid(3);
        let system = ArapSystem::new(n, &triangles).unwrap();
        let pins = [
            Pin { vertex: 0, target: Point2::new(0.0, 0.0) },
            Pin { vertex: 15, target: Point2::new(2.0, 4.0) },
        ];

        let seq = system.solve(&pins, 4, false).unwrap();
        let par = system.solve(&pins, 4, true).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_no_pins_is_singular() {
        let (n, triangles) = create_grid(1);
        let system = ArapSystem::new(n, &triangles).unwrap();
        assert!(system.solve(&[], 1, false).is_err());
    }
}
