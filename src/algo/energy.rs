//! Similarity-invariant shape energy and its global assembly.
//!
//! For a triangle with rest corners `(a, b)`, `(c, d)`, `(e, f)` let
//! `Δ = ad - af - bc + be + cf - de` (twice its signed rest area) and let
//! `P⁻¹` be the 3×2 matrix with rows
//!
//! ```text
//! (d - f, e - c) / Δ
//! (f - b, a - e) / Δ
//! (b - d, c - a) / Δ
//! ```
//!
//! If `V` is the 2×3 matrix of current corner coordinates, `B = V P⁻¹` is the
//! linear part of the affine map taking the rest triangle to the current one.
//! The energy
//!
//! ```text
//! E = ‖B‖² - 2 det B = (B₀₀ - B₁₁)² + (B₀₁ + B₁₀)²
//! ```
//!
//! vanishes exactly when `B` is a rotation combined with a uniform scale.
//! Writing the unknowns as `z = (x_p, x_q, x_r, y_p, y_q, y_r)`, `E = zᵀ H z`
//! with
//!
//! ```text
//! H = [ L  -K ]      L = P⁻¹ P⁻¹ᵀ
//!     [ K   L ]      K_ij = P⁻¹_i0 P⁻¹_j1 - P⁻¹_i1 P⁻¹_j0
//! ```
//!
//! `H` is symmetric because `K` is antisymmetric. The global matrix is the sum
//! of these 6×6 blocks scattered to rows/columns `{p, q, r, p+N, q+N, r+N}`.

use nalgebra::{DMatrix, Matrix2, Matrix2x3, Matrix3, Matrix3x2, Matrix6, Point2};
use rayon::prelude::*;

use crate::error::{DeformError, Result};
use crate::mesh::{signed_double_area, DeformableMesh};

/// A triangle's vertex indices together with its rest corners.
pub type RestTriangle = ([usize; 3], [Point2<f64>; 3]);

/// Collect every triangle of a mesh with its rest corners.
pub fn rest_triangles<M: DeformableMesh + ?Sized>(mesh: &M) -> Vec<RestTriangle> {
    (0..mesh.num_triangles())
        .map(|t| {
            let tri = mesh.triangle(t);
            let corners = tri.map(|v| mesh.rest_position(v));
            (tri, corners)
        })
        .collect()
}

/// The 3×2 matrix `P⁻¹` of a rest triangle.
///
/// Returns `None` if the triangle has zero rest area.
pub fn rest_inverse(rest: &[Point2<f64>; 3]) -> Option<Matrix3x2<f64>> {
    let [p0, p1, p2] = rest;
    let delta = signed_double_area(p0, p1, p2);
    if delta == 0.0 || !delta.is_finite() {
        return None;
    }

    let (a, b) = (p0.x, p0.y);
    let (c, d) = (p1.x, p1.y);
    let (e, f) = (p2.x, p2.y);

    #[rustfmt::skip]
    let inv = Matrix3x2::new(
        d - f, e - c,
        f - b, a - e,
        b - d, c - a,
    );
    Some(inv / delta)
}

/// Local 6×6 block `H` of the similarity energy.
///
/// Rows and columns are ordered `(x_p, x_q, x_r, y_p, y_q, y_r)`.
/// Returns `None` for a zero-area rest triangle.
pub fn similarity_block(rest: &[Point2<f64>; 3]) -> Option<Matrix6<f64>> {
    let inv = rest_inverse(rest)?;
    let g0 = inv.column(0);
    let g1 = inv.column(1);

    let l: Matrix3<f64> = inv * inv.transpose();
    let k: Matrix3<f64> = g0 * g1.transpose() - g1 * g0.transpose();

    let mut block = Matrix6::zeros();
    block.fixed_view_mut::<3, 3>(0, 0).copy_from(&l);
    block.fixed_view_mut::<3, 3>(3, 3).copy_from(&l);
    block.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-k));
    block.fixed_view_mut::<3, 3>(3, 0).copy_from(&k);
    Some(block)
}

/// Linear part `B = V P⁻¹` of the map from the rest to the current triangle.
///
/// Returns `None` for a zero-area rest triangle.
pub fn deformation_gradient(
    rest: &[Point2<f64>; 3],
    current: &[Point2<f64>; 3],
) -> Option<Matrix2<f64>> {
    let inv = rest_inverse(rest)?;
    #[rustfmt::skip]
    let v = Matrix2x3::new(
        current[0].x, current[1].x, current[2].x,
        current[0].y, current[1].y, current[2].y,
    );
    Some(v * inv)
}

/// Similarity energy `‖B‖² - 2 det B` of one triangle.
///
/// Zero-area rest triangles contribute nothing.
pub fn triangle_energy(rest: &[Point2<f64>; 3], current: &[Point2<f64>; 3]) -> f64 {
    match deformation_gradient(rest, current) {
        Some(b) => b.norm_squared() - 2.0 * b.determinant(),
        None => 0.0,
    }
}

/// Total similarity energy of a mesh in its current configuration.
pub fn mesh_energy<M: DeformableMesh + ?Sized>(mesh: &M) -> f64 {
    (0..mesh.num_triangles())
        .map(|t| {
            let tri = mesh.triangle(t);
            let rest = tri.map(|v| mesh.rest_position(v));
            let current = tri.map(|v| mesh.position(v));
            triangle_energy(&rest, &current)
        })
        .sum()
}

/// Assemble the unconstrained `2N × 2N` similarity energy matrix.
///
/// Index `i` addresses the x coordinate of vertex `i` and `i + n` its y
/// coordinate. Blocks of triangles sharing a vertex are summed. With
/// `parallel` set the local blocks are computed on the rayon pool; they are
/// always accumulated in triangle order so both paths produce identical
/// matrices.
///
/// # Errors
///
/// Returns [`DeformError::DegenerateTriangle`] if a triangle has zero rest
/// area.
pub fn assemble_similarity(
    n: usize,
    triangles: &[RestTriangle],
    parallel: bool,
) -> Result<DMatrix<f64>> {
    let local = |(ti, (_, rest)): (usize, &RestTriangle)| {
        similarity_block(rest).ok_or_else(|| DeformError::DegenerateTriangle {
            triangle: ti,
            area: signed_double_area(&rest[0], &rest[1], &rest[2]),
        })
    };

    let blocks: Vec<Matrix6<f64>> = if parallel {
        triangles.par_iter().enumerate().map(local).collect::<Result<_>>()?
    } else {
        triangles.iter().enumerate().map(local).collect::<Result<_>>()?
    };

    let mut matrix = DMatrix::zeros(2 * n, 2 * n);
    for ((tri, _), block) in triangles.iter().zip(&blocks) {
        let [p, q, r] = *tri;
        let global = [p, q, r, p + n, q + n, r + n];
        for (li, &gi) in global.iter().enumerate() {
            for (lj, &gj) in global.iter().enumerate() {
                matrix[(gi, gj)] += block[(li, lj)];
            }
        }
    }

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation2, Vector2, Vector6};

    fn sample_triangle() -> [Point2<f64>; 3] {
        [
            Point2::new(0.3, -0.2),
            Point2::new(1.7, 0.1),
            Point2::new(0.6, 1.4),
        ]
    }

    fn flatten(t: &[Point2<f64>; 3]) -> Vector6<f64> {
        Vector6::new(t[0].x, t[1].x, t[2].x, t[0].y, t[1].y, t[2].y)
    }

    fn transform(
        t: &[Point2<f64>; 3],
        angle: f64,
        scale: f64,
        shift: Vector2<f64>,
    ) -> [Point2<f64>; 3] {
        let rot = Rotation2::new(angle);
        t.map(|p| Point2::from(rot * p.coords * scale + shift))
    }

    #[test]
    fn test_rest_inverse_reproduces_identity() {
        let rest = sample_triangle();
        let b = deformation_gradient(&rest, &rest).unwrap();
        assert_relative_eq!(b, Matrix2::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_rest_inverse_rejects_degenerate() {
        let rest = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(3.0, 3.0),
        ];
        assert!(rest_inverse(&rest).is_none());
        assert!(similarity_block(&rest).is_none());
        assert_eq!(triangle_energy(&rest, &rest), 0.0);
    }

    #[test]
    fn test_block_is_symmetric() {
        let block = similarity_block(&sample_triangle()).unwrap();
        assert_relative_eq!(block, block.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_block_matches_closed_form_coefficients() {
        let rest = sample_triangle();
        let (a, b) = (rest[0].x, rest[0].y);
        let (c, d) = (rest[1].x, rest[1].y);
        let (e, f) = (rest[2].x, rest[2].y);
        let delta = a * d - a * f - b * c + b * e + c * f - d * e;
        let det_a2 = delta * delta;

        let block = similarity_block(&rest).unwrap();

        // (x_p, x_p), (x_p, x_q), (x_p, y_q), (x_p, x_r), (x_p, y_r)
        let xx = (c * c - 2.0 * c * e + d * d - 2.0 * d * f + e * e + f * f) / det_a2;
        let xz = (-a * c + a * e - b * d + b * f + c * e + d * f - e * e - f * f) / det_a2;
        let xw = (-a * d + a * f + b * c - b * e - c * f + d * e) / det_a2;
        let xs = (a * c - a * e + b * d - b * f - c * c + c * e - d * d + d * f) / det_a2;
        let xt = delta / det_a2;
        assert_relative_eq!(block[(0, 0)], xx, epsilon = 1e-12);
        assert_relative_eq!(block[(0, 1)], xz, epsilon = 1e-12);
        assert_relative_eq!(block[(0, 4)], xw, epsilon = 1e-12);
        assert_relative_eq!(block[(0, 2)], xs, epsilon = 1e-12);
        assert_relative_eq!(block[(0, 5)], xt, epsilon = 1e-12);

        // (z, z), (z, s) and (s, s) diagonal/off-diagonal terms.
        let zz = (a * a - 2.0 * a * e + b * b - 2.0 * b * f + e * e + f * f) / det_a2;
        let zs = (-a * a + a * c + a * e - b * b + b * d + b * f - c * e - d * f) / det_a2;
        let ss = (a * a - 2.0 * a * c + b * b - 2.0 * b * d + c * c + d * d) / det_a2;
        assert_relative_eq!(block[(1, 1)], zz, epsilon = 1e-12);
        assert_relative_eq!(block[(4, 4)], zz, epsilon = 1e-12);
        assert_relative_eq!(block[(1, 2)], zs, epsilon = 1e-12);
        assert_relative_eq!(block[(2, 2)], ss, epsilon = 1e-12);

        // No x/y coupling at the same vertex.
        for i in 0..3 {
            assert_relative_eq!(block[(i, i + 3)], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_quadratic_form_equals_energy() {
        let rest = sample_triangle();
        let current = [
            Point2::new(0.1, 0.0),
            Point2::new(2.2, 0.5),
            Point2::new(0.4, 1.1),
        ];
        let block = similarity_block(&rest).unwrap();
        let z = flatten(&current);

        let quadratic = z.dot(&(block * z));
        assert_relative_eq!(quadratic, triangle_energy(&rest, &current), epsilon = 1e-10);
        assert!(quadratic > 0.0);
    }

    #[test]
    fn test_energy_vanishes_under_similarity() {
        let rest = sample_triangle();
        let block = similarity_block(&rest).unwrap();

        for &(angle, scale) in &[(0.0, 1.0), (0.7, 1.0), (-2.1, 0.5), (3.0, 2.5)] {
            let moved = transform(&rest, angle, scale, Vector2::new(4.0, -1.5));
            assert_relative_eq!(triangle_energy(&rest, &moved), 0.0, epsilon = 1e-10);

            // The gradient vanishes too, so similarity motions are in the null space.
            let grad = block * flatten(&moved);
            assert_relative_eq!(grad.norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_energy_positive_under_shear() {
        let rest = sample_triangle();
        let sheared = rest.map(|p| Point2::new(p.x + 0.5 * p.y, p.y));
        assert!(triangle_energy(&rest, &sheared) > 1e-3);

        // Reflection is not a similarity in this energy.
        let mirrored = rest.map(|p| Point2::new(-p.x, p.y));
        assert!(triangle_energy(&rest, &mirrored) > 1e-3);
    }

    #[test]
    fn test_assembly_accumulates_shared_vertices() {
        let rest = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let triangles: Vec<RestTriangle> = [[0, 1, 2], [0, 2, 3]]
            .iter()
            .map(|t| (*t, t.map(|v| rest[v])))
            .collect();

        let matrix = assemble_similarity(4, &triangles, false).unwrap();
        assert_eq!(matrix.shape(), (8, 8));
        assert_relative_eq!(matrix, matrix.transpose(), epsilon = 1e-12);

        let b0 = similarity_block(&triangles[0].1).unwrap();
        let b1 = similarity_block(&triangles[1].1).unwrap();
        // Vertex 0 is the first corner of both triangles.
        assert_relative_eq!(matrix[(0, 0)], b0[(0, 0)] + b1[(0, 0)], epsilon = 1e-12);
        // Vertex 1 only belongs to the first triangle.
        assert_relative_eq!(matrix[(1, 1)], b0[(1, 1)], epsilon = 1e-12);
        // Vertices 1 and 3 never share a triangle.
        assert_eq!(matrix[(1, 3)], 0.0);
        assert_eq!(matrix[(1, 7)], 0.0);
    }

    #[test]
    fn test_parallel_assembly_is_identical() {
        let mut rest = Vec::new();
        for j in 0..4 {
            for i in 0..4 {
                rest.push(Point2::new(i as f64 * 0.5, j as f64 * 0.3));
            }
        }
        let mut triangles = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                let v00 = j * 4 + i;
                let tris = [[v00, v00 + 1, v00 + 5], [v00, v00 + 5, v00 + 4]];
                for t in tris {
                    triangles.push((t, t.map(|v| rest[v])));
                }
            }
        }

        let seq = assemble_similarity(16, &triangles, false).unwrap();
        let par = assemble_similarity(16, &triangles, true).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_assembly_reports_degenerate_triangle() {
        let p = Point2::new(1.0, 1.0);
        let triangles = vec![([0, 1, 2], [p, p, Point2::new(2.0, 0.0)])];
        match assemble_similarity(3, &triangles, true) {
            Err(DeformError::DegenerateTriangle { triangle: 0, .. }) => (),
            other => panic!("Expected DegenerateTriangle, got {:?}", other),
        }
    }
}
