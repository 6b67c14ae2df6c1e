//! Mesh construction utilities.
//!
//! This module builds [`ImageMesh`] values either from explicit
//! vertex/triangle lists or as a regular grid laid over an image. All rest
//! geometry is validated here, so the solvers never see a degenerate
//! triangle.

use nalgebra::Point2;

use super::image_mesh::ImageMesh;
use super::index::{MeshIndex, VertexId};
use super::{first_unreferenced_vertex, signed_double_area};
use crate::error::{DeformError, Result};

/// Fraction of the smaller grid cell side used as default pick radius.
const DEFAULT_PICK_FRACTION: f64 = 0.5;

/// Build an image mesh from rest positions and triangles.
///
/// The current positions start at the rest positions and no vertex is
/// pinned. The pick radius defaults to half the shortest triangle edge.
///
/// # Errors
///
/// Returns an error if:
/// - there are no vertices or no triangles
/// - a triangle references a vertex out of range
/// - a triangle repeats a vertex or has zero rest area
/// - a vertex, including the anchor, is not used by any triangle
/// - there are more vertices or triangles than the index type can address
///
/// # Example
/// ```
/// use simdeform::mesh::{build_from_triangles, ImageMesh};
/// use nalgebra::Point2;
///
/// let vertices = vec![
///     Point2::new(0.0, 0.0),
///     Point2::new(1.0, 0.0),
///     Point2::new(1.0, 1.0),
///     Point2::new(0.0, 1.0),
/// ];
/// let triangles = vec![[0, 1, 2], [0, 2, 3]];
///
/// let mesh: ImageMesh = build_from_triangles(&vertices, &triangles).unwrap();
/// assert_eq!(mesh.num_vertices(), 4);
/// assert_eq!(mesh.num_triangles(), 2);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point2<f64>],
    triangles: &[[usize; 3]],
) -> Result<ImageMesh<I>> {
    if vertices.is_empty() {
        return Err(DeformError::EmptyMesh("vertices"));
    }
    if triangles.is_empty() {
        return Err(DeformError::EmptyMesh("triangles"));
    }
    if vertices.len() > I::MAX.to_usize() {
        return Err(DeformError::TooManyVertices {
            vertices: vertices.len(),
            max: I::MAX.to_usize(),
        });
    }
    if triangles.len() > I::MAX.to_usize() {
        return Err(DeformError::invalid_param(
            "triangles",
            triangles.len(),
            "too many for the index type",
        ));
    }

    let mut shortest_edge = f64::INFINITY;

    for (ti, tri) in triangles.iter().enumerate() {
        for &vi in tri {
            if vi >= vertices.len() {
                return Err(DeformError::InvalidTriangleIndex {
                    triangle: ti,
                    vertex: vi,
                });
            }
        }

        let [p, q, r] = *tri;
        let area = signed_double_area(&vertices[p], &vertices[q], &vertices[r]);
        if p == q || q == r || p == r || area == 0.0 || !area.is_finite() {
            return Err(DeformError::DegenerateTriangle { triangle: ti, area });
        }

        for (a, b) in [(p, q), (q, r), (r, p)] {
            shortest_edge = shortest_edge.min((vertices[b] - vertices[a]).norm());
        }
    }

    if let Some(v) = first_unreferenced_vertex(vertices.len(), triangles.iter().copied()) {
        return Err(DeformError::UnreferencedVertex(v));
    }

    let triangles = triangles
        .iter()
        .map(|t| [VertexId::new(t[0]), VertexId::new(t[1]), VertexId::new(t[2])])
        .collect();

    Ok(ImageMesh {
        rest: vertices.to_vec(),
        positions: vertices.to_vec(),
        triangles,
        pinned: Vec::new(),
        pick_radius: shortest_edge * DEFAULT_PICK_FRACTION,
    })
}

/// Options for [`build_grid`].
#[derive(Debug, Clone)]
pub struct GridOptions {
    /// Width of the covered image.
    pub width: f64,

    /// Height of the covered image.
    pub height: f64,

    /// Number of cells along x.
    pub horizontal_divisions: usize,

    /// Number of cells along y.
    pub vertical_divisions: usize,

    /// Pick radius for vertex selection. Defaults to half the smaller cell side.
    pub pick_radius: Option<f64>,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self::new(1.0, 1.0, 15, 15)
    }
}

impl GridOptions {
    /// Create grid options for an image of the given size and division counts.
    pub fn new(
        width: f64,
        height: f64,
        horizontal_divisions: usize,
        vertical_divisions: usize,
    ) -> Self {
        Self {
            width,
            height,
            horizontal_divisions,
            vertical_divisions,
            pick_radius: None,
        }
    }

    /// Set the pick radius.
    pub fn with_pick_radius(mut self, radius: f64) -> Self {
        self.pick_radius = Some(radius);
        self
    }

    /// Number of vertices the grid will have.
    pub fn num_vertices(&self) -> usize {
        (self.horizontal_divisions + 1) * (self.vertical_divisions + 1)
    }

    fn validate(&self) -> Result<()> {
        if !(self.width > 0.0 && self.width.is_finite()) {
            return Err(DeformError::invalid_param("width", self.width, "must be positive"));
        }
        if !(self.height > 0.0 && self.height.is_finite()) {
            return Err(DeformError::invalid_param("height", self.height, "must be positive"));
        }
        if self.horizontal_divisions == 0 {
            return Err(DeformError::invalid_param(
                "horizontal_divisions",
                0,
                "must be at least 1",
            ));
        }
        if self.vertical_divisions == 0 {
            return Err(DeformError::invalid_param(
                "vertical_divisions",
                0,
                "must be at least 1",
            ));
        }
        if let Some(r) = self.pick_radius {
            if !(r > 0.0 && r.is_finite()) {
                return Err(DeformError::invalid_param("pick_radius", r, "must be positive"));
            }
        }
        Ok(())
    }
}

/// Build a regular grid mesh covering an image centered on the origin.
///
/// Vertices are laid out row by row from the bottom: vertex `j * (h + 1) + i`
/// sits at column `i`, row `j`. Vertex 0 is therefore the lower-left corner,
/// which serves as the anchor. Each cell is split into two counter-clockwise
/// triangles.
///
/// # Example
/// ```
/// use simdeform::mesh::{build_grid, GridOptions, ImageMesh};
///
/// let mesh: ImageMesh = build_grid(&GridOptions::new(4.0, 3.0, 4, 3)).unwrap();
/// assert_eq!(mesh.num_vertices(), 20);
/// assert_eq!(mesh.num_triangles(), 24);
/// ```
pub fn build_grid<I: MeshIndex>(options: &GridOptions) -> Result<ImageMesh<I>> {
    options.validate()?;

    let h = options.horizontal_divisions;
    let v = options.vertical_divisions;
    let dx = options.width / h as f64;
    let dy = options.height / v as f64;
    let x0 = -options.width / 2.0;
    let y0 = -options.height / 2.0;

    let mut vertices = Vec::with_capacity(options.num_vertices());
    for j in 0..=v {
        for i in 0..=h {
            vertices.push(Point2::new(x0 + i as f64 * dx, y0 + j as f64 * dy));
        }
    }

    let mut triangles = Vec::with_capacity(h * v * 2);
    for j in 0..v {
        for i in 0..h {
            let v00 = j * (h + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (h + 1);
            let v11 = v01 + 1;

            triangles.push([v00, v10, v11]);
            triangles.push([v00, v11, v01]);
        }
    }

    let mut mesh = build_from_triangles(&vertices, &triangles)?;
    mesh.pick_radius = options
        .pick_radius
        .unwrap_or(dx.min(dy) * DEFAULT_PICK_FRACTION);
    Ok(mesh)
}
