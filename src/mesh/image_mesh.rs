//! The image mesh: a 2D triangle mesh with rest and current positions.

use nalgebra::Point2;

use super::index::{MeshIndex, TriangleId, VertexId};
use super::{DeformableMesh, ANCHOR_VERTEX};
use crate::error::{DeformError, Result};

/// A 2D triangle mesh overlaid on an image.
///
/// Each vertex has a rest position (fixed at construction) and a current
/// position (updated by dragging and by the solvers). The triangle list is
/// fixed. The pinned set records which vertices are currently held by the
/// user, in the order they were grabbed.
///
/// Meshes are created with [`build_from_triangles`](super::build_from_triangles)
/// or [`build_grid`](super::build_grid), which validate the rest geometry.
#[derive(Debug, Clone)]
pub struct ImageMesh<I: MeshIndex = u32> {
    pub(crate) rest: Vec<Point2<f64>>,
    pub(crate) positions: Vec<Point2<f64>>,
    pub(crate) triangles: Vec<[VertexId<I>; 3]>,
    pub(crate) pinned: Vec<usize>,
    pub(crate) pick_radius: f64,
}

impl<I: MeshIndex> ImageMesh<I> {
    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.rest.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Iterate over all vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        (0..self.rest.len()).map(VertexId::new)
    }

    /// Iterate over all triangle IDs.
    pub fn triangle_ids(&self) -> impl Iterator<Item = TriangleId<I>> + '_ {
        (0..self.triangles.len()).map(TriangleId::new)
    }

    /// The three vertices of a triangle.
    #[inline]
    pub fn triangle_vertices(&self, t: TriangleId<I>) -> [VertexId<I>; 3] {
        self.triangles[t.index()]
    }

    /// Rest position of a vertex.
    #[inline]
    pub fn vertex_rest_position(&self, v: VertexId<I>) -> Point2<f64> {
        self.rest[v.index()]
    }

    /// Current position of a vertex.
    #[inline]
    pub fn vertex_position(&self, v: VertexId<I>) -> Point2<f64> {
        self.positions[v.index()]
    }

    /// Overwrite the current position of a vertex.
    #[inline]
    pub fn set_vertex_position(&mut self, v: VertexId<I>, p: Point2<f64>) {
        self.positions[v.index()] = p;
    }

    /// All rest positions, indexed by vertex.
    pub fn rest_positions(&self) -> &[Point2<f64>] {
        &self.rest
    }

    /// All current positions, indexed by vertex.
    pub fn positions(&self) -> &[Point2<f64>] {
        &self.positions
    }

    /// Radius used by [`nearest_vertex`](Self::nearest_vertex) when no
    /// explicit distance is given.
    pub fn pick_radius(&self) -> f64 {
        self.pick_radius
    }

    /// Set the default pick radius.
    pub fn set_pick_radius(&mut self, radius: f64) -> Result<()> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(DeformError::invalid_param(
                "pick_radius",
                radius,
                "must be positive and finite",
            ));
        }
        self.pick_radius = radius;
        Ok(())
    }

    /// The anchor vertex.
    pub fn anchor(&self) -> VertexId<I> {
        VertexId::new(ANCHOR_VERTEX)
    }

    /// Turn a raw index, e.g. from user input, into a vertex id of this mesh.
    ///
    /// # Errors
    ///
    /// Returns [`DeformError::InvalidVertexIndex`] if `index` is out of range.
    pub fn vertex_id(&self, index: usize) -> Result<VertexId<I>> {
        match VertexId::try_new(index) {
            Some(v) if index < self.rest.len() => Ok(v),
            _ => Err(DeformError::InvalidVertexIndex {
                index,
                vertex_count: self.rest.len(),
            }),
        }
    }

    fn check_vertex(&self, v: VertexId<I>) -> Result<usize> {
        let index = v.index();
        if !v.is_valid() || index >= self.rest.len() {
            return Err(DeformError::InvalidVertexIndex {
                index,
                vertex_count: self.rest.len(),
            });
        }
        Ok(index)
    }

    // ==================== Selection ====================

    /// Pin a vertex (the user started dragging it).
    ///
    /// Returns `Ok(false)` if the vertex was already pinned.
    ///
    /// # Errors
    ///
    /// Fails if the index is out of range or names the anchor vertex.
    pub fn pin(&mut self, v: VertexId<I>) -> Result<bool> {
        let index = self.check_vertex(v)?;
        if index == ANCHOR_VERTEX {
            return Err(DeformError::AnchorNotSelectable(index));
        }
        if self.pinned.contains(&index) {
            return Ok(false);
        }
        self.pinned.push(index);
        Ok(true)
    }

    /// Unpin a vertex (the user released it).
    ///
    /// Returns `false` if the vertex was not pinned. Remaining pins keep
    /// their relative order.
    pub fn unpin(&mut self, v: VertexId<I>) -> bool {
        let index = v.index();
        match self.pinned.iter().position(|&p| p == index) {
            Some(slot) => {
                self.pinned.remove(slot);
                true
            }
            None => false,
        }
    }

    /// Release every pin.
    pub fn clear_pins(&mut self) {
        self.pinned.clear();
    }

    /// Whether a vertex is currently pinned.
    pub fn is_pinned(&self, v: VertexId<I>) -> bool {
        self.pinned.contains(&v.index())
    }

    /// Number of pinned vertices.
    pub fn num_pinned(&self) -> usize {
        self.pinned.len()
    }

    /// Pinned vertices in pin order.
    pub fn pinned_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.pinned.iter().map(|&i| VertexId::new(i))
    }

    /// Move a pinned vertex to the position requested by the user.
    ///
    /// The rest of the mesh follows on the next
    /// [`Deformer::deform`](crate::algo::Deformer::deform).
    pub fn drag(&mut self, v: VertexId<I>, target: Point2<f64>) -> Result<()> {
        let index = self.check_vertex(v)?;
        if !self.pinned.contains(&index) {
            return Err(DeformError::NotPinned(index));
        }
        self.positions[index] = target;
        Ok(())
    }

    /// Find the vertex closest to `p` among user-selectable vertices.
    ///
    /// The anchor vertex is never returned. Only vertices strictly closer
    /// than `max_distance` (or the mesh pick radius if `None`) qualify.
    pub fn nearest_vertex(&self, p: Point2<f64>, max_distance: Option<f64>) -> Option<VertexId<I>> {
        let mut best = max_distance.unwrap_or(self.pick_radius);
        let mut nearest = None;

        for (i, q) in self.positions.iter().enumerate() {
            if i == ANCHOR_VERTEX {
                continue;
            }
            let d = (q - p).norm();
            if d < best {
                best = d;
                nearest = Some(VertexId::new(i));
            }
        }

        nearest
    }

    // ==================== Whole-mesh operations ====================

    /// Restore every vertex to its rest position and release all pins.
    pub fn reset(&mut self) {
        self.positions.copy_from_slice(&self.rest);
        self.pinned.clear();
    }

    /// Axis-aligned bounding box of the current positions.
    pub fn bounding_box(&self) -> (Point2<f64>, Point2<f64>) {
        let mut min = self.positions[0];
        let mut max = self.positions[0];

        for p in &self.positions[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }

        (min, max)
    }

    /// Move current positions a fraction `t` of the way towards `target`.
    ///
    /// `t` is clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Fails if `target` has a different number of vertices or triangles.
    pub fn interpolate_towards(&mut self, target: &ImageMesh<I>, t: f64) -> Result<()> {
        if target.num_vertices() != self.num_vertices()
            || target.num_triangles() != self.num_triangles()
        {
            return Err(DeformError::TopologyMismatch {
                expected_vertices: self.num_vertices(),
                expected_triangles: self.num_triangles(),
                vertices: target.num_vertices(),
                triangles: target.num_triangles(),
            });
        }

        let t = t.clamp(0.0, 1.0);
        for (p, q) in self.positions.iter_mut().zip(&target.positions) {
            *p += (q - *p) * t;
        }
        Ok(())
    }

    /// Check internal consistency of the pinned set.
    ///
    /// Pins must be in range, distinct, and never name the anchor.
    pub fn is_valid(&self) -> bool {
        let n = self.rest.len();
        if self.positions.len() != n {
            return false;
        }
        for (k, &i) in self.pinned.iter().enumerate() {
            if i >= n || i == ANCHOR_VERTEX || self.pinned[..k].contains(&i) {
                return false;
            }
        }
        true
    }
}

impl<I: MeshIndex> DeformableMesh for ImageMesh<I> {
    #[inline]
    fn num_vertices(&self) -> usize {
        self.rest.len()
    }

    #[inline]
    fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    fn triangle(&self, t: usize) -> [usize; 3] {
        let [p, q, r] = self.triangles[t];
        [p.index(), q.index(), r.index()]
    }

    #[inline]
    fn rest_position(&self, v: usize) -> Point2<f64> {
        self.rest[v]
    }

    #[inline]
    fn position(&self, v: usize) -> Point2<f64> {
        self.positions[v]
    }

    #[inline]
    fn set_position(&mut self, v: usize, p: Point2<f64>) {
        self.positions[v] = p;
    }

    #[inline]
    fn pinned(&self) -> &[usize] {
        &self.pinned
    }
}
