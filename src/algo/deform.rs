//! Interactive deformation driver.
//!
//! A [`Deformer`] is built once for a mesh topology and then asked to
//! [`deform`](Deformer::deform) the mesh every time the user moves a pinned
//! vertex. Each request resolves the current pins, constrains a fresh copy
//! of the system matrix, solves it and writes the new positions back.
//!
//! # Example
//!
//! ```
//! use simdeform::prelude::*;
//! use nalgebra::Point2;
//!
//! let mut mesh: ImageMesh = build_grid(&GridOptions::new(2.0, 2.0, 4, 4)).unwrap();
//! let mut deformer = Deformer::new(&mesh, DeformOptions::default()).unwrap();
//!
//! let corner = VertexId::new(24);
//! mesh.pin(corner).unwrap();
//! mesh.drag(corner, Point2::new(1.5, 1.0)).unwrap();
//!
//! let outcome = deformer.deform(&mut mesh).unwrap();
//! assert!(outcome.is_solved());
//! ```

use std::time::{Duration, Instant};

use nalgebra::DMatrix;

use super::arap::ArapSystem;
use super::constraints::{incorporate, resolve_pins, Pin};
use super::energy::{
    assemble_similarity, mesh_energy, rest_inverse, rest_triangles, RestTriangle,
};
use super::solver::{solve_dense, write_back, write_back_columns, SolveStatus};
use crate::error::{DeformError, Result};
use crate::mesh::{first_unreferenced_vertex, signed_double_area, DeformableMesh};

/// Default upper bound on the number of mesh vertices.
///
/// The dense system has `(2N)²` entries, so this keeps a solve within
/// interactive rates.
pub const DEFAULT_MAX_VERTICES: usize = 1000;

/// Shape energy minimized by the deformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnergyModel {
    /// Triangles may rotate and scale uniformly at no cost.
    #[default]
    Similarity,
    /// Triangles may only rotate at no cost.
    Arap,
}

/// Options for [`Deformer`].
#[derive(Debug, Clone)]
pub struct DeformOptions {
    /// Energy to minimize.
    pub energy: EnergyModel,

    /// Largest mesh the deformer accepts.
    pub max_vertices: usize,

    /// Number of local/global rounds per ARAP deformation.
    pub arap_iterations: usize,

    /// Compute per-triangle data on the rayon thread pool.
    pub parallel: bool,

    /// Keep the unconstrained system between deformations instead of
    /// rebuilding it every time.
    pub cache_system: bool,
}

impl Default for DeformOptions {
    fn default() -> Self {
        Self {
            energy: EnergyModel::Similarity,
            max_vertices: DEFAULT_MAX_VERTICES,
            arap_iterations: 1,
            parallel: true,
            cache_system: true,
        }
    }
}

impl DeformOptions {
    /// Set the energy model.
    pub fn with_energy(mut self, energy: EnergyModel) -> Self {
        self.energy = energy;
        self
    }

    /// Set the vertex budget.
    pub fn with_max_vertices(mut self, max_vertices: usize) -> Self {
        self.max_vertices = max_vertices;
        self
    }

    /// Set the number of ARAP iterations.
    pub fn with_arap_iterations(mut self, iterations: usize) -> Self {
        self.arap_iterations = iterations;
        self
    }

    /// Enable or disable parallel per-triangle work.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable or disable caching of the unconstrained system.
    pub fn with_cache_system(mut self, cache: bool) -> Self {
        self.cache_system = cache;
        self
    }

    /// Check that the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_vertices == 0 {
            return Err(DeformError::invalid_param(
                "max_vertices",
                self.max_vertices,
                "must be at least 1",
            ));
        }
        if self.arap_iterations == 0 {
            return Err(DeformError::invalid_param(
                "arap_iterations",
                self.arap_iterations,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Result of a deformation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeformOutcome {
    /// New positions were written to the mesh.
    Solved,
    /// Nothing is pinned, the mesh was left untouched.
    NoConstraints,
    /// The system could not be solved; the previous positions were kept.
    Skipped(SolveStatus),
}

impl DeformOutcome {
    /// Whether new positions were written.
    pub fn is_solved(&self) -> bool {
        matches!(self, DeformOutcome::Solved)
    }

    /// Turn a skipped frame into an error.
    pub fn into_result(self) -> Result<()> {
        match self {
            DeformOutcome::Solved | DeformOutcome::NoConstraints => Ok(()),
            DeformOutcome::Skipped(status) => Err(DeformError::SolveFailed(status)),
        }
    }
}

/// Counters collected across deformations.
#[derive(Debug, Clone, Default)]
pub struct DeformStats {
    /// Successful solves.
    pub solves: usize,
    /// Requests skipped because the system could not be solved.
    pub failures: usize,
    /// Wall time of the most recent solve attempt.
    pub last_duration: Option<Duration>,
}

/// Solves deformation requests for one mesh topology.
///
/// The deformer never holds on to the mesh. It remembers the vertex and
/// triangle counts it was built for and rejects other meshes.
#[derive(Debug)]
pub struct Deformer {
    options: DeformOptions,
    num_vertices: usize,
    num_triangles: usize,
    rest: Vec<RestTriangle>,
    similarity: Option<DMatrix<f64>>,
    arap: Option<ArapSystem>,
    stats: DeformStats,
}

impl Deformer {
    /// Prepare a deformer for `mesh`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the options are invalid
    /// - the mesh is empty or larger than `options.max_vertices`
    /// - a triangle references a missing vertex or has zero rest area
    /// - a vertex is not used by any triangle
    pub fn new<M: DeformableMesh + ?Sized>(mesh: &M, options: DeformOptions) -> Result<Self> {
        options.validate()?;

        let n = mesh.num_vertices();
        if n == 0 {
            return Err(DeformError::EmptyMesh("vertices"));
        }
        if mesh.num_triangles() == 0 {
            return Err(DeformError::EmptyMesh("triangles"));
        }
        if n > options.max_vertices {
            return Err(DeformError::TooManyVertices {
                vertices: n,
                max: options.max_vertices,
            });
        }

        for ti in 0..mesh.num_triangles() {
            if let Some(&vertex) = mesh.triangle(ti).iter().find(|&&v| v >= n) {
                return Err(DeformError::InvalidTriangleIndex { triangle: ti, vertex });
            }
        }
        let triangles = (0..mesh.num_triangles()).map(|t| mesh.triangle(t));
        if let Some(v) = first_unreferenced_vertex(n, triangles) {
            return Err(DeformError::UnreferencedVertex(v));
        }

        let rest = rest_triangles(mesh);
        for (ti, (_, corners)) in rest.iter().enumerate() {
            if rest_inverse(corners).is_none() {
                return Err(DeformError::DegenerateTriangle {
                    triangle: ti,
                    area: signed_double_area(&corners[0], &corners[1], &corners[2]),
                });
            }
        }

        let (similarity, arap) = match (options.cache_system, options.energy) {
            (false, _) => (None, None),
            (true, EnergyModel::Similarity) => {
                (Some(assemble_similarity(n, &rest, options.parallel)?), None)
            }
            (true, EnergyModel::Arap) => (None, Some(ArapSystem::new(n, &rest)?)),
        };

        log::info!(
            "Deformer ready: {} vertices, {} triangles, {:?} energy",
            n,
            rest.len(),
            options.energy
        );

        Ok(Self {
            options,
            num_vertices: n,
            num_triangles: rest.len(),
            rest,
            similarity,
            arap,
            stats: DeformStats::default(),
        })
    }

    /// Recompute the mesh positions from its pinned vertices.
    ///
    /// Unpinned positions are derived from the pins and the rest shape only,
    /// so repeating a request with unchanged pins gives identical results.
    ///
    /// # Errors
    ///
    /// Returns [`DeformError::TopologyMismatch`] if `mesh` is not the mesh
    /// this deformer was built for. A system that cannot be solved is not an
    /// error; it is reported as [`DeformOutcome::Skipped`].
    pub fn deform<M: DeformableMesh + ?Sized>(&mut self, mesh: &mut M) -> Result<DeformOutcome> {
        self.check_topology(mesh)?;

        let pins = resolve_pins(mesh);
        if pins.is_empty() {
            return Ok(DeformOutcome::NoConstraints);
        }

        let start = Instant::now();
        let status = match self.options.energy {
            EnergyModel::Similarity => self.solve_similarity(mesh, &pins)?,
            EnergyModel::Arap => self.solve_arap(mesh, &pins)?,
        };
        let elapsed = start.elapsed();
        self.stats.last_duration = Some(elapsed);

        match status {
            Ok(()) => {
                self.stats.solves += 1;
                log::debug!(
                    "Solved {} unknowns with {} pins in {:?}",
                    self.num_unknowns(),
                    pins.len(),
                    elapsed
                );
                Ok(DeformOutcome::Solved)
            }
            Err(status) => {
                self.stats.failures += 1;
                log::warn!("Skipping deformation with {} pins: {}", pins.len(), status);
                Ok(DeformOutcome::Skipped(status))
            }
        }
    }

    fn solve_similarity<M: DeformableMesh + ?Sized>(
        &self,
        mesh: &mut M,
        pins: &[Pin],
    ) -> Result<std::result::Result<(), SolveStatus>> {
        let n = self.num_vertices;
        let mut matrix = match &self.similarity {
            Some(cached) => cached.clone(),
            None => assemble_similarity(n, &self.rest, self.options.parallel)?,
        };

        let rhs = incorporate(&mut matrix, pins, n);
        Ok(solve_dense(matrix, &rhs).map(|solution| write_back(mesh, &solution, pins)))
    }

    fn solve_arap<M: DeformableMesh + ?Sized>(
        &self,
        mesh: &mut M,
        pins: &[Pin],
    ) -> Result<std::result::Result<(), SolveStatus>> {
        let rebuilt;
        let system = match &self.arap {
            Some(cached) => cached,
            None => {
                rebuilt = ArapSystem::new(self.num_vertices, &self.rest)?;
                &rebuilt
            }
        };

        let solution = system.solve(pins, self.options.arap_iterations, self.options.parallel);
        Ok(solution.map(|solution| write_back_columns(mesh, &solution, pins)))
    }

    fn check_topology<M: DeformableMesh + ?Sized>(&self, mesh: &M) -> Result<()> {
        if mesh.num_vertices() != self.num_vertices || mesh.num_triangles() != self.num_triangles
        {
            return Err(DeformError::TopologyMismatch {
                expected_vertices: self.num_vertices,
                expected_triangles: self.num_triangles,
                vertices: mesh.num_vertices(),
                triangles: mesh.num_triangles(),
            });
        }
        Ok(())
    }

    /// Similarity energy `Σ ‖B‖² - 2 det B` of the mesh's current shape.
    ///
    /// Reported for both energy models.
    pub fn energy<M: DeformableMesh + ?Sized>(&self, mesh: &M) -> Result<f64> {
        self.check_topology(mesh)?;
        Ok(mesh_energy(mesh))
    }

    /// Number of unknowns in one solve.
    pub fn num_unknowns(&self) -> usize {
        match self.options.energy {
            EnergyModel::Similarity => 2 * self.num_vertices,
            EnergyModel::Arap => self.num_vertices,
        }
    }

    /// Number of vertices this deformer was built for.
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Options in use.
    pub fn options(&self) -> &DeformOptions {
        &self.options
    }

    /// Counters collected so far.
    pub fn stats(&self) -> &DeformStats {
        &self.stats
    }
}
