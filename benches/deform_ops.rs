//! Benchmarks for deformation operations.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Point2;
use simdeform::algo::energy::{assemble_similarity, rest_triangles};
use simdeform::prelude::*;

fn create_grid_mesh(n: usize) -> ImageMesh {
    build_grid(&GridOptions::new(1.0, 1.0, n, n)).unwrap()
}

fn pin_corners(mesh: &mut ImageMesh, n: usize) {
    let fixed = VertexId::new(n);
    let moving = VertexId::new(mesh.num_vertices() - 1);
    mesh.pin(fixed).unwrap();
    mesh.pin(moving).unwrap();
    mesh.drag(moving, Point2::new(0.75, 0.6)).unwrap();
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_similarity");
    for n in [8, 15] {
        let mesh = create_grid_mesh(n);
        let rest = rest_triangles(&mesh);
        let nv = mesh.num_vertices();

        group.bench_with_input(BenchmarkId::new("sequential", n), &rest, |b, rest| {
            b.iter(|| assemble_similarity(nv, rest, false).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("parallel", n), &rest, |b, rest| {
            b.iter(|| assemble_similarity(nv, rest, true).unwrap());
        });
    }
    group.finish();
}

fn bench_deform(c: &mut Criterion) {
    let mut group = c.benchmark_group("deform");
    for n in [8, 15] {
        let mut mesh = create_grid_mesh(n);
        pin_corners(&mut mesh, n);

        let mut similarity = Deformer::new(&mesh, DeformOptions::default()).unwrap();
        group.bench_function(BenchmarkId::new("similarity", n), |b| {
            b.iter(|| similarity.deform(&mut mesh).unwrap());
        });

        let options = DeformOptions::default()
            .with_energy(EnergyModel::Arap)
            .with_arap_iterations(5);
        let mut arap = Deformer::new(&mesh, options).unwrap();
        group.bench_function(BenchmarkId::new("arap_5", n), |b| {
            b.iter(|| arap.deform(&mut mesh).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assembly, bench_deform);
criterion_main!(benches);
