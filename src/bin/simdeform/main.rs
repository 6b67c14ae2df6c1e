//! Simdeform CLI - grid deformation from the command line.
//!
//! Usage: simdeform <COMMAND> [OPTIONS]
//!
//! Run `simdeform --help` for available commands. Set `RUST_LOG=debug` to
//! see per-solve timings.

use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use nalgebra::{Point2, Vector2};

use simdeform::algo::{DeformOptions, Deformer, EnergyModel};
use simdeform::mesh::{build_grid, GridOptions, ImageMesh, VertexId};

#[derive(Parser)]
#[command(name = "simdeform")]
#[command(author, version, about = "Similarity-invariant mesh deformation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display grid and system information
    Info {
        #[command(flatten)]
        grid: GridArgs,
    },

    /// Pin vertices at new positions and solve for the rest
    Drag {
        #[command(flatten)]
        grid: GridArgs,

        /// Pinned vertex and its target, as V:X,Y (repeatable)
        #[arg(short, long = "pin", value_parser = parse_pin, required = true)]
        pins: Vec<(usize, Point2<f64>)>,

        /// Energy to minimize
        #[arg(short, long, value_enum, default_value = "similarity")]
        energy: EnergyArg,

        /// Local/global rounds for the ARAP energy
        #[arg(short, long, default_value = "1")]
        iterations: usize,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Time repeated solves
    Bench {
        #[command(flatten)]
        grid: GridArgs,

        /// Number of solves
        #[arg(short, long, default_value = "20")]
        repeat: usize,

        /// Energy to minimize
        #[arg(short, long, value_enum, default_value = "similarity")]
        energy: EnergyArg,

        /// Rebuild the system matrix for every solve
        #[arg(long)]
        no_cache: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Args)]
struct GridArgs {
    /// Image width
    #[arg(long, default_value = "1.0")]
    width: f64,

    /// Image height
    #[arg(long, default_value = "1.0")]
    height: f64,

    /// Grid cells along each axis
    #[arg(short, long, default_value = "15")]
    divisions: usize,
}

impl GridArgs {
    fn build(&self) -> Result<ImageMesh, Box<dyn std::error::Error>> {
        let options = GridOptions::new(self.width, self.height, self.divisions, self.divisions);
        Ok(build_grid(&options)?)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum EnergyArg {
    /// Similarity-invariant energy (rotation and uniform scale are free)
    Similarity,
    /// As-rigid-as-possible energy
    Arap,
}

impl From<EnergyArg> for EnergyModel {
    fn from(arg: EnergyArg) -> Self {
        match arg {
            EnergyArg::Similarity => EnergyModel::Similarity,
            EnergyArg::Arap => EnergyModel::Arap,
        }
    }
}

fn parse_pin(s: &str) -> Result<(usize, Point2<f64>), String> {
    let (vertex, target) = s
        .split_once(':')
        .ok_or_else(|| format!("expected V:X,Y, got '{}'", s))?;
    let (x, y) = target
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y after ':', got '{}'", target))?;

    let vertex = vertex.trim().parse().map_err(|e| format!("bad vertex '{}': {}", vertex, e))?;
    let x = x.trim().parse().map_err(|e| format!("bad x '{}': {}", x, e))?;
    let y = y.trim().parse().map_err(|e| format!("bad y '{}': {}", y, e))?;
    Ok((vertex, Point2::new(x, y)))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { grid } => {
            cmd_info(&grid)?;
        }

        Commands::Drag {
            grid,
            pins,
            energy,
            iterations,
            sequential,
        } => {
            let options = DeformOptions::default()
                .with_energy(energy.into())
                .with_arap_iterations(iterations)
                .with_parallel(!sequential);
            cmd_drag(&grid, &pins, options)?;
        }

        Commands::Bench {
            grid,
            repeat,
            energy,
            no_cache,
            sequential,
        } => {
            let options = DeformOptions::default()
                .with_energy(energy.into())
                .with_cache_system(!no_cache)
                .with_parallel(!sequential);
            cmd_bench(&grid, repeat, options)?;
        }
    }

    Ok(())
}

fn cmd_info(grid: &GridArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = grid.build()?;
    let (min, max) = mesh.bounding_box();
    let n = mesh.num_vertices();

    println!("Grid Information");
    println!("================");
    println!("Vertices:     {}", n);
    println!("Triangles:    {}", mesh.num_triangles());
    println!("Bounds:       ({:.3}, {:.3}) - ({:.3}, {:.3})", min.x, min.y, max.x, max.y);
    println!("Pick radius:  {:.4}", mesh.pick_radius());
    println!("Anchor:       {:?} at {:?}", mesh.anchor(), mesh.vertex_position(mesh.anchor()));
    println!();
    println!("Similarity system: {0}x{0} ({1} entries)", 2 * n, 4 * n * n);
    println!("ARAP system:       {0}x{0} ({1} entries)", n, n * n);

    Ok(())
}

fn cmd_drag(
    grid: &GridArgs,
    pins: &[(usize, Point2<f64>)],
    options: DeformOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mesh = grid.build()?;
    let mut deformer = Deformer::new(&mesh, options)?;

    for &(index, target) in pins {
        let v = mesh.vertex_id(index)?;
        mesh.pin(v)?;
        mesh.drag(v, target)?;
    }

    println!(
        "Deforming {} vertices with {} pins ({:?} energy)...",
        mesh.num_vertices(),
        mesh.num_pinned(),
        deformer.options().energy
    );

    let start = Instant::now();
    deformer.deform(&mut mesh)?.into_result()?;
    let elapsed = start.elapsed();

    for v in mesh.vertex_ids() {
        let p = mesh.vertex_position(v);
        let marker = if mesh.is_pinned(v) { " *" } else { "" };
        println!("{:>5} {:>12.6} {:>12.6}{}", v.index(), p.x, p.y, marker);
    }
    println!("Energy: {:.6e} ({:.2?})", deformer.energy(&mesh)?, elapsed);

    Ok(())
}

fn cmd_bench(
    grid: &GridArgs,
    repeat: usize,
    options: DeformOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mesh = grid.build()?;

    let start = Instant::now();
    let mut deformer = Deformer::new(&mesh, options)?;
    let setup = start.elapsed();

    // Hold the lower-right corner and sweep the upper-right one outward.
    let h = grid.divisions;
    let fixed = VertexId::new(h);
    let moving = VertexId::new(mesh.num_vertices() - 1);
    mesh.pin(fixed)?;
    mesh.pin(moving)?;
    let origin = mesh.vertex_rest_position(moving);

    println!(
        "Benchmarking {} solves on {} vertices ({:?} energy)...",
        repeat,
        mesh.num_vertices(),
        deformer.options().energy
    );

    let start = Instant::now();
    for i in 0..repeat {
        let t = (i + 1) as f64 / repeat as f64;
        mesh.drag(moving, origin + Vector2::new(0.25 * t, 0.25 * t) * grid.width)?;
        deformer.deform(&mut mesh)?;
    }
    let total = start.elapsed();

    let stats = deformer.stats();
    println!("Setup:    {:.2?}", setup);
    println!("Total:    {:.2?}", total);
    if stats.solves > 0 {
        println!("Per solve: {:.2?}", total / stats.solves as u32);
    }
    println!("Solved:   {}, skipped: {}", stats.solves, stats.failures);

    Ok(())
}
