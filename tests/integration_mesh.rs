// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: decomposition invariance.
//!
//! The same initial condition evolved for the same number of iterations
//! must land on the same inner-box values whatever the process grid. Real
//! time involves no reductions, so runs agree to rounding; imaginary time
//! reduces the norm every iteration, so summation order admits a slightly
//! wider band.

use num_complex::Complex64;

use tidepool::field::hamiltonian::{Hamiltonian, SystemHamiltonian};
use tidepool::field::potential::HarmonicPotential;
use tidepool::field::state::State;
use tidepool::grid::lattice::{axis_chunk, GridConfig, Lattice};
use tidepool::grid::mesh;
use tidepool::kernel::KernelType;
use tidepool::solver::Solver;
use tidepool::tolerances::{MESH_AGREEMENT, TILE_AGREEMENT};

/// Evolve a Gaussian in a weak trap with a contact term and return the
/// assembled global inner field.
fn run_scenario(
    config: &GridConfig,
    ranks_x: usize,
    ranks_y: usize,
    iterations: usize,
    imag_time: bool,
) -> Vec<Complex64> {
    let per_rank = mesh::run(config, ranks_x, ranks_y, |ctx| {
        let lattice = Lattice::build(config, ctx.topology)?;
        let state = State::gaussian_packet(&lattice, 0.7, -0.4, 1.0);
        let trap = HarmonicPotential::new(&lattice, 1.0, 1.0);
        let hamiltonian = Hamiltonian::new(1.0, 0.5, Box::new(trap))?;
        let mut solver = Solver::new(
            lattice.clone(),
            SystemHamiltonian::Single(hamiltonian),
            vec![state],
            1e-3,
            KernelType::Cpu,
            ctx,
        )?;
        solver.evolve(iterations, imag_time)?;
        let w = lattice.dim_x();
        let mut inner = Vec::with_capacity(lattice.inner_w() * lattice.inner_h());
        for ty in lattice.halo_top..lattice.halo_top + lattice.inner_h() {
            for tx in lattice.halo_left..lattice.halo_left + lattice.inner_w() {
                inner.push(solver.state().psi(ty * w + tx));
            }
        }
        Ok(inner)
    })
    .expect("mesh run");

    let (nx, ny) = (config.dim_x, config.dim_y);
    let mut global = vec![Complex64::new(0.0, 0.0); nx * ny];
    for (rank, field) in per_rank.iter().enumerate() {
        let cx = rank % ranks_x;
        let cy = rank / ranks_x;
        let (x0, w) = axis_chunk(nx, ranks_x, cx);
        let (y0, h) = axis_chunk(ny, ranks_y, cy);
        for r in 0..h {
            global[(y0 + r) * nx + x0..(y0 + r) * nx + x0 + w]
                .copy_from_slice(&field[r * w..(r + 1) * w]);
        }
    }
    global
}

fn max_cell_diff(a: &[Complex64], b: &[Complex64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (*x - *y).norm())
        .fold(0.0, f64::max)
}

#[test]
fn tile_invariance_real_time_periodic() {
    let config = GridConfig::plane(32, 32, 10.0, 10.0, true, true);
    let reference = run_scenario(&config, 1, 1, 100, false);
    for (px, py) in [(2, 1), (1, 2), (2, 2), (4, 1), (4, 4), (2, 4)] {
        let decomposed = run_scenario(&config, px, py, 100, false);
        let diff = max_cell_diff(&reference, &decomposed);
        assert!(
            diff <= MESH_AGREEMENT,
            "{px}x{py} disagrees with serial by {diff}"
        );
    }
}

#[test]
fn tile_invariance_real_time_dirichlet() {
    let config = GridConfig::plane(32, 32, 10.0, 10.0, false, false);
    let reference = run_scenario(&config, 1, 1, 100, false);
    for (px, py) in [(2, 2), (1, 4), (4, 2)] {
        let decomposed = run_scenario(&config, px, py, 100, false);
        let diff = max_cell_diff(&reference, &decomposed);
        assert!(
            diff <= MESH_AGREEMENT,
            "{px}x{py} disagrees with serial by {diff}"
        );
    }
}

#[test]
fn tile_invariance_mixed_boundary() {
    let config = GridConfig::plane(32, 32, 10.0, 10.0, true, false);
    let reference = run_scenario(&config, 1, 1, 60, false);
    let decomposed = run_scenario(&config, 2, 2, 60, false);
    let diff = max_cell_diff(&reference, &decomposed);
    assert!(diff <= MESH_AGREEMENT, "2x2 mixed-boundary differs by {diff}");
}

#[test]
fn tile_invariance_imaginary_time() {
    let config = GridConfig::plane(32, 32, 10.0, 10.0, true, true);
    let reference = run_scenario(&config, 1, 1, 50, true);
    for (px, py) in [(2, 2), (4, 1)] {
        let decomposed = run_scenario(&config, px, py, 50, true);
        let diff = max_cell_diff(&reference, &decomposed);
        assert!(
            diff <= TILE_AGREEMENT,
            "{px}x{py} imaginary time disagrees by {diff}"
        );
    }
}

#[test]
fn tile_invariance_1d() {
    let config = GridConfig::line(256, 16.0, true);
    let reference = run_scenario(&config, 1, 1, 200, false);
    for ranks in [2, 4, 8] {
        let decomposed = run_scenario(&config, ranks, 1, 200, false);
        let diff = max_cell_diff(&reference, &decomposed);
        assert!(
            diff <= MESH_AGREEMENT,
            "{ranks}x1 disagrees with serial by {diff}"
        );
    }
}
