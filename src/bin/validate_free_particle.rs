// SPDX-License-Identifier: AGPL-3.0-only

//! Free-particle dispersion validation.
//!
//! A periodic plane wave `exp(i k x)` with `k = 2 pi / L` is an eigenstate
//! of the free Hamiltonian, so after time T the exact field is
//! `exp(-i k^2 T / 2m)` times the initial one. 1000 iterations at
//! dt = 1e-3 must reproduce that phase to 1e-4 per cell.
//!
//! The mesh half re-runs the same scenario decomposed 4x1 (1-D) and a 2-D
//! variant 2x2 versus serial; inner boxes must agree to 1e-12.

use std::f64::consts::PI;

use num_complex::Complex64;

use tidepool::field::hamiltonian::{Hamiltonian, SystemHamiltonian};
use tidepool::field::potential::ZeroPotential;
use tidepool::field::state::State;
use tidepool::grid::lattice::{axis_chunk, GridConfig, Lattice};
use tidepool::grid::mesh;
use tidepool::kernel::KernelType;
use tidepool::solver::Solver;
use tidepool::tolerances::{FREE_PARTICLE_PHASE, MESH_AGREEMENT};
use tidepool::validation::ScenarioReport;

const DIM: usize = 256;
const LENGTH: f64 = 32.0;
const DELTA_T: f64 = 1e-3;
const ITERATIONS: usize = 1000;

fn evolve_inner(
    config: &GridConfig,
    ranks_x: usize,
    ranks_y: usize,
    kx: f64,
    ky: f64,
) -> Vec<Complex64> {
    let per_rank = mesh::run(config, ranks_x, ranks_y, |ctx| {
        let lattice = Lattice::build(config, ctx.topology)?;
        let state = State::plane_wave(&lattice, kx, ky);
        let hamiltonian = Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential))?;
        let mut solver = Solver::new(
            lattice.clone(),
            SystemHamiltonian::Single(hamiltonian),
            vec![state],
            DELTA_T,
            KernelType::Cpu,
            ctx,
        )?;
        solver.evolve(ITERATIONS, false)?;
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

    // Reassemble the global field in Cartesian order.
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

fn main() {
    let mut report = ScenarioReport::new("free_particle");
    let k = 2.0 * PI / LENGTH;

    println!("Free particle: N={DIM}, L={LENGTH}, k=2pi/L, dt={DELTA_T}, {ITERATIONS} iters");

    // Scenario A: serial phase accuracy against the analytical evolution.
    let config = GridConfig::line(DIM, LENGTH, true);
    let lattice = Lattice::solo(&config).expect("lattice");
    let initial = State::plane_wave(&lattice, k, 0.0);
    let final_field = evolve_inner(&config, 1, 1, k, 0.0);

    let t_total = DELTA_T * ITERATIONS as f64;
    let phase = Complex64::from_polar(1.0, -0.5 * k * k * t_total);
    let mut max_err: f64 = 0.0;
    for (i, value) in final_field.iter().enumerate() {
        let expected = phase * initial.psi(lattice.halo_left + i);
        max_err = max_err.max((*value - expected).norm());
    }
    report.require_below("analytic phase error (max per cell)", max_err, FREE_PARTICLE_PHASE);

    // Scenario F, 1-D flavour: 4x1 decomposition against serial.
    let decomposed = evolve_inner(&config, 4, 1, k, 0.0);
    let mut max_diff: f64 = 0.0;
    for (a, b) in final_field.iter().zip(&decomposed) {
        max_diff = max_diff.max((*a - *b).norm());
    }
    report.require_below("1x1 vs 4x1 inner box (max per cell)", max_diff, MESH_AGREEMENT);

    // Scenario F, 2-D flavour: 2x2 against serial, 100 iterations.
    let config_2d = GridConfig::plane(64, 64, LENGTH, LENGTH, true, true);
    let k2 = 2.0 * PI / LENGTH;
    let serial = evolve_inner_2d(&config_2d, 1, 1, k2);
    let quad = evolve_inner_2d(&config_2d, 2, 2, k2);
    let mut max_diff_2d: f64 = 0.0;
    for (a, b) in serial.iter().zip(&quad) {
        max_diff_2d = max_diff_2d.max((*a - *b).norm());
    }
    report.require_below("2-D 1x1 vs 2x2 inner box (max per cell)", max_diff_2d, MESH_AGREEMENT);

    report.save_json("validate_free_particle.json");
    report.conclude();
}

fn evolve_inner_2d(config: &GridConfig, ranks_x: usize, ranks_y: usize, k: f64) -> Vec<Complex64> {
    let per_rank = mesh::run(config, ranks_x, ranks_y, |ctx| {
        let lattice = Lattice::build(config, ctx.topology)?;
        let state = State::plane_wave(&lattice, k, k);
        let hamiltonian = Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential))?;
        let mut solver = Solver::new(
            lattice.clone(),
            SystemHamiltonian::Single(hamiltonian),
            vec![state],
            DELTA_T,
            KernelType::Cpu,
            ctx,
        )?;
        solver.evolve(100, false)?;
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
