// SPDX-License-Identifier: AGPL-3.0-only

//! Harmonic-trap validation: stationary superposition and imaginary-time
//! ground-state quench.
//!
//! Real time: the ground state times `(1 + sqrt(2 w) x)` superposes the
//! ground and first x-excited oscillator states, so `<E>` is stationary
//! and `<x>` oscillates with period `2 pi / w`. 40 snapshot batches track
//! both.
//!
//! Imaginary time: starting from uniform pseudo-random noise in the same
//! trap, the energy must decrease monotonically across batches and
//! converge to the analytical 2-D ground-state energy `wx/2 + wy/2 = 1`.

use tidepool::field::hamiltonian::{Hamiltonian, SystemHamiltonian};
use tidepool::field::potential::HarmonicPotential;
use tidepool::field::state::State;
use tidepool::grid::lattice::{GridConfig, Lattice};
use tidepool::grid::mesh::solo_context;
use tidepool::kernel::KernelType;
use tidepool::snapshot;
use tidepool::solver::Solver;
use tidepool::tolerances::{GROUND_STATE_ENERGY, OSCILLATION_PERIOD_PCT, STATIONARY_ENERGY};
use tidepool::validation::ScenarioReport;

use num_complex::Complex64;
use std::f64::consts::PI;

const EDGE_LENGTH: f64 = 15.0;
const DIM: usize = 300;
const DELTA_T: f64 = 2e-4;
const ITERATIONS: usize = 1000;
const SNAPSHOTS: usize = 40;
const SNAP_PER_STAMP: usize = 5;

/// Minimal LCG, good enough for a noise quench seed.
fn lcg_uniform(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    (*state >> 33) as f64 / (1u64 << 31) as f64
}

fn stationary_superposition(report: &mut ScenarioReport) {
    let config = GridConfig::plane(DIM, DIM, EDGE_LENGTH, EDGE_LENGTH, false, false);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state = State::excited_superposition_x(&lattice, 1.0);
    let trap = HarmonicPotential::new(&lattice, 1.0, 1.0);
    let hamiltonian = Hamiltonian::new(1.0, 0.0, Box::new(trap)).expect("hamiltonian");
    let mut solver = Solver::new(
        lattice,
        SystemHamiltonian::Single(hamiltonian),
        vec![state],
        DELTA_T,
        KernelType::Cpu,
        solo_context(&config),
    )
    .expect("solver");

    let run_dir = snapshot::ensure_run_dir("harmonic_run");
    let mut energies = Vec::with_capacity(SNAPSHOTS);
    let mut mean_x = Vec::with_capacity(SNAPSHOTS);
    for snap in 0..SNAPSHOTS {
        solver.evolve(ITERATIONS, false).expect("evolve");
        let e = solver.get_total_energy().expect("energy");
        energies.push(e);
        mean_x.push(solver.mean_x(0));
        if snap % SNAP_PER_STAMP == 0 {
            snapshot::write_field(
                solver.lattice(),
                solver.collective(),
                solver.density_field(0),
                &run_dir,
                "density",
                snap * ITERATIONS,
            )
            .expect("stamp density");
            snapshot::write_field(
                solver.lattice(),
                solver.collective(),
                solver.phase_field(0),
                &run_dir,
                "phase",
                snap * ITERATIONS,
            )
            .expect("stamp phase");
        }
        println!(
            "  batch {snap:2}: t={:8.4}  E={e:.8}  <x>={:+.6}",
            solver.current_evolution_time(),
            mean_x[snap]
        );
    }

    let e0 = energies[0];
    let max_rel_drift = energies
        .iter()
        .map(|e| ((e - e0) / e0).abs())
        .fold(0.0_f64, f64::max);
    report.require_below("<E> stationarity over 40 batches (rel)", max_rel_drift, STATIONARY_ENERGY);

    // Period of <x> from linearly interpolated zero crossings.
    let dt_sample = DELTA_T * ITERATIONS as f64;
    let mut crossings = Vec::new();
    for i in 1..mean_x.len() {
        if mean_x[i - 1].signum() != mean_x[i].signum() {
            let frac = mean_x[i - 1] / (mean_x[i - 1] - mean_x[i]);
            crossings.push((i as f64 - 1.0 + frac) * dt_sample);
        }
    }
    if crossings.len() >= 2 {
        let spacing = (crossings[crossings.len() - 1] - crossings[0]) / (crossings.len() - 1) as f64;
        let period = 2.0 * spacing;
        let err_pct = ((period - 2.0 * PI) / (2.0 * PI)).abs() * 100.0;
        report.require_below("<x> period error vs 2pi (%)", err_pct, OSCILLATION_PERIOD_PCT);
    } else {
        report.require("<x> produced at least two zero crossings", false);
    }
}

fn imaginary_quench(report: &mut ScenarioReport) {
    let config = GridConfig::plane(128, 128, EDGE_LENGTH, EDGE_LENGTH, false, false);
    let lattice = Lattice::solo(&config).expect("lattice");
    // Deterministic noise: every cell derives its own LCG stream from the
    // global index, so the field is identical on any decomposition.
    let state = State::from_fn(&lattice, |i, j| {
        let mut cell_seed = 42_u64 ^ ((i as u64) << 21) ^ (j as u64);
        Complex64::new(lcg_uniform(&mut cell_seed) - 0.5, 0.0)
    });
    let trap = HarmonicPotential::new(&lattice, 1.0, 1.0);
    let hamiltonian = Hamiltonian::new(1.0, 0.0, Box::new(trap)).expect("hamiltonian");
    let mut solver = Solver::new(
        lattice,
        SystemHamiltonian::Single(hamiltonian),
        vec![state],
        1e-3,
        KernelType::Cpu,
        solo_context(&config),
    )
    .expect("solver");

    let mut previous = f64::INFINITY;
    let mut monotone = true;
    let mut energy = 0.0;
    for batch in 0..30 {
        solver.evolve(500, true).expect("evolve");
        energy = solver.get_total_energy().expect("energy");
        if energy > previous + 1e-8 {
            monotone = false;
        }
        previous = energy;
        println!("  quench batch {batch:2}: E={energy:.8}");
    }
    report.require("quench energy monotonically decreasing", monotone);
    report.require_close("quench ground-state energy", energy, 1.0, GROUND_STATE_ENERGY);
}

fn main() {
    let mut report = ScenarioReport::new("harmonic_trap");
    println!("Harmonic trap: L={EDGE_LENGTH}, N={DIM}, dt={DELTA_T}");
    stationary_superposition(&mut report);
    imaginary_quench(&mut report);
    report.save_json("validate_harmonic_trap.json");
    report.conclude();
}
