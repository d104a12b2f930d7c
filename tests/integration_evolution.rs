// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: evolution invariants end-to-end.
//!
//! These exercise the full solver/kernel stack on a single rank: unitarity
//! under real time, norm control under imaginary time, the halo-exchange
//! no-op, potential-cache latency, and Rabi population transfer.

use num_complex::Complex64;
use std::f64::consts::PI;

use tidepool::field::hamiltonian::{Hamiltonian, SystemHamiltonian, TwoComponentHamiltonian};
use tidepool::field::potential::{HarmonicPotential, StepPotential, ZeroPotential};
use tidepool::field::state::State;
use tidepool::grid::lattice::{GridConfig, Lattice};
use tidepool::grid::mesh::solo_context;
use tidepool::kernel::cpu::CpuKernel;
use tidepool::kernel::{EvolutionKernel, KernelSettings, KernelType, KineticConsts};
use tidepool::solver::Solver;
use tidepool::tolerances;

fn single_solver(
    config: &GridConfig,
    state: State,
    hamiltonian: Hamiltonian,
    delta_t: f64,
) -> Solver {
    let lattice = Lattice::solo(config).expect("lattice");
    Solver::new(
        lattice,
        SystemHamiltonian::Single(hamiltonian),
        vec![state],
        delta_t,
        KernelType::Cpu,
        solo_context(config),
    )
    .expect("solver")
}

#[test]
fn unitarity_1d_periodic_over_1000_iterations() {
    let config = GridConfig::line(256, 16.0, true);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state = State::plane_wave(&lattice, 2.0 * PI / 16.0, 0.0);
    let hamiltonian = Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential)).expect("hamiltonian");
    let mut solver = single_solver(&config, state, hamiltonian, 1e-3);

    let norm0 = solver.get_squared_norm(1).expect("norm");
    solver.evolve(1000, false).expect("evolve");
    let norm1 = solver.get_squared_norm(1).expect("norm");
    assert!(
        (norm1 - norm0).abs() <= 1000.0 * tolerances::UNITARITY_DRIFT_PER_ITER * norm0,
        "norm drifted {norm0} -> {norm1}"
    );
}

#[test]
fn unitarity_2d_dirichlet_with_contact_coupling() {
    // Pair updates skip across the wall, and both potential factors are
    // unimodular in real time, so even the nonlinear evolution is unitary.
    let config = GridConfig::plane(64, 64, 16.0, 16.0, false, false);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state = State::gaussian_packet(&lattice, 0.5, -0.3, 1.0);
    let trap = HarmonicPotential::new(&lattice, 1.0, 1.0);
    let hamiltonian = Hamiltonian::new(1.0, 0.7, Box::new(trap)).expect("hamiltonian");
    let mut solver = single_solver(&config, state, hamiltonian, 1e-3);

    let norm0 = solver.get_squared_norm(1).expect("norm");
    solver.evolve(200, false).expect("evolve");
    let norm1 = solver.get_squared_norm(1).expect("norm");
    assert!(
        (norm1 - norm0).abs() <= 200.0 * tolerances::UNITARITY_DRIFT_PER_ITER * norm0,
        "norm drifted {norm0} -> {norm1}"
    );
}

#[test]
fn imaginary_time_holds_norm_and_relaxes_to_ground_state() {
    let config = GridConfig::plane(64, 64, 12.0, 12.0, false, false);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state = State::from_fn(&lattice, |i, j| {
        // Deterministic per-cell noise.
        let mut s = 42_u64 ^ ((i as u64) << 21) ^ (j as u64);
        s = s
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        Complex64::new((s >> 33) as f64 / (1u64 << 31) as f64 - 0.5, 0.0)
    });
    let trap = HarmonicPotential::new(&lattice, 1.0, 1.0);
    let hamiltonian = Hamiltonian::new(1.0, 0.0, Box::new(trap)).expect("hamiltonian");
    let mut solver = single_solver(&config, state, hamiltonian, 1e-3);

    let norm0 = solver.get_squared_norm(1).expect("norm");
    let mut previous = f64::INFINITY;
    let mut energy = 0.0;
    for _ in 0..6 {
        solver.evolve(500, true).expect("evolve");
        energy = solver.get_total_energy().expect("energy");
        assert!(
            energy <= previous + 1e-8,
            "imaginary-time energy rose: {previous} -> {energy}"
        );
        previous = energy;
    }
    let norm1 = solver.get_squared_norm(1).expect("norm");
    assert!(
        (norm1 - norm0).abs() <= tolerances::NORM_TARGET_MATCH * norm0.max(1.0),
        "renormalisation target missed: {norm0} -> {norm1}"
    );
    assert!(
        (energy - 1.0).abs() < 1e-2,
        "2-D harmonic ground-state energy is 1, got {energy}"
    );
}

#[test]
fn potential_cache_latency_is_exactly_one_update() {
    // Uniform potentials only turn a global phase, so the switched run must
    // equal the control times exp(-i dt dV) per post-switch iteration; any
    // off-by-one in the cache refresh shifts the phase by one step.
    let config = GridConfig::line(64, 8.0, true);
    let lattice = Lattice::solo(&config).expect("lattice");
    let delta_t = 1e-3;
    let iterations = 10;
    let t_switch = 5.0 * delta_t; // engages at iteration 5

    let make = |solver_state: State, pot: Box<dyn tidepool::field::potential::Potential>| {
        single_solver(
            &config,
            solver_state,
            Hamiltonian::new(1.0, 0.0, pot).expect("hamiltonian"),
            delta_t,
        )
    };
    let mut switched = make(
        State::plane_wave(&lattice, 0.0, 0.0),
        Box::new(StepPotential::new(0.0, 1.0, t_switch)),
    );
    let mut control = make(State::plane_wave(&lattice, 0.0, 0.0), Box::new(ZeroPotential));
    switched.evolve(iterations, false).expect("evolve");
    control.evolve(iterations, false).expect("evolve");

    let post_switch_steps = (iterations - 5) as f64;
    let expected_phase = Complex64::from_polar(1.0, -delta_t * post_switch_steps);
    for idx in 0..switched.state().p_real.len() {
        let s = switched.state().psi(idx);
        let c = control.state().psi(idx) * expected_phase;
        assert!(
            (s - c).norm() < 1e-12,
            "cell {idx}: switched {s} vs expected {c}"
        );
    }
}

#[test]
fn halo_exchange_without_compute_is_identity() {
    let config = GridConfig::line(64, 8.0, true);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state = State::plane_wave(&lattice, 2.0 * PI / 8.0, 0.0);
    let ctx = solo_context(&config);
    let mut kernel = CpuKernel::new(lattice.clone(), ctx.links, ctx.collective, 1);
    let settings = KernelSettings {
        delta_t: 1e-3,
        imag_time: false,
        n_components: 1,
        kinetic: [KineticConsts::default(); 2],
        coupling: [0.0; 2],
        coupling_ab: 0.0,
        rabi_omega: Complex64::new(0.0, 0.0),
        angular_velocity: 0.0,
        rot_coord_x: 0.0,
        rot_coord_y: 0.0,
        norm_target: [0.0; 2],
    };
    let tile = lattice.tile_len();
    kernel.configure(
        settings,
        &[vec![1.0; tile]],
        &[vec![0.0; tile]],
        &[&state],
    );

    for _ in 0..3 {
        kernel.start_halo_exchange();
        kernel.wait_for_completion().expect("wait");
    }
    let mut re = vec![0.0; tile];
    let mut im = vec![0.0; tile];
    kernel.get_sample(0, &mut re, &mut im);
    assert_eq!(re, state.p_real, "exchange with no compute left re intact");
    assert_eq!(im, state.p_imag, "exchange with no compute left im intact");
}

#[test]
fn rabi_transfer_follows_the_mixing_angle() {
    let config = GridConfig::line(64, 8.0, true);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state_a = State::plane_wave(&lattice, 0.0, 0.0);
    let state_b = State::zeroed(&lattice);
    let hamiltonian = SystemHamiltonian::Coupled(TwoComponentHamiltonian {
        a: Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential)).expect("hamiltonian"),
        b: Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential)).expect("hamiltonian"),
        coupling_ab: 0.0,
        omega: Complex64::new(1.0, 0.0),
    });
    let mut solver = Solver::new(
        lattice,
        hamiltonian,
        vec![state_a, state_b],
        1e-3,
        KernelType::Cpu,
        solo_context(&config),
    )
    .expect("solver");

    solver.evolve(500, false).expect("evolve");
    let t = solver.current_evolution_time();
    let pop_a = solver.get_squared_norm(1).expect("norm a");
    let pop_b = solver.get_squared_norm(2).expect("norm b");
    let expected = (t / 2.0).cos().powi(2);
    assert!(
        (pop_a - expected).abs() < 1e-9,
        "P_a = {pop_a}, expected cos^2(t/2) = {expected}"
    );
    assert!((pop_a + pop_b - 1.0).abs() < 1e-9, "total norm conserved");
    // A sigma_x turn started from (1, 0) keeps <H_Rabi> at zero.
    let e_rabi = solver.get_rabi_energy().expect("rabi energy");
    assert!(
        e_rabi.abs() < 1e-9,
        "Rabi energy must stay zero along the transfer, got {e_rabi}"
    );
}

#[test]
fn two_component_imaginary_time_keeps_per_component_targets() {
    let config = GridConfig::line(64, 8.0, true);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state_a = State::gaussian_packet(&lattice, -1.0, 0.0, 0.8);
    let state_b = State::gaussian_packet(&lattice, 1.0, 0.0, 0.8);
    let hamiltonian = SystemHamiltonian::Coupled(TwoComponentHamiltonian {
        a: Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential)).expect("hamiltonian"),
        b: Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential)).expect("hamiltonian"),
        coupling_ab: 0.0,
        omega: Complex64::new(0.3, 0.1),
    });
    let mut solver = Solver::new(
        lattice,
        hamiltonian,
        vec![state_a, state_b],
        1e-3,
        KernelType::Cpu,
        solo_context(&config),
    )
    .expect("solver");

    let a0 = solver.get_squared_norm(1).expect("norm a");
    let b0 = solver.get_squared_norm(2).expect("norm b");
    solver.evolve(100, true).expect("evolve");
    let a1 = solver.get_squared_norm(1).expect("norm a");
    let b1 = solver.get_squared_norm(2).expect("norm b");
    assert!(
        (a1 - a0).abs() <= tolerances::NORM_TARGET_MATCH * a0.max(1.0),
        "component a target missed: {a0} -> {a1}"
    );
    assert!(
        (b1 - b0).abs() <= tolerances::NORM_TARGET_MATCH * b0.max(1.0),
        "component b target missed: {b0} -> {b1}"
    );
}
