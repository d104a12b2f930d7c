// SPDX-License-Identifier: AGPL-3.0-only

//! Rotating-frame validation.
//!
//! An off-centre Gaussian under `exp(-i dt Omega L_z)` rotates rigidly about
//! the rotation centre, so its centre of mass must advance at angular
//! velocity Omega. A heavy particle (m = 50) keeps free spreading small
//! over one revolution. The shear composition needs the doubled halo.

use tidepool::field::hamiltonian::{Hamiltonian, SystemHamiltonian};
use tidepool::field::potential::ZeroPotential;
use tidepool::field::state::State;
use tidepool::grid::lattice::{GridConfig, Lattice, ROTATION_HALO};
use tidepool::grid::mesh::solo_context;
use tidepool::kernel::KernelType;
use tidepool::solver::Solver;
use tidepool::tolerances::ROTATION_COM_PCT;
use tidepool::validation::ScenarioReport;

const DIM: usize = 128;
const LENGTH: f64 = 16.0;
const OMEGA: f64 = 0.5;
const MASS: f64 = 50.0;
const DELTA_T: f64 = 1e-3;
const BATCH: usize = 500;
const BATCHES: usize = 25; // 25 * 500 * 1e-3 = 12.5 ~ one revolution at Omega = 0.5

fn main() {
    let mut report = ScenarioReport::new("rotating_frame");
    println!("Rotating frame: N={DIM}, Omega={OMEGA}, m={MASS}, dt={DELTA_T}");

    let config =
        GridConfig::plane(DIM, DIM, LENGTH, LENGTH, false, false).with_halo(ROTATION_HALO);
    let lattice = Lattice::solo(&config).expect("lattice");
    let state = State::gaussian_packet(&lattice, 1.5, 0.0, 1.0);
    let hamiltonian = Hamiltonian::new(MASS, 0.0, Box::new(ZeroPotential))
        .expect("hamiltonian")
        .with_rotation(OMEGA, 0.0, 0.0);
    let mut solver = Solver::new(
        lattice,
        SystemHamiltonian::Single(hamiltonian),
        vec![state],
        DELTA_T,
        KernelType::Cpu,
        solo_context(&config),
    )
    .expect("solver");

    let mut angles = Vec::with_capacity(BATCHES + 1);
    angles.push(0.0_f64);
    let mut radius_min = f64::INFINITY;
    for batch in 1..=BATCHES {
        solver.evolve(BATCH, false).expect("evolve");
        let x = solver.mean_x(0);
        let y = solver.mean_y(0);
        let r = x.hypot(y);
        radius_min = radius_min.min(r);
        angles.push(y.atan2(x));
        println!(
            "  batch {batch:2}: t={:6.2}  <x>={x:+.4}  <y>={y:+.4}  r={r:.4}",
            solver.current_evolution_time()
        );
    }

    // Unwrap the angle series and fit the mean angular speed.
    let mut unwrapped = vec![angles[0]];
    for i in 1..angles.len() {
        let mut delta = angles[i] - angles[i - 1];
        while delta > std::f64::consts::PI {
            delta -= 2.0 * std::f64::consts::PI;
        }
        while delta < -std::f64::consts::PI {
            delta += 2.0 * std::f64::consts::PI;
        }
        unwrapped.push(unwrapped[i - 1] + delta);
    }
    let t_total = DELTA_T * (BATCH * BATCHES) as f64;
    let rate = (unwrapped[unwrapped.len() - 1] - unwrapped[0]).abs() / t_total;
    let err_pct = ((rate - OMEGA) / OMEGA).abs() * 100.0;

    report.require_below("centre-of-mass angular velocity error (%)", err_pct, ROTATION_COM_PCT);
    report.require_above("centre-of-mass radius stays off-centre", radius_min, 0.5);
    report.save_json("validate_rotating_frame.json");
    report.conclude();
}
