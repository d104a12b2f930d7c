// SPDX-License-Identifier: AGPL-3.0-only

// Clippy pedantic/nursery + physics-specific allows are in [lints.clippy]
// in Cargo.toml. Library code must propagate errors, not panic:
#![deny(clippy::expect_used, clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![warn(missing_docs)]

//! tidepool — distributed Trotter-Suzuki evolution environment
//!
//! Integrates the time-dependent Schrödinger equation and its nonlinear
//! Gross-Pitaevskii extensions on rectangular 1-D and 2-D grids by the
//! second-order Trotter-Suzuki splitting of the evolution operator, in real
//! or imaginary time, for one- or two-component wavefunctions with contact
//! and Rabi coupling and optional rotating-frame terms.
//!
//! # Architecture
//!
//! Layered, leaves first:
//!
//! - **`grid`** — geometry and the rank mesh: axis partition, tile boxes,
//!   halo channels, collective reductions, thread-per-rank launcher
//! - **`field`** — wavefunction state, potentials, Hamiltonians
//! - **`kernel`** — pluggable evolution back ends behind one trait; the
//!   threaded CPU block kernel is the compiled-in back end
//! - **`solver`** — one full splitting step per iteration, cache
//!   management, lazy energy queries
//! - **`observables`** — inner-box sums for norms, energies, moments
//! - **`snapshot`** — global density/phase fields stamped to flat files
//! - **`tolerances`** — centralized, justified validation thresholds
//! - **`validation`** — scenario reports for the pass/fail binaries
//! - **`error`** — typed errors for configuration, I/O, and invariants
//!
//! # Validation binaries
//!
//! All binaries follow the same pattern: analytical expected values,
//! explicit pass/fail against documented tolerances, exit code 0 (pass)
//! or 1 (fail).
//!
//! # References
//!
//! - Suzuki, Phys. Lett. A 146, 319 (1990) — fractal decomposition
//! - De Raedt, Comp. Phys. Rep. 7, 1 (1987) — product formulas for
//!   Schrödinger problems
//! - Wittek & Cucchietti, Comput. Phys. Commun. 184, 1165 (2013) —
//!   massively parallel kernel formulation

/// Typed errors for configuration, I/O, and runtime invariants.
pub mod error;
/// Physical fields: wavefunctions, potentials, Hamiltonians.
pub mod field;
/// Grid geometry, halo channels, collective reductions, rank mesh.
pub mod grid;
/// Evolution back ends behind the kernel contract.
pub mod kernel;
/// Inner-box observable sums.
pub mod observables;
/// Global scalar-field snapshots.
pub mod snapshot;
/// Trotter-Suzuki solver: orchestration and energy queries.
pub mod solver;
/// Centralized, justified validation thresholds.
pub mod tolerances;
/// Scenario reports for the pass/fail validation binaries.
pub mod validation;

pub use error::TidepoolError;
pub use solver::Solver;
