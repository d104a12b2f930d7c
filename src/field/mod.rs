// SPDX-License-Identifier: AGPL-3.0-only

//! Physical fields: wavefunctions, potentials, Hamiltonians.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `state` | Complex field on the local tile, initial states, moments |
//! | `potential` | External potential contract and stock implementations |
//! | `hamiltonian` | Single- and two-component Hamiltonian parameters |

/// Single- and two-component Hamiltonian parameters.
pub mod hamiltonian;
/// External potential contract and stock implementations.
pub mod potential;
/// Complex field on the local tile, initial states, moments.
pub mod state;
