// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized, justified validation thresholds.
//!
//! Every tolerance used by a test or validation binary lives here with a
//! derivation, so a failing check points at a documented number rather than
//! a magic literal.

// ═══════════════════════════════════════════════════════════════════
// Machine-precision tolerances (IEEE 754 f64)
// ═══════════════════════════════════════════════════════════════════

/// Tolerance for operations that should be exact in f64 arithmetic.
///
/// f64 carries ~15.9 significant digits; 1e-10 allows 5 digits of
/// accumulated rounding in compositions of exact operations.
pub const EXACT_F64: f64 = 1e-10;

/// Guard against division by a vanishing norm or shell volume.
pub const DIVISION_GUARD: f64 = 1e-300;

// ═══════════════════════════════════════════════════════════════════
// Evolution invariants
// ═══════════════════════════════════════════════════════════════════

/// Squared-norm drift per iteration under real-time evolution.
///
/// Every factor of the splitting is a 2x2 rotation or a unimodular phase,
/// so the only drift source is f64 rounding: ~1e-16 per cell per factor,
/// far under this bound even on 10^6-cell tiles.
pub const UNITARITY_DRIFT_PER_ITER: f64 = 1e-10;

/// Mismatch between the squared norm and its target right after
/// imaginary-time renormalisation.
///
/// The rescale factor is computed from the freshly reduced norm, so the
/// residual is one multiply-round per cell.
pub const NORM_TARGET_MATCH: f64 = 1e-12;

/// Per-cell disagreement of the inner box between runs decomposed over
/// different process grids.
///
/// Pair updates are cellwise-identical regardless of tile shape; only
/// reduction order differs (imaginary time), so agreement is near-exact.
pub const TILE_AGREEMENT: f64 = 1e-10;

/// Per-cell disagreement between a 2x2 mesh and a serial run of the same
/// real-time scenario. No reductions participate, so this is bitwise up
/// to f64 associativity in the band copies (which preserve values).
pub const MESH_AGREEMENT: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// Scenario thresholds (validation binaries)
// ═══════════════════════════════════════════════════════════════════

/// Free-particle phase accuracy after 1000 iterations (scenario A):
/// |psi_final - exp(-i k^2 T / 2m) psi_0| per cell.
pub const FREE_PARTICLE_PHASE: f64 = 1e-4;

/// Relative stationarity of <E> for a harmonic eigenstate over 40
/// snapshot batches (scenario B).
pub const STATIONARY_ENERGY: f64 = 1e-3;

/// <x> oscillation-period error for the first excited superposition,
/// relative to 2 pi (scenario B).
pub const OSCILLATION_PERIOD_PCT: f64 = 1.0;

/// Absolute error against the analytical harmonic ground-state energy
/// after an imaginary-time quench (scenario C).
pub const GROUND_STATE_ENERGY: f64 = 1e-4;

/// Rabi population-transfer deviation from cos^2(t/2) over one period
/// (scenario D).
pub const RABI_TRANSFER: f64 = 1e-3;

/// Centre-of-mass angular-velocity error under rotation, in percent
/// (scenario E).
pub const ROTATION_COM_PCT: f64 = 2.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_ordering() {
        assert!(MESH_AGREEMENT < TILE_AGREEMENT, "mesh < tile");
        assert!(NORM_TARGET_MATCH < UNITARITY_DRIFT_PER_ITER, "norm < drift");
        assert!(GROUND_STATE_ENERGY < STATIONARY_ENERGY, "quench < batch");
    }
}
