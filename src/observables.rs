// SPDX-License-Identifier: AGPL-3.0-only

//! Inner-box observable sums.
//!
//! Raw local sums only: the solver reduces them across the mesh in one
//! collective and applies the volume element and norm divisions. Kinetic
//! terms use the fourth-order Laplacian stencil; a point contributes only
//! when its two-wide stencil stays inside the inner box plus whatever halo
//! is present on that edge, i.e. two cells are skipped inward from any edge
//! without halo.

use num_complex::Complex64;

use crate::field::potential::Potential;
use crate::field::state::State;
use crate::grid::lattice::Lattice;

/// Fourth-order Laplacian stencil, coefficients for offsets -2..=2, to be
/// divided by the squared grid spacing.
pub const LAPLACIAN_STENCIL: [f64; 5] = [-1.0 / 12.0, 4.0 / 3.0, -5.0 / 2.0, 4.0 / 3.0, -1.0 / 12.0];

/// Raw per-component sums over the inner box (no volume element applied).
#[derive(Clone, Copy, Debug, Default)]
pub struct ComponentSums {
    /// `sum |psi|^2`
    pub norm2: f64,
    /// `Re sum conj(psi) (-1/2m) lap psi`
    pub kinetic: f64,
    /// `sum V |psi|^2`
    pub potential: f64,
    /// `0.5 g sum |psi|^4`
    pub intra: f64,
}

/// Raw cross-component sums over the inner box.
#[derive(Clone, Copy, Debug, Default)]
pub struct CrossSums {
    /// `sum |psi_a|^2 |psi_b|^2` (without the `g_ab` factor)
    pub inter: f64,
    /// `Re sum omega conj(psi_a) psi_b`
    pub rabi: f64,
}

/// Stencil-validity bounds for one tile: the inner box shrunk by two cells
/// on every side without halo.
struct StencilBounds {
    x_lo: usize,
    x_hi: usize,
    y_lo: usize,
    y_hi: usize,
    sx_lo: usize,
    sx_hi: usize,
    sy_lo: usize,
    sy_hi: usize,
}

fn stencil_bounds(lattice: &Lattice) -> StencilBounds {
    let x_lo = lattice.halo_left;
    let x_hi = lattice.halo_left + lattice.inner_w();
    let y_lo = lattice.halo_top;
    let y_hi = lattice.halo_top + lattice.inner_h();
    let (sy_lo, sy_hi) = if lattice.ndim == 2 {
        (
            y_lo + 2 * usize::from(lattice.halo_top == 0),
            y_hi.saturating_sub(2 * usize::from(lattice.halo_bottom == 0)),
        )
    } else {
        (y_lo, y_hi)
    };
    StencilBounds {
        x_lo,
        x_hi,
        y_lo,
        y_hi,
        sx_lo: x_lo + 2 * usize::from(lattice.halo_left == 0),
        sx_hi: x_hi.saturating_sub(2 * usize::from(lattice.halo_right == 0)),
        sy_lo,
        sy_hi,
    }
}

/// Local energy sums for one component.
#[must_use]
pub fn component_sums(
    lattice: &Lattice,
    state: &State,
    potential: &dyn Potential,
    mass: f64,
    coupling: f64,
) -> ComponentSums {
    let w = lattice.dim_x();
    let bounds = stencil_bounds(lattice);
    let inv_dx2 = 1.0 / (lattice.delta_x * lattice.delta_x);
    let inv_dy2 = 1.0 / (lattice.delta_y * lattice.delta_y);
    let kinetic_prefactor = -1.0 / (2.0 * mass);

    let mut sums = ComponentSums::default();
    for ty in bounds.y_lo..bounds.y_hi {
        let gj = lattice.global_y(ty);
        for tx in bounds.x_lo..bounds.x_hi {
            let idx = ty * w + tx;
            let c = state.psi(idx);
            let dens = c.norm_sqr();
            sums.norm2 += dens;
            sums.potential += potential.value(lattice.global_x(tx), gj) * dens;
            sums.intra += 0.5 * coupling * dens * dens;

            let stencil_ok = tx >= bounds.sx_lo
                && tx < bounds.sx_hi
                && (lattice.ndim == 1 || (ty >= bounds.sy_lo && ty < bounds.sy_hi));
            if stencil_ok {
                let mut lap = Complex64::new(0.0, 0.0);
                for (k, coeff) in LAPLACIAN_STENCIL.iter().enumerate() {
                    let off = k as i64 - 2;
                    lap += *coeff * inv_dx2 * state.psi((idx as i64 + off) as usize);
                }
                if lattice.ndim == 2 {
                    for (k, coeff) in LAPLACIAN_STENCIL.iter().enumerate() {
                        let off = (k as i64 - 2) * w as i64;
                        lap += *coeff * inv_dy2 * state.psi((idx as i64 + off) as usize);
                    }
                }
                sums.kinetic += (c.conj() * kinetic_prefactor * lap).re;
            }
        }
    }
    sums
}

/// Local inter-species and Rabi sums for a component pair.
#[must_use]
pub fn cross_sums(lattice: &Lattice, a: &State, b: &State, omega: Complex64) -> CrossSums {
    let w = lattice.dim_x();
    let bounds = stencil_bounds(lattice);
    let mut sums = CrossSums::default();
    for ty in bounds.y_lo..bounds.y_hi {
        for tx in bounds.x_lo..bounds.x_hi {
            let idx = ty * w + tx;
            let ca = a.psi(idx);
            let cb = b.psi(idx);
            sums.inter += ca.norm_sqr() * cb.norm_sqr();
            sums.rabi += (omega * ca.conj() * cb).re;
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::lattice::GridConfig;
    use std::f64::consts::PI;

    #[test]
    fn plane_wave_kinetic_energy() {
        // E_kin of exp(ikx) is k^2/2m; the fourth-order stencil reproduces
        // it to O((k dx)^4).
        let n = 256;
        let length = 16.0;
        let k = 2.0 * PI / length * 2.0;
        let lat = Lattice::solo(&GridConfig::line(n, length, true)).expect("lattice");
        let state = State::plane_wave(&lat, k, 0.0);
        let sums = component_sums(
            &lat,
            &state,
            &crate::field::potential::ZeroPotential,
            1.0,
            0.0,
        );
        let e_kin = sums.kinetic / sums.norm2;
        let expected = k * k / 2.0;
        assert!(
            (e_kin - expected).abs() < 1e-6 * expected,
            "E_kin {e_kin} vs {expected}"
        );
    }

    #[test]
    fn uniform_pair_cross_sums() {
        let lat = Lattice::solo(&GridConfig::line(64, 8.0, true)).expect("lattice");
        let a = State::from_fn(&lat, |_, _| Complex64::new(1.0, 0.0));
        let b = State::from_fn(&lat, |_, _| Complex64::new(0.0, 1.0));
        let omega = Complex64::new(1.0, 0.0);
        let sums = cross_sums(&lat, &a, &b, omega);
        assert!((sums.inter - 64.0).abs() < 1e-12);
        // conj(1) * i = i, real part 0.
        assert!(sums.rabi.abs() < 1e-12);
    }
}
