// SPDX-License-Identifier: AGPL-3.0-only

//! Complex wavefunction on the local tile.
//!
//! Two flat `f64` arrays of the tile's size (halo included), row-major.
//! Only the inner box is authoritative; halo cells are replicas maintained
//! by the exchange. Constructors evaluate an initial-state functor at the
//! wrapped *global* indices, so halo cells start consistent on every rank
//! without an exchange.
//!
//! Expectation values (position and momentum moments) are cached behind a
//! staleness flag; evolution clears the cache through
//! [`State::invalidate_expectations`]. Moment getters reduce across the
//! mesh, so every rank must call them in the same order.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::TidepoolError;
use crate::grid::comm::Collective;
use crate::grid::lattice::Lattice;

/// First-derivative five-point stencil, coefficients for offsets -2..=2,
/// to be divided by the grid spacing.
pub const DERIVATIVE_STENCIL: [f64; 5] = [1.0 / 12.0, -2.0 / 3.0, 0.0, 2.0 / 3.0, -1.0 / 12.0];

/// Cached first and second moments of position and momentum.
#[derive(Clone, Copy, Debug, Default)]
struct Moments {
    x: f64,
    xx: f64,
    y: f64,
    yy: f64,
    px: f64,
    pxpx: f64,
    py: f64,
    pypy: f64,
}

/// One complex scalar field on the local tile.
pub struct State {
    /// Real part, `dim_x * dim_y` row-major cells including halo.
    pub p_real: Vec<f64>,
    /// Imaginary part.
    pub p_imag: Vec<f64>,
    moments: Option<Moments>,
}

impl State {
    /// All-zero field on `lattice`'s tile.
    #[must_use]
    pub fn zeroed(lattice: &Lattice) -> Self {
        Self {
            p_real: vec![0.0; lattice.tile_len()],
            p_imag: vec![0.0; lattice.tile_len()],
            moments: None,
        }
    }

    /// Evaluate `f` at the wrapped global indices of every tile cell.
    #[must_use]
    pub fn from_fn(lattice: &Lattice, f: impl Fn(usize, usize) -> Complex64) -> Self {
        let (w, h) = (lattice.dim_x(), lattice.dim_y());
        let mut p_real = vec![0.0; w * h];
        let mut p_imag = vec![0.0; w * h];
        for ty in 0..h {
            let gj = lattice.global_y(ty);
            for tx in 0..w {
                let v = f(lattice.global_x(tx), gj);
                p_real[ty * w + tx] = v.re;
                p_imag[ty * w + tx] = v.im;
            }
        }
        Self {
            p_real,
            p_imag,
            moments: None,
        }
    }

    /// Normalised Gaussian packet centred at physical `(x0, y0)` with
    /// width `sigma` per axis.
    #[must_use]
    pub fn gaussian_packet(lattice: &Lattice, x0: f64, y0: f64, sigma: f64) -> Self {
        let norm_1d = (PI * sigma * sigma).powf(-0.25);
        let lat = lattice.clone();
        Self::from_fn(lattice, move |i, j| {
            let x = lat.x_at(i) - x0;
            let mut amp = norm_1d * (-x * x / (2.0 * sigma * sigma)).exp();
            if lat.ndim == 2 {
                let y = lat.y_at(j) - y0;
                amp *= norm_1d * (-y * y / (2.0 * sigma * sigma)).exp();
            }
            Complex64::new(amp, 0.0)
        })
    }

    /// Plane wave `exp(i (kx x + ky y))` with box normalisation.
    #[must_use]
    pub fn plane_wave(lattice: &Lattice, kx: f64, ky: f64) -> Self {
        let volume = if lattice.ndim == 1 {
            lattice.global_dim_x as f64 * lattice.delta_x
        } else {
            lattice.global_dim_x as f64
                * lattice.delta_x
                * lattice.global_dim_y as f64
                * lattice.delta_y
        };
        let amp = volume.sqrt().recip();
        let lat = lattice.clone();
        Self::from_fn(lattice, move |i, j| {
            let mut phase = kx * lat.x_at(i);
            if lat.ndim == 2 {
                phase += ky * lat.y_at(j);
            }
            Complex64::from_polar(amp, phase)
        })
    }

    /// Dirichlet-box eigenstate `sin(nx pi (i+1)/(Nx+1)) [* sin(... y)]`,
    /// normalised exactly on the discrete grid.
    #[must_use]
    pub fn sinusoid(lattice: &Lattice, nx: usize, ny: usize) -> Self {
        let nxp = lattice.global_dim_x as f64 + 1.0;
        let nyp = lattice.global_dim_y as f64 + 1.0;
        let amp_x = (2.0 / (nxp * lattice.delta_x)).sqrt();
        let amp_y = (2.0 / (nyp * lattice.delta_y)).sqrt();
        let ndim = lattice.ndim;
        Self::from_fn(lattice, move |i, j| {
            let mut v = amp_x * (nx as f64 * PI * (i as f64 + 1.0) / nxp).sin();
            if ndim == 2 {
                v *= amp_y * (ny as f64 * PI * (j as f64 + 1.0) / nyp).sin();
            }
            Complex64::new(v, 0.0)
        })
    }

    /// Harmonic ground state times `(1 + sqrt(2 w) x)`: an equal-weight
    /// superposition of the ground and first x-excited oscillator states.
    #[must_use]
    pub fn excited_superposition_x(lattice: &Lattice, omega: f64) -> Self {
        let lat = lattice.clone();
        Self::from_fn(lattice, move |i, j| {
            let x = lat.x_at(i);
            let y = if lat.ndim == 2 { lat.y_at(j) } else { 0.0 };
            let gauss = (0.5 * omega / PI).sqrt() * (-(x * x + y * y) * 0.5 * omega).exp();
            Complex64::new(gauss * (1.0 + (2.0 * omega).sqrt() * x), 0.0)
        })
    }

    /// Rebuild a state from global real and imaginary fields (row-major,
    /// `dim_x * dim_y` each), replicating halo cells by the wrapped index.
    ///
    /// # Errors
    ///
    /// [`TidepoolError::InvalidParameter`] when the field sizes do not match
    /// the global grid.
    pub fn from_global_fields(
        lattice: &Lattice,
        re: &[f64],
        im: &[f64],
    ) -> Result<Self, TidepoolError> {
        let expect = lattice.global_dim_x * lattice.global_dim_y;
        if re.len() != expect || im.len() != expect {
            return Err(TidepoolError::InvalidParameter(format!(
                "global field of {} cells does not match {} x {} grid",
                re.len(),
                lattice.global_dim_x,
                lattice.global_dim_y
            )));
        }
        let nx = lattice.global_dim_x;
        Ok(Self::from_fn(lattice, |i, j| {
            Complex64::new(re[j * nx + i], im[j * nx + i])
        }))
    }

    /// Complex value at a flat tile index.
    #[must_use]
    pub fn psi(&self, idx: usize) -> Complex64 {
        Complex64::new(self.p_real[idx], self.p_imag[idx])
    }

    /// Squared norm over the inner box, reduced across the mesh:
    /// `sum |psi|^2 * dV`.
    #[must_use]
    pub fn squared_norm(&self, lattice: &Lattice, collective: &Collective) -> f64 {
        let w = lattice.dim_x();
        let mut local = 0.0;
        for ty in lattice.halo_top..lattice.halo_top + lattice.inner_h() {
            for tx in lattice.halo_left..lattice.halo_left + lattice.inner_w() {
                let idx = ty * w + tx;
                local += self.p_real[idx] * self.p_real[idx] + self.p_imag[idx] * self.p_imag[idx];
            }
        }
        collective.all_sum(&[local])[0] * lattice.cell_volume()
    }

    /// Drop cached expectation values; called after every evolution batch.
    pub fn invalidate_expectations(&mut self) {
        self.moments = None;
    }

    /// `<x>` (collective).
    pub fn mean_x(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).x
    }

    /// `<x^2>` (collective).
    pub fn mean_xx(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).xx
    }

    /// `<y>` (collective).
    pub fn mean_y(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).y
    }

    /// `<y^2>` (collective).
    pub fn mean_yy(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).yy
    }

    /// `<p_x>` (collective).
    pub fn mean_px(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).px
    }

    /// `<p_x^2>` (collective).
    pub fn mean_pxpx(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).pxpx
    }

    /// `<p_y>` (collective).
    pub fn mean_py(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).py
    }

    /// `<p_y^2>` (collective).
    pub fn mean_pypy(&mut self, lattice: &Lattice, collective: &Collective) -> f64 {
        self.ensure_moments(lattice, collective).pypy
    }

    fn ensure_moments(&mut self, lattice: &Lattice, collective: &Collective) -> Moments {
        if let Some(m) = self.moments {
            return m;
        }
        let sums = self.local_moment_sums(lattice);
        let tot = collective.all_sum(&sums);
        let norm = tot[0].max(crate::tolerances::DIVISION_GUARD);
        let m = Moments {
            x: tot[1] / norm,
            xx: tot[2] / norm,
            y: tot[3] / norm,
            yy: tot[4] / norm,
            px: tot[5] / norm,
            pxpx: tot[6] / norm,
            py: tot[7] / norm,
            pypy: tot[8] / norm,
        };
        self.moments = Some(m);
        m
    }

    /// Raw local sums `[norm, x, xx, y, yy, px, pxpx, py, pypy]` over the
    /// inner box. Momentum terms use the five-point derivative and skip two
    /// cells inward from any edge without halo, where the stencil would
    /// leave the valid region.
    fn local_moment_sums(&self, lattice: &Lattice) -> [f64; 9] {
        let w = lattice.dim_x();
        let x_lo = lattice.halo_left;
        let x_hi = lattice.halo_left + lattice.inner_w();
        let y_lo = lattice.halo_top;
        let y_hi = lattice.halo_top + lattice.inner_h();
        let skip_x_lo = x_lo + 2 * usize::from(lattice.halo_left == 0);
        let skip_x_hi = x_hi.saturating_sub(2 * usize::from(lattice.halo_right == 0));
        let skip_y_lo = y_lo + 2 * usize::from(lattice.halo_top == 0);
        let skip_y_hi = if lattice.ndim == 2 {
            y_hi.saturating_sub(2 * usize::from(lattice.halo_bottom == 0))
        } else {
            y_hi
        };

        let mut s = [0.0; 9];
        for ty in y_lo..y_hi {
            let y_phys = lattice.y_at(lattice.global_y(ty));
            for tx in x_lo..x_hi {
                let idx = ty * w + tx;
                let c = self.psi(idx);
                let dens = c.norm_sqr();
                let x_phys = lattice.x_at(lattice.global_x(tx));
                s[0] += dens;
                s[1] += x_phys * dens;
                s[2] += x_phys * x_phys * dens;
                if lattice.ndim == 2 {
                    s[3] += y_phys * dens;
                    s[4] += y_phys * y_phys * dens;
                }

                if tx >= skip_x_lo && tx < skip_x_hi {
                    let mut d = Complex64::new(0.0, 0.0);
                    for (k, coeff) in DERIVATIVE_STENCIL.iter().enumerate() {
                        let off = k as i64 - 2;
                        let nb = (idx as i64 + off) as usize;
                        d += *coeff * self.psi(nb);
                    }
                    d /= lattice.delta_x;
                    let prod = c.conj() * d;
                    s[5] += prod.im;
                    s[6] += d.norm_sqr();
                }
                if lattice.ndim == 2 && ty >= skip_y_lo && ty < skip_y_hi {
                    let mut d = Complex64::new(0.0, 0.0);
                    for (k, coeff) in DERIVATIVE_STENCIL.iter().enumerate() {
                        let off = (k as i64 - 2) * w as i64;
                        let nb = (idx as i64 + off) as usize;
                        d += *coeff * self.psi(nb);
                    }
                    d /= lattice.delta_y;
                    let prod = c.conj() * d;
                    s[7] += prod.im;
                    s[8] += d.norm_sqr();
                }
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::lattice::GridConfig;

    fn solo_line(n: usize, length: f64, periodic: bool) -> Lattice {
        Lattice::solo(&GridConfig::line(n, length, periodic)).expect("lattice")
    }

    #[test]
    fn gaussian_norm_is_close_to_one() {
        let lat = solo_line(512, 40.0, false);
        let state = State::gaussian_packet(&lat, 0.0, 0.0, 1.0);
        let norm = state.squared_norm(&lat, &Collective::solo());
        assert!((norm - 1.0).abs() < 1e-6, "discrete norm {norm}");
    }

    #[test]
    fn sinusoid_norm_is_exact() {
        let lat = solo_line(256, 10.0, false);
        let state = State::sinusoid(&lat, 1, 1);
        let norm = state.squared_norm(&lat, &Collective::solo());
        assert!((norm - 1.0).abs() < 1e-12, "discrete norm {norm}");
    }

    #[test]
    fn plane_wave_momentum_mean() {
        let n = 256;
        let length = 16.0;
        let k = 2.0 * PI / length * 3.0;
        let lat = solo_line(n, length, true);
        let mut state = State::plane_wave(&lat, k, 0.0);
        let coll = Collective::solo();
        let px = state.mean_px(&lat, &coll);
        assert!(
            (px - k).abs() < 1e-3 * k,
            "plane wave <p_x> = {px}, expected {k}"
        );
    }

    #[test]
    fn gaussian_position_moments() {
        let lat = solo_line(512, 40.0, false);
        let mut state = State::gaussian_packet(&lat, 1.5, 0.0, 1.0);
        let coll = Collective::solo();
        assert!((state.mean_x(&lat, &coll) - 1.5).abs() < 1e-6);
        // <x^2> - <x>^2 = sigma^2 / 2 for a Gaussian density.
        let var = state.mean_xx(&lat, &coll) - 1.5 * 1.5;
        assert!((var - 0.5).abs() < 1e-6, "variance {var}");
    }

    #[test]
    fn global_field_round_trip_matches_tile() {
        let lat = solo_line(64, 4.0, true);
        let state = State::plane_wave(&lat, 2.0 * PI / 4.0, 0.0);
        // Extract the global inner field, rebuild, compare the whole tile
        // (halo replication included).
        let mut re = vec![0.0; 64];
        let mut im = vec![0.0; 64];
        for i in 0..64 {
            re[i] = state.p_real[lat.halo_left + i];
            im[i] = state.p_imag[lat.halo_left + i];
        }
        let rebuilt = State::from_global_fields(&lat, &re, &im).expect("rebuild");
        assert_eq!(rebuilt.p_real, state.p_real);
        assert_eq!(rebuilt.p_imag, state.p_imag);
    }
}
