// SPDX-License-Identifier: AGPL-3.0-only

//! Threaded CPU block kernel.
//!
//! One iteration applies the whole second-order factor sequence block-wise:
//! every block copies itself plus a halo-wide skirt from the read buffer
//! into scratch, runs each factor in scratch, and writes back only its own
//! interior to the write buffer. Writes are disjoint, so blocks run under
//! rayon without locks. Cells near the scratch edge go stale by one cell per
//! pair pass along that axis; the skirt width equals the per-axis pass
//! count, so every written cell is exact.
//!
//! Kinetic factors are 2x2 pair rotations tiled red/black with *global*
//! parity, which keeps the pairing identical across any tile decomposition.
//! The pointwise potential factor folds in the density-dependent
//! Gross-Pitaevskii terms from the live densities. Under rotation the
//! kinetic half-steps are chased by shear half-steps whose pair angle grows
//! linearly with the distance from the rotation centre.
//!
//! Halo-adjacent blocks run first so their bands can travel while the
//! interior computes; `wait_for_completion` lands the received bands, flips
//! the buffer sense, and (single component, imaginary time) renormalises.

use rayon::prelude::*;

use num_complex::Complex64;

use crate::error::TidepoolError;
use crate::field::state::State;
use crate::grid::comm::{Collective, HaloLinks, HaloMsg};
use crate::grid::lattice::{Direction, Lattice};
use crate::kernel::{EvolutionKernel, KernelSettings, KineticConsts};
use crate::tolerances::DIVISION_GUARD;

const BLOCK_W: usize = 128;
const BLOCK_H: usize = 64;

/// Write region of one block, in tile coordinates (subset of the inner box).
#[derive(Clone, Copy, Debug)]
struct Block {
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
}

/// One factor of the per-iteration sequence. The `usize` is the red/black
/// offset: pairs start at cells whose *global* index parity equals it.
#[derive(Clone, Copy, Debug)]
enum Pass {
    KineticX(usize),
    KineticY(usize),
    ShearX(usize),
    ShearY(usize),
    Potential,
}

struct BlockPatch {
    block: Block,
    re: Vec<f64>,
    im: Vec<f64>,
}

/// Shared-reference bundle handed to the parallel block workers.
struct PassContext<'a> {
    lattice: &'a Lattice,
    settings: &'a KernelSettings,
    sequence: &'a [Pass],
    which: usize,
    read_re: &'a [f64],
    read_im: &'a [f64],
    other_re: Option<&'a [f64]>,
    other_im: Option<&'a [f64]>,
    ep_re: &'a [f64],
    ep_im: &'a [f64],
}

/// Threaded CPU block kernel for one rank's tile.
pub struct CpuKernel {
    lattice: Lattice,
    links: HaloLinks,
    collective: Collective,
    n_components: usize,
    settings: KernelSettings,
    // buf_re[component][sense]
    buf_re: Vec<[Vec<f64>; 2]>,
    buf_im: Vec<[Vec<f64>; 2]>,
    sense: [usize; 2],
    ep_re: Vec<Vec<f64>>,
    ep_im: Vec<Vec<f64>>,
    sequence: Vec<Pass>,
    halo_blocks: Vec<Block>,
    interior_blocks: Vec<Block>,
    current: usize,
    stepped: bool,
    exchange_started: bool,
}

impl CpuKernel {
    /// Kernel shell bound to one rank's tile and channels; buffers are
    /// loaded by [`EvolutionKernel::configure`].
    #[must_use]
    pub fn new(
        lattice: Lattice,
        links: HaloLinks,
        collective: Collective,
        n_components: usize,
    ) -> Self {
        Self {
            lattice,
            links,
            collective,
            n_components,
            settings: KernelSettings {
                delta_t: 0.0,
                imag_time: false,
                n_components,
                kinetic: [KineticConsts::default(); 2],
                coupling: [0.0; 2],
                coupling_ab: 0.0,
                rabi_omega: Complex64::new(0.0, 0.0),
                angular_velocity: 0.0,
                rot_coord_x: 0.0,
                rot_coord_y: 0.0,
                norm_target: [0.0; 2],
            },
            buf_re: Vec::new(),
            buf_im: Vec::new(),
            sense: [0, 0],
            ep_re: Vec::new(),
            ep_im: Vec::new(),
            sequence: Vec::new(),
            halo_blocks: Vec::new(),
            interior_blocks: Vec::new(),
            current: 0,
            stepped: false,
            exchange_started: false,
        }
    }

    fn build_sequence(&mut self) {
        let rotating = self.settings.angular_velocity != 0.0 && self.lattice.ndim == 2;
        let mut first_half = vec![Pass::KineticX(0), Pass::KineticX(1)];
        if rotating {
            first_half.push(Pass::ShearX(0));
            first_half.push(Pass::ShearX(1));
        }
        if self.lattice.ndim == 2 {
            first_half.push(Pass::KineticY(0));
            first_half.push(Pass::KineticY(1));
            if rotating {
                first_half.push(Pass::ShearY(0));
                first_half.push(Pass::ShearY(1));
            }
        }
        let mut seq = first_half.clone();
        seq.push(Pass::Potential);
        seq.extend(first_half.iter().rev());
        self.sequence = seq;
    }

    fn build_blocks(&mut self) {
        let lat = &self.lattice;
        let (x_lo, y_lo) = (lat.halo_left, lat.halo_top);
        let (iw, ih) = (lat.inner_w(), lat.inner_h());
        let halo = lat.halo;
        self.halo_blocks.clear();
        self.interior_blocks.clear();
        let mut by = 0;
        while by < ih {
            let bh = BLOCK_H.min(ih - by);
            let mut bx = 0;
            while bx < iw {
                let bw = BLOCK_W.min(iw - bx);
                let block = Block {
                    x0: x_lo + bx,
                    y0: y_lo + by,
                    w: bw,
                    h: bh,
                };
                let touches_band = (lat.halo_left > 0 && bx < halo)
                    || (lat.halo_right > 0 && bx + bw > iw - halo)
                    || (lat.halo_top > 0 && by < halo)
                    || (lat.halo_bottom > 0 && by + bh > ih - halo);
                if touches_band {
                    self.halo_blocks.push(block);
                } else {
                    self.interior_blocks.push(block);
                }
                bx += bw;
            }
            by += bh;
        }
    }

    fn run_blocks(&mut self, halo_phase: bool) {
        let which = self.current;
        let read = self.sense[which];
        let blocks: Vec<Block> = if halo_phase {
            self.halo_blocks.clone()
        } else {
            self.interior_blocks.clone()
        };
        if blocks.is_empty() {
            self.stepped = true;
            return;
        }
        let (other_re, other_im) = if self.n_components == 2 {
            let o = 1 - which;
            let os = self.sense[o];
            (
                Some(self.buf_re[o][os].as_slice()),
                Some(self.buf_im[o][os].as_slice()),
            )
        } else {
            (None, None)
        };
        let ctx = PassContext {
            lattice: &self.lattice,
            settings: &self.settings,
            sequence: &self.sequence,
            which,
            read_re: &self.buf_re[which][read],
            read_im: &self.buf_im[which][read],
            other_re,
            other_im,
            ep_re: &self.ep_re[which],
            ep_im: &self.ep_im[which],
        };
        let patches: Vec<BlockPatch> = blocks
            .par_iter()
            .map(|&block| process_block(&ctx, block))
            .collect();

        let w = self.lattice.dim_x();
        let write = 1 - read;
        for patch in patches {
            let b = patch.block;
            for r in 0..b.h {
                let dst = (b.y0 + r) * w + b.x0;
                let src = r * b.w;
                self.buf_re[which][write][dst..dst + b.w]
                    .copy_from_slice(&patch.re[src..src + b.w]);
                self.buf_im[which][write][dst..dst + b.w]
                    .copy_from_slice(&patch.im[src..src + b.w]);
            }
        }
        self.stepped = true;
    }

    /// Source band for an outgoing message: the outermost halo-wide strip
    /// of the inner box on the side facing `dir`.
    fn band_source(&self, dir: Direction) -> Block {
        let lat = &self.lattice;
        let halo = lat.halo;
        let (x_lo, y_lo) = (lat.halo_left, lat.halo_top);
        let (iw, ih) = (lat.inner_w(), lat.inner_h());
        let x_band = |east: bool| if east { x_lo + iw - halo } else { x_lo };
        let y_band = |south: bool| if south { y_lo + ih - halo } else { y_lo };
        match dir {
            Direction::West => Block {
                x0: x_lo,
                y0: y_lo,
                w: halo,
                h: ih,
            },
            Direction::East => Block {
                x0: x_band(true),
                y0: y_lo,
                w: halo,
                h: ih,
            },
            Direction::North => Block {
                x0: x_lo,
                y0: y_lo,
                w: iw,
                h: halo,
            },
            Direction::South => Block {
                x0: x_lo,
                y0: y_band(true),
                w: iw,
                h: halo,
            },
            Direction::NorthWest => Block {
                x0: x_band(false),
                y0: y_band(false),
                w: halo,
                h: halo,
            },
            Direction::NorthEast => Block {
                x0: x_band(true),
                y0: y_band(false),
                w: halo,
                h: halo,
            },
            Direction::SouthWest => Block {
                x0: x_band(false),
                y0: y_band(true),
                w: halo,
                h: halo,
            },
            Direction::SouthEast => Block {
                x0: x_band(true),
                y0: y_band(true),
                w: halo,
                h: halo,
            },
        }
    }

    /// Landing region for an incoming message: the halo ring on the side
    /// the message arrives from.
    fn band_landing(&self, dir: Direction) -> Block {
        let lat = &self.lattice;
        let (x_lo, y_lo) = (lat.halo_left, lat.halo_top);
        let (iw, ih) = (lat.inner_w(), lat.inner_h());
        match dir {
            Direction::West => Block {
                x0: 0,
                y0: y_lo,
                w: lat.halo_left,
                h: ih,
            },
            Direction::East => Block {
                x0: x_lo + iw,
                y0: y_lo,
                w: lat.halo_right,
                h: ih,
            },
            Direction::North => Block {
                x0: x_lo,
                y0: 0,
                w: iw,
                h: lat.halo_top,
            },
            Direction::South => Block {
                x0: x_lo,
                y0: y_lo + ih,
                w: iw,
                h: lat.halo_bottom,
            },
            Direction::NorthWest => Block {
                x0: 0,
                y0: 0,
                w: lat.halo_left,
                h: lat.halo_top,
            },
            Direction::NorthEast => Block {
                x0: x_lo + iw,
                y0: 0,
                w: lat.halo_right,
                h: lat.halo_top,
            },
            Direction::SouthWest => Block {
                x0: 0,
                y0: y_lo + ih,
                w: lat.halo_left,
                h: lat.halo_bottom,
            },
            Direction::SouthEast => Block {
                x0: x_lo + iw,
                y0: y_lo + ih,
                w: lat.halo_right,
                h: lat.halo_bottom,
            },
        }
    }

    fn extract_band(&self, which: usize, sense: usize, b: Block) -> (Vec<f64>, Vec<f64>) {
        let w = self.lattice.dim_x();
        let mut re = Vec::with_capacity(b.w * b.h);
        let mut im = Vec::with_capacity(b.w * b.h);
        for r in 0..b.h {
            let src = (b.y0 + r) * w + b.x0;
            re.extend_from_slice(&self.buf_re[which][sense][src..src + b.w]);
            im.extend_from_slice(&self.buf_im[which][sense][src..src + b.w]);
        }
        (re, im)
    }

    fn land_band(&mut self, which: usize, sense: usize, b: Block, msg: &HaloMsg) {
        let w = self.lattice.dim_x();
        for r in 0..b.h {
            let dst = (b.y0 + r) * w + b.x0;
            let src = r * b.w;
            self.buf_re[which][sense][dst..dst + b.w].copy_from_slice(&msg.re[src..src + b.w]);
            self.buf_im[which][sense][dst..dst + b.w].copy_from_slice(&msg.im[src..src + b.w]);
        }
    }

    /// Rescale component `c` so its reduced squared norm hits the target.
    fn renormalize(&mut self, c: usize) -> Result<(), TidepoolError> {
        let lat = &self.lattice;
        let w = lat.dim_x();
        let s = self.sense[c];
        let mut local = 0.0;
        for ty in lat.halo_top..lat.halo_top + lat.inner_h() {
            for tx in lat.halo_left..lat.halo_left + lat.inner_w() {
                let idx = ty * w + tx;
                let re = self.buf_re[c][s][idx];
                let im = self.buf_im[c][s][idx];
                local += re * re + im * im;
            }
        }
        let total = self.collective.checked_all_sum(&[local])?[0] * lat.cell_volume();
        let factor = (self.settings.norm_target[c] / total.max(DIVISION_GUARD)).sqrt();
        for v in &mut self.buf_re[c][s] {
            *v *= factor;
        }
        for v in &mut self.buf_im[c][s] {
            *v *= factor;
        }
        Ok(())
    }
}

impl EvolutionKernel for CpuKernel {
    fn configure(
        &mut self,
        settings: KernelSettings,
        ep_real: &[Vec<f64>],
        ep_imag: &[Vec<f64>],
        states: &[&State],
    ) {
        self.settings = settings;
        self.n_components = settings.n_components;
        self.buf_re = states
            .iter()
            .map(|s| [s.p_real.clone(), s.p_real.clone()])
            .collect();
        self.buf_im = states
            .iter()
            .map(|s| [s.p_imag.clone(), s.p_imag.clone()])
            .collect();
        self.sense = [0, 0];
        self.ep_re = ep_real.to_vec();
        self.ep_im = ep_imag.to_vec();
        self.current = 0;
        self.stepped = false;
        self.exchange_started = false;
        self.build_sequence();
        self.build_blocks();
    }

    fn run_kernel_on_halo(&mut self) {
        self.run_blocks(true);
    }

    fn start_halo_exchange(&mut self) {
        let which = self.current;
        let src = if self.stepped {
            1 - self.sense[which]
        } else {
            self.sense[which]
        };
        for dir in Direction::ALL {
            if let Some(tx) = &self.links.send[dir.index()] {
                let band = self.band_source(dir);
                let (re, im) = self.extract_band(which, src, band);
                // A closed peer is reported by the matching receive.
                let _ = tx.send(HaloMsg { which, re, im });
            }
        }
        self.exchange_started = true;
    }

    fn run_kernel(&mut self) {
        self.run_blocks(false);
    }

    fn wait_for_completion(&mut self) -> Result<(), TidepoolError> {
        let which = self.current;
        let dst = if self.stepped {
            1 - self.sense[which]
        } else {
            self.sense[which]
        };
        if self.exchange_started {
            for dir in Direction::ALL {
                let msg = match &self.links.recv[dir.index()] {
                    Some(rx) => rx.recv().map_err(|_| {
                        TidepoolError::HaloExchange(format!(
                            "neighbour toward {:?} terminated mid-exchange",
                            dir.opposite()
                        ))
                    })?,
                    None => continue,
                };
                debug_assert_eq!(msg.which, which, "component-tag mismatch");
                let landing = self.band_landing(dir);
                self.land_band(which, dst, landing, &msg);
            }
            self.exchange_started = false;
        }
        if self.stepped {
            self.sense[which] = dst;
            self.stepped = false;
            if self.settings.imag_time && self.n_components == 1 {
                self.renormalize(0)?;
            }
            if self.n_components == 2 {
                self.current = 1 - which;
            }
        }
        Ok(())
    }

    fn rabi_coupling(&mut self, var: f64, delta_t: f64) {
        if self.n_components < 2 {
            return;
        }
        let omega = self.settings.rabi_omega;
        let mag = omega.norm();
        if mag == 0.0 {
            return;
        }
        let phi = 0.5 * var * delta_t * mag;
        let u = omega / mag;
        let (sa, sb) = (self.sense[0], self.sense[1]);
        let (ca, cb) = if self.settings.imag_time {
            // exp(-tau M / 2) with M = [[0, omega], [conj(omega), 0]]
            (phi.cosh(), -phi.sinh())
        } else {
            (phi.cos(), -phi.sin())
        };
        for idx in 0..self.lattice.tile_len() {
            let a = Complex64::new(self.buf_re[0][sa][idx], self.buf_im[0][sa][idx]);
            let b = Complex64::new(self.buf_re[1][sb][idx], self.buf_im[1][sb][idx]);
            let (na, nb) = if self.settings.imag_time {
                (ca * a + cb * u * b, cb * u.conj() * a + ca * b)
            } else {
                // exp(-i tau M / 2): the off-diagonal picks up the -i.
                let mix = Complex64::new(0.0, cb);
                (ca * a + mix * u * b, mix * u.conj() * a + ca * b)
            };
            self.buf_re[0][sa][idx] = na.re;
            self.buf_im[0][sa][idx] = na.im;
            self.buf_re[1][sb][idx] = nb.re;
            self.buf_im[1][sb][idx] = nb.im;
        }
    }

    fn normalization(&mut self) -> Result<(), TidepoolError> {
        if self.n_components < 2 || !self.settings.imag_time {
            return Ok(());
        }
        self.renormalize(0)?;
        self.renormalize(1)
    }

    fn update_potential(&mut self, which: usize, ep_real: &[f64], ep_imag: &[f64]) {
        self.ep_re[which].copy_from_slice(ep_real);
        self.ep_im[which].copy_from_slice(ep_imag);
    }

    fn get_sample(&self, which: usize, dest_real: &mut [f64], dest_imag: &mut [f64]) {
        let s = self.sense[which];
        dest_real.copy_from_slice(&self.buf_re[which][s]);
        dest_imag.copy_from_slice(&self.buf_im[which][s]);
    }
}

/// Run the whole factor sequence for one block in scratch and return the
/// exact interior.
fn process_block(ctx: &PassContext<'_>, b: Block) -> BlockPatch {
    let lat = ctx.lattice;
    let sx = lat.halo;
    let sy = if lat.ndim == 2 { lat.halo } else { 0 };
    let sw = b.w + 2 * sx;
    let sh = b.h + 2 * sy;
    let (tile_w, tile_h) = (lat.dim_x(), lat.dim_y());

    let mut re = vec![0.0; sw * sh];
    let mut im = vec![0.0; sw * sh];
    for r in 0..sh {
        let ty = b.y0 as i64 + r as i64 - sy as i64;
        if ty < 0 || ty >= tile_h as i64 {
            continue;
        }
        for c in 0..sw {
            let tx = b.x0 as i64 + c as i64 - sx as i64;
            if tx < 0 || tx >= tile_w as i64 {
                continue;
            }
            let src = ty as usize * tile_w + tx as usize;
            re[r * sw + c] = ctx.read_re[src];
            im[r * sw + c] = ctx.read_im[src];
        }
    }

    // Global indices of scratch cell (0, 0).
    let gx0 = lat.start_x() + b.x0 as i64 - sx as i64;
    let gy0 = lat.start_y() + b.y0 as i64 - sy as i64;

    // Columns/rows whose global index is inside the domain; pairs crossing
    // a Dirichlet edge are skipped so the boundary stays exactly unitary.
    let (cx_lo, cx_hi) = if lat.periodic_x {
        (0, sw)
    } else {
        (
            (-gx0).max(0) as usize,
            (lat.global_dim_x as i64 - gx0).clamp(0, sw as i64) as usize,
        )
    };
    let (cy_lo, cy_hi) = if lat.periodic_y {
        (0, sh)
    } else {
        (
            (-gy0).max(0) as usize,
            (lat.global_dim_y as i64 - gy0).clamp(0, sh as i64) as usize,
        )
    };

    let kc = ctx.settings.kinetic[ctx.which];
    for pass in ctx.sequence {
        match *pass {
            Pass::KineticX(offset) => {
                pair_pass_x(
                    &mut re,
                    &mut im,
                    sw,
                    sh,
                    gx0,
                    offset,
                    cx_lo,
                    cx_hi,
                    |_r| (kc.ax, kc.bx),
                    ctx.settings.imag_time,
                    false,
                );
            }
            Pass::KineticY(offset) => {
                pair_pass_y(
                    &mut re,
                    &mut im,
                    sw,
                    sh,
                    gy0,
                    offset,
                    cy_lo,
                    cy_hi,
                    |_c| (kc.ay, kc.by),
                    ctx.settings.imag_time,
                    false,
                );
            }
            Pass::ShearX(offset) => {
                let s = ctx.settings;
                let coeff = s.angular_velocity * s.delta_t / (8.0 * lat.delta_x);
                pair_pass_x(
                    &mut re,
                    &mut im,
                    sw,
                    sh,
                    gx0,
                    offset,
                    cx_lo,
                    cx_hi,
                    |r| {
                        let y_phys = ((gy0 + r as i64) as f64 - lat.global_dim_y as f64 / 2.0)
                            * lat.delta_y;
                        let beta = coeff * (y_phys - s.rot_coord_y);
                        (beta.cos(), beta.sin())
                    },
                    s.imag_time,
                    true,
                );
            }
            Pass::ShearY(offset) => {
                let s = ctx.settings;
                let coeff = -s.angular_velocity * s.delta_t / (8.0 * lat.delta_y);
                pair_pass_y(
                    &mut re,
                    &mut im,
                    sw,
                    sh,
                    gy0,
                    offset,
                    cy_lo,
                    cy_hi,
                    |c| {
                        let x_phys = ((gx0 + c as i64) as f64 - lat.global_dim_x as f64 / 2.0)
                            * lat.delta_x;
                        let beta = coeff * (x_phys - s.rot_coord_x);
                        (beta.cos(), beta.sin())
                    },
                    s.imag_time,
                    true,
                );
            }
            Pass::Potential => {
                potential_pass(ctx, b, &mut re, &mut im, sw, sh, sx, sy);
            }
        }
    }

    let mut out_re = vec![0.0; b.w * b.h];
    let mut out_im = vec![0.0; b.w * b.h];
    for r in 0..b.h {
        let src = (r + sy) * sw + sx;
        out_re[r * b.w..(r + 1) * b.w].copy_from_slice(&re[src..src + b.w]);
        out_im[r * b.w..(r + 1) * b.w].copy_from_slice(&im[src..src + b.w]);
    }
    BlockPatch {
        block: b,
        re: out_re,
        im: out_im,
    }
}

/// 2x2 pair updates along x. `consts(row)` yields `(h_a, h_b)` for each
/// scratch row (row-dependent only for shear). `shear` selects the real
/// translation mixing instead of the `i`-coupled kinetic mixing.
#[allow(clippy::too_many_arguments)]
fn pair_pass_x(
    re: &mut [f64],
    im: &mut [f64],
    sw: usize,
    sh: usize,
    gx0: i64,
    offset: usize,
    cx_lo: usize,
    cx_hi: usize,
    consts: impl Fn(usize) -> (f64, f64),
    imag_time: bool,
    shear: bool,
) {
    for r in 0..sh {
        let (ha, hb) = consts(r);
        let mut c = cx_lo;
        if (gx0 + c as i64).rem_euclid(2) as usize != offset {
            c += 1;
        }
        while c + 1 < cx_hi {
            let i1 = r * sw + c;
            let i2 = i1 + 1;
            pair_update(re, im, i1, i2, ha, hb, imag_time, shear);
            c += 2;
        }
    }
}

/// 2x2 pair updates along y; mirror of [`pair_pass_x`] with row stride.
#[allow(clippy::too_many_arguments)]
fn pair_pass_y(
    re: &mut [f64],
    im: &mut [f64],
    sw: usize,
    _sh: usize,
    gy0: i64,
    offset: usize,
    cy_lo: usize,
    cy_hi: usize,
    consts: impl Fn(usize) -> (f64, f64),
    imag_time: bool,
    shear: bool,
) {
    for c in 0..sw {
        let (ha, hb) = consts(c);
        let mut r = cy_lo;
        if (gy0 + r as i64).rem_euclid(2) as usize != offset {
            r += 1;
        }
        while r + 1 < cy_hi {
            let i1 = r * sw + c;
            let i2 = i1 + sw;
            pair_update(re, im, i1, i2, ha, hb, imag_time, shear);
            r += 2;
        }
    }
}

#[allow(clippy::too_many_arguments)]
#[inline]
fn pair_update(
    re: &mut [f64],
    im: &mut [f64],
    i1: usize,
    i2: usize,
    ha: f64,
    hb: f64,
    imag_time: bool,
    shear: bool,
) {
    let (ar, ai) = (re[i1], im[i1]);
    let (br, bi) = (re[i2], im[i2]);
    if shear {
        if imag_time {
            // exp(i beta G): complexified translation.
            re[i1] = ha * ar - hb * bi;
            im[i1] = ha * ai + hb * br;
            re[i2] = hb * ai + ha * br;
            im[i2] = -hb * ar + ha * bi;
        } else {
            // exp(beta G): real rotation of the pair.
            re[i1] = ha * ar + hb * br;
            im[i1] = ha * ai + hb * bi;
            re[i2] = -hb * ar + ha * br;
            im[i2] = -hb * ai + ha * bi;
        }
    } else if imag_time {
        re[i1] = ha * ar + hb * br;
        im[i1] = ha * ai + hb * bi;
        re[i2] = hb * ar + ha * br;
        im[i2] = hb * ai + ha * bi;
    } else {
        // (psi_l', psi_r') = (ha psi_l + i hb psi_r, i hb psi_l + ha psi_r)
        re[i1] = ha * ar - hb * bi;
        im[i1] = ha * ai + hb * br;
        re[i2] = ha * br - hb * ai;
        im[i2] = ha * bi + hb * ar;
    }
}

/// Pointwise potential factor: cached external exponential times the live
/// Gross-Pitaevskii density terms.
#[allow(clippy::too_many_arguments)]
fn potential_pass(
    ctx: &PassContext<'_>,
    b: Block,
    re: &mut [f64],
    im: &mut [f64],
    sw: usize,
    sh: usize,
    sx: usize,
    sy: usize,
) {
    let lat = ctx.lattice;
    let (tile_w, tile_h) = (lat.dim_x(), lat.dim_y());
    let s = ctx.settings;
    let g = s.coupling[ctx.which];
    let g_ab = if ctx.other_re.is_some() {
        s.coupling_ab
    } else {
        0.0
    };
    let nonlinear = g != 0.0 || g_ab != 0.0;
    for r in 0..sh {
        let ty = b.y0 as i64 + r as i64 - sy as i64;
        if ty < 0 || ty >= tile_h as i64 {
            continue;
        }
        for c in 0..sw {
            let tx = b.x0 as i64 + c as i64 - sx as i64;
            if tx < 0 || tx >= tile_w as i64 {
                continue;
            }
            let t_idx = ty as usize * tile_w + tx as usize;
            let i = r * sw + c;
            let (ar, ai) = (re[i], im[i]);
            let (er, ei) = (ctx.ep_re[t_idx], ctx.ep_im[t_idx]);
            let mut nr = er * ar - ei * ai;
            let mut ni = er * ai + ei * ar;
            if nonlinear {
                let mut v_nl = g * (ar * ar + ai * ai);
                if g_ab != 0.0 {
                    if let (Some(ore), Some(oim)) = (ctx.other_re, ctx.other_im) {
                        v_nl += g_ab * (ore[t_idx] * ore[t_idx] + oim[t_idx] * oim[t_idx]);
                    }
                }
                let arg = -s.delta_t * v_nl;
                if s.imag_time {
                    let damp = arg.exp();
                    nr *= damp;
                    ni *= damp;
                } else {
                    let (pc, ps) = (arg.cos(), arg.sin());
                    let tr = nr * pc - ni * ps;
                    ni = nr * ps + ni * pc;
                    nr = tr;
                }
            }
            re[i] = nr;
            im[i] = ni;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_time_pair_update_is_unitary() {
        let theta: f64 = 0.37;
        let mut re = vec![0.6, -0.2];
        let mut im = vec![0.1, 0.8];
        let before: f64 = re.iter().zip(&im).map(|(r, i)| r * r + i * i).sum();
        pair_update(
            &mut re,
            &mut im,
            0,
            1,
            theta.cos(),
            theta.sin(),
            false,
            false,
        );
        let after: f64 = re.iter().zip(&im).map(|(r, i)| r * r + i * i).sum();
        assert!((before - after).abs() < 1e-14, "norm preserved");
    }

    #[test]
    fn shear_pair_update_is_unitary() {
        let beta: f64 = 0.2;
        let mut re = vec![0.3, 0.5];
        let mut im = vec![-0.4, 0.2];
        let before: f64 = re.iter().zip(&im).map(|(r, i)| r * r + i * i).sum();
        pair_update(&mut re, &mut im, 0, 1, beta.cos(), beta.sin(), false, true);
        let after: f64 = re.iter().zip(&im).map(|(r, i)| r * r + i * i).sum();
        assert!((before - after).abs() < 1e-14, "norm preserved");
    }

    #[test]
    fn damped_imaginary_pair_never_grows() {
        // h_a = e^-t cosh t, h_b = e^-t sinh t: eigenvalues 1 and e^-2t.
        let theta: f64 = 0.25;
        let damp = (-theta).exp();
        let (ha, hb) = (damp * theta.cosh(), damp * theta.sinh());
        for (l, r) in [(1.0, 1.0), (1.0, -1.0), (0.7, 0.2)] {
            let mut re = vec![l, r];
            let mut im = vec![0.0, 0.0];
            let before: f64 = re.iter().map(|v| v * v).sum();
            pair_update(&mut re, &mut im, 0, 1, ha, hb, true, false);
            let after: f64 = re.iter().map(|v| v * v).sum();
            assert!(after <= before + 1e-14, "imaginary pair contracts");
        }
    }
}
