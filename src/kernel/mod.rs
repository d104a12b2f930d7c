// SPDX-License-Identifier: AGPL-3.0-only

//! Evolution back ends.
//!
//! A kernel owns two padded buffers per component and advances the field by
//! one Trotter-Suzuki iteration through four phases:
//!
//!   1. [`EvolutionKernel::run_kernel_on_halo`] — apply the iteration to the
//!      bands that will be sent to neighbours
//!   2. [`EvolutionKernel::start_halo_exchange`] — post the band sends
//!      (non-blocking)
//!   3. [`EvolutionKernel::run_kernel`] — apply the iteration to the
//!      interior, overlapping the in-flight exchange
//!   4. [`EvolutionKernel::wait_for_completion`] — land the received bands
//!
//! The solver holds the kernel behind this trait and never inspects which
//! back end it has. Only the CPU back end is compiled into this build; the
//! GPU and hybrid names are still recognised so configuration errors stay
//! descriptive.

use num_complex::Complex64;

use crate::error::TidepoolError;
use crate::field::state::State;
use crate::grid::comm::{Collective, HaloLinks};
use crate::grid::lattice::{Lattice, ROTATION_HALO};

/// CPU block kernel.
pub mod cpu;

/// Kinetic pair-rotation constants for one component:
/// `(cos, sin)` of `dt / (4 m dx^2)` per axis in real time,
/// the damped `(cosh, sinh)` pair in imaginary time.
#[derive(Clone, Copy, Debug, Default)]
pub struct KineticConsts {
    /// Pair-diagonal constant along x.
    pub ax: f64,
    /// Pair-coupling constant along x.
    pub bx: f64,
    /// Pair-diagonal constant along y.
    pub ay: f64,
    /// Pair-coupling constant along y.
    pub by: f64,
}

/// Everything a kernel needs beyond geometry: regime, couplings, Trotter
/// constants, and per-component norm targets for imaginary time.
#[derive(Clone, Copy, Debug)]
pub struct KernelSettings {
    /// Time step.
    pub delta_t: f64,
    /// Imaginary-time regime flag.
    pub imag_time: bool,
    /// 1 or 2.
    pub n_components: usize,
    /// Trotter constants per component.
    pub kinetic: [KineticConsts; 2],
    /// Contact self-coupling per component.
    pub coupling: [f64; 2],
    /// Inter-species contact coupling.
    pub coupling_ab: f64,
    /// Complex Rabi amplitude.
    pub rabi_omega: Complex64,
    /// Rotating-frame angular velocity.
    pub angular_velocity: f64,
    /// Physical x of the rotation centre.
    pub rot_coord_x: f64,
    /// Physical y of the rotation centre.
    pub rot_coord_y: f64,
    /// Squared-norm target per component (imaginary time).
    pub norm_target: [f64; 2],
}

/// Back-end contract. One instance drives one rank's tile.
pub trait EvolutionKernel: Send {
    /// (Re)load buffers from `states` and adopt `settings` and the
    /// exponentiated-potential caches. Called on first evolve and whenever
    /// the regime or parameters change.
    fn configure(
        &mut self,
        settings: KernelSettings,
        ep_real: &[Vec<f64>],
        ep_imag: &[Vec<f64>],
        states: &[&State],
    );

    /// Apply the current iteration to the halo-source bands.
    fn run_kernel_on_halo(&mut self);

    /// Post the band sends toward every present neighbour; non-blocking.
    fn start_halo_exchange(&mut self);

    /// Apply the current iteration to the interior cells.
    fn run_kernel(&mut self);

    /// Land received bands and finish the iteration for the current
    /// component (sense flip, imaginary-time renormalisation).
    ///
    /// # Errors
    ///
    /// Halo-exchange disconnection or a non-finite norm reduction.
    fn wait_for_completion(&mut self) -> Result<(), TidepoolError>;

    /// Two-component only: apply the Rabi mixing `R(var * delta_t)`
    /// pointwise. No-op for a single component or zero amplitude.
    fn rabi_coupling(&mut self, var: f64, delta_t: f64);

    /// Two-component only: under imaginary time, rescale each component to
    /// its norm target. No-op in real time.
    ///
    /// # Errors
    ///
    /// Non-finite norm reduction.
    fn normalization(&mut self) -> Result<(), TidepoolError>;

    /// Replace the exponentiated-potential cache for one component.
    fn update_potential(&mut self, which: usize, ep_real: &[f64], ep_imag: &[f64]);

    /// Copy component `which`'s tile (halo included) into caller buffers.
    fn get_sample(&self, which: usize, dest_real: &mut [f64], dest_imag: &mut [f64]);
}

/// Known back-end names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelType {
    /// Threaded CPU block kernel.
    Cpu,
    /// CUDA kernel (not compiled into this build).
    Gpu,
    /// CPU+GPU hybrid (not compiled into this build).
    Hybrid,
}

impl std::str::FromStr for KernelType {
    type Err = TidepoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(TidepoolError::UnknownKernel(other.into())),
        }
    }
}

/// Build a kernel for the requested back end, enforcing the capability
/// rules the back ends advertise.
///
/// # Errors
///
/// - GPU back end with nonzero angular velocity
/// - hybrid back end with two components
/// - GPU or hybrid in a build compiled without CUDA
/// - rotation without a [`ROTATION_HALO`]-wide halo, or in 1-D
pub fn build_kernel(
    kind: KernelType,
    lattice: &Lattice,
    n_components: usize,
    angular_velocity: f64,
    links: HaloLinks,
    collective: Collective,
) -> Result<Box<dyn EvolutionKernel>, TidepoolError> {
    if angular_velocity != 0.0 {
        if lattice.ndim != 2 {
            return Err(TidepoolError::InvalidParameter(
                "rotation terms need a 2-D lattice".into(),
            ));
        }
        if lattice.halo < ROTATION_HALO {
            return Err(TidepoolError::InvalidParameter(format!(
                "rotation needs a halo of {ROTATION_HALO}, lattice has {}",
                lattice.halo
            )));
        }
    }
    match kind {
        KernelType::Cpu => Ok(Box::new(cpu::CpuKernel::new(
            lattice.clone(),
            links,
            collective,
            n_components,
        ))),
        KernelType::Gpu => {
            if angular_velocity != 0.0 {
                return Err(TidepoolError::UnsupportedBackend(
                    "the GPU kernel does not work with nonzero angular velocity".into(),
                ));
            }
            Err(TidepoolError::UnsupportedBackend(
                "compiled without CUDA".into(),
            ))
        }
        KernelType::Hybrid => {
            if n_components == 2 {
                return Err(TidepoolError::UnsupportedBackend(
                    "two-component Hamiltonians only work with the CPU and GPU kernels".into(),
                ));
            }
            Err(TidepoolError::UnsupportedBackend(
                "compiled without CUDA".into(),
            ))
        }
    }
}
