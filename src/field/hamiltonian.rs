// SPDX-License-Identifier: AGPL-3.0-only

//! Hamiltonian parameters for one or two coupled components.
//!
//! The two-component variant is a tagged extension whose single-component
//! view is a prefix: the solver branches once on [`SystemHamiltonian`] and
//! then drives the matching kernel entry points, never downcasting.

use num_complex::Complex64;

use crate::error::TidepoolError;
use crate::field::potential::Potential;

/// Parameters of one component: mass, contact coupling, optional rotation,
/// and the external potential.
pub struct Hamiltonian {
    /// Particle mass (> 0).
    pub mass: f64,
    /// Contact self-coupling g (Gross-Pitaevskii; 0 for linear Schrödinger).
    pub coupling: f64,
    /// Rotating-frame angular velocity Omega (2-D only; 0 disables).
    pub angular_velocity: f64,
    /// Physical x of the rotation centre.
    pub rot_coord_x: f64,
    /// Physical y of the rotation centre.
    pub rot_coord_y: f64,
    /// External potential.
    pub potential: Box<dyn Potential>,
}

impl Hamiltonian {
    /// Non-rotating Hamiltonian.
    ///
    /// # Errors
    ///
    /// [`TidepoolError::InvalidParameter`] when `mass` is not positive
    /// and finite.
    pub fn new(
        mass: f64,
        coupling: f64,
        potential: Box<dyn Potential>,
    ) -> Result<Self, TidepoolError> {
        if !(mass > 0.0) || !mass.is_finite() {
            return Err(TidepoolError::InvalidParameter(format!(
                "mass must be positive and finite, got {mass}"
            )));
        }
        Ok(Self {
            mass,
            coupling,
            angular_velocity: 0.0,
            rot_coord_x: 0.0,
            rot_coord_y: 0.0,
            potential,
        })
    }

    /// Add a rotating frame about `(x0, y0)` with angular velocity `omega`.
    #[must_use]
    pub fn with_rotation(mut self, omega: f64, x0: f64, y0: f64) -> Self {
        self.angular_velocity = omega;
        self.rot_coord_x = x0;
        self.rot_coord_y = y0;
        self
    }
}

/// Two coupled components with inter-species contact and Rabi mixing.
pub struct TwoComponentHamiltonian {
    /// First component.
    pub a: Hamiltonian,
    /// Second component.
    pub b: Hamiltonian,
    /// Inter-species contact coupling `g_ab`.
    pub coupling_ab: f64,
    /// Complex Rabi amplitude `omega = omega_r + i omega_i`.
    pub omega: Complex64,
}

/// Tagged Hamiltonian: one component, or two with coupling.
pub enum SystemHamiltonian {
    /// Single-component Schrödinger / Gross-Pitaevskii.
    Single(Hamiltonian),
    /// Two components with inter-species contact and Rabi mixing.
    Coupled(TwoComponentHamiltonian),
}

impl SystemHamiltonian {
    /// Number of wavefunction components.
    #[must_use]
    pub const fn n_components(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Coupled(_) => 2,
        }
    }

    /// The first component (the single-component prefix view).
    #[must_use]
    pub const fn primary(&self) -> &Hamiltonian {
        match self {
            Self::Single(h) => h,
            Self::Coupled(two) => &two.a,
        }
    }

    /// Component `c` (0 or 1); `None` past the component count.
    #[must_use]
    pub const fn component(&self, c: usize) -> Option<&Hamiltonian> {
        match (self, c) {
            (Self::Single(h), 0) | (Self::Coupled(TwoComponentHamiltonian { a: h, .. }), 0) => {
                Some(h)
            }
            (Self::Coupled(TwoComponentHamiltonian { b: h, .. }), 1) => Some(h),
            _ => None,
        }
    }

    /// Mutable component access, same indexing as [`Self::component`].
    pub fn component_mut(&mut self, c: usize) -> Option<&mut Hamiltonian> {
        match (self, c) {
            (Self::Single(h), 0) | (Self::Coupled(TwoComponentHamiltonian { a: h, .. }), 0) => {
                Some(h)
            }
            (Self::Coupled(TwoComponentHamiltonian { b: h, .. }), 1) => Some(h),
            _ => None,
        }
    }

    /// Inter-species coupling (0 for a single component).
    #[must_use]
    pub const fn coupling_ab(&self) -> f64 {
        match self {
            Self::Single(_) => 0.0,
            Self::Coupled(two) => two.coupling_ab,
        }
    }

    /// Rabi amplitude (0 for a single component).
    #[must_use]
    pub const fn rabi_omega(&self) -> Complex64 {
        match self {
            Self::Single(_) => Complex64::new(0.0, 0.0),
            Self::Coupled(two) => two.omega,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::potential::ZeroPotential;

    #[test]
    fn rejects_non_positive_mass() {
        assert!(Hamiltonian::new(0.0, 0.0, Box::new(ZeroPotential)).is_err());
        assert!(Hamiltonian::new(-1.0, 0.0, Box::new(ZeroPotential)).is_err());
        assert!(Hamiltonian::new(f64::NAN, 0.0, Box::new(ZeroPotential)).is_err());
    }

    #[test]
    fn single_component_prefix_view() {
        let h = Hamiltonian::new(1.0, 0.0, Box::new(ZeroPotential)).expect("hamiltonian");
        let sys = SystemHamiltonian::Single(h);
        assert_eq!(sys.n_components(), 1);
        assert!(sys.component(1).is_none());
        assert!((sys.coupling_ab()).abs() < f64::EPSILON);
    }
}
