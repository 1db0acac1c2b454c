use crate::defaults::CARTESIAN_DIM;
use ndarray::prelude::*;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Behaviour of a real one-electron operator under adjoining.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperatorSymmetry {
    /// <0|op|n> = <n|op|0>
    Hermitian,
    /// <0|op|n> = -<n|op|0>
    AntiHermitian,
}

impl OperatorSymmetry {
    /// Sign that turns <n|op|0> into <0|op|n>.
    pub fn adjoint_sign(&self) -> f64 {
        match self {
            OperatorSymmetry::Hermitian => 1.0,
            OperatorSymmetry::AntiHermitian => -1.0,
        }
    }
}

/// The perturbation operators known to the backends.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    ElectricDipole,
    /// Magnetic dipole operator without the imaginary prefactor.
    MagneticDipole,
    ElectricQuadrupole,
}

impl OperatorKind {
    /// Number of Cartesian indices of the operator.
    pub fn rank(&self) -> usize {
        match self {
            OperatorKind::ElectricDipole | OperatorKind::MagneticDipole => 1,
            OperatorKind::ElectricQuadrupole => 2,
        }
    }

    pub fn symmetry(&self) -> OperatorSymmetry {
        match self {
            OperatorKind::ElectricDipole | OperatorKind::ElectricQuadrupole => {
                OperatorSymmetry::Hermitian
            }
            OperatorKind::MagneticDipole => OperatorSymmetry::AntiHermitian,
        }
    }

    /// Number of Cartesian components, 3^rank.
    pub fn n_components(&self) -> usize {
        CARTESIAN_DIM.pow(self.rank() as u32)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            OperatorKind::ElectricDipole => "μ",
            OperatorKind::MagneticDipole => "m",
            OperatorKind::ElectricQuadrupole => "Q",
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            OperatorKind::ElectricDipole => "electric dipole",
            OperatorKind::MagneticDipole => "magnetic dipole",
            OperatorKind::ElectricQuadrupole => "electric quadrupole",
        };
        write!(f, "{}", name)
    }
}

/// A single Cartesian component of an operator, e.g. μ_x or Q_xz.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorComponent {
    pub kind: OperatorKind,
    pub component: Vec<usize>,
}

impl OperatorComponent {
    pub fn new(kind: OperatorKind, component: Vec<usize>) -> Result<Self, BackendError> {
        if component.len() != kind.rank() || component.iter().any(|c| *c >= CARTESIAN_DIM) {
            return Err(BackendError::ComponentOutOfRange {
                kind,
                component: component.clone(),
            });
        }
        Ok(Self { kind, component })
    }

    /// Row-major position of the component in the flattened 3^rank layout.
    pub fn flat_index(&self) -> usize {
        self.component
            .iter()
            .fold(0, |acc, c| acc * CARTESIAN_DIM + c)
    }
}

impl fmt::Display for OperatorComponent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let xyz: String = self
            .component
            .iter()
            .map(|c| ['x', 'y', 'z'][*c])
            .collect();
        write!(f, "{}_{}", self.kind.symbol(), xyz)
    }
}

/// Errors raised by an ADC or response-equation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("operator '{0}' is not available in this backend")]
    UnknownOperator(OperatorKind),

    #[error("component {component:?} is not valid for the {kind} operator")]
    ComponentOutOfRange {
        kind: OperatorKind,
        component: Vec<usize>,
    },

    #[error("excited state {state} requested, but only {n_states} states are available")]
    StateOutOfRange { state: usize, n_states: usize },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("response equation could not be solved: {0}")]
    Solver(String),

    #[error("model system could not be read: {0}")]
    Parse(String),
}

/// Trait that provides the excited-state data of an ADC calculation.
/// All matrix elements are real; the excited states are numbered from zero in ascending order
/// of their excitation energies.
pub trait AdcBackend: Sync {
    /// Returns the excitation energies of all computed excited states.
    fn excitation_energies(&self) -> ArrayView1<f64>;

    /// Returns the number of computed excited states.
    fn n_states(&self) -> usize {
        self.excitation_energies().len()
    }

    /// <0|op|0>
    fn ground_state_moment(&self, op: &OperatorComponent) -> Result<f64, BackendError>;

    /// <n|op|0>; the adjoint element follows from the symmetry of the operator.
    fn transition_moment(&self, op: &OperatorComponent, state: usize)
        -> Result<f64, BackendError>;

    /// <bra|op|ket> between two excited states.
    fn state_to_state_moment(
        &self,
        op: &OperatorComponent,
        bra: usize,
        ket: usize,
    ) -> Result<f64, BackendError>;
}

/// Trait for backends that can solve response equations in the space of intermediate states.
/// The ADC matrix M is real symmetric and its eigenvectors are the excitation vectors, so that
/// sums over excited states can be replaced by solves of (M + shift) x = rhs.
pub trait ResponseSolver: AdcBackend {
    /// Dimension of the space of intermediate states.
    fn dimension(&self) -> usize;

    /// Modified transition moments F with <n|op|0> = y_n · F.
    fn modified_transition_moments(
        &self,
        op: &OperatorComponent,
    ) -> Result<Array1<f64>, BackendError>;

    /// Excitation vector y_n of an excited state.
    fn excitation_vector(&self, state: usize) -> Result<Array1<f64>, BackendError>;

    /// Product of the state-to-state operator matrix B with a (complex) vector, where
    /// <m|op|n> = y_m^T B y_n.
    fn b_matrix_product(
        &self,
        op: &OperatorComponent,
        vector: ArrayView1<Complex64>,
    ) -> Result<Array1<Complex64>, BackendError>;

    /// Solve (M + shift) x = rhs for the response vector x.
    fn solve_response(
        &self,
        rhs: ArrayView1<Complex64>,
        shift: Complex64,
    ) -> Result<Array1<Complex64>, BackendError>;

    /// Solve (M + shift) x = rhs in the complement of the `excluded` excited states. The
    /// right-hand side has to be orthogonal to their excitation vectors; the equation stays
    /// solvable if ω_f + shift vanishes for an excluded state f.
    fn solve_projected_response(
        &self,
        rhs: ArrayView1<Complex64>,
        shift: Complex64,
        excluded: &[usize],
    ) -> Result<Array1<Complex64>, BackendError>;
}
