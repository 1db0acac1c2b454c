use crate::defaults::{CARTESIAN_DIM, SYMMETRY_TOLERANCE};
use crate::interface::*;
use log::debug;
use ndarray::prelude::*;
use ndarray_linalg::{Eigh, Solve, UPLO};
use num_complex::Complex64;
use std::collections::HashMap;

pub use io::*;

mod io;

/// Operator data of a model system in the basis of intermediate states.
#[derive(Clone, Debug)]
pub struct OperatorData {
    pub kind: OperatorKind,
    /// <0|op|0> for all components, shape: [3^rank]
    pub ground_state: Array1<f64>,
    /// Modified transition moments, shape: [dim, 3^rank]
    pub transition: Array2<f64>,
    /// State-to-state operator matrices, shape: [3^rank, dim, dim]
    pub b_matrices: Array3<f64>,
}

impl OperatorData {
    /// Operator without ground-state moment and without state-to-state couplings.
    pub fn from_transition(kind: OperatorKind, transition: Array2<f64>) -> Self {
        let dim: usize = transition.nrows();
        Self {
            kind,
            ground_state: Array1::zeros([kind.n_components()]),
            transition,
            b_matrices: Array3::zeros([kind.n_components(), dim, dim]),
        }
    }

    fn check_shapes(&self, dim: usize) -> Result<(), BackendError> {
        let n_comp: usize = self.kind.n_components();
        if self.ground_state.len() != n_comp
            || self.transition.dim() != (dim, n_comp)
            || self.b_matrices.dim() != (n_comp, dim, dim)
        {
            return Err(BackendError::Shape(format!(
                "{} operator needs ground state [{}], transition [{}, {}] and B matrices [{}, {}, {}]",
                self.kind, n_comp, dim, n_comp, n_comp, dim, dim
            )));
        }
        Ok(())
    }
}

/// A model of an ADC calculation: a real symmetric ADC matrix in the space of intermediate
/// states together with the operator data. All eigenstates of the matrix are available as
/// excited states, which makes the model a complete test bed for both the explicit
/// sum-over-states evaluation and the response-vector evaluation.
#[derive(Clone, Debug)]
pub struct ModelSystem {
    pub name: String,
    matrix: Array2<f64>,
    /// Excitation energies in ascending order.
    energies: Array1<f64>,
    /// Excitation vectors (columnwise).
    vectors: Array2<f64>,
    operators: HashMap<OperatorKind, OperatorData>,
}

impl ModelSystem {
    pub fn new(
        name: &str,
        matrix: Array2<f64>,
        operators: Vec<OperatorData>,
    ) -> Result<Self, BackendError> {
        let dim: usize = matrix.nrows();
        if matrix.ncols() != dim || dim == 0 {
            return Err(BackendError::Shape(format!(
                "the ADC matrix has to be square and non-empty, got {:?}",
                matrix.dim()
            )));
        }
        let asymmetry: f64 = (&matrix - &matrix.t())
            .iter()
            .fold(0.0, |acc: f64, x| acc.max(x.abs()));
        if asymmetry > SYMMETRY_TOLERANCE {
            return Err(BackendError::Shape(format!(
                "the ADC matrix is not symmetric (max. deviation {:e})",
                asymmetry
            )));
        }
        let mut operator_map: HashMap<OperatorKind, OperatorData> = HashMap::new();
        for data in operators.into_iter() {
            data.check_shapes(dim)?;
            operator_map.insert(data.kind, data);
        }
        // The eigenvalues are returned in ascending order.
        let (energies, vectors): (Array1<f64>, Array2<f64>) = matrix
            .eigh(UPLO::Lower)
            .map_err(|err| BackendError::Solver(err.to_string()))?;
        debug!("model system '{}': excitation energies {}", name, energies);

        Ok(Self {
            name: String::from(name),
            matrix,
            energies,
            vectors,
            operators: operator_map,
        })
    }

    /// Two-level system: one excited state at `energy` with the transition dipole `dipole`.
    pub fn two_level(energy: f64, dipole: [f64; CARTESIAN_DIM]) -> Result<Self, BackendError> {
        let transition: Array2<f64> = Array2::from_shape_vec((1, CARTESIAN_DIM), dipole.to_vec())
            .map_err(|err| BackendError::Shape(err.to_string()))?;
        Self::new(
            "two-level",
            arr2(&[[energy]]),
            vec![OperatorData::from_transition(
                OperatorKind::ElectricDipole,
                transition,
            )],
        )
    }

    pub fn matrix(&self) -> ArrayView2<f64> {
        self.matrix.view()
    }

    pub fn operator_kinds(&self) -> Vec<OperatorKind> {
        let mut kinds: Vec<OperatorKind> = self.operators.keys().copied().collect();
        kinds.sort();
        kinds
    }

    fn operator(&self, kind: OperatorKind) -> Result<&OperatorData, BackendError> {
        self.operators
            .get(&kind)
            .ok_or(BackendError::UnknownOperator(kind))
    }

    fn check_state(&self, state: usize) -> Result<(), BackendError> {
        if state >= self.energies.len() {
            return Err(BackendError::StateOutOfRange {
                state,
                n_states: self.energies.len(),
            });
        }
        Ok(())
    }
}

impl AdcBackend for ModelSystem {
    fn excitation_energies(&self) -> ArrayView1<f64> {
        self.energies.view()
    }

    fn ground_state_moment(&self, op: &OperatorComponent) -> Result<f64, BackendError> {
        Ok(self.operator(op.kind)?.ground_state[op.flat_index()])
    }

    fn transition_moment(
        &self,
        op: &OperatorComponent,
        state: usize,
    ) -> Result<f64, BackendError> {
        self.check_state(state)?;
        let data: &OperatorData = self.operator(op.kind)?;
        Ok(self
            .vectors
            .column(state)
            .dot(&data.transition.column(op.flat_index())))
    }

    fn state_to_state_moment(
        &self,
        op: &OperatorComponent,
        bra: usize,
        ket: usize,
    ) -> Result<f64, BackendError> {
        self.check_state(bra)?;
        self.check_state(ket)?;
        let data: &OperatorData = self.operator(op.kind)?;
        let b: ArrayView2<f64> = data.b_matrices.index_axis(Axis(0), op.flat_index());
        Ok(self.vectors.column(bra).dot(&b.dot(&self.vectors.column(ket))))
    }
}

impl ResponseSolver for ModelSystem {
    fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    fn modified_transition_moments(
        &self,
        op: &OperatorComponent,
    ) -> Result<Array1<f64>, BackendError> {
        let data: &OperatorData = self.operator(op.kind)?;
        Ok(data.transition.column(op.flat_index()).to_owned())
    }

    fn excitation_vector(&self, state: usize) -> Result<Array1<f64>, BackendError> {
        self.check_state(state)?;
        Ok(self.vectors.column(state).to_owned())
    }

    fn b_matrix_product(
        &self,
        op: &OperatorComponent,
        vector: ArrayView1<Complex64>,
    ) -> Result<Array1<Complex64>, BackendError> {
        if vector.len() != self.dimension() {
            return Err(BackendError::Shape(format!(
                "vector of length {} cannot be multiplied with a B matrix of dimension {}",
                vector.len(),
                self.dimension()
            )));
        }
        let data: &OperatorData = self.operator(op.kind)?;
        let b: Array2<Complex64> = data
            .b_matrices
            .index_axis(Axis(0), op.flat_index())
            .mapv(|x| Complex64::new(x, 0.0));
        Ok(b.dot(&vector))
    }

    fn solve_response(
        &self,
        rhs: ArrayView1<Complex64>,
        shift: Complex64,
    ) -> Result<Array1<Complex64>, BackendError> {
        self.solve_projected_response(rhs, shift, &[])
    }

    fn solve_projected_response(
        &self,
        rhs: ArrayView1<Complex64>,
        shift: Complex64,
        excluded: &[usize],
    ) -> Result<Array1<Complex64>, BackendError> {
        if rhs.len() != self.dimension() {
            return Err(BackendError::Shape(format!(
                "right-hand side of length {} does not match the dimension {}",
                rhs.len(),
                self.dimension()
            )));
        }
        // (M + shift) as complex matrix.
        let mut lhs: Array2<Complex64> = self.matrix.mapv(|x| Complex64::new(x, 0.0));
        lhs.diag_mut().mapv_inplace(|x| x + shift);
        // The eigenvalue of every excluded state is moved to one.
        for state in excluded.iter() {
            let y: Array1<Complex64> = self
                .excitation_vector(*state)?
                .mapv(|x| Complex64::new(x, 0.0));
            let weight: Complex64 = 1.0 - (self.energies[*state] + shift);
            let outer: Array2<Complex64> = y
                .view()
                .insert_axis(Axis(1))
                .dot(&y.view().insert_axis(Axis(0)));
            lhs.scaled_add(weight, &outer);
        }
        lhs.solve(&rhs)
            .map_err(|err| BackendError::Solver(err.to_string()))
    }
}
