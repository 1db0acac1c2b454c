use crate::errors::ResponseError;
use crate::symbolic::{SumOverStates, Term, TransitionMoment};
use num_complex::Complex64;
use responsefun_backend::{AdcBackend, OperatorComponent};
use serde::{Deserialize, Serialize};

pub use cache::*;
pub use context::*;
pub use response::ResponseEvaluator;
pub use sos::SosEvaluator;

mod cache;
mod context;
pub(crate) mod logging;
mod response;
mod sos;

/// How the sums over excited states are carried out.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Explicit summation over the excited states of the backend.
    #[serde(alias = "sos")]
    SumOverStates,
    /// Sums over states are replaced by solutions of response equations.
    #[serde(alias = "response")]
    ResponseVectors,
}

/// Value of one term for one tensor element, together with the denominators that came
/// close to zero.
#[derive(Clone, Debug, PartialEq)]
pub struct TermValue {
    pub value: Complex64,
    pub signals: Vec<NearDegeneracy>,
}

impl TermValue {
    pub fn new(value: Complex64) -> Self {
        Self {
            value,
            signals: Vec::new(),
        }
    }
}

/// Numeric evaluation of a single term of a sum over states.
pub trait TermEvaluator: Sync {
    /// Rejects expressions this evaluator cannot handle before any work is done.
    fn check_expression(&self, _sos: &SumOverStates) -> Result<(), ResponseError> {
        Ok(())
    }

    /// Value of `term` for the tensor element `component`.
    fn evaluate_term(
        &self,
        term: &Term,
        sos: &SumOverStates,
        component: &[usize],
    ) -> Result<TermValue, ResponseError>;
}

/// <bra|op|ket> between two states of the backend. Elements with the ground state as bra
/// are obtained from the adjoint element, the fluctuation operator only changes the
/// diagonal.
pub(crate) fn matrix_element<B: AdcBackend + ?Sized>(
    backend: &B,
    cache: &EvaluationCache,
    op: &OperatorComponent,
    bra: StateIndex,
    ket: StateIndex,
    fluctuation: bool,
) -> Result<Complex64, ResponseError> {
    let value: Complex64 = match (bra, ket) {
        (StateIndex::Ground, StateIndex::Excited(_)) => {
            let adjoint: Complex64 = matrix_element(backend, cache, op, ket, bra, false)?;
            adjoint * op.kind.symmetry().adjoint_sign()
        }
        _ => cache.scalar(
            CacheKey::element(op, StateRef::from(bra), StateRef::from(ket)),
            || {
                let real: f64 = match (bra, ket) {
                    (StateIndex::Excited(n), StateIndex::Excited(m)) => {
                        backend.state_to_state_moment(op, n, m)?
                    }
                    (StateIndex::Excited(n), StateIndex::Ground) => {
                        backend.transition_moment(op, n)?
                    }
                    _ => backend.ground_state_moment(op)?,
                };
                Ok(Complex64::new(real, 0.0))
            },
        )?,
    };
    if fluctuation && bra == ket {
        let reference: Complex64 = matrix_element(
            backend,
            cache,
            op,
            StateIndex::Ground,
            StateIndex::Ground,
            false,
        )?;
        return Ok(value - reference);
    }
    Ok(value)
}

/// Numeric value of a transition moment for a tensor element.
pub(crate) fn moment_value<B: AdcBackend + ?Sized>(
    backend: &B,
    cache: &EvaluationCache,
    context: &NumericContext,
    moment: &TransitionMoment,
    assignment: &Assignment,
    component: &[usize],
) -> Result<Complex64, ResponseError> {
    let op: OperatorComponent = moment.operator.component(component)?;
    let bra: StateIndex = context.resolve(moment.bra, assignment)?;
    let ket: StateIndex = context.resolve(moment.ket, assignment)?;
    matrix_element(backend, cache, &op, bra, ket, moment.fluctuation)
}
