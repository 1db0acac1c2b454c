use crate::errors::ResponseError;
use crate::evaluation::{
    moment_value, Assignment, EvaluationCache, NumericContext, StateIndex, TermEvaluator,
    TermValue,
};
use crate::symbolic::{Factor, StateLabel, SumOverStates, Term};
use itertools::Itertools;
use log::trace;
use num_complex::Complex64;
use responsefun_backend::AdcBackend;

/// Evaluates the sums explicitly: every index of summation runs over the excited states of
/// the context and the summand is built from the matrix elements of the backend.
pub struct SosEvaluator<'a, B: AdcBackend + ?Sized> {
    backend: &'a B,
    cache: &'a EvaluationCache,
    context: &'a NumericContext,
}

impl<'a, B: AdcBackend + ?Sized> SosEvaluator<'a, B> {
    pub fn new(backend: &'a B, cache: &'a EvaluationCache, context: &'a NumericContext) -> Self {
        Self {
            backend,
            cache,
            context,
        }
    }

    /// True if the summand has to be skipped because an index takes an excluded value.
    fn is_excluded(
        &self,
        excluded: &[(StateLabel, StateLabel)],
        assignment: &Assignment,
    ) -> Result<bool, ResponseError> {
        for (index, state) in excluded.iter() {
            let value: usize = match assignment.get(index) {
                Some(n) => *n,
                None => continue,
            };
            if state.is_summed() && !assignment.contains_key(state) {
                continue;
            }
            if self.context.resolve(*state, assignment)? == StateIndex::Excited(value) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn summand(
        &self,
        term: &Term,
        assignment: &Assignment,
        component: &[usize],
        result: &mut TermValue,
    ) -> Result<(), ResponseError> {
        let mut product: Complex64 = Complex64::new(term.prefactor(), 0.0);
        for factor in term.factors().iter() {
            match factor {
                Factor::Moment(moment) => {
                    product *= moment_value(
                        self.backend,
                        self.cache,
                        self.context,
                        moment,
                        assignment,
                        component,
                    )?;
                }
                Factor::Denominator(denominator) => {
                    let value: Complex64 =
                        self.context
                            .evaluate_denominator(self.backend, denominator, assignment)?;
                    if let Some(signal) =
                        self.context
                            .check_denominator(denominator, value, assignment)?
                    {
                        result.signals.push(signal);
                    }
                    product /= value;
                }
                Factor::LeviCivita(epsilon) => product *= epsilon.value(component),
            }
        }
        result.value += product;
        Ok(())
    }
}

impl<'a, B: AdcBackend + ?Sized> TermEvaluator for SosEvaluator<'a, B> {
    fn evaluate_term(
        &self,
        term: &Term,
        sos: &SumOverStates,
        component: &[usize],
    ) -> Result<TermValue, ResponseError> {
        let indices: Vec<StateLabel> = term.summation_indices();
        let mut result: TermValue = TermValue::new(Complex64::new(0.0, 0.0));
        if term.levi_civita_value(component) == 0.0 {
            return Ok(result);
        }
        if indices.is_empty() {
            self.summand(term, &Assignment::new(), component, &mut result)?;
            return Ok(result);
        }
        let mut n_summands: usize = 0;
        for states in indices
            .iter()
            .map(|_| self.context.states().iter())
            .multi_cartesian_product()
        {
            let assignment: Assignment = indices.iter().copied().zip(states).collect();
            if self.is_excluded(sos.excluded(), &assignment)? {
                continue;
            }
            self.summand(term, &assignment, component, &mut result)?;
            n_summands += 1;
        }
        trace!("{} with {:?}: {} summands", term, component, n_summands);
        Ok(result)
    }
}
