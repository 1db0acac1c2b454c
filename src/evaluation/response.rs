use crate::errors::{ConfigurationError, ConstructionError, ResponseError};
use crate::evaluation::{
    matrix_element, moment_value, Assignment, CacheKey, EvaluationCache, NearDegeneracy,
    NumericContext, StateIndex, StateRef, TermEvaluator, TermValue,
};
use crate::symbolic::{Denominator, StateLabel, SumOverStates, Symbol, Term, TransitionMoment};
use log::trace;
use ndarray::prelude::*;
use num_complex::Complex64;
use responsefun_backend::{OperatorComponent, ResponseSolver};
use std::collections::BTreeMap;

/// Replaces the sums over excited states by response vectors. Every index of summation is
/// resolved with the completeness of the excitation vectors,
///     Σ_n |y_n><y_n| / (ω_n + shift) = (M + shift)^-1,
/// so that no explicit excited states are needed apart from a final state.
pub struct ResponseEvaluator<'a, B: ResponseSolver + ?Sized> {
    backend: &'a B,
    cache: &'a EvaluationCache,
    context: &'a NumericContext,
}

/// Decomposition of a term into linear chains of matrix elements
/// <l|op_1|s_1><s_1|op_2|s_2>...<s_k|op_k|r> between fixed states, the denominators of
/// every summed state and the remaining scalar denominators. Final states excluded from
/// an index are projected out of the vector of that index.
struct TermPlan<'t> {
    chains: Vec<Vec<&'t TransitionMoment>>,
    resolvents: BTreeMap<StateLabel, Vec<(i32, &'t Denominator)>>,
    projections: BTreeMap<StateLabel, Vec<StateLabel>>,
    scalars: Vec<&'t Denominator>,
}

fn unsupported(term: &Term, reason: &str) -> ConstructionError {
    ConstructionError::UnsupportedTerm {
        term: term.to_string(),
        reason: String::from(reason),
    }
}

fn plan<'t>(term: &'t Term, sos: &SumOverStates) -> Result<TermPlan<'t>, ConstructionError> {
    let mut projections: BTreeMap<StateLabel, Vec<StateLabel>> = BTreeMap::new();
    for (index, state) in sos.excluded().iter() {
        match state {
            // The vectors only span the excited states.
            StateLabel::Ground => {}
            StateLabel::Final(_) => projections.entry(*index).or_default().push(*state),
            StateLabel::Summed(_) => {
                return Err(unsupported(
                    term,
                    "excluding one index of summation by another requires the explicit summation",
                ))
            }
        }
    }
    let mut resolvents: BTreeMap<StateLabel, Vec<(i32, &Denominator)>> = BTreeMap::new();
    let mut scalars: Vec<&Denominator> = Vec::new();
    for denominator in term.denominators() {
        let summed: Vec<(StateLabel, i32)> = denominator.summed_states();
        match summed.as_slice() {
            [] => scalars.push(denominator),
            [(state, c)] if c.abs() == 1 => {
                resolvents
                    .entry(*state)
                    .or_default()
                    .push((*c, denominator));
            }
            [_] => {
                return Err(unsupported(
                    term,
                    "excitation energies with a coefficient other than ±1",
                ))
            }
            _ => {
                return Err(unsupported(
                    term,
                    "a denominator couples several indices of summation",
                ))
            }
        }
    }

    let moments: Vec<&TransitionMoment> = term.moments().collect();
    let mut used: Vec<bool> = vec![false; moments.len()];
    let mut chains: Vec<Vec<&TransitionMoment>> = Vec::new();
    for start in 0..moments.len() {
        if used[start] || moments[start].bra.is_summed() {
            continue;
        }
        used[start] = true;
        let mut chain: Vec<&TransitionMoment> = vec![moments[start]];
        let mut current: StateLabel = moments[start].ket;
        while current.is_summed() {
            let next: Option<usize> =
                (0..moments.len()).find(|j| !used[*j] && moments[*j].bra == current);
            match next {
                Some(j) => {
                    used[j] = true;
                    chain.push(moments[j]);
                    current = moments[j].ket;
                }
                None => return Err(unsupported(term, "an index of summation is not continued")),
            }
        }
        chains.push(chain);
    }
    if used.iter().any(|u| !u) {
        return Err(unsupported(
            term,
            "the indices of summation form a closed loop",
        ));
    }
    Ok(TermPlan {
        chains,
        resolvents,
        projections,
        scalars,
    })
}

impl<'a, B: ResponseSolver + ?Sized> ResponseEvaluator<'a, B> {
    pub fn new(backend: &'a B, cache: &'a EvaluationCache, context: &'a NumericContext) -> Self {
        Self {
            backend,
            cache,
            context,
        }
    }

    /// Modified transition moments F_op with <s|op|0> = y_s · F_op.
    fn transition_vector(
        &self,
        op: &OperatorComponent,
    ) -> Result<(CacheKey, Array1<Complex64>), ResponseError> {
        let key = CacheKey::element(op, StateRef::Summed, StateRef::Ground);
        let vector = self.cache.vector(key.clone(), || {
            Ok(self
                .backend
                .modified_transition_moments(op)?
                .mapv(|x| Complex64::new(x, 0.0)))
        })?;
        Ok((key, vector))
    }

    /// Vector of the right end <s|op|r> of a chain, with s summed.
    fn right_vector(
        &self,
        moment: &TransitionMoment,
        component: &[usize],
    ) -> Result<(CacheKey, Array1<Complex64>), ResponseError> {
        let op: OperatorComponent = moment.operator.component(component)?;
        match self.context.resolve(moment.ket, &Assignment::new())? {
            StateIndex::Ground => self.transition_vector(&op),
            StateIndex::Excited(f) => {
                let key = CacheKey::with_operator(
                    &op,
                    moment.fluctuation,
                    StateRef::Summed,
                    StateRef::Excited(f),
                );
                let vector = self.cache.vector(key.clone(), || {
                    let y: Array1<Complex64> = self
                        .backend
                        .excitation_vector(f)?
                        .mapv(|x| Complex64::new(x, 0.0));
                    let product: Array1<Complex64> = self.backend.b_matrix_product(&op, y.view())?;
                    self.subtract_reference(&op, moment.fluctuation, product, &y)
                })?;
                Ok((key, vector))
            }
        }
    }

    /// (B - <0|op|0>) v for the fluctuation operator, B v otherwise.
    fn subtract_reference(
        &self,
        op: &OperatorComponent,
        fluctuation: bool,
        product: Array1<Complex64>,
        vector: &Array1<Complex64>,
    ) -> Result<Array1<Complex64>, ResponseError> {
        if !fluctuation {
            return Ok(product);
        }
        let reference: Complex64 = matrix_element(
            self.backend,
            self.cache,
            op,
            StateIndex::Ground,
            StateIndex::Ground,
            false,
        )?;
        Ok(product - &vector.mapv(|x| x * reference))
    }

    /// Multiplies with the matrix of <s'|op|s> between two summed states.
    fn apply_operator(
        &self,
        moment: &TransitionMoment,
        key: CacheKey,
        vector: &Array1<Complex64>,
        component: &[usize],
    ) -> Result<(CacheKey, Array1<Complex64>), ResponseError> {
        let op: OperatorComponent = moment.operator.component(component)?;
        let new_key = CacheKey::with_operator(
            &op,
            moment.fluctuation,
            StateRef::Summed,
            StateRef::Vector(Box::new(key)),
        );
        let product = self.cache.vector(new_key.clone(), || {
            let product: Array1<Complex64> = self.backend.b_matrix_product(&op, vector.view())?;
            self.subtract_reference(&op, moment.fluctuation, product, vector)
        })?;
        Ok((new_key, product))
    }

    /// v - Σ_f y_f (y_f · v) for the excluded excited states f.
    fn project_out(
        &self,
        states: &[usize],
        key: CacheKey,
        vector: &Array1<Complex64>,
    ) -> Result<(CacheKey, Array1<Complex64>), ResponseError> {
        let new_key = CacheKey::projected(key, states);
        let projected = self.cache.vector(new_key.clone(), || {
            let mut projected: Array1<Complex64> = vector.clone();
            for f in states.iter() {
                let y: Array1<Complex64> = self
                    .backend
                    .excitation_vector(*f)?
                    .mapv(|x| Complex64::new(x, 0.0));
                let overlap: Complex64 = y.dot(&projected);
                projected = projected - &y.mapv(|x| x * overlap);
            }
            Ok(projected)
        })?;
        Ok((new_key, projected))
    }

    /// Solves (M + shift) x = v after checking (ω_n + shift) for all excited states that
    /// are not projected out.
    fn apply_resolvent(
        &self,
        denominator: &Denominator,
        state: StateLabel,
        shift: Complex64,
        skipped: &[usize],
        key: CacheKey,
        vector: &Array1<Complex64>,
        signals: &mut Vec<NearDegeneracy>,
    ) -> Result<(CacheKey, Array1<Complex64>), ResponseError> {
        for (n, energy) in self.backend.excitation_energies().iter().enumerate() {
            if skipped.contains(&n) {
                continue;
            }
            let mut assignment: Assignment = Assignment::new();
            assignment.insert(state, n);
            if let Some(signal) =
                self.context
                    .check_denominator(denominator, shift + *energy, &assignment)?
            {
                signals.push(signal);
            }
        }
        let new_key = CacheKey::response(key, shift);
        let solution = self.cache.vector(new_key.clone(), || {
            if skipped.is_empty() {
                Ok(self.backend.solve_response(vector.view(), shift)?)
            } else {
                Ok(self
                    .backend
                    .solve_projected_response(vector.view(), shift, skipped)?)
            }
        })?;
        Ok((new_key, solution))
    }

    /// Contracts the left end <l|op|s> of a chain with the vector of the summed state s.
    fn left_contraction(
        &self,
        moment: &TransitionMoment,
        key: CacheKey,
        vector: &Array1<Complex64>,
        component: &[usize],
    ) -> Result<Complex64, ResponseError> {
        let op: OperatorComponent = moment.operator.component(component)?;
        let bra: StateIndex = self.context.resolve(moment.bra, &Assignment::new())?;
        let new_key = CacheKey::with_operator(
            &op,
            moment.fluctuation,
            StateRef::from(bra),
            StateRef::Vector(Box::new(key)),
        );
        self.cache.scalar(new_key, || match bra {
            StateIndex::Ground => {
                let (_, moments) = self.transition_vector(&op)?;
                Ok(moments.dot(vector) * op.kind.symmetry().adjoint_sign())
            }
            StateIndex::Excited(f) => {
                let y: Array1<Complex64> = self
                    .backend
                    .excitation_vector(f)?
                    .mapv(|x| Complex64::new(x, 0.0));
                let product: Array1<Complex64> = self.backend.b_matrix_product(&op, vector.view())?;
                let product = self.subtract_reference(&op, moment.fluctuation, product, vector)?;
                Ok(y.dot(&product))
            }
        })
    }

    fn chain_value(
        &self,
        chain: &[&TransitionMoment],
        plan: &TermPlan,
        component: &[usize],
        signals: &mut Vec<NearDegeneracy>,
    ) -> Result<Complex64, ResponseError> {
        let no_summation: Assignment = Assignment::new();
        if chain.len() == 1 {
            return moment_value(
                self.backend,
                self.cache,
                self.context,
                chain[0],
                &no_summation,
                component,
            );
        }
        let mut sign: f64 = 1.0;
        let (mut key, mut vector) = self.right_vector(chain[chain.len() - 1], component)?;
        for position in (1..chain.len()).rev() {
            let state: StateLabel = chain[position].bra;
            let mut skipped: Vec<usize> = Vec::new();
            for label in plan.projections.get(&state).into_iter().flatten() {
                if let StateIndex::Excited(f) = self.context.resolve(*label, &no_summation)? {
                    skipped.push(f);
                }
            }
            if !skipped.is_empty() {
                let (k, v) = self.project_out(&skipped, key, &vector)?;
                key = k;
                vector = v;
            }
            for (c, denominator) in plan.resolvents.get(&state).into_iter().flatten() {
                let rest: Complex64 = self.context.evaluate_denominator(
                    self.backend,
                    &denominator.without(&Symbol::Transition(state)),
                    &no_summation,
                )?;
                // 1/(-ω_s + rest) = -1/(ω_s - rest)
                let shift: Complex64 = if *c > 0 { rest } else { -rest };
                if *c < 0 {
                    sign = -sign;
                }
                let (k, v) = self.apply_resolvent(
                    denominator,
                    state,
                    shift,
                    &skipped,
                    key,
                    &vector,
                    signals,
                )?;
                key = k;
                vector = v;
            }
            if position > 1 {
                let (k, v) = self.apply_operator(chain[position - 1], key, &vector, component)?;
                key = k;
                vector = v;
            }
        }
        Ok(sign * self.left_contraction(chain[0], key, &vector, component)?)
    }
}

impl<'a, B: ResponseSolver + ?Sized> TermEvaluator for ResponseEvaluator<'a, B> {
    fn check_expression(&self, sos: &SumOverStates) -> Result<(), ResponseError> {
        let n_states: usize = self.backend.n_states();
        if self.context.states().len() != n_states {
            return Err(ConfigurationError::RestrictedStateSet {
                selected: self.context.states().len(),
                n_states,
            }
            .into());
        }
        for term in sos.terms().iter() {
            plan(term, sos)?;
        }
        Ok(())
    }

    fn evaluate_term(
        &self,
        term: &Term,
        sos: &SumOverStates,
        component: &[usize],
    ) -> Result<TermValue, ResponseError> {
        let plan: TermPlan = plan(term, sos)?;
        let no_summation: Assignment = Assignment::new();
        let epsilon: f64 = term.levi_civita_value(component);
        if epsilon == 0.0 {
            return Ok(TermValue::new(Complex64::new(0.0, 0.0)));
        }
        let mut result: TermValue =
            TermValue::new(Complex64::new(term.prefactor() * epsilon, 0.0));
        for denominator in plan.scalars.iter() {
            let value: Complex64 =
                self.context
                    .evaluate_denominator(self.backend, denominator, &no_summation)?;
            if let Some(signal) =
                self.context
                    .check_denominator(denominator, value, &no_summation)?
            {
                result.signals.push(signal);
            }
            result.value /= value;
        }
        for chain in plan.chains.iter() {
            let value: Complex64 =
                self.chain_value(chain, &plan, component, &mut result.signals)?;
            result.value *= value;
        }
        trace!(
            "{} with {:?}: {} chain(s) = {}",
            term,
            component,
            plan.chains.len(),
            result.value
        );
        Ok(result)
    }
}
