use crate::defaults::{DEGENERACY_TOLERANCE, FREQUENCY_TOLERANCE};
use crate::errors::{ConfigurationError, ResponseError};
use crate::evaluation::logging::{print_evaluation_end, print_evaluation_init, print_signals};
use crate::evaluation::{
    CacheStatistics, EvaluationCache, NearDegeneracy, NumericContext, ResponseEvaluator,
    SosEvaluator, StateSet, Strategy, TermEvaluator, TermValue,
};
use crate::symbolic::{
    FrequencyCorrelation, FrequencyLabel, OperatorKind, ResponseFunction, StateLabel,
    SumOverStates,
};
use crate::utils::Timer;
use derive_builder::Builder;
use hashbrown::HashSet;
use itertools::Itertools;
use log::debug;
use ndarray::prelude::*;
use num_complex::Complex64;
use rayon::prelude::*;
use responsefun_backend::defaults::CARTESIAN_DIM;
use responsefun_backend::{AdcBackend, ResponseSolver};
use std::collections::BTreeMap;

pub use averages::*;

mod averages;

/// Numeric options of an evaluation.
#[derive(Builder, Clone, Debug)]
pub struct DriverOptions {
    /// Damping parameter γ.
    #[builder(default = "0.0")]
    pub gamma: f64,
    /// Only evaluate the elements with ascending indices and copy them to all permutations.
    #[builder(default = "false")]
    pub symmetric: bool,
    /// Evaluate the tensor elements in the global rayon thread pool.
    #[builder(default = "false")]
    pub parallel: bool,
    /// Denominators below this absolute value are reported.
    #[builder(default = "DEGENERACY_TOLERANCE")]
    pub tolerance: f64,
    /// Excited states the sums run over; all states of the backend if not set.
    #[builder(default = "None")]
    pub states: Option<StateSet>,
    /// Pairs (index, state) that are skipped in the summation.
    #[builder(default = "Vec::new()")]
    pub excluded: Vec<(StateLabel, StateLabel)>,
    /// Add the summands in which an index of summation takes the ground state.
    #[builder(default = "true")]
    pub ground_state_terms: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            gamma: 0.0,
            symmetric: false,
            parallel: false,
            tolerance: DEGENERACY_TOLERANCE,
            states: None,
            excluded: Vec::new(),
            ground_state_terms: true,
        }
    }
}

/// Numeric values of the external frequencies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frequencies {
    /// ω_1, ω_2, ...
    pub incoming: Vec<f64>,
    /// ω_σ; only used to check the sum of the incoming frequencies.
    pub outgoing: Option<f64>,
}

impl Frequencies {
    pub fn new(incoming: Vec<f64>) -> Self {
        Self {
            incoming,
            outgoing: None,
        }
    }

    /// All n incoming frequencies set to zero.
    pub fn static_limit(n: usize) -> Self {
        Self::new(vec![0.0; n])
    }

    pub fn with_outgoing(mut self, outgoing: f64) -> Self {
        self.outgoing = Some(outgoing);
        self
    }
}

/// Result of an evaluation.
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// Tensor of rank `sum of the operator ranks` with three entries per axis.
    pub tensor: ArrayD<Complex64>,
    /// Denominators that came close to zero.
    pub signals: Vec<NearDegeneracy>,
    pub n_terms: usize,
    pub statistics: CacheStatistics,
}

/// Indices of the tensor elements that are evaluated.
pub fn tensor_elements(rank: usize, symmetric: bool) -> Vec<Vec<usize>> {
    if symmetric {
        (0..CARTESIAN_DIM)
            .combinations_with_replacement(rank)
            .collect()
    } else {
        (0..rank)
            .map(|_| 0..CARTESIAN_DIM)
            .multi_cartesian_product()
            .collect()
    }
}

/// Evaluates response functions with the data of an ADC backend. Every evaluation owns a
/// fresh cache that is dropped when the evaluation is finished.
pub struct Driver<'a, B: AdcBackend + ?Sized> {
    backend: &'a B,
    options: DriverOptions,
}

impl<'a, B: AdcBackend + ?Sized> Driver<'a, B> {
    pub fn new(backend: &'a B, options: DriverOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Builds the symmetrized expression of a response function with the outgoing frequency
    /// expressed by the incoming ones.
    pub fn prepare(
        &self,
        function: ResponseFunction,
        operators: &[OperatorKind],
    ) -> Result<SumOverStates, ResponseError> {
        let (sos, group) = function.build(operators)?;
        let mut sos: SumOverStates = group
            .symmetrize(&sos)?
            .with_excluded_states(&self.options.excluded)?;
        debug!(
            "{} symmetrized with {} permutations: {} terms",
            function,
            group.order(),
            sos.number_of_terms()
        );
        if self.options.ground_state_terms {
            sos = sos.with_ground_state_terms()?;
        }
        Ok(sos.eliminate_outgoing_frequency())
    }

    /// Checks the numeric input against the expression and collects the frequencies.
    pub fn context(
        &self,
        sos: &SumOverStates,
        frequencies: &Frequencies,
        final_state: Option<usize>,
    ) -> Result<NumericContext, ResponseError> {
        let n_states: usize = self.backend.n_states();
        let states: StateSet = self
            .options
            .states
            .clone()
            .unwrap_or_else(|| StateSet::all(self.backend));
        states.check(n_states)?;
        match (sos.final_state(), final_state) {
            (Some(_), None) => return Err(ConfigurationError::MissingFinalState.into()),
            (None, Some(_)) => return Err(ConfigurationError::UnexpectedFinalState.into()),
            (Some(_), Some(f)) if f >= n_states => {
                return Err(ConfigurationError::StateOutOfRange { state: f, n_states }.into())
            }
            _ => {}
        }
        if !self.options.gamma.is_finite() {
            return Err(ConfigurationError::NonFiniteFrequency(self.options.gamma).into());
        }
        if self.options.gamma != 0.0 && !sos.is_damped() {
            return Err(ConfigurationError::UnusedDamping(self.options.gamma).into());
        }

        let labels: Vec<FrequencyLabel> = match sos.correlation() {
            Some(correlation) => correlation.incoming().to_vec(),
            None => sos
                .frequency_labels()
                .into_iter()
                .filter(|w| *w != FrequencyLabel::Sigma)
                .collect(),
        };
        let final_energy: Option<f64> =
            final_state.map(|f| self.backend.excitation_energies()[f]);
        let resonant: bool = matches!(
            sos.correlation(),
            Some(FrequencyCorrelation::FinalState { .. })
        );
        let values: Vec<f64> = match (frequencies.incoming.is_empty(), final_energy) {
            // The final-state energy is shared equally by the photons.
            (true, Some(energy)) if resonant && !labels.is_empty() => {
                vec![energy / labels.len() as f64; labels.len()]
            }
            _ => frequencies.incoming.clone(),
        };
        if values.len() != labels.len() {
            return Err(ConfigurationError::FrequencyCount {
                expected: labels.len(),
                found: values.len(),
            }
            .into());
        }
        if let Some(w) = values
            .iter()
            .chain(frequencies.outgoing.iter())
            .find(|w| !w.is_finite())
        {
            return Err(ConfigurationError::NonFiniteFrequency(*w).into());
        }
        let sum: f64 = values.iter().sum();
        let mut map: BTreeMap<FrequencyLabel, f64> =
            labels.iter().copied().zip(values.iter().copied()).collect();
        match sos.correlation() {
            Some(FrequencyCorrelation::Outgoing { .. }) => {
                if let Some(sigma) = frequencies.outgoing {
                    if (sigma - sum).abs() > FREQUENCY_TOLERANCE {
                        return Err(ConfigurationError::FrequencySum { sigma, sum }.into());
                    }
                }
                map.insert(FrequencyLabel::Sigma, sum);
            }
            Some(FrequencyCorrelation::FinalState { .. }) => {
                if let Some(energy) = final_energy {
                    if (sum - energy).abs() > FREQUENCY_TOLERANCE {
                        return Err(ConfigurationError::FinalStateResonance { sum, energy }.into());
                    }
                }
            }
            None => {
                if let Some(sigma) = frequencies.outgoing {
                    map.insert(FrequencyLabel::Sigma, sigma);
                }
            }
        }
        Ok(NumericContext::new(
            map,
            self.options.gamma,
            final_state,
            states,
            self.options.tolerance,
        ))
    }

    /// Evaluates a response function by explicit summation over the excited states.
    pub fn evaluate(
        &self,
        function: ResponseFunction,
        operators: &[OperatorKind],
        frequencies: &Frequencies,
        final_state: Option<usize>,
    ) -> Result<Evaluation, ResponseError> {
        let sos: SumOverStates = self.prepare(function, operators)?;
        self.evaluate_expression(function.name(), &sos, frequencies, final_state)
    }

    /// Evaluates an arbitrary sum-over-states expression by explicit summation.
    pub fn evaluate_expression(
        &self,
        name: &str,
        sos: &SumOverStates,
        frequencies: &Frequencies,
        final_state: Option<usize>,
    ) -> Result<Evaluation, ResponseError> {
        let context: NumericContext = self.context(sos, frequencies, final_state)?;
        let cache: EvaluationCache = EvaluationCache::new();
        let evaluator = SosEvaluator::new(self.backend, &cache, &context);
        self.run(name, sos, &context, &evaluator, &cache, Strategy::SumOverStates)
    }

    fn run<E: TermEvaluator>(
        &self,
        name: &str,
        sos: &SumOverStates,
        context: &NumericContext,
        evaluator: &E,
        cache: &EvaluationCache,
        strategy: Strategy,
    ) -> Result<Evaluation, ResponseError> {
        evaluator.check_expression(sos)?;
        let timer: Timer = Timer::start();
        let rank: usize = sos.rank();
        let elements: Vec<Vec<usize>> = tensor_elements(rank, self.options.symmetric);
        print_evaluation_init(name, sos, context, strategy, elements.len());

        let element_value = |component: &Vec<usize>| -> Result<TermValue, ResponseError> {
            let mut total: TermValue = TermValue::new(Complex64::new(0.0, 0.0));
            for term in sos.terms().iter() {
                let value: TermValue = evaluator.evaluate_term(term, sos, component)?;
                total.value += value.value;
                total.signals.extend(value.signals);
            }
            Ok(total)
        };
        let values: Vec<TermValue> = if self.options.parallel {
            elements
                .par_iter()
                .map(element_value)
                .collect::<Result<Vec<TermValue>, ResponseError>>()?
        } else {
            elements
                .iter()
                .map(element_value)
                .collect::<Result<Vec<TermValue>, ResponseError>>()?
        };

        let mut tensor: ArrayD<Complex64> = ArrayD::zeros(IxDyn(&vec![CARTESIAN_DIM; rank]));
        let mut signals: Vec<NearDegeneracy> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for (component, value) in elements.iter().zip(values.into_iter()) {
            if self.options.symmetric {
                for index in component.iter().copied().permutations(rank).unique() {
                    tensor[IxDyn(&index)] = value.value;
                }
            } else {
                tensor[IxDyn(component)] = value.value;
            }
            for signal in value.signals.into_iter() {
                if seen.insert((signal.denominator.clone(), signal.assignment.clone())) {
                    signals.push(signal);
                }
            }
        }
        print_signals(&signals);
        let statistics: CacheStatistics = cache.statistics();
        print_evaluation_end(&timer, &statistics);
        cache.clear();

        Ok(Evaluation {
            tensor,
            signals,
            n_terms: sos.number_of_terms(),
            statistics,
        })
    }
}

impl<'a, B: ResponseSolver + ?Sized> Driver<'a, B> {
    /// Evaluates a response function with response vectors instead of explicit sums.
    pub fn evaluate_with_response_vectors(
        &self,
        function: ResponseFunction,
        operators: &[OperatorKind],
        frequencies: &Frequencies,
        final_state: Option<usize>,
    ) -> Result<Evaluation, ResponseError> {
        let sos: SumOverStates = self.prepare(function, operators)?;
        self.evaluate_expression_with_response_vectors(
            function.name(),
            &sos,
            frequencies,
            final_state,
        )
    }

    pub fn evaluate_expression_with_response_vectors(
        &self,
        name: &str,
        sos: &SumOverStates,
        frequencies: &Frequencies,
        final_state: Option<usize>,
    ) -> Result<Evaluation, ResponseError> {
        let context: NumericContext = self.context(sos, frequencies, final_state)?;
        let cache: EvaluationCache = EvaluationCache::new();
        let evaluator = ResponseEvaluator::new(self.backend, &cache, &context);
        self.run(
            name,
            sos,
            &context,
            &evaluator,
            &cache,
            Strategy::ResponseVectors,
        )
    }

    /// Evaluates a response function with the chosen strategy.
    pub fn evaluate_with(
        &self,
        strategy: Strategy,
        function: ResponseFunction,
        operators: &[OperatorKind],
        frequencies: &Frequencies,
        final_state: Option<usize>,
    ) -> Result<Evaluation, ResponseError> {
        match strategy {
            Strategy::SumOverStates => {
                self.evaluate(function, operators, frequencies, final_state)
            }
            Strategy::ResponseVectors => {
                self.evaluate_with_response_vectors(function, operators, frequencies, final_state)
            }
        }
    }
}

#[cfg(test)]
mod tests;
