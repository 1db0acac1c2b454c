use crate::errors::{ConfigurationError, ConstructionError, ResponseError};
use crate::symbolic::{Denominator, FrequencyLabel, StateLabel, Symbol};
use num_complex::Complex64;
use responsefun_backend::AdcBackend;
use std::collections::BTreeMap;
use std::fmt;

/// A state of the backend: the ground state or the n-th excited state (counted from zero).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StateIndex {
    Ground,
    Excited(usize),
}

impl fmt::Display for StateIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StateIndex::Ground => write!(f, "ground state"),
            StateIndex::Excited(n) => write!(f, "state {}", n),
        }
    }
}

/// Excited states assigned to the indices of summation in one summand.
pub type Assignment = BTreeMap<StateLabel, usize>;

pub(crate) fn describe_assignment(assignment: &Assignment) -> String {
    if assignment.is_empty() {
        return String::from("all states");
    }
    assignment
        .iter()
        .map(|(label, n)| format!("{}={}", label, n))
        .collect::<Vec<String>>()
        .join(", ")
}

/// The excited states that the indices of summation run over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSet {
    states: Vec<usize>,
}

impl StateSet {
    /// All excited states of the backend.
    pub fn all<B: AdcBackend + ?Sized>(backend: &B) -> Self {
        Self::lowest(backend.n_states())
    }

    /// The `n` energetically lowest excited states.
    pub fn lowest(n: usize) -> Self {
        Self {
            states: (0..n).collect(),
        }
    }

    pub fn from_indices(mut states: Vec<usize>) -> Self {
        states.sort_unstable();
        states.dedup();
        Self { states }
    }

    pub fn indices(&self) -> &[usize] {
        &self.states
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + Clone + '_ {
        self.states.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn check(&self, n_states: usize) -> Result<(), ConfigurationError> {
        if self.states.is_empty() {
            return Err(ConfigurationError::EmptyStateSet);
        }
        match self.states.iter().find(|n| **n >= n_states) {
            Some(state) => Err(ConfigurationError::StateOutOfRange {
                state: *state,
                n_states,
            }),
            None => Ok(()),
        }
    }
}

/// A denominator whose absolute value fell below the degeneracy tolerance.
#[derive(Clone, Debug, PartialEq)]
pub struct NearDegeneracy {
    pub denominator: String,
    pub assignment: String,
    pub magnitude: f64,
}

impl fmt::Display for NearDegeneracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "|{}| = {:.3e} for {}",
            self.denominator, self.magnitude, self.assignment
        )
    }
}

/// Numeric values that turn a symbolic expression into numbers: the external frequencies,
/// the damping, the final state and the excited states of the summation.
#[derive(Clone, Debug)]
pub struct NumericContext {
    frequencies: BTreeMap<FrequencyLabel, f64>,
    gamma: f64,
    final_state: Option<usize>,
    states: StateSet,
    tolerance: f64,
}

impl NumericContext {
    pub fn new(
        frequencies: BTreeMap<FrequencyLabel, f64>,
        gamma: f64,
        final_state: Option<usize>,
        states: StateSet,
        tolerance: f64,
    ) -> Self {
        Self {
            frequencies,
            gamma,
            final_state,
            states,
            tolerance,
        }
    }

    pub fn frequencies(&self) -> &BTreeMap<FrequencyLabel, f64> {
        &self.frequencies
    }

    pub fn frequency(&self, label: FrequencyLabel) -> Result<f64, ResponseError> {
        self.frequencies
            .get(&label)
            .copied()
            .ok_or_else(|| ConfigurationError::MissingFrequency(label.to_string()).into())
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn final_state(&self) -> Option<usize> {
        self.final_state
    }

    pub fn states(&self) -> &StateSet {
        &self.states
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Translates a state label into a state of the backend.
    pub fn resolve(
        &self,
        label: StateLabel,
        assignment: &Assignment,
    ) -> Result<StateIndex, ResponseError> {
        match label {
            StateLabel::Ground => Ok(StateIndex::Ground),
            StateLabel::Summed(_) => assignment
                .get(&label)
                .map(|n| StateIndex::Excited(*n))
                .ok_or_else(|| {
                    ConstructionError::InvalidSummationIndex(label.to_string()).into()
                }),
            StateLabel::Final(_) => self
                .final_state
                .map(StateIndex::Excited)
                .ok_or_else(|| ConfigurationError::MissingFinalState.into()),
        }
    }

    pub fn evaluate_denominator<B: AdcBackend + ?Sized>(
        &self,
        backend: &B,
        denominator: &Denominator,
        assignment: &Assignment,
    ) -> Result<Complex64, ResponseError> {
        let energies = backend.excitation_energies();
        denominator.evaluate(
            |symbol: &Symbol| -> Result<f64, ResponseError> {
                match symbol {
                    Symbol::Transition(state) => match self.resolve(*state, assignment)? {
                        StateIndex::Ground => Ok(0.0),
                        StateIndex::Excited(n) => energies.get(n).copied().ok_or_else(|| {
                            ConfigurationError::StateOutOfRange {
                                state: n,
                                n_states: energies.len(),
                            }
                            .into()
                        }),
                    },
                    Symbol::Frequency(label) => self.frequency(*label),
                    Symbol::Damping => Ok(0.0),
                }
            },
            self.gamma,
        )
    }

    /// An exactly vanishing denominator is an error, a small one is reported.
    pub fn check_denominator(
        &self,
        denominator: &Denominator,
        value: Complex64,
        assignment: &Assignment,
    ) -> Result<Option<NearDegeneracy>, ResponseError> {
        let magnitude: f64 = value.norm();
        if magnitude == 0.0 {
            return Err(ResponseError::Divergence {
                denominator: denominator.to_string(),
                assignment: describe_assignment(assignment),
            });
        }
        if magnitude < self.tolerance {
            return Ok(Some(NearDegeneracy {
                denominator: denominator.to_string(),
                assignment: describe_assignment(assignment),
                magnitude,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{F, N, O, W_1};

    fn context() -> NumericContext {
        let mut frequencies = BTreeMap::new();
        frequencies.insert(W_1, 0.2);
        NumericContext::new(frequencies, 0.01, Some(1), StateSet::lowest(3), 1.0e-3)
    }

    #[test]
    fn resolve_labels() {
        let ctx = context();
        let mut assignment = Assignment::new();
        assignment.insert(N, 2);
        assert_eq!(ctx.resolve(O, &assignment).unwrap(), StateIndex::Ground);
        assert_eq!(ctx.resolve(N, &assignment).unwrap(), StateIndex::Excited(2));
        assert_eq!(ctx.resolve(F, &assignment).unwrap(), StateIndex::Excited(1));
        assert!(ctx.resolve(StateLabel::Summed('q'), &assignment).is_err());
    }

    #[test]
    fn state_set_checks() {
        assert!(StateSet::lowest(3).check(3).is_ok());
        assert!(matches!(
            StateSet::from_indices(vec![4, 1, 1]).check(3),
            Err(ConfigurationError::StateOutOfRange { state: 4, .. })
        ));
        assert!(matches!(
            StateSet::lowest(0).check(3),
            Err(ConfigurationError::EmptyStateSet)
        ));
        assert_eq!(StateSet::from_indices(vec![2, 0, 2]).indices(), &[0, 2]);
    }

    #[test]
    fn classify_denominators() {
        let ctx = context();
        let d = Denominator::transition(N).frequency(W_1, -1);
        let assignment = Assignment::new();
        assert!(ctx
            .check_denominator(&d, Complex64::new(0.0, 0.0), &assignment)
            .is_err());
        let signal = ctx
            .check_denominator(&d, Complex64::new(1.0e-4, 0.0), &assignment)
            .unwrap();
        assert!(signal.is_some());
        let none = ctx
            .check_denominator(&d, Complex64::new(0.1, 0.0), &assignment)
            .unwrap();
        assert!(none.is_none());
    }
}
