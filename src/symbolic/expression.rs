use crate::errors::ConstructionError;
use crate::symbolic::{
    Denominator, FrequencyCorrelation, FrequencyLabel, Operator, StateLabel, Term,
};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeSet;
use std::fmt;

/// A sum over states: a list of terms together with the indices of summation. The indices
/// run over the excited states of the backend; summands in which an index takes the
/// ground state are added as separate terms by `with_ground_state_terms`.
#[derive(Clone, Debug, PartialEq)]
pub struct SumOverStates {
    terms: Vec<Term>,
    summation_indices: Vec<StateLabel>,
    /// Pairs (index, state) for which a summand is skipped, e.g. (n, 0) or (n, f).
    excluded: Vec<(StateLabel, StateLabel)>,
    correlation: Option<FrequencyCorrelation>,
    final_state: Option<StateLabel>,
    rank: usize,
}

impl SumOverStates {
    pub fn new(
        terms: Vec<Term>,
        summation_indices: Vec<StateLabel>,
    ) -> Result<Self, ConstructionError> {
        if terms.is_empty() {
            return Err(ConstructionError::EmptyExpression);
        }
        if let Some(index) = summation_indices.iter().find(|s| !s.is_summed()) {
            return Err(ConstructionError::InvalidSummationIndex(index.to_string()));
        }
        for term in terms.iter() {
            for state in term.states().into_iter().filter(|s| s.is_summed()) {
                if !summation_indices.contains(&state) {
                    return Err(ConstructionError::InvalidSummationIndex(format!(
                        "{} (used in {} but not summed over)",
                        state, term
                    )));
                }
                if !(term.has_bra(state) && term.has_ket(state)) {
                    return Err(ConstructionError::MissingSummationIndex {
                        index: state.to_string(),
                        term: term.to_string(),
                    });
                }
            }
        }
        if let Some(unused) = summation_indices
            .iter()
            .find(|s| terms.iter().all(|t| !t.states().contains(s)))
        {
            return Err(ConstructionError::MissingSummationIndex {
                index: unused.to_string(),
                term: terms[0].to_string(),
            });
        }
        let rank: usize = check_components(&terms)?;

        Ok(Self {
            terms,
            summation_indices,
            excluded: Vec::new(),
            correlation: None,
            final_state: None,
            rank,
        })
    }

    pub fn with_correlation(mut self, correlation: FrequencyCorrelation) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_final_state(mut self, state: StateLabel) -> Result<Self, ConstructionError> {
        if !state.is_final() || self.terms.iter().all(|t| !t.states().contains(&state)) {
            return Err(ConstructionError::UnusedFinalState(state.to_string()));
        }
        self.final_state = Some(state);
        Ok(self)
    }

    /// Skips all summands in which `index` equals `state`.
    pub fn with_excluded_states(
        mut self,
        excluded: &[(StateLabel, StateLabel)],
    ) -> Result<Self, ConstructionError> {
        for (index, state) in excluded.iter() {
            if !self.summation_indices.contains(index) {
                return Err(ConstructionError::InvalidSummationIndex(index.to_string()));
            }
            if state.is_final() && self.final_state != Some(*state) {
                return Err(ConstructionError::UnusedFinalState(state.to_string()));
            }
            if !self.excluded.contains(&(*index, *state)) {
                self.excluded.push((*index, *state));
            }
        }
        Ok(self)
    }

    /// Adds the summands in which one or more indices of summation take the ground state.
    /// Indices excluded from the ground state, e.g. by (n, 0), are skipped, and so are
    /// combinations that put two mutually excluded indices on the ground state.
    pub fn with_ground_state_terms(&self) -> Result<Self, ConstructionError> {
        let mut terms: Vec<Term> = self.terms.clone();
        for term in self.terms.iter() {
            let candidates: Vec<StateLabel> = term
                .summation_indices()
                .into_iter()
                .filter(|index| !self.excluded.contains(&(*index, StateLabel::Ground)))
                .collect();
            for subset in candidates.into_iter().powerset().skip(1) {
                if self
                    .excluded
                    .iter()
                    .any(|(index, state)| subset.contains(index) && subset.contains(state))
                {
                    continue;
                }
                let extra: Term = term.ground_state_contribution(&subset);
                if extra.denominators().any(|d| d.is_zero()) {
                    return Err(ConstructionError::VanishingGroundStateTerm {
                        index: subset.iter().map(|s| s.to_string()).join(","),
                        term: extra.to_string(),
                    });
                }
                terms.push(extra);
            }
        }
        debug!(
            "{} ground-state term(s) added",
            terms.len() - self.terms.len()
        );
        Ok(self.with_terms(terms))
    }

    /// Same expression with different terms. The terms have to carry the same operators.
    pub(crate) fn with_terms(&self, terms: Vec<Term>) -> Self {
        Self {
            terms,
            ..self.clone()
        }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn number_of_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn summation_indices(&self) -> &[StateLabel] {
        &self.summation_indices
    }

    pub fn excluded(&self) -> &[(StateLabel, StateLabel)] {
        &self.excluded
    }

    pub fn correlation(&self) -> Option<&FrequencyCorrelation> {
        self.correlation.as_ref()
    }

    pub fn final_state(&self) -> Option<StateLabel> {
        self.final_state
    }

    /// Order of the resulting tensor.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Operators of the first term in the order of their appearance.
    pub fn operators(&self) -> Vec<&Operator> {
        self.terms[0].operators()
    }

    pub fn is_damped(&self) -> bool {
        self.terms.iter().any(|t| t.is_damped())
    }

    /// External frequencies appearing in the denominators.
    pub fn frequency_labels(&self) -> BTreeSet<FrequencyLabel> {
        self.terms
            .iter()
            .flat_map(|t| t.denominators())
            .flat_map(|d| d.frequencies())
            .map(|(label, _)| label)
            .collect()
    }

    pub fn substitute_frequency(
        &self,
        label: FrequencyLabel,
        replacement: &[(FrequencyLabel, i32)],
    ) -> Self {
        let terms: Vec<Term> = self
            .terms
            .iter()
            .map(|t| t.substitute_frequency(label, replacement))
            .collect();
        self.with_terms(terms)
    }

    /// Expresses the outgoing frequency by the sum of the incoming ones.
    pub fn eliminate_outgoing_frequency(&self) -> Self {
        match &self.correlation {
            Some(FrequencyCorrelation::Outgoing { incoming }) => {
                let replacement: Vec<(FrequencyLabel, i32)> =
                    incoming.iter().map(|w| (*w, 1)).collect();
                self.substitute_frequency(FrequencyLabel::Sigma, &replacement)
            }
            _ => self.clone(),
        }
    }

    /// Denominators that consist of excitation energies only. These diverge if two states
    /// are degenerate.
    pub fn static_denominators(&self) -> Vec<&Denominator> {
        let mut found: Vec<&Denominator> = Vec::new();
        for d in self.terms.iter().flat_map(|t| t.denominators()) {
            if d.is_static() && !found.contains(&d) {
                found.push(d);
            }
        }
        found
    }

    pub fn latex(&self) -> String {
        let mut out: String = String::from("\\sum_{");
        out.push_str(
            &self
                .summation_indices
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>()
                .join(","),
        );
        out.push_str("} ");
        for (i, term) in self.terms.iter().enumerate() {
            let text: String = term.latex();
            if i > 0 && !text.starts_with('-') {
                out.push_str(" + ");
            } else if i > 0 {
                out.push(' ');
            }
            out.push_str(&text);
        }
        out
    }
}

/// Checks that every term carries the Cartesian labels A, B, C, ... exactly once and
/// returns the rank of the tensor.
fn check_components(terms: &[Term]) -> Result<usize, ConstructionError> {
    let mut reference: Option<Vec<char>> = None;
    for term in terms.iter() {
        let mut labels: Vec<char> = term
            .operators()
            .iter()
            .flat_map(|op| op.labels().to_vec())
            .collect();
        labels.sort_unstable();
        let expected: Vec<char> = (0..labels.len()).map(|i| (b'A' + i as u8) as char).collect();
        if labels != expected {
            return Err(ConstructionError::InvalidComponents {
                rank: labels.len(),
                expected: expected.iter().collect(),
                found: labels.iter().collect(),
            });
        }
        if let Some(epsilon) = term
            .levi_civita_factors()
            .find(|e| e.labels().iter().any(|c| !labels.contains(c)))
        {
            return Err(ConstructionError::InvalidComponents {
                rank: labels.len(),
                expected: labels.iter().collect(),
                found: epsilon.labels().iter().collect(),
            });
        }
        match &reference {
            Some(r) if *r != labels => {
                return Err(ConstructionError::InvalidComponents {
                    rank: r.len(),
                    expected: r.iter().collect(),
                    found: labels.iter().collect(),
                })
            }
            _ => reference = Some(labels),
        }
    }
    Ok(reference.map(|r| r.len()).unwrap_or(0))
}

impl fmt::Display for SumOverStates {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let indices: Vec<String> = self.summation_indices.iter().map(|s| s.to_string()).collect();
        write!(f, "Σ_{{{}}}", indices.join(","))?;
        if !self.excluded.is_empty() {
            let excluded: Vec<String> = self
                .excluded
                .iter()
                .map(|(i, s)| format!("{}≠{}", i, s))
                .collect();
            write!(f, " ({})", excluded.join(", "))?;
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", term)?;
            } else {
                write!(f, "\n    + {}", term)?;
            }
        }
        if let Some(correlation) = &self.correlation {
            write!(f, "\n    with {}", correlation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{label_operators, OperatorKind, F, K, M, N, O, W_1, W_2, W_SIGMA};

    fn dipoles(n: usize) -> Vec<Operator> {
        label_operators(&vec![OperatorKind::ElectricDipole; n]).unwrap()
    }

    #[test]
    fn index_has_to_be_bra_and_ket() {
        let ops = dipoles(2);
        let term = Term::new().moment(O, &ops[0], N).moment(M, &ops[1], O);
        assert!(matches!(
            SumOverStates::new(vec![term], vec![N, M]),
            Err(ConstructionError::MissingSummationIndex { .. })
        ));
    }

    #[test]
    fn unknown_and_invalid_indices() {
        let ops = dipoles(2);
        let term = Term::new().moment(O, &ops[0], N).moment(N, &ops[1], O);
        assert!(matches!(
            SumOverStates::new(vec![term.clone()], vec![]),
            Err(ConstructionError::InvalidSummationIndex(_))
        ));
        assert!(matches!(
            SumOverStates::new(vec![term.clone()], vec![N, O]),
            Err(ConstructionError::InvalidSummationIndex(_))
        ));
        assert!(matches!(
            SumOverStates::new(vec![term], vec![N, K]),
            Err(ConstructionError::MissingSummationIndex { .. })
        ));
        assert!(matches!(
            SumOverStates::new(vec![], vec![N]),
            Err(ConstructionError::EmptyExpression)
        ));
    }

    #[test]
    fn components_have_to_be_consecutive() {
        let a = Operator::new(OperatorKind::ElectricDipole, "A").unwrap();
        let c = Operator::new(OperatorKind::ElectricDipole, "C").unwrap();
        let term = Term::new().moment(O, &a, N).moment(N, &c, O);
        assert!(matches!(
            SumOverStates::new(vec![term], vec![N]),
            Err(ConstructionError::InvalidComponents { .. })
        ));
    }

    #[test]
    fn final_state_and_exclusions() {
        let ops = dipoles(2);
        let term = Term::new()
            .moment(O, &ops[0], N)
            .moment(N, &ops[1], F)
            .over(Denominator::transition(N).frequency(W_1, -1));
        let sos = SumOverStates::new(vec![term], vec![N]).unwrap();
        assert!(sos.clone().with_final_state(StateLabel::Final('g')).is_err());
        let sos = sos.with_final_state(F).unwrap();
        assert_eq!(sos.rank(), 2);
        let sos = sos.with_excluded_states(&[(N, O), (N, F), (N, O)]).unwrap();
        assert_eq!(sos.excluded(), &[(N, O), (N, F)]);
        assert!(sos.clone().with_excluded_states(&[(M, O)]).is_err());
    }

    #[test]
    fn ground_state_terms() {
        let ops = dipoles(2);
        let term = Term::new()
            .moment(O, &ops[0], N)
            .moment(N, &ops[1], O)
            .over(Denominator::transition(N).frequency(W_SIGMA, -1).damping(-1));
        let sos = SumOverStates::new(vec![term], vec![N]).unwrap();
        let extended = sos.with_ground_state_terms().unwrap();
        assert_eq!(extended.number_of_terms(), 2);
        assert_eq!(
            extended.terms()[1].to_string(),
            "<0|μ_A|0><0|μ_B|0> / (-ω_σ - iγ)"
        );
        assert!(extended.terms()[1].summation_indices().is_empty());

        let excluded = sos.with_excluded_states(&[(N, O)]).unwrap();
        assert_eq!(excluded.with_ground_state_terms().unwrap(), excluded);
    }

    #[test]
    fn ground_state_terms_of_two_indices() {
        let ops = dipoles(3);
        let term = Term::new()
            .moment(O, &ops[0], N)
            .moment(N, &ops[1], K)
            .moment(K, &ops[2], F)
            .over(Denominator::transition(N).frequency(W_1, -1))
            .over(Denominator::transition(K).frequency(W_1, -1).frequency(W_2, -1));
        let sos = SumOverStates::new(vec![term], vec![N, K])
            .unwrap()
            .with_final_state(F)
            .unwrap();
        let extended = sos.with_ground_state_terms().unwrap();
        assert_eq!(extended.number_of_terms(), 4);
        assert_eq!(
            extended.terms()[3].to_string(),
            "<0|μ_A|0><0|μ_B|0><0|μ_C|f> / (-ω_1)(-ω_1 - ω_2)"
        );
        // n = k = 0 is skipped if the two indices have to differ.
        let distinct = sos.with_excluded_states(&[(N, K)]).unwrap();
        assert_eq!(distinct.with_ground_state_terms().unwrap().number_of_terms(), 3);
    }

    #[test]
    fn vanishing_ground_state_denominator() {
        let ops = dipoles(2);
        let term = Term::new()
            .moment(O, &ops[0], N)
            .moment(N, &ops[1], O)
            .over(Denominator::transition(N));
        let sos = SumOverStates::new(vec![term], vec![N]).unwrap();
        assert!(matches!(
            sos.with_ground_state_terms(),
            Err(ConstructionError::VanishingGroundStateTerm { .. })
        ));
        let excluded = sos.with_excluded_states(&[(N, O)]).unwrap();
        assert!(excluded.with_ground_state_terms().is_ok());
    }

    #[test]
    fn levi_civita_labels_have_to_be_tensor_labels() {
        let ops = dipoles(2);
        let term = Term::new()
            .levi_civita(crate::symbolic::LeviCivita::new("ABC").unwrap())
            .moment(O, &ops[0], N)
            .moment(N, &ops[1], O)
            .over(Denominator::transition(N));
        assert!(matches!(
            SumOverStates::new(vec![term], vec![N]),
            Err(ConstructionError::InvalidComponents { .. })
        ));
    }

    #[test]
    fn eliminate_outgoing_frequency() {
        let ops = dipoles(3);
        let term = Term::new()
            .moment(O, &ops[0], N)
            .fluctuation(N, &ops[1], K)
            .moment(K, &ops[2], O)
            .over(Denominator::transition(N).frequency(W_SIGMA, -1))
            .over(Denominator::transition(K).frequency(W_2, -1));
        let sos = SumOverStates::new(vec![term], vec![N, K])
            .unwrap()
            .with_correlation(FrequencyCorrelation::Outgoing {
                incoming: vec![W_1, W_2],
            });
        let eliminated = sos.eliminate_outgoing_frequency();
        let labels: Vec<FrequencyLabel> = eliminated.frequency_labels().into_iter().collect();
        assert_eq!(labels, vec![W_1, W_2]);
        assert!(sos.frequency_labels().contains(&W_SIGMA));
        assert!(eliminated.static_denominators().is_empty());
    }
}
