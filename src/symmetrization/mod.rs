use crate::errors::ConstructionError;
use crate::symbolic::{
    Factor, FrequencyCorrelation, FrequencyLabel, Operator, SignedFrequency, SumOverStates, Term,
    TermKey, TransitionMoment,
};
use hashbrown::HashMap;
use itertools::Itertools;
use log::debug;
use std::fmt;

/// Prefactors below this threshold are treated as cancelled terms.
const PREFACTOR_THRESHOLD: f64 = 1.0e-12;

/// An operator together with the frequency of the field it couples to.
#[derive(Clone, Debug, PartialEq)]
pub struct PermutationPair {
    pub operator: Operator,
    pub frequency: SignedFrequency,
}

impl fmt::Display for PermutationPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.operator, self.frequency)
    }
}

/// The group of all permutations of (operator, frequency) pairs. Applying a permutation
/// exchanges operators and frequencies of the pairs simultaneously.
#[derive(Clone, Debug, PartialEq)]
pub struct PermutationGroup {
    pairs: Vec<PermutationPair>,
}

impl PermutationGroup {
    pub fn new(pairs: Vec<(Operator, SignedFrequency)>) -> Result<Self, ConstructionError> {
        let pairs: Vec<PermutationPair> = pairs
            .into_iter()
            .map(|(operator, frequency)| PermutationPair {
                operator,
                frequency,
            })
            .collect();
        for (i, pair) in pairs.iter().enumerate() {
            if pairs[..i]
                .iter()
                .any(|other| other.frequency.label == pair.frequency.label)
            {
                return Err(ConstructionError::DuplicatePermutationFrequency(
                    pair.frequency.label.to_string(),
                ));
            }
        }
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[PermutationPair] {
        &self.pairs
    }

    /// Number of group elements, n!.
    pub fn order(&self) -> usize {
        (1..=self.pairs.len()).product()
    }

    /// All permutations; the identity comes first.
    pub fn permutations(&self) -> impl Iterator<Item = Vec<usize>> {
        let n: usize = self.pairs.len();
        (0..n).permutations(n)
    }

    /// The operators of an unpermuted term have to appear in the order of the pairs.
    /// Terms that were generated by a permutation only have to carry the operators of
    /// the pairs in some order.
    pub fn check_term(&self, term: &Term) -> Result<(), ConstructionError> {
        let operators: Vec<&Operator> = term.operators();
        if !is_identity(term.permutation()) {
            return match operators.iter().position(|op| self.operator_index(op).is_none()) {
                Some(position) => Err(ConstructionError::PermutationPairMismatch {
                    position,
                    expected: self.pairs.iter().map(|p| p.operator.to_string()).join(", "),
                    found: operators[position].to_string(),
                }),
                None => Ok(()),
            };
        }
        for (position, pair) in self.pairs.iter().enumerate() {
            match operators.get(position) {
                Some(op) if **op == pair.operator => {}
                found => {
                    return Err(ConstructionError::PermutationPairMismatch {
                        position,
                        expected: pair.operator.to_string(),
                        found: found
                            .map(|op| op.to_string())
                            .unwrap_or_else(|| String::from("nothing")),
                    })
                }
            }
        }
        Ok(())
    }

    fn operator_index(&self, operator: &Operator) -> Option<usize> {
        self.pairs.iter().position(|p| p.operator == *operator)
    }

    fn frequency_index(&self, label: FrequencyLabel) -> Option<usize> {
        self.pairs.iter().position(|p| p.frequency.label == label)
    }

    /// Applies a permutation to a term: op_i -> op_p(i) and x_i -> s_i s_p(i) x_p(i),
    /// substituted simultaneously. Afterwards the damping of every denominator is aligned
    /// with its frequencies.
    pub fn permute(
        &self,
        term: &Term,
        permutation: &[usize],
        correlation: Option<&FrequencyCorrelation>,
    ) -> Term {
        let map_operator = |op: &Operator| -> Operator {
            match self.operator_index(op) {
                Some(i) => self.pairs[permutation[i]].operator.clone(),
                None => op.clone(),
            }
        };
        let map_frequency = |label: FrequencyLabel| -> (FrequencyLabel, i32) {
            match self.frequency_index(label) {
                Some(i) => {
                    let target: &SignedFrequency = &self.pairs[permutation[i]].frequency;
                    (target.label, self.pairs[i].frequency.sign * target.sign)
                }
                None => (label, 1),
            }
        };
        let permuted: Term = term.map_factors(|factor| match factor {
            Factor::Moment(m) => Factor::Moment(TransitionMoment {
                operator: map_operator(&m.operator),
                ..m.clone()
            }),
            Factor::Denominator(d) => Factor::Denominator(
                d.map_frequencies(map_frequency)
                    .with_damping_rule(correlation),
            ),
            Factor::LeviCivita(epsilon) => Factor::LeviCivita(*epsilon),
        });
        let tag: Vec<usize> = if term.permutation().is_empty() {
            permutation.to_vec()
        } else {
            term.permutation().iter().map(|i| permutation[*i]).collect()
        };
        permuted.with_permutation(tag)
    }

    /// Sum over all permutations of every term, with like terms collected. An expression
    /// that is already invariant under the group is returned unchanged.
    pub fn symmetrize(&self, sos: &SumOverStates) -> Result<SumOverStates, ConstructionError> {
        for term in sos.terms().iter() {
            self.check_term(term)?;
        }
        if self.is_invariant(sos) {
            debug!("expression is already symmetric, nothing to do");
            return Ok(sos.clone());
        }
        let permutations: Vec<Vec<usize>> = self.permutations().collect();
        let terms: Vec<Term> = collect_terms(sos.terms().iter().flat_map(|term| {
            permutations
                .iter()
                .map(move |p| self.permute(term, p, sos.correlation()))
        }));
        debug!(
            "symmetrized {} term(s) with {} permutations into {} term(s)",
            sos.number_of_terms(),
            permutations.len(),
            terms.len()
        );
        Ok(sos.with_terms(terms))
    }

    /// True if every permutation maps the expression onto itself.
    pub fn is_invariant(&self, sos: &SumOverStates) -> bool {
        let reference: HashMap<TermKey, f64> = canonical_sum(sos.terms().iter().cloned());
        self.permutations().all(|p| {
            let permuted: HashMap<TermKey, f64> = canonical_sum(
                sos.terms()
                    .iter()
                    .map(|t| self.permute(t, &p, sos.correlation())),
            );
            same_sum(&reference, &permuted)
        })
    }
}

/// An empty tag marks a term that was written down directly.
fn is_identity(permutation: &[usize]) -> bool {
    permutation.iter().enumerate().all(|(i, p)| i == *p)
}

/// Sums the prefactors of like terms.
fn canonical_sum<I: IntoIterator<Item = Term>>(terms: I) -> HashMap<TermKey, f64> {
    let mut sum: HashMap<TermKey, f64> = HashMap::new();
    for term in terms {
        *sum.entry(term.canonical_key()).or_insert(0.0) += term.prefactor();
    }
    sum.retain(|_, c| c.abs() > PREFACTOR_THRESHOLD);
    sum
}

fn same_sum(a: &HashMap<TermKey, f64>, b: &HashMap<TermKey, f64>) -> bool {
    a.len() == b.len()
        && a.iter().all(|(key, c)| {
            b.get(key)
                .map_or(false, |other| (c - other).abs() <= PREFACTOR_THRESHOLD)
        })
}

/// Merges like terms by adding their prefactors. The first occurrence of a term keeps its
/// position; terms that cancel are dropped.
pub fn collect_terms<I: IntoIterator<Item = Term>>(terms: I) -> Vec<Term> {
    let mut position: HashMap<TermKey, usize> = HashMap::new();
    let mut collected: Vec<Term> = Vec::new();
    for term in terms {
        let key: TermKey = term.canonical_key();
        match position.get(&key) {
            Some(i) => {
                let prefactor: f64 = collected[*i].prefactor() + term.prefactor();
                collected[*i] = collected[*i].clone().with_prefactor(prefactor);
            }
            None => {
                position.insert(key, collected.len());
                collected.push(term);
            }
        }
    }
    collected
        .into_iter()
        .filter(|t| t.prefactor().abs() > PREFACTOR_THRESHOLD)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{
        label_operators, Denominator, OperatorKind, ResponseFunction, K, N, O, W_1, W_2, W_SIGMA,
    };

    fn alpha_base() -> (SumOverStates, PermutationGroup) {
        let ops = label_operators(&[OperatorKind::ElectricDipole; 2]).unwrap();
        let term = Term::new()
            .moment(O, &ops[0], N)
            .moment(N, &ops[1], O)
            .over(Denominator::transition(N).frequency(W_SIGMA, -1).damping(-1));
        let sos = SumOverStates::new(vec![term], vec![N])
            .unwrap()
            .with_correlation(FrequencyCorrelation::Outgoing { incoming: vec![W_1] });
        let group = PermutationGroup::new(vec![
            (ops[0].clone(), SignedFrequency::negative(W_SIGMA)),
            (ops[1].clone(), SignedFrequency::positive(W_1)),
        ])
        .unwrap();
        (sos, group)
    }

    #[test]
    fn polarizability_has_two_terms() {
        let (sos, group) = alpha_base();
        let symmetric = group.symmetrize(&sos).unwrap();
        assert_eq!(symmetric.number_of_terms(), 2);
        let second: &Term = &symmetric.terms()[1];
        assert_eq!(second.to_string(), "<0|μ_B|n><n|μ_A|0> / (ω_n + ω_1 + iγ)");
        assert_eq!(second.permutation(), &[1, 0]);
    }

    #[test]
    fn symmetrization_is_idempotent() {
        for function in [
            ResponseFunction::Polarizability,
            ResponseFunction::FirstHyperpolarizability,
            ResponseFunction::ThreePhotonTransition,
        ] {
            let kinds = vec![OperatorKind::ElectricDipole; function.n_operators()];
            let (sos, group) = function.build(&kinds).unwrap();
            let once = group.symmetrize(&sos).unwrap();
            let twice = group.symmetrize(&once).unwrap();
            assert!(group.is_invariant(&once));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn like_terms_are_merged() {
        // T + 2 P(T) -> 3 T + 3 P(T)
        let (sos, group) = alpha_base();
        let t: Term = sos.terms()[0].clone();
        let pt: Term = group.permute(&t, &[1, 0], sos.correlation()).with_prefactor(2.0);
        let mixed = sos.with_terms(vec![t, pt]);
        let symmetric = group.symmetrize(&mixed).unwrap();
        assert_eq!(symmetric.number_of_terms(), 2);
        for term in symmetric.terms() {
            assert!((term.prefactor() - 3.0).abs() < 1e-14);
        }
    }

    #[test]
    fn symmetric_output_can_be_symmetrized_again() {
        let (sos, group) = alpha_base();
        let once = group.symmetrize(&sos).unwrap();
        assert_eq!(once.terms()[1].operators()[0], &group.pairs()[1].operator);
        for term in once.terms() {
            assert!(group.check_term(term).is_ok());
        }
        let twice = group.symmetrize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn permuted_terms_need_the_operators_of_the_pairs() {
        let (sos, group) = alpha_base();
        let ops = label_operators(&[OperatorKind::ElectricDipole, OperatorKind::MagneticDipole])
            .unwrap();
        let foreign = Term::new()
            .moment(O, &ops[1], N)
            .moment(N, &ops[0], O)
            .over(Denominator::transition(N).frequency(W_1, 1).damping(1))
            .with_permutation(vec![1, 0]);
        assert!(matches!(
            group.check_term(&foreign),
            Err(ConstructionError::PermutationPairMismatch { position: 0, .. })
        ));
        let mixed = sos.with_terms(vec![sos.terms()[0].clone(), foreign]);
        assert!(group.symmetrize(&mixed).is_err());
    }

    #[test]
    fn hyperpolarizability_terms_are_distinct() {
        let ops = label_operators(&[OperatorKind::ElectricDipole; 3]).unwrap();
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
        let group = PermutationGroup::new(vec![
            (ops[0].clone(), SignedFrequency::negative(W_SIGMA)),
            (ops[1].clone(), SignedFrequency::positive(W_1)),
            (ops[2].clone(), SignedFrequency::positive(W_2)),
        ])
        .unwrap();
        assert_eq!(group.order(), 6);
        let symmetric = group.symmetrize(&sos).unwrap();
        assert_eq!(symmetric.number_of_terms(), 6);
    }

    #[test]
    fn pairs_have_to_match_the_operators() {
        let (sos, _) = alpha_base();
        let ops = label_operators(&[OperatorKind::ElectricDipole; 2]).unwrap();
        let reversed = PermutationGroup::new(vec![
            (ops[1].clone(), SignedFrequency::positive(W_1)),
            (ops[0].clone(), SignedFrequency::negative(W_SIGMA)),
        ])
        .unwrap();
        assert!(matches!(
            reversed.symmetrize(&sos),
            Err(ConstructionError::PermutationPairMismatch { position: 0, .. })
        ));
        assert!(PermutationGroup::new(vec![
            (ops[0].clone(), SignedFrequency::positive(W_1)),
            (ops[1].clone(), SignedFrequency::negative(W_1)),
        ])
        .is_err());
    }
}
