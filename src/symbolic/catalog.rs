use crate::errors::ConstructionError;
use crate::symbolic::*;
use crate::symmetrization::PermutationGroup;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The response properties that can be requested by name. Every variant knows its
/// unsymmetrized sum-over-states expression and the (operator, frequency) pairs that are
/// permuted to obtain the full expression.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFunction {
    /// <<A;B>>_ω
    Polarizability,
    /// <<A;B,C>>_ω1,ω2
    FirstHyperpolarizability,
    /// <<A;B,C,D>>_ω1,ω2,ω3
    SecondHyperpolarizability,
    /// Two-photon transition matrix element S_AB from the ground state to a final state.
    #[serde(alias = "two_photon")]
    TwoPhotonTransition,
    /// Three-photon transition matrix element T_ABC from the ground state to a final state.
    #[serde(alias = "three_photon")]
    ThreePhotonTransition,
    /// <<A;B>>_ω of an excited final state.
    #[serde(alias = "esp")]
    ExcitedStatePolarizability,
}

impl ResponseFunction {
    pub fn n_operators(&self) -> usize {
        match self {
            ResponseFunction::Polarizability
            | ResponseFunction::TwoPhotonTransition
            | ResponseFunction::ExcitedStatePolarizability => 2,
            ResponseFunction::FirstHyperpolarizability
            | ResponseFunction::ThreePhotonTransition => 3,
            ResponseFunction::SecondHyperpolarizability => 4,
        }
    }

    /// Number of independent incoming frequencies.
    pub fn n_frequencies(&self) -> usize {
        if self.is_transition_moment() {
            self.n_operators()
        } else {
            self.n_operators() - 1
        }
    }

    /// Transition moments between the ground state and a final state; the incoming
    /// frequencies add up to the excitation energy of the final state.
    pub fn is_transition_moment(&self) -> bool {
        matches!(
            self,
            ResponseFunction::TwoPhotonTransition | ResponseFunction::ThreePhotonTransition
        )
    }

    pub fn uses_final_state(&self) -> bool {
        self.is_transition_moment() || *self == ResponseFunction::ExcitedStatePolarizability
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseFunction::Polarizability => "polarizability",
            ResponseFunction::FirstHyperpolarizability => "first hyperpolarizability",
            ResponseFunction::SecondHyperpolarizability => "second hyperpolarizability",
            ResponseFunction::TwoPhotonTransition => "two-photon transition moment",
            ResponseFunction::ThreePhotonTransition => "three-photon transition moment",
            ResponseFunction::ExcitedStatePolarizability => "excited-state polarizability",
        }
    }

    /// Builds the unsymmetrized expression for the given operators (in tensor order) and
    /// the permutation group that completes it.
    pub fn build(
        &self,
        kinds: &[OperatorKind],
    ) -> Result<(SumOverStates, PermutationGroup), ConstructionError> {
        if kinds.len() != self.n_operators() {
            return Err(ConstructionError::UnsupportedCombination {
                function: String::from(self.name()),
                expected: self.n_operators(),
                found: kinds.len(),
            });
        }
        let ops: Vec<Operator> = label_operators(kinds)?;
        let incoming: Vec<FrequencyLabel> = (1..=self.n_frequencies() as u8)
            .map(FrequencyLabel::Omega)
            .collect();

        let (sos, pairs) = match self {
            ResponseFunction::Polarizability => {
                let term = Term::new()
                    .moment(O, &ops[0], N)
                    .moment(N, &ops[1], O)
                    .over(Denominator::transition(N).frequency(W_SIGMA, -1).damping(-1));
                let sos = SumOverStates::new(vec![term], vec![N])?
                    .with_excluded_states(&[(N, O)])?;
                (sos, outgoing_pairs(&ops))
            }
            ResponseFunction::FirstHyperpolarizability => {
                let term = Term::new()
                    .moment(O, &ops[0], N)
                    .fluctuation(N, &ops[1], K)
                    .moment(K, &ops[2], O)
                    .over(Denominator::transition(N).frequency(W_SIGMA, -1).damping(-1))
                    .over(Denominator::transition(K).frequency(W_2, -1).damping(-1));
                let sos = SumOverStates::new(vec![term], vec![N, K])?
                    .with_excluded_states(&[(N, O), (K, O)])?;
                (sos, outgoing_pairs(&ops))
            }
            ResponseFunction::SecondHyperpolarizability => {
                let main = Term::new()
                    .moment(O, &ops[0], N)
                    .fluctuation(N, &ops[1], M)
                    .fluctuation(M, &ops[2], P)
                    .moment(P, &ops[3], O)
                    .over(Denominator::transition(N).frequency(W_SIGMA, -1).damping(-1))
                    .over(
                        Denominator::transition(M)
                            .frequency(W_2, -1)
                            .frequency(W_3, -1)
                            .damping(-1),
                    )
                    .over(Denominator::transition(P).frequency(W_3, -1).damping(-1));
                // Secular term that removes the unlinked ground-state contributions.
                let secular = Term::scaled(-1.0)
                    .moment(O, &ops[0], N)
                    .moment(N, &ops[1], O)
                    .moment(O, &ops[2], M)
                    .moment(M, &ops[3], O)
                    .over(Denominator::transition(N).frequency(W_SIGMA, -1).damping(-1))
                    .over(Denominator::transition(M).frequency(W_3, -1).damping(-1))
                    .over(Denominator::transition(M).frequency(W_2, 1).damping(1));
                let sos = SumOverStates::new(vec![main, secular], vec![N, M, P])?
                    .with_excluded_states(&[(N, O), (M, O), (P, O)])?;
                (sos, outgoing_pairs(&ops))
            }
            ResponseFunction::TwoPhotonTransition => {
                let term = Term::new()
                    .moment(O, &ops[0], N)
                    .moment(N, &ops[1], F)
                    .over(Denominator::transition(N).frequency(W_1, -1));
                let sos = SumOverStates::new(vec![term], vec![N])?.with_final_state(F)?;
                (sos, incoming_pairs(&ops))
            }
            ResponseFunction::ThreePhotonTransition => {
                let term = Term::new()
                    .moment(O, &ops[0], N)
                    .moment(N, &ops[1], M)
                    .moment(M, &ops[2], F)
                    .over(Denominator::transition(N).frequency(W_1, -1))
                    .over(
                        Denominator::transition(M)
                            .frequency(W_1, -1)
                            .frequency(W_2, -1),
                    );
                let sos = SumOverStates::new(vec![term], vec![N, M])?.with_final_state(F)?;
                (sos, incoming_pairs(&ops))
            }
            ResponseFunction::ExcitedStatePolarizability => {
                let term = Term::new()
                    .moment(F, &ops[0], N)
                    .moment(N, &ops[1], F)
                    .over(
                        Denominator::transition(N)
                            .state(F, -1)
                            .frequency(W_SIGMA, -1)
                            .damping(-1),
                    );
                let sos = SumOverStates::new(vec![term], vec![N])?
                    .with_final_state(F)?
                    .with_excluded_states(&[(N, F)])?;
                (sos, outgoing_pairs(&ops))
            }
        };

        let correlation: FrequencyCorrelation = if self.is_transition_moment() {
            FrequencyCorrelation::FinalState { state: F, incoming }
        } else {
            FrequencyCorrelation::Outgoing { incoming }
        };
        Ok((sos.with_correlation(correlation), PermutationGroup::new(pairs)?))
    }
}

/// (A, -ω_σ), (B, ω_1), (C, ω_2), ...
fn outgoing_pairs(ops: &[Operator]) -> Vec<(Operator, SignedFrequency)> {
    ops.iter()
        .enumerate()
        .map(|(i, op)| {
            let frequency: SignedFrequency = if i == 0 {
                SignedFrequency::negative(FrequencyLabel::Sigma)
            } else {
                SignedFrequency::positive(FrequencyLabel::Omega(i as u8))
            };
            (op.clone(), frequency)
        })
        .collect()
}

/// (A, ω_1), (B, ω_2), ...
fn incoming_pairs(ops: &[Operator]) -> Vec<(Operator, SignedFrequency)> {
    ops.iter()
        .enumerate()
        .map(|(i, op)| {
            (
                op.clone(),
                SignedFrequency::positive(FrequencyLabel::Omega(i as u8 + 1)),
            )
        })
        .collect()
}

impl fmt::Display for ResponseFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
