use crate::errors::ConstructionError;
use crate::symbolic::{Denominator, FrequencyLabel, Operator, StateLabel};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Names of the summation indices in the canonical form of a term.
const CANONICAL_INDICES: [char; 8] = ['n', 'm', 'p', 'k', 'q', 'r', 's', 't'];

/// Matrix element <bra|op|ket>. With `fluctuation` the operator is replaced by the
/// fluctuation operator op - <0|op|0>, which only changes diagonal elements.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionMoment {
    pub operator: Operator,
    pub bra: StateLabel,
    pub ket: StateLabel,
    pub fluctuation: bool,
}

impl TransitionMoment {
    pub fn latex(&self) -> String {
        let op: String = if self.fluctuation {
            format!("\\overline{{{}}}", self.operator.latex())
        } else {
            self.operator.latex()
        };
        format!("\\langle {}|{}|{}\\rangle", self.bra, op, self.ket)
    }
}

impl fmt::Display for TransitionMoment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bar: &str = if self.fluctuation { "\u{0304}" } else { "" };
        write!(
            f,
            "<{}|{}{}_{}|{}>",
            self.bra,
            self.operator.kind().symbol(),
            bar,
            self.operator.labels().iter().collect::<String>(),
            self.ket
        )
    }
}

/// Levi-Civita symbol ε over three Cartesian labels of the tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeviCivita {
    labels: [char; 3],
}

impl LeviCivita {
    pub fn new(labels: &str) -> Result<Self, ConstructionError> {
        let chars: Vec<char> = labels.chars().collect();
        let distinct: bool = chars.len() == 3
            && chars.iter().all(|c| c.is_ascii_uppercase())
            && chars[0] != chars[1]
            && chars[1] != chars[2]
            && chars[0] != chars[2];
        if !distinct {
            return Err(ConstructionError::InvalidOperatorLabels {
                labels: String::from(labels),
                rank: 3,
            });
        }
        Ok(Self {
            labels: [chars[0], chars[1], chars[2]],
        })
    }

    pub fn labels(&self) -> &[char; 3] {
        &self.labels
    }

    /// Positions of the labels in the tensor (A -> 0, B -> 1, ...).
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.labels.iter().map(|c| (*c as u8 - b'A') as usize)
    }

    /// ε_ijk for the Cartesian components of a tensor element.
    pub fn value(&self, tensor_index: &[usize]) -> f64 {
        let mut ijk: [i64; 3] = [0; 3];
        for (slot, position) in ijk.iter_mut().zip(self.positions()) {
            match tensor_index.get(position) {
                Some(c) if *c < 3 => *slot = *c as i64,
                _ => return 0.0,
            }
        }
        let [i, j, k] = ijk;
        ((i - j) * (j - k) * (k - i)) as f64 / 2.0
    }
}

impl fmt::Display for LeviCivita {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ε_{}", self.labels.iter().collect::<String>())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Factor {
    Moment(TransitionMoment),
    Denominator(Denominator),
    LeviCivita(LeviCivita),
}

/// Order-independent representation of a term used to identify like terms. Two terms
/// with the same key only differ in the order of their factors and the naming of the
/// summation indices.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermKey {
    levi_civita: Vec<LeviCivita>,
    moments: Vec<TransitionMoment>,
    denominators: Vec<Denominator>,
}

/// Product of a prefactor, matrix elements and inverse denominators.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    prefactor: f64,
    factors: Vec<Factor>,
    /// Permutation of the (operator, frequency) pairs this term was generated with.
    permutation: Vec<usize>,
}

impl Default for Term {
    fn default() -> Self {
        Self::new()
    }
}

impl Term {
    pub fn new() -> Self {
        Self {
            prefactor: 1.0,
            factors: Vec::new(),
            permutation: Vec::new(),
        }
    }

    pub fn scaled(prefactor: f64) -> Self {
        Self {
            prefactor,
            ..Self::new()
        }
    }

    /// Multiplies the term with <bra|op|ket>.
    pub fn moment(mut self, bra: StateLabel, operator: &Operator, ket: StateLabel) -> Self {
        self.factors.push(Factor::Moment(TransitionMoment {
            operator: operator.clone(),
            bra,
            ket,
            fluctuation: false,
        }));
        self
    }

    /// Multiplies the term with <bra|op - <0|op|0>|ket>.
    pub fn fluctuation(mut self, bra: StateLabel, operator: &Operator, ket: StateLabel) -> Self {
        self.factors.push(Factor::Moment(TransitionMoment {
            operator: operator.clone(),
            bra,
            ket,
            fluctuation: true,
        }));
        self
    }

    /// Multiplies the term with a Levi-Civita symbol.
    pub fn levi_civita(mut self, epsilon: LeviCivita) -> Self {
        self.factors.push(Factor::LeviCivita(epsilon));
        self
    }

    /// Divides the term by a denominator.
    pub fn over(mut self, denominator: Denominator) -> Self {
        self.factors.push(Factor::Denominator(denominator));
        self
    }

    pub fn prefactor(&self) -> f64 {
        self.prefactor
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub(crate) fn with_prefactor(mut self, prefactor: f64) -> Self {
        self.prefactor = prefactor;
        self
    }

    pub(crate) fn with_permutation(mut self, permutation: Vec<usize>) -> Self {
        self.permutation = permutation;
        self
    }

    pub fn moments(&self) -> impl Iterator<Item = &TransitionMoment> {
        self.factors.iter().filter_map(|f| match f {
            Factor::Moment(m) => Some(m),
            _ => None,
        })
    }

    pub fn denominators(&self) -> impl Iterator<Item = &Denominator> {
        self.factors.iter().filter_map(|f| match f {
            Factor::Denominator(d) => Some(d),
            _ => None,
        })
    }

    pub fn levi_civita_factors(&self) -> impl Iterator<Item = &LeviCivita> {
        self.factors.iter().filter_map(|f| match f {
            Factor::LeviCivita(e) => Some(e),
            _ => None,
        })
    }

    /// Product of the Levi-Civita symbols for a tensor element.
    pub fn levi_civita_value(&self, tensor_index: &[usize]) -> f64 {
        self.levi_civita_factors()
            .map(|e| e.value(tensor_index))
            .product()
    }

    /// Operators in the order of their appearance.
    pub fn operators(&self) -> Vec<&Operator> {
        self.moments().map(|m| &m.operator).collect()
    }

    /// All states that appear in a matrix element.
    pub fn states(&self) -> BTreeSet<StateLabel> {
        self.moments().flat_map(|m| [m.bra, m.ket]).collect()
    }

    /// Summation indices of the term in the order of their appearance.
    pub fn summation_indices(&self) -> Vec<StateLabel> {
        let mut indices: Vec<StateLabel> = Vec::new();
        for state in self.moments().flat_map(|m| [m.bra, m.ket]) {
            if state.is_summed() && !indices.contains(&state) {
                indices.push(state);
            }
        }
        indices
    }

    pub fn has_bra(&self, state: StateLabel) -> bool {
        self.moments().any(|m| m.bra == state)
    }

    pub fn has_ket(&self, state: StateLabel) -> bool {
        self.moments().any(|m| m.ket == state)
    }

    pub fn is_damped(&self) -> bool {
        self.denominators().any(|d| d.is_damped())
    }

    /// Applies a map to every factor of the term.
    pub fn map_factors<F>(&self, map: F) -> Self
    where
        F: Fn(&Factor) -> Factor,
    {
        Self {
            prefactor: self.prefactor,
            factors: self.factors.iter().map(map).collect(),
            permutation: self.permutation.clone(),
        }
    }

    /// The summand in which the given indices of summation take the ground state: the
    /// indices are replaced by 0 in the matrix elements and their excitation energies
    /// drop out of the denominators.
    pub fn ground_state_contribution(&self, indices: &[StateLabel]) -> Self {
        let to_ground = |s: StateLabel| if indices.contains(&s) { StateLabel::Ground } else { s };
        self.map_factors(|factor| match factor {
            Factor::Moment(m) => Factor::Moment(TransitionMoment {
                bra: to_ground(m.bra),
                ket: to_ground(m.ket),
                ..m.clone()
            }),
            Factor::Denominator(d) => Factor::Denominator(
                indices
                    .iter()
                    .fold(d.clone(), |acc, index| acc.without_state(*index)),
            ),
            other => other.clone(),
        })
    }

    /// Replaces a frequency in all denominators by a linear combination of frequencies.
    pub fn substitute_frequency(
        &self,
        label: FrequencyLabel,
        replacement: &[(FrequencyLabel, i32)],
    ) -> Self {
        self.map_factors(|factor| match factor {
            Factor::Denominator(d) => Factor::Denominator(d.substitute_frequency(label, replacement)),
            other => other.clone(),
        })
    }

    /// Key of the canonical form: moments sorted by operator, summation indices renamed in
    /// the order of their first appearance and denominators sorted.
    pub fn canonical_key(&self) -> TermKey {
        let mut moments: Vec<TransitionMoment> = self.moments().cloned().collect();
        moments.sort_by(|a, b| {
            (&a.operator, a.fluctuation).cmp(&(&b.operator, b.fluctuation))
        });
        let mut names: HashMap<StateLabel, StateLabel> = HashMap::new();
        for state in moments.iter().flat_map(|m| [m.bra, m.ket]) {
            if state.is_summed() && !names.contains_key(&state) {
                let name: char = CANONICAL_INDICES
                    .get(names.len())
                    .copied()
                    .unwrap_or(char::from(b'a' + names.len() as u8));
                names.insert(state, StateLabel::Summed(name));
            }
        }
        let rename = |s: StateLabel| names.get(&s).copied().unwrap_or(s);
        for m in moments.iter_mut() {
            m.bra = rename(m.bra);
            m.ket = rename(m.ket);
        }
        let mut denominators: Vec<Denominator> =
            self.denominators().map(|d| d.map_states(rename)).collect();
        denominators.sort();
        let mut levi_civita: Vec<LeviCivita> = self.levi_civita_factors().copied().collect();
        levi_civita.sort();
        TermKey {
            levi_civita,
            moments,
            denominators,
        }
    }

    pub fn latex(&self) -> String {
        let numerator: String = self
            .levi_civita_factors()
            .map(|e| format!("\\epsilon_{{{}}}", e.labels().iter().collect::<String>()))
            .chain(self.moments().map(|m| m.latex()))
            .collect::<Vec<_>>()
            .join(" ");
        let denominator: String = self
            .denominators()
            .map(|d| format!("\\left({}\\right)", d.latex()))
            .collect::<Vec<_>>()
            .join(" ");
        let fraction: String = if denominator.is_empty() {
            numerator
        } else {
            format!("\\frac{{{}}}{{{}}}", numerator, denominator)
        };
        if self.prefactor == 1.0 {
            fraction
        } else if self.prefactor == -1.0 {
            format!("- {}", fraction)
        } else {
            format!("{} {}", self.prefactor, fraction)
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.prefactor == -1.0 {
            write!(f, "-")?;
        } else if self.prefactor != 1.0 {
            write!(f, "{} ", self.prefactor)?;
        }
        for e in self.levi_civita_factors() {
            write!(f, "{} ", e)?;
        }
        for m in self.moments() {
            write!(f, "{}", m)?;
        }
        let denominators: Vec<String> = self.denominators().map(|d| d.to_string()).collect();
        if !denominators.is_empty() {
            write!(f, " / {}", denominators.join(""))?;
        }
        Ok(())
    }
}
