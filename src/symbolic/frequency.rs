use crate::symbolic::StateLabel;
use num_complex::Complex64;
use std::collections::BTreeMap;
use std::fmt;

/// Symbolic frequency of an external field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrequencyLabel {
    /// Outgoing frequency ω_σ
    Sigma,
    /// Incoming frequency ω_j (j >= 1)
    Omega(u8),
}

impl FrequencyLabel {
    pub fn latex(&self) -> String {
        match self {
            FrequencyLabel::Sigma => String::from("\\omega_{\\sigma}"),
            FrequencyLabel::Omega(j) => format!("\\omega_{{{}}}", j),
        }
    }
}

impl fmt::Display for FrequencyLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrequencyLabel::Sigma => write!(f, "ω_σ"),
            FrequencyLabel::Omega(j) => write!(f, "ω_{}", j),
        }
    }
}

/// A frequency label together with a sign, e.g. -ω_σ.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignedFrequency {
    pub sign: i32,
    pub label: FrequencyLabel,
}

impl SignedFrequency {
    pub fn positive(label: FrequencyLabel) -> Self {
        Self { sign: 1, label }
    }

    pub fn negative(label: FrequencyLabel) -> Self {
        Self { sign: -1, label }
    }
}

impl fmt::Display for SignedFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.sign < 0 {
            write!(f, "-{}", self.label)
        } else {
            write!(f, "{}", self.label)
        }
    }
}

/// Relation between the frequencies of a response function.
#[derive(Clone, Debug, PartialEq)]
pub enum FrequencyCorrelation {
    /// ω_σ = Σ_j ω_j
    Outgoing { incoming: Vec<FrequencyLabel> },
    /// Σ_j ω_j = ω_f, the excitation energy of the final state.
    FinalState {
        state: StateLabel,
        incoming: Vec<FrequencyLabel>,
    },
}

impl FrequencyCorrelation {
    pub fn incoming(&self) -> &[FrequencyLabel] {
        match self {
            FrequencyCorrelation::Outgoing { incoming } => incoming,
            FrequencyCorrelation::FinalState { incoming, .. } => incoming,
        }
    }
}

impl fmt::Display for FrequencyCorrelation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sum: Vec<String> = self.incoming().iter().map(|w| w.to_string()).collect();
        match self {
            FrequencyCorrelation::Outgoing { .. } => write!(f, "ω_σ = {}", sum.join(" + ")),
            FrequencyCorrelation::FinalState { state, .. } => {
                write!(f, "{} = ω_{}", sum.join(" + "), state)
            }
        }
    }
}

/// The symbols a denominator is built from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// Excitation energy ω_n of a state; zero for the ground state.
    Transition(StateLabel),
    Frequency(FrequencyLabel),
    /// The damping iγ.
    Damping,
}

/// A linear combination of excitation energies, external frequencies and the damping iγ
/// with integer coefficients, e.g. (ω_n - ω_σ - iγ). Symbols with a zero coefficient are
/// never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Denominator {
    coefficients: BTreeMap<Symbol, i32>,
}

impl Denominator {
    /// ω_state
    pub fn transition(state: StateLabel) -> Self {
        Self::default().with(Symbol::Transition(state), 1)
    }

    pub fn with(mut self, symbol: Symbol, coefficient: i32) -> Self {
        let c: i32 = self.coefficient(&symbol) + coefficient;
        if c == 0 {
            self.coefficients.remove(&symbol);
        } else {
            self.coefficients.insert(symbol, c);
        }
        self
    }

    pub fn frequency(self, label: FrequencyLabel, coefficient: i32) -> Self {
        self.with(Symbol::Frequency(label), coefficient)
    }

    pub fn state(self, state: StateLabel, coefficient: i32) -> Self {
        self.with(Symbol::Transition(state), coefficient)
    }

    pub fn damping(self, coefficient: i32) -> Self {
        self.with(Symbol::Damping, coefficient)
    }

    pub fn coefficient(&self, symbol: &Symbol) -> i32 {
        self.coefficients.get(symbol).copied().unwrap_or(0)
    }

    pub fn damping_coefficient(&self) -> i32 {
        self.coefficient(&Symbol::Damping)
    }

    pub fn is_damped(&self) -> bool {
        self.damping_coefficient() != 0
    }

    /// True if the denominator only consists of excitation energies.
    pub fn is_static(&self) -> bool {
        self.coefficients
            .keys()
            .all(|s| matches!(s, Symbol::Transition(_)))
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&Symbol, &i32)> {
        self.coefficients.iter()
    }

    pub fn states(&self) -> Vec<(StateLabel, i32)> {
        self.coefficients
            .iter()
            .filter_map(|(s, c)| match s {
                Symbol::Transition(state) => Some((*state, *c)),
                _ => None,
            })
            .collect()
    }

    pub fn frequencies(&self) -> Vec<(FrequencyLabel, i32)> {
        self.coefficients
            .iter()
            .filter_map(|(s, c)| match s {
                Symbol::Frequency(label) => Some((*label, *c)),
                _ => None,
            })
            .collect()
    }

    pub fn summed_states(&self) -> Vec<(StateLabel, i32)> {
        self.states()
            .into_iter()
            .filter(|(s, _)| s.is_summed())
            .collect()
    }

    /// The denominator without the contribution of `symbol`.
    pub fn without(&self, symbol: &Symbol) -> Self {
        let mut coefficients = self.coefficients.clone();
        coefficients.remove(symbol);
        Self { coefficients }
    }

    /// Replaces a frequency by a linear combination of other frequencies.
    pub fn substitute_frequency(
        &self,
        label: FrequencyLabel,
        replacement: &[(FrequencyLabel, i32)],
    ) -> Self {
        let c: i32 = self.coefficient(&Symbol::Frequency(label));
        if c == 0 {
            return self.clone();
        }
        replacement.iter().fold(
            self.without(&Symbol::Frequency(label)),
            |acc, (other, r)| acc.frequency(*other, c * r),
        )
    }

    /// Simultaneous substitution of all frequencies, x -> sign · y.
    pub fn map_frequencies<F>(&self, map: F) -> Self
    where
        F: Fn(FrequencyLabel) -> (FrequencyLabel, i32),
    {
        self.coefficients
            .iter()
            .fold(Self::default(), |acc, (symbol, c)| match symbol {
                Symbol::Frequency(label) => {
                    let (new_label, sign) = map(*label);
                    acc.frequency(new_label, sign * c)
                }
                _ => acc.with(*symbol, *c),
            })
    }

    pub fn map_states<F>(&self, map: F) -> Self
    where
        F: Fn(StateLabel) -> StateLabel,
    {
        self.coefficients
            .iter()
            .fold(Self::default(), |acc, (symbol, c)| match symbol {
                Symbol::Transition(state) => acc.state(map(*state), *c),
                _ => acc.with(*symbol, *c),
            })
    }

    /// The denominator with the excitation energy of `state` set to zero, as for the
    /// ground state.
    pub fn without_state(&self, state: StateLabel) -> Self {
        self.without(&Symbol::Transition(state))
    }

    /// True if no symbol is left, i.e. the denominator vanishes identically.
    pub fn is_zero(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Net coefficient of the external frequencies. The outgoing frequency is expanded
    /// into the incoming ones if the correlation allows it.
    pub fn net_frequency_sign(&self, correlation: Option<&FrequencyCorrelation>) -> i32 {
        let expanded: Denominator = match correlation {
            Some(FrequencyCorrelation::Outgoing { incoming }) => {
                let replacement: Vec<(FrequencyLabel, i32)> =
                    incoming.iter().map(|w| (*w, 1)).collect();
                self.substitute_frequency(FrequencyLabel::Sigma, &replacement)
            }
            _ => self.clone(),
        };
        expanded
            .frequencies()
            .iter()
            .map(|(_, c)| c)
            .sum::<i32>()
            .signum()
    }

    /// Aligns the sign of the damping with the sign of the frequencies, so that the
    /// damping always enters as ω ± iγ. Denominators without a net frequency keep their
    /// damping.
    pub fn with_damping_rule(self, correlation: Option<&FrequencyCorrelation>) -> Self {
        let d: i32 = self.damping_coefficient();
        let sign: i32 = self.net_frequency_sign(correlation);
        if d == 0 || sign == 0 {
            return self;
        }
        self.without(&Symbol::Damping).damping(d.abs() * sign)
    }

    /// Numeric value of the denominator. `value_of` returns the value of an excitation
    /// energy or a frequency, the damping enters as i·γ.
    pub fn evaluate<E, V>(&self, mut value_of: V, gamma: f64) -> Result<Complex64, E>
    where
        V: FnMut(&Symbol) -> Result<f64, E>,
    {
        let mut value: Complex64 = Complex64::new(0.0, 0.0);
        for (symbol, c) in self.coefficients.iter() {
            match symbol {
                Symbol::Damping => value += Complex64::new(0.0, *c as f64 * gamma),
                _ => value += *c as f64 * value_of(symbol)?,
            }
        }
        Ok(value)
    }

    pub fn latex(&self) -> String {
        self.render(
            |state| format!("\\omega_{{{}}}", state),
            |label| label.latex(),
            "i\\gamma",
        )
    }

    fn render<S, W>(&self, state: S, frequency: W, damping: &str) -> String
    where
        S: Fn(&StateLabel) -> String,
        W: Fn(&FrequencyLabel) -> String,
    {
        let mut out: String = String::new();
        for (i, (symbol, c)) in self.coefficients.iter().enumerate() {
            let name: String = match symbol {
                Symbol::Transition(s) => state(s),
                Symbol::Frequency(w) => frequency(w),
                Symbol::Damping => String::from(damping),
            };
            let sign: &str = match (i, *c < 0) {
                (0, false) => "",
                (0, true) => "-",
                (_, false) => " + ",
                (_, true) => " - ",
            };
            if c.abs() == 1 {
                out.push_str(&format!("{}{}", sign, name));
            } else {
                out.push_str(&format!("{}{}{}", sign, c.abs(), name));
            }
        }
        if out.is_empty() {
            out.push('0');
        }
        out
    }
}

impl fmt::Display for Denominator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text: String = self.render(|state| format!("ω_{}", state), |w| w.to_string(), "iγ");
        write!(f, "({})", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{N, W_1, W_2, W_SIGMA};

    #[test]
    fn zero_coefficients_are_removed() {
        let d = Denominator::transition(N).frequency(W_1, 1).frequency(W_1, -1);
        assert_eq!(d, Denominator::transition(N));
        assert!(d.is_static());
    }

    #[test]
    fn display_denominator() {
        let d = Denominator::transition(N).frequency(W_SIGMA, -1).damping(-1);
        assert_eq!(d.to_string(), "(ω_n - ω_σ - iγ)");
        let d = Denominator::transition(N).frequency(W_1, 2);
        assert_eq!(d.to_string(), "(ω_n + 2ω_1)");
    }

    #[test]
    fn outgoing_frequency_is_expanded() {
        let d = Denominator::transition(N).frequency(W_SIGMA, -1);
        let e = d.substitute_frequency(W_SIGMA, &[(W_1, 1), (W_2, 1)]);
        assert_eq!(e, Denominator::transition(N).frequency(W_1, -1).frequency(W_2, -1));
    }

    #[test]
    fn damping_follows_the_frequencies() {
        let correlation = FrequencyCorrelation::Outgoing {
            incoming: vec![W_1, W_2],
        };
        // (ω_n + ω_σ - ω_2 - iγ) = (ω_n + ω_1 - iγ) -> (ω_n + ω_1 + iγ)
        let d = Denominator::transition(N)
            .frequency(W_SIGMA, 1)
            .frequency(W_2, -1)
            .damping(-1)
            .with_damping_rule(Some(&correlation));
        assert_eq!(d.damping_coefficient(), 1);
        // Without net frequency the damping is kept.
        let d = Denominator::transition(N).damping(-1).with_damping_rule(Some(&correlation));
        assert_eq!(d.damping_coefficient(), -1);
    }

    #[test]
    fn evaluate_denominator() {
        let d = Denominator::transition(N).frequency(W_1, -1).damping(-1);
        let value: Result<Complex64, ()> = d.evaluate(
            |s| match s {
                Symbol::Transition(_) => Ok(0.5),
                _ => Ok(0.2),
            },
            0.01,
        );
        let value = value.unwrap();
        assert!((value - Complex64::new(0.3, -0.01)).norm() < 1e-14);
    }
}
