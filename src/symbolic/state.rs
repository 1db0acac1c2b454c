use std::fmt;

/// Label of a state inside a symbolic expression. The states themselves (energies,
/// amplitudes) are owned by the ADC backend and only looked up during the evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateLabel {
    Ground,
    /// Bound index of summation running over the excited states.
    Summed(char),
    /// Fixed final state of a transition moment.
    Final(char),
}

impl StateLabel {
    pub fn is_summed(&self) -> bool {
        matches!(self, StateLabel::Summed(_))
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StateLabel::Final(_))
    }
}

impl fmt::Display for StateLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StateLabel::Ground => write!(f, "0"),
            StateLabel::Summed(c) | StateLabel::Final(c) => write!(f, "{}", c),
        }
    }
}
