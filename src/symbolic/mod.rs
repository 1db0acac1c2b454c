pub use catalog::ResponseFunction;
pub use expression::SumOverStates;
pub use frequency::*;
pub use operator::*;
pub use state::StateLabel;
pub use term::*;

mod catalog;
mod expression;
mod frequency;
mod operator;
mod state;
mod term;

/// The ground state.
pub const O: StateLabel = StateLabel::Ground;
/// Indices of summation.
pub const N: StateLabel = StateLabel::Summed('n');
pub const M: StateLabel = StateLabel::Summed('m');
pub const P: StateLabel = StateLabel::Summed('p');
pub const K: StateLabel = StateLabel::Summed('k');
/// The final state of a transition moment.
pub const F: StateLabel = StateLabel::Final('f');

/// Outgoing frequency ω_σ.
pub const W_SIGMA: FrequencyLabel = FrequencyLabel::Sigma;
/// Incoming frequencies.
pub const W_1: FrequencyLabel = FrequencyLabel::Omega(1);
pub const W_2: FrequencyLabel = FrequencyLabel::Omega(2);
pub const W_3: FrequencyLabel = FrequencyLabel::Omega(3);
