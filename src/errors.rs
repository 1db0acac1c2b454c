use responsefun_backend::BackendError;
use thiserror::Error;

/// The requested sum-over-states expression cannot be built or is malformed.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("{function} needs {expected} operators, but {found} were given")]
    UnsupportedCombination {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("the sum-over-states expression does not contain any term")]
    EmptyExpression,

    #[error("'{0}' cannot be used as index of summation")]
    InvalidSummationIndex(String),

    #[error("index of summation '{index}' is not a bra and a ket in term {term}")]
    MissingSummationIndex { index: String, term: String },

    #[error("the Cartesian labels of an order {rank} tensor have to be {expected}, found {found}")]
    InvalidComponents {
        rank: usize,
        expected: String,
        found: String,
    },

    #[error("operator labels '{labels}' do not match an operator of rank {rank}")]
    InvalidOperatorLabels { labels: String, rank: usize },

    #[error("the (operator, frequency) pairs must follow the operator order of the term: expected {expected} at position {position}, found {found}")]
    PermutationPairMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("the frequency {0} is used by more than one (operator, frequency) pair")]
    DuplicatePermutationFrequency(String),

    #[error("final state '{0}' does not occur in the expression")]
    UnusedFinalState(String),

    #[error("the ground-state contribution {term} has a vanishing denominator; exclude ({index}, 0) from the summation")]
    VanishingGroundStateTerm { index: String, term: String },

    #[error("term {term} cannot be evaluated with response vectors: {reason}")]
    UnsupportedTerm { term: String, reason: String },
}

/// The numeric input violates a constraint of the requested response function.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{expected} frequencies are required, but {found} were given")]
    FrequencyCount { expected: usize, found: usize },

    #[error("no value was given for the frequency {0}")]
    MissingFrequency(String),

    #[error("frequency {0} is not a finite number")]
    NonFiniteFrequency(f64),

    #[error("the outgoing frequency {sigma} does not equal the sum of the incoming frequencies {sum}")]
    FrequencySum { sigma: f64, sum: f64 },

    #[error("the incoming frequencies sum to {sum}, but the excitation energy of the final state is {energy}")]
    FinalStateResonance { sum: f64, energy: f64 },

    #[error("a final state is required for this property")]
    MissingFinalState,

    #[error("a final state was given, but the property does not use one")]
    UnexpectedFinalState,

    #[error("excited state {state} requested, but the backend provides {n_states} states")]
    StateOutOfRange { state: usize, n_states: usize },

    #[error("the set of excited states is empty")]
    EmptyStateSet,

    #[error("response vectors span all {n_states} excited states, but only {selected} were selected")]
    RestrictedStateSet { selected: usize, n_states: usize },

    #[error("a damping value of {0} was given, but the expression is undamped")]
    UnusedDamping(f64),
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("backend computation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("cache entry {0} holds a value of another type")]
    CacheMismatch(String),

    #[error("denominator {denominator} vanishes for {assignment}")]
    Divergence {
        denominator: String,
        assignment: String,
    },
}
