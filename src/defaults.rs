use crate::evaluation::Strategy;
use crate::symbolic::ResponseFunction;

// config file
pub const CONFIG_FILE_NAME: &str = "responsefun.toml";

// PROPERTY
pub const PROPERTY: ResponseFunction = ResponseFunction::Polarizability;
// damping parameter γ in a.u., zero for an undamped response function
pub const GAMMA: f64 = 0.0;
// evaluation of the sum over states
pub const STRATEGY: Strategy = Strategy::SumOverStates;
// evaluate only the unique elements of a tensor that is symmetric in all indices
pub const SYMMETRIC: bool = false;
// maximal allowed deviation of ω_σ (or of the final-state energy) from the sum of the
// incoming frequencies
pub const FREQUENCY_TOLERANCE: f64 = 1.0e-8;
// add the summands in which an index of summation takes the ground state
pub const GROUND_STATE_TERMS: bool = true;
// denominators with an absolute value below this threshold are reported
pub const DEGENERACY_TOLERANCE: f64 = 1.0e-3;

// PARALLELIZATION
pub const USE_PARALLELIZATION: bool = false;
pub const NUMBER_OF_CORES: usize = 1;

// OUTPUT
pub const WRITE_NPY: bool = false;
pub const OUTPUT_PREFIX: &str = "tensor";
