use crate::defaults::*;
use crate::driver::{DriverOptions, Frequencies};
use crate::evaluation::{StateSet, Strategy};
use crate::symbolic::{OperatorKind, ResponseFunction, StateLabel, F};
use serde::{Deserialize, Serialize};

fn default_property() -> ResponseFunction {
    PROPERTY
}
fn default_operators() -> Vec<OperatorKind> {
    Vec::new()
}
fn default_frequencies() -> Vec<f64> {
    Vec::new()
}
fn default_gamma() -> f64 {
    GAMMA
}
fn default_strategy() -> Strategy {
    STRATEGY
}
fn default_symmetric() -> bool {
    SYMMETRIC
}
fn default_excluded_states() -> Vec<(char, char)> {
    Vec::new()
}
fn default_ground_state_terms() -> bool {
    GROUND_STATE_TERMS
}
fn default_degeneracy_tolerance() -> f64 {
    DEGENERACY_TOLERANCE
}
fn default_verbose() -> i8 {
    0
}
fn default_use_parallelization() -> bool {
    USE_PARALLELIZATION
}
fn default_number_of_cores() -> usize {
    NUMBER_OF_CORES
}
fn default_write_npy() -> bool {
    WRITE_NPY
}
fn default_prefix() -> String {
    String::from(OUTPUT_PREFIX)
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Configuration {
    #[serde(default = "default_property")]
    pub property: ResponseFunction,
    /// Operator kind of every slot; electric dipoles if empty.
    #[serde(default = "default_operators")]
    pub operators: Vec<OperatorKind>,
    /// Incoming frequencies ω_1, ω_2, ... in a.u.
    #[serde(default = "default_frequencies")]
    pub frequencies: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omega_sigma: Option<f64>,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Zero-based index of the excited final state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<usize>,
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    #[serde(default = "default_symmetric")]
    pub symmetric: bool,
    /// Restricts the sums to the lowest excited states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_states: Option<usize>,
    /// Pairs of a summation index and a state, e.g. ["n", "f"], that are skipped.
    #[serde(default = "default_excluded_states")]
    pub excluded_states: Vec<(char, char)>,
    /// Add the summands in which an index of summation takes the ground state.
    #[serde(default = "default_ground_state_terms")]
    pub ground_state_terms: bool,
    #[serde(default = "default_degeneracy_tolerance")]
    pub degeneracy_tolerance: f64,
    #[serde(default = "default_verbose")]
    pub verbose: i8,
    #[serde(default)]
    pub parallelization: ParallelizationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Configuration {
    pub fn operator_kinds(&self) -> Vec<OperatorKind> {
        if self.operators.is_empty() {
            vec![OperatorKind::ElectricDipole; self.property.n_operators()]
        } else {
            self.operators.clone()
        }
    }

    pub fn frequencies(&self) -> Frequencies {
        Frequencies {
            incoming: self.frequencies.clone(),
            outgoing: self.omega_sigma,
        }
    }

    pub fn excluded(&self) -> Vec<(StateLabel, StateLabel)> {
        let state = |c: char| match c {
            '0' => StateLabel::Ground,
            'f' => F,
            c => StateLabel::Summed(c),
        };
        self.excluded_states
            .iter()
            .map(|(index, other)| (StateLabel::Summed(*index), state(*other)))
            .collect()
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            gamma: self.gamma,
            symmetric: self.symmetric,
            parallel: self.parallelization.use_parallelization,
            tolerance: self.degeneracy_tolerance,
            states: self.n_states.map(StateSet::lowest),
            excluded: self.excluded(),
            ground_state_terms: self.ground_state_terms,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct ParallelizationConfig {
    #[serde(default = "default_use_parallelization")]
    pub use_parallelization: bool,
    #[serde(default = "default_number_of_cores")]
    pub number_of_cores: usize,
}

impl Default for ParallelizationConfig {
    fn default() -> Self {
        Self {
            use_parallelization: default_use_parallelization(),
            number_of_cores: default_number_of_cores(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OutputConfig {
    /// Writes the real and imaginary part of the tensor to `<prefix>_real.npy` and
    /// `<prefix>_imag.npy`.
    #[serde(default = "default_write_npy")]
    pub write_npy: bool,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_npy: default_write_npy(),
            prefix: default_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::N;

    #[test]
    fn empty_input_gives_defaults() {
        let config: Configuration = toml::from_str("").unwrap();
        assert_eq!(config.property, ResponseFunction::Polarizability);
        assert_eq!(config.operator_kinds(), vec![OperatorKind::ElectricDipole; 2]);
        assert_eq!(config.strategy, Strategy::SumOverStates);
        assert_eq!(config.parallelization.number_of_cores, 1);
        assert!(config.final_state.is_none());
        assert!(!config.output.write_npy);
        assert!(config.ground_state_terms);
        // The defaults are written back to disk.
        let written: String = toml::to_string(&config).unwrap();
        let reread: Configuration = toml::from_str(&written).unwrap();
        assert_eq!(reread.property, config.property);
        assert_eq!(reread.degeneracy_tolerance, config.degeneracy_tolerance);
    }

    #[test]
    fn two_photon_input() {
        let input: &str = r#"
            property = "two_photon"
            operators = ["electric_dipole", "electric_dipole"]
            final_state = 2
            strategy = "response"
            excluded_states = [["n", "f"]]

            [parallelization]
            use_parallelization = true
            number_of_cores = 4
        "#;
        let config: Configuration = toml::from_str(input).unwrap();
        assert_eq!(config.property, ResponseFunction::TwoPhotonTransition);
        assert_eq!(config.final_state, Some(2));
        assert_eq!(config.strategy, Strategy::ResponseVectors);
        assert_eq!(config.excluded(), vec![(N, F)]);
        let options: DriverOptions = config.driver_options();
        assert!(options.parallel);
        assert_eq!(options.gamma, 0.0);
        assert!(config.frequencies().incoming.is_empty());
        assert!(options.ground_state_terms);
    }

    #[test]
    fn excited_state_polarizability_input() {
        let input: &str = r#"
            property = "excited_state_polarizability"
            frequencies = [0.1]
            final_state = 0
            ground_state_terms = false
        "#;
        let config: Configuration = toml::from_str(input).unwrap();
        assert_eq!(config.property, ResponseFunction::ExcitedStatePolarizability);
        assert_eq!(config.operator_kinds().len(), 2);
        assert!(!config.driver_options().ground_state_terms);
    }
}
