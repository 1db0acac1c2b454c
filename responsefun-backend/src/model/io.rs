use crate::defaults::JSON_EXTENSION;
use crate::interface::{BackendError, OperatorKind};
use crate::model::{ModelSystem, OperatorData};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

fn default_name() -> String {
    String::from("model")
}

/// Layout of a model-system file (TOML or JSON).
///
/// ```toml
/// name = "two-level"
/// matrix = [[0.5]]
///
/// [[operators]]
/// kind = "electric_dipole"
/// transition = [[0.0, 0.0, 1.0]]
/// ```
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelInput {
    #[serde(default = "default_name")]
    pub name: String,
    /// ADC matrix in the space of intermediate states.
    pub matrix: Vec<Vec<f64>>,
    #[serde(default)]
    pub operators: Vec<OperatorInput>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OperatorInput {
    pub kind: OperatorKind,
    /// <0|op|0> per component; zero if omitted.
    #[serde(default)]
    pub ground_state: Vec<f64>,
    /// Modified transition moments, one row per intermediate state.
    pub transition: Vec<Vec<f64>>,
    /// State-to-state matrices per component; zero if omitted.
    #[serde(default)]
    pub b_matrices: Vec<Vec<Vec<f64>>>,
}

fn to_array2(rows: &[Vec<f64>], shape: (usize, usize), what: &str) -> Result<Array2<f64>, BackendError> {
    let data: Vec<f64> = rows.iter().flatten().copied().collect();
    if rows.iter().any(|row| row.len() != shape.1) {
        return Err(BackendError::Shape(format!(
            "every row of {} needs {} entries",
            what, shape.1
        )));
    }
    Array2::from_shape_vec(shape, data)
        .map_err(|err| BackendError::Shape(format!("{}: {}", what, err)))
}

impl OperatorInput {
    fn into_data(self, dim: usize) -> Result<OperatorData, BackendError> {
        let n_comp: usize = self.kind.n_components();
        let transition: Array2<f64> =
            to_array2(&self.transition, (dim, n_comp), "transition moments")?;
        let mut data: OperatorData = OperatorData::from_transition(self.kind, transition);
        if !self.ground_state.is_empty() {
            data.ground_state = Array1::from(self.ground_state);
        }
        if !self.b_matrices.is_empty() {
            if self.b_matrices.len() != n_comp {
                return Err(BackendError::Shape(format!(
                    "{} B matrices are required for the {} operator",
                    n_comp, self.kind
                )));
            }
            for (mut b, rows) in data
                .b_matrices
                .axis_iter_mut(Axis(0))
                .zip(self.b_matrices.iter())
            {
                b.assign(&to_array2(rows, (dim, dim), "B matrix")?);
            }
        }
        Ok(data)
    }
}

impl TryFrom<ModelInput> for ModelSystem {
    type Error = BackendError;

    fn try_from(input: ModelInput) -> Result<Self, Self::Error> {
        let dim: usize = input.matrix.len();
        let matrix: Array2<f64> = to_array2(&input.matrix, (dim, dim), "ADC matrix")?;
        let operators: Vec<OperatorData> = input
            .operators
            .into_iter()
            .map(|op| op.into_data(dim))
            .collect::<Result<Vec<OperatorData>, BackendError>>()?;
        ModelSystem::new(&input.name, matrix, operators)
    }
}

impl ModelSystem {
    pub fn from_toml_str(input: &str) -> Result<Self, BackendError> {
        let model: ModelInput =
            toml::from_str(input).map_err(|err| BackendError::Parse(err.to_string()))?;
        ModelSystem::try_from(model)
    }

    pub fn from_json_str(input: &str) -> Result<Self, BackendError> {
        let model: ModelInput =
            serde_json::from_str(input).map_err(|err| BackendError::Parse(err.to_string()))?;
        ModelSystem::try_from(model)
    }

    /// Reads a model system; files ending in `.json` are parsed as JSON, all others as TOML.
    pub fn from_file(path: &Path) -> Result<Self, BackendError> {
        let content: String = fs::read_to_string(path)
            .map_err(|err| BackendError::Parse(format!("{}: {}", path.display(), err)))?;
        if path.extension() == Some(OsStr::new(JSON_EXTENSION)) {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }
}
