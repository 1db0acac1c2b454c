use crate::errors::ConstructionError;
use responsefun_backend::defaults::CARTESIAN_DIM;
pub use responsefun_backend::{BackendError, OperatorComponent, OperatorKind, OperatorSymmetry};
use std::fmt;

/// A perturbation operator inside a symbolic expression. Every Cartesian index of the
/// operator carries an upper-case label; `A` refers to the first index of the resulting
/// tensor, `B` to the second and so on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operator {
    labels: Vec<char>,
    kind: OperatorKind,
}

impl Operator {
    pub fn new(kind: OperatorKind, labels: &str) -> Result<Self, ConstructionError> {
        let chars: Vec<char> = labels.chars().collect();
        if chars.len() != kind.rank() || chars.iter().any(|c| !c.is_ascii_uppercase()) {
            return Err(ConstructionError::InvalidOperatorLabels {
                labels: String::from(labels),
                rank: kind.rank(),
            });
        }
        Ok(Self {
            labels: chars,
            kind,
        })
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn labels(&self) -> &[char] {
        &self.labels
    }

    pub fn symmetry(&self) -> OperatorSymmetry {
        self.kind.symmetry()
    }

    /// Positions of the labels in the tensor (A -> 0, B -> 1, ...).
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.labels.iter().map(|c| (*c as u8 - b'A') as usize)
    }

    /// Selects the Cartesian component of the operator that belongs to a tensor element.
    pub fn component(&self, tensor_index: &[usize]) -> Result<OperatorComponent, BackendError> {
        let component: Vec<usize> = self
            .positions()
            .map(|p| tensor_index.get(p).copied().unwrap_or(CARTESIAN_DIM))
            .collect();
        OperatorComponent::new(self.kind, component)
    }

    pub fn latex(&self) -> String {
        let symbol: &str = match self.kind {
            OperatorKind::ElectricDipole => "\\hat{\\mu}",
            OperatorKind::MagneticDipole => "\\hat{m}",
            OperatorKind::ElectricQuadrupole => "\\hat{Q}",
        };
        format!("{}_{{{}}}", symbol, self.labels.iter().collect::<String>())
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.kind.symbol(),
            self.labels.iter().collect::<String>()
        )
    }
}

/// Assigns consecutive Cartesian labels to a list of operator kinds, e.g.
/// [quadrupole, dipole] -> [Q_AB, μ_C].
pub fn label_operators(kinds: &[OperatorKind]) -> Result<Vec<Operator>, ConstructionError> {
    let mut next: u8 = b'A';
    let mut operators: Vec<Operator> = Vec::with_capacity(kinds.len());
    for kind in kinds.iter() {
        let labels: String = (0..kind.rank())
            .map(|i| (next + i as u8) as char)
            .collect();
        next += kind.rank() as u8;
        operators.push(Operator::new(*kind, &labels)?);
    }
    Ok(operators)
}
