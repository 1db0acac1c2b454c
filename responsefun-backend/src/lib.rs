pub mod defaults;
pub mod interface;
pub mod model;

pub use interface::*;
pub use model::{ModelSystem, OperatorData};
