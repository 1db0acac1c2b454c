// number of Cartesian directions
pub const CARTESIAN_DIM: usize = 3;
// tolerance for the symmetry check of the model matrix
pub const SYMMETRY_TOLERANCE: f64 = 1.0e-10;
// file extension that selects the JSON reader, everything else is read as TOML
pub const JSON_EXTENSION: &str = "json";
