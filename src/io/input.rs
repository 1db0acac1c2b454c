use crate::defaults::CONFIG_FILE_NAME;
use crate::io::Configuration;
use anyhow::{Context, Result};
use responsefun_backend::ModelSystem;
use std::fs;
use std::path::Path;

pub fn read_input(model_file: &str) -> Result<(ModelSystem, Configuration)> {
    // The model system is the only mandatory file to start a calculation.
    let model: ModelSystem = ModelSystem::from_file(Path::new(model_file))
        .with_context(|| format!("Unable to read the model system from {}", model_file))?;

    // The configuration file is read, if it does not exist in the directory
    // the default settings are used and written to the directory.
    let config_file_path: &Path = Path::new(CONFIG_FILE_NAME);
    let config_string: String = if config_file_path.exists() {
        fs::read_to_string(config_file_path).context("Unable to read config file")?
    } else {
        String::new()
    };
    let config: Configuration =
        toml::from_str(&config_string).context("Unable to parse config file")?;
    // The configuration file is saved so that the user can see all the used options.
    if !config_file_path.exists() {
        let config_string: String = toml::to_string(&config)?;
        fs::write(config_file_path, config_string).context("Unable to write config file")?;
    }
    Ok((model, config))
}
