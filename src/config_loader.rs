use crate::config::LabConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load, parse and validate a lab description from a YAML file
pub fn load_config(config_path: &Path) -> Result<LabConfig> {
    info!("Loading lab description from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open '{}'", config_path.display()))?;

    let config: LabConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse '{}'", config_path.display()))?;

    config.validate()?;

    info!(
        "Lab '{}': {} device(s), {} link(s)",
        config.general.name,
        config.devices.len(),
        config.links.len()
    );
    Ok(config)
}
