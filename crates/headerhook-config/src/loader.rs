//! Configuration loading

use crate::{Config, ConfigFormat};
use headerhook_core::{Error, Result};
use regex::Regex;
use std::env;
use std::fs;
use std::path::Path;

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Expand environment variables in configuration string
///
/// Supports `${VAR}` and `${VAR:-default}`. `$${` is kept as a literal `${`
/// so script code can still use string interpolation and `${name}` path
/// placeholders.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\$\{|\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

    let mut result = String::new();
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };

        let value = match cap.get(1) {
            None => "${".to_string(),
            Some(var_name) => {
                let var_name = var_name.as_str();
                let default_value = cap.get(3).map(|m| m.as_str());
                match env::var(var_name) {
                    Ok(val) => val,
                    Err(_) => match default_value {
                        Some(default) => default.to_string(),
                        None => {
                            return Err(Error::Config(format!(
                                "Environment variable '{var_name}' not set and no default provided"
                            )));
                        }
                    },
                }
            }
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    let expanded_content = expand_env_vars(content)?;

    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(config)
}

/// Load and validate configuration
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;

    crate::validator::validate_config(&config)?;

    tracing::debug!(
        locations = config.locations.len(),
        code_cache = config.code_cache,
        "Configuration loaded"
    );

    Ok(config)
}
