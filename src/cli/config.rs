// FILE: src/cli/config.rs

use crate::error::{Result, TemplateError};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub max_nesting_depth: Option<usize>,
    pub max_source_len: Option<usize>,
    pub pretty_output: Option<bool>,
    pub output_directory: Option<String>,
}

pub fn load(config_path: &str) -> Result<ConfigFile> {
    log::info!("Loaded configuration from {}", config_path);
    let config_content =
        fs::read_to_string(config_path).map_err(|e| TemplateError::FileNotFound {
            path: format!("Config file {}: {}", config_path, e),
        })?;

    if config_path.ends_with(".json") {
        serde_json::from_str(&config_content).map_err(|e| TemplateError::InvalidFormat {
            message: format!("Invalid JSON config: {}", e),
        })
    } else if config_path.ends_with(".toml") {
        toml::from_str(&config_content).map_err(|e| TemplateError::InvalidFormat {
            message: format!("Invalid TOML config: {}", e),
        })
    } else {
        Err(TemplateError::InvalidFormat {
            message: "Config file must be .json or .toml format".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_toml_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_nesting_depth = 8\npretty_output = true").unwrap();
        let config = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.max_nesting_depth, Some(8));
        assert_eq!(config.pretty_output, Some(true));
        assert_eq!(config.max_source_len, None);
    }

    #[test]
    fn test_load_json_config() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, "{{\"max_source_len\": 1024}}").unwrap();
        let config = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.max_source_len, Some(1024));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "pretty_output: true").unwrap();
        assert!(load(file.path().to_str().unwrap()).is_err());
    }
}
