//! Dev driver configuration.

use std::path::Path;
use serde::Deserialize;
use crate::upload::{Result, UploadError};

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub token: String,
    pub file_path: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let config_str = std::fs::read_to_string(path)?;
        toml::from_str(&config_str).map_err(|err| {
            UploadError::ParamError(format!("Cannot parse {}: {}", path.display(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses() {
        let config: Config = toml::from_str(
            r#"
            endpoint = "https://api.example.com"
            token = "abc123"
            file_path = "A.mp4"
            "#,
        )
        .unwrap();

        assert!(config.endpoint.starts_with("http"));
        assert_eq!(config.title, None);
    }
}
