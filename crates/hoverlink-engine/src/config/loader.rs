use super::schema::HoverlinkConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const LOCAL_CONFIG: &str = "hoverlink.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Where [`Self::load_default`] looks, in order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".").join(LOCAL_CONFIG)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".hoverlink").join("config.yaml"));
        }
        paths
    }

    /// First existing file from [`Self::search_paths`], otherwise the defaults.
    pub async fn load_default() -> Result<HoverlinkConfig, ConfigError> {
        match Self::search_paths().into_iter().find(|path| path.exists()) {
            Some(path) => Self::load_from(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(HoverlinkConfig::default())
            }
        }
    }

    pub async fn load_from(path: &Path) -> Result<HoverlinkConfig, ConfigError> {
        debug!("Loading config from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parses and validates a YAML document. Missing sections and fields take defaults.
    pub fn parse(content: &str) -> Result<HoverlinkConfig, ConfigError> {
        let config: HoverlinkConfig = serde_yaml::from_str(content)?;
        config.session.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}
