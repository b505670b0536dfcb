use super::TunnelConfig;
use crate::error::TunnelError;
use std::path::PathBuf;
use tokio::fs;

/// Reads the YAML config file. Loading does not validate; see
/// [`super::ConfigValidator`].
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<TunnelConfig, TunnelError> {
        let content =
            fs::read_to_string(&self.path)
                .await
                .map_err(|source| TunnelError::ConfigRead {
                    path: self.path.clone(),
                    source,
                })?;

        let config = Self::parse(&content).map_err(|source| TunnelError::ConfigParse {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!("Loaded configuration from {}", self.path.display());
        Ok(config)
    }

    /// Parse YAML text; an empty document yields the defaults
    pub fn parse(content: &str) -> Result<TunnelConfig, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(TunnelConfig::default());
        }
        serde_yaml::from_str(content)
    }
}
