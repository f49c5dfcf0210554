use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::config::settings::SettingsConfig;

/// ================================
/// Full configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ManagerConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    /// where the Access Token is read from
    pub token: Option<TokenSource>,
}

/// Token value sources
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum TokenSource {
    Literal {
        value: String,
    },
    FromEnv {
        from_env: String,
    },
    FromFile {
        path: String,
    },
}

impl TokenSource {
    /// Read the current token, surrounding whitespace trimmed.
    pub async fn resolve(&self) -> Result<String> {
        let raw = match self {
            TokenSource::Literal { value } => value.to_owned(),
            TokenSource::FromEnv { from_env } => std::env::var(from_env)
                .map_err(|e| anyhow!("env var '{}' not available: {}", from_env, e))?,
            TokenSource::FromFile { path } => tokio::fs::read_to_string(Path::new(path))
                .await
                .map_err(|e| anyhow!("token file '{}' not readable: {}", path, e))?,
        };
        Ok(raw.trim().to_owned())
    }
}
