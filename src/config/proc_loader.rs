use std::{fs, path::Path};
use crate::config::proc_validator;
use crate::config::settings::LoggingConfig;
use crate::config::types::ManagerConfig;
use crate::utils::constants::{DEFAULT_EXIT_ON_EXPIRED, DEFAULT_RELOAD_INTERVAL_SECS};
use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, error};

/// Load and validate config from YAML file
pub fn file_to_config(path: &Path) -> Result<ManagerConfig> {
    let content = fs::read_to_string(path)?;

    let expanded = expand_env_vars(&content);
    parse_config(expanded)
}

pub fn parse_config(content: String) -> Result<ManagerConfig> {
    let mut config: ManagerConfig = serde_yaml::from_str::<Option<ManagerConfig>>(&content)
        .inspect_err(|e| {
            error!("parse config error: {}", e);
        })?
        // an empty document is an empty config
        .unwrap_or_default();

    apply_defaults(&mut config);
    debug!("validation config ...");
    proc_validator::validate_config(&config)
        .map_err(|errors| anyhow!("config validation failed: {}", errors.join("; ")))?;

    Ok(config)
}

pub fn apply_defaults(config: &mut ManagerConfig) {
    let settings = &mut config.settings;
    if settings.logging.is_none() {
        settings.logging = Some(LoggingConfig::default());
    }
    if settings.reload_interval_seconds.is_none() {
        settings.reload_interval_seconds = Some(DEFAULT_RELOAD_INTERVAL_SECS);
    }
    if settings.exit_on_expired.is_none() {
        settings.exit_on_expired = Some(DEFAULT_EXIT_ON_EXPIRED);
    }
}

/// Replace `${VAR}` and `${VAR:default}` with environment values.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}
