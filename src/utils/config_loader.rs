use std::path::Path;
use anyhow::{anyhow, Result};
use tracing::debug;

use crate::config::proc_loader::{file_to_config, parse_config};
use crate::config::types::ManagerConfig;

/// Load the config file; a missing file means an all-defaults config.
pub fn run(config_path: &str) -> Result<ManagerConfig> {
    let path = Path::new(config_path);
    if !path.exists() {
        debug!(config = config_path, "config file absent, using defaults");
        return parse_config(String::new());
    }
    file_to_config(path).map_err(|e| anyhow!(format!("Invalid config format: {}", e)))
}
