//! Shared constants and defaults

pub const DEFAULT_CONFIG_PATH: &str = "access-manager.yaml";
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_EXIT_ON_EXPIRED: bool = true;
