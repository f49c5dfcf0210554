//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - logging level / reload interval / token source invariants

use tracing::{error, info};

use crate::config::settings::SettingsConfig;
use crate::config::types::{ManagerConfig, TokenSource};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_config(cfg: &ManagerConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    if let Some(token) = &cfg.token {
        validate_token_source(token, &mut errors);
    }

    if errors.is_empty() {
        info!("config validation passed");
        Ok(())
    } else {
        for e in &errors {
            error!("config validation: {}", e);
        }
        Err(errors)
    }
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.reload_interval_seconds == Some(0) {
        errors.push("settings.reload_interval_seconds must be > 0".to_string());
    }

    if let Some(logging) = &settings.logging {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' is not one of {:?}",
                logging.level, LOG_LEVELS
            ));
        }
    }
}

fn validate_token_source(token: &TokenSource, errors: &mut Vec<String>) {
    match token {
        TokenSource::Literal { value } if value.trim().is_empty() => {
            errors.push("token.value must not be empty".to_string());
        }
        TokenSource::FromEnv { from_env } if from_env.trim().is_empty() => {
            errors.push("token.from_env must name an environment variable".to_string());
        }
        TokenSource::FromFile { path } if path.trim().is_empty() => {
            errors.push("token.path must not be empty".to_string());
        }
        _ => {}
    }
}
