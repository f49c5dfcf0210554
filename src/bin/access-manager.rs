use std::time::Duration;

use access_manager::config::types::{ManagerConfig, TokenSource};
use access_manager::manager::{EventKind, TokenManager};
use access_manager::observability::metrics;
use access_manager::utils::config_loader;
use access_manager::utils::constants::{DEFAULT_CONFIG_PATH, DEFAULT_EXIT_ON_EXPIRED, DEFAULT_RELOAD_INTERVAL_SECS};
use access_manager::utils::logging;
use access_manager::utils::logging::LogLevel;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    #[arg(long, env = "LOG_LEVEL" , value_enum)]
    log_level: Option<LogLevel>,
    /// Print prometheus metrics to stdout before exiting
    #[arg(long)]
    print_metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a token and print the identity and expiration derived from it
    Inspect {
        #[arg(short, long, env = "ACCESS_TOKEN")]
        token: Option<String>,
    },
    /// Track a token until it expires, picking up changes of the configured token source
    Watch {
        #[arg(short, long, env = "ACCESS_TOKEN")]
        token: Option<String>,
    },
}

// events fire on a later turn than the call, after `watch` subscribed
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let config = config_loader::run(&args.config)?;
    logging::run(&config, args.log_level.to_owned());

    // -------------------------------
    // 2. Run command
    // -------------------------------

    match &args.command {
        Command::Inspect { token } => inspect(&config, token.as_deref()).await?,
        Command::Watch { token } => watch(&config, token.as_deref()).await?,
    }

    // -------------------------------
    // 3. Metrics
    // -------------------------------

    if args.print_metrics {
        print!("{}", metrics::gather_text()?);
    }

    Ok(())
}

/// A token given on the command line wins over the configured source.
fn token_source(config: &ManagerConfig, arg_token: Option<&str>) -> Result<TokenSource> {
    arg_token
        .map(|value| TokenSource::Literal { value: value.to_owned() })
        .or_else(|| config.token.clone())
        .ok_or_else(|| anyhow!("no token: pass --token or configure a `token` source"))
}

async fn inspect(config: &ManagerConfig, arg_token: Option<&str>) -> Result<()> {
    let token = token_source(config, arg_token)?.resolve().await?;

    let manager = TokenManager::new(token.clone());
    // construction only reports failures to listeners; update again to get the error
    let snapshot = manager.update_token(token).await?.snapshot();

    let report = json!({
        "identity": snapshot.identity,
        "expires": snapshot.expires.map(|at| at.to_rfc3339()),
        "is_expired": snapshot.is_expired,
        "payload": snapshot.token_payload,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn watch(config: &ManagerConfig, arg_token: Option<&str>) -> Result<()> {
    let source = token_source(config, arg_token)?;
    let reload_interval = config.settings.reload_interval_seconds.unwrap_or(DEFAULT_RELOAD_INTERVAL_SECS);
    let exit_on_expired = config.settings.exit_on_expired.unwrap_or(DEFAULT_EXIT_ON_EXPIRED);

    let mut current = source.resolve().await?;
    let manager = TokenManager::new(current.clone());

    manager.on_token_updated(|m| {
        info!(
            identity = m.identity().as_deref().unwrap_or(""),
            expires = ?m.expires(),
            is_expired = m.is_expired(),
            "tokenUpdated"
        );
    });
    manager.on_error(|e| error!(reason = e.reason(), error = %e, "token error"));
    let (_, mut expired) = manager.listen(EventKind::TokenExpired);

    // a literal token never changes, nothing to reload
    let reloadable = !matches!(source, TokenSource::Literal { .. });
    let mut reload = tokio::time::interval(Duration::from_secs(reload_interval));
    reload.tick().await;

    info!(reloadable, reload_interval, exit_on_expired, "watching token");
    loop {
        tokio::select! {
            event = expired.recv() => match event {
                Ok(_) => {
                    warn!(identity = manager.identity().as_deref().unwrap_or(""), "tokenExpired");
                    if exit_on_expired {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "expiration events lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = reload.tick(), if reloadable => {
                reload_token(&source, &manager, &mut current).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    Ok(())
}

async fn reload_token(source: &TokenSource, manager: &TokenManager, current: &mut String) {
    match source.resolve().await {
        Ok(next) if next == *current => debug!("token unchanged"),
        Ok(next) => {
            *current = next.clone();
            // failures are also reported to the `error` listener
            if let Err(e) = manager.update_token(next).await {
                debug!(error = %e, "reloaded token rejected");
            }
        }
        Err(e) => warn!(error = %e, "token source not readable"),
    }
}
