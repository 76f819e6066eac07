//! Gateway config loader (strict parsing + env overrides).

pub mod schema;

use std::fs;
use std::io::ErrorKind;

use signalroom_core::error::{Result, SignalError};

pub use schema::{GatewayConfig, GatewaySection, OriginSection, RateLimitSection};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SIGNALROOM_CONFIG";
/// Config file used when `SIGNALROOM_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "signalroom.yaml";

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| SignalError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| SignalError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve the config for the process: file (if any), then environment.
///
/// A missing default file means "all defaults"; a file named explicitly via
/// `SIGNALROOM_CONFIG` must exist.
pub fn load_from_env() -> Result<GatewayConfig> {
    let explicit = std::env::var(CONFIG_PATH_ENV).ok();
    let path = explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

    let mut cfg = match fs::read_to_string(path) {
        Ok(s) => load_from_str(&s)?,
        Err(e) if e.kind() == ErrorKind::NotFound && explicit.is_none() => {
            tracing::info!(path, "no config file, using defaults");
            GatewayConfig::default()
        }
        Err(e) => {
            return Err(SignalError::Internal(format!("read config failed ({path}): {e}")));
        }
    };

    cfg.apply_env(|k| std::env::var(k).ok());
    cfg.validate()?;
    Ok(cfg)
}
