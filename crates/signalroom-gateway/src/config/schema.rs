use serde::Deserialize;
use signalroom_core::error::{Result, SignalError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub origins: OriginSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            rate_limit: RateLimitSection::default(),
            origins: OriginSection::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(SignalError::UnsupportedVersion);
        }
        self.gateway.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }

    /// Apply environment overrides on top of file values.
    ///
    /// Invalid numeric values are ignored so a typo in the environment
    /// falls back to the file/default instead of refusing to boot.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("SIGNALROOM_LISTEN").map(|s| s.trim().to_string()) {
            if !listen.is_empty() {
                self.gateway.listen = listen;
            }
        }
        if let Some(secs) = lookup("RATE_LIMIT_WINDOW").and_then(|s| positive_int(&s)) {
            self.rate_limit.window_secs = secs;
        }
        if let Some(max) = lookup("RATE_LIMIT_MAX_REQUESTS").and_then(|s| positive_int(&s)) {
            self.rate_limit.max_requests = max as u32;
        }
        if let Some(raw) = lookup("ALLOWED_ORIGINS") {
            let allowed: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !allowed.is_empty() {
                self.origins.allowed = allowed;
            }
        }
        let env_var = |name: &str| lookup(name).map(|v| v.trim().to_ascii_lowercase());
        let app_env = env_var("APP_ENV");
        let go_env = env_var("GO_ENV");
        if matches!(app_env.as_deref(), Some("production" | "prod"))
            || go_env.as_deref() == Some("production")
        {
            self.origins.production = true;
        }
    }
}

fn positive_int(s: &str) -> Option<u64> {
    s.trim().parse::<u64>().ok().filter(|v| *v > 0 && *v <= u32::MAX as u64)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,

    #[serde(default = "default_write_wait_ms")]
    pub write_wait_ms: u64,

    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_hub_queue")]
    pub hub_queue: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_wait_ms: default_pong_wait_ms(),
            write_wait_ms: default_write_wait_ms(),
            max_message_bytes: default_max_message_bytes(),
            outbound_queue: default_outbound_queue(),
            hub_queue: default_hub_queue(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=120000).contains(&self.ping_interval_ms) {
            return Err(SignalError::BadRequest(
                "gateway.ping_interval_ms must be between 1000 and 120000".into(),
            ));
        }
        if !(2000..=600000).contains(&self.pong_wait_ms) {
            return Err(SignalError::BadRequest(
                "gateway.pong_wait_ms must be between 2000 and 600000".into(),
            ));
        }
        if self.pong_wait_ms <= self.ping_interval_ms {
            return Err(SignalError::BadRequest(
                "gateway.pong_wait_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if !(100..=60000).contains(&self.write_wait_ms) {
            return Err(SignalError::BadRequest(
                "gateway.write_wait_ms must be between 100 and 60000".into(),
            ));
        }
        if !(1024..=16 * 1024 * 1024).contains(&self.max_message_bytes) {
            return Err(SignalError::BadRequest(
                "gateway.max_message_bytes must be between 1KiB and 16MiB".into(),
            ));
        }
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(SignalError::BadRequest(
                "gateway.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        if !(1..=1_048_576).contains(&self.hub_queue) {
            return Err(SignalError::BadRequest(
                "gateway.hub_queue must be between 1 and 1048576".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    54000
}
fn default_pong_wait_ms() -> u64 {
    60000
}
fn default_write_wait_ms() -> u64 {
    10000
}
fn default_max_message_bytes() -> usize {
    1024 * 1024
}
fn default_outbound_queue() -> usize {
    256
}
fn default_hub_queue() -> usize {
    1024
}

/// Fixed-window handshake limiter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Key clients by `X-Forwarded-For`/`X-Real-IP` when present.
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,

    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            trust_forwarded_headers: true,
            max_tracked_clients: default_max_tracked_clients(),
        }
    }
}

impl RateLimitSection {
    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(SignalError::BadRequest(
                "rate_limit.window_secs must be positive".into(),
            ));
        }
        if self.max_requests == 0 {
            return Err(SignalError::BadRequest(
                "rate_limit.max_requests must be positive".into(),
            ));
        }
        if self.max_tracked_clients == 0 {
            return Err(SignalError::BadRequest(
                "rate_limit.max_tracked_clients must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_window_secs() -> u64 {
    60
}
fn default_max_requests() -> u32 {
    120
}
fn default_max_tracked_clients() -> usize {
    65536
}

/// Browser origin allow-list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OriginSection {
    /// Production mode: only listed origins are accepted.
    #[serde(default)]
    pub production: bool,

    #[serde(default)]
    pub allowed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |k| pairs.iter().find(|(n, _)| *n == k).map(|(_, v)| v.to_string())
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = GatewayConfig::default();
        cfg.apply_env(env(&[
            ("SIGNALROOM_LISTEN", "127.0.0.1:9000"),
            ("RATE_LIMIT_WINDOW", "30"),
            ("RATE_LIMIT_MAX_REQUESTS", "5"),
            ("ALLOWED_ORIGINS", " https://a.example , ,https://b.example"),
            ("APP_ENV", "Prod"),
        ]));
        assert_eq!(cfg.gateway.listen, "127.0.0.1:9000");
        assert_eq!(cfg.rate_limit.window_secs, 30);
        assert_eq!(cfg.rate_limit.max_requests, 5);
        assert_eq!(cfg.origins.allowed, vec!["https://a.example", "https://b.example"]);
        assert!(cfg.origins.production);
    }

    #[test]
    fn bad_env_numbers_fall_back() {
        let mut cfg = GatewayConfig::default();
        cfg.apply_env(env(&[("RATE_LIMIT_WINDOW", "-3"), ("RATE_LIMIT_MAX_REQUESTS", "lots")]));
        assert_eq!(cfg.rate_limit.window_secs, 60);
        assert_eq!(cfg.rate_limit.max_requests, 120);
        assert!(!cfg.origins.production);
    }

    #[test]
    fn go_env_only_accepts_full_production() {
        let mut cfg = GatewayConfig::default();
        cfg.apply_env(env(&[("GO_ENV", " Production ")]));
        assert!(cfg.origins.production);

        let mut cfg = GatewayConfig::default();
        cfg.apply_env(env(&[("GO_ENV", "prod"), ("APP_ENV", "staging")]));
        assert!(!cfg.origins.production);
    }

    #[test]
    fn defaults_validate() {
        assert!(GatewayConfig::default().validate().is_ok());
    }
}
