use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// VAPID credentials for the Web Push client.
#[derive(Debug, Deserialize)]
pub struct PushConfig {
    /// Base64url-encoded uncompressed P-256 public key (65 bytes decoded).
    pub vapid_public_key: String,
    /// Base64url-encoded raw P-256 private key (32 bytes decoded).
    pub vapid_private_key: String,
    /// Contact claim for the VAPID JWT, e.g. "mailto:ops@example.org".
    pub vapid_subject: String,
}

/// Admission gate policy: CORS, IP filtering and the rate-limit profile.
#[derive(Debug, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default = "default_cors_methods")]
    pub cors_allowed_methods: Vec<String>,
    /// IP patterns (exact or CIDR) that are always denied.
    #[serde(default)]
    pub ip_blacklist: Vec<String>,
    /// If non-empty, only matching IPs are admitted.
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_allowed_origins: default_cors_origins(),
            cors_allowed_methods: default_cors_methods(),
            ip_blacklist: Vec::new(),
            ip_whitelist: Vec::new(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Global bearer secret granting unscoped access to the notify endpoint.
    pub api_secret: String,
    /// Secret expected by the cron sweep endpoint. Falls back to `api_secret`.
    #[serde(default)]
    pub cron_secret: Option<String>,
    /// When set, inbound webhook bodies must carry a matching HMAC signature.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    pub push: PushConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl AppConfig {
    /// The secret accepted by `/api/cron/process-scheduled`.
    pub fn effective_cron_secret(&self) -> &str {
        self.cron_secret.as_deref().unwrap_or(&self.api_secret)
    }

    /// Webhook signature enforcement is on only when a non-empty secret is set.
    pub fn webhook_secret_enabled(&self) -> Option<&str> {
        self.webhook_secret.as_deref().filter(|s| !s.is_empty())
    }
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_rate_limit_max_requests() -> u32 {
    60
}

#[derive(Clone, Debug, Deserialize)]
pub struct IpNet {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix as u32)
                };
                (u32::from(a) & mask) == (u32::from(*b) & mask)
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let a_bytes = a.octets();
                let b_bytes = b.octets();
                let full_bytes = (self.prefix / 8) as usize;
                let rem_bits = self.prefix % 8;
                if full_bytes > 16 {
                    return false;
                }
                if a_bytes[..full_bytes] != b_bytes[..full_bytes] {
                    return false;
                }
                if rem_bits == 0 {
                    return true;
                }
                let mask = (!0u8) << (8 - rem_bits);
                (a_bytes[full_bytes] & mask) == (b_bytes[full_bytes] & mask)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNet {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| "CIDR must contain '/'".to_string())?;
        let addr = IpAddr::from_str(ip_part).map_err(|e| format!("Invalid IP: {e}"))?;
        let prefix: u8 = prefix_part
            .parse()
            .map_err(|e| format!("Invalid prefix: {e}"))?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix as u32 > max {
            return Err("Prefix out of range".into());
        }
        Ok(IpNet { addr, prefix })
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path
/// separated by double underscores (e.g. `SECURITY__RATE_LIMIT_MAX_REQUESTS`)
/// overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;

    if app.api_secret.len() < 32 {
        return Err(ConfigError::Validation(
            "api_secret must be at least 32 characters".into(),
        ));
    }
    if app.security.rate_limit_max_requests == 0 {
        return Err(ConfigError::Validation(
            "security.rate_limit_max_requests must be > 0".into(),
        ));
    }
    for pattern in app
        .security
        .ip_whitelist
        .iter()
        .chain(app.security.ip_blacklist.iter())
    {
        crate::security::ip_filter::IpPattern::from_str(pattern)
            .map_err(|e| ConfigError::Validation(format!("bad IP pattern '{pattern}': {e}")))?;
    }

    Ok(app)
}

/// Convenience helper for binaries wanting the old panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
