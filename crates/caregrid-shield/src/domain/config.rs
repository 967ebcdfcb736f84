//! Shield configuration with validation.
//!
//! A [`SecurityProfile`] is an immutable bundle of thresholds and toggles
//! selected once at process startup, normally through the
//! `CAREGRID_SECURITY_PROFILE` environment variable. The surrounding
//! [`ShieldConfig`] adds the exemption tables, server binding, and
//! housekeeping knobs.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the active profile
pub const PROFILE_ENV: &str = "CAREGRID_SECURITY_PROFILE";
/// Environment variable carrying comma-separated whitelisted IPs
pub const WHITELIST_ENV: &str = "CAREGRID_IP_WHITELIST";

/// Top-level shield configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Active threshold profile
    pub profile: SecurityProfile,
    /// Exemption tables (paths, IPs, client signatures)
    pub exemptions: ExemptionConfig,
    /// HTTP server binding
    pub server: ServerConfig,
    /// How often the background task prunes idle per-identity state
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            profile: SecurityProfile::default(),
            exemptions: ExemptionConfig::default(),
            server: ServerConfig::default(),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl ShieldConfig {
    /// Build a config from the environment: profile name from
    /// `CAREGRID_SECURITY_PROFILE`, whitelist from `CAREGRID_IP_WHITELIST`.
    /// Unset variables fall back to defaults; unknown values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = std::env::var(PROFILE_ENV).ok();
        let whitelist = std::env::var(WHITELIST_ENV).ok();
        Self::from_env_values(profile.as_deref(), whitelist.as_deref())
    }

    /// Environment parsing, separated for tests
    pub fn from_env_values(
        profile: Option<&str>,
        whitelist: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = profile {
            let name: ProfileName = name.parse()?;
            config.profile = SecurityProfile::named(name);
        }
        if let Some(list) = whitelist {
            config.exemptions.whitelist = parse_ip_list(list)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.profile.validate()?;

        if self.cleanup_interval.as_millis() == 0 {
            return Err(ConfigError::InvalidDuration(
                "cleanup_interval cannot be 0".into(),
            ));
        }

        if self.exemptions.login_path.is_empty() {
            return Err(ConfigError::Invalid("login_path cannot be empty".into()));
        }

        if self.exemptions.api_prefix.is_empty() {
            return Err(ConfigError::Invalid("api_prefix cannot be empty".into()));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

/// Named threshold presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    Development,
    Lenient,
    Moderate,
    Strict,
}

impl ProfileName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileName::Development => "development",
            ProfileName::Lenient => "lenient",
            ProfileName::Moderate => "moderate",
            ProfileName::Strict => "strict",
        }
    }
}

impl FromStr for ProfileName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(ProfileName::Development),
            "lenient" => Ok(ProfileName::Lenient),
            "moderate" => Ok(ProfileName::Moderate),
            "strict" => Ok(ProfileName::Strict),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// Immutable bundle of detection thresholds and feature toggles.
///
/// Loaded once; read-only for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityProfile {
    /// Which preset this profile started from
    pub name: ProfileName,
    /// Max requests per identity inside any rolling 1-second window
    pub requests_per_second: u32,
    /// Max requests per identity inside any rolling 60-second window
    pub requests_per_minute: u32,
    /// Max requests per (identity, path) inside `endpoint_window`
    pub endpoint_limit: u32,
    /// Reset window for the per-endpoint counter
    #[serde(with = "humantime_serde")]
    pub endpoint_window: Duration,
    /// How long a flood/hammering block stays authoritative
    #[serde(with = "humantime_serde")]
    pub ddos_block_duration: Duration,
    /// Login attempts tolerated inside `brute_force_window`
    pub brute_force_attempts: u32,
    /// Detection window for login attempts
    #[serde(with = "humantime_serde")]
    pub brute_force_window: Duration,
    /// How long a login block stays authoritative
    #[serde(with = "humantime_serde")]
    pub brute_force_block_duration: Duration,
    /// Injection detections before the identity is fully blocked for 24h
    pub sql_block_attempts: u32,
    /// Max declared request body size on write methods
    pub max_request_bytes: u64,
    /// Enable flood/sustained/hammering detection
    pub enable_ddos: bool,
    /// Enable login brute-force detection
    pub enable_brute_force: bool,
    /// Enable SQL injection inspection
    pub enable_sql: bool,
    /// Enable cross-site scripting inspection
    pub enable_xss: bool,
    /// Enable path traversal inspection
    pub enable_path_traversal: bool,
    /// Enable API credential presence checks
    pub enable_api_key: bool,
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self::moderate()
    }
}

impl SecurityProfile {
    /// Look up a preset by name
    pub fn named(name: ProfileName) -> Self {
        match name {
            ProfileName::Development => Self::development(),
            ProfileName::Lenient => Self::lenient(),
            ProfileName::Moderate => Self::moderate(),
            ProfileName::Strict => Self::strict(),
        }
    }

    /// Local development: generous thresholds, enforcement off
    pub fn development() -> Self {
        Self {
            name: ProfileName::Development,
            requests_per_second: 100,
            requests_per_minute: 2000,
            endpoint_limit: 1000,
            endpoint_window: Duration::from_secs(60),
            ddos_block_duration: Duration::from_secs(60),
            brute_force_attempts: 20,
            brute_force_window: Duration::from_secs(300),
            brute_force_block_duration: Duration::from_secs(60),
            sql_block_attempts: 100,
            max_request_bytes: 50 * 1024 * 1024,
            enable_ddos: false,
            enable_brute_force: false,
            enable_sql: false,
            enable_xss: false,
            enable_path_traversal: false,
            enable_api_key: false,
        }
    }

    /// Staging and low-risk tenants
    pub fn lenient() -> Self {
        Self {
            name: ProfileName::Lenient,
            requests_per_second: 50,
            requests_per_minute: 600,
            endpoint_limit: 300,
            endpoint_window: Duration::from_secs(60),
            ddos_block_duration: Duration::from_secs(300),
            brute_force_attempts: 10,
            brute_force_window: Duration::from_secs(300),
            brute_force_block_duration: Duration::from_secs(900),
            sql_block_attempts: 10,
            max_request_bytes: 25 * 1024 * 1024,
            enable_ddos: true,
            enable_brute_force: true,
            enable_sql: true,
            enable_xss: true,
            enable_path_traversal: true,
            enable_api_key: false,
        }
    }

    /// Production default
    pub fn moderate() -> Self {
        Self {
            name: ProfileName::Moderate,
            requests_per_second: 20,
            requests_per_minute: 300,
            endpoint_limit: 100,
            endpoint_window: Duration::from_secs(60),
            ddos_block_duration: Duration::from_secs(1800),
            brute_force_attempts: 5,
            brute_force_window: Duration::from_secs(300),
            brute_force_block_duration: Duration::from_secs(3600),
            sql_block_attempts: 5,
            max_request_bytes: 10 * 1024 * 1024,
            enable_ddos: true,
            enable_brute_force: true,
            enable_sql: true,
            enable_xss: true,
            enable_path_traversal: true,
            enable_api_key: false,
        }
    }

    /// High-exposure tenants and regulated environments
    pub fn strict() -> Self {
        Self {
            name: ProfileName::Strict,
            requests_per_second: 10,
            requests_per_minute: 120,
            endpoint_limit: 50,
            endpoint_window: Duration::from_secs(60),
            ddos_block_duration: Duration::from_secs(3600),
            brute_force_attempts: 3,
            brute_force_window: Duration::from_secs(600),
            brute_force_block_duration: Duration::from_secs(7200),
            sql_block_attempts: 3,
            max_request_bytes: 5 * 1024 * 1024,
            enable_ddos: true,
            enable_brute_force: true,
            enable_sql: true,
            enable_xss: true,
            enable_path_traversal: true,
            enable_api_key: true,
        }
    }

    /// Validate threshold sanity
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_second == 0 {
            return Err(ConfigError::InvalidThreshold(
                "requests_per_second cannot be 0".into(),
            ));
        }

        if self.requests_per_minute < self.requests_per_second {
            return Err(ConfigError::InvalidThreshold(
                "requests_per_minute cannot be below requests_per_second".into(),
            ));
        }

        if self.endpoint_limit == 0 {
            return Err(ConfigError::InvalidThreshold(
                "endpoint_limit cannot be 0".into(),
            ));
        }

        if self.brute_force_attempts == 0 {
            return Err(ConfigError::InvalidThreshold(
                "brute_force_attempts cannot be 0".into(),
            ));
        }

        if self.sql_block_attempts == 0 {
            return Err(ConfigError::InvalidThreshold(
                "sql_block_attempts cannot be 0".into(),
            ));
        }

        if self.max_request_bytes == 0 {
            return Err(ConfigError::InvalidThreshold(
                "max_request_bytes cannot be 0".into(),
            ));
        }

        for (field, duration) in [
            ("endpoint_window", self.endpoint_window),
            ("ddos_block_duration", self.ddos_block_duration),
            ("brute_force_window", self.brute_force_window),
            ("brute_force_block_duration", self.brute_force_block_duration),
        ] {
            if duration.as_millis() == 0 {
                return Err(ConfigError::InvalidDuration(format!(
                    "{} cannot be 0",
                    field
                )));
            }
        }

        Ok(())
    }
}

/// Exemption tables: path prefixes per category, whitelisted IPs,
/// trusted client signatures, and the special paths the guards key on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExemptionConfig {
    /// Static asset prefixes (the only category the DDoS family honors)
    pub static_paths: Vec<String>,
    /// Auth endpoints exempt from inspection (never the login path itself)
    pub auth_paths: Vec<String>,
    /// Admin UI prefixes
    pub admin_paths: Vec<String>,
    /// Liveness/readiness endpoints
    pub health_paths: Vec<String>,
    /// API documentation endpoints
    pub api_docs_paths: Vec<String>,
    /// IPs that bypass every guard
    pub whitelist: Vec<IpAddr>,
    /// User-Agent substrings treated as trusted clients
    pub trusted_agents: Vec<String>,
    /// Path watched by the brute-force guard
    pub login_path: String,
    /// Versioned API prefix gated by the credential check
    pub api_prefix: String,
    /// Session cookie accepted in place of an API key
    pub session_cookie: String,
}

impl Default for ExemptionConfig {
    fn default() -> Self {
        Self {
            static_paths: vec![
                "/static/".to_string(),
                "/media/".to_string(),
                "/favicon.ico".to_string(),
            ],
            auth_paths: vec![
                "/api/v1/auth/token/refresh".to_string(),
                "/api/v1/auth/logout".to_string(),
            ],
            admin_paths: vec!["/admin/".to_string()],
            health_paths: vec!["/health".to_string(), "/ready".to_string()],
            api_docs_paths: vec!["/api/docs".to_string(), "/api/schema".to_string()],
            whitelist: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            trusted_agents: vec![
                "Mozilla/".to_string(),
                "PostmanRuntime/".to_string(),
                "insomnia/".to_string(),
                "curl/".to_string(),
                "HTTPie/".to_string(),
            ],
            login_path: "/api/v1/auth/login".to_string(),
            api_prefix: "/api/v1/".to_string(),
            session_cookie: "sessionid".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8600)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8600,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Profile name not in the preset set
    #[error("unknown security profile: {0}")]
    UnknownProfile(String),
    /// Threshold outside its valid range
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),
    /// Zero or unparseable duration
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    /// Unparseable whitelist entry
    #[error("invalid whitelist ip: {0}")]
    InvalidWhitelistIp(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_ip_list(list: &str) -> Result<Vec<IpAddr>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidWhitelistIp(s.to_string()))
        })
        .collect()
}

/// Humantime serde module for Duration serialization
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .trim()
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(|_| "invalid hours")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

}
