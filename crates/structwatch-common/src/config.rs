//! Configuration for StructWatch

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides, e.g. `STRUCTWATCH__DATABASE__URL`
pub const ENV_PREFIX: &str = "STRUCTWATCH";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote data API configuration
    #[serde(default)]
    pub esi: EsiConfig,

    /// Webhook delivery configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Alert generation and forwarding configuration
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Sync freshness configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Periodic job configuration
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Entity name cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Remote data API (ESI) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiConfig {
    /// Base URL, without trailing slash
    #[serde(default = "default_esi_base_url")]
    pub base_url: String,

    /// Datasource query argument sent with every request
    #[serde(default = "default_datasource")]
    pub datasource: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of retries on transient errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the quadratic retry backoff in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Languages to fetch localized data in
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// User agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// SSO settings for refreshing access tokens
    #[serde(default)]
    pub sso: SsoConfig,
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            base_url: default_esi_base_url(),
            datasource: default_datasource(),
            timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            languages: default_languages(),
            user_agent: default_user_agent(),
            sso: SsoConfig::default(),
        }
    }
}

impl EsiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn default_esi_base_url() -> String {
    "https://esi.evetech.net/latest".to_string()
}

fn default_datasource() -> String {
    "tranquility".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_user_agent() -> String {
    concat!("structwatch/", env!("CARGO_PKG_VERSION")).to_string()
}

/// SSO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Application client ID
    #[serde(default)]
    pub client_id: String,

    /// Application client secret
    #[serde(default)]
    pub client_secret: String,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

fn default_token_url() -> String {
    "https://login.eveonline.com/v2/oauth/token".to_string()
}

/// Webhook delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Delay between two sends to the same destination in milliseconds
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,

    /// How often a rate limited message is retried before it counts as failed
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Wait used when a 429 response carries no retry hint, in milliseconds
    #[serde(default = "default_retry_after_ms")]
    pub default_retry_after_ms: u64,

    /// Longest wait honored from a 429 response, in milliseconds
    #[serde(default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Set a custom username and avatar on every message
    #[serde(default)]
    pub set_avatar: bool,

    /// Username used when `set_avatar` is enabled
    #[serde(default = "default_username")]
    pub username: String,

    /// Avatar URL used when `set_avatar` is enabled
    pub avatar_url: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            default_retry_after_ms: default_retry_after_ms(),
            max_retry_after_ms: default_max_retry_after_ms(),
            request_timeout_secs: default_request_timeout(),
            set_avatar: false,
            username: default_username(),
            avatar_url: None,
        }
    }
}

impl DeliveryConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_millis(self.default_retry_after_ms)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_millis(self.max_retry_after_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_send_delay_ms() -> u64 {
    2000
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

fn default_retry_after_ms() -> u64 {
    1000
}

fn default_max_retry_after_ms() -> u64 {
    60_000
}

fn default_username() -> String {
    "Notifications".to_string()
}

/// Alert generation and forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Alerts older than this are never forwarded
    #[serde(default = "default_hours_until_stale")]
    pub hours_until_stale: i64,

    /// Forward attacks by NPC corporations
    #[serde(default = "default_true")]
    pub report_npc_attacks: bool,

    /// Send a generated alert when a structure has been refueled
    #[serde(default = "default_true")]
    pub refueled_notifications: bool,

    /// Footer text of generated alerts
    #[serde(default = "default_app_title")]
    pub app_title: String,

    /// Hand reinforcement and extraction timers to the timer sink
    #[serde(default = "default_true")]
    pub add_timers: bool,

    /// Also add timers for moon mining extractions
    #[serde(default = "default_true")]
    pub moon_extraction_timers: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            hours_until_stale: default_hours_until_stale(),
            report_npc_attacks: true,
            refueled_notifications: true,
            app_title: default_app_title(),
            add_timers: true,
            moon_extraction_timers: true,
        }
    }
}

fn default_hours_until_stale() -> i64 {
    24
}

fn default_true() -> bool {
    true
}

fn default_app_title() -> String {
    "StructWatch".to_string()
}

/// Grace periods after which a subsystem's last sync counts as stale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_structures_grace")]
    pub structures_grace_minutes: i64,

    #[serde(default = "default_notifications_grace")]
    pub notifications_grace_minutes: i64,

    #[serde(default = "default_forwarding_grace")]
    pub forwarding_grace_minutes: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            structures_grace_minutes: default_structures_grace(),
            notifications_grace_minutes: default_notifications_grace(),
            forwarding_grace_minutes: default_forwarding_grace(),
        }
    }
}

fn default_structures_grace() -> i64 {
    120
}

fn default_notifications_grace() -> i64 {
    15
}

fn default_forwarding_grace() -> i64 {
    5
}

/// Periodic job intervals in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_structures_interval")]
    pub structures_interval_secs: u64,

    #[serde(default = "default_notifications_interval")]
    pub notifications_interval_secs: u64,

    #[serde(default = "default_forwarding_interval")]
    pub forwarding_interval_secs: u64,

    #[serde(default = "default_fuel_alerts_interval")]
    pub fuel_alerts_interval_secs: u64,

    #[serde(default = "default_delivery_interval")]
    pub delivery_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            structures_interval_secs: default_structures_interval(),
            notifications_interval_secs: default_notifications_interval(),
            forwarding_interval_secs: default_forwarding_interval(),
            fuel_alerts_interval_secs: default_fuel_alerts_interval(),
            delivery_interval_secs: default_delivery_interval(),
        }
    }
}

fn default_structures_interval() -> u64 {
    1800
}

fn default_notifications_interval() -> u64 {
    300
}

fn default_forwarding_interval() -> u64 {
    60
}

fn default_fuel_alerts_interval() -> u64 {
    300
}

fn default_delivery_interval() -> u64 {
    30
}

/// Entity name cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached names
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,

    /// Time to live of a cached name in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_max_entries() -> u64 {
    10_000
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from a file, layering environment overrides on top
    pub fn from_file_with_env(path: &Path) -> crate::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("esi.languages")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/structwatch/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file_with_env(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let esi = EsiConfig::default();
        assert_eq!(esi.max_retries, 3);
        assert_eq!(esi.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(esi.languages, vec!["en".to_string()]);

        let delivery = DeliveryConfig::default();
        assert_eq!(delivery.send_delay(), Duration::from_secs(2));
        assert_eq!(delivery.max_rate_limit_retries, 3);

        let sync = SyncConfig::default();
        assert_eq!(sync.structures_grace_minutes, 120);
        assert_eq!(sync.notifications_grace_minutes, 15);
        assert_eq!(sync.forwarding_grace_minutes, 5);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "postgres://localhost/structwatch"

[esi]
max_retries = 5
languages = ["en", "de"]

[delivery]
send_delay_ms = 500

[alerts]
report_npc_attacks = false
moon_extraction_timers = false
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/structwatch");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.acquire_timeout(), Duration::from_secs(30));
        assert_eq!(config.esi.max_retries, 5);
        assert_eq!(config.esi.languages, vec!["en", "de"]);
        assert_eq!(config.delivery.send_delay_ms, 500);
        assert!(!config.alerts.report_npc_attacks);
        assert_eq!(config.alerts.hours_until_stale, 24);
        assert!(config.alerts.add_timers);
        assert!(!config.alerts.moon_extraction_timers);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"postgres://db/structwatch\"\n\n[jobs]\nforwarding_interval_secs = 10"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.url, "postgres://db/structwatch");
        assert_eq!(config.jobs.forwarding_interval_secs, 10);

        let layered = Config::from_file_with_env(file.path()).unwrap();
        assert_eq!(layered.jobs.forwarding_interval_secs, 10);
        assert_eq!(layered.cache.max_entries, 10_000);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file(Path::new("/nonexistent/structwatch.toml")).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
