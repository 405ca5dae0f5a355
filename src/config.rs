use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Honor `X-Forwarded-For` / `X-Real-IP` when deriving visitor identity.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_proxy_headers: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("visitors.db")
}

fn default_pool_size() -> usize {
    8
}

/// Longest trailing window, in hours, for recent-visitor stats. One year.
pub const MAX_WINDOW_HOURS: u64 = 24 * 365;

#[derive(Debug, Deserialize, Clone)]
pub struct CounterConfig {
    #[serde(default = "default_recent_window_hours")]
    pub recent_window_hours: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            recent_window_hours: default_recent_window_hours(),
        }
    }
}

fn default_recent_window_hours() -> u64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_per_second")]
    pub per_second: u64,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            per_second: default_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}
fn default_per_second() -> u64 {
    10
}
fn default_burst_size() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl AppConfig {
    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }
        if self.storage.backend == StorageBackend::Sqlite {
            if self.storage.path.as_os_str().is_empty() {
                return Err("storage.path must be set when storage.backend = \"sqlite\". \
                     Set it in config.toml or via COUNTER__STORAGE__PATH env var."
                    .to_string());
            }
            if self.storage.pool_size == 0 {
                return Err("storage.pool_size must be at least 1".to_string());
            }
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.counter.recent_window_hours) {
            return Err(format!(
                "counter.recent_window_hours must be between 1 and {MAX_WINDOW_HOURS}"
            ));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.per_second == 0 || self.rate_limit.burst_size == 0)
        {
            return Err(
                "rate_limit.per_second and rate_limit.burst_size must be non-zero \
                 when rate limiting is enabled"
                    .to_string(),
            );
        }
        if self.cors.allowed_origins.is_empty() {
            return Err("cors.allowed_origins must list at least one origin or \"*\"".to_string());
        }
        for origin in &self.cors.allowed_origins {
            if origin != "*" && origin.parse::<axum::http::HeaderValue>().is_err() {
                return Err(format!("cors.allowed_origins: invalid origin {origin:?}"));
            }
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // Load from config file
        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (COUNTER__SERVER__PORT=8080, etc.)
        builder = builder.add_source(
            Environment::with_prefix("COUNTER")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.cors.allows_any());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(Some("does-not-exist.toml")).unwrap();
        assert_eq!(config.counter.recent_window_hours, 24);
        assert_eq!(config.stats.cache_ttl_secs, 30);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            port = 8080

            [storage]
            backend = "memory"

            [cors]
            allowed_origins = ["https://example.com"]
            "#,
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(!config.cors.allows_any());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = AppConfig::default();
        config.counter.recent_window_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_window_longer_than_a_year() {
        let mut config = AppConfig::default();
        config.counter.recent_window_hours = MAX_WINDOW_HOURS;
        assert!(config.validate().is_ok());

        config.counter.recent_window_hours = MAX_WINDOW_HOURS + 1;
        assert!(config.validate().is_err());

        config.counter.recent_window_hours = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_sqlite_path() {
        let mut config = AppConfig::default();
        config.storage.path = PathBuf::new();
        assert!(config.validate().is_err());

        // Path is irrelevant for the memory backend
        config.storage.backend = StorageBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit_only_when_enabled() {
        let mut config = AppConfig::default();
        config.rate_limit.per_second = 0;
        assert!(config.validate().is_err());
        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let mut config = AppConfig::default();
        config.cors.allowed_origins = vec!["bad\norigin".to_string()];
        assert!(config.validate().is_err());
        config.cors.allowed_origins.clear();
        assert!(config.validate().is_err());
    }
}
