pub use common::TradingCalendar;
use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Index definition: how many constituents, how weights are rounded and
/// which dates count as trading days.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    pub name: String,
    #[serde(default = "default_constituents")]
    pub constituents: usize,
    /// Decimal places weights are rounded to. Absent means exact `1/N`.
    #[serde(rename = "weight_precision")]
    #[serde(default)]
    pub weight_precision: Option<u32>,
    #[serde(rename = "weight_tolerance")]
    #[serde(default = "default_weight_tolerance")]
    pub weight_tolerance: f64,
    #[serde(default)]
    pub calendar: TradingCalendar,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Upper bound for every datastore or cache call made by a build.
    #[serde(rename = "operation_timeout_ms")]
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            postgres: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(rename = "ssl_mode")]
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(rename = "max_connections")]
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(rename = "connection_timeout_seconds")]
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    #[serde(rename = "idle_timeout_seconds")]
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

impl PostgresConfig {
    /// Connection URL in the form sqlx expects.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "type")]
    #[serde(default = "default_cache_type")]
    pub cache_type: CacheType,
    #[serde(rename = "ttl_seconds")]
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(rename = "max_entries")]
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Ranged answers spanning more calendar days than this are not cached
    #[serde(rename = "max_range_days")]
    #[serde(default = "default_max_range_days")]
    pub max_range_days: usize,
    #[serde(rename = "key_prefix")]
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cache_type: default_cache_type(),
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
            max_range_days: default_max_range_days(),
            key_prefix: default_key_prefix(),
            redis: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "db_index")]
    #[serde(default)]
    pub db_index: u8,
}

impl RedisConfig {
    /// Connection URL for the redis client.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db_index)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db_index
            )
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Expose Prometheus metrics on this port when set.
    #[serde(rename = "metrics_port")]
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            metrics_port: None,
        }
    }
}

// ==================================================================================
// MASTER CONFIG
// ==================================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterConfig {
    pub index: IndexConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_master_config() {
        let yaml = include_str!("../../../config/eqindex.yaml");

        let cfg: MasterConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(cfg.index.name, "US Top 100 Equal Weight");
        assert_eq!(cfg.index.constituents, 100);
        assert_eq!(cfg.index.calendar, TradingCalendar::Observed);
        assert_eq!(cfg.storage.storage_type, StorageType::Postgres);
        assert!(cfg.storage.postgres.is_some());
        assert_eq!(cfg.cache.cache_type, CacheType::Redis);
        assert_eq!(cfg.cache.ttl_seconds, 86400);
        assert_eq!(cfg.build.operation_timeout_ms, 5000);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
index:
  name: "Minimal"
"#;
        let cfg: MasterConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(cfg.index.constituents, 100);
        assert_eq!(cfg.index.weight_precision, None);
        assert_eq!(cfg.index.weight_tolerance, 1e-9);
        assert_eq!(cfg.storage.storage_type, StorageType::Memory);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.cache_type, CacheType::Memory);
        assert_eq!(cfg.logging.format, "pretty");
    }

    #[test]
    fn test_connection_urls() {
        let redis = RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db_index: 2,
        };
        assert_eq!(redis.url(), "redis://localhost:6379/2");

        let pg = PostgresConfig {
            host: "db".to_string(),
            port: 5432,
            database: "stocks".to_string(),
            user: "index".to_string(),
            password: "secret".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 5,
            connection_timeout_seconds: 5,
            idle_timeout_seconds: 60,
        };
        assert_eq!(pg.url(), "postgres://index:secret@db:5432/stocks?sslmode=disable");
    }
}
