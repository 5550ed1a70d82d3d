use crate::*;
use thiserror::Error;

/// Weights are f64, so anything past this many decimals is noise.
const MAX_WEIGHT_PRECISION: u32 = 15;

#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("Index name is required")]
    MissingIndexName,

    #[error("index.constituents must be a positive integer")]
    NoConstituents,

    #[error("index.weight_precision must be at most {max}, got {value}")]
    InvalidWeightPrecision { value: u32, max: u32 },

    #[error("index.weight_precision {precision} leaves no positive weight for {constituents} constituents")]
    WeightPrecisionTooCoarse { precision: u32, constituents: usize },

    #[error("{field} must be a positive float")]
    InvalidPositiveFloat { field: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("Storage: {message}")]
    InvalidStorage { message: String },

    #[error("Cache: {message}")]
    InvalidCache { message: String },

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Environment variable placeholder in '{field}' was not resolved")]
    UnresolvedEnvVar { field: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &MasterConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_index(&config.index, &mut report);
    validate_build(&config.build, &mut report);
    validate_storage(&config.storage, &mut report);
    validate_cache(&config.cache, &mut report);
    validate_logging(&config.logging, &mut report);

    report
}

fn validate_index(index: &IndexConfig, report: &mut ValidationReport) {
    if index.name.trim().is_empty() {
        report.add_error(ValidationError::MissingIndexName);
    }

    if index.constituents == 0 {
        report.add_error(ValidationError::NoConstituents);
    }

    match index.weight_precision {
        Some(p) if p > MAX_WEIGHT_PRECISION => {
            report.add_error(ValidationError::InvalidWeightPrecision {
                value: p,
                max: MAX_WEIGHT_PRECISION,
            });
        }
        Some(p) => {
            // Weights are truncated to p decimals, so 1/N needs at least one unit
            let units = 10f64.powi(p as i32);
            if (index.constituents as f64) > units {
                report.add_error(ValidationError::WeightPrecisionTooCoarse {
                    precision: p,
                    constituents: index.constituents,
                });
            } else if index.constituents as f64 / units > index.weight_tolerance {
                report.add_warning(
                    "index.weight_precision",
                    "Truncation residual of up to N * 10^-precision is assigned to rank 1",
                );
            }
        }
        None => report.add_default("index.weight_precision", "exact (1/N)"),
    }

    if !(index.weight_tolerance.is_finite() && index.weight_tolerance > 0.0) {
        report.add_error(ValidationError::InvalidPositiveFloat {
            field: "index.weight_tolerance".to_string(),
        });
    }

    if index.calendar == TradingCalendar::Weekdays {
        report.add_warning(
            "index.calendar",
            "Weekday calendar fails exchange holidays with InsufficientData",
        );
    }
}

fn validate_build(build: &BuildConfig, report: &mut ValidationReport) {
    if build.operation_timeout_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "build.operation_timeout_ms".to_string(),
        });
    }
}

fn validate_storage(storage: &StorageConfig, report: &mut ValidationReport) {
    match storage.storage_type {
        StorageType::Memory => {
            report.add_warning(
                "storage.type",
                "In-memory storage does not persist between runs",
            );
        }
        StorageType::Postgres => {
            if let Some(ref pg) = storage.postgres {
                validate_postgres_config(pg, report);
            } else {
                report.add_error(ValidationError::InvalidStorage {
                    message: "Storage type is 'postgres' but postgres configuration is missing"
                        .to_string(),
                });
            }
        }
    }
}

fn validate_postgres_config(pg: &PostgresConfig, report: &mut ValidationReport) {
    for (field, value) in [
        ("storage.postgres.host", &pg.host),
        ("storage.postgres.database", &pg.database),
        ("storage.postgres.user", &pg.user),
        ("storage.postgres.password", &pg.password),
    ] {
        check_resolved(field, value, report);
    }

    if pg.host.is_empty() {
        report.add_error(ValidationError::InvalidStorage {
            message: "host is required".to_string(),
        });
    }

    if pg.database.is_empty() {
        report.add_error(ValidationError::InvalidStorage {
            message: "database is required".to_string(),
        });
    }

    if pg.port == 0 {
        report.add_error(ValidationError::InvalidStorage {
            message: "port must be a positive integer".to_string(),
        });
    }

    if pg.max_connections == 0 {
        report.add_error(ValidationError::InvalidStorage {
            message: "max_connections must be a positive integer".to_string(),
        });
    }

    let valid_ssl_modes = ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];
    if !valid_ssl_modes.contains(&pg.ssl_mode.as_str()) {
        report.add_error(ValidationError::InvalidStorage {
            message: format!(
                "Invalid ssl_mode '{}'. Must be one of: {}",
                pg.ssl_mode,
                valid_ssl_modes.join(", ")
            ),
        });
    }
}

fn validate_cache(cache: &CacheConfig, report: &mut ValidationReport) {
    if !cache.enabled {
        report.add_warning("cache.enabled", "Cache disabled; every query hits the datastore");
        return;
    }

    if cache.ttl_seconds == 0 {
        report.add_error(ValidationError::InvalidCache {
            message: "ttl_seconds must be a positive integer".to_string(),
        });
    }

    if cache.max_entries == 0 {
        report.add_error(ValidationError::InvalidCache {
            message: "max_entries must be a positive integer".to_string(),
        });
    }

    if cache.max_range_days == 0 {
        report.add_error(ValidationError::InvalidCache {
            message: "max_range_days must be a positive integer".to_string(),
        });
    }

    if cache.key_prefix.is_empty() {
        report.add_default("cache.key_prefix", &default_key_prefix());
    }

    if cache.cache_type == CacheType::Redis {
        match cache.redis {
            Some(ref redis) => {
                check_resolved("cache.redis.host", &redis.host, report);
                check_resolved("cache.redis.password", &redis.password, report);
                if redis.host.is_empty() {
                    report.add_error(ValidationError::InvalidCache {
                        message: "redis host is required".to_string(),
                    });
                }
                if redis.port == 0 {
                    report.add_error(ValidationError::InvalidCache {
                        message: "redis port must be a positive integer".to_string(),
                    });
                }
            }
            None => report.add_error(ValidationError::InvalidCache {
                message: "Cache type is 'redis' but redis configuration is missing".to_string(),
            }),
        }
    }
}

fn validate_logging(logging: &LoggingConfig, report: &mut ValidationReport) {
    let valid_formats = ["pretty", "json", "compact"];
    if !valid_formats.contains(&logging.format.to_lowercase().as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(logging.format.clone()));
    }

    if logging.metrics_port == Some(0) {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "logging.metrics_port".to_string(),
        });
    }
}

fn check_resolved(field: &str, value: &str, report: &mut ValidationReport) {
    if has_unresolved_env_vars(value) {
        report.add_error(ValidationError::UnresolvedEnvVar {
            field: field.to_string(),
        });
    }
}
