use super::CacheType;

pub fn default_enabled() -> bool {
    true
}

pub fn default_constituents() -> usize {
    100
}

pub fn default_weight_tolerance() -> f64 {
    1e-9
}

pub fn default_operation_timeout_ms() -> u64 {
    5_000
}

pub fn default_postgres_port() -> u16 {
    5432
}

pub fn default_ssl_mode() -> String {
    "prefer".to_string()
}

pub fn default_max_connections() -> u32 {
    10
}

pub fn default_connection_timeout() -> u64 {
    5
}

pub fn default_idle_timeout() -> u64 {
    600
}

pub fn default_cache_type() -> CacheType {
    CacheType::Memory
}

/// One day, matching how long computed answers were kept before.
pub fn default_ttl_seconds() -> u64 {
    86_400
}

pub fn default_max_entries() -> u64 {
    10_000
}

/// Five years of calendar days
pub fn default_max_range_days() -> usize {
    1_830
}

pub fn default_key_prefix() -> String {
    "eqindex".to_string()
}

pub fn default_redis_port() -> u16 {
    6379
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}
