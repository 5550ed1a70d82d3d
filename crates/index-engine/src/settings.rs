//! Engine settings and bounded datastore calls

use crate::error::{IndexError, Result};
use common::TradingCalendar;
use config::MasterConfig;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub constituents: usize,
    pub weight_precision: Option<u32>,
    pub weight_tolerance: f64,
    pub calendar: TradingCalendar,
    /// Upper bound on every datastore call
    pub operation_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &MasterConfig) -> Self {
        Self {
            constituents: config.index.constituents,
            weight_precision: config.index.weight_precision,
            weight_tolerance: config.index.weight_tolerance,
            calendar: config.index.calendar,
            operation_timeout: Duration::from_millis(config.build.operation_timeout_ms),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            constituents: config::default_constituents(),
            weight_precision: None,
            weight_tolerance: config::default_weight_tolerance(),
            calendar: TradingCalendar::default(),
            operation_timeout: Duration::from_millis(config::default_operation_timeout_ms()),
        }
    }
}

/// Await `fut`, failing with [`IndexError::Timeout`] once `limit` passes
pub(crate) async fn bounded<T, E, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    IndexError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(IndexError::from),
        Err(_) => Err(IndexError::Timeout {
            operation,
            after_ms: limit.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use storage::StorageError;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StorageError>(())
        };
        assert_matches!(
            bounded("get_observations", Duration::from_millis(50), slow).await,
            Err(IndexError::Timeout { operation: "get_observations", after_ms: 50 })
        );
    }

    #[tokio::test]
    async fn test_bounded_maps_errors() {
        let failing = async { Err::<(), _>(StorageError::Query("boom".into())) };
        assert_matches!(
            bounded("get_composition", Duration::from_secs(1), failing).await,
            Err(IndexError::Storage(_))
        );
    }

    #[test]
    fn test_from_config() {
        let mut cfg = config::generate_default_config();
        cfg.index.constituents = 50;
        cfg.build.operation_timeout_ms = 250;
        let settings = EngineSettings::from_config(&cfg);
        assert_eq!(settings.constituents, 50);
        assert_eq!(settings.operation_timeout, Duration::from_millis(250));
    }
}
