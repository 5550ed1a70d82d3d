//! Prometheus metrics for index builds and the query cache
//!
//! Metric names:
//!
//! * `index_dates_committed_total` - dates whose composition and performance were committed
//! * `index_build_failures_total{kind}` - builds that stopped on a failing date
//! * `index_build_duration_seconds` - wall time of a whole build
//! * `index_cache_requests_total{outcome}` - cache lookups by hit, miss or bypass
//! * `index_cache_evictions_total` - entries removed by date invalidation

use metrics::{counter, histogram, Counter, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus exporter, serving `/metrics` on `port`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Counters and timings for the build orchestrator
#[derive(Clone)]
pub struct BuildMetrics {
    dates_committed: Counter,
    build_duration: Histogram,
}

impl BuildMetrics {
    pub fn new() -> Self {
        Self {
            dates_committed: counter!("index_dates_committed_total"),
            build_duration: histogram!("index_build_duration_seconds"),
        }
    }

    pub fn date_committed(&self) {
        self.dates_committed.increment(1);
    }

    /// Record a build that stopped early, labelled by error kind
    pub fn build_failed(&self, kind: &'static str) {
        counter!("index_build_failures_total", "kind" => kind).increment(1);
    }

    /// Time a build; the duration is recorded when the timer drops
    pub fn start_build(&self) -> BuildTimer<'_> {
        BuildTimer {
            metrics: self,
            start: Instant::now(),
        }
    }
}

impl Default for BuildMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the build duration on drop
pub struct BuildTimer<'a> {
    metrics: &'a BuildMetrics,
    start: Instant,
}

impl Drop for BuildTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .build_duration
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// Result of a single cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// The cache was skipped because it could not be trusted or reached
    Bypass,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Bypass => "bypass",
        }
    }
}

#[derive(Clone)]
pub struct CacheMetrics {
    hits: Counter,
    misses: Counter,
    bypasses: Counter,
    evictions: Counter,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: counter!("index_cache_requests_total", "outcome" => CacheOutcome::Hit.as_str()),
            misses: counter!("index_cache_requests_total", "outcome" => CacheOutcome::Miss.as_str()),
            bypasses: counter!("index_cache_requests_total", "outcome" => CacheOutcome::Bypass.as_str()),
            evictions: counter!("index_cache_evictions_total"),
        }
    }

    pub fn record(&self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Hit => self.hits.increment(1),
            CacheOutcome::Miss => self.misses.increment(1),
            CacheOutcome::Bypass => self.bypasses.increment(1),
        }
    }

    pub fn evicted(&self, count: u64) {
        self.evictions.increment(count);
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
