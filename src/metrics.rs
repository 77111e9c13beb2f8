//! Metrics collection and export for the connection pool

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics snapshot for a pool
///
/// # Examples
///
/// ```
/// use elastic_connpool::{ElasticPool, PoolConfiguration};
/// use elastic_connpool::memory::MemoryBackend;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = PoolConfiguration::new("mem://docs").with_fixed_size(2).with_max_size(3);
/// let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();
///
/// let conn = pool.acquire().await.unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_pooled_acquired, 1);
/// assert_eq!(metrics.pooled_in_use, 1);
/// conn.release().await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Connections handed out from the fixed core (fast path, parked or blocking)
    pub total_pooled_acquired: usize,

    /// Ad-hoc connections created beyond the fixed core
    pub total_overflow_acquired: usize,

    /// Connections delivered by the core to a caller that had no overflow left.
    /// Waiters served by a parked connection count under `parked_reused`.
    pub total_blocking_acquired: usize,

    /// Times the fast path lost its race against the timer
    pub fast_path_timeouts: usize,

    /// Late core connections that were parked for a later caller
    pub total_parked: usize,

    /// Parked connections handed to a later caller
    pub parked_reused: usize,

    /// Connections released back
    pub total_released: usize,

    /// Close errors seen while releasing
    pub release_errors: usize,

    /// Connections expired by the shutdown drain
    pub drained_connections: usize,

    /// Pooled connections currently checked out
    pub pooled_in_use: usize,

    /// Overflow connections currently checked out
    pub overflow_in_use: usize,

    /// Overflow connections that may still be created
    pub overflow_remaining: usize,

    /// Fixed core size
    pub fixed_size: usize,

    /// Ceiling on pooled plus overflow connections
    pub max_size: usize,

    /// Checked-out connections relative to `max_size` (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_pooled_acquired".to_string(), self.total_pooled_acquired.to_string());
        metrics.insert(
            "total_overflow_acquired".to_string(),
            self.total_overflow_acquired.to_string(),
        );
        metrics.insert(
            "total_blocking_acquired".to_string(),
            self.total_blocking_acquired.to_string(),
        );
        metrics.insert("fast_path_timeouts".to_string(), self.fast_path_timeouts.to_string());
        metrics.insert("total_parked".to_string(), self.total_parked.to_string());
        metrics.insert("parked_reused".to_string(), self.parked_reused.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("release_errors".to_string(), self.release_errors.to_string());
        metrics.insert("drained_connections".to_string(), self.drained_connections.to_string());
        metrics.insert("pooled_in_use".to_string(), self.pooled_in_use.to_string());
        metrics.insert("overflow_in_use".to_string(), self.overflow_in_use.to_string());
        metrics.insert("overflow_remaining".to_string(), self.overflow_remaining.to_string());
        metrics.insert("fixed_size".to_string(), self.fixed_size.to_string());
        metrics.insert("max_size".to_string(), self.max_size.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus one label per tag.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::errors::PoolResult<String> {
        use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        let registry = Registry::new_custom(Some("elasticpool".to_string()), Some(labels))
            .map_err(export_error)?;

        let gauges = [
            (
                "connections_pooled_in_use",
                "Pooled connections currently checked out",
                metrics.pooled_in_use,
            ),
            (
                "connections_overflow_in_use",
                "Overflow connections currently checked out",
                metrics.overflow_in_use,
            ),
            (
                "overflow_remaining",
                "Overflow connections that may still be created",
                metrics.overflow_remaining,
            ),
            ("fixed_size", "Fixed pool core size", metrics.fixed_size),
            ("max_size", "Ceiling on pooled plus overflow connections", metrics.max_size),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help)).map_err(export_error)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(export_error)?;
        }

        let counters = [
            (
                "acquired_pooled_total",
                "Connections handed out from the fixed core",
                metrics.total_pooled_acquired,
            ),
            (
                "acquired_overflow_total",
                "Overflow connections created",
                metrics.total_overflow_acquired,
            ),
            (
                "acquired_blocking_total",
                "Core connections delivered to callers waiting without a deadline",
                metrics.total_blocking_acquired,
            ),
            (
                "fast_path_timeouts_total",
                "Fast path races lost to the timer",
                metrics.fast_path_timeouts,
            ),
            ("parked_total", "Late core connections parked", metrics.total_parked),
            ("parked_reused_total", "Parked connections handed out", metrics.parked_reused),
            ("released_total", "Connections released", metrics.total_released),
            ("release_errors_total", "Close errors during release", metrics.release_errors),
            (
                "drained_total",
                "Connections expired by the shutdown drain",
                metrics.drained_connections,
            ),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help)).map_err(export_error)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(export_error)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(export_error)?;
        String::from_utf8(buffer).map_err(export_error)
    }
}

#[cfg(feature = "metrics")]
fn export_error(err: impl std::fmt::Display) -> crate::errors::PoolError {
    crate::errors::PoolError::MetricsExport(err.to_string())
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub pooled_acquired: AtomicUsize,
    pub overflow_acquired: AtomicUsize,
    pub blocking_acquired: AtomicUsize,
    pub fast_path_timeouts: AtomicUsize,
    pub parked: AtomicUsize,
    pub parked_reused: AtomicUsize,
    pub released: AtomicUsize,
    pub release_errors: AtomicUsize,
    pub drained: AtomicUsize,
    pub pooled_in_use: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pooled_checked_out(&self) {
        self.pooled_acquired.fetch_add(1, Ordering::Relaxed);
        self.pooled_in_use.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pooled_checked_in(&self) {
        // Saturating: a release racing a snapshot must never wrap the gauge.
        let _ = self
            .pooled_in_use
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn get_metrics(
        &self,
        overflow_in_use: usize,
        overflow_remaining: usize,
        fixed_size: usize,
        max_size: usize,
    ) -> PoolMetrics {
        let pooled_in_use = self.pooled_in_use.load(Ordering::Relaxed);
        let utilization = if max_size > 0 {
            (pooled_in_use + overflow_in_use) as f64 / max_size as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_pooled_acquired: self.pooled_acquired.load(Ordering::Relaxed),
            total_overflow_acquired: self.overflow_acquired.load(Ordering::Relaxed),
            total_blocking_acquired: self.blocking_acquired.load(Ordering::Relaxed),
            fast_path_timeouts: self.fast_path_timeouts.load(Ordering::Relaxed),
            total_parked: self.parked.load(Ordering::Relaxed),
            parked_reused: self.parked_reused.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            release_errors: self.release_errors.load(Ordering::Relaxed),
            drained_connections: self.drained.load(Ordering::Relaxed),
            pooled_in_use,
            overflow_in_use,
            overflow_remaining,
            fixed_size,
            max_size,
            utilization,
        }
    }
}
