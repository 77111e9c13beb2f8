//! Health monitoring for the connection pool

use crate::metrics::PoolMetrics;

/// Health status of a pool
///
/// # Examples
///
/// ```
/// use elastic_connpool::{ElasticPool, PoolConfiguration};
/// use elastic_connpool::memory::MemoryBackend;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = PoolConfiguration::new("mem://docs").with_fixed_size(2).with_max_size(4);
/// let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.overflow_remaining, 2);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Whether the pool still accepts work
    pub connected: bool,

    /// Whether the fast path is currently latched off
    pub pool_exhausted: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Checked-out connections relative to the ceiling (0.0 to 1.0)
    pub utilization: f64,

    /// Pooled connections checked out
    pub pooled_in_use: usize,

    /// Overflow connections checked out
    pub overflow_in_use: usize,

    /// Overflow connections that may still be created
    pub overflow_remaining: usize,

    /// Ceiling on pooled plus overflow connections
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Derive a health status from a metrics snapshot and the pool flags
    pub fn new(metrics: &PoolMetrics, connected: bool, pool_exhausted: bool) -> Self {
        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if !connected {
            warnings.push("Pool is disconnected".to_string());
            is_healthy = false;
        }

        // Saturated: the next acquisition will block on the core
        if pool_exhausted && metrics.overflow_remaining == 0 {
            warnings.push("Overflow exhausted, acquisitions will block".to_string());
            is_healthy = false;
        } else if pool_exhausted {
            warnings.push(format!(
                "Fixed pool exhausted, {} overflow connections left",
                metrics.overflow_remaining
            ));
        }

        if metrics.utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", metrics.utilization * 100.0));
        }

        Self {
            is_healthy,
            connected,
            pool_exhausted,
            warning_count: warnings.len(),
            utilization: metrics.utilization,
            pooled_in_use: metrics.pooled_in_use,
            overflow_in_use: metrics.overflow_in_use,
            overflow_remaining: metrics.overflow_remaining,
            total_capacity: metrics.max_size,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pooled: usize, overflow: usize, remaining: usize) -> PoolMetrics {
        let max_size = 4;
        PoolMetrics {
            total_pooled_acquired: pooled,
            total_overflow_acquired: overflow,
            total_blocking_acquired: 0,
            fast_path_timeouts: 0,
            total_parked: 0,
            parked_reused: 0,
            total_released: 0,
            release_errors: 0,
            drained_connections: 0,
            pooled_in_use: pooled,
            overflow_in_use: overflow,
            overflow_remaining: remaining,
            fixed_size: 2,
            max_size,
            utilization: (pooled + overflow) as f64 / max_size as f64,
        }
    }

    #[test]
    fn test_saturated_pool_is_unhealthy() {
        let health = HealthStatus::new(&snapshot(2, 2, 0), true, true);
        assert!(!health.is_healthy());
        assert!(health.warnings.iter().any(|w| w.contains("block")));
    }

    #[test]
    fn test_overflow_in_use_is_only_a_warning() {
        let health = HealthStatus::new(&snapshot(2, 1, 1), true, true);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 1);
    }

    #[test]
    fn test_disconnected_pool_is_unhealthy() {
        let health = HealthStatus::new(&snapshot(0, 0, 2), false, false);
        assert!(!health.is_healthy());
        assert!(!health.connected);
    }
}
