//! # Elastic connection pool
//!
//! Connection pool for backends whose connections are stateful and
//! expensive to create, and whose own pool primitive can only block.
//!
//! ## Features
//!
//! - Fixed-size core wrapped in a race against a short timer, so callers
//!   are not blocked while the core has free slots
//! - Elastic overflow: ad-hoc connections beyond the core, up to a ceiling
//! - Hard cap on total connections; a saturated pool waits instead of failing
//! - Late core connections are parked and reused instead of leaking
//! - Drain-on-destroy for cores that cannot be closed explicitly
//! - Metrics, health status and Prometheus export
//! - In-memory backend for tests and demos
//!
//! ## Quick Start
//!
//! ```rust
//! use elastic_connpool::{ElasticPool, PoolConfiguration};
//! use elastic_connpool::memory::MemoryBackend;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = PoolConfiguration::new("mem://quickstart")
//!     .with_fixed_size(2)
//!     .with_max_size(4);
//! let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();
//!
//! let mut conn = pool.acquire().await.unwrap();
//! conn.execute("RETURN 1").await.unwrap();
//! pool.release(conn).await.unwrap();
//!
//! pool.destroy().await;
//! # }
//! ```

mod backend;
mod config;
mod drain;
mod errors;
mod health;
mod metrics;
mod overflow;
mod pool;
mod state;

pub mod memory;

pub use backend::{Backend, BackendError, PoolCore, RawConnection};
pub use config::{
    BackendConfig, ENV_FIXED_SIZE, ENV_MAX_SIZE, ENV_URI, ExhaustionPolicy, PoolConfiguration,
};
pub use errors::{PoolError, PoolResult};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use overflow::OverflowController;
pub use pool::{ConnectionFuture, ConnectionKind, ElasticPool, PooledConnection};
