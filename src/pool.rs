//! Elastic connection pool: a fixed core plus bounded overflow
//!
//! Acquisition races the core against a short timer. While the core has
//! free slots the race is won almost immediately. Once the timer wins, the
//! pool is latched as exhausted and callers get ad-hoc overflow connections
//! until the overflow ceiling is reached; after that they wait on the core
//! without a deadline, so `max_size` is never exceeded.
//!
//! Acquisition order under contention is not FIFO. Any caller may win a
//! race or a freed slot.

use crate::backend::{Backend, BackendError, PoolCore, RawConnection};
use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::state::PoolState;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Notify, oneshot, watch};

/// Future returned by the closure passed to [`ElasticPool::with_connection`]
pub type ConnectionFuture<'c, R> =
    Pin<Box<dyn Future<Output = Result<R, BackendError>> + Send + 'c>>;

type CoreOutcome<C> = Result<C, BackendError>;
type PendingCore<C> = oneshot::Receiver<CoreOutcome<C>>;

/// Where a checked-out connection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ConnectionKind {
    /// Occupies a slot of the fixed core; closing it hands the slot back
    Pooled,

    /// Created ad hoc beyond the core; releasing it returns an overflow slot
    Overflow,
}

pub(crate) struct Shared<B: Backend> {
    pub backend: B,
    pub core: B::Core,
    pub config: PoolConfiguration,
    pub state: Mutex<PoolState<B::Connection>>,
    pub metrics: MetricsTracker,
    /// Signalled whenever a late core connection gets parked
    pub parked_ready: Notify,
    /// Flips to true once the pool is disconnected
    pub shutdown: watch::Sender<bool>,
    /// Serializes concurrent destroy calls
    pub drain_lock: tokio::sync::Mutex<()>,
}

impl<B: Backend> Shared<B> {
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Start a core acquisition on its own task.
    ///
    /// The task outlives the caller if it has to: when the receiver is gone
    /// by the time a connection shows up, the connection is parked for the
    /// next caller instead of leaking. Once the pool shuts down the task
    /// stops waiting on the core.
    pub fn spawn_core_acquire(self: &Arc<Self>) -> PendingCore<B::Connection> {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(self);
        let shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = wait_shutdown(shutdown) => {
                    tracing::trace!("pool shut down, abandoning core acquisition");
                    return;
                }
                outcome = shared.core.acquire() => outcome,
            };

            match tx.send(outcome) {
                Ok(()) => {}
                Err(Ok(conn)) => shared.park(conn).await,
                Err(Err(err)) => {
                    tracing::debug!(error = %err, "abandoned core acquisition failed");
                }
            }
        });

        rx
    }

    /// Keep a late core connection for the next caller. On a closed pool it
    /// is expired instead.
    pub async fn park(&self, conn: B::Connection) {
        let refused = self.state.lock().park(conn).err();
        match refused {
            None => {
                MetricsTracker::record(&self.metrics.parked);
                tracing::debug!("parked late core connection");
                self.parked_ready.notify_one();
            }
            Some(conn) => self.expire(conn).await,
        }
    }

    pub fn checkout(
        self: &Arc<Self>,
        conn: B::Connection,
        kind: ConnectionKind,
    ) -> PooledConnection<B> {
        match kind {
            ConnectionKind::Pooled => self.metrics.pooled_checked_out(),
            ConnectionKind::Overflow => MetricsTracker::record(&self.metrics.overflow_acquired),
        }
        PooledConnection {
            raw: Some(conn),
            kind,
            shared: Arc::clone(self),
        }
    }

    /// Turn the outcome of a core acquisition into a pooled handle
    async fn finish_core(
        self: &Arc<Self>,
        received: Result<CoreOutcome<B::Connection>, oneshot::error::RecvError>,
    ) -> PoolResult<PooledConnection<B>> {
        let conn = match received {
            Ok(outcome) => outcome?,
            Err(_) if !self.is_connected() => return Err(PoolError::PoolClosed),
            Err(_) => return Err(PoolError::Cancelled),
        };
        if !self.is_connected() {
            self.expire(conn).await;
            return Err(PoolError::PoolClosed);
        }
        Ok(self.checkout(conn, ConnectionKind::Pooled))
    }

    /// Race the core against the fast path timer
    async fn fast_path(self: &Arc<Self>) -> PoolResult<Option<PooledConnection<B>>> {
        let mut pending = self.spawn_core_acquire();

        tokio::select! {
            biased;
            received = &mut pending => return self.finish_core(received).await.map(Some),
            _ = tokio::time::sleep(self.config.fast_path_timeout) => {}
        }

        if let Some(outcome) = abandon(&mut pending) {
            return self.finish_core(Ok(outcome)).await.map(Some);
        }

        MetricsTracker::record(&self.metrics.fast_path_timeouts);
        let flipped = self.state.lock().latch_exhausted();
        if flipped {
            tracing::debug!(
                timeout = ?self.config.fast_path_timeout,
                "fast path timed out, pool latched as exhausted"
            );
        }
        Ok(None)
    }

    /// Create an ad-hoc connection if the overflow ceiling allows it
    async fn overflow_path(self: &Arc<Self>) -> PoolResult<Option<PooledConnection<B>>> {
        let taken = {
            let mut state = self.state.lock();
            state.ensure_connected()?;
            state.overflow.try_take()
        };
        if !taken {
            return Ok(None);
        }

        match self.backend.connect(&self.config.uri).await {
            Ok(conn) => {
                tracing::debug!("created overflow connection");
                Ok(Some(self.checkout(conn, ConnectionKind::Overflow)))
            }
            Err(err) => {
                self.state.lock().overflow.give();
                tracing::warn!(error = %err, "overflow connection could not be created");
                Err(err.into())
            }
        }
    }

    /// Wait on the core without a deadline. Also takes a parked connection
    /// if one shows up first, and gives up once the pool is destroyed.
    async fn blocking_path(self: &Arc<Self>) -> PoolResult<PooledConnection<B>> {
        tracing::debug!("overflow exhausted, waiting on the pool core");

        let mut pending = self.spawn_core_acquire();
        loop {
            let parked = self.parked_ready.notified();
            tokio::pin!(parked);
            parked.as_mut().enable();

            let taken = self.state.lock().take_parked();
            match taken {
                Ok(None) => {}
                Ok(Some(conn)) => {
                    if let Some(Ok(late)) = abandon(&mut pending) {
                        self.park(late).await;
                    }
                    MetricsTracker::record(&self.metrics.parked_reused);
                    return Ok(self.checkout(conn, ConnectionKind::Pooled));
                }
                Err(err) => {
                    if let Some(Ok(late)) = abandon(&mut pending) {
                        self.expire(late).await;
                    }
                    return Err(err);
                }
            }

            tokio::select! {
                biased;
                received = &mut pending => {
                    let conn = self.finish_core(received).await?;
                    MetricsTracker::record(&self.metrics.blocking_acquired);
                    return Ok(conn);
                }
                _ = &mut parked => {}
                _ = wait_shutdown(self.shutdown.subscribe()) => {}
            }
        }
    }

    /// Return a slot and close the connection
    pub async fn release(&self, conn: B::Connection, kind: ConnectionKind) -> PoolResult<()> {
        let connected = self.credit(kind);
        MetricsTracker::record(&self.metrics.released);

        match conn.close().await {
            Ok(()) => Ok(()),
            Err(err) => {
                MetricsTracker::record(&self.metrics.release_errors);
                if connected {
                    Err(err.into())
                } else {
                    tracing::warn!(error = %err, "close failed on a destroyed pool, ignoring");
                    Ok(())
                }
            }
        }
    }

    /// Account for a connection leaving the caller's hands. Returns whether
    /// the pool is still connected.
    pub fn credit(&self, kind: ConnectionKind) -> bool {
        let connected = {
            let mut state = self.state.lock();
            match kind {
                ConnectionKind::Overflow => state.overflow.give(),
                ConnectionKind::Pooled => state.on_pooled_release(),
            }
            state.connected
        };
        if kind == ConnectionKind::Pooled {
            self.metrics.pooled_checked_in();
        }
        connected
    }
}

/// Stop waiting on a pending core acquisition. Returns an outcome that had
/// already arrived; anything arriving later is parked by the acquiring task.
fn abandon<C>(pending: &mut PendingCore<C>) -> Option<CoreOutcome<C>> {
    pending.close();
    pending.try_recv().ok()
}

async fn wait_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

/// A connection checked out of an [`ElasticPool`]
///
/// Give it back with [`release`](Self::release). A handle dropped without
/// being released is released on the current tokio runtime.
pub struct PooledConnection<B: Backend> {
    raw: Option<B::Connection>,
    kind: ConnectionKind,
    shared: Arc<Shared<B>>,
}

impl<B: Backend> PooledConnection<B> {
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Whether this connection came from the fixed core
    pub fn is_pooled(&self) -> bool {
        self.kind == ConnectionKind::Pooled
    }

    /// Release the connection.
    ///
    /// Overflow connections hand their slot back before being closed; pooled
    /// connections go back to the core by being closed. Safe to call after
    /// the pool was destroyed: close errors are then logged, not returned.
    pub async fn release(mut self) -> PoolResult<()> {
        match self.raw.take() {
            Some(raw) => self.shared.release(raw, self.kind).await,
            None => Ok(()),
        }
    }
}

impl<B: Backend> Deref for PooledConnection<B> {
    type Target = B::Connection;

    fn deref(&self) -> &Self::Target {
        self.raw.as_ref().expect("connection already released")
    }
}

impl<B: Backend> DerefMut for PooledConnection<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.raw.as_mut().expect("connection already released")
    }
}

impl<B: Backend> fmt::Debug for PooledConnection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("kind", &self.kind)
            .field("released", &self.raw.is_none())
            .finish()
    }
}

impl<B: Backend> Drop for PooledConnection<B> {
    fn drop(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        let kind = self.kind;
        let shared = Arc::clone(&self.shared);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = shared.release(raw, kind).await {
                        tracing::warn!(error = %err, ?kind, "releasing dropped connection failed");
                    }
                });
            }
            Err(_) => {
                shared.credit(kind);
                tracing::warn!(?kind, "connection dropped outside a tokio runtime, not closed");
                drop(raw);
            }
        }
    }
}

/// Bounded pool with elastic overflow
///
/// Cheap to clone; all clones share one pool. There is no global instance:
/// create one per backend and pass it to whoever needs connections.
///
/// # Examples
///
/// ```
/// use elastic_connpool::{ElasticPool, PoolConfiguration};
/// use elastic_connpool::memory::MemoryBackend;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = PoolConfiguration::new("mem://docs")
///     .with_fixed_size(1)
///     .with_max_size(2)
///     .with_fast_path_timeout(Duration::from_millis(20));
/// let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();
///
/// let first = pool.acquire().await.unwrap();
/// let second = pool.acquire().await.unwrap();
/// assert!(first.is_pooled());
/// assert!(!second.is_pooled());
/// assert_eq!(pool.overflow_remaining(), 0);
///
/// pool.release(second).await.unwrap();
/// pool.release(first).await.unwrap();
/// pool.destroy().await;
/// assert!(pool.acquire().await.is_err());
/// # }
/// ```
pub struct ElasticPool<B: Backend> {
    shared: Arc<Shared<B>>,
}

impl<B: Backend> Clone for ElasticPool<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Backend> fmt::Debug for ElasticPool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ElasticPool")
            .field("fixed_size", &self.shared.config.fixed_size)
            .field("max_size", &self.shared.config.max_size)
            .field("connected", &state.connected)
            .field("pool_exhausted", &state.pool_exhausted)
            .field("overflow_remaining", &state.overflow.remaining())
            .finish()
    }
}

impl<B: Backend> ElasticPool<B> {
    /// Open the fixed core and set up overflow accounting.
    ///
    /// Misconfigured sizes fail here rather than being clamped.
    pub async fn new(backend: B, config: PoolConfiguration) -> PoolResult<Self> {
        config.validate()?;

        let core = backend
            .open_pool(&config.uri, config.fixed_size)
            .await
            .map_err(|err| {
                tracing::error!(
                    error = %err,
                    fixed_size = config.fixed_size,
                    "could not open connection pool"
                );
                PoolError::from(err)
            })?;

        tracing::info!(
            fixed_size = config.fixed_size,
            max_size = config.max_size,
            "connection pool created"
        );

        let state = PoolState::new(config.overflow_ceiling(), config.exhaustion_policy);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                core,
                config,
                state: Mutex::new(state),
                metrics: MetricsTracker::new(),
                parked_ready: Notify::new(),
                shutdown,
                drain_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Get a connection.
    ///
    /// Fails immediately with [`PoolError::PoolClosed`] after
    /// [`destroy`](Self::destroy). When both the core and the overflow are
    /// used up this waits, without a deadline, for a pooled connection to be
    /// released.
    pub async fn acquire(&self) -> PoolResult<PooledConnection<B>> {
        let shared = &self.shared;

        let exhausted = {
            let mut state = shared.state.lock();
            if let Some(conn) = state.take_parked()? {
                drop(state);
                MetricsTracker::record(&shared.metrics.parked_reused);
                return Ok(shared.checkout(conn, ConnectionKind::Pooled));
            }
            state.pool_exhausted
        };

        if !exhausted {
            if let Some(conn) = shared.fast_path().await? {
                return Ok(conn);
            }
        }

        if let Some(conn) = shared.overflow_path().await? {
            return Ok(conn);
        }

        shared.blocking_path().await
    }

    /// Release a connection. See [`PooledConnection::release`].
    pub async fn release(&self, conn: PooledConnection<B>) -> PoolResult<()> {
        conn.release().await
    }

    /// Run `f` against a connection, releasing it afterwards whatever the
    /// outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use elastic_connpool::{ElasticPool, PoolConfiguration};
    /// use elastic_connpool::memory::MemoryBackend;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let config = PoolConfiguration::new("mem://docs").with_fixed_size(1).with_max_size(1);
    /// let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();
    ///
    /// let count = pool
    ///     .with_connection(|conn| Box::pin(async move { conn.execute("RETURN 1").await }))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(count, 1);
    /// # }
    /// ```
    pub async fn with_connection<F, R>(&self, f: F) -> PoolResult<R>
    where
        F: for<'c> FnOnce(&'c mut B::Connection) -> ConnectionFuture<'c, R>,
    {
        let mut conn = self.acquire().await?;
        let outcome = f(&mut *conn).await;
        let released = conn.release().await;

        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Drain the core and mark the pool disconnected.
    ///
    /// Idempotent. Connections checked out at this point are not tracked: if
    /// they are released afterwards they go back to the core still open,
    /// even though the pool reports itself disconnected. Callers must stop
    /// using the pool before destroying it.
    pub async fn destroy(&self) {
        self.shared.drain().await;
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Whether the fast path is currently latched off
    pub fn is_exhausted(&self) -> bool {
        self.shared.state.lock().pool_exhausted
    }

    pub fn overflow_remaining(&self) -> usize {
        self.shared.state.lock().overflow.remaining()
    }

    /// Late core connections waiting for a caller
    pub fn parked_count(&self) -> usize {
        self.shared.state.lock().parked.len()
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.shared.config
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let (overflow_in_use, overflow_remaining) = {
            let state = self.shared.state.lock();
            (state.overflow.in_use(), state.overflow.remaining())
        };
        self.shared.metrics.get_metrics(
            overflow_in_use,
            overflow_remaining,
            self.shared.config.fixed_size,
            self.shared.config.max_size,
        )
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        let metrics = self.get_metrics();
        let (connected, exhausted) = {
            let state = self.shared.state.lock();
            (state.connected, state.pool_exhausted)
        };
        HealthStatus::new(&metrics, connected, exhausted)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }
}
