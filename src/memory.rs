//! In-memory backend
//!
//! Behaves like a real driver from the pool's point of view: the core hands
//! out at most `size` connections and blocks beyond that, closing a core
//! connection gives its slot back, and a near-zero timeout makes the core
//! discard the connection instead of keeping it idle. Used by the tests,
//! demos and benches; also handy for exercising application code without a
//! database.

use crate::backend::{Backend, BackendError, PoolCore, RawConnection};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Timeouts at or below this are treated as "drop on next use"
pub const EXPIRY_THRESHOLD: Duration = Duration::from_millis(1);

/// Counters shared by a backend and everything it opened
#[derive(Debug, Default)]
pub struct MemoryStats {
    next_id: AtomicUsize,
    core_created: AtomicUsize,
    adhoc_created: AtomicUsize,
    checked_out: AtomicUsize,
    returned: AtomicUsize,
    expired: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryStats {
    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Connections created by a core
    pub fn core_created(&self) -> usize {
        self.core_created.load(Ordering::SeqCst)
    }

    /// Connections created outside of any core
    pub fn adhoc_created(&self) -> usize {
        self.adhoc_created.load(Ordering::SeqCst)
    }

    /// Connections handed out and not yet closed or dropped
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    /// Core connections returned to their core's idle list
    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::SeqCst)
    }

    /// Core connections discarded because of an expired timeout
    pub fn expired(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    /// Ad-hoc connections closed
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Control {
    fail_open: AtomicBool,
    fail_connect: AtomicBool,
    fail_acquire: AtomicBool,
    fail_close: AtomicBool,
    acquire_delay_micros: AtomicU64,
}

/// In-memory [`Backend`]. Clones share counters and failure switches.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    stats: Arc<MemoryStats>,
    control: Arc<Control>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<MemoryStats> {
        Arc::clone(&self.stats)
    }

    /// Make `open_pool` fail
    pub fn set_fail_open(&self, fail: bool) {
        self.control.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make ad-hoc `connect` fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.control.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make core acquisitions fail
    pub fn set_fail_acquire(&self, fail: bool) {
        self.control.fail_acquire.store(fail, Ordering::SeqCst);
    }

    /// Make `close` report an error (the connection is still released)
    pub fn set_fail_close(&self, fail: bool) {
        self.control.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Delay every core acquisition, simulating a slow handshake
    pub fn set_acquire_delay(&self, delay: Duration) {
        self.control
            .acquire_delay_micros
            .store(delay.as_micros() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Connection = MemoryConnection;
    type Core = MemoryCore;

    async fn open_pool(&self, uri: &str, size: usize) -> Result<MemoryCore, BackendError> {
        if self.control.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::new(format!("cannot open pool against {}", uri)));
        }
        Ok(MemoryCore {
            permits: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::clone(&self.stats),
            control: Arc::clone(&self.control),
        })
    }

    async fn connect(&self, uri: &str) -> Result<MemoryConnection, BackendError> {
        if self.control.fail_connect.load(Ordering::SeqCst) {
            return Err(BackendError::new(format!("cannot connect to {}", uri)));
        }
        let id = self.stats.next_id();
        self.stats.adhoc_created.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection::new(id, None, Arc::clone(&self.stats), Arc::clone(&self.control)))
    }
}

/// Fixed-size core backed by a semaphore
pub struct MemoryCore {
    permits: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<usize>>>,
    stats: Arc<MemoryStats>,
    control: Arc<Control>,
}

impl MemoryCore {
    /// Slots not currently checked out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl PoolCore for MemoryCore {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection, BackendError> {
        let delay = self.control.acquire_delay_micros.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_micros(delay)).await;
        }
        if self.control.fail_acquire.load(Ordering::SeqCst) {
            return Err(BackendError::new("memory core unavailable"));
        }

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| BackendError::new("memory core closed"))?;

        let reused = self.idle.lock().pop();
        let id = match reused {
            Some(id) => id,
            None => {
                self.stats.core_created.fetch_add(1, Ordering::SeqCst);
                self.stats.next_id()
            }
        };

        let slot = CoreSlot {
            _permit: permit,
            idle: Arc::clone(&self.idle),
        };
        Ok(MemoryConnection::new(
            id,
            Some(slot),
            Arc::clone(&self.stats),
            Arc::clone(&self.control),
        ))
    }
}

struct CoreSlot {
    _permit: OwnedSemaphorePermit,
    idle: Arc<Mutex<Vec<usize>>>,
}

/// Connection handed out by [`MemoryBackend`] or [`MemoryCore`]
pub struct MemoryConnection {
    id: usize,
    timeout: Option<Duration>,
    queries: usize,
    slot: Option<CoreSlot>,
    stats: Arc<MemoryStats>,
    control: Arc<Control>,
}

impl MemoryConnection {
    fn new(
        id: usize,
        slot: Option<CoreSlot>,
        stats: Arc<MemoryStats>,
        control: Arc<Control>,
    ) -> Self {
        stats.checked_out.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            timeout: None,
            queries: 0,
            slot,
            stats,
            control,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether this connection occupies a core slot
    pub fn from_core(&self) -> bool {
        self.slot.is_some()
    }

    pub fn queries(&self) -> usize {
        self.queries
    }

    fn is_expired(&self) -> bool {
        self.timeout.is_some_and(|timeout| timeout <= EXPIRY_THRESHOLD)
    }

    /// Run a statement; fails once the connection has been expired
    pub async fn execute(&mut self, statement: &str) -> Result<usize, BackendError> {
        if self.is_expired() {
            return Err(BackendError::new(format!(
                "connection {} timed out before running {:?}",
                self.id, statement
            )));
        }
        self.queries += 1;
        Ok(self.queries)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.stats.checked_out.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RawConnection for MemoryConnection {
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    async fn close(self) -> Result<(), BackendError> {
        let mut conn = self;
        match conn.slot.take() {
            Some(slot) if conn.is_expired() => {
                conn.stats.expired.fetch_add(1, Ordering::SeqCst);
                drop(slot);
            }
            Some(slot) => {
                slot.idle.lock().push(conn.id);
                conn.stats.returned.fetch_add(1, Ordering::SeqCst);
                drop(slot);
            }
            None => {
                conn.stats.closed.fetch_add(1, Ordering::SeqCst);
            }
        }

        if conn.control.fail_close.load(Ordering::SeqCst) {
            return Err(BackendError::new(format!("close of connection {} failed", conn.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_core_blocks_beyond_size() {
        let backend = MemoryBackend::new();
        let core = backend.open_pool("mem://test", 1).await.unwrap();

        let first = core.acquire().await.unwrap();
        assert_eq!(core.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(20), core.acquire()).await;
        assert!(blocked.is_err());

        first.close().await.unwrap();
        let second = core.acquire().await.unwrap();
        assert_eq!(second.id(), 0);
        assert_eq!(backend.stats().returned(), 1);
    }

    #[tokio::test]
    async fn test_expired_connection_is_discarded() {
        let backend = MemoryBackend::new();
        let core = backend.open_pool("mem://test", 1).await.unwrap();

        let mut conn = core.acquire().await.unwrap();
        conn.set_timeout(Duration::from_millis(1));
        assert!(conn.execute("RETURN 1").await.is_err());
        conn.close().await.unwrap();

        let stats = backend.stats();
        assert_eq!(stats.expired(), 1);
        assert_eq!(stats.checked_out(), 0);

        let fresh = core.acquire().await.unwrap();
        assert_eq!(fresh.id(), 1);
        assert_eq!(stats.core_created(), 2);
    }

    #[tokio::test]
    async fn test_adhoc_connection_has_no_slot() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect("mem://test").await.unwrap();
        assert!(!conn.from_core());
        assert_eq!(conn.execute("RETURN 1").await.unwrap(), 1);

        conn.close().await.unwrap();
        assert_eq!(backend.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let backend = MemoryBackend::new();
        backend.set_fail_open(true);
        assert!(backend.open_pool("mem://test", 1).await.is_err());

        backend.set_fail_connect(true);
        assert!(backend.connect("mem://test").await.is_err());
    }
}
