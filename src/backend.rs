//! Seams to the backend service the pool wraps
//!
//! The pool never speaks a wire protocol itself. A [`Backend`] opens the
//! fixed-size [`PoolCore`] and creates ad-hoc overflow connections; both
//! hand out the same [`RawConnection`] type.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Error reported by the backend (network failure, refused handshake, ...)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An opaque, stateful connection to the backend.
#[async_trait]
pub trait RawConnection: Send + Sized + 'static {
    /// Impose an operation timeout. A near-zero value makes the backend drop
    /// the connection on its next use.
    fn set_timeout(&mut self, timeout: Duration);

    /// Close the connection.
    ///
    /// For connections handed out by a [`PoolCore`] this is also how the slot
    /// goes back to the core; there is no separate release path.
    async fn close(self) -> Result<(), BackendError>;
}

/// Fixed-capacity connection source that blocks until a slot frees.
#[async_trait]
pub trait PoolCore: Send + Sync + 'static {
    type Connection: RawConnection;

    /// Wait until a connection is available, or fail outright.
    ///
    /// There is no timeout: the future stays pending while every slot is
    /// checked out.
    async fn acquire(&self) -> Result<Self::Connection, BackendError>;
}

/// Driver for one backend: opens the fixed pool and creates ad-hoc
/// connections that live outside of it.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Connection: RawConnection;
    type Core: PoolCore<Connection = Self::Connection>;

    /// Open a fixed-capacity core with `size` slots.
    async fn open_pool(&self, uri: &str, size: usize) -> Result<Self::Core, BackendError>;

    /// Create a single connection that bypasses the core entirely.
    async fn connect(&self, uri: &str) -> Result<Self::Connection, BackendError>;
}
