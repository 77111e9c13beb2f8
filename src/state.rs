//! Shared mutable pool state, guarded by a single mutex

use crate::config::ExhaustionPolicy;
use crate::errors::{PoolError, PoolResult};
use crate::overflow::OverflowController;
use std::collections::VecDeque;

/// Everything the arbiter, release path and drainer agree on.
///
/// Held behind one `parking_lot::Mutex` in the pool and only locked for the
/// brief check-and-update; no backend call ever runs under it.
pub(crate) struct PoolState<C> {
    pub connected: bool,
    pub pool_exhausted: bool,
    pub overflow: OverflowController,
    /// Core connections that arrived after their caller gave up waiting
    pub parked: VecDeque<C>,
    policy: ExhaustionPolicy,
}

impl<C> PoolState<C> {
    pub fn new(overflow_ceiling: usize, policy: ExhaustionPolicy) -> Self {
        Self {
            connected: true,
            pool_exhausted: false,
            overflow: OverflowController::new(overflow_ceiling),
            parked: VecDeque::new(),
            policy,
        }
    }

    pub fn ensure_connected(&self) -> PoolResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(PoolError::PoolClosed)
        }
    }

    /// Set the latch; returns true if this call flipped it
    pub fn latch_exhausted(&mut self) -> bool {
        let flipped = !self.pool_exhausted;
        self.pool_exhausted = true;
        flipped
    }

    /// A pooled connection went back to the core
    pub fn on_pooled_release(&mut self) {
        if self.policy == ExhaustionPolicy::ResetOnRelease {
            self.pool_exhausted = false;
        }
    }

    /// Hand out a parked connection, if one is waiting
    pub fn take_parked(&mut self) -> PoolResult<Option<C>> {
        self.ensure_connected()?;
        Ok(self.parked.pop_front())
    }

    /// Park a late core connection. Gives it back when the pool is closed.
    pub fn park(&mut self, conn: C) -> Result<(), C> {
        if self.connected {
            self.parked.push_back(conn);
            Ok(())
        } else {
            Err(conn)
        }
    }

    /// Mark the pool disconnected and hand back whatever is still parked
    pub fn disconnect(&mut self) -> Vec<C> {
        self.connected = false;
        self.parked.drain(..).collect()
    }
}
