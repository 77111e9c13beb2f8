//! Shutdown drain
//!
//! Core connections offer no close-the-pool signal, so destroying a pool
//! works by draining: take every connection the core will still hand out,
//! impose a near-zero timeout so the backend drops it on next use, and stop
//! once the core stays silent for a whole drain window.

use crate::backend::{Backend, RawConnection};
use crate::pool::Shared;
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl<B: Backend> Shared<B> {
    /// Impose the drain expiry on a connection and close it, best effort
    pub(crate) async fn expire(&self, mut conn: B::Connection) {
        conn.set_timeout(self.config.drain_expiry);
        if let Err(err) = conn.close().await {
            tracing::warn!(error = %err, "closing expired connection failed");
        }
    }

    pub(crate) async fn drain(self: &Arc<Self>) {
        let _serialized = self.drain_lock.lock().await;
        if !self.is_connected() {
            tracing::debug!("pool already destroyed");
            return;
        }

        tracing::info!(window = ?self.config.drain_window, "draining connection pool");

        let mut drained: Vec<B::Connection> = self.state.lock().parked.drain(..).collect();

        loop {
            let mut pending = self.spawn_core_acquire();
            tokio::select! {
                biased;
                received = &mut pending => match received {
                    Ok(Ok(mut conn)) => {
                        conn.set_timeout(self.config.drain_expiry);
                        drained.push(conn);
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "core acquisition failed while draining");
                        break;
                    }
                    Err(_) => break,
                },
                _ = tokio::time::sleep(self.config.drain_window) => {
                    pending.close();
                    if let Ok(Ok(mut conn)) = pending.try_recv() {
                        conn.set_timeout(self.config.drain_expiry);
                        drained.push(conn);
                    }
                    break;
                }
            }
        }

        let leftovers = self.state.lock().disconnect();
        drained.extend(leftovers);
        self.shutdown.send_replace(true);

        let count = drained.len();
        for conn in drained {
            self.expire(conn).await;
        }
        self.metrics.drained.fetch_add(count, Ordering::Relaxed);

        tracing::info!(drained = count, "connection pool destroyed");
    }
}
