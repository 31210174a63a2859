//! C4: `PerOriginPool` — a LIFO idle queue plus an outstanding-lease
//! counter for one [`PoolKey`] (§4.4).
//!
//! `idle.len() <= maxsize` always; a connection is either sitting in `idle`
//! or counted in `outstanding` (leased out), never both.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::connection::Connection;
use crate::error::Error;
use crate::pool::key::PoolKey;

#[derive(Debug, Clone, Copy)]
pub struct ConnConfig {
    pub maxsize: usize,
    pub block: bool,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            maxsize: 10,
            block: false,
        }
    }
}

struct Inner {
    idle: Vec<Connection>,
    outstanding: usize,
    shutdown: bool,
}

/// What the caller should do after [`PerOriginPool::acquire`] returns.
pub enum Lease {
    /// Reuse this connection directly.
    Reused(Connection),
    /// No idle connection available; dial a new one. The pool has already
    /// reserved an outstanding slot for it.
    DialNew,
}

pub struct PerOriginPool {
    key: PoolKey,
    config: ConnConfig,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl PerOriginPool {
    pub fn new(key: PoolKey, config: ConnConfig) -> Self {
        Self {
            key,
            config,
            inner: Mutex::new(Inner {
                idle: Vec::new(),
                outstanding: 0,
                shutdown: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn idle_len(&self) -> usize {
        self.inner.lock().idle.len()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Acquire a connection slot: an already-connected idle one if available,
    /// otherwise permission to dial a new one. When `block` is set on this
    /// pool's config and the outstanding count is already at `maxsize`, waits
    /// up to `wait_timeout` for a release before giving up with
    /// [`Error::EmptyPool`].
    pub async fn acquire(&self, wait_timeout: Option<Duration>) -> Result<Lease, Error> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.shutdown {
                    return Err(Error::EmptyPool);
                }
                // Idle connections can go dead while sitting unused (the peer
                // half-closes, a middlebox times the socket out); a lease
                // handed back from a closed peer would fail on first write.
                // Drain dead ones here rather than handing them out.
                while let Some(mut conn) = inner.idle.pop() {
                    if conn.peek_closed_by_peer() {
                        continue;
                    }
                    inner.outstanding += 1;
                    return Ok(Lease::Reused(conn));
                }
                if !self.config.block || inner.outstanding < self.config.maxsize {
                    inner.outstanding += 1;
                    return Ok(Lease::DialNew);
                }
            }

            // Blocking mode, saturated: wait for a release or shutdown.
            let notified = self.notify.notified();
            match wait_timeout {
                Some(d) => {
                    if tokio::time::timeout(d, notified).await.is_err() {
                        return Err(Error::EmptyPool);
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Reverses a reserved slot from [`Lease::DialNew`] when the dial itself
    /// failed, so it doesn't leak as a phantom outstanding lease.
    pub fn cancel_reservation(&self) {
        let mut inner = self.inner.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        drop(inner);
        self.notify.notify_one();
    }

    /// Return a connection after use. If it's reusable, the pool's not
    /// shutting down, and there's room in `idle`, it's kept; otherwise the
    /// connection is handed back to the caller to close asynchronously.
    pub fn release(&self, conn: Connection) -> Option<Connection> {
        let mut inner = self.inner.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        let keep = !inner.shutdown && conn.is_reusable() && inner.idle.len() < self.config.maxsize;
        let result = if keep {
            inner.idle.push(conn);
            None
        } else {
            Some(conn)
        };
        drop(inner);
        self.notify.notify_one();
        result
    }

    /// Drain and close all idle connections, and mark the pool shut down so
    /// no further connection is ever added back to `idle`. Outstanding
    /// leases still in flight are closed as they're released.
    pub async fn close(&self) {
        let idle: Vec<Connection> = {
            let mut inner = self.inner.lock();
            inner.shutdown = true;
            std::mem::take(&mut inner.idle)
        };
        for mut conn in idle {
            conn.close().await;
        }
        self.notify.notify_waiters();
    }
}
