//! Bounded connection pool with overflow, pre-ping and age-based recycling.
//!
//! At most `size + max_overflow` connections are checked out at once. Up to
//! `size` connections stay open while idle; anything opened beyond that is
//! overflow and is closed as soon as it comes back.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out after {0:?} waiting for a database connection")]
    Timeout(Duration),

    #[error("could not connect to the database: {0}")]
    Connect(String),

    #[error("connection health check failed: {0}")]
    Probe(String),

    #[error("connection pool is closed")]
    Closed,
}

/// Pool sizing and connection lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections kept open while idle.
    pub size: usize,
    /// Extra connections allowed while the pool is saturated.
    pub max_overflow: usize,
    /// How long `get` waits for a free slot.
    pub timeout: Duration,
    /// Maximum connection age before it is closed and reopened.
    pub recycle: Duration,
    /// Probe idle connections before handing them out.
    pub pre_ping: bool,
}

/// Opens, pings and closes connections for a [`Pool`].
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;
    type Error: fmt::Display + Send;

    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Liveness check, e.g. `SELECT 1`.
    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Called for every connection the pool gives up, including ones
    /// dropped on return.
    async fn close(&self, conn: Self::Connection) {
        drop(conn);
    }
}

/// Probe used by the health endpoint.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn check(&self) -> Result<(), PoolError>;
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub max_overflow: usize,
    pub checked_out: usize,
    pub idle: usize,
    pub open: usize,
}

struct Slot<C> {
    conn: C,
    opened_at: Instant,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    idle: Mutex<VecDeque<Slot<M::Connection>>>,
    permits: Arc<Semaphore>,
    checked_out: AtomicUsize,
    open: AtomicUsize,
}

impl<M: ConnectionManager> PoolInner<M> {
    fn is_stale(&self, slot: &Slot<M::Connection>) -> bool {
        slot.opened_at.elapsed() >= self.config.recycle
    }

    async fn discard(&self, slot: Slot<M::Connection>) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.manager.close(slot.conn).await;
    }

    async fn discard_all(&self, slots: Vec<Slot<M::Connection>>) {
        self.open.fetch_sub(slots.len(), Ordering::SeqCst);
        for slot in slots {
            self.manager.close(slot.conn).await;
        }
    }

    /// Close a connection from synchronous code. The manager's `close` runs
    /// on a spawned task when a runtime is available.
    fn discard_detached(pool: &Arc<Self>, slot: Slot<M::Connection>) {
        pool.open.fetch_sub(1, Ordering::SeqCst);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = pool.clone();
                handle.spawn(async move { pool.manager.close(slot.conn).await });
            }
            Err(_) => drop(slot),
        }
    }

    async fn open_slot(&self) -> Result<Slot<M::Connection>, PoolError> {
        let conn = self
            .manager
            .connect()
            .await
            .map_err(|e| PoolError::Connect(e.to_string()))?;
        self.open.fetch_add(1, Ordering::SeqCst);
        debug!("New database connection established");
        Ok(Slot {
            conn,
            opened_at: Instant::now(),
        })
    }

    /// Remove idle connections opened at or before `cutoff`.
    fn take_idle_opened_before(&self, cutoff: Instant) -> Vec<Slot<M::Connection>> {
        let mut idle = self.idle.lock();
        let (old, keep): (VecDeque<_>, VecDeque<_>) =
            idle.drain(..).partition(|slot| slot.opened_at <= cutoff);
        *idle = keep;
        old.into()
    }

    /// Return a connection from a dropped guard.
    fn check_in(pool: &Arc<Self>, slot: Slot<M::Connection>) {
        pool.checked_out.fetch_sub(1, Ordering::SeqCst);

        let overflow = pool.open.load(Ordering::SeqCst) > pool.config.size;
        if overflow || pool.is_stale(&slot) || pool.permits.is_closed() {
            Self::discard_detached(pool, slot);
            return;
        }
        pool.idle.lock().push_back(slot);
    }
}

/// Shared handle to a connection pool. Cheap to clone.
pub struct Pool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: ConnectionManager> Pool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.size + config.max_overflow));
        Self {
            inner: Arc::new(PoolInner {
                manager,
                config,
                idle: Mutex::new(VecDeque::new()),
                permits,
                checked_out: AtomicUsize::new(0),
                open: AtomicUsize::new(0),
            }),
        }
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.inner.config.size,
            max_overflow: self.inner.config.max_overflow,
            checked_out: self.inner.checked_out.load(Ordering::SeqCst),
            idle: self.inner.idle.lock().len(),
            open: self.inner.open.load(Ordering::SeqCst),
        }
    }

    /// Check out a live connection.
    ///
    /// Waits up to the configured timeout when every slot is in use.
    pub async fn get(&self) -> Result<PooledConnection<M>, PoolError> {
        let inner = &self.inner;
        let permit = match tokio::time::timeout(
            inner.config.timeout,
            inner.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                warn!(
                    "Pool exhausted: {} connections checked out",
                    inner.checked_out.load(Ordering::SeqCst)
                );
                return Err(PoolError::Timeout(inner.config.timeout));
            }
        };

        let slot = self.acquire_slot().await?;
        inner.checked_out.fetch_add(1, Ordering::SeqCst);

        Ok(PooledConnection {
            pool: inner.clone(),
            slot: Some(slot),
            _permit: permit,
        })
    }

    async fn acquire_slot(&self) -> Result<Slot<M::Connection>, PoolError> {
        let inner = &self.inner;
        let popped = inner.idle.lock().pop_front();

        let Some(slot) = popped else {
            return inner.open_slot().await;
        };

        if inner.is_stale(&slot) {
            debug!("Recycling connection older than {:?}", inner.config.recycle);
            inner.discard(slot).await;
            return inner.open_slot().await;
        }
        if !inner.config.pre_ping {
            return Ok(slot);
        }

        // Closed if this future is dropped mid-ping.
        let mut held = HeldSlot {
            pool: inner.clone(),
            slot: Some(slot),
        };
        let pinged = inner.manager.ping(held.conn_mut()).await;
        match pinged {
            Ok(()) => Ok(held.release()),
            Err(e) => {
                warn!("Pre-ping failed, replacing connection: {e}");
                let slot = held.release();
                let cutoff = slot.opened_at;
                inner.discard(slot).await;
                inner.discard_all(inner.take_idle_opened_before(cutoff)).await;
                inner.open_slot().await
            }
        }
    }

    /// Close idle connections that reached the recycle age.
    pub async fn reap_idle(&self) -> usize {
        let inner = &self.inner;
        let expired: Vec<_> = {
            let mut idle = inner.idle.lock();
            let (expired, keep): (VecDeque<_>, VecDeque<_>) =
                idle.drain(..).partition(|slot| inner.is_stale(slot));
            *idle = keep;
            expired.into()
        };

        let count = expired.len();
        inner.discard_all(expired).await;
        count
    }

    /// Refuse new checkouts and close every idle connection.
    ///
    /// Connections still checked out are closed when they come back.
    pub async fn close(&self) {
        let inner = &self.inner;
        inner.permits.close();
        let drained: Vec<_> = inner.idle.lock().drain(..).collect();
        let count = drained.len();
        inner.discard_all(drained).await;
        info!("Connection pool closed ({count} idle connections released)");
    }
}

#[async_trait]
impl<M: ConnectionManager> ConnectionProbe for Pool<M> {
    async fn check(&self) -> Result<(), PoolError> {
        let mut conn = self.get().await?;
        // `get` already pinged a reused connection.
        if self.inner.config.pre_ping {
            return Ok(());
        }

        let pinged = self.inner.manager.ping(&mut *conn).await;
        if let Err(e) = pinged {
            conn.invalidate();
            return Err(PoolError::Probe(e.to_string()));
        }
        Ok(())
    }
}

/// An idle connection taken off the queue for its pre-ping.
struct HeldSlot<M: ConnectionManager> {
    pool: Arc<PoolInner<M>>,
    slot: Option<Slot<M::Connection>>,
}

impl<M: ConnectionManager> HeldSlot<M> {
    fn conn_mut(&mut self) -> &mut M::Connection {
        match &mut self.slot {
            Some(slot) => &mut slot.conn,
            None => unreachable!("slot used after release"),
        }
    }

    fn release(mut self) -> Slot<M::Connection> {
        match self.slot.take() {
            Some(slot) => slot,
            None => unreachable!("slot released twice"),
        }
    }
}

impl<M: ConnectionManager> Drop for HeldSlot<M> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            PoolInner::discard_detached(&self.pool, slot);
        }
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection<M: ConnectionManager> {
    pool: Arc<PoolInner<M>>,
    slot: Option<Slot<M::Connection>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ConnectionManager> PooledConnection<M> {
    /// Close this connection instead of returning it to the pool.
    pub fn invalidate(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.checked_out.fetch_sub(1, Ordering::SeqCst);
            PoolInner::discard_detached(&self.pool, slot);
        }
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.slot {
            Some(slot) => &slot.conn,
            None => unreachable!("connection used after invalidation"),
        }
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.slot {
            Some(slot) => &mut slot.conn,
            None => unreachable!("connection used after invalidation"),
        }
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            PoolInner::check_in(&self.pool, slot);
        }
    }
}
