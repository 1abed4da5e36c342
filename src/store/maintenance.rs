//! Background pool maintenance.
//!
//! Idle connections are normally recycled lazily at checkout. This loop also
//! closes the ones nobody asks for, so a quiet service does not hold sockets
//! the database (or a pooler in front of it) already gave up on.

use std::time::Duration;
use tracing::{debug, info};

use super::pool::{ConnectionManager, Pool};

/// Start the maintenance loop. Runs until the task is dropped.
pub async fn maintenance_daemon<M: ConnectionManager>(pool: Pool<M>, interval: Duration) {
    info!("Pool maintenance started (interval: {interval:?})");

    loop {
        tokio::time::sleep(interval).await;
        maintenance_cycle(&pool).await;
    }
}

async fn maintenance_cycle<M: ConnectionManager>(pool: &Pool<M>) {
    let reaped = pool.reap_idle().await;
    let status = pool.status();

    if reaped > 0 {
        info!("Recycled {reaped} idle connections");
    }
    debug!(
        "Pool status: {} open, {} idle, {} checked out",
        status.open, status.idle, status.checked_out
    );
}
