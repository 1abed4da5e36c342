//! Database access: a bounded PostgreSQL connection pool.

pub mod maintenance;
pub mod pool;
pub mod postgres;

pub use maintenance::maintenance_daemon;
pub use pool::{
    ConnectionManager, ConnectionProbe, Pool, PoolConfig, PoolError, PoolStatus, PooledConnection,
};
pub use postgres::{PgManager, PgPool};
