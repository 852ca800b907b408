use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{MarketError, Result};

/// Database manager owning the connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the pool and, when enabled, run the embedded migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its connection.
        let max_connections = if in_memory { 1 } else { config.max_connections.max(1) };
        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            pool_options = pool_options
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        info!(url = %config.url, max_connections, "Connecting to database");
        let pool = pool_options.connect_with(options).await?;
        let database = Self { pool };

        if config.auto_migrate {
            database.migrate().await?;
        }

        Ok(database)
    }

    /// Run the embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get database pool for queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Handle that runs every statement on its own pooled connection
    pub fn handle(&self) -> DbHandle {
        DbHandle::Pool(self.pool.clone())
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

type AfterCommit = Box<dyn FnOnce() + Send>;

struct TxInner {
    tx: Arc<Mutex<Transaction<'static, Sqlite>>>,
    after_commit: StdMutex<Vec<AfterCommit>>,
}

/// Shared handle to one open transaction.
///
/// Stores built on a `TxHandle` run all statements on the transaction's
/// connection, one at a time. Work registered with `after_commit` runs only
/// if the transaction commits.
#[derive(Clone)]
pub struct TxHandle {
    inner: Arc<TxInner>,
}

impl std::fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle")
            .field("references", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl TxHandle {
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            inner: Arc::new(TxInner {
                tx: Arc::new(Mutex::new(tx)),
                after_commit: StdMutex::new(Vec::new()),
            }),
        })
    }

    fn defer(&self, action: AfterCommit) {
        self.inner
            .after_commit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }

    /// Commit, then run the deferred post-commit actions in registration order
    pub async fn commit(self) -> Result<()> {
        let inner = Arc::try_unwrap(self.inner).map_err(|_| MarketError::TransactionInUse)?;
        let tx = Arc::try_unwrap(inner.tx)
            .map_err(|_| MarketError::TransactionInUse)?
            .into_inner();
        tx.commit().await?;

        let actions = inner
            .after_commit
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(deferred = actions.len(), "Transaction committed");
        for action in actions {
            action();
        }
        Ok(())
    }

    /// Roll back and discard deferred actions
    pub async fn rollback(self) -> Result<()> {
        match Arc::try_unwrap(self.inner).map(|inner| Arc::try_unwrap(inner.tx)) {
            Ok(Ok(tx)) => {
                tx.into_inner().rollback().await?;
                debug!("Transaction rolled back");
                Ok(())
            }
            _ => {
                // The last remaining handle rolls back when it is dropped.
                warn!("Transaction handle still referenced during rollback");
                Err(MarketError::TransactionInUse)
            }
        }
    }
}

/// Where a store sends its statements
#[derive(Debug, Clone)]
pub enum DbHandle {
    Pool(SqlitePool),
    Tx(TxHandle),
}

impl DbHandle {
    /// Borrow a connection: a fresh pooled one, or exclusive use of the
    /// transaction's connection until the guard is dropped.
    pub async fn acquire(&self) -> Result<Conn> {
        match self {
            DbHandle::Pool(pool) => Ok(Conn::Pool(pool.acquire().await?)),
            DbHandle::Tx(handle) => Ok(Conn::Tx(handle.inner.tx.clone().lock_owned().await)),
        }
    }

    /// Run `action` once the data written through this handle is durable:
    /// immediately for pool handles, after commit for transaction handles.
    pub fn after_commit<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            DbHandle::Pool(_) => action(),
            DbHandle::Tx(handle) => handle.defer(Box::new(action)),
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, DbHandle::Tx(_))
    }
}

/// Connection guard returned by `DbHandle::acquire`
pub enum Conn {
    Pool(PoolConnection<Sqlite>),
    Tx(OwnedMutexGuard<Transaction<'static, Sqlite>>),
}

impl Deref for Conn {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            Conn::Pool(conn) => &**conn,
            Conn::Tx(tx) => &***tx,
        }
    }
}

impl DerefMut for Conn {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Conn::Pool(conn) => &mut **conn,
            Conn::Tx(tx) => &mut ***tx,
        }
    }
}
