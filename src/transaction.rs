//! Runs a unit of work against transaction-bound stores.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sqlx::SqlitePool;
use tracing::{debug, error, warn};

use crate::cache::Caches;
use crate::clock::Clock;
use crate::database::{DbHandle, TxHandle};
use crate::error::{MarketError, Result};
use crate::store::{BidStore, TenderStore};

/// Stores bound to one open transaction.
///
/// Shares the process-wide caches; ids created through these stores become
/// visible in the caches only once the transaction commits.
#[derive(Debug)]
pub struct DecisionTx {
    pub bids: BidStore,
    pub tenders: TenderStore,
}

#[derive(Clone)]
pub struct TxManager {
    pool: SqlitePool,
    caches: Caches,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for TxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxManager")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TxManager {
    pub fn new(pool: SqlitePool, caches: Caches, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            caches,
            clock,
            timeout: None,
        }
    }

    /// Roll back and fail with `DeadlineExceeded` when the work outlasts `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `work` inside one transaction.
    ///
    /// `Ok` commits; `Err` rolls back and is returned unchanged; a panic rolls
    /// back and resumes unwinding. The stores handed to `work` must not
    /// outlive it, otherwise the commit fails with `TransactionInUse` and the
    /// transaction is rolled back when the last handle drops.
    pub async fn decision_transaction<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(DecisionTx) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = TxHandle::begin(&self.pool).await?;
        let db = DbHandle::Tx(handle.clone());
        let scope = DecisionTx {
            bids: BidStore::new(db.clone(), &self.caches, self.clock.clone()),
            tenders: TenderStore::new(db, &self.caches, self.clock.clone()),
        };

        let guarded = AssertUnwindSafe(async move { work(scope).await }).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    warn!(timeout_ms, "Decision transaction deadline exceeded, rolling back");
                    Self::discard(handle).await;
                    return Err(MarketError::DeadlineExceeded {
                        operation: "decision_transaction".to_string(),
                        timeout_ms,
                    });
                }
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(value)) => {
                handle.commit().await?;
                debug!("Decision transaction committed");
                Ok(value)
            }
            Ok(Err(err)) => {
                debug!(error = %err, "Decision transaction failed, rolling back");
                Self::discard(handle).await;
                Err(err)
            }
            Err(payload) => {
                error!("Panic inside decision transaction, rolling back");
                Self::discard(handle).await;
                panic::resume_unwind(payload)
            }
        }
    }

    async fn discard(handle: TxHandle) {
        if let Err(err) = handle.rollback().await {
            warn!(error = %err, "Rollback failed");
        }
    }
}
