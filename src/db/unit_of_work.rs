use futures::future::BoxFuture;
use sqlx::{pool::PoolConnection, Sqlite, SqliteConnection};
use std::time::Duration;

use crate::error::SyncError;

/// Bounded retry policy for whole units of work
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
        }
    }
}

/// UnitOfWork owns one pooled connection for the duration of a request and
/// tracks transaction nesting on it. Nested `begin` calls become savepoints.
///
/// A top-level transaction is opened with `BEGIN IMMEDIATE` so the write lock
/// is taken before any row is read; contention surfaces as SQLITE_BUSY once
/// the connection busy timeout elapses and is classified as transient.
pub struct UnitOfWork {
    // Only taken in `Drop`
    conn: Option<PoolConnection<Sqlite>>,
    in_transaction: bool,
    savepoints: u32,
}

impl UnitOfWork {
    pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
        Self {
            conn: Some(conn),
            in_transaction: false,
            savepoints: 0,
        }
    }

    /// Connection for statements issued inside the unit of work
    pub fn conn(&mut self) -> &mut SqliteConnection {
        self.conn
            .as_deref_mut()
            .expect("connection is held until the unit of work is dropped")
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Current savepoint nesting depth (0 when only the outer transaction is open)
    pub fn depth(&self) -> u32 {
        self.savepoints
    }

    pub async fn begin(&mut self) -> Result<(), SyncError> {
        if !self.in_transaction {
            sqlx::query("BEGIN IMMEDIATE").execute(self.conn()).await?;
            self.in_transaction = true;
            self.savepoints = 0;
            return Ok(());
        }

        let name = savepoint_name(self.savepoints + 1);
        sqlx::query(&format!("SAVEPOINT {}", name))
            .execute(self.conn())
            .await?;
        self.savepoints += 1;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), SyncError> {
        if self.savepoints > 0 {
            let name = savepoint_name(self.savepoints);
            sqlx::query(&format!("RELEASE SAVEPOINT {}", name))
                .execute(self.conn())
                .await?;
            self.savepoints -= 1;
            return Ok(());
        }

        if self.in_transaction {
            sqlx::query("COMMIT").execute(self.conn()).await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), SyncError> {
        if self.savepoints > 0 {
            let name = savepoint_name(self.savepoints);
            // ROLLBACK TO leaves the savepoint on the stack, so release it as well
            sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", name))
                .execute(self.conn())
                .await?;
            sqlx::query(&format!("RELEASE SAVEPOINT {}", name))
                .execute(self.conn())
                .await?;
            self.savepoints -= 1;
            return Ok(());
        }

        if self.in_transaction {
            match sqlx::query("ROLLBACK").execute(self.conn()).await {
                Ok(_) => self.in_transaction = false,
                Err(e) => {
                    let err = SyncError::from(e);
                    // SQLite may already have aborted the transaction on its own.
                    // Any other failure leaves it open, so keep the flag for Drop.
                    if transaction_already_closed(&err) {
                        self.in_transaction = false;
                    } else {
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Roll back after a failed attempt. If the rollback itself fails the
    /// connection is unusable, so the attempt error becomes fatal.
    async fn rollback_after(&mut self, cause: SyncError) -> SyncError {
        match self.rollback().await {
            Ok(()) => cause,
            Err(e) => {
                tracing::warn!("Rollback failed: {}", e);
                SyncError::Fatal(format!("rollback failed ({}) after: {}", e, cause))
            }
        }
    }

    /// Run `op` inside begin/commit, re-running the whole operation when it
    /// fails with a retryable error. Each attempt starts from a fresh
    /// transaction, so everything `op` read on a failed attempt is discarded.
    pub async fn run_with_retry<T, F>(
        &mut self,
        policy: RetryPolicy,
        mut op: F,
    ) -> Result<T, SyncError>
    where
        T: Send,
        F: FnMut(&mut UnitOfWork) -> BoxFuture<'_, Result<T, SyncError>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut delay = policy.initial_delay;
        let mut attempt = 1;

        loop {
            match self.run_once(&mut op).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(attempts = attempt, "Unit of work failed, retries exhausted: {}", e);
                    return Err(SyncError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying unit of work after {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    async fn run_once<T, F>(&mut self, op: &mut F) -> Result<T, SyncError>
    where
        T: Send,
        F: FnMut(&mut UnitOfWork) -> BoxFuture<'_, Result<T, SyncError>>,
    {
        self.begin().await?;

        let result = op(self).await;
        match result {
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(e) => Err(self.rollback_after(e).await),
            },
            Err(e) => Err(self.rollback_after(e).await),
        }
    }
}

impl Drop for UnitOfWork {
    // A cancelled request can drop the unit of work mid-transaction. Detach the
    // connection so it is closed (rolling the transaction back) instead of
    // returning to the pool with the write lock held.
    fn drop(&mut self) {
        if self.in_transaction {
            tracing::warn!("Unit of work dropped inside a transaction, closing connection");
            if let Some(conn) = self.conn.take() {
                drop(conn.detach());
            }
        }
    }
}

fn transaction_already_closed(err: &SyncError) -> bool {
    err.to_string().contains("no transaction is active")
}

fn savepoint_name(depth: u32) -> String {
    format!("sp_{}", depth)
}
