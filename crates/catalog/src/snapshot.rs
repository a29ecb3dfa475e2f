use crate::error::{CatalogError, Result};
use sqlx::{PgPool, Postgres, Transaction};

/// CatalogConnection binds every worker's probe queries to one shared,
/// serializable, read-only distributed snapshot, per §4.A's isolation
/// contract: "all probes of one backup run observe a single consistent
/// snapshot." `Clone` is cheap: `PgPool` is an `Arc` handle to the
/// underlying connection pool.
#[derive(Clone)]
pub struct CatalogConnection {
    pool: PgPool,
}

/// A snapshot identifier exported by the first worker connection and
/// imported by every other. Opaque to us; we only round-trip it through
/// Postgres's own `pg_export_snapshot()` / `SET TRANSACTION SNAPSHOT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotId(pub String);

impl CatalogConnection {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens the first worker's serializable read-only transaction and
    /// exports its snapshot id, so subsequent probe workers can bind to the
    /// identical point-in-time view. Returns `SnapshotUnavailable` if the
    /// database refuses (no replication identity, read-only standby without
    /// export support, etc).
    pub async fn open_and_export_snapshot(
        &self,
    ) -> Result<(Transaction<'_, Postgres>, SnapshotId)> {
        let mut txn = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY, DEFERRABLE")
            .execute(&mut *txn)
            .await?;

        let (id,): (String,) = sqlx::query_as("SELECT pg_export_snapshot()")
            .fetch_one(&mut *txn)
            .await
            .map_err(|e| CatalogError::SnapshotUnavailable(e.to_string()))?;

        Ok((txn, SnapshotId(id)))
    }

    /// Executes a blob of already-rendered DDL statements (as produced by
    /// `gpbackup_ddl::emit_into`, newline-terminated after each `;`)
    /// against the pool, one statement at a time. Used by the restore
    /// driver to replay a TOC entry's byte range.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        for statement in sql.split(";\n").map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Cancels every backend this pool has open, per §4.F's ABORTING
    /// transition: "closes database connections with `pg_cancel_backend`."
    pub async fn cancel_all_backends(&self) -> Result<()> {
        sqlx::query(
            "select pg_cancel_backend(pid) from pg_stat_activity \
             where pid <> pg_backend_pid() and datname = current_database()",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Opens an additional worker transaction bound to a previously
    /// exported snapshot.
    pub async fn open_with_snapshot(
        &self,
        snapshot: &SnapshotId,
    ) -> Result<Transaction<'_, Postgres>> {
        let mut txn = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY")
            .execute(&mut *txn)
            .await?;
        // `SET TRANSACTION SNAPSHOT` takes a literal, not a bind parameter;
        // the id itself is a Postgres-generated token, never user input.
        let stmt = format!("SET TRANSACTION SNAPSHOT '{}'", snapshot.0);
        sqlx::query(&stmt)
            .execute(&mut *txn)
            .await
            .map_err(|e| CatalogError::SnapshotUnavailable(e.to_string()))?;
        Ok(txn)
    }
}
