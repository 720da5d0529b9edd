//! # Delete Trace Repository
//!
//! Append-only audit of destructive changes. Traces are written on the same
//! transaction as the change they describe and are never updated or removed.

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::{DeleteTrace, TraceAction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerResult};

/// Writes one trace on the caller's transaction.
///
/// `prior` is the full document as it was before the change.
pub async fn record<T: Serialize>(
    conn: &mut SqliteConnection,
    collection: &str,
    document_id: &str,
    action: TraceAction,
    prior: &T,
    actor: &str,
    reason: &str,
) -> LedgerResult<DeleteTrace> {
    let snapshot = serde_json::to_string(prior).map_err(|e| DbError::corrupt(collection, e))?;

    let trace = DeleteTrace {
        id: Uuid::new_v4().to_string(),
        collection: collection.to_string(),
        document_id: document_id.to_string(),
        action,
        snapshot,
        actor: actor.to_string(),
        reason: reason.to_string(),
        created_at: Utc::now(),
    };

    debug!(collection, document_id, ?action, "Recording delete trace");

    sqlx::query(
        r#"
        INSERT INTO delete_traces (
            id, collection, document_id, action, snapshot, actor, reason, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&trace.id)
    .bind(&trace.collection)
    .bind(&trace.document_id)
    .bind(trace.action)
    .bind(&trace.snapshot)
    .bind(&trace.actor)
    .bind(&trace.reason)
    .bind(trace.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(trace)
}

/// Read access to delete traces.
#[derive(Debug, Clone)]
pub struct TraceRepository {
    pool: SqlitePool,
}

impl TraceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TraceRepository { pool }
    }

    /// Every trace for one document, oldest first.
    pub async fn list_for_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> DbResult<Vec<DeleteTrace>> {
        let traces = sqlx::query_as::<_, DeleteTrace>(
            r#"
            SELECT id, collection, document_id, action, snapshot, actor, reason, created_at
            FROM delete_traces
            WHERE collection = ?1 AND document_id = ?2
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(collection)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(traces)
    }

    /// Most recent traces across all collections.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<DeleteTrace>> {
        let traces = sqlx::query_as::<_, DeleteTrace>(
            r#"
            SELECT id, collection, document_id, action, snapshot, actor, reason, created_at
            FROM delete_traces
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(traces)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM delete_traces")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
