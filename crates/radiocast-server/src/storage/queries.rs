//! Call and pending-release queries for the Radiocast server.

use radiocast_core::db::unix_millis;

use super::db::Database;
use super::models::{CallRow, NewCall, PendingRelease};
use super::DatabaseError;

impl Database {
    // =========================================================================
    // Call queries
    // =========================================================================

    /// Persist an ingested call and return its storage identity.
    pub async fn insert_call(&self, call: &NewCall) -> Result<i64, DatabaseError> {
        let units = serde_json::to_string(&call.units).unwrap_or_else(|_| "[]".to_string());
        let patches = serde_json::to_string(&call.patches).unwrap_or_else(|_| "[]".to_string());

        #[allow(clippy::cast_possible_wrap)]
        let result = sqlx::query(
            "INSERT INTO calls (system_ref, talkgroup_ref, timestamp_ms, audio, audio_mime, frequency, units, patches, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(i64::from(call.system_ref))
        .bind(i64::from(call.talkgroup_ref))
        .bind(call.timestamp_ms)
        .bind(&call.audio)
        .bind(&call.audio_mime)
        .bind(call.frequency.map(|f| f as i64))
        .bind(units)
        .bind(patches)
        .bind(unix_millis())
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch a call by its storage identity.
    pub async fn get_call(&self, id: i64) -> Result<Option<CallRow>, DatabaseError> {
        let row = sqlx::query_as::<_, CallRow>("SELECT * FROM calls WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    /// List calls, newest first, optionally filtered by system and
    /// talkgroup references.
    pub async fn search_calls(
        &self,
        system_ref: Option<u32>,
        talkgroup_ref: Option<u32>,
        limit: i64,
    ) -> Result<Vec<CallRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, CallRow>(
            "SELECT * FROM calls \
             WHERE (?1 IS NULL OR system_ref = ?1) \
               AND (?2 IS NULL OR talkgroup_ref = ?2) \
             ORDER BY timestamp_ms DESC LIMIT ?3",
        )
        .bind(system_ref.map(i64::from))
        .bind(talkgroup_ref.map(i64::from))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Pending delayed release queries (delayer use only)
    // =========================================================================

    /// Record that a release timer is armed for the call.
    pub async fn push_pending(&self, call_id: i64, release_at_ms: i64) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR REPLACE INTO delayed_calls (call_id, release_at_ms) VALUES (?, ?)")
            .bind(call_id)
            .bind(release_at_ms)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Remove the pending row once the call's timer has fired. Returns
    /// whether a row existed.
    pub async fn pop_pending(&self, call_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM delayed_calls WHERE call_id = ?")
            .bind(call_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether the call is still held back by a compliance delay.
    pub async fn is_pending(&self, call_id: i64) -> Result<bool, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM delayed_calls WHERE call_id = ?")
                .bind(call_id)
                .fetch_one(self.pool())
                .await?;

        Ok(row.0 > 0)
    }

    /// Load every pending release and clear the table in one step.
    /// Used only by the delayer's startup replay.
    pub async fn take_all_pending(&self) -> Result<Vec<PendingRelease>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let rows = sqlx::query_as::<_, PendingRelease>(
            "SELECT call_id, release_at_ms FROM delayed_calls ORDER BY release_at_ms ASC",
        )
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM delayed_calls").execute(&mut *tx).await?;

        tx.commit().await?;

        Ok(rows)
    }

    /// The armed release timestamp for a call, if any.
    pub async fn pending_release_at(&self, call_id: i64) -> Result<Option<i64>, DatabaseError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT release_at_ms FROM delayed_calls WHERE call_id = ?")
                .bind(call_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(|(ts,)| ts))
    }

    /// Count of pending delayed releases.
    pub async fn pending_count(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM delayed_calls")
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}
