use chrono::Utc;
use rusqlite::params;

use super::{Db, DbError, DbTimeline};

impl Db {
    // =========================================================================
    // Timelines (append-only activity log)
    // =========================================================================
    //
    // Rows are inserted and soft-deleted, never updated. There is
    // deliberately no update statement in this module.

    /// Append a timeline row.
    pub fn insert_timeline(&self, entry: &DbTimeline) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO timelines (id, user_id, subject_type, subject_id, client_id,
                                    message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.user_id,
                entry.subject_type,
                entry.subject_id,
                entry.client_id,
                entry.message,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// Activity for one subject within a tenant, newest first.
    pub fn timeline_for_subject(
        &self,
        client_id: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<DbTimeline>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, subject_type, subject_id, client_id, message, created_at
             FROM timelines
             WHERE client_id = ?1 AND subject_type = ?2 AND subject_id = ?3
               AND deleted_at IS NULL
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(
            params![client_id, subject_type, subject_id],
            Self::map_timeline_row,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// A tenant's whole activity feed, newest first, capped at `limit`.
    pub fn client_timeline(&self, client_id: &str, limit: i64) -> Result<Vec<DbTimeline>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, subject_type, subject_id, client_id, message, created_at
             FROM timelines
             WHERE client_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![client_id, limit], Self::map_timeline_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Soft-delete a timeline entry within a tenant. Returns rows touched.
    pub fn soft_delete_timeline(&self, client_id: &str, id: &str) -> Result<usize, DbError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE timelines SET deleted_at = ?1
             WHERE id = ?2 AND client_id = ?3 AND deleted_at IS NULL",
            params![now, id, client_id],
        )?;
        Ok(changed)
    }

    pub(crate) fn map_timeline_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbTimeline> {
        Ok(DbTimeline {
            id: row.get(0)?,
            user_id: row.get(1)?,
            subject_type: row.get(2)?,
            subject_id: row.get(3)?,
            client_id: row.get(4)?,
            message: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}
