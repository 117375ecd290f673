use chrono::Utc;
use rusqlite::params;

use super::{Db, DbAlert, DbError, DbUserAlert};

impl Db {
    // =========================================================================
    // Alerts
    // =========================================================================

    /// Insert an alert row. Recipients are attached separately.
    pub fn insert_alert(&self, alert: &DbAlert) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO alerts (id, client_id, task_id, author_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                alert.id,
                alert.client_id,
                alert.task_id,
                alert.author_id,
                alert.message,
                alert.created_at,
            ],
        )?;
        Ok(())
    }

    /// Attach a recipient to an alert with unread state.
    pub fn insert_alert_recipient(&self, alert_id: &str, user_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO alert_recipients (alert_id, user_id, is_read, read_at)
             VALUES (?1, ?2, 0, NULL)",
            params![alert_id, user_id],
        )?;
        Ok(())
    }

    /// Look up an alert scoped to a tenant.
    pub fn get_client_alert(&self, client_id: &str, id: &str) -> Result<Option<DbAlert>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, task_id, author_id, message, created_at
             FROM alerts WHERE id = ?1 AND client_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![id, client_id], |row| {
            Ok(DbAlert {
                id: row.get(0)?,
                client_id: row.get(1)?,
                task_id: row.get(2)?,
                author_id: row.get(3)?,
                message: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All alerts addressed to a user within their tenant.
    ///
    /// Unread entries come first, newest created first; read entries follow,
    /// most recently read first.
    pub fn user_alerts(&self, client_id: &str, user_id: &str) -> Result<Vec<DbUserAlert>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.task_id, t.name, a.author_id, au.name, a.message,
                    a.created_at, r.is_read, r.read_at
             FROM alert_recipients r
             JOIN alerts a ON r.alert_id = a.id
             JOIN tasks t ON a.task_id = t.id
             JOIN users au ON a.author_id = au.id
             WHERE r.user_id = ?1 AND a.client_id = ?2
             ORDER BY
               r.is_read ASC,
               CASE WHEN r.is_read = 0 THEN a.created_at ELSE '' END DESC,
               r.read_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id, client_id], |row| {
            Ok(DbUserAlert {
                alert_id: row.get(0)?,
                task_id: row.get(1)?,
                task_name: row.get(2)?,
                author_id: row.get(3)?,
                author_name: row.get(4)?,
                message: row.get(5)?,
                created_at: row.get(6)?,
                is_read: row.get(7)?,
                read_at: row.get(8)?,
            })
        })?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    /// Mark one of the user's alerts as read. Returns rows touched: 0 when
    /// the alert is outside the user's visible set or already read.
    pub fn mark_alert_read(&self, user_id: &str, alert_id: &str) -> Result<usize, DbError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE alert_recipients SET is_read = 1, read_at = ?1
             WHERE alert_id = ?2 AND user_id = ?3 AND is_read = 0",
            params![now, alert_id, user_id],
        )?;
        Ok(changed)
    }

    /// Mark one of the user's alerts as unread, clearing `read_at`.
    pub fn mark_alert_unread(&self, user_id: &str, alert_id: &str) -> Result<usize, DbError> {
        let changed = self.conn.execute(
            "UPDATE alert_recipients SET is_read = 0, read_at = NULL
             WHERE alert_id = ?1 AND user_id = ?2 AND is_read = 1",
            params![alert_id, user_id],
        )?;
        Ok(changed)
    }

    /// Mark all of the user's unread alerts as read. Returns rows touched.
    pub fn mark_all_alerts_read(&self, user_id: &str) -> Result<usize, DbError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE alert_recipients SET is_read = 1, read_at = ?1
             WHERE user_id = ?2 AND is_read = 0",
            params![now, user_id],
        )?;
        Ok(changed)
    }

    /// Count of unread alerts addressed to the user.
    pub fn unread_alert_count(&self, user_id: &str) -> Result<i64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM alert_recipients WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
