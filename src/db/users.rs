use chrono::Utc;
use rusqlite::params;

use super::{Db, DbError, DbUser};

const USER_COLUMNS: &str = "u.id, u.client_id, u.role_id, u.name, u.email,
            u.created_at, u.updated_at, r.name AS role_name";

impl Db {
    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user row.
    pub fn insert_user(&self, user: &DbUser) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO users (id, client_id, role_id, name, email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.client_id,
                user.role_id,
                user.name,
                user.email,
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a user's mutable fields (name, email, role).
    pub fn update_user(&self, user: &DbUser) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE users SET name = ?1, email = ?2, role_id = ?3, updated_at = ?4
             WHERE id = ?5 AND deleted_at IS NULL",
            params![user.name, user.email, user.role_id, now, user.id],
        )?;
        Ok(())
    }

    /// Look up a single user by ID, including the joined role name.
    /// Soft-deleted users are not returned.
    pub fn get_user(&self, id: &str) -> Result<Option<DbUser>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS}
             FROM users u
             JOIN roles r ON u.role_id = r.id
             WHERE u.id = ?1 AND u.deleted_at IS NULL"
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_user_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Look up a user scoped to a tenant. Returns None for cross-tenant IDs.
    pub fn get_client_user(&self, client_id: &str, id: &str) -> Result<Option<DbUser>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS}
             FROM users u
             JOIN roles r ON u.role_id = r.id
             WHERE u.id = ?1 AND u.client_id = ?2 AND u.deleted_at IS NULL"
        ))?;
        let mut rows = stmt.query_map(params![id, client_id], Self::map_user_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List all active users of a tenant, newest first.
    pub fn list_client_users(&self, client_id: &str) -> Result<Vec<DbUser>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS}
             FROM users u
             JOIN roles r ON u.role_id = r.id
             WHERE u.client_id = ?1 AND u.deleted_at IS NULL
             ORDER BY u.created_at DESC"
        ))?;
        let rows = stmt.query_map(params![client_id], Self::map_user_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Count active users of a tenant matching the given ID set.
    /// Used for referential validation of submitted membership IDs.
    pub fn count_client_users_in(&self, client_id: &str, ids: &[String]) -> Result<usize, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM users
             WHERE client_id = ?1 AND deleted_at IS NULL AND id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&client_id];
        for id in ids {
            values.push(id);
        }
        let count: usize = stmt.query_row(values.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Check whether an email is already taken by an active user.
    /// `exclude_id` skips the user being updated.
    pub fn email_taken(&self, email: &str, exclude_id: Option<&str>) -> Result<bool, DbError> {
        let taken: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM users
                 WHERE email = ?1 AND deleted_at IS NULL
                   AND (?2 IS NULL OR id != ?2)
                 LIMIT 1",
                params![email, exclude_id],
                |_row| Ok(true),
            )
            .unwrap_or(false);
        Ok(taken)
    }

    /// Soft-delete a user.
    pub fn soft_delete_user(&self, id: &str) -> Result<usize, DbError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE users SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        Ok(changed)
    }

    pub(crate) fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbUser> {
        Ok(DbUser {
            id: row.get(0)?,
            client_id: row.get(1)?,
            role_id: row.get(2)?,
            name: row.get(3)?,
            email: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            role_name: row.get(7)?,
        })
    }
}
