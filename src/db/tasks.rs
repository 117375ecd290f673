use chrono::Utc;
use rusqlite::params;

use super::{Db, DbError, DbMembership, DbTask};

impl Db {
    // =========================================================================
    // Tasks
    // =========================================================================

    /// Insert a task row.
    pub fn insert_task(&self, task: &DbTask) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO tasks (id, client_id, name, description, status, priority,
                                due_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.id,
                task.client_id,
                task.name,
                task.description,
                task.status,
                task.priority,
                task.due_date,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a task's mutable fields.
    pub fn update_task(&self, task: &DbTask) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE tasks SET name = ?1, description = ?2, status = ?3, priority = ?4,
                              due_date = ?5, updated_at = ?6
             WHERE id = ?7 AND deleted_at IS NULL",
            params![
                task.name,
                task.description,
                task.status,
                task.priority,
                task.due_date,
                now,
                task.id,
            ],
        )?;
        Ok(())
    }

    /// Look up a task regardless of tenant. Callers must run the tenant
    /// check on the returned row before using it.
    pub fn get_task(&self, id: &str) -> Result<Option<DbTask>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, name, description, status, priority, due_date,
                    created_at, updated_at
             FROM tasks
             WHERE id = ?1 AND deleted_at IS NULL",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_task_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Look up a task scoped to a tenant. Returns None for cross-tenant IDs
    /// and soft-deleted rows.
    pub fn get_client_task(&self, client_id: &str, id: &str) -> Result<Option<DbTask>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, name, description, status, priority, due_date,
                    created_at, updated_at
             FROM tasks
             WHERE id = ?1 AND client_id = ?2 AND deleted_at IS NULL",
        )?;
        let mut rows = stmt.query_map(params![id, client_id], Self::map_task_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List a tenant's active tasks, optionally filtered by status.
    /// Ordered by due date (NULLs last), then newest first.
    pub fn list_client_tasks(
        &self,
        client_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<DbTask>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, name, description, status, priority, due_date,
                    created_at, updated_at
             FROM tasks
             WHERE client_id = ?1
               AND deleted_at IS NULL
               AND (?2 IS NULL OR status = ?2)
             ORDER BY
               CASE WHEN due_date IS NULL THEN 1 ELSE 0 END,
               due_date ASC,
               created_at DESC",
        )?;
        let rows = stmt.query_map(params![client_id, status], Self::map_task_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// A tenant's active tasks due strictly before `today` (`YYYY-MM-DD`)
    /// and not yet completed, most overdue first.
    pub fn list_overdue_tasks(&self, client_id: &str, today: &str) -> Result<Vec<DbTask>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, name, description, status, priority, due_date,
                    created_at, updated_at
             FROM tasks
             WHERE client_id = ?1
               AND deleted_at IS NULL
               AND status != 'completed'
               AND due_date IS NOT NULL
               AND due_date < ?2
             ORDER BY due_date ASC",
        )?;
        let rows = stmt.query_map(params![client_id, today], Self::map_task_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Soft-delete a task. Returns the number of rows touched (0 or 1).
    pub fn soft_delete_task(&self, id: &str) -> Result<usize, DbError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE tasks SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        Ok(changed)
    }

    /// Count active tasks of a tenant matching the given ID set.
    pub fn count_client_tasks_in(&self, client_id: &str, ids: &[String]) -> Result<usize, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM tasks
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

    // =========================================================================
    // Membership sync (task ↔ users, task ↔ meetings)
    // =========================================================================

    /// Replace a task's user membership with exactly `user_ids`.
    ///
    /// IDs retained across the call keep their original attachment
    /// timestamp; removed IDs are detached; new IDs get a fresh row.
    pub fn sync_task_users(&self, task_id: &str, user_ids: &[String]) -> Result<(), DbError> {
        self.sync_join_table("task_users", "task_id", "user_id", task_id, user_ids)
    }

    /// Replace a task's meeting membership with exactly `meeting_ids`.
    pub fn sync_task_meetings(&self, task_id: &str, meeting_ids: &[String]) -> Result<(), DbError> {
        self.sync_join_table("task_meetings", "task_id", "meeting_id", task_id, meeting_ids)
    }

    /// A task's assigned user IDs with attachment timestamps, oldest first.
    pub fn task_user_memberships(&self, task_id: &str) -> Result<Vec<DbMembership>, DbError> {
        self.join_table_memberships("task_users", "task_id", "user_id", task_id)
    }

    /// A task's linked meeting IDs with attachment timestamps, oldest first.
    pub fn task_meeting_memberships(&self, task_id: &str) -> Result<Vec<DbMembership>, DbError> {
        self.join_table_memberships("task_meetings", "task_id", "meeting_id", task_id)
    }

    /// Whether a user is currently assigned to a task.
    pub fn user_assigned_to_task(&self, task_id: &str, user_id: &str) -> Result<bool, DbError> {
        let assigned: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM task_users WHERE task_id = ?1 AND user_id = ?2 LIMIT 1",
                params![task_id, user_id],
                |_row| Ok(true),
            )
            .unwrap_or(false);
        Ok(assigned)
    }

    /// Generic sync over a two-column join table. `owner_col = owner_id`
    /// rows not in `member_ids` are deleted; new members are inserted with
    /// the current timestamp; shared members are left untouched.
    ///
    /// Table and column names come from a fixed set of callers, never from
    /// user input.
    pub(crate) fn sync_join_table(
        &self,
        table: &str,
        owner_col: &str,
        member_col: &str,
        owner_id: &str,
        member_ids: &[String],
    ) -> Result<(), DbError> {
        if member_ids.is_empty() {
            self.conn.execute(
                &format!("DELETE FROM {table} WHERE {owner_col} = ?1"),
                params![owner_id],
            )?;
            return Ok(());
        }

        let placeholders = vec!["?"; member_ids.len()].join(", ");
        let delete_sql = format!(
            "DELETE FROM {table}
             WHERE {owner_col} = ?1 AND {member_col} NOT IN ({placeholders})"
        );
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&owner_id];
        for id in member_ids {
            values.push(id);
        }
        self.conn.execute(&delete_sql, values.as_slice())?;

        let now = Utc::now().to_rfc3339();
        let insert_sql = format!(
            "INSERT OR IGNORE INTO {table} ({owner_col}, {member_col}, created_at)
             VALUES (?1, ?2, ?3)"
        );
        let mut stmt = self.conn.prepare(&insert_sql)?;
        for id in member_ids {
            stmt.execute(params![owner_id, id, now])?;
        }
        Ok(())
    }

    pub(crate) fn join_table_memberships(
        &self,
        table: &str,
        owner_col: &str,
        member_col: &str,
        owner_id: &str,
    ) -> Result<Vec<DbMembership>, DbError> {
        let sql = format!(
            "SELECT {member_col}, created_at FROM {table}
             WHERE {owner_col} = ?1
             ORDER BY created_at ASC, {member_col} ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(DbMembership {
                id: row.get(0)?,
                created_at: row.get(1)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    pub(crate) fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbTask> {
        Ok(DbTask {
            id: row.get(0)?,
            client_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            due_date: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::{seed_task, seed_user, test_db};

    #[test]
    fn test_task_tenant_scoping() {
        let db = test_db();
        let acme = db.create_client("Acme").expect("client");
        let globex = db.create_client("Globex").expect("client");
        let task = seed_task(&db, &acme, "Fix roof");

        assert!(db.get_client_task(&acme, &task.id).expect("q").is_some());
        assert!(db.get_client_task(&globex, &task.id).expect("q").is_none());
        assert_eq!(db.list_client_tasks(&globex, None).expect("list").len(), 0);
    }

    #[test]
    fn test_list_filters_by_status() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let mut task = seed_task(&db, &client, "One");
        task.status = "completed".to_string();
        db.update_task(&task).expect("update");
        seed_task(&db, &client, "Two");

        let pending = db
            .list_client_tasks(&client, Some("pending"))
            .expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "Two");

        let all = db.list_client_tasks(&client, None).expect("list");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_overdue_excludes_completed_and_undated() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let mut late = seed_task(&db, &client, "Late");
        late.due_date = Some("2026-08-01".to_string());
        db.update_task(&late).expect("update");
        let mut done = seed_task(&db, &client, "Done");
        done.due_date = Some("2026-08-01".to_string());
        done.status = "completed".to_string();
        db.update_task(&done).expect("update");
        seed_task(&db, &client, "Undated");

        let overdue = db.list_overdue_tasks(&client, "2026-08-29").expect("list");
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].name, "Late");
    }

    #[test]
    fn test_soft_delete_hides_task() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let task = seed_task(&db, &client, "Ephemeral");

        assert_eq!(db.soft_delete_task(&task.id).expect("delete"), 1);
        assert!(db.get_client_task(&client, &task.id).expect("q").is_none());
        assert_eq!(db.soft_delete_task(&task.id).expect("again"), 0);
    }

    #[test]
    fn test_sync_replaces_membership_preserving_shared_timestamps() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let task = seed_task(&db, &client, "Shared work");
        let ids: Vec<String> = (1..=4)
            .map(|n| seed_user(&db, &client, &format!("u{n}@acme.test"), "Member").id)
            .collect();

        db.sync_task_users(&task.id, &ids[0..3].to_vec())
            .expect("first sync");
        let before = db.task_user_memberships(&task.id).expect("members");
        assert_eq!(before.len(), 3);
        let kept_ts: Vec<_> = before
            .iter()
            .filter(|m| m.id == ids[1] || m.id == ids[2])
            .map(|m| m.created_at.clone())
            .collect();

        db.sync_task_users(&task.id, &ids[1..4].to_vec())
            .expect("second sync");
        let after = db.task_user_memberships(&task.id).expect("members");

        let member_ids: Vec<&str> = after.iter().map(|m| m.id.as_str()).collect();
        assert!(member_ids.contains(&ids[1].as_str()));
        assert!(member_ids.contains(&ids[2].as_str()));
        assert!(member_ids.contains(&ids[3].as_str()));
        assert!(!member_ids.contains(&ids[0].as_str()));
        assert_eq!(after.len(), 3);

        // Shared members keep their original attachment timestamps
        for m in &after {
            if m.id == ids[1] || m.id == ids[2] {
                assert!(kept_ts.contains(&m.created_at));
            }
        }
    }

    #[test]
    fn test_sync_with_empty_set_detaches_all() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let task = seed_task(&db, &client, "Solo");
        let user = seed_user(&db, &client, "solo@acme.test", "Member");

        db.sync_task_users(&task.id, &[user.id.clone()]).expect("sync");
        db.sync_task_users(&task.id, &[]).expect("clear");
        assert_eq!(db.task_user_memberships(&task.id).expect("members").len(), 0);
        assert!(!db.user_assigned_to_task(&task.id, &user.id).expect("q"));
    }
}
