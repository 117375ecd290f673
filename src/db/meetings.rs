use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use super::{Db, DbAgenda, DbError, DbMeeting, DbMembership};

impl Db {
    // =========================================================================
    // Meetings
    // =========================================================================

    /// Insert a meeting row.
    pub fn insert_meeting(&self, meeting: &DbMeeting) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO meetings (id, client_id, name, starts_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                meeting.id,
                meeting.client_id,
                meeting.name,
                meeting.starts_at,
                meeting.created_at,
                meeting.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a meeting's mutable fields.
    pub fn update_meeting(&self, meeting: &DbMeeting) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE meetings SET name = ?1, starts_at = ?2, updated_at = ?3
             WHERE id = ?4 AND deleted_at IS NULL",
            params![meeting.name, meeting.starts_at, now, meeting.id],
        )?;
        Ok(())
    }

    /// Look up a meeting regardless of tenant. Callers must run the tenant
    /// check on the returned row before using it.
    pub fn get_meeting(&self, id: &str) -> Result<Option<DbMeeting>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, name, starts_at, created_at, updated_at
             FROM meetings
             WHERE id = ?1 AND deleted_at IS NULL",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_meeting_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Look up a meeting scoped to a tenant. Returns None for cross-tenant
    /// IDs and soft-deleted rows.
    pub fn get_client_meeting(
        &self,
        client_id: &str,
        id: &str,
    ) -> Result<Option<DbMeeting>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, name, starts_at, created_at, updated_at
             FROM meetings
             WHERE id = ?1 AND client_id = ?2 AND deleted_at IS NULL",
        )?;
        let mut rows = stmt.query_map(params![id, client_id], Self::map_meeting_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List a tenant's active meetings, soonest scheduled first,
    /// unscheduled last.
    pub fn list_client_meetings(&self, client_id: &str) -> Result<Vec<DbMeeting>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, name, starts_at, created_at, updated_at
             FROM meetings
             WHERE client_id = ?1 AND deleted_at IS NULL
             ORDER BY
               CASE WHEN starts_at IS NULL THEN 1 ELSE 0 END,
               starts_at ASC,
               created_at DESC",
        )?;
        let rows = stmt.query_map(params![client_id], Self::map_meeting_row)?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }

    /// Soft-delete a meeting and hard-delete its agenda (the agenda has no
    /// life of its own).
    pub fn soft_delete_meeting(&self, id: &str) -> Result<usize, DbError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE meetings SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        if changed > 0 {
            self.conn
                .execute("DELETE FROM agendas WHERE meeting_id = ?1", params![id])?;
        }
        Ok(changed)
    }

    /// Count active meetings of a tenant matching the given ID set.
    pub fn count_client_meetings_in(
        &self,
        client_id: &str,
        ids: &[String],
    ) -> Result<usize, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM meetings
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
    // Agendas (1:1 with their meeting)
    // =========================================================================

    /// Create or replace the body of a meeting's agenda.
    pub fn upsert_agenda(&self, meeting_id: &str, body: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let id = format!("agenda-{}", Uuid::new_v4());
        self.conn.execute(
            "INSERT INTO agendas (id, meeting_id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(meeting_id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![id, meeting_id, body, now],
        )?;
        Ok(())
    }

    /// The agenda owned by a meeting, if one has been written.
    pub fn get_agenda(&self, meeting_id: &str) -> Result<Option<DbAgenda>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, meeting_id, body, created_at, updated_at
             FROM agendas WHERE meeting_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![meeting_id], |row| {
            Ok(DbAgenda {
                id: row.get(0)?,
                meeting_id: row.get(1)?,
                body: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Membership sync (meeting ↔ users, meeting ↔ tasks)
    // =========================================================================

    /// Replace a meeting's attendee set with exactly `user_ids`.
    pub fn sync_meeting_users(&self, meeting_id: &str, user_ids: &[String]) -> Result<(), DbError> {
        self.sync_join_table("meeting_users", "meeting_id", "user_id", meeting_id, user_ids)
    }

    /// Replace a meeting's linked tasks with exactly `task_ids`.
    pub fn sync_meeting_tasks(&self, meeting_id: &str, task_ids: &[String]) -> Result<(), DbError> {
        self.sync_join_table("task_meetings", "meeting_id", "task_id", meeting_id, task_ids)
    }

    /// A meeting's attendee IDs with attachment timestamps, oldest first.
    pub fn meeting_user_memberships(&self, meeting_id: &str) -> Result<Vec<DbMembership>, DbError> {
        self.join_table_memberships("meeting_users", "meeting_id", "user_id", meeting_id)
    }

    /// A meeting's linked task IDs with attachment timestamps, oldest first.
    pub fn meeting_task_memberships(&self, meeting_id: &str) -> Result<Vec<DbMembership>, DbError> {
        self.join_table_memberships("task_meetings", "meeting_id", "task_id", meeting_id)
    }

    pub(crate) fn map_meeting_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbMeeting> {
        Ok(DbMeeting {
            id: row.get(0)?,
            client_id: row.get(1)?,
            name: row.get(2)?,
            starts_at: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::{seed_meeting, seed_task, test_db};

    #[test]
    fn test_meeting_tenant_scoping() {
        let db = test_db();
        let acme = db.create_client("Acme").expect("client");
        let globex = db.create_client("Globex").expect("client");
        let meeting = seed_meeting(&db, &acme, "Kickoff");

        assert!(db.get_client_meeting(&acme, &meeting.id).expect("q").is_some());
        assert!(db.get_client_meeting(&globex, &meeting.id).expect("q").is_none());
    }

    #[test]
    fn test_agenda_is_one_to_one() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let meeting = seed_meeting(&db, &client, "Planning");

        db.upsert_agenda(&meeting.id, "First draft").expect("create");
        let first = db.get_agenda(&meeting.id).expect("q").expect("exists");

        db.upsert_agenda(&meeting.id, "Second draft").expect("replace");
        let second = db.get_agenda(&meeting.id).expect("q").expect("exists");

        // Same row updated in place, not a second agenda
        assert_eq!(first.id, second.id);
        assert_eq!(second.body, "Second draft");
        let count: i32 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM agendas WHERE meeting_id = ?1",
                [&meeting.id],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_deleting_meeting_removes_agenda() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let meeting = seed_meeting(&db, &client, "Retro");
        db.upsert_agenda(&meeting.id, "Wins and misses").expect("agenda");

        assert_eq!(db.soft_delete_meeting(&meeting.id).expect("delete"), 1);
        assert!(db.get_client_meeting(&client, &meeting.id).expect("q").is_none());
        assert!(db.get_agenda(&meeting.id).expect("q").is_none());
    }

    #[test]
    fn test_meeting_task_sync() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let meeting = seed_meeting(&db, &client, "Standup");
        let t1 = seed_task(&db, &client, "One");
        let t2 = seed_task(&db, &client, "Two");

        db.sync_meeting_tasks(&meeting.id, &[t1.id.clone(), t2.id.clone()])
            .expect("sync");
        assert_eq!(db.meeting_task_memberships(&meeting.id).expect("m").len(), 2);

        db.sync_meeting_tasks(&meeting.id, &[t2.id.clone()]).expect("sync");
        let members = db.meeting_task_memberships(&meeting.id).expect("m");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, t2.id);
    }
}
