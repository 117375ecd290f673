use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use super::{Db, DbClient, DbError, DbRole};

impl Db {
    // =========================================================================
    // Clients (tenants)
    // =========================================================================

    /// Create a tenant. Returns the generated client ID.
    pub fn create_client(&self, name: &str) -> Result<String, DbError> {
        let id = format!("client-{}", Uuid::new_v4());
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO clients (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, now],
        )?;
        Ok(id)
    }

    /// Look up a single client by ID.
    pub fn get_client(&self, id: &str) -> Result<Option<DbClient>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM clients WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(DbClient {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// Look up a role by its unique name (seeded by the baseline migration).
    pub fn get_role_by_name(&self, name: &str) -> Result<Option<DbRole>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM roles WHERE name = ?1")?;
        let mut rows = stmt.query_map(params![name], |row| {
            Ok(DbRole {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_db;

    #[test]
    fn test_create_and_get_client() {
        let db = test_db();
        let id = db.create_client("Acme Corp").expect("create");
        let client = db.get_client(&id).expect("get").expect("exists");
        assert_eq!(client.name, "Acme Corp");
    }

    #[test]
    fn test_seeded_roles_resolve_by_name() {
        let db = test_db();
        for name in ["System-Admin", "Client-Admin", "Member"] {
            let role = db.get_role_by_name(name).expect("query");
            assert!(role.is_some(), "{name} should be seeded");
        }
        assert!(db.get_role_by_name("Superuser").expect("query").is_none());
    }
}
