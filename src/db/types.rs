//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from the `clients` table (tenant root).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbClient {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// A row from the `roles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRole {
    pub id: String,
    pub name: String,
}

/// A row from the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUser {
    pub id: String,
    pub client_id: String,
    pub role_id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
    /// Role name joined from `roles`, populated by most read queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

/// A row from the `tasks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTask {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `meetings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMeeting {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub starts_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `agendas` table (1:1 with its meeting).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAgenda {
    pub id: String,
    pub meeting_id: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A membership row from one of the join tables, with its attachment time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMembership {
    pub id: String,
    pub created_at: String,
}

/// A row from the `alerts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAlert {
    pub id: String,
    pub client_id: String,
    pub task_id: String,
    pub author_id: String,
    pub message: String,
    pub created_at: String,
}

/// An alert joined with the acting user's recipient row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUserAlert {
    pub alert_id: String,
    pub task_id: String,
    pub task_name: String,
    pub author_id: String,
    pub author_name: String,
    pub message: String,
    pub created_at: String,
    pub is_read: bool,
    pub read_at: Option<String>,
}

/// A row from the `timelines` table (append-only activity log).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTimeline {
    pub id: String,
    pub user_id: String,
    pub subject_type: String,
    pub subject_id: String,
    pub client_id: String,
    pub message: String,
    pub created_at: String,
}
