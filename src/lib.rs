//! Multi-tenant task and meeting management core.
//!
//! Each client (tenant) owns its users, tasks, meetings, agendas, alerts,
//! and activity timeline, all stored in a single SQLite database. Service
//! functions in [`services`] form the application surface: every call takes
//! an explicit [`auth::AuthContext`] and enforces role capabilities and
//! tenant scoping before touching rows.

pub mod auth;
pub mod config;
pub mod db;
pub mod migrations;
pub mod notify;
pub mod services;
pub mod telemetry;
pub mod timeline;
