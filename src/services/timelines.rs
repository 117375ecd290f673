//! Read and moderate the tenant activity feed. Entries are written by the
//! task and meeting services through the recorder; this surface only reads
//! them back and lets admins hide individual entries.

use serde::Deserialize;

use super::{require, ServiceError};
use crate::auth::{AuthContext, Capability};
use crate::db::{Db, DbTimeline};

const DEFAULT_FEED_LIMIT: i64 = 50;
const MAX_FEED_LIMIT: i64 = 200;

/// What the feed is about: one subject's history or the whole tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TimelineQuery {
    Subject {
        subject_type: String,
        subject_id: String,
    },
    Client {
        limit: Option<i64>,
    },
}

/// Fetch a feed, newest first. Subject feeds are unbounded (one subject's
/// history stays small); the tenant-wide feed is capped.
pub fn timeline(
    db: &Db,
    ctx: &AuthContext,
    query: TimelineQuery,
) -> Result<Vec<DbTimeline>, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    match query {
        TimelineQuery::Subject {
            subject_type,
            subject_id,
        } => Ok(db.timeline_for_subject(&ctx.client_id, &subject_type, &subject_id)?),
        TimelineQuery::Client { limit } => {
            let limit = limit
                .unwrap_or(DEFAULT_FEED_LIMIT)
                .clamp(1, MAX_FEED_LIMIT);
            Ok(db.client_timeline(&ctx.client_id, limit)?)
        }
    }
}

/// Hide a timeline entry from the feed. Admin-only; the row stays for audit.
pub fn delete_entry(db: &Db, ctx: &AuthContext, id: &str) -> Result<(), ServiceError> {
    require(ctx, Capability::ManageClient)?;
    let changed = db.soft_delete_timeline(&ctx.client_id, id)?;
    if changed == 0 {
        return Err(ServiceError::NotFound(format!("timeline entry {id}")));
    }
    tracing::info!(timeline_id = %id, client_id = %ctx.client_id, "Timeline entry hidden");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::test_utils::{seed_task, seed_user, test_db};
    use crate::services::tasks::{create_task, update_task, CreateTaskRequest, UpdateTaskRequest};
    use crate::timeline::DbTimelineRecorder;

    fn ctx_for(db: &Db, client_id: &str, email: &str, role: Role) -> AuthContext {
        let user = seed_user(db, client_id, email, role.name());
        AuthContext {
            user_id: user.id,
            client_id: client_id.to_string(),
            role,
        }
    }

    #[test]
    fn test_subject_feed_reflects_task_activity() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let ctx = ctx_for(&db, &client, "ana@acme.test", Role::ClientAdmin);
        let recorder = DbTimelineRecorder::new(&db);

        let detail = create_task(
            &db,
            &ctx,
            &recorder,
            CreateTaskRequest {
                name: "Fix roof".to_string(),
                ..Default::default()
            },
        )
        .expect("create");
        update_task(
            &db,
            &ctx,
            &recorder,
            &detail.task.id,
            UpdateTaskRequest {
                status: Some("in_progress".to_string()),
                ..Default::default()
            },
        )
        .expect("update");

        let feed = timeline(
            &db,
            &ctx,
            TimelineQuery::Subject {
                subject_type: "task".to_string(),
                subject_id: detail.task.id.clone(),
            },
        )
        .expect("feed");
        assert_eq!(feed.len(), 2);
        // Newest first
        assert!(feed[0].message.contains("updated"));
        assert!(feed[1].message.contains("created"));
    }

    #[test]
    fn test_member_cannot_hide_entries() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let admin = ctx_for(&db, &client, "ana@acme.test", Role::ClientAdmin);
        let member = ctx_for(&db, &client, "bo@acme.test", Role::Member);
        let recorder = DbTimelineRecorder::new(&db);

        let detail = create_task(
            &db,
            &admin,
            &recorder,
            CreateTaskRequest {
                name: "Fix roof".to_string(),
                ..Default::default()
            },
        )
        .expect("create");
        let feed = timeline(
            &db,
            &admin,
            TimelineQuery::Client { limit: None },
        )
        .expect("feed");
        let entry_id = feed[0].id.clone();

        assert!(matches!(
            delete_entry(&db, &member, &entry_id),
            Err(ServiceError::Unauthorized)
        ));
        delete_entry(&db, &admin, &entry_id).expect("hide");
        let feed = timeline(
            &db,
            &admin,
            TimelineQuery::Subject {
                subject_type: "task".to_string(),
                subject_id: detail.task.id,
            },
        )
        .expect("feed");
        assert!(feed.is_empty());
    }

    #[test]
    fn test_hiding_unknown_entry_is_not_found() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let ctx = ctx_for(&db, &client, "ana@acme.test", Role::ClientAdmin);

        assert!(matches!(
            delete_entry(&db, &ctx, "tl-missing"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_client_feed_limit_is_clamped() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let ctx = ctx_for(&db, &client, "ana@acme.test", Role::ClientAdmin);
        seed_task(&db, &client, "Fix roof");

        // A hostile limit never reaches SQL
        let feed = timeline(&db, &ctx, TimelineQuery::Client { limit: Some(-5) }).expect("feed");
        assert!(feed.len() <= 1);
    }
}
