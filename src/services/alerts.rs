//! Task alerts: authored messages fanned out to assigned users, each
//! recipient carrying independent read state. Delivery of the email copy
//! is fire-and-forget and never affects the persisted alert.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{dedup_ids, require, ServiceError, Validator};
use crate::auth::{self, AuthContext, Capability};
use crate::db::{Db, DbAlert, DbUserAlert};
use crate::notify::{AlertEmail, AlertNotifier};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertRequest {
    pub task_id: String,
    pub message: String,
    pub recipient_ids: Vec<String>,
}

/// Create an alert on a task and fan it out to the given recipients.
///
/// Alerts are admin-to-member notifications, so authoring requires
/// `ManageClient`. Every recipient must be an active user of the actor's
/// tenant who is assigned to the task. The alert and its recipient rows
/// commit together; email notification happens after commit and cannot
/// fail the call.
pub fn create_alert(
    db: &Db,
    ctx: &AuthContext,
    notifier: &dyn AlertNotifier,
    base_url: &str,
    request: CreateAlertRequest,
) -> Result<DbAlert, ServiceError> {
    require(ctx, Capability::ManageClient)?;

    let task = db
        .get_task(&request.task_id)?
        .ok_or_else(|| ServiceError::NotFound(format!("task {}", request.task_id)))?;
    if !auth::check_client(ctx, &task.client_id).is_allowed() {
        return Err(ServiceError::Unauthorized);
    }

    let mut v = Validator::new();
    let message = v.bounded_string(&request.message, "message", 1, 2_000);
    let recipient_ids = dedup_ids(&request.recipient_ids);
    if recipient_ids.is_empty() {
        v.push("recipient_ids", "must name at least one recipient");
    }
    let mut recipients = Vec::new();
    for id in &recipient_ids {
        match db.get_client_user(&ctx.client_id, id)? {
            Some(user) if db.user_assigned_to_task(&task.id, &user.id)? => {
                recipients.push(user);
            }
            Some(_) => v.push("recipient_ids", format!("{id} is not assigned to the task")),
            None => v.push("recipient_ids", format!("{id} is not a user of this client")),
        }
    }
    v.finish()?;

    let alert = DbAlert {
        id: format!("alert-{}", Uuid::new_v4()),
        client_id: ctx.client_id.clone(),
        task_id: task.id.clone(),
        author_id: ctx.user_id.clone(),
        message: message.unwrap_or_default(),
        created_at: Utc::now().to_rfc3339(),
    };
    db.with_transaction(|db| {
        db.insert_alert(&alert)?;
        for user in &recipients {
            db.insert_alert_recipient(&alert.id, &user.id)?;
        }
        Ok::<(), ServiceError>(())
    })?;

    let author = db
        .get_user(&ctx.user_id)?
        .map(|u| u.name)
        .unwrap_or_else(|| ctx.user_id.clone());
    let task_url = format!("{}/tasks/{}", base_url.trim_end_matches('/'), task.id);
    for user in &recipients {
        notifier.notify(AlertEmail {
            recipient_name: user.name.clone(),
            recipient_email: user.email.clone(),
            author_name: author.clone(),
            task_name: task.name.clone(),
            message: alert.message.clone(),
            task_url: task_url.clone(),
        });
    }
    tracing::info!(
        alert_id = %alert.id,
        task_id = %task.id,
        recipients = recipients.len(),
        "Alert created"
    );
    Ok(alert)
}

/// The actor's alert inbox: unread first (newest created first), then read
/// (most recently read first).
pub fn my_alerts(db: &Db, ctx: &AuthContext) -> Result<Vec<DbUserAlert>, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    Ok(db.user_alerts(&ctx.client_id, &ctx.user_id)?)
}

/// Mark one of the actor's alerts read. Unknown or foreign alert IDs are
/// NotFound; marking an already-read alert is a no-op.
pub fn mark_read(db: &Db, ctx: &AuthContext, alert_id: &str) -> Result<(), ServiceError> {
    require(ctx, Capability::ViewClient)?;
    ensure_recipient(db, ctx, alert_id)?;
    db.mark_alert_read(&ctx.user_id, alert_id)?;
    Ok(())
}

/// Mark one of the actor's alerts unread again, clearing its read time.
pub fn mark_unread(db: &Db, ctx: &AuthContext, alert_id: &str) -> Result<(), ServiceError> {
    require(ctx, Capability::ViewClient)?;
    ensure_recipient(db, ctx, alert_id)?;
    db.mark_alert_unread(&ctx.user_id, alert_id)?;
    Ok(())
}

/// Mark everything in the actor's inbox read. Returns how many changed.
pub fn mark_all_read(db: &Db, ctx: &AuthContext) -> Result<usize, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    Ok(db.mark_all_alerts_read(&ctx.user_id)?)
}

/// Unread count for the actor's inbox badge.
pub fn unread_count(db: &Db, ctx: &AuthContext) -> Result<i64, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    Ok(db.unread_alert_count(&ctx.user_id)?)
}

fn ensure_recipient(db: &Db, ctx: &AuthContext, alert_id: &str) -> Result<(), ServiceError> {
    let visible = db
        .get_client_alert(&ctx.client_id, alert_id)?
        .map(|a| a.id)
        .is_some();
    if !visible {
        return Err(ServiceError::NotFound(format!("alert {alert_id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::test_utils::{seed_task, seed_user, test_db};
    use crate::notify::test_utils::MemoryNotifier;
    use crate::notify::NullNotifier;

    const BASE_URL: &str = "https://crewdesk.test";

    fn admin_ctx(db: &Db, client_id: &str, email: &str) -> AuthContext {
        let user = seed_user(db, client_id, email, "Client-Admin");
        AuthContext {
            user_id: user.id,
            client_id: client_id.to_string(),
            role: Role::ClientAdmin,
        }
    }

    fn member_ctx(db: &Db, client_id: &str, email: &str) -> AuthContext {
        let user = seed_user(db, client_id, email, "Member");
        AuthContext {
            user_id: user.id,
            client_id: client_id.to_string(),
            role: Role::Member,
        }
    }

    #[test]
    fn test_alert_fans_out_to_assigned_recipients() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let author = admin_ctx(&db, &client, "ana@acme.test");
        let bo = seed_user(&db, &client, "bo@acme.test", "Member");
        let cam = seed_user(&db, &client, "cam@acme.test", "Member");
        let task = seed_task(&db, &client, "Fix roof");
        db.sync_task_users(&task.id, &[bo.id.clone(), cam.id.clone()])
            .expect("assign");
        let notifier = MemoryNotifier::default();

        let alert = create_alert(
            &db,
            &author,
            &notifier,
            BASE_URL,
            CreateAlertRequest {
                task_id: task.id.clone(),
                message: "Roof first, please".to_string(),
                recipient_ids: vec![bo.id.clone(), cam.id.clone()],
            },
        )
        .expect("create");

        let bo_ctx = AuthContext {
            user_id: bo.id.clone(),
            client_id: client.clone(),
            role: Role::Member,
        };
        let inbox = my_alerts(&db, &bo_ctx).expect("inbox");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].alert_id, alert.id);
        assert!(!inbox[0].is_read);

        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].author_name, "ana");
        assert_eq!(sent[0].task_url, format!("{BASE_URL}/tasks/{}", task.id));
    }

    #[test]
    fn test_member_cannot_author_alerts() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let member = member_ctx(&db, &client, "mem@acme.test");
        let bo = seed_user(&db, &client, "bo@acme.test", "Member");
        let task = seed_task(&db, &client, "Fix roof");
        db.sync_task_users(&task.id, &[bo.id.clone()]).expect("assign");

        let result = create_alert(
            &db,
            &member,
            &NullNotifier,
            BASE_URL,
            CreateAlertRequest {
                task_id: task.id.clone(),
                message: "Not allowed".to_string(),
                recipient_ids: vec![bo.id.clone()],
            },
        );
        assert!(matches!(result, Err(ServiceError::Unauthorized)));

        // Nothing was persisted or delivered
        let bo_ctx = AuthContext {
            user_id: bo.id,
            client_id: client.clone(),
            role: Role::Member,
        };
        assert!(my_alerts(&db, &bo_ctx).expect("inbox").is_empty());
    }

    #[test]
    fn test_unassigned_recipient_is_rejected() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let author = admin_ctx(&db, &client, "ana@acme.test");
        let bo = seed_user(&db, &client, "bo@acme.test", "Member");
        let task = seed_task(&db, &client, "Fix roof");

        let result = create_alert(
            &db,
            &author,
            &NullNotifier,
            BASE_URL,
            CreateAlertRequest {
                task_id: task.id,
                message: "Hello".to_string(),
                recipient_ids: vec![bo.id],
            },
        );
        match result {
            Err(ServiceError::Validation(errors)) => {
                assert_eq!(errors[0].field, "recipient_ids");
                assert!(errors[0].message.ends_with("is not assigned to the task"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_cross_tenant_task_is_unauthorized() {
        let db = test_db();
        let acme = db.create_client("Acme").expect("client");
        let globex = db.create_client("Globex").expect("client");
        let author = admin_ctx(&db, &acme, "ana@acme.test");
        let foreign_task = seed_task(&db, &globex, "Theirs");

        let result = create_alert(
            &db,
            &author,
            &NullNotifier,
            BASE_URL,
            CreateAlertRequest {
                task_id: foreign_task.id,
                message: "Hello".to_string(),
                recipient_ids: vec![],
            },
        );
        assert!(matches!(result, Err(ServiceError::Unauthorized)));
    }

    #[test]
    fn test_read_state_is_per_recipient() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let author = admin_ctx(&db, &client, "ana@acme.test");
        let bo = seed_user(&db, &client, "bo@acme.test", "Member");
        let cam = seed_user(&db, &client, "cam@acme.test", "Member");
        let task = seed_task(&db, &client, "Fix roof");
        db.sync_task_users(&task.id, &[bo.id.clone(), cam.id.clone()])
            .expect("assign");

        let alert = create_alert(
            &db,
            &author,
            &NullNotifier,
            BASE_URL,
            CreateAlertRequest {
                task_id: task.id,
                message: "Heads up".to_string(),
                recipient_ids: vec![bo.id.clone(), cam.id.clone()],
            },
        )
        .expect("create");

        let bo_ctx = AuthContext {
            user_id: bo.id,
            client_id: client.clone(),
            role: Role::Member,
        };
        let cam_ctx = AuthContext {
            user_id: cam.id,
            client_id: client.clone(),
            role: Role::Member,
        };
        mark_read(&db, &bo_ctx, &alert.id).expect("read");

        assert_eq!(unread_count(&db, &bo_ctx).expect("count"), 0);
        assert_eq!(unread_count(&db, &cam_ctx).expect("count"), 1);
    }

    #[test]
    fn test_mark_read_on_unknown_alert_is_not_found() {
        let db = test_db();
        let client = db.create_client("Acme").expect("client");
        let ctx = member_ctx(&db, &client, "ana@acme.test");

        assert!(matches!(
            mark_read(&db, &ctx, "alert-missing"),
            Err(ServiceError::NotFound(_))
        ));
    }
}
