//! Task CRUD with membership sync and timeline recording.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{actor_name, dedup_ids, require, ServiceError, Validator};
use crate::auth::{self, AuthContext, Capability};
use crate::db::{Db, DbTask};
use crate::timeline::{render_message, ChangeSet, ChangeVerb, TimelineRecorder};

pub const TASK_STATUSES: &[&str] = &["pending", "in_progress", "completed"];
pub const TASK_PRIORITIES: &[&str] = &["low", "medium", "high"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub user_ids: Option<Vec<String>>,
    pub meeting_ids: Option<Vec<String>>,
}

/// Partial update: absent fields are left alone. `clear_due_date` removes
/// the due date regardless of `due_date`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub clear_due_date: Option<bool>,
    pub user_ids: Option<Vec<String>>,
    pub meeting_ids: Option<Vec<String>>,
}

/// A task with its current membership sets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: DbTask,
    pub user_ids: Vec<String>,
    pub meeting_ids: Vec<String>,
}

/// List the tenant's tasks, optionally filtered by status.
pub fn list_tasks(
    db: &Db,
    ctx: &AuthContext,
    status: Option<&str>,
) -> Result<Vec<DbTask>, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    if let Some(status) = status {
        let mut v = Validator::new();
        v.enum_string(status, "status", TASK_STATUSES);
        v.finish()?;
    }
    Ok(db.list_client_tasks(&ctx.client_id, status)?)
}

/// Tasks past their due date and not completed, most overdue first.
pub fn list_overdue_tasks(db: &Db, ctx: &AuthContext) -> Result<Vec<DbTask>, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    let today = Utc::now().format("%Y-%m-%d").to_string();
    Ok(db.list_overdue_tasks(&ctx.client_id, &today)?)
}

/// A single task with memberships.
pub fn get_task(db: &Db, ctx: &AuthContext, id: &str) -> Result<TaskDetail, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    let task = find_tenant_task(db, ctx, id)?;
    detail(db, task)
}

/// Create a task, sync its memberships, and record one timeline entry.
pub fn create_task(
    db: &Db,
    ctx: &AuthContext,
    recorder: &dyn TimelineRecorder,
    request: CreateTaskRequest,
) -> Result<TaskDetail, ServiceError> {
    require(ctx, Capability::ManageClient)?;

    let mut v = Validator::new();
    let name = v.bounded_string(&request.name, "name", 1, 120);
    let description = request
        .description
        .as_deref()
        .and_then(|d| v.bounded_string(d, "description", 1, 10_000));
    let status = request.status.clone().unwrap_or_else(|| "pending".to_string());
    v.enum_string(&status, "status", TASK_STATUSES);
    let priority = request.priority.clone().unwrap_or_else(|| "medium".to_string());
    v.enum_string(&priority, "priority", TASK_PRIORITIES);
    if let Some(ref date) = request.due_date {
        v.yyyy_mm_dd(date, "due_date");
    }
    let user_ids = request.user_ids.as_deref().map(dedup_ids).unwrap_or_default();
    let meeting_ids = request.meeting_ids.as_deref().map(dedup_ids).unwrap_or_default();
    check_memberships(db, ctx, &mut v, &user_ids, &meeting_ids)?;
    v.finish()?;

    let now = Utc::now().to_rfc3339();
    let task = DbTask {
        id: format!("task-{}", Uuid::new_v4()),
        client_id: ctx.client_id.clone(),
        name: name.unwrap_or_default(),
        description,
        status,
        priority,
        due_date: request.due_date,
        created_at: now.clone(),
        updated_at: now,
    };

    db.with_transaction(|db| {
        db.insert_task(&task)?;
        db.sync_task_users(&task.id, &user_ids)?;
        db.sync_task_meetings(&task.id, &meeting_ids)?;
        Ok::<(), ServiceError>(())
    })?;

    let actor_name = actor_name(db, ctx)?;
    let message = render_message("Task", &task.name, ChangeVerb::Created, &actor_name, &ChangeSet::new());
    recorder.record(ctx, "task", &task.id, &message)?;
    tracing::info!(task_id = %task.id, client_id = %ctx.client_id, "Task created");

    detail(db, task)
}

/// Update a task. Only submitted fields change; the timeline message
/// describes exactly the fields whose value differs from before.
pub fn update_task(
    db: &Db,
    ctx: &AuthContext,
    recorder: &dyn TimelineRecorder,
    id: &str,
    request: UpdateTaskRequest,
) -> Result<TaskDetail, ServiceError> {
    require(ctx, Capability::ManageClient)?;
    let mut task = find_tenant_task(db, ctx, id)?;

    let mut v = Validator::new();
    let name = request
        .name
        .as_deref()
        .and_then(|n| v.bounded_string(n, "name", 1, 120));
    let description = request
        .description
        .as_deref()
        .and_then(|d| v.bounded_string(d, "description", 1, 10_000));
    if let Some(ref status) = request.status {
        v.enum_string(status, "status", TASK_STATUSES);
    }
    if let Some(ref priority) = request.priority {
        v.enum_string(priority, "priority", TASK_PRIORITIES);
    }
    if let Some(ref date) = request.due_date {
        v.yyyy_mm_dd(date, "due_date");
    }
    let user_ids = request.user_ids.as_deref().map(dedup_ids);
    let meeting_ids = request.meeting_ids.as_deref().map(dedup_ids);
    check_memberships(
        db,
        ctx,
        &mut v,
        user_ids.as_deref().unwrap_or(&[]),
        meeting_ids.as_deref().unwrap_or(&[]),
    )?;
    v.finish()?;

    // Collect submitted fields before applying them
    let mut changes = ChangeSet::new();
    if let Some(new_name) = name {
        changes.push("name", Some(task.name.clone()), Some(new_name.clone()));
        task.name = new_name;
    }
    if let Some(description) = description {
        changes.push("description", task.description.clone(), Some(description.clone()));
        task.description = Some(description);
    }
    if let Some(status) = request.status {
        changes.push("status", Some(task.status.clone()), Some(status.clone()));
        task.status = status;
    }
    if let Some(priority) = request.priority {
        changes.push("priority", Some(task.priority.clone()), Some(priority.clone()));
        task.priority = priority;
    }
    if request.clear_due_date == Some(true) {
        changes.push("due_date", task.due_date.clone(), None);
        task.due_date = None;
    } else if let Some(date) = request.due_date {
        changes.push("due_date", task.due_date.clone(), Some(date.clone()));
        task.due_date = Some(date);
    }
    if let Some(ref new_users) = user_ids {
        let current: Vec<String> = db
            .task_user_memberships(&task.id)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        changes.push("users", Some(sorted_key(&current)), Some(sorted_key(new_users)));
    }

    db.with_transaction(|db| {
        db.update_task(&task)?;
        if let Some(ref ids) = user_ids {
            db.sync_task_users(&task.id, ids)?;
        }
        if let Some(ref ids) = meeting_ids {
            db.sync_task_meetings(&task.id, ids)?;
        }
        Ok::<(), ServiceError>(())
    })?;

    let actor_name = actor_name(db, ctx)?;
    let message = render_message("Task", &task.name, ChangeVerb::Updated, &actor_name, &changes);
    recorder.record(ctx, "task", &task.id, &message)?;
    tracing::info!(task_id = %task.id, client_id = %ctx.client_id, "Task updated");

    detail(db, task)
}

/// Soft-delete a task.
pub fn delete_task(db: &Db, ctx: &AuthContext, id: &str) -> Result<(), ServiceError> {
    require(ctx, Capability::ManageClient)?;
    let task = find_tenant_task(db, ctx, id)?;
    db.soft_delete_task(&task.id)?;
    tracing::info!(task_id = %task.id, client_id = %ctx.client_id, "Task deleted");
    Ok(())
}

/// Resolve a target task: 404 when it doesn't exist, 403 when it belongs
/// to another tenant.
fn find_tenant_task(db: &Db, ctx: &AuthContext, id: &str) -> Result<DbTask, ServiceError> {
    let task = db
        .get_task(id)?
        .ok_or_else(|| ServiceError::NotFound(format!("task {id}")))?;
    if !auth::check_client(ctx, &task.client_id).is_allowed() {
        return Err(ServiceError::Unauthorized);
    }
    Ok(task)
}

/// Referential validation: every submitted member ID must be an active row
/// of the actor's own tenant.
fn check_memberships(
    db: &Db,
    ctx: &AuthContext,
    v: &mut Validator,
    user_ids: &[String],
    meeting_ids: &[String],
) -> Result<(), ServiceError> {
    if !user_ids.is_empty()
        && db.count_client_users_in(&ctx.client_id, user_ids)? != user_ids.len()
    {
        v.push("user_ids", "contains an unknown user");
    }
    if !meeting_ids.is_empty()
        && db.count_client_meetings_in(&ctx.client_id, meeting_ids)? != meeting_ids.len()
    {
        v.push("meeting_ids", "contains an unknown meeting");
    }
    Ok(())
}

fn sorted_key(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

fn detail(db: &Db, task: DbTask) -> Result<TaskDetail, ServiceError> {
    let user_ids = db
        .task_user_memberships(&task.id)?
        .into_iter()
        .map(|m| m.id)
        .collect();
    let meeting_ids = db
        .task_meeting_memberships(&task.id)?
        .into_iter()
        .map(|m| m.id)
        .collect();
    Ok(TaskDetail {
        task,
        user_ids,
        meeting_ids,
    })
}
