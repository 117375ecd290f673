//! Meeting CRUD with the 1:1 agenda, membership sync, and timeline
//! recording.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{actor_name, dedup_ids, require, ServiceError, Validator};
use crate::auth::{self, AuthContext, Capability};
use crate::db::{Db, DbAgenda, DbMeeting};
use crate::timeline::{render_message, ChangeSet, ChangeVerb, TimelineRecorder};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub name: String,
    pub starts_at: Option<String>,
    pub agenda: Option<String>,
    pub user_ids: Option<Vec<String>>,
    pub task_ids: Option<Vec<String>>,
}

/// Partial update: absent fields are left alone. Submitting `agenda`
/// replaces the agenda body in place (same row, per the 1:1 ownership).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeetingRequest {
    pub name: Option<String>,
    pub starts_at: Option<String>,
    pub agenda: Option<String>,
    pub user_ids: Option<Vec<String>>,
    pub task_ids: Option<Vec<String>>,
}

/// A meeting with its agenda and membership sets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDetail {
    #[serde(flatten)]
    pub meeting: DbMeeting,
    pub agenda: Option<DbAgenda>,
    pub user_ids: Vec<String>,
    pub task_ids: Vec<String>,
}

/// List the tenant's meetings.
pub fn list_meetings(db: &Db, ctx: &AuthContext) -> Result<Vec<DbMeeting>, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    Ok(db.list_client_meetings(&ctx.client_id)?)
}

/// A single meeting with agenda and memberships.
pub fn get_meeting(db: &Db, ctx: &AuthContext, id: &str) -> Result<MeetingDetail, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    let meeting = find_tenant_meeting(db, ctx, id)?;
    detail(db, meeting)
}

/// Create a meeting with its optional agenda and memberships, recording
/// one timeline entry.
pub fn create_meeting(
    db: &Db,
    ctx: &AuthContext,
    recorder: &dyn TimelineRecorder,
    request: CreateMeetingRequest,
) -> Result<MeetingDetail, ServiceError> {
    require(ctx, Capability::ManageClient)?;

    let mut v = Validator::new();
    let name = v.bounded_string(&request.name, "name", 1, 120);
    if let Some(ref starts_at) = request.starts_at {
        v.rfc3339(starts_at, "starts_at");
    }
    let agenda = request
        .agenda
        .as_deref()
        .and_then(|a| v.bounded_string(a, "agenda", 1, 10_000));
    let user_ids = request.user_ids.as_deref().map(dedup_ids).unwrap_or_default();
    let task_ids = request.task_ids.as_deref().map(dedup_ids).unwrap_or_default();
    check_memberships(db, ctx, &mut v, &user_ids, &task_ids)?;
    v.finish()?;

    let now = Utc::now().to_rfc3339();
    let meeting = DbMeeting {
        id: format!("meeting-{}", Uuid::new_v4()),
        client_id: ctx.client_id.clone(),
        name: name.unwrap_or_default(),
        starts_at: request.starts_at,
        created_at: now.clone(),
        updated_at: now,
    };

    db.with_transaction(|db| {
        db.insert_meeting(&meeting)?;
        if let Some(ref body) = agenda {
            db.upsert_agenda(&meeting.id, body)?;
        }
        db.sync_meeting_users(&meeting.id, &user_ids)?;
        db.sync_meeting_tasks(&meeting.id, &task_ids)?;
        Ok::<(), ServiceError>(())
    })?;

    let actor = actor_name(db, ctx)?;
    let message = render_message("Meeting", &meeting.name, ChangeVerb::Created, &actor, &ChangeSet::new());
    recorder.record(ctx, "meeting", &meeting.id, &message)?;
    tracing::info!(meeting_id = %meeting.id, client_id = %ctx.client_id, "Meeting created");

    detail(db, meeting)
}

/// Update a meeting, its agenda, and its memberships.
pub fn update_meeting(
    db: &Db,
    ctx: &AuthContext,
    recorder: &dyn TimelineRecorder,
    id: &str,
    request: UpdateMeetingRequest,
) -> Result<MeetingDetail, ServiceError> {
    require(ctx, Capability::ManageClient)?;
    let mut meeting = find_tenant_meeting(db, ctx, id)?;

    let mut v = Validator::new();
    let name = request
        .name
        .as_deref()
        .and_then(|n| v.bounded_string(n, "name", 1, 120));
    if let Some(ref starts_at) = request.starts_at {
        v.rfc3339(starts_at, "starts_at");
    }
    let agenda = request
        .agenda
        .as_deref()
        .and_then(|a| v.bounded_string(a, "agenda", 1, 10_000));
    let user_ids = request.user_ids.as_deref().map(dedup_ids);
    let task_ids = request.task_ids.as_deref().map(dedup_ids);
    check_memberships(
        db,
        ctx,
        &mut v,
        user_ids.as_deref().unwrap_or(&[]),
        task_ids.as_deref().unwrap_or(&[]),
    )?;
    v.finish()?;

    let mut changes = ChangeSet::new();
    if let Some(new_name) = name {
        changes.push("name", Some(meeting.name.clone()), Some(new_name.clone()));
        meeting.name = new_name;
    }
    if let Some(starts_at) = request.starts_at {
        meeting.starts_at = Some(starts_at);
    }
    if let Some(ref new_users) = user_ids {
        let current: Vec<String> = db
            .meeting_user_memberships(&meeting.id)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        changes.push("users", Some(sorted_key(&current)), Some(sorted_key(new_users)));
    }

    db.with_transaction(|db| {
        db.update_meeting(&meeting)?;
        if let Some(ref body) = agenda {
            db.upsert_agenda(&meeting.id, body)?;
        }
        if let Some(ref ids) = user_ids {
            db.sync_meeting_users(&meeting.id, ids)?;
        }
        if let Some(ref ids) = task_ids {
            db.sync_meeting_tasks(&meeting.id, ids)?;
        }
        Ok::<(), ServiceError>(())
    })?;

    let actor = actor_name(db, ctx)?;
    let message = render_message("Meeting", &meeting.name, ChangeVerb::Updated, &actor, &changes);
    recorder.record(ctx, "meeting", &meeting.id, &message)?;
    tracing::info!(meeting_id = %meeting.id, client_id = %ctx.client_id, "Meeting updated");

    detail(db, meeting)
}

/// Soft-delete a meeting; its agenda goes with it.
pub fn delete_meeting(db: &Db, ctx: &AuthContext, id: &str) -> Result<(), ServiceError> {
    require(ctx, Capability::ManageClient)?;
    let meeting = find_tenant_meeting(db, ctx, id)?;
    db.soft_delete_meeting(&meeting.id)?;
    tracing::info!(meeting_id = %meeting.id, client_id = %ctx.client_id, "Meeting deleted");
    Ok(())
}

fn find_tenant_meeting(db: &Db, ctx: &AuthContext, id: &str) -> Result<DbMeeting, ServiceError> {
    let meeting = db
        .get_meeting(id)?
        .ok_or_else(|| ServiceError::NotFound(format!("meeting {id}")))?;
    if !auth::check_client(ctx, &meeting.client_id).is_allowed() {
        return Err(ServiceError::Unauthorized);
    }
    Ok(meeting)
}

fn check_memberships(
    db: &Db,
    ctx: &AuthContext,
    v: &mut Validator,
    user_ids: &[String],
    task_ids: &[String],
) -> Result<(), ServiceError> {
    if !user_ids.is_empty()
        && db.count_client_users_in(&ctx.client_id, user_ids)? != user_ids.len()
    {
        v.push("user_ids", "contains an unknown user");
    }
    if !task_ids.is_empty()
        && db.count_client_tasks_in(&ctx.client_id, task_ids)? != task_ids.len()
    {
        v.push("task_ids", "contains an unknown task");
    }
    Ok(())
}

fn sorted_key(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

fn detail(db: &Db, meeting: DbMeeting) -> Result<MeetingDetail, ServiceError> {
    let agenda = db.get_agenda(&meeting.id)?;
    let user_ids = db
        .meeting_user_memberships(&meeting.id)?
        .into_iter()
        .map(|m| m.id)
        .collect();
    let task_ids = db
        .meeting_task_memberships(&meeting.id)?
        .into_iter()
        .map(|m| m.id)
        .collect();
    Ok(MeetingDetail {
        meeting,
        agenda,
        user_ids,
        task_ids,
    })
}
