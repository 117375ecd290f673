//! Activity timeline: change diffing, message rendering, and recording.
//!
//! Mutation services build a [`ChangeSet`] from the fields present in the
//! submitted request, render a human-readable message with a fixed
//! per-field phrase table, and hand it to a [`TimelineRecorder`]. The
//! production recorder appends a `timelines` row synchronously in the same
//! request — exactly one row per mutation call, no replay.

use chrono::Utc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::db::{Db, DbError, DbTimeline};

/// One submitted field with its pre- and post-change values.
#[derive(Debug, Clone)]
pub struct Change {
    pub field: &'static str,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// The fields present in a mutation request, in submission order.
/// Only fields whose new value differs from the old produce a phrase.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted field. Unchanged values are kept here and
    /// filtered at render time.
    pub fn push(&mut self, field: &'static str, old: Option<String>, new: Option<String>) {
        self.changes.push(Change { field, old, new });
    }

    /// The submitted fields whose value actually changed.
    pub fn changed(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|c| c.old != c.new)
    }

    pub fn has_changes(&self) -> bool {
        self.changed().next().is_some()
    }
}

/// Whether the subject was created or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeVerb {
    Created,
    Updated,
}

impl ChangeVerb {
    fn as_str(&self) -> &'static str {
        match self {
            ChangeVerb::Created => "created",
            ChangeVerb::Updated => "updated",
        }
    }
}

/// Enum tokens are stored with underscores; messages show them with
/// spaces ("in_progress" reads as "in progress").
fn humanize(value: &str) -> String {
    value.replace('_', " ")
}

/// The fixed per-field phrase table. Unrecognized fields emit nothing.
fn phrase(change: &Change) -> Option<String> {
    let value = change.new.clone().unwrap_or_default();
    match change.field {
        "name" => Some(format!("the name to `{value}`")),
        "description" => Some(format!("the description to `{value}`")),
        "status" => Some(format!("the status to `{}`", humanize(&value))),
        "priority" => Some(format!("the priority to `{value}`")),
        "due_date" => Some(format!("the due date to `{value}`")),
        // The assigned ID set is not interpolated
        "users" => Some("the users assigned".to_string()),
        _ => None,
    }
}

/// Join phrases with commas and a trailing "and".
fn join_phrases(phrases: &[String]) -> String {
    match phrases.len() {
        0 => String::new(),
        1 => phrases[0].clone(),
        n => format!("{} and {}", phrases[..n - 1].join(", "), phrases[n - 1]),
    }
}

/// Render the full timeline message for a subject mutation.
///
/// With no effective changes the message is just the prefix
/// (``Task `X` created by Ana``); otherwise ``... by changing <phrases>``
/// is appended.
pub fn render_message(
    subject_kind: &str,
    subject_name: &str,
    verb: ChangeVerb,
    actor_name: &str,
    changes: &ChangeSet,
) -> String {
    let prefix = format!(
        "{subject_kind} `{subject_name}` {} by {actor_name}",
        verb.as_str()
    );
    let phrases: Vec<String> = changes.changed().filter_map(phrase).collect();
    if phrases.is_empty() {
        prefix
    } else {
        format!("{prefix} by changing {}", join_phrases(&phrases))
    }
}

/// Sink for rendered activity messages. The task/meeting services call this
/// directly after each mutation; tests substitute an in-memory collector.
pub trait TimelineRecorder {
    fn record(
        &self,
        actor: &AuthContext,
        subject_type: &str,
        subject_id: &str,
        message: &str,
    ) -> Result<(), DbError>;
}

/// Production recorder: appends a `timelines` row in the same request.
pub struct DbTimelineRecorder<'a> {
    db: &'a Db,
}

impl<'a> DbTimelineRecorder<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }
}

impl TimelineRecorder for DbTimelineRecorder<'_> {
    fn record(
        &self,
        actor: &AuthContext,
        subject_type: &str,
        subject_id: &str,
        message: &str,
    ) -> Result<(), DbError> {
        let entry = DbTimeline {
            id: format!("tl-{}", Uuid::new_v4()),
            user_id: actor.user_id.clone(),
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            client_id: actor.client_id.clone(),
            message: message.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        self.db.insert_timeline(&entry)
    }
}
