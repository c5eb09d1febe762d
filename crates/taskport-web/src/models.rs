//! API shapes of the stored documents.
//!
//! Optional fields are `Option`s that are skipped when absent, so serializing a model
//! back into a document keeps it sparse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskport_store::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_assignee_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supporting_assignees: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Response-only view of the task's subtasks; never persisted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
}

/// Body of `POST /tasks`. Any `id` in the body is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub main_assignee_id: Option<i32>,
    pub supporting_assignees: Option<String>,
    pub schedule: Option<String>,
}

impl NewTask {
    pub fn into_task(self, id: i64, now: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            task_type: self.task_type,
            completed: self.completed,
            archived: self.archived,
            pinned: self.pinned,
            created_at: self.created_at.unwrap_or(now),
            main_assignee_id: self.main_assignee_id,
            supporting_assignees: self.supporting_assignees,
            schedule: self.schedule,
            subtasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: i64,
    pub task_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_assignee_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supporting_assignees: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

impl Subtask {
    /// Build a subtask from a loosely typed request body.
    ///
    /// `supporting_assignees` may be a string or an array and `schedule` a string or an
    /// object; structured values are stored as their JSON text. Fields of any other
    /// type are ignored.
    pub fn from_body(id: i64, task_id: i64, body: &Document) -> Result<Self, String> {
        let main_assignee_id = match body.get("main_assignee_id") {
            Some(Value::Number(n)) => Some(assignee_from_number(n)?),
            _ => None,
        };
        let supporting_assignees = match body.get("supporting_assignees") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(v @ Value::Array(_)) => Some(v.to_string()),
            _ => None,
        };
        let schedule = match body.get("schedule") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(v @ Value::Object(_)) => Some(v.to_string()),
            _ => None,
        };

        Ok(Self {
            id,
            task_id,
            title: body
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            completed: body
                .get("completed")
                .and_then(Value::as_bool)
                .unwrap_or_default(),
            main_assignee_id,
            supporting_assignees,
            schedule,
        })
    }
}

fn assignee_from_number(n: &serde_json::Number) -> Result<i32, String> {
    let whole = match (n.as_i64(), n.as_f64()) {
        (Some(i), _) => i,
        (None, Some(f)) if f.fract() == 0.0 && f.abs() <= i64::MAX as f64 => f as i64,
        _ => return Err(format!("main_assignee_id {n} is not an integer")),
    };
    i32::try_from(whole).map_err(|_| format!("main_assignee_id {n} is out of range"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub task_id: i64,
    /// "link", "document" or "image".
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Byte count or a preformatted size string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /tasks/{id}/attachments`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAttachment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    pub size: Option<Value>,
    pub mime_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAttachment {
    pub fn into_attachment(self, id: i64, task_id: i64, now: DateTime<Utc>) -> Attachment {
        Attachment {
            id,
            task_id,
            kind: self.kind,
            name: self.name,
            url: self.url,
            size: self.size.filter(|v| !v.is_null()),
            mime_type: self.mime_type,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}
