//! Projection of source rows into sparse documents.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use taskport_store::{Document, EntityKind};

use crate::error::MigrateError;
use crate::source::{SubtaskRow, TaskRow, UserRow};

/// A source row that maps onto one document of a single entity kind.
pub trait SourceRecord {
    /// Kind of document this row becomes.
    const KIND: EntityKind;

    /// Business identifier of the row.
    fn id(&self) -> i64;

    /// Build the document: mandatory fields always, optional fields only when present.
    fn project(&self) -> Result<Document, MigrateError>;
}

/// Narrow a 64-bit source value into a field that holds a 32-bit integer.
pub fn narrow_i32(
    kind: EntityKind,
    id: i64,
    field: &'static str,
    value: i64,
) -> Result<i32, MigrateError> {
    i32::try_from(value).map_err(|_| MigrateError::ProjectionRange {
        kind,
        id,
        field,
        value,
    })
}

fn put(doc: &mut Document, key: &str, value: impl Into<Value>) {
    doc.insert(key.to_string(), value.into());
}

fn put_opt<V: Into<Value>>(doc: &mut Document, key: &str, value: Option<V>) {
    if let Some(value) = value {
        put(doc, key, value);
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl SourceRecord for UserRow {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> i64 {
        self.id
    }

    fn project(&self) -> Result<Document, MigrateError> {
        let mut doc = Document::new();
        put(&mut doc, "id", self.id);
        put(&mut doc, "name", self.name.clone());
        Ok(doc)
    }
}

impl SourceRecord for TaskRow {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> i64 {
        self.id
    }

    fn project(&self) -> Result<Document, MigrateError> {
        let assignee = self
            .main_assignee_id
            .map(|v| narrow_i32(Self::KIND, self.id, "main_assignee_id", v))
            .transpose()?;

        let mut doc = Document::new();
        put(&mut doc, "id", self.id);
        put(&mut doc, "title", self.title.clone());
        put(&mut doc, "completed", self.completed);
        put(&mut doc, "archived", self.archived);
        put(&mut doc, "pinned", self.pinned);
        put(&mut doc, "created_at", timestamp(&self.created_at));
        put_opt(&mut doc, "description", self.description.clone());
        put_opt(&mut doc, "priority", self.priority.clone());
        put_opt(&mut doc, "type", self.task_type.clone());
        put_opt(&mut doc, "main_assignee_id", assignee);
        put_opt(&mut doc, "supporting_assignees", self.supporting_assignees.clone());
        put_opt(&mut doc, "schedule", self.schedule.clone());
        Ok(doc)
    }
}

impl SourceRecord for SubtaskRow {
    const KIND: EntityKind = EntityKind::Subtask;

    fn id(&self) -> i64 {
        self.id
    }

    fn project(&self) -> Result<Document, MigrateError> {
        let assignee = self
            .main_assignee_id
            .map(|v| narrow_i32(Self::KIND, self.id, "main_assignee_id", v))
            .transpose()?;

        let mut doc = Document::new();
        put(&mut doc, "id", self.id);
        put(&mut doc, "task_id", self.task_id);
        put(&mut doc, "title", self.title.clone());
        put(&mut doc, "completed", self.completed);
        put_opt(&mut doc, "main_assignee_id", assignee);
        put_opt(&mut doc, "supporting_assignees", self.supporting_assignees.clone());
        put_opt(&mut doc, "schedule", self.schedule.clone());
        Ok(doc)
    }
}
