//! Entity kinds and their collection and counter names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kinds of entity that carry a business identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Task,
    Subtask,
    Attachment,
}

impl EntityKind {
    /// Every kind, in migration dependency order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::User,
        EntityKind::Task,
        EntityKind::Subtask,
        EntityKind::Attachment,
    ];

    /// Name of the document collection holding this kind.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Task => "tasks",
            EntityKind::Subtask => "subtasks",
            EntityKind::Attachment => "attachments",
        }
    }

    /// Key of this kind's record in the `counters` collection.
    pub fn counter_key(self) -> &'static str {
        match self {
            EntityKind::User => "userid",
            EntityKind::Task => "taskid",
            EntityKind::Subtask => "subtaskid",
            EntityKind::Attachment => "attachmentid",
        }
    }

    /// Singular label used in logs and summaries.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Task => "task",
            EntityKind::Subtask => "subtask",
            EntityKind::Attachment => "attachment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
