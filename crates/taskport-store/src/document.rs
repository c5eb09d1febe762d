//! Sparse documents, filters and merge semantics shared by every backend.

use serde_json::{Map, Value};

/// A sparse JSON document. Absent fields are simply missing keys, never nulls.
pub type Document = Map<String, Value>;

/// Result of an upsert against a single business id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document existed; one was created.
    Inserted,
    /// The document existed and at least one field changed.
    Updated,
    /// The document already held every supplied field with the same value.
    Unchanged,
}

/// Read the business id of a document.
pub fn business_id(doc: &Document) -> Option<i64> {
    doc.get("id").and_then(Value::as_i64)
}

/// Merge `incoming` into `existing` field by field.
///
/// Fields present in `incoming` are set; fields only in `existing` are kept.
/// Returns whether anything changed.
pub fn merge_fields(existing: &mut Document, incoming: &Document) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        if existing.get(key) != Some(value) {
            existing.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Conjunction of field-equality predicates.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter on the business id.
    pub fn id(id: i64) -> Self {
        Self::all().eq("id", id)
    }

    /// Add an equality clause.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// The business id this filter pins, if it has an integer `id` clause.
    pub fn pinned_id(&self) -> Option<i64> {
        self.clauses
            .iter()
            .find(|(field, _)| field == "id")
            .and_then(|(_, value)| value.as_i64())
    }

    /// Whether `doc` satisfies every clause.
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, expected)| doc.get(field).is_some_and(|v| values_equal(v, expected)))
    }
}

// Integers stored as i64 and u64 compare equal when they denote the same number.
fn values_equal(stored: &Value, expected: &Value) -> bool {
    match (stored, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => stored == expected,
    }
}
