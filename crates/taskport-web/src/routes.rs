//! Web routes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Json, Path, State, rejection::JsonRejection},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Value, json};
use taskport_store::{
    Document, EntityKind, Filter, SequenceAllocator, Store, StoreError, merge_fields,
    with_timeout,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::{Attachment, NewAttachment, NewTask, Subtask, Task, User};

const RECENT_LIMIT: usize = 5;

/// Shared state for the web server.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub allocator: SequenceAllocator,
    /// Bound on every store round trip.
    pub timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self {
            allocator: SequenceAllocator::new(Arc::clone(&store), timeout),
            store,
            timeout,
        }
    }

    async fn find<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<T>, ApiError> {
        let docs = with_timeout(self.timeout, self.store.find(kind.collection(), filter)).await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(ApiError::from))
            .collect()
    }

    async fn insert<T: Serialize>(&self, kind: EntityKind, model: &T) -> Result<(), ApiError> {
        let doc = to_document(model)?;
        with_timeout(self.timeout, self.store.insert(kind.collection(), doc)).await?;
        Ok(())
    }

    /// Merge `fields` into the first matching document, refusing any change that
    /// would leave it undecodable as `T`. Returns the merged model.
    async fn merge_checked<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        filter: &Filter,
        fields: Document,
        not_found: String,
    ) -> Result<T, ApiError> {
        let docs = with_timeout(self.timeout, self.store.find(kind.collection(), filter)).await?;
        let Some(mut merged) = docs.into_iter().next() else {
            return Err(ApiError::NotFound(not_found));
        };
        merge_fields(&mut merged, &fields);
        let model = serde_json::from_value(Value::Object(merged))
            .map_err(|e| ApiError::BadRequest(format!("invalid field value: {e}")))?;

        if self.update(kind, filter, fields).await? == 0 {
            return Err(ApiError::NotFound(not_found));
        }
        Ok(model)
    }

    async fn update(
        &self,
        kind: EntityKind,
        filter: &Filter,
        fields: Document,
    ) -> Result<usize, StoreError> {
        with_timeout(
            self.timeout,
            self.store.update_fields(kind.collection(), filter, fields),
        )
        .await
    }

    async fn delete(&self, kind: EntityKind, filter: &Filter) -> Result<usize, StoreError> {
        with_timeout(self.timeout, self.store.delete(kind.collection(), filter)).await
    }

    async fn subtasks_of(&self, task_id: i64) -> Result<Vec<Subtask>, ApiError> {
        self.find(EntityKind::Subtask, &Filter::all().eq("task_id", task_id))
            .await
    }

    /// Subtasks for a response view; a failed lookup degrades to an empty list.
    async fn attach_subtasks(&self, task: &mut Task) {
        match self.subtasks_of(task.id).await {
            Ok(subs) => task.subtasks = subs,
            Err(e) => {
                warn!(task_id = task.id, error = %e, "failed to load subtasks");
                task.subtasks = Vec::new();
            }
        }
    }
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        // Tasks
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/recent", get(recent_tasks))
        .route("/tasks/clear", post(clear_tasks))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        // Subtasks
        .route("/tasks/{id}/subtasks", post(create_subtask))
        .route(
            "/tasks/{id}/subtasks/{subtask_id}",
            put(update_subtask).delete(delete_subtask),
        )
        // Attachments
        .route(
            "/tasks/{id}/attachments",
            get(list_attachments).post(create_attachment),
        )
        .route(
            "/tasks/{id}/attachments/{attachment_id}",
            delete(delete_attachment),
        )
        // Users
        .route("/users", get(list_users))
        .layer(cors)
        .with_state(Arc::new(state))
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_id(raw: &str, message: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(message.to_string()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn to_document<T: Serialize>(model: &T) -> Result<Document, ApiError> {
    match serde_json::to_value(model)? {
        Value::Object(mut doc) => {
            doc.remove("subtasks");
            Ok(doc)
        }
        other => Err(ApiError::BadRequest(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Strip keys a client may not change, and nulls, which would break sparseness.
fn update_fields(mut fields: Document, immutable: &[&str]) -> Document {
    for key in immutable {
        fields.remove(*key);
    }
    fields.retain(|_, v| !v.is_null());
    fields
}

fn deleted() -> Json<Value> {
    Json(json!({ "status": "deleted" }))
}

// =============================================================================
// Tasks
// =============================================================================

async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    let mut tasks: Vec<Task> = state.find(EntityKind::Task, &Filter::all()).await?;
    tasks.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    for task in &mut tasks {
        state.attach_subtasks(task).await;
    }
    Ok(Json(tasks))
}

async fn recent_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    let mut tasks: Vec<Task> = state
        .find(EntityKind::Task, &Filter::all().eq("archived", false))
        .await?;
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    tasks.truncate(RECENT_LIMIT);
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let new_task = body(payload)?;
    let id = state.allocator.next(EntityKind::Task).await?;
    let task = new_task.into_task(id, Utc::now());
    state.insert(EntityKind::Task, &task).await?;
    info!(task_id = id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<Document>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_id(&id, "Invalid ID")?;
    let fields = update_fields(body(payload)?, &["id", "subtasks"]);

    let mut task: Task = state
        .merge_checked(
            EntityKind::Task,
            &Filter::id(id),
            fields,
            format!("task {id} not found"),
        )
        .await?;
    state.attach_subtasks(&mut task).await;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "Invalid ID")?;
    state.delete(EntityKind::Task, &Filter::id(id)).await?;
    Ok(deleted())
}

async fn clear_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let cleared = state
        .delete(EntityKind::Task, &Filter::all().eq("archived", false))
        .await?;
    info!(cleared, "cleared non-archived tasks");
    Ok(Json(json!({ "status": "cleared" })))
}

// =============================================================================
// Subtasks
// =============================================================================

async fn create_subtask(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    payload: Result<Json<Document>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = parse_id(&task_id, "Invalid task ID")?;
    let raw = body(payload)?;
    // Validate before allocating so a bad request does not consume an id.
    Subtask::from_body(0, task_id, &raw).map_err(ApiError::BadRequest)?;

    let id = state.allocator.next(EntityKind::Subtask).await?;
    let subtask = Subtask::from_body(id, task_id, &raw).map_err(ApiError::BadRequest)?;
    state.insert(EntityKind::Subtask, &subtask).await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

async fn update_subtask(
    State(state): State<Arc<AppState>>,
    Path((task_id, subtask_id)): Path<(String, String)>,
    payload: Result<Json<Document>, JsonRejection>,
) -> Result<Json<Subtask>, ApiError> {
    let task_id = parse_id(&task_id, "Invalid task ID")?;
    let subtask_id = parse_id(&subtask_id, "Invalid subtask ID")?;
    let fields = update_fields(body(payload)?, &["id", "task_id"]);
    let filter = Filter::id(subtask_id).eq("task_id", task_id);

    state
        .merge_checked(
            EntityKind::Subtask,
            &filter,
            fields,
            format!("subtask {subtask_id} of task {task_id} not found"),
        )
        .await
        .map(Json)
}

async fn delete_subtask(
    State(state): State<Arc<AppState>>,
    Path((task_id, subtask_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let task_id = parse_id(&task_id, "Invalid task ID")?;
    let subtask_id = parse_id(&subtask_id, "Invalid subtask ID")?;
    state
        .delete(
            EntityKind::Subtask,
            &Filter::id(subtask_id).eq("task_id", task_id),
        )
        .await?;
    Ok(deleted())
}

// =============================================================================
// Attachments
// =============================================================================

async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<Attachment>>, ApiError> {
    let task_id = parse_id(&task_id, "Invalid task ID")?;
    let mut attachments: Vec<Attachment> = state
        .find(EntityKind::Attachment, &Filter::all().eq("task_id", task_id))
        .await?;
    attachments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(attachments))
}

async fn create_attachment(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    payload: Result<Json<NewAttachment>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = parse_id(&task_id, "Invalid task ID")?;
    let new_attachment = body(payload)?;
    let id = state.allocator.next(EntityKind::Attachment).await?;
    let attachment = new_attachment.into_attachment(id, task_id, Utc::now());
    state.insert(EntityKind::Attachment, &attachment).await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    Path((task_id, attachment_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let task_id = parse_id(&task_id, "Invalid task ID")?;
    let attachment_id = parse_id(&attachment_id, "Invalid attachment ID")?;
    state
        .delete(
            EntityKind::Attachment,
            &Filter::id(attachment_id).eq("task_id", task_id),
        )
        .await?;
    Ok(deleted())
}

// =============================================================================
// Users
// =============================================================================

async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, ApiError> {
    let mut users: Vec<User> = state.find(EntityKind::User, &Filter::all()).await?;
    users.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(users))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use taskport_store::{CounterStore, DocumentStore, MemoryStore};
    use tower::ServiceExt;

    fn app(store: Arc<MemoryStore>) -> Router {
        create_router(AppState::new(store, Duration::from_secs(5)))
    }

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        call(router, "POST", uri, Some(body)).await
    }

    async fn put_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        call(router, "PUT", uri, Some(body)).await
    }

    #[tokio::test]
    async fn test_create_task_allocates_after_seeded_counter() {
        let store = Arc::new(MemoryStore::new());
        store.seed("taskid", 41).await.unwrap();
        let router = app(store.clone());

        let (status, task) = post(
            &router,
            "/tasks",
            json!({"id": 999, "title": "new", "description": ""}),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["id"], 42);
        assert_eq!(task["description"], "");
        let stored = store.get("tasks", 42).await.unwrap().unwrap();
        assert!(!stored.contains_key("priority"));
        assert!(store.get("tasks", 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_tasks_pinned_first_with_subtasks() {
        let store = Arc::new(MemoryStore::new());
        let router = app(store.clone());
        for body in [
            json!({"title": "old", "created_at": "2024-01-01T00:00:00Z"}),
            json!({"title": "new", "created_at": "2024-03-01T00:00:00Z"}),
            json!({"title": "pinned", "pinned": true, "created_at": "2023-01-01T00:00:00Z"}),
        ] {
            post(&router, "/tasks", body).await;
        }
        let (status, _) = post(&router, "/tasks/1/subtasks", json!({"title": "step"})).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, tasks) = call(&router, "GET", "/tasks", None).await;
        let titles: Vec<_> = tasks
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, ["pinned", "new", "old"]);
        assert_eq!(tasks[2]["subtasks"][0]["title"], "step");
        assert!(tasks[0].get("subtasks").is_none());
    }

    #[tokio::test]
    async fn test_update_task_merges_and_keeps_id() {
        let store = Arc::new(MemoryStore::new());
        let router = app(store.clone());
        post(&router, "/tasks", json!({"title": "a", "schedule": "daily"})).await;

        let (status, task) = put_json(
            &router,
            "/tasks/1",
            json!({"id": 50, "completed": true, "description": null}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["id"], 1);
        assert_eq!(task["completed"], true);
        assert_eq!(task["schedule"], "daily");
        let stored = store.get("tasks", 1).await.unwrap().unwrap();
        assert!(!stored.contains_key("description"));
    }

    #[tokio::test]
    async fn test_mistyped_update_is_rejected_before_writing() {
        let store = Arc::new(MemoryStore::new());
        let router = app(store.clone());
        post(&router, "/tasks", json!({"title": "a"})).await;
        post(&router, "/tasks/1/subtasks", json!({"title": "s"})).await;
        let before = store.get("tasks", 1).await.unwrap().unwrap();

        let (status, _) = put_json(&router, "/tasks/1", json!({"created_at": "garbage"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = put_json(&router, "/tasks/1", json!({"main_assignee_id": "x"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = put_json(
            &router,
            "/tasks/1/subtasks/1",
            json!({"main_assignee_id": 5_000_000_000i64}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(store.get("tasks", 1).await.unwrap().unwrap(), before);
        let (status, tasks) = call(&router, "GET", "/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tasks[0]["subtasks"][0]["title"], "s");
    }

    #[tokio::test]
    async fn test_invalid_and_missing_ids() {
        let router = app(Arc::new(MemoryStore::new()));

        let (status, err) = put_json(&router, "/tasks/abc", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "Invalid ID");

        let (status, _) = put_json(&router, "/tasks/7", json!({"title": "x"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, err) = call(&router, "DELETE", "/tasks/1/subtasks/zz", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "Invalid subtask ID");
    }

    #[tokio::test]
    async fn test_subtask_scope_and_delete() {
        let store = Arc::new(MemoryStore::new());
        let router = app(store.clone());
        post(&router, "/tasks/1/subtasks", json!({"title": "one"})).await;

        let moved = json!({"title": "moved"});
        let (status, _) = put_json(&router, "/tasks/2/subtasks/1", moved).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, sub) = put_json(
            &router,
            "/tasks/1/subtasks/1",
            json!({"completed": true, "task_id": 9}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sub["task_id"], 1);
        assert_eq!(sub["completed"], true);

        let (_, resp) = call(&router, "DELETE", "/tasks/1/subtasks/1", None).await;
        assert_eq!(resp, json!({"status": "deleted"}));
        assert!(store.is_empty("subtasks"));
    }

    #[tokio::test]
    async fn test_attachments_newest_first_and_ids_independent() {
        let store = Arc::new(MemoryStore::new());
        let router = app(store.clone());
        post(&router, "/tasks", json!({"title": "t"})).await;
        post(
            &router,
            "/tasks/1/attachments",
            json!({
                "type": "link",
                "name": "a",
                "url": "https://a",
                "created_at": "2024-01-01T00:00:00Z",
            }),
        )
        .await;
        let (status, b) = post(
            &router,
            "/tasks/1/attachments",
            json!({"type": "document", "name": "b", "url": "https://b", "size": "2 MB"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(b["id"], 2);

        let (_, list) = call(&router, "GET", "/tasks/1/attachments", None).await;
        assert_eq!(list[0]["name"], "b");
        assert_eq!(list[0]["size"], "2 MB");
        assert_eq!(list[1]["name"], "a");
        assert_eq!(store.current("attachmentid").await.unwrap(), Some(2));
        assert_eq!(store.current("taskid").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_clear_keeps_archived_and_users_sorted() {
        let store = Arc::new(MemoryStore::new());
        let router = app(store.clone());
        post(&router, "/tasks", json!({"title": "live"})).await;
        post(&router, "/tasks", json!({"title": "kept", "archived": true})).await;
        for (id, name) in [(1, "Zoe"), (2, "Ada")] {
            let doc = json!({"id": id, "name": name}).as_object().cloned().unwrap();
            store.insert("users", doc).await.unwrap();
        }

        let (_, resp) = call(&router, "POST", "/tasks/clear", None).await;
        assert_eq!(resp, json!({"status": "cleared"}));
        assert_eq!(store.len("tasks"), 1);

        let (_, users) = call(&router, "GET", "/users", None).await;
        assert_eq!(users, json!([{"id": 2, "name": "Ada"}, {"id": 1, "name": "Zoe"}]));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request_and_burns_no_id() {
        let store = Arc::new(MemoryStore::new());
        let router = app(store.clone());

        let body = json!({"main_assignee_id": 1e12});
        let (status, _) = post(&router, "/tasks/1/subtasks", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.current("subtaskid").await.unwrap(), None);
    }
}
