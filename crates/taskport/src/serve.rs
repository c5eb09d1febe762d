//! The `serve` subcommand.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tracing::info;

use taskport_store::{EntityKind, Store, open_store};
use taskport_web::{AppState, create_router};

pub async fn run(target: &str, port: u16, store_timeout: Duration) -> Result<()> {
    let store = open_store(target).map_err(|e| miette::miette!("failed to open store: {}", e))?;
    let state = prepare(store, store_timeout).await?;
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    info!("api server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    Ok(())
}

/// Raise every counter above the ids already stored, so live allocation never
/// hands out an id that is taken.
async fn prepare(store: Arc<dyn Store>, store_timeout: Duration) -> Result<AppState> {
    let state = AppState::new(store, store_timeout);
    for kind in EntityKind::ALL {
        state
            .allocator
            .ensure_floor(kind)
            .await
            .map_err(|e| miette::miette!("refusing to serve: {}", e))?;
    }
    Ok(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskport_store::{CounterStore, DocumentStore, MemoryStore};

    #[tokio::test]
    async fn test_prepare_raises_lagging_counters() {
        let store = Arc::new(MemoryStore::new());
        let mut doc = taskport_store::Document::new();
        doc.insert("id".to_string(), 12.into());
        store.insert("tasks", doc).await.unwrap();
        store.seed("subtaskid", 40).await.unwrap();

        let state = prepare(store.clone(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(store.current("taskid").await.unwrap(), Some(12));
        assert_eq!(store.current("subtaskid").await.unwrap(), Some(40));
        assert_eq!(state.allocator.next(EntityKind::Task).await.unwrap(), 13);
        assert_eq!(state.allocator.next(EntityKind::User).await.unwrap(), 1);
    }
}
