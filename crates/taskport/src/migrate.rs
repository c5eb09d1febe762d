//! The `migrate` subcommand.

use std::time::Duration;

use miette::Result;
use tracing::info;

use taskport_migrate::{MigrationOptions, MigrationSummary, Migrator, SourceReader};
use taskport_store::open_store;

/// Run one migration pass and print its summary line on stdout.
pub async fn run(source: &str, target: &str, dry_run: bool, store_timeout: Duration) -> Result<()> {
    let summary = execute(source, target, dry_run, store_timeout).await?;
    println!("{summary}");
    Ok(())
}

async fn execute(
    source: &str,
    target: &str,
    dry_run: bool,
    store_timeout: Duration,
) -> Result<MigrationSummary> {
    info!(source, target, dry_run, "starting migration");

    let reader = SourceReader::open(source).map_err(|e| miette::miette!("{}", e))?;
    let store =
        open_store(target).map_err(|e| miette::miette!("failed to open target store: {}", e))?;

    let options = MigrationOptions {
        dry_run,
        store_timeout,
    };
    Migrator::new(reader, store, options)
        .run()
        .await
        .map_err(|e| miette::miette!("migration failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_source_fails_before_touching_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("absent.db");
        let target = dir.path().join("docs.db");
        let target_uri = format!("sqlite://{}", target.display());

        let result = execute(
            source.to_str().unwrap(),
            &target_uri,
            false,
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_err());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_bad_target_uri_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A zero-length file is a valid empty SQLite database.
        let source = dir.path().join("empty.db");
        std::fs::File::create(&source).unwrap();

        let result = execute(
            source.to_str().unwrap(),
            "mongodb://localhost",
            false,
            Duration::from_secs(5),
        )
        .await;
        let message = format!("{}", result.unwrap_err());
        assert!(message.contains("target"), "{message}");
    }
}
