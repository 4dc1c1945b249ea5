//! Herosheet sync - reconciles the local cache with the remote store.
//!
//! Loads configuration, restores the sync table from the cache, lets every
//! background push finish, and reports where each character ended up.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herosheet_engine::infrastructure::config::SyncConfig;
use herosheet_engine::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root.
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herosheet_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Herosheet sync");

    let config = SyncConfig::from_env();
    let app = App::from_config(config).await?;

    let restored = app.sync.restore().await?;
    app.sync.drain().await;

    let mut pending = 0;
    for id in &restored {
        let Some(state) = app.sync.sync_state(id) else {
            continue;
        };
        if state.pending_push {
            pending += 1;
        }
        tracing::info!(
            character_id = %id,
            pending_push = state.pending_push,
            last_remote_update = ?state.last_known_remote_timestamp,
            last_error = state.last_error.as_deref().unwrap_or("-"),
            "Sync state"
        );
    }

    tracing::info!(
        characters = restored.len(),
        pending,
        "Sync pass finished"
    );
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
    // Fall back to the working directory.
    let _ = dotenvy::dotenv();
}
