//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    config::SyncConfig,
    http_remote::HttpRemoteStore,
    ports::{ClockPort, LocalCache, RandomPort, RemoteStore},
    sqlite_cache::SqliteLocalCache,
    timeout_remote::TimeoutRemoteStore,
};
use crate::use_cases::{SyncCoordinator, SyncOptions};

/// Main application state.
pub struct App {
    pub config: SyncConfig,
    pub sync: SyncCoordinator,
}

impl App {
    /// Composes the application from already-built adapters.
    pub fn new(
        config: SyncConfig,
        local: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let options = SyncOptions {
            policy: config.conflict_policy,
            strict_conflicts: config.strict_conflicts,
        };
        let sync = SyncCoordinator::new(local, remote, clock, random, options);
        Self { config, sync }
    }

    /// Opens the SQLite cache and the HTTP remote described by `config`.
    pub async fn from_config(config: SyncConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

        tracing::info!(path = %config.cache_db, "Opening local cache");
        let local = Arc::new(SqliteLocalCache::new(&config.cache_db, clock.clone()).await?);

        tracing::info!(
            url = %config.remote_url,
            timeout_ms = config.remote_timeout.as_millis() as u64,
            "Using remote store"
        );
        let http = Arc::new(HttpRemoteStore::new(&config.remote_url, config.remote_timeout)?);
        let remote = Arc::new(TimeoutRemoteStore::new(http, config.remote_timeout));

        Ok(Self::new(
            config,
            local,
            remote,
            clock,
            Arc::new(SystemRandom::new()),
        ))
    }
}
