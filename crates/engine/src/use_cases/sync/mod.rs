//! Local-first synchronization of character aggregates.
//!
//! The coordinator answers reads and writes from the local cache, reconciles
//! with the remote store when it can, and replicates local changes through
//! background pushes that never block the caller.

mod coordinator;
mod error;
mod events;
mod state;

pub use coordinator::{SyncCoordinator, SyncOptions};
pub use error::SyncError;
pub use events::{SyncEvent, SyncEvents};
pub use state::{SyncPhase, SyncState};

use tokio_util::task::TaskTracker;

/// Waits for every task spawned on `tasks`, then accepts new work again.
pub(crate) async fn wait_idle(tasks: &TaskTracker) {
    tasks.close();
    tasks.wait().await;
    tasks.reopen();
}
