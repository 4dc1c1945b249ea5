//! Use cases - User story orchestration.
//!
//! - `sync` - local-first reads and writes of character aggregates
//! - `identity` - local/remote id mapping for combat actions

pub mod identity;
pub mod sync;

pub use identity::IdentityMapper;
pub use sync::{SyncCoordinator, SyncError, SyncEvent, SyncOptions, SyncPhase, SyncState};
