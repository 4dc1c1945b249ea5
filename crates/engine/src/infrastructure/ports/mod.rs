//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - The local cache (could swap SQLite -> IndexedDB/other)
//! - The remote store (could swap HTTP -> anything networked)
//! - Clock/Random (for testing)

mod error;
mod repos;
mod testing;

// =============================================================================
// Storage Ports
// =============================================================================
pub use repos::{LocalCache, RemoteStore};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use repos::{MockLocalCache, MockRemoteStore};

#[cfg(test)]
pub use testing::MockClockPort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::{LocalStorageError, RemoteError};
