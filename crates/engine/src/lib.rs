//! Herosheet Engine library.
//!
//! Keeps character sheets in a local cache and an authoritative remote
//! store at the same time, and keeps the two in step.
//!
//! ## Structure
//!
//! - `infrastructure/` - Ports and their adapters (SQLite, HTTP, in-memory)
//! - `use_cases/` - Sync coordination and identity mapping
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
