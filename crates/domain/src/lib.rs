//! Herosheet domain types.
//!
//! Pure data and pure logic shared by the sync engine: the character
//! aggregate, combat-action sub-records with their dual identity, and the
//! conflict resolver. Nothing in this crate performs I/O.

pub mod aggregates;
pub mod combat_action;
pub mod conflict;
pub mod error;
pub mod ids;

pub use aggregates::{
    AbilityScores, CharacterAggregate, CharacterDraft, CharacterPatch, Currency, HitPoints,
    Overlay, ResourcePool, TrackedField,
};
pub use combat_action::{
    ActionCategory, CombatAction, CombatActionCollection, CombatActionData, CombatActionPatch,
    Identity, SubRecordKey,
};
pub use conflict::{
    apply_resolution, auto_resolve_conflict, content_fingerprint, detect_conflict,
    detect_conflict_strict, resolve_conflict, ConflictDecision, ConflictPolicy, Winner,
};
pub use error::DomainError;
pub use ids::{CharacterId, LocalId, RemoteId};
