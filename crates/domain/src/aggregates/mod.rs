//! Aggregates owned jointly by the local cache and the remote store.

pub mod character;

pub use character::{
    AbilityScores, CharacterAggregate, CharacterDraft, CharacterPatch, Currency, HitPoints,
    Overlay, ResourcePool, TrackedField,
};
