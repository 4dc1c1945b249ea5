//! Conflict detection and resolution between the local and remote copies of
//! a character aggregate.
//!
//! Everything here is pure: no I/O, and inputs are never mutated.
//!
//! # Detection
//!
//! Two copies conflict when their `updated_at` timestamps differ *and* at least
//! one tracked field differs. Equal timestamps short-circuit to "no conflict",
//! even if the content differs. That is the cheap fast path; if two mutations
//! land on the same clock tick a real divergence is missed.
//! [`detect_conflict_strict`] closes that gap with a content fingerprint and
//! is opt-in.
//!
//! # Resolution
//!
//! The default policy is local-wins: the local cache holds the user's most
//! recent in-session intent. The losing copy is always returned in the
//! decision so the caller can log it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aggregates::{
    AbilityScores, CharacterAggregate, Currency, HitPoints, Overlay, ResourcePool, TrackedField,
};
use crate::error::DomainError;

/// Which copy's values take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Local,
    Remote,
    /// Field-level merge where the newer copy takes precedence.
    Merged,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Local => write!(f, "local"),
            Winner::Remote => write!(f, "remote"),
            Winner::Merged => write!(f, "merged"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    LocalWins,
    RemoteWins,
    FieldMerge,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::LocalWins => write!(f, "local_wins"),
            ConflictPolicy::RemoteWins => write!(f, "remote_wins"),
            ConflictPolicy::FieldMerge => write!(f, "field_merge"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local_wins" | "localwins" | "local" => Ok(ConflictPolicy::LocalWins),
            "remote_wins" | "remotewins" | "remote" => Ok(ConflictPolicy::RemoteWins),
            "field_merge" | "fieldmerge" | "merge" => Ok(ConflictPolicy::FieldMerge),
            other => Err(DomainError::parse(format!(
                "Unknown conflict policy: {other}"
            ))),
        }
    }
}

/// Outcome of resolving a conflict. Consumed once by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDecision {
    pub winner: Winner,
    pub merged_aggregate: CharacterAggregate,
    pub divergent_fields: Vec<TrackedField>,
    /// The copy whose divergent values lost, kept for auditing.
    pub discarded: CharacterAggregate,
}

/// True when both copies exist, their timestamps differ, and some tracked
/// field differs.
pub fn detect_conflict(
    local: Option<&CharacterAggregate>,
    remote: Option<&CharacterAggregate>,
) -> bool {
    match (local, remote) {
        (Some(local), Some(remote)) => {
            local.updated_at != remote.updated_at && !local.same_content(remote)
        }
        _ => false,
    }
}

/// Like [`detect_conflict`], but equal timestamps fall through to a content
/// fingerprint comparison instead of short-circuiting.
pub fn detect_conflict_strict(
    local: Option<&CharacterAggregate>,
    remote: Option<&CharacterAggregate>,
) -> bool {
    match (local, remote) {
        (Some(l), Some(r)) if l.updated_at == r.updated_at => {
            content_fingerprint(l) != content_fingerprint(r)
        }
        _ => detect_conflict(local, remote),
    }
}

/// Hex SHA-256 over the canonical JSON of the tracked fields.
pub fn content_fingerprint(aggregate: &CharacterAggregate) -> String {
    #[derive(Serialize)]
    struct Tracked<'a> {
        name: &'a str,
        race: &'a Option<String>,
        class_name: &'a Option<String>,
        level: u8,
        experience: u32,
        ability_scores: &'a AbilityScores,
        currency: &'a Currency,
        hit_points: &'a HitPoints,
        resource_pools: &'a BTreeMap<String, ResourcePool>,
    }

    let tracked = Tracked {
        name: &aggregate.name,
        race: &aggregate.race,
        class_name: &aggregate.class_name,
        level: aggregate.level,
        experience: aggregate.experience,
        ability_scores: &aggregate.ability_scores,
        currency: &aggregate.currency,
        hit_points: &aggregate.hit_points,
        resource_pools: &aggregate.resource_pools,
    };

    let mut hasher = Sha256::new();
    // Serializing plain structs and a BTreeMap cannot fail.
    if let Ok(bytes) = serde_json::to_vec(&tracked) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}

/// Resolves with the default local-wins policy.
pub fn auto_resolve_conflict(
    local: &CharacterAggregate,
    remote: &CharacterAggregate,
) -> ConflictDecision {
    resolve_conflict(ConflictPolicy::LocalWins, local, remote)
}

pub fn resolve_conflict(
    policy: ConflictPolicy,
    local: &CharacterAggregate,
    remote: &CharacterAggregate,
) -> ConflictDecision {
    let winner = match policy {
        ConflictPolicy::LocalWins => Winner::Local,
        ConflictPolicy::RemoteWins => Winner::Remote,
        ConflictPolicy::FieldMerge => Winner::Merged,
    };
    let discarded = match precedence(winner, local, remote) {
        Side::Local => remote.clone(),
        Side::Remote => local.clone(),
    };

    ConflictDecision {
        winner,
        merged_aggregate: merge(winner, local, remote),
        divergent_fields: local.divergent_fields(remote),
        discarded,
    }
}

/// Produces the aggregate a decision resolves to.
///
/// Scalar fields take the preferred side's value. Nested groups are merged
/// key-by-key: the preferred side's keys win and the other side only fills
/// keys the preferred side never set, so a partial update on one side is not
/// erased by an untouched group on the other. For `Merged`, the copy with the
/// newer `updated_at` is preferred (local on a tie).
pub fn apply_resolution(
    local: &CharacterAggregate,
    remote: &CharacterAggregate,
    decision: &ConflictDecision,
) -> CharacterAggregate {
    merge(decision.winner, local, remote)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Local,
    Remote,
}

fn precedence(winner: Winner, local: &CharacterAggregate, remote: &CharacterAggregate) -> Side {
    match winner {
        Winner::Local => Side::Local,
        Winner::Remote => Side::Remote,
        Winner::Merged if remote.updated_at > local.updated_at => Side::Remote,
        Winner::Merged => Side::Local,
    }
}

fn merge(
    winner: Winner,
    local: &CharacterAggregate,
    remote: &CharacterAggregate,
) -> CharacterAggregate {
    let (preferred, other) = match precedence(winner, local, remote) {
        Side::Local => (local, remote),
        Side::Remote => (remote, local),
    };

    CharacterAggregate {
        // The local id is the cache key; both copies share it in practice.
        id: local.id.clone(),
        name: preferred.name.clone(),
        race: preferred.race.clone(),
        class_name: preferred.class_name.clone(),
        level: preferred.level,
        experience: preferred.experience,
        ability_scores: preferred.ability_scores.overlay(&other.ability_scores),
        currency: preferred.currency.overlay(&other.currency),
        hit_points: preferred.hit_points.overlay(&other.hit_points),
        resource_pools: preferred.resource_pools.overlay(&other.resource_pools),
        updated_at: match winner {
            Winner::Merged => local.updated_at.max(remote.updated_at),
            _ => preferred.updated_at,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::CharacterDraft;
    use crate::ids::CharacterId;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64, gp: u32, exp: u32) -> CharacterAggregate {
        let mut draft = CharacterDraft::new("Lidda");
        draft.experience = exp;
        draft.currency = Currency::gold(gp);
        CharacterAggregate::from_draft(
            CharacterId::new("char-7"),
            draft,
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[test]
    fn no_conflict_when_either_side_missing() {
        let a = at(100, 150, 6500);
        assert!(!detect_conflict(Some(&a), None));
        assert!(!detect_conflict(None, Some(&a)));
        assert!(!detect_conflict(None, None));
    }

    #[test]
    fn identical_timestamps_are_not_a_conflict_even_if_fields_differ() {
        let a = at(100, 150, 6500);
        let b = at(100, 999, 0);
        assert!(!detect_conflict(Some(&a), Some(&b)));
    }

    #[test]
    fn differing_timestamps_with_equal_content_are_not_a_conflict() {
        let a = at(100, 150, 6500);
        let b = at(90, 150, 6500);
        assert!(!detect_conflict(Some(&a), Some(&b)));
    }

    #[test]
    fn differing_timestamps_and_content_conflict() {
        let a = at(100, 150, 6500);
        let b = at(90, 200, 6500);
        assert!(detect_conflict(Some(&a), Some(&b)));
    }

    #[test]
    fn strict_detection_catches_same_tick_divergence() {
        let a = at(100, 150, 6500);
        let b = at(100, 999, 6500);
        assert!(!detect_conflict(Some(&a), Some(&b)));
        assert!(detect_conflict_strict(Some(&a), Some(&b)));
        assert!(!detect_conflict_strict(Some(&a), Some(&a.clone())));
    }

    #[test]
    fn fingerprint_ignores_updated_at() {
        assert_eq!(
            content_fingerprint(&at(1, 5, 5)),
            content_fingerprint(&at(2, 5, 5))
        );
        assert_ne!(
            content_fingerprint(&at(1, 5, 5)),
            content_fingerprint(&at(1, 6, 5))
        );
    }

    #[test]
    fn local_wins_even_when_remote_is_newer_and_keeps_remote_only_keys() {
        let mut local = at(100, 150, 6500);
        local.currency.sp = None;
        let mut remote = at(200, 200, 7000);
        remote.currency.pp = Some(4);
        remote
            .resource_pools
            .insert("spell_slots_1".to_string(), ResourcePool::new(2, 4));

        let decision = auto_resolve_conflict(&local, &remote);
        assert_eq!(decision.winner, Winner::Local);
        assert_eq!(
            decision.divergent_fields,
            vec![
                TrackedField::Experience,
                TrackedField::Currency,
                TrackedField::ResourcePools
            ]
        );
        assert_eq!(decision.discarded, remote);

        let merged = apply_resolution(&local, &remote, &decision);
        assert_eq!(merged.currency.gp, Some(150));
        assert_eq!(merged.experience, 6500);
        assert_eq!(merged.currency.pp, Some(4));
        assert_eq!(
            merged.resource_pools.get("spell_slots_1"),
            Some(&ResourcePool::new(2, 4))
        );
        assert_eq!(merged.updated_at, local.updated_at);
        assert_eq!(merged, decision.merged_aggregate);
    }

    #[test]
    fn resolution_does_not_mutate_inputs() {
        let local = at(100, 150, 6500);
        let remote = at(90, 200, 6500);
        let (local_before, remote_before) = (local.clone(), remote.clone());

        let decision = auto_resolve_conflict(&local, &remote);
        let _ = apply_resolution(&local, &remote, &decision);

        assert_eq!(local, local_before);
        assert_eq!(remote, remote_before);
    }

    #[test]
    fn remote_wins_policy_prefers_remote_scalars() {
        let local = at(100, 150, 6500);
        let remote = at(90, 200, 7000);

        let decision = resolve_conflict(ConflictPolicy::RemoteWins, &local, &remote);

        assert_eq!(decision.winner, Winner::Remote);
        assert_eq!(decision.merged_aggregate.currency.gp, Some(200));
        assert_eq!(decision.merged_aggregate.experience, 7000);
        assert_eq!(decision.discarded, local);
    }

    #[test]
    fn field_merge_prefers_newer_copy_and_takes_latest_timestamp() {
        let mut local = at(100, 150, 6500);
        local.currency.cp = Some(7);
        let remote = at(120, 200, 7000);

        let decision = resolve_conflict(ConflictPolicy::FieldMerge, &local, &remote);
        let merged = apply_resolution(&local, &remote, &decision);

        assert_eq!(decision.winner, Winner::Merged);
        assert_eq!(merged.currency.gp, Some(200));
        assert_eq!(merged.currency.cp, Some(7));
        assert_eq!(merged.experience, 7000);
        assert_eq!(merged.updated_at, remote.updated_at);
    }

    #[test]
    fn policy_parses_leniently() {
        assert_eq!(
            "Local_Wins".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::LocalWins
        );
        assert_eq!(
            " merge ".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::FieldMerge
        );
        assert!("newest".parse::<ConflictPolicy>().is_err());
        assert_eq!(ConflictPolicy::RemoteWins.to_string(), "remote_wins");
    }
}
