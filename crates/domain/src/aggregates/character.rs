//! Character aggregate - the full synchronized record for one character.
//!
//! Nested groups (ability scores, currency, hit points, resource pools) keep
//! every key optional. An absent key means "this side never set it", which is
//! what lets a merge fill gaps from the other copy without ever overwriting a
//! value that was actually written.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::CharacterId;

/// Key-by-key merge for nested groups.
///
/// `self` takes precedence; `fallback` only supplies keys absent in `self`.
pub trait Overlay {
    fn overlay(&self, fallback: &Self) -> Self;
}

macro_rules! impl_overlay {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl Overlay for $ty {
            fn overlay(&self, fallback: &Self) -> Self {
                Self {
                    $($field: self.$field.or(fallback.$field),)+
                }
            }
        }
    };
}

/// The six ability scores. Derived modifiers are computed elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dexterity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constitution: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wisdom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charisma: Option<u8>,
}

impl_overlay!(AbilityScores {
    strength,
    dexterity,
    constitution,
    intelligence,
    wisdom,
    charisma,
});

/// Coin purse broken down by denomination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ep: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pp: Option<u32>,
}

impl_overlay!(Currency { cp, sp, ep, gp, pp });

impl Currency {
    pub fn gold(gp: u32) -> Self {
        Self {
            gp: Some(gp),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitPoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary: Option<i32>,
}

impl_overlay!(HitPoints {
    current,
    maximum,
    temporary,
});

/// A spendable pool such as spell slots, ki points, or hit dice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    pub current: u32,
    pub maximum: u32,
}

impl ResourcePool {
    pub fn new(current: u32, maximum: u32) -> Self {
        Self { current, maximum }
    }
}

impl Overlay for BTreeMap<String, ResourcePool> {
    fn overlay(&self, fallback: &Self) -> Self {
        let mut merged = fallback.clone();
        merged.extend(self.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }
}

/// Fields compared when deciding whether two copies diverge.
///
/// `updated_at` is deliberately absent: it is sync metadata, not content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Name,
    Race,
    ClassName,
    Level,
    Experience,
    AbilityScores,
    Currency,
    HitPoints,
    ResourcePools,
}

impl TrackedField {
    pub const ALL: [TrackedField; 9] = [
        TrackedField::Name,
        TrackedField::Race,
        TrackedField::ClassName,
        TrackedField::Level,
        TrackedField::Experience,
        TrackedField::AbilityScores,
        TrackedField::Currency,
        TrackedField::HitPoints,
        TrackedField::ResourcePools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedField::Name => "name",
            TrackedField::Race => "race",
            TrackedField::ClassName => "class_name",
            TrackedField::Level => "level",
            TrackedField::Experience => "experience",
            TrackedField::AbilityScores => "ability_scores",
            TrackedField::Currency => "currency",
            TrackedField::HitPoints => "hit_points",
            TrackedField::ResourcePools => "resource_pools",
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete synchronized record for one character.
///
/// Both the local cache and the remote store hold an independent copy; the
/// two are only reconciled by the conflict resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterAggregate {
    pub id: CharacterId,

    // Identity
    pub name: String,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    pub level: u8,
    #[serde(default)]
    pub experience: u32,

    // Nested groups (merged key-by-key)
    #[serde(default)]
    pub ability_scores: AbilityScores,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub hit_points: HitPoints,
    #[serde(default)]
    pub resource_pools: BTreeMap<String, ResourcePool>,

    pub updated_at: DateTime<Utc>,
}

impl CharacterAggregate {
    /// Builds an aggregate from a validated draft and the id the backend assigned.
    pub fn from_draft(id: CharacterId, draft: CharacterDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            race: draft.race,
            class_name: draft.class_name,
            level: draft.level,
            experience: draft.experience,
            ability_scores: draft.ability_scores,
            currency: draft.currency,
            hit_points: draft.hit_points,
            resource_pools: draft.resource_pools,
            updated_at: now,
        }
    }

    /// Fields whose values differ between `self` and `other`, in declaration order.
    pub fn divergent_fields(&self, other: &CharacterAggregate) -> Vec<TrackedField> {
        TrackedField::ALL
            .into_iter()
            .filter(|field| !self.field_eq(other, *field))
            .collect()
    }

    /// True when every tracked field matches, regardless of `updated_at`.
    pub fn same_content(&self, other: &CharacterAggregate) -> bool {
        TrackedField::ALL
            .into_iter()
            .all(|field| self.field_eq(other, field))
    }

    fn field_eq(&self, other: &CharacterAggregate, field: TrackedField) -> bool {
        match field {
            TrackedField::Name => self.name == other.name,
            TrackedField::Race => self.race == other.race,
            TrackedField::ClassName => self.class_name == other.class_name,
            TrackedField::Level => self.level == other.level,
            TrackedField::Experience => self.experience == other.experience,
            TrackedField::AbilityScores => self.ability_scores == other.ability_scores,
            TrackedField::Currency => self.currency == other.currency,
            TrackedField::HitPoints => self.hit_points == other.hit_points,
            TrackedField::ResourcePools => self.resource_pools == other.resource_pools,
        }
    }

    /// Applies a partial mutation in place.
    ///
    /// Scalar fields present in the patch replace the current value. Nested
    /// groups are overlaid so a patch touching `gp` leaves `sp` alone.
    /// `updated_at` is not touched here; the local cache stamps it on write.
    pub fn apply_patch(&mut self, patch: CharacterPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(race) = patch.race {
            self.race = Some(race);
        }
        if let Some(class_name) = patch.class_name {
            self.class_name = Some(class_name);
        }
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(experience) = patch.experience {
            self.experience = experience;
        }
        if let Some(scores) = patch.ability_scores {
            self.ability_scores = scores.overlay(&self.ability_scores);
        }
        if let Some(currency) = patch.currency {
            self.currency = currency.overlay(&self.currency);
        }
        if let Some(hit_points) = patch.hit_points {
            self.hit_points = hit_points.overlay(&self.hit_points);
        }
        if !patch.resource_pools.is_empty() {
            self.resource_pools = patch.resource_pools.overlay(&self.resource_pools);
        }
    }
}

/// Input for the "create character" operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDraft {
    pub name: String,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    pub level: u8,
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub ability_scores: AbilityScores,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub hit_points: HitPoints,
    #[serde(default)]
    pub resource_pools: BTreeMap<String, ResourcePool>,
}

impl CharacterDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("Character name cannot be empty"));
        }
        if !(1..=20).contains(&self.level) {
            return Err(DomainError::validation(format!(
                "Character level must be between 1 and 20, got {}",
                self.level
            )));
        }
        Ok(())
    }
}

/// A partial mutation. `None` / empty means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability_scores: Option<AbilityScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_points: Option<HitPoints>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_pools: BTreeMap<String, ResourcePool>,
}

impl CharacterPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("Character name cannot be empty"));
            }
        }
        if let Some(level) = self.level {
            if !(1..=20).contains(&level) {
                return Err(DomainError::validation(format!(
                    "Character level must be between 1 and 20, got {level}"
                )));
            }
        }
        Ok(())
    }

    pub fn with_experience(mut self, experience: u32) -> Self {
        self.experience = Some(experience);
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn with_current_hp(mut self, current: i32) -> Self {
        let mut hit_points = self.hit_points.unwrap_or_default();
        hit_points.current = Some(current);
        self.hit_points = Some(hit_points);
        self
    }

    pub fn with_resource_pool(mut self, name: impl Into<String>, pool: ResourcePool) -> Self {
        self.resource_pools.insert(name.into(), pool);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> CharacterAggregate {
        let mut draft = CharacterDraft::new("Tordek");
        draft.class_name = Some("Fighter".to_string());
        draft.currency = Currency {
            gp: Some(150),
            sp: Some(12),
            ..Currency::default()
        };
        draft.hit_points = HitPoints {
            current: Some(12),
            maximum: Some(12),
            temporary: None,
        };
        CharacterAggregate::from_draft(
            CharacterId::new("char-1"),
            draft,
            Utc.timestamp_opt(100, 0).unwrap(),
        )
    }

    #[test]
    fn overlay_prefers_self_and_fills_absent_keys() {
        let winner = Currency {
            gp: Some(150),
            ..Currency::default()
        };
        let loser = Currency {
            gp: Some(200),
            pp: Some(3),
            ..Currency::default()
        };

        let merged = winner.overlay(&loser);

        assert_eq!(merged.gp, Some(150));
        assert_eq!(merged.pp, Some(3));
        assert_eq!(merged.cp, None);
    }

    #[test]
    fn resource_pool_overlay_is_key_by_key() {
        let mut winner = BTreeMap::new();
        winner.insert("ki".to_string(), ResourcePool::new(1, 4));
        let mut loser = BTreeMap::new();
        loser.insert("ki".to_string(), ResourcePool::new(4, 4));
        loser.insert("hit_dice".to_string(), ResourcePool::new(2, 4));

        let merged = winner.overlay(&loser);

        assert_eq!(merged["ki"], ResourcePool::new(1, 4));
        assert_eq!(merged["hit_dice"], ResourcePool::new(2, 4));
    }

    #[test]
    fn patch_on_nested_group_keeps_untouched_keys() {
        let mut character = sample();
        character.apply_patch(CharacterPatch::default().with_currency(Currency::gold(90)));

        assert_eq!(character.currency.gp, Some(90));
        assert_eq!(character.currency.sp, Some(12));
    }

    #[test]
    fn patch_does_not_touch_updated_at() {
        let mut character = sample();
        let before = character.updated_at;
        character.apply_patch(CharacterPatch::default().with_experience(6500).with_current_hp(3));

        assert_eq!(character.experience, 6500);
        assert_eq!(character.hit_points.current, Some(3));
        assert_eq!(character.hit_points.maximum, Some(12));
        assert_eq!(character.updated_at, before);
    }

    #[test]
    fn divergent_fields_ignore_updated_at() {
        let a = sample();
        let mut b = a.clone();
        b.updated_at = Utc.timestamp_opt(999, 0).unwrap();
        assert!(a.divergent_fields(&b).is_empty());
        assert!(a.same_content(&b));

        b.experience = 300;
        b.currency.gp = Some(1);
        assert_eq!(
            a.divergent_fields(&b),
            vec![TrackedField::Experience, TrackedField::Currency]
        );
    }

    #[test]
    fn draft_validation_rejects_blank_name_and_bad_level() {
        assert!(CharacterDraft::new("  ").validate().is_err());

        let mut draft = CharacterDraft::new("Mialee");
        draft.level = 0;
        assert!(draft.validate().is_err());

        draft.level = 5;
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn absent_nested_keys_are_omitted_from_json() {
        let json = serde_json::to_value(Currency::gold(5)).unwrap();
        assert_eq!(json, serde_json::json!({ "gp": 5 }));
    }
}
