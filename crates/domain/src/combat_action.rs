//! Combat actions - sub-records scoped to one character.
//!
//! Every action carries a dual identity. The client mints a [`LocalId`] the
//! moment the action is created; the backend assigns a [`RemoteId`] once the
//! create round-trips. The local id stays the stable lookup key for the
//! lifetime of the record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{CharacterId, LocalId, RemoteId};

/// Sync identity of a sub-record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Identity {
    /// Created locally; the backend has not acknowledged it yet.
    Pending { local_id: LocalId },
    /// Acknowledged by the backend.
    Confirmed {
        local_id: LocalId,
        remote_id: RemoteId,
    },
}

impl Identity {
    pub fn pending(local_id: LocalId) -> Self {
        Self::Pending { local_id }
    }

    pub fn local_id(&self) -> &LocalId {
        match self {
            Identity::Pending { local_id } | Identity::Confirmed { local_id, .. } => local_id,
        }
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        match self {
            Identity::Pending { .. } => None,
            Identity::Confirmed { remote_id, .. } => Some(remote_id),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Identity::Confirmed { .. })
    }

    /// Attaches the backend id, keeping the local id.
    pub fn confirm(self, remote_id: RemoteId) -> Self {
        Identity::Confirmed {
            local_id: self.local_id().clone(),
            remote_id,
        }
    }

    pub fn matches(&self, key: &SubRecordKey) -> bool {
        match key {
            SubRecordKey::Local(id) => self.local_id() == id,
            SubRecordKey::Remote(id) => self.remote_id() == Some(id),
        }
    }
}

/// Either id of a sub-record. Callers should prefer `Local` until the remote
/// id is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubRecordKey {
    Local(LocalId),
    Remote(RemoteId),
}

impl fmt::Display for SubRecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubRecordKey::Local(id) => write!(f, "local:{id}"),
            SubRecordKey::Remote(id) => write!(f, "remote:{id}"),
        }
    }
}

impl From<LocalId> for SubRecordKey {
    fn from(id: LocalId) -> Self {
        SubRecordKey::Local(id)
    }
}

impl From<RemoteId> for SubRecordKey {
    fn from(id: RemoteId) -> Self {
        SubRecordKey::Remote(id)
    }
}

/// Action economy slot. Collections are ordered by this.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    #[default]
    Action,
    BonusAction,
    Reaction,
    Other,
}

/// The payload of a combat action, as sent to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatActionData {
    pub category: ActionCategory,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_bonus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_remaining: Option<u32>,
}

impl CombatActionData {
    pub fn new(category: ActionCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("Combat action name cannot be empty"));
        }
        Ok(())
    }
}

/// Partial update for a combat action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatActionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ActionCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_bonus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_remaining: Option<u32>,
}

impl CombatActionPatch {
    pub fn validate(&self) -> Result<(), DomainError> {
        match &self.name {
            Some(name) if name.trim().is_empty() => Err(DomainError::validation(
                "Combat action name cannot be empty",
            )),
            _ => Ok(()),
        }
    }

    fn apply(self, data: &mut CombatActionData) {
        if let Some(category) = self.category {
            data.category = category;
        }
        if let Some(name) = self.name {
            data.name = name;
        }
        if let Some(description) = self.description {
            data.description = Some(description);
        }
        if let Some(attack_bonus) = self.attack_bonus {
            data.attack_bonus = Some(attack_bonus);
        }
        if let Some(damage) = self.damage {
            data.damage = Some(damage);
        }
        if let Some(uses) = self.uses_remaining {
            data.uses_remaining = Some(uses);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatAction {
    pub identity: Identity,
    pub parent_id: CharacterId,
    pub data: CombatActionData,
}

impl CombatAction {
    pub fn pending(local_id: LocalId, parent_id: CharacterId, data: CombatActionData) -> Self {
        Self {
            identity: Identity::pending(local_id),
            parent_id,
            data,
        }
    }

    pub fn local_id(&self) -> &LocalId {
        self.identity.local_id()
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.identity.remote_id()
    }
}

/// All combat actions of one character, ordered by category.
///
/// Within a category, actions keep their insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatActionCollection {
    parent_id: CharacterId,
    actions: Vec<CombatAction>,
}

impl CombatActionCollection {
    pub fn new(parent_id: CharacterId) -> Self {
        Self {
            parent_id,
            actions: Vec::new(),
        }
    }

    pub fn parent_id(&self) -> &CharacterId {
        &self.parent_id
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatAction> {
        self.actions.iter()
    }

    pub fn by_category(&self, category: ActionCategory) -> impl Iterator<Item = &CombatAction> {
        self.actions
            .iter()
            .filter(move |a| a.data.category == category)
    }

    /// Actions whose create has not been acknowledged.
    pub fn pending(&self) -> impl Iterator<Item = &CombatAction> {
        self.actions.iter().filter(|a| !a.identity.is_confirmed())
    }

    pub fn find(&self, key: &SubRecordKey) -> Option<&CombatAction> {
        self.actions.iter().find(|a| a.identity.matches(key))
    }

    /// Inserts after the last action of the same or an earlier category.
    pub fn insert(&mut self, action: CombatAction) {
        let category = action.data.category;
        let position = self
            .actions
            .iter()
            .rposition(|a| a.data.category <= category)
            .map_or(0, |i| i + 1);
        self.actions.insert(position, action);
    }

    /// Applies a patch and re-slots the action if its category changed.
    pub fn update(&mut self, key: &SubRecordKey, patch: CombatActionPatch) -> Option<&CombatAction> {
        let index = self.actions.iter().position(|a| a.identity.matches(key))?;
        let mut action = self.actions.remove(index);
        patch.apply(&mut action.data);
        let local_id = action.local_id().clone();
        self.insert(action);
        self.find(&SubRecordKey::Local(local_id))
    }

    pub fn remove(&mut self, key: &SubRecordKey) -> Option<CombatAction> {
        let index = self.actions.iter().position(|a| a.identity.matches(key))?;
        Some(self.actions.remove(index))
    }

    /// Records the backend id for a pending action. Returns false if the
    /// action no longer exists.
    pub fn confirm(&mut self, local_id: &LocalId, remote_id: RemoteId) -> bool {
        match self
            .actions
            .iter_mut()
            .find(|a| a.identity.local_id() == local_id)
        {
            Some(action) => {
                action.identity = action.identity.clone().confirm(remote_id);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, category: ActionCategory, name: &str) -> CombatAction {
        CombatAction::pending(
            LocalId::new(id),
            CharacterId::new("char-1"),
            CombatActionData::new(category, name),
        )
    }

    fn names(collection: &CombatActionCollection) -> Vec<&str> {
        collection.iter().map(|a| a.data.name.as_str()).collect()
    }

    #[test]
    fn insert_orders_by_category_then_insertion() {
        let mut collection = CombatActionCollection::new(CharacterId::new("char-1"));
        collection.insert(action("a", ActionCategory::Reaction, "Shield"));
        collection.insert(action("b", ActionCategory::Action, "Longsword"));
        collection.insert(action("c", ActionCategory::BonusAction, "Second Wind"));
        collection.insert(action("d", ActionCategory::Action, "Handaxe"));

        assert_eq!(
            names(&collection),
            vec!["Longsword", "Handaxe", "Second Wind", "Shield"]
        );
    }

    #[test]
    fn confirm_keeps_local_id_and_makes_remote_addressable() {
        let mut collection = CombatActionCollection::new(CharacterId::new("char-1"));
        collection.insert(action("a", ActionCategory::Action, "Longsword"));

        assert!(collection.confirm(&LocalId::new("a"), RemoteId::new("srv-9")));

        let by_remote = collection
            .find(&SubRecordKey::Remote(RemoteId::new("srv-9")))
            .expect("addressable by remote id");
        assert_eq!(by_remote.local_id(), &LocalId::new("a"));
        assert!(collection.find(&LocalId::new("a").into()).is_some());
        assert_eq!(collection.pending().count(), 0);
    }

    #[test]
    fn pending_record_is_not_addressable_by_remote_id() {
        let mut collection = CombatActionCollection::new(CharacterId::new("char-1"));
        collection.insert(action("a", ActionCategory::Action, "Longsword"));

        assert!(collection
            .find(&SubRecordKey::Remote(RemoteId::new("a")))
            .is_none());
        assert!(!collection.confirm(&LocalId::new("missing"), RemoteId::new("x")));
    }

    #[test]
    fn update_moves_action_when_category_changes() {
        let mut collection = CombatActionCollection::new(CharacterId::new("char-1"));
        collection.insert(action("a", ActionCategory::Action, "Longsword"));
        collection.insert(action("b", ActionCategory::Reaction, "Shield"));

        let patch = CombatActionPatch {
            category: Some(ActionCategory::Other),
            attack_bonus: Some(5),
            ..CombatActionPatch::default()
        };
        let updated = collection
            .update(&LocalId::new("a").into(), patch)
            .expect("action exists");

        assert_eq!(updated.data.attack_bonus, Some(5));
        assert_eq!(names(&collection), vec!["Shield", "Longsword"]);
    }

    #[test]
    fn identity_serializes_as_tagged_union() {
        let identity = Identity::pending(LocalId::new("a")).confirm(RemoteId::new("r"));
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "state": "confirmed", "local_id": "a", "remote_id": "r" })
        );
    }
}
