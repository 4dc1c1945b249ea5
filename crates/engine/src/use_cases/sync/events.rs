//! Observability channel for background sync outcomes.

use tokio::sync::broadcast;

use herosheet_domain::{CharacterId, LocalId, RemoteId, TrackedField, Winner};

const EVENT_CAPACITY: usize = 256;

/// Something that happened off the foreground path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ConflictResolved {
        character_id: CharacterId,
        winner: Winner,
        divergent_fields: Vec<TrackedField>,
    },
    PushSucceeded {
        character_id: CharacterId,
    },
    /// The remote was unreachable; the next read or write tries again.
    PushDeferred {
        character_id: CharacterId,
        reason: String,
    },
    /// The remote refused the push. The local copy is kept as-is.
    PushRejected {
        character_id: CharacterId,
        reason: String,
    },
    SubRecordConfirmed {
        parent_id: CharacterId,
        local_id: LocalId,
        remote_id: RemoteId,
    },
    SubRecordRejected {
        parent_id: CharacterId,
        local_id: LocalId,
        reason: String,
    },
}

/// Fan-out sender shared by the coordinator and the identity mapper.
#[derive(Clone)]
pub struct SyncEvents {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}
