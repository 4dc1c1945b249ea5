//! Per-character sync bookkeeping.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex as AsyncMutex;

use herosheet_domain::CharacterAggregate;

use super::error::SyncError;

/// Where a character currently sits in the sync cycle.
///
/// `Idle -> Reading -> Resolved -> (PushingRemote) -> Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Reading,
    Resolved,
    PushingRemote,
}

/// Snapshot of one character's sync metadata. Lives only in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub phase: SyncPhase,
    pub last_known_remote_timestamp: Option<DateTime<Utc>>,
    pub pending_push: bool,
    pub last_error: Option<String>,
}

pub(crate) type SharedRead = Shared<BoxFuture<'static, Result<Option<CharacterAggregate>, SyncError>>>;

#[derive(Default)]
struct SlotData {
    state: SyncState,
    /// Latest aggregate waiting to be pushed; a newer write replaces it.
    queued_push: Option<CharacterAggregate>,
    push_running: bool,
    read_in_flight: Option<SharedRead>,
}

/// Locks and state for one character id.
///
/// Lock order is `remote_lock` then `cache_lock`. Reads and pushes hold
/// `remote_lock`, so at most one of them talks to the remote per id.
/// Everything that rewrites the cached aggregate holds `cache_lock`.
#[derive(Default)]
pub(crate) struct SyncSlot {
    pub(crate) remote_lock: AsyncMutex<()>,
    pub(crate) cache_lock: AsyncMutex<()>,
    data: Mutex<SlotData>,
}

impl SyncSlot {
    fn data(&self) -> MutexGuard<'_, SlotData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SyncState {
        self.data().state.clone()
    }

    pub(crate) fn update_state(&self, f: impl FnOnce(&mut SyncState)) {
        f(&mut self.data().state);
    }

    pub(crate) fn set_phase(&self, phase: SyncPhase) {
        self.data().state.phase = phase;
    }

    /// Queues `aggregate` as the next push. Returns true when no push task is
    /// running for this id and the caller must start one.
    pub(crate) fn queue_push(&self, aggregate: CharacterAggregate) -> bool {
        let mut data = self.data();
        data.queued_push = Some(aggregate);
        data.state.pending_push = true;
        !std::mem::replace(&mut data.push_running, true)
    }

    /// Takes the next payload for the running push task, or marks the task
    /// finished when nothing is queued.
    pub(crate) fn next_push(&self) -> Option<CharacterAggregate> {
        let mut data = self.data();
        let next = data.queued_push.take();
        if next.is_none() {
            data.push_running = false;
        }
        next
    }

    /// Records the outcome of a push attempt.
    pub(crate) fn finish_push(&self, pushed_at: Option<DateTime<Utc>>, error: Option<String>) {
        let mut data = self.data();
        let more_queued = data.queued_push.is_some();
        let state = &mut data.state;
        state.phase = SyncPhase::Idle;
        match (pushed_at, error) {
            (Some(timestamp), _) => {
                state.last_known_remote_timestamp = Some(timestamp);
                state.last_error = None;
                state.pending_push = more_queued;
            }
            (None, Some(error)) => {
                state.last_error = Some(error);
            }
            (None, None) => {
                state.pending_push = more_queued;
            }
        }
    }

    /// Mark a rejected push: it will not be re-sent, so only a newer queued
    /// payload keeps `pending_push` set.
    pub(crate) fn reject_push(&self, error: String) {
        let mut data = self.data();
        let more_queued = data.queued_push.is_some();
        data.state.phase = SyncPhase::Idle;
        data.state.pending_push = more_queued;
        data.state.last_error = Some(error);
    }

    pub(crate) fn clear_queued_push(&self) {
        let mut data = self.data();
        data.queued_push = None;
        data.state.pending_push = false;
    }

    /// Joins the in-flight read, or registers the one built by `start`.
    pub(crate) fn join_read(&self, start: impl FnOnce() -> SharedRead) -> SharedRead {
        let mut data = self.data();
        match &data.read_in_flight {
            Some(in_flight) => in_flight.clone(),
            None => {
                let read = start();
                data.read_in_flight = Some(read.clone());
                read
            }
        }
    }

    pub(crate) fn finish_read(&self, read: &SharedRead) {
        let mut data = self.data();
        if data
            .read_in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.ptr_eq(read))
        {
            data.read_in_flight = None;
        }
    }
}
