//! Per-user draft storage.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use crate::{domain::UserId, draft::PostDraft};

/// Narrow store for in-progress drafts: at most one per user.
///
/// Writers replace whole drafts; two overlapping events for the same user
/// resolve by last write wins.
pub trait DraftStore: Send + Sync {
    fn get(&self, user: UserId) -> Option<PostDraft>;
    fn set(&self, user: UserId, draft: PostDraft);
    fn delete(&self, user: UserId) -> Option<PostDraft>;
}

/// Process-local draft store. Restarting the process forgets every draft.
#[derive(Default)]
pub struct InMemoryDraftStore {
    inner: Mutex<HashMap<UserId, PostDraft>>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<UserId, PostDraft>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DraftStore for InMemoryDraftStore {
    fn get(&self, user: UserId) -> Option<PostDraft> {
        self.map().get(&user).cloned()
    }

    fn set(&self, user: UserId, draft: PostDraft) {
        self.map().insert(user, draft);
    }

    fn delete(&self, user: UserId) -> Option<PostDraft> {
        self.map().remove(&user)
    }
}
