//! In-memory implementation of the storage traits.
//!
//! Used by server unit tests and by ephemeral deployments that do not
//! care about call history surviving a restart.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use ringline_shared::types::{ChatId, UserId};

use crate::error::{Result, StoreError};
use crate::models::CallRecord;
use crate::{BlockStore, CallLogStore, PresenceStore};

#[derive(Default)]
pub struct MemoryStore {
    calls: Mutex<Vec<CallRecord>>,
    blocks: Mutex<HashMap<UserId, HashSet<UserId>>>,
    presence: Mutex<HashMap<UserId, (bool, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the call log, newest last.
    pub fn call_records(&self) -> Vec<CallRecord> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn presence_of(&self, user: &UserId) -> Option<(bool, DateTime<Utc>)> {
        self.presence.lock().ok().and_then(|p| p.get(user).copied())
    }
}

impl CallLogStore for MemoryStore {
    fn append(&self, record: &CallRecord) -> Result<()> {
        self.calls
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn recent_for_chat(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<CallRecord>> {
        let calls = self
            .calls
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(calls
            .iter()
            .rev()
            .filter(|r| &r.chat_id == chat_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

impl BlockStore for MemoryStore {
    fn blocked_by(&self, user: &UserId) -> Result<HashSet<UserId>> {
        Ok(self
            .blocks
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    fn add(&self, user: &UserId, blocked: &UserId) -> Result<()> {
        self.blocks
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?
            .entry(user.clone())
            .or_default()
            .insert(blocked.clone());
        Ok(())
    }

    fn remove(&self, user: &UserId, blocked: &UserId) -> Result<()> {
        if let Ok(mut blocks) = self.blocks.lock() {
            if let Some(set) = blocks.get_mut(user) {
                set.remove(blocked);
            }
        }
        Ok(())
    }
}

impl PresenceStore for MemoryStore {
    fn write(&self, user: &UserId, online: bool, last_active_at: DateTime<Utc>) -> Result<()> {
        self.presence
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?
            .insert(user.clone(), (online, last_active_at));
        Ok(())
    }
}
