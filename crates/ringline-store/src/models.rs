//! Domain model structs persisted by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ringline_shared::types::{CallType, ChatId, RoomId, UserId};

/// How a call ended, as recorded in the log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    /// Cancelled by the caller or rung out before anyone joined.
    Missed,
    /// Explicitly refused by the recipient.
    Declined,
    /// Accepted and later hung up; duration in seconds.
    Completed { duration_secs: u64 },
}

impl CallOutcome {
    /// Stable string form for the `outcome` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Missed => "missed",
            CallOutcome::Declined => "declined",
            CallOutcome::Completed { .. } => "completed",
        }
    }
}

/// One row in the call log. Group calls produce one record per recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRecord {
    pub id: Uuid,
    pub room_id: RoomId,
    pub chat_id: ChatId,
    pub caller: UserId,
    pub recipient: UserId,
    pub call_type: CallType,
    pub outcome: CallOutcome,
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(
        room_id: RoomId,
        chat_id: ChatId,
        caller: UserId,
        recipient: UserId,
        call_type: CallType,
        outcome: CallOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            chat_id,
            caller,
            recipient,
            call_type,
            outcome,
            created_at: Utc::now(),
        }
    }
}
