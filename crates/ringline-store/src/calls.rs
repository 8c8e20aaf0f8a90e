use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use ringline_shared::types::{CallType, ChatId, RoomId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{CallOutcome, CallRecord};

impl Database {
    pub fn insert_call_record(&self, record: &CallRecord) -> Result<()> {
        let duration: Option<u64> = match record.outcome {
            CallOutcome::Completed { duration_secs } => Some(duration_secs),
            _ => None,
        };

        self.conn().execute(
            "INSERT INTO call_log
                 (id, room_id, chat_id, caller, recipient, call_type, outcome, duration_secs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                record.room_id.0,
                record.chat_id.0,
                record.caller.0,
                record.recipient.0,
                call_type_str(record.call_type),
                record.outcome.as_str(),
                duration,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_calls_for_chat(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<CallRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, room_id, chat_id, caller, recipient, call_type, outcome, duration_secs, created_at
             FROM call_log
             WHERE chat_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![chat_id.0, limit], row_to_call_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn call_type_str(call_type: CallType) -> &'static str {
    match call_type {
        CallType::Audio => "audio",
        CallType::Video => "video",
    }
}

fn row_to_call_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallRecord> {
    let id: String = row.get(0)?;
    let room_id: String = row.get(1)?;
    let chat_id: String = row.get(2)?;
    let caller: String = row.get(3)?;
    let recipient: String = row.get(4)?;
    let call_type: String = row.get(5)?;
    let outcome: String = row.get(6)?;
    let duration_secs: Option<u64> = row.get(7)?;
    let created_at: String = row.get(8)?;

    let outcome = match outcome.as_str() {
        "missed" => CallOutcome::Missed,
        "declined" => CallOutcome::Declined,
        "completed" => CallOutcome::Completed {
            duration_secs: duration_secs.unwrap_or(0),
        },
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown call outcome: {other}").into(),
            ))
        }
    };

    let call_type = match call_type.as_str() {
        "audio" => CallType::Audio,
        _ => CallType::Video,
    };

    Ok(CallRecord {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })?,
        room_id: RoomId(room_id),
        chat_id: ChatId(chat_id),
        caller: UserId(caller),
        recipient: UserId(recipient),
        call_type,
        outcome,
        created_at: parse_timestamp(&created_at).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, e.into())
        })?,
    })
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
