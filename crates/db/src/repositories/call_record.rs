use chrono::SecondsFormat;
use sqlx::{sqlite::SqliteRow, Row};

use hostline_core::domain::call::{
    AgentAction, CallRecord, CallSid, CallStatus, ConversationTurn, Role,
};

use super::codec::{parse_optional_timestamp, parse_timestamp};
use super::{CallRecordRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCallRecordRepository {
    pool: DbPool,
}

impl SqlCallRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn rfc3339(value: chrono::DateTime<chrono::Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait::async_trait]
impl CallRecordRepository for SqlCallRecordRepository {
    async fn save(&self, record: &CallRecord) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let upserted = sqlx::query(
            "INSERT INTO call_record (
                call_sid, caller, callee, started_at, ended_at, duration_seconds, status
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(call_sid) DO UPDATE SET
                caller = excluded.caller,
                callee = excluded.callee,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                duration_seconds = excluded.duration_seconds,
                status = excluded.status
             WHERE call_record.status <> 'completed' OR excluded.status = 'completed'",
        )
        .bind(record.call_sid.as_str())
        .bind(&record.caller)
        .bind(&record.callee)
        .bind(rfc3339(record.started_at))
        .bind(record.ended_at.map(rfc3339))
        .bind(record.duration_seconds)
        .bind(record.status.as_str())
        .execute(&mut *tx)
        .await?;
        if upserted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM call_turn WHERE call_sid = ?")
            .bind(record.call_sid.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM call_action WHERE call_sid = ?")
            .bind(record.call_sid.as_str())
            .execute(&mut *tx)
            .await?;

        for (turn_number, turn) in record.transcript.iter().enumerate() {
            sqlx::query(
                "INSERT INTO call_turn (call_sid, turn_number, role, content, occurred_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(record.call_sid.as_str())
            .bind(turn_number as i64)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(rfc3339(turn.at))
            .execute(&mut *tx)
            .await?;
        }

        for (action_number, action) in record.actions.iter().enumerate() {
            sqlx::query(
                "INSERT INTO call_action (
                    call_sid, action_number, tool_name, arguments_json, result_json,
                    success, error_message, occurred_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.call_sid.as_str())
            .bind(action_number as i64)
            .bind(&action.tool_name)
            .bind(action.arguments.to_string())
            .bind(action.result.to_string())
            .bind(action.success)
            .bind(&action.error_message)
            .bind(rfc3339(action.at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn find(&self, call_sid: &CallSid) -> Result<Option<CallRecord>, RepositoryError> {
        let Some(row) = sqlx::query(
            "SELECT call_sid, caller, callee, started_at, ended_at, duration_seconds, status
             FROM call_record
             WHERE call_sid = ?",
        )
        .bind(call_sid.as_str())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let mut record = record_from_row(row)?;

        let turns = sqlx::query(
            "SELECT role, content, occurred_at
             FROM call_turn
             WHERE call_sid = ?
             ORDER BY turn_number ASC",
        )
        .bind(call_sid.as_str())
        .fetch_all(&self.pool)
        .await?;
        record.transcript = turns.into_iter().map(turn_from_row).collect::<Result<_, _>>()?;

        let actions = sqlx::query(
            "SELECT tool_name, arguments_json, result_json, success, error_message, occurred_at
             FROM call_action
             WHERE call_sid = ?
             ORDER BY action_number ASC",
        )
        .bind(call_sid.as_str())
        .fetch_all(&self.pool)
        .await?;
        record.actions = actions.into_iter().map(action_from_row).collect::<Result<_, _>>()?;

        Ok(Some(record))
    }
}

fn record_from_row(row: SqliteRow) -> Result<CallRecord, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = CallStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown call status `{status_raw}`")))?;

    Ok(CallRecord {
        call_sid: CallSid(row.try_get("call_sid")?),
        caller: row.try_get("caller")?,
        callee: row.try_get("callee")?,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        ended_at: parse_optional_timestamp("ended_at", row.try_get("ended_at")?)?,
        duration_seconds: row.try_get("duration_seconds")?,
        status,
        transcript: Vec::new(),
        actions: Vec::new(),
    })
}

fn turn_from_row(row: SqliteRow) -> Result<ConversationTurn, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?;

    Ok(ConversationTurn {
        role,
        content: row.try_get("content")?,
        at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn action_from_row(row: SqliteRow) -> Result<AgentAction, RepositoryError> {
    let arguments = row.try_get::<String, _>("arguments_json")?;
    let result = row.try_get::<String, _>("result_json")?;

    Ok(AgentAction {
        tool_name: row.try_get("tool_name")?,
        arguments: serde_json::from_str(&arguments)
            .map_err(|error| RepositoryError::Decode(format!("invalid arguments_json: {error}")))?,
        result: serde_json::from_str(&result)
            .map_err(|error| RepositoryError::Decode(format!("invalid result_json: {error}")))?,
        success: row.try_get("success")?,
        error_message: row.try_get("error_message")?,
        at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
