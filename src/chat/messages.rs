//! Message persistence.
//!
//! Insertion is a serialized composite operation: resolve the session's
//! owner, insert the message carrying the session's tenant identifiers
//! (caller-supplied ones are never trusted here), precompute an embedding
//! for substantial content, and bump session counters.

use super::{ChatMemory, EMBED_MIN_CHARS};
use crate::errors::{CoreError, CoreResult};
use crate::models::{ConversationEvent, OpKind};
use rusqlite::{Row, params};

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<ConversationEvent> {
    let files_json: Option<String> = row.get(5)?;
    Ok(ConversationEvent {
        timestamp: row.get(0)?,
        role: row.get(1)?,
        content: row.get(2)?,
        model: row.get(3)?,
        tokens: row.get(4)?,
        files: files_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

impl ChatMemory {
    /// Add a message to a session. Returns the assigned message id.
    ///
    /// Embedding failures are swallowed: the message must always land.
    pub fn add_message(&self, session_id: &str, event: &ConversationEvent) -> CoreResult<i64> {
        let files_json = match &event.files {
            Some(files) => Some(serde_json::to_string(files)?),
            None => None,
        };

        let message_id;
        let owner_team;
        {
            let mut conn = self.db.write();
            let tx = conn.transaction()?;

            // The message inherits user_id/team_id from its session.
            let (owner_id, team_id): (Option<String>, Option<String>) = tx
                .query_row(
                    "SELECT user_id, team_id FROM chat_sessions WHERE id = ?1",
                    params![session_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok((None, None)),
                    other => Err(other),
                })?;

            tx.execute(
                "INSERT INTO chat_messages (session_id, timestamp, role, content, model, tokens, files_json, user_id, team_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    session_id,
                    event.timestamp,
                    event.role,
                    event.content,
                    event.model,
                    event.tokens,
                    files_json,
                    owner_id,
                    team_id
                ],
            )?;
            message_id = tx.last_insert_rowid();

            if event.content.chars().count() > EMBED_MIN_CHARS {
                match self.embedder.embed(&event.content) {
                    Ok(embedding) => {
                        let embedding_json = serde_json::to_string(&embedding)?;
                        let now = chrono::Utc::now().to_rfc3339();
                        tx.execute(
                            "INSERT OR REPLACE INTO message_embeddings (message_id, session_id, embedding_json, created_at, team_id)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![message_id, session_id, embedding_json, now, team_id],
                        )?;
                    }
                    Err(e) => {
                        eprintln!("⚠️ Embedding precompute failed for message {message_id}: {e}");
                    }
                }
            }

            let now = chrono::Utc::now().to_rfc3339();
            tx.execute(
                "UPDATE chat_sessions SET updated_at = ?1, message_count = message_count + 1 WHERE id = ?2",
                params![now, session_id],
            )?;

            if let Some(model) = &event.model {
                let models_used: Option<String> = tx
                    .query_row(
                        "SELECT models_used FROM chat_sessions WHERE id = ?1",
                        params![session_id],
                        |r| r.get(0),
                    )
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                let mut models: Vec<String> = super::sessions::split_models(models_used.as_deref());
                if !models.contains(model) {
                    models.push(model.clone());
                }
                models.sort();
                models.dedup();
                tx.execute(
                    "UPDATE chat_sessions SET models_used = ?1 WHERE id = ?2",
                    params![models.join(","), session_id],
                )?;
            }

            tx.commit()?;
            owner_team = team_id;
        }

        if let Some(tracker) = &self.tracker {
            let mut data = serde_json::Map::new();
            data.insert("id".into(), message_id.into());
            data.insert("session_id".into(), session_id.into());
            data.insert("timestamp".into(), event.timestamp.clone().into());
            data.insert("role".into(), event.role.clone().into());
            data.insert("content".into(), event.content.clone().into());
            data.insert("model".into(), event.model.clone().into());
            data.insert("tokens".into(), event.tokens.into());
            data.insert("team_id".into(), owner_team.clone().into());
            tracker.track(
                "chat_messages",
                OpKind::Insert,
                &message_id.to_string(),
                Some(&data),
                owner_team.as_deref(),
            );
        }

        Ok(message_id)
    }

    /// Full message history in chronological order.
    pub fn get_messages(&self, session_id: &str, limit: Option<i64>) -> CoreResult<Vec<ConversationEvent>> {
        self.db.read(|conn| {
            let mut sql = String::from(
                "SELECT timestamp, role, content, model, tokens, files_json
                 FROM chat_messages WHERE session_id = ?1 ORDER BY timestamp ASC, id ASC",
            );
            if let Some(limit) = limit {
                if limit < 0 {
                    return Err(CoreError::Config("negative message limit".to_string()));
                }
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![session_id], row_to_event)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
    }

    /// Most recent messages for a context window, paginated, returned in
    /// chronological order within the page.
    pub fn get_recent_messages(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<ConversationEvent>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, role, content, model, tokens, files_json
                 FROM chat_messages WHERE session_id = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![session_id, limit, offset], row_to_event)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            messages.reverse();
            Ok(messages)
        })
    }

    pub fn count_messages(&self, session_id: &str) -> CoreResult<i64> {
        self.db.read(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )?;
            Ok(count)
        })
    }
}
