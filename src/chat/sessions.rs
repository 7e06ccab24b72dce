//! Session CRUD with personal/team visibility.
//!
//! Ordinary reads are always visibility-filtered; Founder Rights only widens
//! access through the explicitly admin-named methods and through delete.

use super::ChatMemory;
use crate::errors::{CoreError, CoreResult};
use crate::models::{ChatSession, ModelPreferences, OpKind, Principal, Role};
use rusqlite::{Row, params};

pub(crate) fn row_to_session(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    let models_used: Option<String> = row.get(6)?;
    Ok(ChatSession {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        created_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        updated_at: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        model: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        message_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        models_used: split_models(models_used.as_deref()),
        summary: row.get(7)?,
        user_id: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        team_id: row.get(9)?,
        archived: row.get::<_, Option<i64>>(10)?.unwrap_or(0) != 0,
    })
}

pub(crate) fn split_models(s: Option<&str>) -> Vec<String> {
    match s {
        Some(s) if !s.is_empty() => s.split(',').map(String::from).collect(),
        _ => Vec::new(),
    }
}

const SESSION_COLUMNS: &str = "id, title, created_at, updated_at, default_model, message_count, \
                               models_used, summary, user_id, team_id, archived";

impl ChatMemory {
    /// Create a new chat session owned by `user_id`, optionally team-scoped.
    pub fn create_session(
        &self,
        session_id: &str,
        title: &str,
        model: &str,
        user_id: &str,
        team_id: Option<&str>,
    ) -> CoreResult<ChatSession> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO chat_sessions (id, title, created_at, updated_at, default_model, message_count, models_used, user_id, team_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
                params![session_id, title, now, now, model, model, user_id, team_id],
            )?;
        }

        if let Some(tracker) = &self.tracker {
            let mut data = serde_json::Map::new();
            data.insert("id".into(), session_id.into());
            data.insert("title".into(), title.into());
            data.insert("created_at".into(), now.clone().into());
            data.insert("updated_at".into(), now.clone().into());
            data.insert("default_model".into(), model.into());
            data.insert("models_used".into(), model.into());
            data.insert("user_id".into(), user_id.into());
            data.insert("team_id".into(), team_id.into());
            tracker.track("chat_sessions", OpKind::Insert, session_id, Some(&data), team_id);
        }

        Ok(ChatSession {
            id: session_id.to_string(),
            title: title.to_string(),
            created_at: now.clone(),
            updated_at: now,
            model: model.to_string(),
            message_count: 0,
            models_used: vec![model.to_string()],
            summary: None,
            user_id: user_id.to_string(),
            team_id: team_id.map(String::from),
            archived: false,
        })
    }

    /// Get session metadata under the requester's visibility. Team context
    /// requires a matching team_id; otherwise the session must be a personal
    /// session owned by the requester. Founder Rights bypasses the owner
    /// filter for personal lookups.
    pub fn get_session(&self, session_id: &str, principal: &Principal) -> CoreResult<Option<ChatSession>> {
        self.db.read(|conn| {
            let row = if let Some(team_id) = &principal.team_id {
                conn.query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1 AND team_id = ?2"),
                    params![session_id, team_id],
                    row_to_session,
                )
            } else if principal.role == Role::GodRights {
                conn.query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1"),
                    params![session_id],
                    row_to_session,
                )
            } else {
                conn.query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1 AND user_id = ?2 AND team_id IS NULL"
                    ),
                    params![session_id, principal.user_id],
                    row_to_session,
                )
            };
            match row {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// List sessions visible to the principal. This is the regular listing:
    /// every role, Founder Rights included, sees only its own scope here.
    pub fn list_sessions(&self, principal: &Principal) -> CoreResult<Vec<ChatSession>> {
        self.db.read(|conn| {
            let mut sessions = Vec::new();
            if let Some(team_id) = &principal.team_id {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE team_id = ?1 ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map(params![team_id], row_to_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE user_id = ?1 AND team_id IS NULL ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map(params![principal.user_id], row_to_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            }
            Ok(sessions)
        })
    }

    /// List ALL sessions across users. Founder Rights admin surface only.
    pub fn list_all_sessions_admin(&self, principal: &Principal) -> CoreResult<Vec<ChatSession>> {
        if principal.role != Role::GodRights {
            return Err(CoreError::AccessDenied);
        }
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM chat_sessions ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_session)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
    }

    /// List one user's sessions. Founder Rights admin surface only.
    pub fn list_user_sessions_admin(
        &self,
        principal: &Principal,
        target_user_id: &str,
    ) -> CoreResult<Vec<ChatSession>> {
        if principal.role != Role::GodRights {
            return Err(CoreError::AccessDenied);
        }
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE user_id = ?1 ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map(params![target_user_id], row_to_session)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
    }

    /// Delete a session and everything hanging off it. Returns false when the
    /// requester neither owns the session nor holds Founder Rights.
    pub fn delete_session(&self, session_id: &str, principal: &Principal) -> CoreResult<bool> {
        let team_id;
        {
            let mut conn = self.db.write();

            let owner: Option<(Option<String>, Option<String>)> = conn
                .query_row(
                    "SELECT user_id, team_id FROM chat_sessions WHERE id = ?1",
                    params![session_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            let Some((owner_id, session_team)) = owner else {
                return Ok(false);
            };
            if principal.role != Role::GodRights && owner_id.as_deref() != Some(principal.user_id.as_str()) {
                return Ok(false);
            }
            team_id = session_team;

            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chat_messages WHERE session_id = ?1", params![session_id])?;
            tx.execute(
                "DELETE FROM conversation_summaries WHERE session_id = ?1",
                params![session_id],
            )?;
            tx.execute("DELETE FROM document_chunks WHERE session_id = ?1", params![session_id])?;
            tx.execute(
                "DELETE FROM message_embeddings WHERE session_id = ?1",
                params![session_id],
            )?;
            tx.execute("DELETE FROM chat_sessions WHERE id = ?1", params![session_id])?;
            tx.commit()?;
        }

        if let Some(tracker) = &self.tracker {
            tracker.track(
                "chat_sessions",
                OpKind::Delete,
                session_id,
                None,
                team_id.as_deref(),
            );
        }

        Ok(true)
    }

    /// Update session title. `auto_titled` marks machine-generated titles so
    /// later manual edits can be distinguished.
    pub fn update_session_title(&self, session_id: &str, title: &str, auto_titled: bool) -> CoreResult<()> {
        let conn = self.db.write();
        conn.execute(
            "UPDATE chat_sessions SET title = ?1, auto_titled = ?2 WHERE id = ?3",
            params![title, auto_titled as i64, session_id],
        )?;
        Ok(())
    }

    /// Switch the session default model.
    pub fn update_session_model(&self, session_id: &str, model: &str) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "UPDATE chat_sessions SET default_model = ?1, updated_at = ?2 WHERE id = ?3",
            params![model, now, session_id],
        )?;
        Ok(())
    }

    /// Store model selection preferences: `intelligent` (orchestrated) or
    /// `manual` with an explicit model id.
    pub fn update_model_preferences(
        &self,
        session_id: &str,
        selected_mode: &str,
        selected_model_id: Option<&str>,
    ) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "UPDATE chat_sessions SET selected_mode = ?1, selected_model_id = ?2, updated_at = ?3 WHERE id = ?4",
            params![selected_mode, selected_model_id, now, session_id],
        )?;
        Ok(())
    }

    pub fn get_model_preferences(&self, session_id: &str) -> CoreResult<ModelPreferences> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT selected_mode, selected_model_id FROM chat_sessions WHERE id = ?1",
                params![session_id],
                |r| {
                    Ok((
                        r.get::<_, Option<String>>(0)?,
                        r.get::<_, Option<String>>(1)?,
                    ))
                },
            );
            match row {
                Ok((mode, model_id)) => Ok(ModelPreferences {
                    selected_mode: mode.unwrap_or_else(|| "intelligent".to_string()),
                    selected_model_id: model_id,
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(ModelPreferences {
                    selected_mode: "intelligent".to_string(),
                    selected_model_id: None,
                }),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn set_session_archived(&self, session_id: &str, archived: bool) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "UPDATE chat_sessions SET archived = ?1, updated_at = ?2 WHERE id = ?3",
            params![archived as i64, now, session_id],
        )?;
        Ok(())
    }
}
