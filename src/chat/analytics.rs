//! Usage analytics, scoped per user or team. Admin analytics are a separate
//! surface and do not live here.

use super::ChatMemory;
use crate::errors::CoreResult;
use crate::models::{ChatAnalytics, ModelUsage, Principal, SessionAnalytics};
use rusqlite::params;

impl ChatMemory {
    /// Analytics for one session under the requester's visibility.
    pub fn get_session_analytics(
        &self,
        session_id: &str,
        principal: &Principal,
    ) -> CoreResult<Option<SessionAnalytics>> {
        let Some(session) = self.get_session(session_id, principal)? else {
            return Ok(None);
        };
        self.db.read(|conn| {
            let (message_count, total_tokens): (i64, Option<i64>) = conn.query_row(
                "SELECT COUNT(*), SUM(tokens) FROM chat_messages WHERE session_id = ?1",
                params![session_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok(Some(SessionAnalytics {
                session_id: session_id.to_string(),
                message_count,
                total_tokens: total_tokens.unwrap_or(0),
                models_used: session.models_used.clone(),
                team_id: principal.team_id.clone(),
            }))
        })
    }

    /// Scoped analytics: team-wide when `team_id` is set, else the user's
    /// personal sessions.
    pub fn get_analytics(&self, user_id: &str, team_id: Option<&str>) -> CoreResult<ChatAnalytics> {
        self.db.read(|conn| {
            let (sessions_sql, models_sql, scope) = if let Some(team_id) = team_id {
                (
                    "SELECT COUNT(DISTINCT session_id), COUNT(*), SUM(tokens)
                     FROM chat_messages WHERE team_id = ?1",
                    "SELECT model, COUNT(*) FROM chat_messages
                     WHERE model IS NOT NULL AND team_id = ?1
                     GROUP BY model ORDER BY COUNT(*) DESC",
                    team_id,
                )
            } else {
                (
                    "SELECT COUNT(DISTINCT session_id), COUNT(*), SUM(tokens)
                     FROM chat_messages WHERE user_id = ?1 AND team_id IS NULL",
                    "SELECT model, COUNT(*) FROM chat_messages
                     WHERE model IS NOT NULL AND user_id = ?1 AND team_id IS NULL
                     GROUP BY model ORDER BY COUNT(*) DESC",
                    user_id,
                )
            };

            let (total_sessions, total_messages, total_tokens): (i64, i64, Option<i64>) =
                conn.query_row(sessions_sql, params![scope], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?))
                })?;

            let mut stmt = conn.prepare(models_sql)?;
            let rows = stmt.query_map(params![scope], |row| {
                Ok(ModelUsage {
                    model: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            let mut model_usage = Vec::new();
            for row in rows {
                model_usage.push(row?);
            }

            Ok(ChatAnalytics {
                total_sessions,
                total_messages,
                total_tokens: total_tokens.unwrap_or(0),
                model_usage,
                team_id: team_id.map(String::from),
            })
        })
    }
}
