//! Rolling conversation summaries.
//!
//! Deterministic bullet-list digest of the last ≤30 events, capped at 1200
//! chars. One row per session (upsert); the session row mirrors the text for
//! fast listing. LLM-enhanced summarization, when wanted, replaces this at a
//! higher layer.

use super::ChatMemory;
use crate::errors::CoreResult;
use crate::models::{ConversationEvent, SessionSummary};
use rusqlite::params;

const MAX_EVENTS: usize = 30;
const MAX_SUMMARY_CHARS: usize = 1200;
const MAX_BULLET_CONTENT_CHARS: usize = 100;

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

/// Render the bullet-list summary for a window of events.
pub(crate) fn render_summary(events: &[ConversationEvent]) -> String {
    let mut bullets = Vec::with_capacity(events.len());
    for ev in events {
        let content = ev.content.trim().replace('\n', " ");
        let content = truncate_chars(&content, MAX_BULLET_CONTENT_CHARS);
        let model_info = match &ev.model {
            Some(model) => format!(" [{model}]"),
            None => String::new(),
        };
        bullets.push(format!("- {}{}: {}", ev.role, model_info, content));
    }
    let summary = format!("Recent conversation:\n{}", bullets.join("\n"));
    if summary.chars().count() > MAX_SUMMARY_CHARS {
        truncate_chars(&summary, MAX_SUMMARY_CHARS - 1)
    } else {
        summary
    }
}

impl ChatMemory {
    /// Create or update the rolling summary for a session. When `events` is
    /// None the last `MAX_EVENTS` stored messages are used.
    pub fn update_summary(&self, session_id: &str, events: Option<&[ConversationEvent]>) -> CoreResult<()> {
        let owned;
        let events = match events {
            Some(events) => events,
            None => {
                owned = self.get_recent_messages(session_id, MAX_EVENTS as i64, 0)?;
                &owned
            }
        };
        if events.is_empty() {
            return Ok(());
        }

        let trimmed = &events[events.len().saturating_sub(MAX_EVENTS)..];
        let summary = render_summary(trimmed);

        let mut models_used: Vec<String> = trimmed.iter().filter_map(|ev| ev.model.clone()).collect();
        models_used.sort();
        models_used.dedup();
        let models_used = models_used.join(",");

        let now = chrono::Utc::now().to_rfc3339();
        let events_json = serde_json::to_string(trimmed)?;

        let mut conn = self.db.write();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM conversation_summaries WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if existing.is_some() {
            tx.execute(
                "UPDATE conversation_summaries
                 SET updated_at = ?1, summary = ?2, events_json = ?3, models_used = ?4
                 WHERE session_id = ?5",
                params![now, summary, events_json, models_used, session_id],
            )?;
        } else {
            tx.execute(
                "INSERT INTO conversation_summaries (session_id, created_at, updated_at, summary, events_json, models_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![session_id, now, now, summary, events_json, models_used],
            )?;
        }

        tx.execute(
            "UPDATE chat_sessions SET summary = ?1 WHERE id = ?2",
            params![summary, session_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_summary(&self, session_id: &str) -> CoreResult<Option<SessionSummary>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT session_id, created_at, updated_at, summary, models_used
                 FROM conversation_summaries WHERE session_id = ?1",
                params![session_id],
                |r| {
                    let models: Option<String> = r.get(4)?;
                    Ok(SessionSummary {
                        session_id: r.get(0)?,
                        created_at: r.get(1)?,
                        updated_at: r.get(2)?,
                        summary: r.get(3)?,
                        models_used: super::sessions::split_models(models.as_deref()),
                    })
                },
            );
            match row {
                Ok(summary) => Ok(Some(summary)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }
}
