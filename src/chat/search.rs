//! Cross-session semantic search with cached results.

use super::{ChatMemory, EMBED_MIN_CHARS};
use crate::embeddings::cosine_similarity;
use crate::errors::CoreResult;
use crate::models::SearchHit;
use rusqlite::params;
use sha2::{Digest, Sha256};

/// Candidates below this similarity are dropped.
const SIMILARITY_THRESHOLD: f32 = 0.3;

/// Search scope: the most recent N messages in the caller's visibility.
const CANDIDATE_LIMIT: i64 = 200;

impl ChatMemory {
    /// Search messages across sessions by semantic similarity, scoped to the
    /// caller's visibility (team when `team_id` is set, else personal).
    ///
    /// Results are cached per (query, user, team, limit); on a cache hit no
    /// embedding is computed at all.
    pub fn search_messages_semantic(
        &self,
        query: &str,
        limit: usize,
        user_id: Option<&str>,
        team_id: Option<&str>,
    ) -> CoreResult<Vec<SearchHit>> {
        let query_hash = hex::encode(Sha256::digest(query.as_bytes()));
        let cache_key = format!(
            "semantic_search:{}:{}:{}:{}",
            query_hash,
            user_id.unwrap_or("none"),
            team_id.unwrap_or("none"),
            limit
        );

        if let Some(cached) = self.cache.get(&cache_key)
            && let Ok(hits) = serde_json::from_value::<Vec<SearchHit>>(cached)
        {
            return Ok(hits);
        }

        let query_embedding = self.embedder.embed(query)?;

        // Pre-computed embeddings ride along via LEFT JOIN; candidates
        // without one get an on-the-fly embedding below.
        let candidates = self.db.read(|conn| {
            let sql = if team_id.is_some() {
                "SELECT m.session_id, m.role, m.content, m.timestamp, m.model, s.title, e.embedding_json
                 FROM chat_messages m
                 JOIN chat_sessions s ON m.session_id = s.id
                 LEFT JOIN message_embeddings e ON m.id = e.message_id
                 WHERE length(m.content) > ?2 AND m.team_id = ?1
                 ORDER BY m.timestamp DESC LIMIT ?3"
            } else {
                "SELECT m.session_id, m.role, m.content, m.timestamp, m.model, s.title, e.embedding_json
                 FROM chat_messages m
                 JOIN chat_sessions s ON m.session_id = s.id
                 LEFT JOIN message_embeddings e ON m.id = e.message_id
                 WHERE length(m.content) > ?2 AND m.user_id = ?1 AND m.team_id IS NULL
                 ORDER BY m.timestamp DESC LIMIT ?3"
            };
            let scope = team_id.or(user_id).unwrap_or("");
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(
                params![scope, EMBED_MIN_CHARS as i64, CANDIDATE_LIMIT],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )?;
            let mut candidates = Vec::new();
            for row in rows {
                candidates.push(row?);
            }
            Ok(candidates)
        })?;

        let mut results = Vec::new();
        for (session_id, role, content, timestamp, model, title, embedding_json) in candidates {
            let embedding: Vec<f32> = match embedding_json.and_then(|s| serde_json::from_str(&s).ok()) {
                Some(embedding) => embedding,
                None => match self.embedder.embed(&content) {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        eprintln!("⚠️ On-the-fly embedding failed during search: {e}");
                        continue;
                    }
                },
            };
            let similarity = cosine_similarity(&query_embedding, &embedding);
            if similarity > SIMILARITY_THRESHOLD {
                results.push(SearchHit {
                    session_id,
                    session_title: title.unwrap_or_default(),
                    role,
                    content: content.chars().take(200).collect(),
                    timestamp,
                    model,
                    similarity,
                });
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        if let Ok(value) = serde_json::to_value(&results) {
            self.cache.set(&cache_key, value);
        }

        Ok(results)
    }
}
