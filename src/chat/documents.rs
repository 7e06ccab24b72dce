//! Document chunk storage and similarity search for the RAG path.

use super::ChatMemory;
use crate::embeddings::cosine_similarity;
use crate::errors::CoreResult;
use crate::models::{ChunkMatch, DocumentChunk};
use rusqlite::params;

impl ChatMemory {
    /// Store a batch of document chunks, atomically. Chunks inherit the
    /// session's tenant identifiers.
    pub fn store_document_chunks(&self, session_id: &str, chunks: &[DocumentChunk]) -> CoreResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().to_rfc3339();

        let mut conn = self.db.write();
        let tx = conn.transaction()?;

        let (user_id, team_id): (Option<String>, Option<String>) = tx
            .query_row(
                "SELECT user_id, team_id FROM chat_sessions WHERE id = ?1",
                params![session_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok((None, None)),
                other => Err(other),
            })?;

        for chunk in chunks {
            let embedding_json = serde_json::to_string(&chunk.embedding)?;
            tx.execute(
                "INSERT INTO document_chunks
                 (session_id, file_id, filename, chunk_index, total_chunks, content, embedding_json, created_at, user_id, team_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session_id,
                    chunk.file_id,
                    chunk.filename,
                    chunk.chunk_index,
                    chunk.total_chunks,
                    chunk.content,
                    embedding_json,
                    now,
                    user_id,
                    team_id
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn has_documents(&self, session_id: &str) -> CoreResult<bool> {
        self.db.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM document_chunks WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Top-k chunks by cosine similarity against the query embedding.
    /// Sessions are bounded, so a full scan of the session's chunks is fine.
    pub fn search_document_chunks(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> CoreResult<Vec<ChunkMatch>> {
        let mut chunks = self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_id, filename, chunk_index, content, embedding_json
                 FROM document_chunks WHERE session_id = ?1",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            let mut chunks = Vec::new();
            for row in rows {
                let (id, file_id, filename, chunk_index, content, embedding_json) = row?;
                let embedding: Vec<f32> = serde_json::from_str(&embedding_json).unwrap_or_default();
                chunks.push(ChunkMatch {
                    id,
                    file_id,
                    filename,
                    chunk_index,
                    content,
                    similarity: cosine_similarity(query_embedding, &embedding),
                });
            }
            Ok(chunks)
        })?;

        chunks.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chunks.truncate(top_k);
        Ok(chunks)
    }
}
