//! Chat memory engine: one façade, many modules.
//!
//! Sessions, messages, rolling summaries, document chunks, cross-session
//! semantic search, and usage analytics over `chat_memory.db`.

mod analytics;
mod documents;
mod messages;
mod schema;
mod search;
mod sessions;
mod summaries;

use crate::cache::SearchCache;
use crate::db::Db;
use crate::embeddings::Embedder;
use crate::errors::CoreResult;
use crate::tracker::OpTracker;
use std::sync::Arc;
use std::time::Duration;

/// Messages at or below this length (in chars) skip embedding precompute.
pub(crate) const EMBED_MIN_CHARS: usize = 20;

pub struct ChatMemory {
    pub(crate) db: Db,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) cache: SearchCache,
    pub(crate) tracker: Option<Arc<dyn OpTracker>>,
}

impl ChatMemory {
    pub fn new(db: Db, embedder: Arc<dyn Embedder>, cache_ttl: Duration) -> CoreResult<Self> {
        {
            let conn = db.write();
            schema::setup_chat_schema(&conn)?;
        }
        Ok(ChatMemory {
            db,
            embedder,
            cache: SearchCache::new(cache_ttl),
            tracker: None,
        })
    }

    /// Wire a sync-log tracker so session/message writes replicate.
    pub fn with_tracker(mut self, tracker: Arc<dyn OpTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}
