//! Workflow and work-item store: visibility-scoped definitions, triggered
//! work items, stage transitions, attachments, starring, and queues.

pub mod models;
mod queues;
mod storage;
pub mod triggers;

pub use models::*;
pub use queues::{Queue, QueueGrant};
pub use storage::WorkflowStore;

use crate::db::Db;
use crate::errors::CoreResult;

/// Open the store against `workflows.db` and initialize all tables.
pub fn open_store(db: Db) -> CoreResult<WorkflowStore> {
    let store = WorkflowStore::new(db)?;
    store.setup_queue_schema()?;
    Ok(store)
}
