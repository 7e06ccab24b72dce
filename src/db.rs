//! Embedded storage substrate.
//!
//! One `Db` per logical database file. All mutating statements go through a
//! single write connection guarded by a process-wide mutex (per database),
//! which keeps bursty writers from tripping SQLITE_BUSY. Reads use a
//! connection-per-thread pattern and proceed concurrently under WAL.

use crate::errors::CoreResult;
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

thread_local! {
    // Read connections, one per (thread, database path).
    static READ_CONNECTIONS: RefCell<HashMap<String, Connection>> = RefCell::new(HashMap::new());
}

struct DbInner {
    path: String,
    write: Mutex<Connection>,
}

#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    pub fn open(path: &str) -> CoreResult<Self> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = open_connection(path)?;
        Ok(Db {
            inner: Arc::new(DbInner {
                path: path.to_string(),
                write: Mutex::new(conn),
            }),
        })
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Acquire the write connection. The returned guard is the write mutex;
    /// hold it for the shortest window possible.
    pub fn write(&self) -> MutexGuard<'_, Connection> {
        self.inner.write.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a read-only closure against this thread's read connection for the
    /// database, creating it on first use. Does not take the write mutex.
    ///
    /// The connection is checked out of the thread-local map for the duration
    /// of the closure, so reentrant reads just open a short-lived extra
    /// connection instead of deadlocking on the cache.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> CoreResult<T>) -> CoreResult<T> {
        let checked_out =
            READ_CONNECTIONS.with(|cell| cell.borrow_mut().remove(&self.inner.path));
        let conn = match checked_out {
            Some(conn) => conn,
            None => open_connection(&self.inner.path)?,
        };
        let result = f(&conn);
        READ_CONNECTIONS.with(|cell| {
            cell.borrow_mut().insert(self.inner.path.clone(), conn);
        });
        result
    }
}

fn open_connection(path: &str) -> CoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA temp_store=MEMORY;
         PRAGMA mmap_size=268435456;
         PRAGMA busy_timeout=30000;",
    )?;
    Ok(conn)
}

/// Derive the sync metadata database path from the main database path.
/// `/data/teammesh.db` -> `/data/teammesh_sync.db`
pub fn sync_db_path_for(app_db_path: &str) -> String {
    match app_db_path.strip_suffix(".db") {
        Some(stem) => format!("{stem}_sync.db"),
        None => format!("{app_db_path}_sync.db"),
    }
}
