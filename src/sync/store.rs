//! Sync metadata persistence: the operation log, per-peer sync state, and
//! version tracking for conflict detection.

use crate::db::Db;
use crate::errors::CoreResult;
use crate::models::{OpKind, PeerState, PeerStatus, SyncOperation};
use rusqlite::{Row, params};

pub fn setup_sync_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_operations (
            op_id TEXT PRIMARY KEY,
            table_name TEXT NOT NULL,
            operation TEXT NOT NULL,
            row_id TEXT NOT NULL,
            data_json TEXT,
            timestamp TEXT NOT NULL,
            peer_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            team_id TEXT,
            signature TEXT NOT NULL DEFAULT '',
            synced INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_sync_ops_peer ON sync_operations(peer_id, synced);
        CREATE INDEX IF NOT EXISTS idx_sync_ops_timestamp ON sync_operations(timestamp);

        CREATE TABLE IF NOT EXISTS peer_sync_state (
            peer_id TEXT PRIMARY KEY,
            last_sync TEXT,
            operations_sent INTEGER NOT NULL DEFAULT 0,
            operations_received INTEGER NOT NULL DEFAULT 0,
            conflicts_resolved INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'idle'
        );

        CREATE TABLE IF NOT EXISTS version_tracking (
            table_name TEXT NOT NULL,
            row_id TEXT NOT NULL,
            peer_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            PRIMARY KEY (table_name, row_id, peer_id)
        );",
    )
}

fn row_to_operation(row: &Row<'_>) -> rusqlite::Result<SyncOperation> {
    let operation: String = row.get(2)?;
    let data_json: Option<String> = row.get(4)?;
    Ok(SyncOperation {
        op_id: row.get(0)?,
        table_name: row.get(1)?,
        operation: OpKind::parse(&operation).unwrap_or(OpKind::Insert),
        row_id: row.get(3)?,
        data: data_json.and_then(|s| serde_json::from_str(&s).ok()),
        timestamp: row.get(5)?,
        peer_id: row.get(6)?,
        version: row.get(7)?,
        team_id: row.get(8)?,
        signature: row.get(9)?,
    })
}

const OPERATION_COLUMNS: &str =
    "op_id, table_name, operation, row_id, data_json, timestamp, peer_id, version, team_id, signature";

pub fn save_operation(db: &Db, op: &SyncOperation) -> CoreResult<()> {
    let data_json = match &op.data {
        Some(data) => Some(serde_json::to_string(data)?),
        None => None,
    };
    let conn = db.write();
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO sync_operations ({OPERATION_COLUMNS}, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)"
        ),
        params![
            op.op_id,
            op.table_name,
            op.operation.as_str(),
            op.row_id,
            data_json,
            op.timestamp,
            op.peer_id,
            op.version,
            op.team_id,
            op.signature
        ],
    )?;
    Ok(())
}

/// Load unsynced operations for a peer, oldest version first. Used on
/// startup so tracked operations survive restarts.
pub fn load_pending_operations(db: &Db, peer_id: &str) -> CoreResult<Vec<SyncOperation>> {
    db.read(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {OPERATION_COLUMNS} FROM sync_operations
             WHERE peer_id = ?1 AND synced = 0 ORDER BY version ASC"
        ))?;
        let rows = stmt.query_map(params![peer_id], row_to_operation)?;
        let mut ops = Vec::new();
        for row in rows {
            ops.push(row?);
        }
        Ok(ops)
    })
}

pub fn mark_operations_synced(db: &Db, op_ids: &[String]) -> CoreResult<()> {
    if op_ids.is_empty() {
        return Ok(());
    }
    let conn = db.write();
    for chunk in op_ids.chunks(500) {
        let placeholders: Vec<String> = (0..chunk.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "UPDATE sync_operations SET synced = 1 WHERE op_id IN ({})",
            placeholders.join(",")
        );
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            chunk.iter().map(|s| s as &dyn rusqlite::types::ToSql).collect();
        conn.execute(&sql, params_refs.as_slice())?;
    }
    Ok(())
}

/// Local delta for a peer: our own operations newer than the last sync,
/// optionally restricted to named tables, oldest version first.
pub fn get_operations_since(
    db: &Db,
    local_peer_id: &str,
    last_sync: Option<&str>,
    tables: Option<&[String]>,
) -> CoreResult<Vec<SyncOperation>> {
    db.read(|conn| {
        let mut sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM sync_operations WHERE peer_id = ?1"
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(local_peer_id.to_string())];
        if let Some(last_sync) = last_sync {
            values.push(Box::new(last_sync.to_string()));
            sql.push_str(&format!(" AND timestamp > ?{}", values.len()));
        }
        if let Some(tables) = tables
            && !tables.is_empty()
        {
            let mut placeholders = Vec::new();
            for table in tables {
                values.push(Box::new(table.clone()));
                placeholders.push(format!("?{}", values.len()));
            }
            sql.push_str(&format!(" AND table_name IN ({})", placeholders.join(",")));
        }
        sql.push_str(" ORDER BY version ASC");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), row_to_operation)?;
        let mut ops = Vec::new();
        for row in rows {
            ops.push(row?);
        }
        Ok(ops)
    })
}

pub fn get_peer_last_sync(db: &Db, peer_id: &str) -> CoreResult<Option<String>> {
    db.read(|conn| {
        let row = conn.query_row(
            "SELECT last_sync FROM peer_sync_state WHERE peer_id = ?1",
            params![peer_id],
            |r| r.get::<_, Option<String>>(0),
        );
        match row {
            Ok(last_sync) => Ok(last_sync),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    })
}

pub fn save_peer_state(db: &Db, state: &PeerState) -> CoreResult<()> {
    let conn = db.write();
    conn.execute(
        "INSERT OR REPLACE INTO peer_sync_state
         (peer_id, last_sync, operations_sent, operations_received, conflicts_resolved, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            state.peer_id,
            state.last_sync,
            state.operations_sent,
            state.operations_received,
            state.conflicts_resolved,
            state.status.as_str()
        ],
    )?;
    Ok(())
}

pub fn load_peer_states(db: &Db) -> CoreResult<Vec<PeerState>> {
    db.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT peer_id, last_sync, operations_sent, operations_received, conflicts_resolved, status
             FROM peer_sync_state",
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(5)?;
            Ok(PeerState {
                peer_id: row.get(0)?,
                last_sync: row.get(1)?,
                operations_sent: row.get(2)?,
                operations_received: row.get(3)?,
                conflicts_resolved: row.get(4)?,
                status: PeerStatus::parse(&status),
            })
        })?;
        let mut states = Vec::new();
        for row in rows {
            states.push(row?);
        }
        Ok(states)
    })
}

/// A row is in conflict when another peer has already written a tracked
/// version of it.
pub fn has_version_conflict(db: &Db, table: &str, row_id: &str, peer_id: &str) -> CoreResult<bool> {
    db.read(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM version_tracking
             WHERE table_name = ?1 AND row_id = ?2 AND peer_id != ?3",
            params![table, row_id, peer_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Highest tracked (version, timestamp) for a row across all peers.
pub fn latest_tracked_version(db: &Db, table: &str, row_id: &str) -> CoreResult<Option<(i64, String)>> {
    db.read(|conn| {
        let row = conn.query_row(
            "SELECT version, timestamp FROM version_tracking
             WHERE table_name = ?1 AND row_id = ?2
             ORDER BY version DESC LIMIT 1",
            params![table, row_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        );
        match row {
            Ok(pair) => Ok(Some(pair)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    })
}

pub fn update_version_tracking(db: &Db, op: &SyncOperation) -> CoreResult<()> {
    let conn = db.write();
    conn.execute(
        "INSERT OR REPLACE INTO version_tracking (table_name, row_id, peer_id, version, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![op.table_name, op.row_id, op.peer_id, op.version, op.timestamp],
    )?;
    Ok(())
}
