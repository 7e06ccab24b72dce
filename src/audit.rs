//! Append-only audit trail for permission and team mutations.
//!
//! Recording is a side effect: failures are logged and swallowed so the
//! primary operation never fails because auditing did.

use crate::db::Db;
use crate::errors::CoreResult;
use crate::models::AuditRecord;
use rusqlite::params;

#[derive(Clone)]
pub struct AuditLog {
    db: Db,
}

impl AuditLog {
    pub fn new(db: Db) -> CoreResult<Self> {
        {
            let conn = db.write();
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS audit_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    action TEXT NOT NULL,
                    actor_user_id TEXT NOT NULL,
                    resource_type TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    details_json TEXT NOT NULL DEFAULT '{}',
                    ip TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor_user_id);
                CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_log(resource_type, resource_id);",
            )?;
        }
        Ok(AuditLog { db })
    }

    /// Record an audit event. Never propagates failure to the caller.
    pub fn record(
        &self,
        action: &str,
        actor_user_id: &str,
        resource_type: &str,
        resource_id: &str,
        details: &serde_json::Value,
        ip: Option<&str>,
    ) {
        let now = chrono::Utc::now().to_rfc3339();
        let details_json = serde_json::to_string(details).unwrap_or_else(|_| "{}".to_string());
        let conn = self.db.write();
        let result = conn.execute(
            "INSERT INTO audit_log (action, actor_user_id, resource_type, resource_id, details_json, ip, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![action, actor_user_id, resource_type, resource_id, details_json, ip, now],
        );
        if let Err(e) = result {
            eprintln!("⚠️ Audit record failed for {action}: {e}");
        }
    }

    pub fn recent(&self, limit: i64) -> CoreResult<Vec<AuditRecord>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, action, actor_user_id, resource_type, resource_id, details_json, ip, created_at
                 FROM audit_log ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], row_to_record)?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }

    pub fn for_resource(&self, resource_type: &str, resource_id: &str) -> CoreResult<Vec<AuditRecord>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, action, actor_user_id, resource_type, resource_id, details_json, ip, created_at
                 FROM audit_log WHERE resource_type = ?1 AND resource_id = ?2 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![resource_type, resource_id], row_to_record)?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    let details_json: String = row.get(5)?;
    Ok(AuditRecord {
        id: row.get(0)?,
        action: row.get(1)?,
        actor_user_id: row.get(2)?,
        resource_type: row.get(3)?,
        resource_id: row.get(4)?,
        details: serde_json::from_str(&details_json).unwrap_or(serde_json::Value::Null),
        ip: row.get(6)?,
        created_at: row.get(7)?,
    })
}
