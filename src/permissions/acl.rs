//! Per-resource access control lists.

use super::PermissionEngine;
use crate::errors::CoreResult;
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AclEntry {
    pub id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub user_id: String,
    pub permission: String,
    pub granted_by: String,
    pub granted_at: String,
}

impl PermissionEngine {
    pub fn grant_resource_access(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
        permission: &str,
        granted_by: &str,
    ) -> CoreResult<AclEntry> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT OR IGNORE INTO resource_acl
                 (id, resource_type, resource_id, user_id, permission, granted_by, granted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, resource_type, resource_id, user_id, permission, granted_by, now],
            )?;
        }
        self.audit.record(
            "acl.granted",
            granted_by,
            resource_type,
            resource_id,
            &serde_json::json!({"user_id": user_id, "permission": permission}),
            None,
        );
        Ok(AclEntry {
            id,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            user_id: user_id.to_string(),
            permission: permission.to_string(),
            granted_by: granted_by.to_string(),
            granted_at: now,
        })
    }

    pub fn revoke_resource_access(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
        permission: &str,
        revoked_by: &str,
    ) -> CoreResult<bool> {
        let removed = {
            let conn = self.db.write();
            conn.execute(
                "DELETE FROM resource_acl
                 WHERE resource_type = ?1 AND resource_id = ?2 AND user_id = ?3 AND permission = ?4",
                params![resource_type, resource_id, user_id, permission],
            )?
        };
        if removed > 0 {
            self.audit.record(
                "acl.revoked",
                revoked_by,
                resource_type,
                resource_id,
                &serde_json::json!({"user_id": user_id, "permission": permission}),
                None,
            );
        }
        Ok(removed > 0)
    }

    pub fn check_resource_access(
        &self,
        resource_type: &str,
        resource_id: &str,
        user_id: &str,
        permission: &str,
    ) -> CoreResult<bool> {
        self.db.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM resource_acl
                 WHERE resource_type = ?1 AND resource_id = ?2 AND user_id = ?3 AND permission = ?4",
                params![resource_type, resource_id, user_id, permission],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn list_resource_access(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> CoreResult<Vec<AclEntry>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, resource_type, resource_id, user_id, permission, granted_by, granted_at
                 FROM resource_acl WHERE resource_type = ?1 AND resource_id = ?2
                 ORDER BY granted_at ASC",
            )?;
            let rows = stmt.query_map(params![resource_type, resource_id], |r| {
                Ok(AclEntry {
                    id: r.get(0)?,
                    resource_type: r.get(1)?,
                    resource_id: r.get(2)?,
                    user_id: r.get(3)?,
                    permission: r.get(4)?,
                    granted_by: r.get(5)?,
                    granted_at: r.get(6)?,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
    }
}
