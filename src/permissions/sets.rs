//! Permission sets: a time-bounded assignment layer. Expired assignments
//! drop out of effective permissions without any cleanup pass.

use super::PermissionEngine;
use super::profiles::ProfileGrant;
use crate::errors::CoreResult;
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PermissionSet {
    pub permission_set_id: String,
    pub set_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetAssignment {
    pub permission_set_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub assigned_at: String,
}

impl PermissionEngine {
    pub fn create_permission_set(
        &self,
        permission_set_id: &str,
        set_name: &str,
        team_id: Option<&str>,
    ) -> CoreResult<PermissionSet> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO permission_sets (permission_set_id, set_name, team_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![permission_set_id, set_name, team_id, now],
            )?;
        }
        Ok(PermissionSet {
            permission_set_id: permission_set_id.to_string(),
            set_name: set_name.to_string(),
            team_id: team_id.map(String::from),
            is_active: true,
            created_at: now,
        })
    }

    pub fn set_permission_set_grant(&self, permission_set_id: &str, grant: &ProfileGrant) -> CoreResult<()> {
        let permission_id = self.permission_id_for(&grant.permission_key)?;
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT OR REPLACE INTO permission_set_grants
                 (permission_set_id, permission_id, is_granted, permission_level, permission_scope)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    permission_set_id,
                    permission_id,
                    grant.is_granted as i64,
                    grant.permission_level,
                    grant.permission_scope
                ],
            )?;
        }
        self.invalidate_set_users(permission_set_id);
        Ok(())
    }

    /// Assign a set to a user, optionally until `expires_at` (RFC 3339).
    /// Re-assignment refreshes the expiry rather than duplicating.
    pub fn assign_permission_set(
        &self,
        permission_set_id: &str,
        user_id: &str,
        expires_at: Option<&str>,
        assigned_by: &str,
    ) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO permission_set_assignments (permission_set_id, user_id, expires_at, assigned_by, assigned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(permission_set_id, user_id)
                 DO UPDATE SET expires_at = excluded.expires_at, assigned_by = excluded.assigned_by",
                params![permission_set_id, user_id, expires_at, assigned_by, now],
            )?;
        }
        self.invalidate_user_cache(user_id);
        self.audit.record(
            "permission.set_assigned",
            assigned_by,
            "permission_set",
            permission_set_id,
            &serde_json::json!({"user_id": user_id, "expires_at": expires_at}),
            None,
        );
        Ok(())
    }

    pub fn unassign_permission_set(
        &self,
        permission_set_id: &str,
        user_id: &str,
        actor: &str,
    ) -> CoreResult<bool> {
        let removed = {
            let conn = self.db.write();
            conn.execute(
                "DELETE FROM permission_set_assignments WHERE permission_set_id = ?1 AND user_id = ?2",
                params![permission_set_id, user_id],
            )?
        };
        self.invalidate_user_cache(user_id);
        if removed > 0 {
            self.audit.record(
                "permission.set_unassigned",
                actor,
                "permission_set",
                permission_set_id,
                &serde_json::json!({"user_id": user_id}),
                None,
            );
        }
        Ok(removed > 0)
    }

    /// Assignments for a user; by default only unexpired ones.
    pub fn get_user_set_assignments(
        &self,
        user_id: &str,
        include_expired: bool,
    ) -> CoreResult<Vec<SetAssignment>> {
        let now = chrono::Utc::now().to_rfc3339();
        self.db.read(|conn| {
            let sql = if include_expired {
                "SELECT permission_set_id, user_id, expires_at, assigned_at
                 FROM permission_set_assignments WHERE user_id = ?1 ORDER BY assigned_at ASC"
            } else {
                "SELECT permission_set_id, user_id, expires_at, assigned_at
                 FROM permission_set_assignments
                 WHERE user_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY assigned_at ASC"
            };
            let mut stmt = conn.prepare(sql)?;
            let map = |r: &rusqlite::Row<'_>| {
                Ok(SetAssignment {
                    permission_set_id: r.get(0)?,
                    user_id: r.get(1)?,
                    expires_at: r.get(2)?,
                    assigned_at: r.get(3)?,
                })
            };
            let mut assignments = Vec::new();
            if include_expired {
                let rows = stmt.query_map(params![user_id], map)?;
                for row in rows {
                    assignments.push(row?);
                }
            } else {
                let rows = stmt.query_map(params![user_id, now], map)?;
                for row in rows {
                    assignments.push(row?);
                }
            }
            Ok(assignments)
        })
    }

    fn invalidate_set_users(&self, permission_set_id: &str) {
        let users: Vec<String> = self
            .db
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id FROM permission_set_assignments WHERE permission_set_id = ?1",
                )?;
                let rows = stmt.query_map(params![permission_set_id], |r| r.get(0))?;
                let mut users = Vec::new();
                for row in rows {
                    users.push(row?);
                }
                Ok(users)
            })
            .unwrap_or_default();
        for user_id in users {
            self.invalidate_user_cache(&user_id);
        }
    }
}
