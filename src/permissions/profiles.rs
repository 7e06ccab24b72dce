//! Permission profiles: named bundles of positive and negative grants,
//! assigned to users. Assignment is idempotent.

use super::PermissionEngine;
use crate::errors::CoreResult;
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PermissionProfile {
    pub profile_id: String,
    pub profile_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applies_to_role: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProfileGrant {
    pub permission_key: String,
    pub is_granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_scope: Option<String>,
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<PermissionProfile> {
    Ok(PermissionProfile {
        profile_id: row.get(0)?,
        profile_name: row.get(1)?,
        description: row.get(2)?,
        team_id: row.get(3)?,
        applies_to_role: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
    })
}

impl PermissionEngine {
    pub fn create_profile(
        &self,
        profile_id: &str,
        profile_name: &str,
        description: Option<&str>,
        team_id: Option<&str>,
        applies_to_role: Option<&str>,
    ) -> CoreResult<PermissionProfile> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO permission_profiles
                 (profile_id, profile_name, description, team_id, applies_to_role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![profile_id, profile_name, description, team_id, applies_to_role, now],
            )?;
        }
        Ok(PermissionProfile {
            profile_id: profile_id.to_string(),
            profile_name: profile_name.to_string(),
            description: description.map(String::from),
            team_id: team_id.map(String::from),
            applies_to_role: applies_to_role.map(String::from),
            is_active: true,
            created_at: now,
        })
    }

    pub fn set_profile_active(&self, profile_id: &str, is_active: bool) -> CoreResult<()> {
        {
            let conn = self.db.write();
            conn.execute(
                "UPDATE permission_profiles SET is_active = ?1 WHERE profile_id = ?2",
                params![is_active as i64, profile_id],
            )?;
        }
        self.invalidate_profile_users(profile_id);
        Ok(())
    }

    /// Attach a grant to a profile. A negative grant (`is_granted = false`)
    /// is an explicit deny and beats any positive grant elsewhere.
    pub fn set_profile_grant(&self, profile_id: &str, grant: &ProfileGrant) -> CoreResult<()> {
        let permission_id = self.permission_id_for(&grant.permission_key)?;
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT OR REPLACE INTO profile_grants
                 (profile_id, permission_id, is_granted, permission_level, permission_scope)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    profile_id,
                    permission_id,
                    grant.is_granted as i64,
                    grant.permission_level,
                    grant.permission_scope
                ],
            )?;
        }
        self.invalidate_profile_users(profile_id);
        Ok(())
    }

    /// Assign a profile to a user. Re-assigning the same pair is a no-op.
    pub fn assign_profile(&self, profile_id: &str, user_id: &str, assigned_by: &str) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT OR IGNORE INTO profile_assignments (profile_id, user_id, assigned_by, assigned_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![profile_id, user_id, assigned_by, now],
            )?;
        }
        self.invalidate_user_cache(user_id);
        self.audit.record(
            "permission.profile_assigned",
            assigned_by,
            "profile",
            profile_id,
            &serde_json::json!({"user_id": user_id}),
            None,
        );
        Ok(())
    }

    pub fn unassign_profile(&self, profile_id: &str, user_id: &str, actor: &str) -> CoreResult<bool> {
        let removed = {
            let conn = self.db.write();
            conn.execute(
                "DELETE FROM profile_assignments WHERE profile_id = ?1 AND user_id = ?2",
                params![profile_id, user_id],
            )?
        };
        self.invalidate_user_cache(user_id);
        if removed > 0 {
            self.audit.record(
                "permission.profile_unassigned",
                actor,
                "profile",
                profile_id,
                &serde_json::json!({"user_id": user_id}),
                None,
            );
        }
        Ok(removed > 0)
    }

    pub fn get_user_profiles(&self, user_id: &str) -> CoreResult<Vec<PermissionProfile>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.profile_id, p.profile_name, p.description, p.team_id, p.applies_to_role, p.is_active, p.created_at
                 FROM permission_profiles p
                 JOIN profile_assignments a ON p.profile_id = a.profile_id
                 WHERE a.user_id = ?1
                 ORDER BY a.assigned_at ASC",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_profile)?;
            let mut profiles = Vec::new();
            for row in rows {
                profiles.push(row?);
            }
            Ok(profiles)
        })
    }

    /// Invalidate every user holding this profile.
    fn invalidate_profile_users(&self, profile_id: &str) {
        let users: Vec<String> = self
            .db
            .read(|conn| {
                let mut stmt = conn
                    .prepare("SELECT user_id FROM profile_assignments WHERE profile_id = ?1")?;
                let rows = stmt.query_map(params![profile_id], |r| r.get(0))?;
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
