//! Effective permission computation.
//!
//! Union of positive grants from active profiles and unexpired permission
//! sets, minus any explicit deny. A single negative grant beats any number
//! of positive ones.

use super::PermissionEngine;
use crate::errors::CoreResult;
use crate::models::Role;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EffectiveGrant {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EffectivePermissions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub grants: HashMap<String, EffectiveGrant>,
}

impl EffectivePermissions {
    pub fn is_granted(&self, permission_key: &str) -> bool {
        self.grants
            .get(permission_key)
            .map(|g| g.granted)
            .unwrap_or(false)
    }
}

/// Raw grant row: (permission_key, is_granted, level, scope).
type GrantRow = (String, bool, Option<i64>, Option<String>);

impl PermissionEngine {
    /// Compute (or fetch cached) effective permissions for a user within an
    /// optional team scope.
    pub fn effective_permissions(
        &self,
        user_id: &str,
        team_id: Option<&str>,
    ) -> CoreResult<EffectivePermissions> {
        let cache_key = (user_id.to_string(), team_id.map(String::from));
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.get(&cache_key) {
                return Ok(cached.clone());
            }
        }

        let role: Option<Role> = self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT role FROM users WHERE user_id = ?1",
                params![user_id],
                |r| r.get::<_, String>(0),
            );
            match row {
                Ok(role) => Ok(Some(Role::parse(&role))),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;

        let now = chrono::Utc::now().to_rfc3339();
        let scope = team_id.unwrap_or("");

        // Grants from active profiles assigned to the user, restricted to
        // profiles with no team or the caller's team.
        let profile_grants: Vec<GrantRow> = self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.permission_key, g.is_granted, g.permission_level, g.permission_scope
                 FROM profile_grants g
                 JOIN profile_assignments a ON g.profile_id = a.profile_id
                 JOIN permission_profiles p ON g.profile_id = p.profile_id
                 JOIN permissions_registry r ON g.permission_id = r.permission_id
                 WHERE a.user_id = ?1 AND p.is_active = 1
                   AND (p.team_id IS NULL OR p.team_id = ?2)",
            )?;
            let rows = stmt.query_map(params![user_id, scope], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)? != 0,
                    r.get(2)?,
                    r.get(3)?,
                ))
            })?;
            let mut grants = Vec::new();
            for row in rows {
                grants.push(row?);
            }
            Ok(grants)
        })?;

        // Grants from active sets with an unexpired assignment.
        let set_grants: Vec<GrantRow> = self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.permission_key, g.is_granted, g.permission_level, g.permission_scope
                 FROM permission_set_grants g
                 JOIN permission_set_assignments a ON g.permission_set_id = a.permission_set_id
                 JOIN permission_sets s ON g.permission_set_id = s.permission_set_id
                 JOIN permissions_registry r ON g.permission_id = r.permission_id
                 WHERE a.user_id = ?1 AND s.is_active = 1
                   AND (a.expires_at IS NULL OR a.expires_at > ?2)
                   AND (s.team_id IS NULL OR s.team_id = ?3)",
            )?;
            let rows = stmt.query_map(params![user_id, now, scope], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)? != 0,
                    r.get(2)?,
                    r.get(3)?,
                ))
            })?;
            let mut grants = Vec::new();
            for row in rows {
                grants.push(row?);
            }
            Ok(grants)
        })?;

        let mut grants: HashMap<String, EffectiveGrant> = HashMap::new();
        let mut denied: Vec<String> = Vec::new();
        for (key, is_granted, level, grant_scope) in
            profile_grants.into_iter().chain(set_grants)
        {
            if !is_granted {
                denied.push(key.clone());
            }
            let entry = grants.entry(key).or_insert(EffectiveGrant {
                granted: false,
                level: None,
                scope: None,
            });
            if is_granted {
                entry.granted = true;
                entry.level = entry.level.max(level);
                if entry.scope.is_none() {
                    entry.scope = grant_scope;
                }
            }
        }
        // Deny precedence: any explicit negative grant wins.
        for key in denied {
            if let Some(entry) = grants.get_mut(&key) {
                entry.granted = false;
                entry.level = None;
                entry.scope = None;
            }
        }

        let effective = EffectivePermissions { role, grants };
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.insert(cache_key, effective.clone());
        }
        Ok(effective)
    }

    /// True iff the user holds at least one positive grant and no explicit
    /// deny for the permission.
    pub fn check_permission(
        &self,
        user_id: &str,
        team_id: Option<&str>,
        permission_key: &str,
    ) -> CoreResult<bool> {
        Ok(self
            .effective_permissions(user_id, team_id)?
            .is_granted(permission_key))
    }
}
