//! Permission engine: registry, profiles, time-bounded permission sets,
//! effective-permission resolution with deny precedence, Founder Rights, and
//! per-resource ACLs.

mod acl;
mod effective;
mod founder;
mod profiles;
mod registry;
mod sets;

pub use acl::AclEntry;
pub use effective::{EffectiveGrant, EffectivePermissions};
pub use founder::FounderRightsRecord;
pub use profiles::{PermissionProfile, ProfileGrant};
pub use registry::PermissionDef;
pub use sets::{PermissionSet, SetAssignment};

use crate::audit::AuditLog;
use crate::db::Db;
use crate::errors::CoreResult;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct PermissionEngine {
    pub(crate) db: Db,
    pub(crate) audit: AuditLog,
    // Per-user effective-permission cache, keyed (user_id, team scope).
    pub(crate) cache: Mutex<HashMap<(String, Option<String>), EffectivePermissions>>,
}

impl PermissionEngine {
    pub fn new(db: Db, audit: AuditLog) -> CoreResult<Self> {
        {
            let conn = db.write();
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS permissions_registry (
                    permission_id TEXT PRIMARY KEY,
                    permission_key TEXT NOT NULL UNIQUE,
                    category TEXT NOT NULL,
                    subcategory TEXT,
                    permission_type TEXT NOT NULL DEFAULT 'boolean',
                    is_system INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS permission_profiles (
                    profile_id TEXT PRIMARY KEY,
                    profile_name TEXT NOT NULL,
                    description TEXT,
                    team_id TEXT,
                    applies_to_role TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS profile_grants (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    profile_id TEXT NOT NULL,
                    permission_id TEXT NOT NULL,
                    is_granted INTEGER NOT NULL,
                    permission_level INTEGER,
                    permission_scope TEXT,
                    UNIQUE(profile_id, permission_id)
                );

                CREATE TABLE IF NOT EXISTS profile_assignments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    profile_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    assigned_by TEXT,
                    assigned_at TEXT NOT NULL,
                    UNIQUE(profile_id, user_id)
                );
                CREATE INDEX IF NOT EXISTS idx_profile_assignments_user ON profile_assignments(user_id);

                CREATE TABLE IF NOT EXISTS permission_sets (
                    permission_set_id TEXT PRIMARY KEY,
                    set_name TEXT NOT NULL,
                    team_id TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS permission_set_grants (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    permission_set_id TEXT NOT NULL,
                    permission_id TEXT NOT NULL,
                    is_granted INTEGER NOT NULL,
                    permission_level INTEGER,
                    permission_scope TEXT,
                    UNIQUE(permission_set_id, permission_id)
                );

                CREATE TABLE IF NOT EXISTS permission_set_assignments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    permission_set_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    expires_at TEXT,
                    assigned_by TEXT,
                    assigned_at TEXT NOT NULL,
                    UNIQUE(permission_set_id, user_id)
                );
                CREATE INDEX IF NOT EXISTS idx_set_assignments_user ON permission_set_assignments(user_id);

                CREATE TABLE IF NOT EXISTS god_rights_auth (
                    user_id TEXT PRIMARY KEY,
                    auth_key_hash TEXT,
                    delegated_by TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    revoked_at TEXT,
                    revoked_by TEXT,
                    notes TEXT
                );

                CREATE TABLE IF NOT EXISTS resource_acl (
                    id TEXT PRIMARY KEY,
                    resource_type TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    permission TEXT NOT NULL,
                    granted_by TEXT NOT NULL,
                    granted_at TEXT NOT NULL,
                    UNIQUE(resource_type, resource_id, user_id, permission)
                );
                CREATE INDEX IF NOT EXISTS idx_resource_acl_resource ON resource_acl(resource_type, resource_id);",
            )?;
        }
        Ok(PermissionEngine {
            db,
            audit,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Drop cached effective permissions for a user; the next check sees
    /// fresh values. Called after every profile/set mutation touching them.
    pub fn invalidate_user_cache(&self, user_id: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.retain(|(cached_user, _), _| cached_user != user_id);
    }
}
