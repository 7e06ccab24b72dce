//! Founder Rights: break-glass administration, orthogonal to profiles.
//!
//! Records persist across revoke/reactivate cycles so the audit history is
//! never lost; `created_at` survives the full lifecycle.

use super::PermissionEngine;
use crate::errors::{CoreError, CoreResult};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FounderRightsRecord {
    pub user_id: String,
    #[serde(skip_serializing)]
    pub auth_key_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_by: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn hash_auth_key(auth_key: &str) -> String {
    hex::encode(Sha256::digest(auth_key.as_bytes()))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FounderRightsRecord> {
    Ok(FounderRightsRecord {
        user_id: row.get(0)?,
        auth_key_hash: row.get(1)?,
        delegated_by: row.get(2)?,
        is_active: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
        revoked_at: row.get(5)?,
        revoked_by: row.get(6)?,
        notes: row.get(7)?,
    })
}

const RECORD_COLUMNS: &str =
    "user_id, auth_key_hash, delegated_by, is_active, created_at, revoked_at, revoked_by, notes";

impl PermissionEngine {
    /// Grant Founder Rights. The out-of-band `auth_key` is hashed and
    /// stored. Granting to a user with an existing (revoked) record
    /// reactivates it, preserving `created_at`.
    pub fn grant_god_rights(
        &self,
        user_id: &str,
        auth_key: &str,
        delegated_by: Option<&str>,
        notes: Option<&str>,
    ) -> CoreResult<FounderRightsRecord> {
        let key_hash = hash_auth_key(auth_key);
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO god_rights_auth (user_id, auth_key_hash, delegated_by, is_active, created_at, notes)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     auth_key_hash = excluded.auth_key_hash,
                     delegated_by = excluded.delegated_by,
                     is_active = 1,
                     notes = excluded.notes",
                params![user_id, key_hash, delegated_by, now, notes],
            )?;
        }
        self.audit.record(
            "god_rights.granted",
            delegated_by.unwrap_or(user_id),
            "user",
            user_id,
            &serde_json::json!({"delegated_by": delegated_by}),
            None,
        );
        self.get_god_rights_record(user_id)?
            .ok_or(CoreError::NotFound)
    }

    /// Deactivate, preserving the row for audit history.
    pub fn revoke_god_rights(&self, user_id: &str, revoked_by: &str) -> CoreResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = {
            let conn = self.db.write();
            conn.execute(
                "UPDATE god_rights_auth SET is_active = 0, revoked_at = ?1, revoked_by = ?2
                 WHERE user_id = ?3 AND is_active = 1",
                params![now, revoked_by, user_id],
            )?
        };
        if changed > 0 {
            self.audit.record(
                "god_rights.revoked",
                revoked_by,
                "user",
                user_id,
                &serde_json::json!({}),
                None,
            );
        }
        Ok(changed > 0)
    }

    /// Flip an existing revoked record back on. History (revocation fields)
    /// stays in place; `created_at` is untouched.
    pub fn reactivate_god_rights(&self, user_id: &str, reactivated_by: &str) -> CoreResult<bool> {
        let changed = {
            let conn = self.db.write();
            conn.execute(
                "UPDATE god_rights_auth SET is_active = 1 WHERE user_id = ?1 AND is_active = 0",
                params![user_id],
            )?
        };
        if changed > 0 {
            self.audit.record(
                "god_rights.reactivated",
                reactivated_by,
                "user",
                user_id,
                &serde_json::json!({}),
                None,
            );
        }
        Ok(changed > 0)
    }

    pub fn check_god_rights(&self, user_id: &str) -> CoreResult<bool> {
        self.db.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM god_rights_auth WHERE user_id = ?1 AND is_active = 1",
                params![user_id],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Verify the out-of-band auth key for an active record.
    pub fn verify_god_rights_key(&self, user_id: &str, auth_key: &str) -> CoreResult<bool> {
        let key_hash = hash_auth_key(auth_key);
        self.db.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM god_rights_auth
                 WHERE user_id = ?1 AND is_active = 1 AND auth_key_hash = ?2",
                params![user_id, key_hash],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn get_god_rights_record(&self, user_id: &str) -> CoreResult<Option<FounderRightsRecord>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM god_rights_auth WHERE user_id = ?1"),
                params![user_id],
                row_to_record,
            );
            match row {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn list_god_rights(&self, include_revoked: bool) -> CoreResult<Vec<FounderRightsRecord>> {
        self.db.read(|conn| {
            let sql = if include_revoked {
                format!("SELECT {RECORD_COLUMNS} FROM god_rights_auth ORDER BY created_at ASC")
            } else {
                format!(
                    "SELECT {RECORD_COLUMNS} FROM god_rights_auth WHERE is_active = 1 ORDER BY created_at ASC"
                )
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_record)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
    }
}
