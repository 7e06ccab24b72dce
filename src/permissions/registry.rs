//! Permission definitions. Every grant references a registered permission.

use super::PermissionEngine;
use crate::errors::{CoreError, CoreResult};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PermissionDef {
    pub permission_id: String,
    pub permission_key: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// `boolean`, `level`, or `scope`.
    pub permission_type: String,
    pub is_system: bool,
}

fn row_to_def(row: &Row<'_>) -> rusqlite::Result<PermissionDef> {
    Ok(PermissionDef {
        permission_id: row.get(0)?,
        permission_key: row.get(1)?,
        category: row.get(2)?,
        subcategory: row.get(3)?,
        permission_type: row.get(4)?,
        is_system: row.get::<_, i64>(5)? != 0,
    })
}

const PERMISSION_TYPES: &[&str] = &["boolean", "level", "scope"];

impl PermissionEngine {
    /// Register (or re-register) a permission definition. Idempotent on
    /// `permission_id`.
    pub fn register_permission(&self, def: &PermissionDef) -> CoreResult<()> {
        if !PERMISSION_TYPES.contains(&def.permission_type.as_str()) {
            return Err(CoreError::Invalid(format!(
                "unknown permission type: {}",
                def.permission_type
            )));
        }
        let conn = self.db.write();
        conn.execute(
            "INSERT OR REPLACE INTO permissions_registry
             (permission_id, permission_key, category, subcategory, permission_type, is_system)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                def.permission_id,
                def.permission_key,
                def.category,
                def.subcategory,
                def.permission_type,
                def.is_system as i64
            ],
        )?;
        Ok(())
    }

    pub fn get_permission(&self, permission_key: &str) -> CoreResult<Option<PermissionDef>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT permission_id, permission_key, category, subcategory, permission_type, is_system
                 FROM permissions_registry WHERE permission_key = ?1",
                params![permission_key],
                row_to_def,
            );
            match row {
                Ok(def) => Ok(Some(def)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn list_permissions(&self, category: Option<&str>) -> CoreResult<Vec<PermissionDef>> {
        self.db.read(|conn| {
            let mut defs = Vec::new();
            if let Some(category) = category {
                let mut stmt = conn.prepare(
                    "SELECT permission_id, permission_key, category, subcategory, permission_type, is_system
                     FROM permissions_registry WHERE category = ?1 ORDER BY permission_key ASC",
                )?;
                let rows = stmt.query_map(params![category], row_to_def)?;
                for row in rows {
                    defs.push(row?);
                }
            } else {
                let mut stmt = conn.prepare(
                    "SELECT permission_id, permission_key, category, subcategory, permission_type, is_system
                     FROM permissions_registry ORDER BY permission_key ASC",
                )?;
                let rows = stmt.query_map([], row_to_def)?;
                for row in rows {
                    defs.push(row?);
                }
            }
            Ok(defs)
        })
    }

    /// Resolve a permission key to its id, failing when unregistered.
    pub(crate) fn permission_id_for(&self, permission_key: &str) -> CoreResult<String> {
        self.get_permission(permission_key)?
            .map(|def| def.permission_id)
            .ok_or(CoreError::NotFound)
    }
}
