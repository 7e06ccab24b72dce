//! Named workload queues with per-queue access grants.
//!
//! Each grant is keyed `(access_type, grant_type, grant_value)`; checks
//! return the decision plus the reason, so callers can surface why access
//! was refused.

use super::storage::WorkflowStore;
use crate::errors::{CoreError, CoreResult};
use crate::models::Principal;
use rusqlite::params;
use serde::{Deserialize, Serialize};

const ACCESS_TYPES: &[&str] = &["read", "write", "admin", "execute"];
const GRANT_TYPES: &[&str] = &["user", "role", "team"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Queue {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueGrant {
    pub id: i64,
    pub queue_id: String,
    pub access_type: String,
    pub grant_type: String,
    pub grant_value: String,
    pub granted_by: String,
    pub granted_at: String,
}

impl WorkflowStore {
    pub(crate) fn setup_queue_schema(&self) -> CoreResult<()> {
        let conn = self.db.write();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queues (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                team_id TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queues_team ON queues(team_id);

            CREATE TABLE IF NOT EXISTS queue_permissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue_id TEXT NOT NULL,
                access_type TEXT NOT NULL,
                grant_type TEXT NOT NULL,
                grant_value TEXT NOT NULL,
                granted_by TEXT NOT NULL,
                granted_at TEXT NOT NULL,
                UNIQUE(queue_id, access_type, grant_type, grant_value),
                FOREIGN KEY (queue_id) REFERENCES queues(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_queue_permissions_queue ON queue_permissions(queue_id, access_type);",
        )?;
        Ok(())
    }

    pub fn create_queue(
        &self,
        queue_id: &str,
        name: &str,
        description: Option<&str>,
        team_id: Option<&str>,
        created_by: &str,
    ) -> CoreResult<Queue> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO queues (id, name, description, team_id, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![queue_id, name, description, team_id, created_by, now],
            )?;
        }
        Ok(Queue {
            id: queue_id.to_string(),
            name: name.to_string(),
            description: description.map(String::from),
            team_id: team_id.map(String::from),
            created_by: created_by.to_string(),
            created_at: now,
        })
    }

    pub fn get_queue(&self, queue_id: &str) -> CoreResult<Option<Queue>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT id, name, description, team_id, created_by, created_at FROM queues WHERE id = ?1",
                params![queue_id],
                |r| {
                    Ok(Queue {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        description: r.get(2)?,
                        team_id: r.get(3)?,
                        created_by: r.get(4)?,
                        created_at: r.get(5)?,
                    })
                },
            );
            match row {
                Ok(queue) => Ok(Some(queue)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn list_queues(&self, team_id: Option<&str>) -> CoreResult<Vec<Queue>> {
        self.db.read(|conn| {
            let map = |r: &rusqlite::Row<'_>| {
                Ok(Queue {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    description: r.get(2)?,
                    team_id: r.get(3)?,
                    created_by: r.get(4)?,
                    created_at: r.get(5)?,
                })
            };
            let mut queues = Vec::new();
            if let Some(team_id) = team_id {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, team_id, created_by, created_at
                     FROM queues WHERE team_id = ?1 ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map(params![team_id], map)?;
                for row in rows {
                    queues.push(row?);
                }
            } else {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, team_id, created_by, created_at
                     FROM queues WHERE team_id IS NULL ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map([], map)?;
                for row in rows {
                    queues.push(row?);
                }
            }
            Ok(queues)
        })
    }

    pub fn delete_queue(&self, queue_id: &str) -> CoreResult<bool> {
        let mut conn = self.db.write();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM queue_permissions WHERE queue_id = ?1", params![queue_id])?;
        let deleted = tx.execute("DELETE FROM queues WHERE id = ?1", params![queue_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn grant_queue_access(
        &self,
        queue_id: &str,
        access_type: &str,
        grant_type: &str,
        grant_value: &str,
        granted_by: &str,
    ) -> CoreResult<()> {
        validate_access_type(access_type)?;
        if !GRANT_TYPES.contains(&grant_type) {
            return Err(CoreError::Invalid(format!("unknown grant type: {grant_type}")));
        }
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "INSERT OR IGNORE INTO queue_permissions
             (queue_id, access_type, grant_type, grant_value, granted_by, granted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![queue_id, access_type, grant_type, grant_value, granted_by, now],
        )?;
        Ok(())
    }

    pub fn revoke_queue_access(
        &self,
        queue_id: &str,
        access_type: &str,
        grant_type: &str,
        grant_value: &str,
    ) -> CoreResult<bool> {
        let conn = self.db.write();
        let removed = conn.execute(
            "DELETE FROM queue_permissions
             WHERE queue_id = ?1 AND access_type = ?2 AND grant_type = ?3 AND grant_value = ?4",
            params![queue_id, access_type, grant_type, grant_value],
        )?;
        Ok(removed > 0)
    }

    pub fn queue_grants(&self, queue_id: &str) -> CoreResult<Vec<QueueGrant>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, queue_id, access_type, grant_type, grant_value, granted_by, granted_at
                 FROM queue_permissions WHERE queue_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![queue_id], |r| {
                Ok(QueueGrant {
                    id: r.get(0)?,
                    queue_id: r.get(1)?,
                    access_type: r.get(2)?,
                    grant_type: r.get(3)?,
                    grant_value: r.get(4)?,
                    granted_by: r.get(5)?,
                    granted_at: r.get(6)?,
                })
            })?;
            let mut grants = Vec::new();
            for row in rows {
                grants.push(row?);
            }
            Ok(grants)
        })
    }

    /// Decide whether the principal may use the queue, and why.
    ///
    /// Grant rows win first. With no grant rows for the access type, the
    /// queue falls back to creator-or-admin access.
    pub fn check_queue_access(
        &self,
        queue_id: &str,
        principal: &Principal,
        access_type: &str,
    ) -> CoreResult<(bool, String)> {
        validate_access_type(access_type)?;
        let Some(queue) = self.get_queue(queue_id)? else {
            return Ok((false, format!("queue {queue_id} not found")));
        };

        let grants: Vec<(String, String)> = self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT grant_type, grant_value FROM queue_permissions
                 WHERE queue_id = ?1 AND access_type = ?2",
            )?;
            let rows = stmt.query_map(params![queue_id, access_type], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?;
            let mut grants = Vec::new();
            for row in rows {
                grants.push(row?);
            }
            Ok(grants)
        })?;

        if grants.is_empty() {
            if queue.created_by == principal.user_id {
                return Ok((true, "queue creator".to_string()));
            }
            if principal.role.is_admin() {
                return Ok((true, format!("{} role", principal.role.as_str())));
            }
            return Ok((
                false,
                format!("no {access_type} grant for user {}", principal.user_id),
            ));
        }

        for (grant_type, grant_value) in &grants {
            let matched = match grant_type.as_str() {
                "user" => grant_value == &principal.user_id,
                "role" => grant_value == principal.role.as_str(),
                "team" => principal.team_id.as_deref() == Some(grant_value.as_str()),
                _ => false,
            };
            if matched {
                return Ok((true, format!("{grant_type} grant: {grant_value}")));
            }
        }

        Ok((
            false,
            format!("no matching {access_type} grant for user {}", principal.user_id),
        ))
    }
}

fn validate_access_type(access_type: &str) -> CoreResult<()> {
    if ACCESS_TYPES.contains(&access_type) {
        Ok(())
    } else {
        Err(CoreError::Invalid(format!("unknown access type: {access_type}")))
    }
}
